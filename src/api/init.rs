//! Initialization prepares the runtime environment:
//! 1. override the global config, from a config entity, a yaml file or the environment
//! 2. initialize the global logger
//! 3. start the background cpu collector

use crate::config::{self, ConfigEntity};
use crate::{system_metric, utils, Result};

/// `init_default` initializes the kit with the configuration from the system
/// environment and the default values.
#[inline]
pub fn init_default() -> Result<()> {
    init_kit(&mut String::new())
}

/// `init_with_config` initializes the kit with the given config.
#[inline]
pub fn init_with_config(config_entity: ConfigEntity) -> Result<()> {
    config_entity.check()?;
    config::reset_global_config(config_entity);
    config::override_config_from_env_and_init_log()?;
    init_core_components()
}

/// `init_with_config_file` loads the configuration from the given YAML file,
/// a blank path falls back to the file named by `SENTINEL_KIT_CONFIG_FILE_PATH`.
#[inline]
pub fn init_with_config_file(config_path: &mut String) -> Result<()> {
    config::init_config_with_yaml(config_path)?;
    init_core_components()
}

#[inline]
fn init_kit(config_path: &mut String) -> Result<()> {
    if utils::is_blank(config_path) {
        config::override_config_from_env_and_init_log()?;
    } else {
        config::init_config_with_yaml(config_path)?;
    }
    init_core_components()
}

// `init_core_components` starts the background tasks with the global config
#[inline]
fn init_core_components() -> Result<()> {
    let cpu_interval = config::cpu_stat_collect_interval_ms();
    if cpu_interval > 0 {
        system_metric::init_cpu_collector(cpu_interval);
    }
    Ok(())
}
