use super::{constant::*, ConfigEntity, KitConfig};
use crate::{logging, utils, Error, Result};
use lazy_static::lazy_static;
use serde_yaml;
use std::env;
use std::fs::File;
use std::io::prelude::*;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{BreakerConfig, MapReduceConfig, ShedderConfig, TimingWheelConfig};

lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<ConfigEntity> = RwLock::new(ConfigEntity::new());
}

// a panicked writer cannot leave the entity half-updated, every write replaces whole items
fn read_config() -> RwLockReadGuard<'static, ConfigEntity> {
    GLOBAL_CONFIG
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_config() -> RwLockWriteGuard<'static, ConfigEntity> {
    GLOBAL_CONFIG
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn reset_global_config(entity: ConfigEntity) {
    *write_config() = entity;
}

// init_config_with_yaml loads general configuration from the YAML file under provided path.
pub fn init_config_with_yaml(config_path: &mut String) -> Result<()> {
    // Initialize general config and logging module.
    apply_yaml_config_file(config_path)?;
    override_config_from_env_and_init_log()
}

// apply_yaml_config_file loads general configuration from the given YAML file.
fn apply_yaml_config_file(config_path: &mut String) -> Result<()> {
    // Priority: system environment > YAML file > default config
    if utils::is_blank(config_path) {
        // If the config file path is absent, try to resolve it from the system env.
        *config_path = env::var(CONF_FILE_PATH_ENV_KEY).unwrap_or_else(|_| CONFIG_FILENAME.into());
    }
    // If the path is still absent, the default config is used.
    load_global_config_from_yaml_file(config_path)
}

fn load_global_config_from_yaml_file(path_str: &str) -> Result<()> {
    if path_str == CONFIG_FILENAME {
        return Ok(());
    }
    let path = Path::new(path_str);
    if !path.exists() {
        return Err(Error::msg(format!(
            "YAML configuration file {} does not exist",
            path_str
        )));
    }
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    let entity: ConfigEntity = serde_yaml::from_str(&content)?;
    entity.check()?;
    logging::info!("[Config] Resolving config from file, file {}", path_str);
    reset_global_config(entity);
    Ok(())
}

pub fn override_config_from_env_and_init_log() -> Result<()> {
    override_items_from_system_env()?;
    init_log()
}

fn override_items_from_system_env() -> Result<()> {
    let app_name = env::var(APP_NAME_ENV_KEY).unwrap_or_default();
    let mut cfg = write_config();
    if !utils::is_blank(&app_name) {
        cfg.config.app.app_name = app_name;
    }
    cfg.check()
}

pub fn init_log() -> Result<()> {
    logging::logger_init(log_config_file());
    logging::info!("[Config] App name resolved, appName {}", app_name());
    logging::info!(
        "[Config] Print effective global config, globalConfig {:?}",
        *read_config()
    );
    Ok(())
}

#[inline]
pub fn global_config() -> KitConfig {
    read_config().config.clone()
}

#[inline]
pub fn log_config_file() -> Option<String> {
    let file = read_config().config.log.config_file.clone();
    if utils::is_blank(&file) {
        None
    } else {
        Some(file)
    }
}

#[inline]
pub fn app_name() -> String {
    read_config().config.app.app_name.clone()
}

#[inline]
pub fn breaker_config() -> BreakerConfig {
    read_config().config.breaker.clone()
}

#[inline]
pub fn shedder_config() -> ShedderConfig {
    read_config().config.shedder.clone()
}

#[inline]
pub fn set_shedder_enabled(enabled: bool) {
    write_config().config.shedder.enabled = enabled;
}

#[inline]
pub fn set_shedder_log_enabled(enabled: bool) {
    write_config().config.shedder.log_enabled = enabled;
}

#[inline]
pub fn mapreduce_config() -> MapReduceConfig {
    read_config().config.mapreduce.clone()
}

#[inline]
pub fn timing_wheel_config() -> TimingWheelConfig {
    read_config().config.timing_wheel.clone()
}

#[inline]
pub fn cpu_stat_collect_interval_ms() -> u32 {
    read_config().config.stat.cpu_interval_ms
}
