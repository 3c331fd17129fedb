use super::constant::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    // app_name represents the name of current running service.
    pub app_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            app_name: DEFAULT_APP_NAME.into(),
        }
    }
}

// LogConfig represent the configuration of logging.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    pub config_file: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            config_file: LOG_CONFIG_FILE.into(),
        }
    }
}

// BreakerConfig represents the sliding window and the sensitivity of the adaptive breakers.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    pub window_ms: u64,
    pub buckets: u32,
    // k is the multiplier on accepted requests, higher k tolerates more failures
    pub k: f64,
    // protection is the request volume that never trips the breaker
    pub protection: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        BreakerConfig {
            window_ms: BREAKER_WINDOW_MS,
            buckets: BREAKER_BUCKETS,
            k: BREAKER_K,
            protection: BREAKER_PROTECTION,
        }
    }
}

// ShedderConfig represents the switches and the statistic settings of the adaptive shedders.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ShedderConfig {
    pub enabled: bool,
    pub log_enabled: bool,
    pub window_ms: u64,
    pub buckets: u32,
    // cpu usage in 1000m notation
    pub cpu_threshold: u64,
    pub cool_off_ms: u64,
    pub stat_interval_ms: u64,
}

impl Default for ShedderConfig {
    fn default() -> Self {
        ShedderConfig {
            enabled: true,
            log_enabled: true,
            window_ms: SHEDDER_WINDOW_MS,
            buckets: SHEDDER_BUCKETS,
            cpu_threshold: SHEDDER_CPU_THRESHOLD,
            cool_off_ms: SHEDDER_COOL_OFF_MS,
            stat_interval_ms: SHEDDING_STAT_INTERVAL_MS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MapReduceConfig {
    pub workers: usize,
}

impl Default for MapReduceConfig {
    fn default() -> Self {
        MapReduceConfig {
            workers: MAPREDUCE_WORKERS,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TimingWheelConfig {
    pub drain_workers: usize,
}

impl Default for TimingWheelConfig {
    fn default() -> Self {
        TimingWheelConfig {
            drain_workers: TIMING_WHEEL_DRAIN_WORKERS,
        }
    }
}

// StatConfig represents the configuration items of system statistic collector
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StatConfig {
    // cpu_interval_ms represents the collecting interval of the cpu usage collector.
    pub cpu_interval_ms: u32,
}

impl Default for StatConfig {
    fn default() -> Self {
        StatConfig {
            cpu_interval_ms: CPU_INTERVAL_MS,
        }
    }
}

// KitConfig represent the general configuration of all the primitives.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct KitConfig {
    pub app: AppConfig,
    pub log: LogConfig,
    pub breaker: BreakerConfig,
    pub shedder: ShedderConfig,
    pub mapreduce: MapReduceConfig,
    pub timing_wheel: TimingWheelConfig,
    pub stat: StatConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ConfigEntity {
    pub version: String,
    pub config: KitConfig,
}

impl Default for ConfigEntity {
    fn default() -> Self {
        ConfigEntity {
            version: KIT_VERSION.into(),
            config: KitConfig::default(),
        }
    }
}

fn check_window(name: &str, window_ms: u64, buckets: u32) -> Result<()> {
    if buckets == 0 || window_ms == 0 {
        return Err(Error::msg(format!(
            "illegal {} configuration: window_ms and buckets must be positive",
            name
        )));
    }
    if window_ms % (buckets as u64) != 0 {
        return Err(Error::msg(format!(
            "illegal {} configuration: window_ms {} needs to be evenly divided by buckets {}",
            name, window_ms, buckets
        )));
    }
    Ok(())
}

impl ConfigEntity {
    pub fn new() -> Self {
        ConfigEntity::default()
    }

    pub fn check(&self) -> Result<()> {
        if self.version.is_empty() {
            return Err(Error::msg("empty version"));
        }
        let config = &self.config;
        if config.app.app_name.is_empty() {
            return Err(Error::msg("empty app name"));
        }
        check_window("breaker", config.breaker.window_ms, config.breaker.buckets)?;
        if config.breaker.k <= 0.0 {
            return Err(Error::msg("illegal breaker configuration: k <= 0"));
        }
        if config.breaker.protection < 0 {
            return Err(Error::msg(
                "illegal breaker configuration: protection < 0",
            ));
        }
        check_window("shedder", config.shedder.window_ms, config.shedder.buckets)?;
        if config.shedder.cpu_threshold > 1000 {
            return Err(Error::msg(
                "illegal shedder configuration: cpu_threshold > 1000",
            ));
        }
        if config.mapreduce.workers < MAPREDUCE_MIN_WORKERS {
            return Err(Error::msg(
                "illegal mapreduce configuration: workers < 1",
            ));
        }
        if config.timing_wheel.drain_workers == 0 {
            return Err(Error::msg(
                "illegal timing wheel configuration: drain_workers < 1",
            ));
        }
        Ok(())
    }
}
