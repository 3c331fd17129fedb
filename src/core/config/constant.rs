// default app settings
pub const KIT_VERSION: &str = "v1";
pub const DEFAULT_APP_NAME: &str = "unknown_service";
pub const APP_NAME_ENV_KEY: &str = "SENTINEL_KIT_APP_NAME";
pub const CONF_FILE_PATH_ENV_KEY: &str = "SENTINEL_KIT_CONFIG_FILE_PATH";
pub const CONFIG_FILENAME: &str = "USE_DEFAULT_CONFIGURATION";

// default breaker settings, 250ms for each bucket
pub const BREAKER_WINDOW_MS: u64 = 10_000;
pub const BREAKER_BUCKETS: u32 = 40;
pub const BREAKER_K: f64 = 1.5;
pub const BREAKER_PROTECTION: i64 = 5;

// default shedder settings, 100ms for each bucket
pub const SHEDDER_WINDOW_MS: u64 = 5000;
pub const SHEDDER_BUCKETS: u32 = 50;
// using 1000m notation, 900m is like 90%
pub const SHEDDER_CPU_THRESHOLD: u64 = 900;
pub const SHEDDER_COOL_OFF_MS: u64 = 1000;
pub const SHEDDING_STAT_INTERVAL_MS: u64 = 60_000;

// default executor settings
pub const MAPREDUCE_WORKERS: usize = 16;
pub const MAPREDUCE_MIN_WORKERS: usize = 1;
pub const TIMING_WHEEL_DRAIN_WORKERS: usize = 8;

// default statistic settings
pub const CPU_INTERVAL_MS: u32 = 250;

// default log settings
pub const DEFAULT_LOG_LEVEL: &str = "warn";
pub const LOG_CONFIG_FILE: &str = "testdata/config/log4rs.yaml";
