use sentinel_kit::config::{self, ConfigEntity};

#[test]
fn from_file() {
    let mut path = String::from("testdata/config/config.yaml");
    assert!(sentinel_kit::init_with_config_file(&mut path).is_ok());
    assert_eq!(config::mapreduce_config().workers, 16);
    assert_eq!(config::timing_wheel_config().drain_workers, 8);
}

#[test]
fn missing_file() {
    let mut path = String::from("testdata/config/absent.yaml");
    assert!(sentinel_kit::init_with_config_file(&mut path).is_err());
}

#[test]
fn invalid_entity() {
    let mut entity = ConfigEntity::default();
    entity.config.breaker.buckets = 0;
    assert!(sentinel_kit::init_with_config(entity).is_err());
}

#[test]
fn default() {
    sentinel_kit::init_default().unwrap_or_else(|err| sentinel_kit::logging::error!("{:?}", err));
    assert!(!config::app_name().is_empty());
}
