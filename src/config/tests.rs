use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::settings::{LockBackend, Settings};
use super::{load_config, load_config_from};

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.mqtt.server, "tcp://localhost:1883");
    assert_eq!(settings.mqtt.username, "");
    assert_eq!(settings.mqtt.password, "");
    assert_eq!(settings.lock.backend, LockBackend::Redis);
    assert_eq!(settings.lock.redis_url, "redis://localhost:6379");
    assert_eq!(settings.lock.path, "nodelink_locks");
    assert_eq!(settings.lock.purge_interval_secs, 60);
    assert_eq!(settings.log.level, "info");
}

#[test]
#[serial]
fn test_missing_file_yields_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("absent");

    let cfg = load_config_from(path.to_str().unwrap()).expect("load_config_from failed");
    assert_eq!(cfg, Settings::default());
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    // load_config reads config/default.toml relative to the working directory
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [mqtt]
        server = "tcp://broker:1883"
        username = "nodelink"

        [lock]
        backend = "sled"
        purge_interval_secs = 5
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.mqtt.server, "tcp://broker:1883");
    assert_eq!(cfg.mqtt.username, "nodelink");
    assert_eq!(cfg.mqtt.password, "");
    assert_eq!(cfg.lock.backend, LockBackend::Sled);
    assert_eq!(cfg.lock.redis_url, "redis://localhost:6379");
    assert_eq!(cfg.lock.path, "nodelink_locks");
    assert_eq!(cfg.lock.purge_interval_secs, 5);
    assert_eq!(cfg.log.level, "info");
}

#[test]
#[serial]
fn test_environment_overrides_file() {
    let tmp = TempDir::new().expect("create tempdir");
    let path = tmp.path().join("nodelink.toml");
    fs::write(&path, "[mqtt]\nserver = \"tcp://file:1883\"\npassword = \"from-file\"\n")
        .expect("write config file");
    let base = tmp.path().join("nodelink");

    temp_env::with_vars(
        [
            ("NODELINK_MQTT__SERVER", Some("tcp://env:1883")),
            ("NODELINK_LOG__LEVEL", Some("debug")),
            ("NODELINK_LOCK__PATH", Some("/var/lib/nodelink")),
            ("NODELINK_LOCK__BACKEND", Some("redis")),
            ("NODELINK_LOCK__REDIS_URL", Some("redis://cache:6379/2")),
            ("NODELINK_LOCK__PURGE_INTERVAL_SECS", Some("15")),
        ],
        || {
            let cfg = load_config_from(base.to_str().unwrap()).expect("load failed");
            assert_eq!(cfg.mqtt.server, "tcp://env:1883");
            assert_eq!(cfg.mqtt.password, "from-file");
            assert_eq!(cfg.log.level, "debug");
            assert_eq!(cfg.lock.path, "/var/lib/nodelink");
            assert_eq!(cfg.lock.backend, LockBackend::Redis);
            assert_eq!(cfg.lock.redis_url, "redis://cache:6379/2");
            assert_eq!(cfg.lock.purge_interval_secs, 15);
        },
    );
}
