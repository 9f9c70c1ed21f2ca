//! Tests for config module

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serial_test::serial;
use tempfile::NamedTempFile;
use tokio_test::{assert_err, assert_ok};

use appcache_updater::config::Config;

const ENV_KEYS: &[&str] = &[
    "APPCACHE_FREQUENCY_SECS",
    "APPCACHE_SCAN_INTERVAL_SECS",
    "APPCACHE_REFRESH_TIMEOUT_SECS",
    "APPCACHE_SCAN_ON_ENABLE",
    "APPCACHE_SQLITE_PATH",
    "APPCACHE_CACHE_DIR",
    "APPCACHE_REQUEST_TIMEOUT",
    "APPCACHE_USER_AGENT",
    "APPCACHE_MAX_RETRIES",
    "APPCACHE_LOG_LEVEL",
    "APPCACHE_LOG_FORMAT",
];

fn clear_env() {
    for key in ENV_KEYS {
        std::env::remove_var(key);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_file_exists() {
    let config_path = Path::new("config.toml");
    assert!(
        config_path.exists(),
        "config.toml should exist in project root"
    );
}

#[test]
fn test_shipped_config_matches_defaults() {
    let config = assert_ok!(Config::from_file(Path::new("config.toml")));
    assert_ok!(config.validate());

    let defaults = Config::default();
    assert_eq!(config.scheduler, defaults.scheduler);
    assert_eq!(config.storage, defaults.storage);
    assert_eq!(config.logging, defaults.logging);
    assert_eq!(config.fetch.max_retries, defaults.fetch.max_retries);
}

#[test]
fn test_from_file_overrides() {
    let file = write_config(
        r#"
        [scheduler]
        frequency_secs = 3600
        scan_interval_secs = 60
        scan_on_enable = true

        [storage]
        sqlite_path = "/var/lib/appcache/entries.db"
        "#,
    );

    let config = assert_ok!(Config::load(Some(file.path())));

    assert_eq!(config.scheduler.frequency_secs, 3600);
    assert_eq!(
        config.staleness_policy().unwrap().frequency(),
        Duration::from_secs(3600)
    );
    assert!(config.trigger_config().scan_on_enable);
    assert_eq!(
        config.storage.sqlite_path,
        PathBuf::from("/var/lib/appcache/entries.db")
    );
    assert_eq!(config.scheduler.refresh_timeout_secs, 120);
}

#[test]
fn test_load_rejects_zero_frequency() {
    let file = write_config("[scheduler]\nfrequency_secs = 0\n");
    assert_err!(Config::load(Some(file.path())));
}

#[test]
fn test_malformed_file_reports_path() {
    let file = write_config("[scheduler\nfrequency_secs = ");
    let err = Config::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse TOML"));
}

#[test]
fn test_missing_file() {
    assert_err!(Config::from_file(Path::new("does/not/exist.toml")));
}

#[test]
#[serial]
fn test_from_env_defaults() {
    clear_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config, Config::default());
}

#[test]
#[serial]
fn test_from_env_overrides() {
    clear_env();
    std::env::set_var("APPCACHE_FREQUENCY_SECS", "900");
    std::env::set_var("APPCACHE_SCAN_ON_ENABLE", "true");
    std::env::set_var("APPCACHE_SQLITE_PATH", "/tmp/appcache-test.db");
    std::env::set_var("APPCACHE_MAX_RETRIES", "7");
    std::env::set_var("APPCACHE_LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.scheduler.frequency_secs, 900);
    assert!(config.scheduler.scan_on_enable);
    assert_eq!(
        config.storage.sqlite_path,
        PathBuf::from("/tmp/appcache-test.db")
    );
    assert_eq!(config.http_backend_config().retry.max_retries, 7);
    assert_eq!(config.logging.format, "json");
}

#[test]
#[serial]
fn test_from_env_ignores_unparsable_numbers() {
    clear_env();
    std::env::set_var("APPCACHE_SCAN_INTERVAL_SECS", "soon");

    let config = Config::from_env().unwrap();
    clear_env();

    assert_eq!(config.scheduler.scan_interval_secs, 300);
}

#[test]
#[serial]
fn test_load_without_path_uses_env() {
    clear_env();
    std::env::set_var("APPCACHE_REFRESH_TIMEOUT_SECS", "0");

    let result = Config::load(None);
    clear_env();

    assert_err!(result);
}
