use std::env;

use serial_test::serial;

use certsync::config::CertsyncConfig;

/// Environment overrides win over built-in defaults.
#[test]
#[serial]
fn env_overrides_defaults() {
    env::set_var("CERTSYNC_DATA_DIR", "/tmp/certsync_env_test");
    env::set_var("CERTSYNC_POLL_INTERVAL_MS", "1000");
    env::set_var("CERTSYNC_FRESHNESS_WINDOW_MS", "2500");

    let config = CertsyncConfig::load().expect("config should load");
    assert_eq!(config.storage.data_dir, "/tmp/certsync_env_test");
    assert_eq!(config.sync.poll_interval_ms, 1_000);
    assert_eq!(config.sync.freshness_window_ms, 2_500);

    // Clean up env vars for other tests
    env::remove_var("CERTSYNC_DATA_DIR");
    env::remove_var("CERTSYNC_POLL_INTERVAL_MS");
    env::remove_var("CERTSYNC_FRESHNESS_WINDOW_MS");
}

/// A database URL override lands in the matching backend slot only.
#[test]
#[serial]
fn database_url_routes_by_scheme() {
    env::set_var("CERTSYNC_DATABASE_URL", "sqlite://env_override.db");

    let config = CertsyncConfig::load().expect("config should load");
    assert_eq!(config.database.sqlite_url, "sqlite://env_override.db");
    // Postgres slot keeps its default; the sqlite URL must not leak into it.
    assert!(config.database.postgres_url.starts_with("postgres"));

    env::remove_var("CERTSYNC_DATABASE_URL");
}

/// An inconsistent freshness window is rejected by init().
#[test]
#[serial]
fn init_rejects_window_not_exceeding_interval() {
    env::set_var("CERTSYNC_POLL_INTERVAL_MS", "5000");
    env::set_var("CERTSYNC_FRESHNESS_WINDOW_MS", "5000");

    assert!(CertsyncConfig::init().is_err());

    env::remove_var("CERTSYNC_POLL_INTERVAL_MS");
    env::remove_var("CERTSYNC_FRESHNESS_WINDOW_MS");
}

/// Loading with no overrides yields a valid configuration.
#[test]
#[serial]
fn defaults_load_and_validate() {
    let config = CertsyncConfig::init().expect("defaults should initialize");
    assert_eq!(config.server.port, 8080);
    assert!(config.sync.freshness_window_ms > config.sync.poll_interval_ms);
}
