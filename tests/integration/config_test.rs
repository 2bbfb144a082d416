//! Configuration and reload integration tests

use kelly_gate::config::{Config, ConfigError};
use kelly_gate::history::{JsonHistoryFile, ReturnHistoryProvider};
use kelly_gate::risk::LimitsStore;
use kelly_gate::telemetry::LogFormat;
use rust_decimal_macros::dec;
use std::io::Write;
use tempfile::NamedTempFile;

const EXAMPLE: &str = include_str!("../../config.toml.example");

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_config_example_loads() {
    let file = write_config(EXAMPLE);
    let config = Config::load(file.path()).unwrap();

    assert_eq!(config.limits.max_position_size, dec!(0.10));
    assert_eq!(config.limits.var_window, 250);
    assert_eq!(config.monitor.var_limit, Some(dec!(0.05)));
    assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
    assert!(config.telemetry.metrics_port.is_none());
}

#[test]
fn test_effective_config_round_trips() {
    let config = Config::from_toml_str(EXAMPLE).unwrap();
    let printed = toml::to_string_pretty(&config).unwrap();
    let reparsed = Config::from_toml_str(&printed).unwrap();
    assert_eq!(reparsed.limits, config.limits);
}

#[test]
fn test_missing_limits_section_rejected() {
    let result = Config::from_toml_str("[portfolio]\ninitial_cash = 1000\n");
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_reload_from_file_bumps_version() {
    let config = Config::from_toml_str(EXAMPLE).unwrap();
    let store = LimitsStore::new(config.limits, config.portfolio.history_capacity).unwrap();
    let held = store.current();

    let tighter = EXAMPLE.replace("max_leverage = 2.0", "max_leverage = 1.0");
    let file = write_config(&tighter);
    assert_eq!(store.reload_from_file(file.path()).unwrap(), 2);

    assert_eq!(store.current().limits.max_leverage, dec!(1.0));
    assert_eq!(held.version, 1);
    assert_eq!(held.limits.max_leverage, dec!(2.0));
}

#[test]
fn test_invalid_reload_keeps_active_version() {
    let config = Config::from_toml_str(EXAMPLE).unwrap();
    let store = LimitsStore::new(config.limits, config.portfolio.history_capacity).unwrap();

    let broken = EXAMPLE.replace("var_confidence = 0.95", "var_confidence = 1.5");
    let file = write_config(&broken);
    assert!(matches!(
        store.reload_from_file(file.path()),
        Err(ConfigError::Invalid {
            field: "limits.var_confidence",
            ..
        })
    ));
    assert_eq!(store.current().version, 1);
}

#[test]
fn test_reload_window_beyond_running_capacity_rejected() {
    let config = Config::from_toml_str(EXAMPLE).unwrap();
    let store = LimitsStore::new(config.limits, config.portfolio.history_capacity).unwrap();

    // Valid on its own, but wider than the running writer keeps
    let wide = EXAMPLE
        .replace("var_window = 250", "var_window = 2000")
        .replace("history_capacity = 1024", "history_capacity = 4096");
    let file = write_config(&wide);
    assert!(matches!(
        store.reload_from_file(file.path()),
        Err(ConfigError::Invalid {
            field: "limits.var_window",
            ..
        })
    ));
    assert_eq!(store.current().version, 1);
    assert_eq!(store.current().limits.var_window, 250);
}

#[test]
fn test_history_file_provider() {
    let file = write_config(r#"{"AAPL": [100, 101, 102.01], "MSFT": [10]}"#);
    let history = JsonHistoryFile::load(file.path()).unwrap();

    let aapl = tokio_test::block_on(history.returns("AAPL", 250)).unwrap();
    assert_eq!(aapl.len(), 2);
    assert!(aapl.iter().all(|r| (r - 0.01).abs() < 1e-9));

    let msft = tokio_test::block_on(history.returns("MSFT", 250)).unwrap();
    assert!(msft.is_empty());
}
