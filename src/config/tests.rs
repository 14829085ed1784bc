//! Tests for config module.

use super::*;
use crate::domain::{Locale, Role};
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

// ==================== Duration parsing tests ====================

#[test]
fn test_parse_duration_single_units() {
    assert_eq!(duration::parse_duration("30s").unwrap(), Duration::from_secs(30));
    assert_eq!(duration::parse_duration("5m").unwrap(), Duration::from_secs(300));
    assert_eq!(duration::parse_duration("2h").unwrap(), Duration::from_secs(7200));
    assert_eq!(duration::parse_duration("100ms").unwrap(), Duration::from_millis(100));
    assert_eq!(duration::parse_duration("1d").unwrap(), Duration::from_secs(86_400));
}

#[test]
fn test_parse_duration_compound() {
    let d = duration::parse_duration("1h30m").unwrap();
    assert_eq!(d, Duration::from_secs(5400));
}

#[test]
fn test_parse_duration_bare_number_is_seconds() {
    assert_eq!(duration::parse_duration("15").unwrap(), Duration::from_secs(15));
    assert_eq!(duration::parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
}

#[test]
fn test_parse_duration_empty() {
    assert_eq!(duration::parse_duration("").unwrap(), Duration::ZERO);
}

#[test]
fn test_parse_duration_invalid() {
    let result = duration::parse_duration("10x");
    assert!(result.unwrap_err().contains("unknown duration unit"));
    assert!(duration::parse_duration("s").is_err());
}

// ==================== YAML field loading tests ====================

/// Parse config from YAML string (for testing).
fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(yaml)?;
    Ok(config)
}

fn minimal_valid_yaml() -> String {
    r#"
app:
  name: agromart-sync
  env: development

backend:
  base_url: http://localhost:8000/api
  role: seller
  user_id: "42"
"#
    .to_string()
}

#[test]
fn test_minimal_config_defaults() {
    let cfg = from_yaml(&minimal_valid_yaml()).unwrap();

    assert_eq!(cfg.app.locale, Locale::Indonesian);
    assert_eq!(cfg.backend.role, Role::Seller);
    assert_eq!(cfg.backend.page_size, 20);
    assert_eq!(cfg.backend.timeout, Duration::from_secs(10));
    assert!(cfg.sync.enabled);
    assert_eq!(cfg.sync.interval, Duration::from_secs(30));
    assert_eq!(cfg.sync.retry.max_attempts(), 5);
    assert!(cfg.storage().is_none());
    assert!(cfg.telegram().is_none());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_load_app_and_backend_fields() {
    let yaml = r#"
app:
  name: toko-tani
  env: production
  log_level: debug
  locale: en

backend:
  base_url: https://api.agromart.id/v1
  role: buyer
  user_id: buyer-7
  page_size: 50
  timeout: 3s
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.app.name, "toko-tani");
    assert_eq!(cfg.app.log_level, Some("debug".to_string()));
    assert_eq!(cfg.app.locale, Locale::English);
    assert_eq!(cfg.backend.role, Role::Buyer);
    assert_eq!(cfg.backend.user_id, "buyer-7");
    assert_eq!(cfg.backend.page_size, 50);
    assert_eq!(cfg.backend.timeout, Duration::from_secs(3));
    assert!(cfg.backend.auth_token.is_empty());
}

#[test]
fn test_load_sync_fields() {
    let yaml = format!(
        "{}{}",
        minimal_valid_yaml(),
        r#"
sync:
  enabled: false
  interval: 1m
  push_timeout: 2s
  retry:
    max_attempts: 3
    initial_delay: 100ms
    max_delay: 1s
    multiplier: 3.0
"#
    );
    let cfg = from_yaml(&yaml).unwrap();

    assert!(!cfg.sync.enabled);
    assert_eq!(cfg.sync.interval, Duration::from_secs(60));
    assert_eq!(cfg.sync.push_timeout, Duration::from_secs(2));
    let retry = &cfg.sync.retry;
    assert_eq!(retry.max_attempts(), 3);
    assert_eq!(retry.initial_delay, Duration::from_millis(100));
    assert_eq!(retry.max_delay, Duration::from_secs(1));
    assert_eq!(retry.multiplier, Some(3.0));
}

#[test]
fn test_load_storage_and_notification_fields() {
    let yaml = format!(
        "{}{}",
        minimal_valid_yaml(),
        r#"
storage:
  enabled: true
  path: "orders.db"

notification:
  telegram:
    enabled: true
    notify_status_changes: true
    notify_errors: false
    notify_overview: true
    overview_interval: 1h
"#
    );
    let cfg = from_yaml(&yaml).unwrap();

    assert_eq!(cfg.storage().unwrap().path(), "orders.db");
    let tg = cfg.telegram().unwrap();
    assert!(tg.notify_status_changes);
    assert!(!tg.notify_errors);
    assert!(tg.notify_overview);
    assert_eq!(tg.overview_interval, Duration::from_secs(3600));
}

#[test]
fn test_disabled_sections_are_hidden() {
    let yaml = format!(
        "{}{}",
        minimal_valid_yaml(),
        r#"
storage:
  enabled: false
notification:
  telegram:
    enabled: false
"#
    );
    let cfg = from_yaml(&yaml).unwrap();

    assert!(cfg.storage().is_none());
    assert!(cfg.telegram().is_none());
}

#[test]
fn test_unknown_role_is_rejected() {
    let yaml = minimal_valid_yaml().replace("role: seller", "role: courier");
    assert!(matches!(from_yaml(&yaml), Err(ConfigError::Parse(_))));
}

// ==================== Retry backoff tests ====================

#[test]
fn test_retry_delay_grows_and_caps() {
    let retry = RetryConfig {
        max_attempts: Some(10),
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        multiplier: Some(2.0),
    };

    assert_eq!(retry.delay_after(1), Duration::from_millis(100));
    assert_eq!(retry.delay_after(2), Duration::from_millis(200));
    assert_eq!(retry.delay_after(4), Duration::from_millis(800));
    assert_eq!(retry.delay_after(5), Duration::from_secs(1));
    assert_eq!(retry.delay_after(60), Duration::from_secs(1));
}

#[test]
fn test_retry_defaults() {
    let retry = RetryConfig::default();
    assert_eq!(retry.delay_after(1), Duration::from_secs(1));
    assert_eq!(retry.delay_after(3), Duration::from_secs(4));
}

// ==================== Validation tests ====================

fn assert_invalid(cfg: &Config, needle: &str) {
    let err = cfg.validate().unwrap_err();
    assert!(
        err.to_string().contains(needle),
        "expected {needle:?} in {err}"
    );
}

#[test]
fn test_validate_empty_app_name() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.app.name.clear();
    assert_invalid(&cfg, "app.name is required");
}

#[test]
fn test_validate_base_url_scheme() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.backend.base_url = "ftp://agromart.id".into();
    assert_invalid(&cfg, "backend.base_url");
}

#[test]
fn test_validate_user_id_and_page_size() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.backend.user_id = "  ".into();
    assert_invalid(&cfg, "backend.user_id is required");

    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.backend.page_size = 0;
    assert_invalid(&cfg, "page_size must be positive");
}

#[test]
fn test_validate_multiplier_below_one() {
    let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
    cfg.sync.retry.multiplier = Some(0.5);
    assert_invalid(&cfg, "multiplier must be at least 1");
}

#[test]
fn test_validate_token_required_outside_development() {
    for env in ["staging", "production"] {
        let mut cfg = from_yaml(&minimal_valid_yaml()).unwrap();
        cfg.app.env = env.into();
        assert_invalid(&cfg, "BACKEND_AUTH_TOKEN");

        cfg.backend.auth_token = "secret".into();
        assert!(cfg.validate().is_ok());
    }
}

// ==================== File loading tests ====================

#[test]
fn test_load_from_file_development() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(minimal_valid_yaml().as_bytes()).unwrap();

    let cfg = Config::load(file.path().to_str().unwrap()).unwrap();

    assert_eq!(cfg.app.name, "agromart-sync");
    assert_eq!(cfg.backend.user_id, "42");
}

#[test]
fn test_load_from_file_production_reads_env_credentials() {
    let yaml = r#"
app:
  name: agromart-sync
  env: production

backend:
  base_url: https://api.agromart.id/v1
  role: seller
  user_id: "42"

notification:
  telegram:
    enabled: true
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    // Only this test touches these variables.
    unsafe {
        env::set_var("BACKEND_AUTH_TOKEN", "prod_token");
        env::set_var("TELEGRAM_BOT_TOKEN", "bot_token_789");
        env::set_var("TELEGRAM_CHAT_ID", "chat_id_012");
        env::set_var("TELEGRAM_ERROR_CHAT_ID", "error_chat_345");
    }

    let result = Config::load(file.path().to_str().unwrap());

    unsafe {
        env::remove_var("BACKEND_AUTH_TOKEN");
        env::remove_var("TELEGRAM_BOT_TOKEN");
        env::remove_var("TELEGRAM_CHAT_ID");
        env::remove_var("TELEGRAM_ERROR_CHAT_ID");
    }

    let cfg = result.unwrap();
    assert_eq!(cfg.backend.auth_token, "prod_token");
    let tg = cfg.telegram().unwrap();
    assert_eq!(tg.bot_token, "bot_token_789");
    assert_eq!(tg.chat_id, "chat_id_012");
    assert_eq!(tg.error_chat_id, "error_chat_345");
}

#[test]
fn test_load_file_not_found() {
    let result = Config::load("nonexistent_config.yaml");
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("failed to read config file")
    );
}

#[test]
fn test_load_malformed_yaml() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"app: [unclosed").unwrap();

    let result = Config::load(file.path().to_str().unwrap());
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}
