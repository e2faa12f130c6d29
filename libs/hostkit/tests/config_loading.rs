#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Tests for layered configuration loading (defaults -> YAML -> env).

use hostkit::{AppConfig, ConfigError, ConfigProvider, LogFormat};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_yaml(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn defaults_apply_without_file() {
    let cfg = temp_env::with_vars_unset(["APP__LOGGING__LEVEL"], || AppConfig::load(None)).unwrap();

    assert!(cfg.connection_strings.is_empty());
    assert!(cfg.app_settings.is_empty());
    assert_eq!(cfg.logging.level, "info");
    assert_eq!(cfg.logging.format, LogFormat::Text);
}

#[test]
fn yaml_file_provides_connection_strings_settings_and_sections() {
    let file = write_yaml(
        r#"
connection_strings:
  NServiceBus.Persistence: "Url=http://ravendb:8080;Database=orders"
app_settings:
  NServiceBus/Persistence/RavenDB/MaxNumberOfRequestsPerSession: "25"
logging:
  level: debug
  format: json
persistence:
  endpoint_name: orders-endpoint
  compression: false
"#,
    );

    let cfg = temp_env::with_vars_unset(["APP__LOGGING__LEVEL"], || {
        AppConfig::load(Some(file.path()))
    })
    .unwrap();

    assert_eq!(
        cfg.connection_string("NServiceBus.Persistence"),
        Some("Url=http://ravendb:8080;Database=orders")
    );
    assert_eq!(
        cfg.app_setting("NServiceBus/Persistence/RavenDB/MaxNumberOfRequestsPerSession"),
        Some("25")
    );
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.logging.format, LogFormat::Json);

    let section = cfg.section("persistence").unwrap();
    assert_eq!(section["endpoint_name"], "orders-endpoint");
    assert_eq!(section["compression"], false);
}

#[test]
fn env_overrides_yaml() {
    let file = write_yaml("logging:\n  level: warn\n");

    let cfg = temp_env::with_var("APP__LOGGING__LEVEL", Some("trace"), || {
        AppConfig::load(Some(file.path()))
    })
    .unwrap();

    assert_eq!(cfg.logging.level, "trace");
}

#[test]
fn missing_file_is_an_error() {
    let err = AppConfig::load(Some(std::path::Path::new("/definitely/not/here.yaml")))
        .unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }));
}

#[test]
fn malformed_section_type_is_a_load_error() {
    let file = write_yaml("logging:\n  ansi: \"sometimes\"\n");

    let err = temp_env::with_vars_unset(["APP__LOGGING__LEVEL"], || {
        AppConfig::load(Some(file.path()))
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
fn unquoted_yaml_settings_are_kept_as_text() {
    let file = write_yaml(
        r"
app_settings:
  NServiceBus/Persistence/RavenDB/MaxNumberOfRequestsPerSession: 25
  Feature/Enabled: true
",
    );

    let cfg = temp_env::with_vars_unset(["APP__LOGGING__LEVEL"], || {
        AppConfig::load(Some(file.path()))
    })
    .unwrap();

    assert_eq!(
        cfg.app_setting("NServiceBus/Persistence/RavenDB/MaxNumberOfRequestsPerSession"),
        Some("25")
    );
    assert_eq!(cfg.app_setting("Feature/Enabled"), Some("true"));
}

#[test]
fn numeric_env_setting_is_kept_as_text() {
    let cfg = temp_env::with_var("APP__APP_SETTINGS__LIMIT", Some("25"), || {
        AppConfig::load(None)
    })
    .unwrap();

    assert_eq!(cfg.app_settings.len(), 1);
    assert!(cfg.app_settings.values().all(|v| v == "25"));
}

#[test]
fn nested_app_setting_is_a_load_error() {
    let file = write_yaml("app_settings:\n  Limits:\n    max: 3\n");

    let err = temp_env::with_vars_unset(["APP__LOGGING__LEVEL"], || {
        AppConfig::load(Some(file.path()))
    })
    .unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}
