//! Integration tests for provider record import and export

use promptwire_core::config::{
    export_providers_to_json, load_providers_from_json, load_providers_from_yaml, ConfigError,
    GenerationOptions, ProviderRecord, ValidationErrorKind,
};
use promptwire_core::registry::Registry;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to create a test config file
fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_yaml_with_env_interpolation() {
    std::env::set_var("PROMPTWIRE_TEST_ANTHROPIC_KEY", "sk-ant-from-env");

    let yaml = r#"
- typeId: anthropic-messages
  name: Claude
  key: ${PROMPTWIRE_TEST_ANTHROPIC_KEY}
  model: claude-3-haiku-20240307
  stream: true
- typeId: chatbotkit
  name: Bot
  key: cbk
  socketUrl: wss://ws.example.com/app/x
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "providers.yaml", yaml);
    let records = load_providers_from_yaml(&path).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].type_id, "anthropic-messages");
    assert_eq!(records[0].settings["key"], "sk-ant-from-env");
    assert_eq!(records[0].settings["stream"], true);
    assert_eq!(records[1].settings["socketUrl"], "wss://ws.example.com/app/x");

    std::env::remove_var("PROMPTWIRE_TEST_ANTHROPIC_KEY");
}

#[test]
fn test_load_json_records() {
    let json = r#"[
        {"typeId": "openai-chat", "name": "GPT", "key": "sk", "model": "gpt-4", "stream": false},
        {"typeId": "", "name": "Disabled"}
    ]"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "providers.json", json);
    let records = load_providers_from_json(&path).unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "GPT");
    assert_eq!(records[1].type_id, "");
    assert!(records[1].settings.is_empty());
}

#[test]
fn test_missing_env_var() {
    let yaml = r#"
- typeId: openai-chat
  name: GPT
  key: ${PROMPTWIRE_TEST_DEFINITELY_UNSET}
"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "providers.yaml", yaml);
    let err = load_providers_from_yaml(&path).unwrap_err();

    match err {
        ConfigError::EnvVarNotFound { var } => assert_eq!(var, "PROMPTWIRE_TEST_DEFINITELY_UNSET"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_unknown_type_id_is_rejected() {
    let json = r#"[{"typeId": "natdev", "name": "Playground"}]"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "providers.json", json);
    let err = load_providers_from_json(&path).unwrap_err();

    match err {
        ConfigError::ValidationError(e) => {
            assert_eq!(e.field_path, "providers[0].typeId");
            assert!(matches!(e.kind, ValidationErrorKind::InvalidValue { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_invalid_url_is_rejected() {
    let json = r#"[
        {"typeId": "openai-chat", "name": "GPT"},
        {"typeId": "scale-spellbook-fish", "name": "Fish", "relayUrl": "not a url"}
    ]"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "providers.json", json);
    let err = load_providers_from_json(&path).unwrap_err();

    match err {
        ConfigError::ValidationError(e) => {
            assert_eq!(e.field_path, "providers[1].relayUrl");
            assert!(matches!(e.kind, ValidationErrorKind::InvalidUrl { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_malformed_json_reports_position() {
    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "providers.json", "[\n  {\"typeId\": }\n]");
    let err = load_providers_from_json(&path).unwrap_err();

    match err {
        ConfigError::ParseError { line, column, .. } => {
            assert_eq!(line, Some(2));
            assert!(column.is_some());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_export_then_import() {
    let registry = Registry::global();
    let mut gpt = registry.provider("openai-chat").create_config();
    gpt.name = "GPT".to_string();
    gpt.settings.insert("model".to_string(), "gpt-4".into());
    let records = vec![
        gpt,
        ProviderRecord::new("steamship-plugin", "Ship").with_setting("workspace", "ws"),
    ];

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("export.json");
    export_providers_to_json(&path, &records).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert!(content.contains("\"typeId\": \"openai-chat\""));

    let imported = load_providers_from_json(&path).unwrap();
    assert_eq!(imported, records);
}

#[test]
fn test_imported_record_builds_connection() {
    let json = r#"[{"typeId": "anthropic-text", "name": "Claude", "model": "claude-2.1"}]"#;

    let dir = TempDir::new().unwrap();
    let path = create_test_file(&dir, "providers.json", json);
    let records = load_providers_from_json(&path).unwrap();

    let connection = Registry::global()
        .create_connection(records.first(), None, &GenerationOptions::default())
        .unwrap()
        .unwrap();
    assert_eq!(connection.name(), "anthropic-text");
}
