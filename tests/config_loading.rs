use std::io::Write;

use nodeflow_core::config::AppConfig;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[primary]
model_id = "gemini-2.0-flash"
image_model_id = "imagen-custom"
api_key = "gm-test-key"
base_url = "http://127.0.0.1:9999/v1beta"

[secondary]
model_id = "gpt-4o"
base_url = "http://127.0.0.1:9999/v1/chat/completions"

[retry]
max_retries = 2
initial_backoff_ms = 50
max_backoff_ms = 400

[output]
dir = "/tmp/nodeflow-out"
speech_command = ["say", "-v", "Alex"]
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.primary.model_id, "gemini-2.0-flash");
    assert_eq!(config.primary.image_model_id, "imagen-custom");
    assert_eq!(config.primary.api_key, Some("gm-test-key".to_string()));
    assert_eq!(
        config.primary.base_url.as_deref(),
        Some("http://127.0.0.1:9999/v1beta")
    );
    assert_eq!(config.secondary.model_id, "gpt-4o");

    let retry = config.retry.clone().expect("retry present");
    assert_eq!(retry.max_retries, 2);
    assert_eq!(retry.initial_backoff_ms, 50);
    assert_eq!(retry.max_backoff_ms, 400);

    assert_eq!(config.output_dir(), std::path::PathBuf::from("/tmp/nodeflow-out"));
    assert_eq!(config.output.speech_command, vec!["say", "-v", "Alex"]);
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("NODEFLOW_TEST_GEMINI_KEY", "expanded-key-value");

    let toml_content = r#"
[primary]
api_key = "${NODEFLOW_TEST_GEMINI_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.primary.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("NODEFLOW_TEST_GEMINI_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[output]
dir = "out"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.primary.model_id, "gemini-2.5-flash");
    assert!(config.primary.api_key.is_none());
    assert!(config.primary.base_url.is_none());
    assert_eq!(config.secondary.model_id, "gpt-4");
    assert!(config.retry.is_none());
    assert_eq!(config.output.dir, "out");
    assert_eq!(config.output.speech_command, vec!["espeak", "--stdin"]);
}

#[test]
fn test_secondary_key_is_not_part_of_config() {
    let toml_content = r#"
[secondary]
model_id = "gpt-4"
api_key = "sk-should-not-stick"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    let shown = toml::to_string_pretty(&config.redacted()).expect("serialize");
    assert!(!shown.contains("sk-should-not-stick"));
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = AppConfig::load_or_default(&dir.path().join("nodeflow.toml")).expect("defaults");
    assert_eq!(config.primary.model_id, "gemini-2.5-flash");
    assert_eq!(config.output.dir, ".");
}
