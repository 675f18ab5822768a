use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};
use crate::settings::{PRIMARY_MODEL, SECONDARY_MODEL};

/// Top-level nodeflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub primary: PrimaryConfig,
    #[serde(default)]
    pub secondary: SecondaryConfig,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Primary provider (Gemini). Credential is process-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryConfig {
    #[serde(default = "default_primary_model")]
    pub model_id: String,
    #[serde(default = "default_image_model")]
    pub image_model_id: String,
    /// Falls back to the `API_KEY` / `GEMINI_API_KEY` environment variables.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            model_id: default_primary_model(),
            image_model_id: default_image_model(),
            api_key: None,
            base_url: None,
        }
    }
}

/// Secondary provider (OpenAI). The credential is supplied per run and is
/// deliberately absent from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecondaryConfig {
    #[serde(default = "default_secondary_model")]
    pub model_id: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for SecondaryConfig {
    fn default() -> Self {
        Self {
            model_id: default_secondary_model(),
            base_url: None,
        }
    }
}

fn default_primary_model() -> String { PRIMARY_MODEL.to_string() }
fn default_image_model() -> String { "imagen-3.0-generate-002".to_string() }
fn default_secondary_model() -> String { SECONDARY_MODEL.to_string() }

/// Retry configuration for provider requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Where generated files go and how audio is spoken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for downloaded files. Default: current directory.
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// Text-to-speech program and arguments; the text is written to its stdin.
    #[serde(default = "default_speech_command")]
    pub speech_command: Vec<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            speech_command: default_speech_command(),
        }
    }
}

fn default_output_dir() -> String { ".".to_string() }
fn default_speech_command() -> Vec<String> { vec!["espeak".to_string(), "--stdin".to_string()] }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse config from TOML text, with env var expansion.
    pub fn parse(content: &str) -> Result<Self> {
        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| FlowError::Config(e.to_string()))
    }

    /// Load the file if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the output directory (expand ~).
    pub fn output_dir(&self) -> PathBuf {
        let dir = &self.output.dir;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }

    /// Copy with credentials blanked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.primary.api_key.is_some() {
            copy.primary.api_key = Some("<redacted>".to_string());
        }
        copy
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_NODEFLOW_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_NODEFLOW_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_NODEFLOW_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_NODEFLOW_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_NODEFLOW_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.primary.model_id, "gemini-2.5-flash");
        assert_eq!(config.primary.image_model_id, "imagen-3.0-generate-002");
        assert!(config.primary.api_key.is_none());
        assert_eq!(config.secondary.model_id, "gpt-4");
        assert!(config.retry.is_none());
        assert_eq!(config.output.dir, ".");
        assert_eq!(config.output.speech_command, vec!["espeak", "--stdin"]);
    }

    #[test]
    fn test_retry_section_defaults() {
        let config = AppConfig::parse("[retry]\nmax_retries = 5\n").unwrap();
        let retry = config.retry.unwrap();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.initial_backoff_ms, 1000);
        assert_eq!(retry.max_backoff_ms, 30000);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::parse("[primary\nmodel_id = 1").unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let config = AppConfig::load_or_default(Path::new("/nonexistent/nodeflow.toml")).unwrap();
        assert_eq!(config.primary.model_id, "gemini-2.5-flash");
        assert!(matches!(
            AppConfig::load(Path::new("/nonexistent/nodeflow.toml")),
            Err(FlowError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_redacted_hides_key() {
        let mut config = AppConfig::default();
        config.primary.api_key = Some("secret".into());
        let shown = toml::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("secret"));
        assert!(shown.contains("<redacted>"));
    }
}
