pub mod providers;
pub mod retry;

use std::sync::Arc;

use nodeflow_core::config::AppConfig;
use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::{ClientFactory, CredentialProvider, EnvCredential, GenerativeClient};

pub use providers::gemini::GeminiClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Environment variables consulted for the primary credential, in order.
pub const PRIMARY_KEY_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];

/// Builds real provider clients from configuration.
pub struct ProviderFactory {
    config: AppConfig,
    primary_credential: Box<dyn CredentialProvider>,
}

impl ProviderFactory {
    /// Primary credential comes from the config file, then the environment.
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            primary_credential: Box::new(EnvCredential::new(PRIMARY_KEY_VARS)),
        }
    }

    pub fn with_primary_credential(mut self, credential: Box<dyn CredentialProvider>) -> Self {
        self.primary_credential = credential;
        self
    }

    fn primary_key(&self) -> Option<String> {
        self.config
            .primary
            .api_key
            .as_deref()
            .map(str::trim)
            // Unexpanded ${VAR} references count as unset.
            .filter(|k| !k.is_empty() && !k.contains("${"))
            .map(str::to_string)
            .or_else(|| self.primary_credential.credential())
    }

    fn wrap(&self, client: Box<dyn GenerativeClient>) -> Arc<dyn GenerativeClient> {
        match &self.config.retry {
            Some(retry) => Arc::new(RetryingClient::new(client, retry.clone())),
            None => Arc::from(client),
        }
    }
}

impl ClientFactory for ProviderFactory {
    fn primary(&self) -> Result<Arc<dyn GenerativeClient>> {
        let key = self.primary_key().ok_or_else(|| FlowError::MissingCredential {
            provider: "Gemini".to_string(),
        })?;
        Ok(self.wrap(Box::new(GeminiClient::new(self.config.primary.clone(), key))))
    }

    fn secondary(&self, credential: &str) -> Result<Arc<dyn GenerativeClient>> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(FlowError::MissingCredential {
                provider: "OpenAI".to_string(),
            });
        }
        Ok(self.wrap(Box::new(OpenAiClient::new(
            self.config.secondary.clone(),
            credential,
        ))))
    }
}
