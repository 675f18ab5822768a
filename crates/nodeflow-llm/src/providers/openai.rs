use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nodeflow_core::config::SecondaryConfig;
use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::GenerativeClient;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat-completions client. The bearer credential is supplied per run.
pub struct OpenAiClient {
    http: Client,
    config: SecondaryConfig,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: SecondaryConfig, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            config,
            api_key: api_key.into(),
        }
    }

    fn resolve_model<'a>(&'a self, hint: &'a str) -> &'a str {
        if hint.starts_with("gpt") {
            hint
        } else {
            &self.config.model_id
        }
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OaiMessage<'a>>,
}

#[derive(Serialize)]
struct OaiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Deserialize, Debug)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl GenerativeClient for OpenAiClient {
    fn name(&self) -> &str {
        "OpenAI"
    }

    fn generate_text<'a>(&'a self, prompt: &'a str, model: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let url = self.config.base_url.as_deref().unwrap_or(OPENAI_API_URL);
            let model = self.resolve_model(model);
            debug!(model, prompt_len = prompt.len(), "OpenAI chat completion");

            let body = ChatRequest {
                model,
                messages: vec![OaiMessage {
                    role: "user",
                    content: prompt,
                }],
            };

            let response = self
                .http
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await
                .map_err(|e| FlowError::ProviderRequest(format!("OpenAI connection error: {}", e)))?;

            let status = response.status();
            if !status.is_success() {
                let message = response
                    .json::<ErrorEnvelope>()
                    .await
                    .ok()
                    .and_then(|e| e.error)
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "Unknown error".to_string());
                return Err(FlowError::ProviderRequest(format!(
                    "OpenAI API error: {} - {}",
                    status.as_u16(),
                    message
                )));
            }

            let data: ChatResponse = response
                .json()
                .await
                .map_err(|e| FlowError::ProviderParse(e.to_string()))?;

            data.choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| FlowError::ProviderParse("OpenAI returned no choices".into()))
        })
    }
}
