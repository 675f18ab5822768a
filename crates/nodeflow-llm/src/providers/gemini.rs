use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use nodeflow_core::config::PrimaryConfig;
use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::GenerativeClient;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini client: text via `generateContent`, images via Imagen `predict`.
pub struct GeminiClient {
    http: Client,
    config: PrimaryConfig,
    api_key: String,
}

impl GeminiClient {
    pub fn new(config: PrimaryConfig, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            config,
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or(GEMINI_API_URL)
            .trim_end_matches('/');
        format!("{}/v1beta/models/{}:{}", base, model, method)
    }

    /// Unknown or foreign model names are served by the configured model.
    fn resolve_model<'a>(&'a self, hint: &'a str) -> &'a str {
        if hint.starts_with("gemini") {
            hint
        } else {
            &self.config.model_id
        }
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(&self, url: &str, body: &B) -> Result<R> {
        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| FlowError::ProviderRequest(format!("Gemini connection error: {}", e)))?;

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
                "Gemini API error: {} - {}",
                status.as_u16(),
                message
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| FlowError::ProviderParse(e.to_string()))
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<PredictInstance<'a>>,
    parameters: PredictParameters,
}

#[derive(Serialize)]
struct PredictInstance<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PredictParameters {
    sample_count: u32,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Debug)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
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

impl GenerativeClient for GeminiClient {
    fn name(&self) -> &str {
        "Gemini"
    }

    fn generate_text<'a>(&'a self, prompt: &'a str, model: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let model = self.resolve_model(model);
            let url = self.endpoint(model, "generateContent");
            debug!(model, prompt_len = prompt.len(), "Gemini generateContent");

            let body = GenerateRequest {
                contents: vec![Content {
                    role: "user",
                    parts: vec![TextPart { text: prompt }],
                }],
            };

            let response: GenerateResponse = self.post(&url, &body).await?;
            let candidate = response
                .candidates
                .into_iter()
                .next()
                .ok_or_else(|| FlowError::ProviderParse("Gemini returned no candidates".into()))?;

            let text = candidate
                .content
                .map(|c| {
                    c.parts
                        .into_iter()
                        .filter_map(|p| p.text)
                        .collect::<Vec<_>>()
                        .join("")
                })
                .unwrap_or_default();

            Ok(text)
        })
    }

    fn generate_image<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            let url = self.endpoint(&self.config.image_model_id, "predict");
            debug!(model = %self.config.image_model_id, "Imagen predict");

            let body = PredictRequest {
                instances: vec![PredictInstance { prompt }],
                parameters: PredictParameters { sample_count: 1 },
            };

            let response: PredictResponse = self.post(&url, &body).await?;
            let encoded = response
                .predictions
                .into_iter()
                .find_map(|p| p.bytes_base64_encoded)
                .ok_or_else(|| FlowError::ProviderParse("Imagen returned no images".into()))?;

            BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| FlowError::ProviderParse(format!("Invalid image payload: {}", e)))
        })
    }
}
