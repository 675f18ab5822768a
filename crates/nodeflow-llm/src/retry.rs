use std::time::Duration;

use futures::future::BoxFuture;
use tracing::warn;

use nodeflow_core::config::RetryConfig;
use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::traits::GenerativeClient;

/// A generative client that retries transient provider failures with backoff.
pub struct RetryingClient {
    inner: Box<dyn GenerativeClient>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn GenerativeClient>, retry_config: RetryConfig) -> Self {
        Self {
            inner,
            retry_config,
        }
    }

    async fn with_retries<'a, T, F>(&'a self, what: &'static str, mut call: F) -> Result<T>
    where
        F: FnMut() -> BoxFuture<'a, Result<T>>,
    {
        let max_retries = self.retry_config.max_retries;
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if is_retryable(&e) && attempt < max_retries => {
                    let backoff = calculate_backoff(attempt, &self.retry_config);
                    warn!(
                        provider = self.inner.name(),
                        attempt = attempt + 1,
                        max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying {}",
                        what
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn is_retryable(e: &FlowError) -> bool {
    match e {
        FlowError::ProviderRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl GenerativeClient for RetryingClient {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn generate_text<'a>(&'a self, prompt: &'a str, model: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.with_retries("text request", move || self.inner.generate_text(prompt, model)))
    }

    fn generate_image<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(self.with_retries("image request", move || self.inner.generate_image(prompt)))
    }
}
