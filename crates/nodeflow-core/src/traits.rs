use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{FlowError, Result};
use crate::graph::NodeId;
use crate::types::{GeneratedFile, LogEvent, RunStatus};

/// Generative-content provider.
pub trait GenerativeClient: Send + Sync + 'static {
    /// Display name used in log lines (e.g., "Gemini").
    fn name(&self) -> &str;

    /// Generate text for a prompt. `model` is a hint; providers may ignore it.
    fn generate_text<'a>(&'a self, prompt: &'a str, model: &'a str) -> BoxFuture<'a, Result<String>>;

    /// Generate one image for a prompt, returning its raw bytes.
    fn generate_image<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        let _ = prompt;
        let err = FlowError::UnsupportedCapability {
            provider: self.name().to_string(),
            capability: "image generation".to_string(),
        };
        Box::pin(async move { Err(err) })
    }
}

/// Observer of a run. Every method defaults to a no-op, so call sites can
/// notify unconditionally.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &LogEvent) {
        let _ = event;
    }

    fn on_status(&self, status: RunStatus) {
        let _ = status;
    }

    fn on_file(&self, file: &GeneratedFile) {
        let _ = file;
    }

    /// The node currently executing, or `None` when nothing is.
    fn on_node(&self, node: Option<&NodeId>) {
        let _ = node;
    }

    fn on_running(&self, running: bool) {
        let _ = running;
    }
}

/// Sink that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn on_event(&self, event: &LogEvent) {
        (**self).on_event(event)
    }

    fn on_status(&self, status: RunStatus) {
        (**self).on_status(status)
    }

    fn on_file(&self, file: &GeneratedFile) {
        (**self).on_file(file)
    }

    fn on_node(&self, node: Option<&NodeId>) {
        (**self).on_node(node)
    }

    fn on_running(&self, running: bool) {
        (**self).on_running(running)
    }
}

/// Source of a provider credential. Resolved once per run.
pub trait CredentialProvider: Send + Sync {
    fn credential(&self) -> Option<String>;
}

/// Credential read from the process environment, first non-empty variable wins.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    vars: Vec<String>,
}

impl EnvCredential {
    pub fn new<I, S>(vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(Into::into).collect(),
        }
    }
}

impl CredentialProvider for EnvCredential {
    fn credential(&self) -> Option<String> {
        self.vars
            .iter()
            .filter_map(|v| std::env::var(v).ok())
            .find(|v| !v.trim().is_empty())
    }
}

/// Credential handed over by the caller for a single run. Never persisted.
#[derive(Clone, Default)]
pub struct SuppliedCredential(Option<String>);

impl SuppliedCredential {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let key = key.trim();
        Self((!key.is_empty()).then(|| key.to_string()))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

impl std::fmt::Debug for SuppliedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = if self.0.is_some() { "Some(<redacted>)" } else { "None" };
        f.debug_tuple("SuppliedCredential").field(&shown).finish()
    }
}

impl CredentialProvider for SuppliedCredential {
    fn credential(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Builds provider clients on demand.
pub trait ClientFactory: Send + Sync {
    /// Client for the primary provider, using the process-wide credential.
    fn primary(&self) -> Result<Arc<dyn GenerativeClient>>;

    /// Client for the secondary provider, using a per-run credential.
    fn secondary(&self, credential: &str) -> Result<Arc<dyn GenerativeClient>>;
}

/// Local text-to-speech side effect.
pub trait Speaker: Send + Sync {
    fn speak<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<()>>;
}
