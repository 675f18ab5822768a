//! Mocks and fixtures shared by nodeflow tests.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::event::RunEvent;
use nodeflow_core::graph::NodeId;
use nodeflow_core::traits::{ClientFactory, EventSink, GenerativeClient, Speaker};
use nodeflow_core::types::{GeneratedFile, LogEvent, LogKind, RunStatus};

// ── MockClient ───────────────────────────────────────────────────

/// One recorded text request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCall {
    pub prompt: String,
    pub model: String,
}

/// Scripted generative client. Replies are consumed in order; once the
/// script is empty every request gets the default reply.
pub struct MockClient {
    name: String,
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    default_reply: String,
    image: Option<std::result::Result<Vec<u8>, String>>,
    text_calls: Mutex<Vec<TextCall>>,
    image_calls: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            default_reply: "mock reply".to_string(),
            image: None,
            text_calls: Mutex::new(Vec::new()),
            image_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_reply(mut self, reply: &str) -> Self {
        self.default_reply = reply.to_string();
        self
    }

    pub fn with_reply(self, reply: &str) -> Self {
        self.push(Ok(reply.to_string()));
        self
    }

    /// Queue a failure; it surfaces as a provider request error.
    pub fn with_failure(self, message: &str) -> Self {
        self.push(Err(message.to_string()));
        self
    }

    pub fn with_image(mut self, bytes: &[u8]) -> Self {
        self.image = Some(Ok(bytes.to_vec()));
        self
    }

    pub fn with_image_failure(mut self, message: &str) -> Self {
        self.image = Some(Err(message.to_string()));
        self
    }

    fn push(&self, reply: std::result::Result<String, String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(reply);
        }
    }

    pub fn text_calls(&self) -> Vec<TextCall> {
        self.text_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.text_calls().into_iter().map(|c| c.prompt).collect()
    }

    pub fn image_calls(&self) -> Vec<String> {
        self.image_calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl GenerativeClient for MockClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate_text<'a>(&'a self, prompt: &'a str, model: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.text_calls.lock() {
                calls.push(TextCall {
                    prompt: prompt.to_string(),
                    model: model.to_string(),
                });
            }
            let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
            match next {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(FlowError::ProviderRequest(message)),
                None => Ok(self.default_reply.clone()),
            }
        })
    }

    fn generate_image<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            if let Ok(mut calls) = self.image_calls.lock() {
                calls.push(prompt.to_string());
            }
            match &self.image {
                Some(Ok(bytes)) => Ok(bytes.clone()),
                Some(Err(message)) => Err(FlowError::ProviderRequest(message.clone())),
                None => Err(FlowError::UnsupportedCapability {
                    provider: self.name.clone(),
                    capability: "image generation".to_string(),
                }),
            }
        })
    }
}

// ── MockFactory ──────────────────────────────────────────────────

/// Factory handing out shared mock clients and counting constructions.
pub struct MockFactory {
    primary: Option<Arc<MockClient>>,
    secondary: Arc<MockClient>,
    primary_builds: AtomicUsize,
    secondary_builds: AtomicUsize,
    credentials: Mutex<Vec<String>>,
}

impl MockFactory {
    pub fn new(primary: MockClient, secondary: MockClient) -> Self {
        Self {
            primary: Some(Arc::new(primary)),
            secondary: Arc::new(secondary),
            primary_builds: AtomicUsize::new(0),
            secondary_builds: AtomicUsize::new(0),
            credentials: Mutex::new(Vec::new()),
        }
    }

    /// A factory whose primary credential is not configured.
    pub fn without_primary(secondary: MockClient) -> Self {
        Self {
            primary: None,
            ..Self::new(MockClient::new("Gemini"), secondary)
        }
    }

    pub fn primary_client(&self) -> Option<&Arc<MockClient>> {
        self.primary.as_ref()
    }

    pub fn primary_builds(&self) -> usize {
        self.primary_builds.load(Ordering::SeqCst)
    }

    pub fn secondary_builds(&self) -> usize {
        self.secondary_builds.load(Ordering::SeqCst)
    }

    /// Credentials passed to `secondary`, in call order.
    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for MockFactory {
    fn default() -> Self {
        Self::new(MockClient::new("Gemini"), MockClient::new("OpenAI"))
    }
}

impl ClientFactory for MockFactory {
    fn primary(&self) -> Result<Arc<dyn GenerativeClient>> {
        self.primary_builds.fetch_add(1, Ordering::SeqCst);
        match &self.primary {
            Some(client) => Ok(client.clone()),
            None => Err(FlowError::MissingCredential {
                provider: "Gemini".to_string(),
            }),
        }
    }

    fn secondary(&self, credential: &str) -> Result<Arc<dyn GenerativeClient>> {
        self.secondary_builds.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut creds) = self.credentials.lock() {
            creds.push(credential.to_string());
        }
        Ok(self.secondary.clone())
    }
}

// ── RecordingSink ────────────────────────────────────────────────

/// Captures every notification in arrival order.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RunEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RunEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::Log(log) => Some(log),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.logs().into_iter().map(|l| l.message).collect()
    }

    pub fn messages_of(&self, kind: LogKind) -> Vec<String> {
        self.logs()
            .into_iter()
            .filter(|l| l.kind == kind)
            .map(|l| l.message)
            .collect()
    }

    pub fn statuses(&self) -> Vec<RunStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn files(&self) -> Vec<GeneratedFile> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::File(f) => Some(f),
                _ => None,
            })
            .collect()
    }

    /// Node ids marked current, skipping the clears.
    pub fn visited(&self) -> Vec<NodeId> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                RunEvent::Node(n) => n,
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: RunEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: &LogEvent) {
        self.record(RunEvent::Log(event.clone()));
    }

    fn on_status(&self, status: RunStatus) {
        self.record(RunEvent::Status(status));
    }

    fn on_file(&self, file: &GeneratedFile) {
        self.record(RunEvent::File(file.clone()));
    }

    fn on_node(&self, node: Option<&NodeId>) {
        self.record(RunEvent::Node(node.cloned()));
    }

    fn on_running(&self, running: bool) {
        self.record(RunEvent::Running(running));
    }
}

// ── RecordingSpeaker ─────────────────────────────────────────────

/// Speaker that remembers what it was asked to say.
#[derive(Default)]
pub struct RecordingSpeaker {
    spoken: Mutex<Vec<String>>,
}

impl RecordingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Speaker for RecordingSpeaker {
    fn speak<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let Ok(mut spoken) = self.spoken.lock() {
                spoken.push(text.to_string());
            }
            Ok(())
        })
    }
}

// ── Fixtures ─────────────────────────────────────────────────────

/// Write `content` to a file inside a fresh temp dir.
pub fn temp_file(name: &str, content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("write temp file");
    (dir, path)
}

/// Input -> prompt -> output(console), the smallest useful workflow.
pub fn linear_workflow_json(prompt_model: &str) -> serde_json::Value {
    serde_json::json!({
        "workflowName": "Linear",
        "nodes": [
            {"id": "in", "type": "input", "name": "Source",
             "settings": {"inputType": "text", "inputText": "hello world"}},
            {"id": "p", "type": "prompt", "name": "Ask",
             "settings": {"llm": prompt_model, "promptText": "Summarize:"}},
            {"id": "out", "type": "output", "name": "Result",
             "settings": {"outputType": "console"}}
        ],
        "edges": [
            {"id": "e1", "from": "in", "to": "p"},
            {"id": "e2", "from": "p", "to": "out"}
        ]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_client_script_then_default() {
        let client = MockClient::new("Gemini")
            .with_reply("first")
            .with_failure("Gemini API error: 500 - boom")
            .with_default_reply("rest");

        assert_eq!(client.generate_text("a", "m").await.unwrap(), "first");
        assert!(client.generate_text("b", "m").await.is_err());
        assert_eq!(client.generate_text("c", "m").await.unwrap(), "rest");
        assert_eq!(client.prompts(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_factory_counts_builds() {
        let factory = MockFactory::default();
        assert!(factory.primary().is_ok());
        assert!(factory.secondary("sk").is_ok());
        assert_eq!(factory.primary_builds(), 1);
        assert_eq!(factory.secondary_builds(), 1);
        assert_eq!(factory.credentials(), vec!["sk"]);

        let missing = MockFactory::without_primary(MockClient::new("OpenAI"));
        assert!(missing.primary().is_err());
    }

    #[test]
    fn test_recording_sink_filters() {
        let sink = RecordingSink::new();
        sink.on_running(true);
        sink.on_event(&LogEvent::info("hi"));
        sink.on_status(RunStatus::Success);
        assert_eq!(sink.messages(), vec!["hi"]);
        assert_eq!(sink.statuses(), vec![RunStatus::Success]);
        assert_eq!(sink.events().len(), 3);
    }
}
