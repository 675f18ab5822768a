use crate::graph::NodeId;
use crate::traits::EventSink;
use crate::types::{GeneratedFile, LogEvent, RunStatus};

/// Everything a run reports, as one broadcastable value.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Log(LogEvent),
    Status(RunStatus),
    File(GeneratedFile),
    Node(Option<NodeId>),
    Running(bool),
}

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: RunEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for EventBus {
    fn on_event(&self, event: &LogEvent) {
        self.publish(RunEvent::Log(event.clone()));
    }

    fn on_status(&self, status: RunStatus) {
        self.publish(RunEvent::Status(status));
    }

    fn on_file(&self, file: &GeneratedFile) {
        self.publish(RunEvent::File(file.clone()));
    }

    fn on_node(&self, node: Option<&NodeId>) {
        self.publish(RunEvent::Node(node.cloned()));
    }

    fn on_running(&self, running: bool) {
        self.publish(RunEvent::Running(running));
    }
}
