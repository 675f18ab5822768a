use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use nodeflow_core::graph::{Graph, Node, NodeId};
use nodeflow_core::traits::EventSink;
use nodeflow_core::types::{Artifact, GeneratedFile, LogEvent, LogKind, RunStatus};

/// Texts gathered from a node's upstream artifacts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    texts: Vec<String>,
    inbound: usize,
}

impl Inputs {
    pub fn new(texts: Vec<String>, inbound: usize) -> Self {
        Self { texts, inbound }
    }

    /// Non-empty upstream texts, in edge declaration order.
    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    /// Number of inbound edges, whether or not their source produced anything.
    pub fn inbound(&self) -> usize {
        self.inbound
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Newline-joined and trimmed.
    pub fn joined(&self) -> String {
        self.texts.join("\n").trim().to_string()
    }

    /// The text `node` consumes: joined and trimmed for fan-in types, verbatim otherwise.
    pub fn aggregate(&self, node: &Node) -> String {
        let node_type = node.node_type();
        if node_type.accepts_multiple_inputs() {
            return self.joined();
        }
        match self.texts.as_slice() {
            [] => String::new(),
            [only] => only.clone(),
            many => {
                warn!(
                    node_id = %node.id,
                    node_type = %node_type,
                    inputs = many.len(),
                    "Single-input node has several inputs, joining them"
                );
                many.join("\n")
            }
        }
    }
}

/// Per-run state: stored artifacts, the event log, generated files, status.
///
/// Every change is mirrored to the run's event sink as it happens.
pub struct ExecutionContext {
    run_id: String,
    sink: Arc<dyn EventSink>,
    artifacts: HashMap<NodeId, Artifact>,
    events: Vec<LogEvent>,
    files: Vec<GeneratedFile>,
    status: RunStatus,
}

impl ExecutionContext {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            sink,
            artifacts: HashMap::new(),
            events: Vec::new(),
            files: Vec::new(),
            status: RunStatus::Idle,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log(&mut self, kind: LogKind, message: impl Into<String>) {
        let event = LogEvent::new(kind, message);
        debug!(run_id = %self.run_id, kind = kind.as_str(), "{}", event.message);
        self.sink.on_event(&event);
        self.events.push(event);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(LogKind::Info, message);
    }

    pub fn data(&mut self, message: impl Into<String>) {
        self.log(LogKind::Data, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.log(LogKind::Success, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(LogKind::Error, message);
    }

    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
        self.sink.on_status(status);
    }

    pub fn set_running(&self, running: bool) {
        self.sink.on_running(running);
    }

    pub fn set_current(&self, node: Option<&NodeId>) {
        self.sink.on_node(node);
    }

    pub fn add_file(&mut self, file: GeneratedFile) {
        self.sink.on_file(&file);
        self.files.push(file);
    }

    pub fn store(&mut self, node: NodeId, artifact: Artifact) {
        self.artifacts.insert(node, artifact);
    }

    /// Collect upstream texts for `node`, skipping sources with no stored
    /// artifact or an empty one.
    pub fn gather(&self, graph: &Graph, node: &NodeId) -> Inputs {
        let mut inbound = 0;
        let texts = graph
            .incoming(node)
            .inspect(|_| inbound += 1)
            .filter_map(|edge| self.artifacts.get(&edge.from))
            .map(|artifact| artifact.as_text())
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .collect();
        Inputs::new(texts, inbound)
    }

    pub(crate) fn into_parts(
        self,
    ) -> (String, HashMap<NodeId, Artifact>, Vec<LogEvent>, Vec<GeneratedFile>, RunStatus) {
        (self.run_id, self.artifacts, self.events, self.files, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_core::graph::Edge;
    use nodeflow_core::settings::{OutputAction, OutputKind, ProcessMode};
    use nodeflow_test_utils::RecordingSink;

    fn fan_in() -> Graph {
        Graph::new(
            vec![
                Node::input_text("a", "A", "A"),
                Node::input_text("b", "B", "B"),
                Node::input_text("c", "C", "C"),
                Node::process("p", "P", ProcessMode::Merge),
            ],
            vec![Edge::new("a", "p"), Edge::new("b", "p"), Edge::new("c", "p")],
        )
    }

    fn context() -> ExecutionContext {
        ExecutionContext::new(Arc::new(RecordingSink::new()))
    }

    #[test]
    fn test_fan_in_joins_in_edge_order() {
        let graph = fan_in();
        let mut ctx = context();
        ctx.store("a".into(), "A".into());
        ctx.store("b".into(), "B".into());
        ctx.store("c".into(), "C".into());

        let inputs = ctx.gather(&graph, &"p".into());
        assert_eq!(inputs.inbound(), 3);
        assert_eq!(inputs.aggregate(&graph.nodes[3]), "A\nB\nC");
    }

    #[test]
    fn test_missing_and_empty_sources_skipped() {
        let graph = fan_in();
        let mut ctx = context();
        ctx.store("a".into(), Artifact::empty());
        ctx.store("c".into(), "  C  ".into());

        let inputs = ctx.gather(&graph, &"p".into());
        assert_eq!(inputs.texts(), ["  C  ".to_string()]);
        assert_eq!(inputs.inbound(), 3);
        assert_eq!(inputs.joined(), "C");
    }

    #[test]
    fn test_file_artifact_contributes_its_text() {
        let graph = Graph::new(
            vec![
                Node::output("pdf", "Pdf", OutputKind::Pdf, OutputAction::Download),
                Node::output("o", "O", OutputKind::Console, OutputAction::Download),
            ],
            vec![Edge::new("pdf", "o")],
        );
        let mut ctx = context();
        ctx.store(
            "pdf".into(),
            Artifact::File {
                name: "Pdf_1.pdf".into(),
                text: "body".into(),
            },
        );
        assert_eq!(ctx.gather(&graph, &"o".into()).joined(), "body");
    }

    #[test]
    fn test_single_input_kept_verbatim() {
        let node = Node::prompt("p", "P", "gemini-2.5-flash");
        let inputs = Inputs::new(vec!["  padded \n".into()], 1);
        assert_eq!(inputs.aggregate(&node), "  padded \n");
    }

    #[test]
    fn test_single_input_violation_joins_untrimmed() {
        let node = Node::iteration("i", "I");
        let inputs = Inputs::new(vec![" x".into(), "y ".into()], 2);
        assert_eq!(inputs.aggregate(&node), " x\ny ");
    }

    #[test]
    fn test_log_mirrors_to_sink() {
        let sink = Arc::new(RecordingSink::new());
        let mut ctx = ExecutionContext::new(sink.clone());
        ctx.info("one");
        ctx.success("two");
        ctx.set_status(RunStatus::Success);

        assert_eq!(sink.messages(), vec!["one", "two"]);
        assert_eq!(sink.statuses(), vec![RunStatus::Success]);
        let (_, _, events, _, status) = ctx.into_parts();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, LogKind::Success);
        assert_eq!(status, RunStatus::Success);
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(context().run_id(), context().run_id());
    }
}
