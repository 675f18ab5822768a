use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::graph::{Graph, NodeId};
use nodeflow_core::traits::{
    ClientFactory, CredentialProvider, EventSink, GenerativeClient, NoopSink, Speaker,
};
use nodeflow_core::types::{Artifact, GeneratedFile, LogEvent, RunStatus};

use crate::context::ExecutionContext;
use crate::handlers::{self, NodeEnv};
use crate::scheduler::compute_order;
use crate::speech::CommandSpeaker;

/// Everything a finished run leaves behind.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub status: RunStatus,
    /// Execution order; empty when scheduling failed.
    pub order: Vec<NodeId>,
    /// Artifacts of the nodes that completed.
    pub artifacts: HashMap<NodeId, Artifact>,
    pub events: Vec<LogEvent>,
    pub files: Vec<GeneratedFile>,
    /// The node whose handler failed, if any.
    pub failed_node: Option<NodeId>,
    /// Why the run aborted, if it did.
    pub error: Option<FlowError>,
    pub elapsed_ms: u64,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn artifact(&self, node: &NodeId) -> Option<&Artifact> {
        self.artifacts.get(node)
    }

    /// Serializable view of the report, without artifacts or file contents.
    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            run_id: &self.run_id,
            status: self.status,
            order: &self.order,
            failed_node: self.failed_node.as_ref(),
            error: self.error.as_ref().map(|e| e.to_string()),
            elapsed_ms: self.elapsed_ms,
            events: &self.events,
            files: self.files.iter().map(|f| f.name.as_str()).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: &'a str,
    pub status: RunStatus,
    pub order: &'a [NodeId],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_node: Option<&'a NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub elapsed_ms: u64,
    pub events: &'a [LogEvent],
    pub files: Vec<&'a str>,
}

/// Why `execute` stopped early.
struct Abort {
    node: Option<NodeId>,
    error: FlowError,
}

impl From<FlowError> for Abort {
    fn from(error: FlowError) -> Self {
        Self { node: None, error }
    }
}

/// Runs graphs: schedules them, dispatches each node to its handler, and
/// aborts on the first failure.
///
/// A runner holds no per-run state, so one instance can serve concurrent
/// runs of different graphs.
pub struct PipelineRunner {
    factory: Arc<dyn ClientFactory>,
    speaker: Arc<dyn Speaker>,
    sink: Arc<dyn EventSink>,
    http: reqwest::Client,
}

impl PipelineRunner {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            speaker: Arc::new(CommandSpeaker::default()),
            sink: Arc::new(NoopSink),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_speaker(mut self, speaker: Arc<dyn Speaker>) -> Self {
        self.speaker = speaker;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Execute `graph` to completion or first failure.
    ///
    /// Returns `MissingCredential` without starting when a prompt node selects
    /// the secondary provider and `secondary` has no credential; the caller
    /// obtains one and runs again. Every other failure is reported through
    /// the returned `RunReport` with status `error`.
    pub async fn run(&self, graph: Graph, secondary: &dyn CredentialProvider) -> Result<RunReport> {
        let secondary_key = if graph.needs_secondary() {
            Some(
                secondary
                    .credential()
                    .ok_or_else(|| FlowError::MissingCredential {
                        provider: "OpenAI".to_string(),
                    })?,
            )
        } else {
            None
        };

        let start = Instant::now();
        let mut ctx = ExecutionContext::new(self.sink.clone());
        ctx.set_running(true);
        ctx.set_current(None);
        ctx.set_status(RunStatus::Running);
        info!(
            run_id = %ctx.run_id(),
            workflow = graph.name.as_deref().unwrap_or("untitled"),
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "Pipeline run started"
        );

        let mut order = Vec::new();
        let outcome = self
            .execute(&graph, secondary_key.as_deref(), &mut ctx, &mut order)
            .await;

        let (failed_node, error) = match outcome {
            Ok(()) => {
                ctx.info("Pipeline execution finished.");
                ctx.set_status(RunStatus::Success);
                (None, None)
            }
            Err(abort) => {
                error!(run_id = %ctx.run_id(), error = %abort.error, "Pipeline run aborted");
                ctx.error(format!("Pipeline execution aborted: {}", abort.error));
                ctx.set_status(RunStatus::Error);
                (abort.node, Some(abort.error))
            }
        };

        ctx.set_running(false);
        ctx.set_current(None);

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let (run_id, artifacts, events, files, status) = ctx.into_parts();
        info!(run_id = %run_id, status = %status, elapsed_ms, "Pipeline run complete");

        Ok(RunReport {
            run_id,
            status,
            order,
            artifacts,
            events,
            files,
            failed_node,
            error,
            elapsed_ms,
        })
    }

    async fn execute(
        &self,
        graph: &Graph,
        secondary_key: Option<&str>,
        ctx: &mut ExecutionContext,
        order_out: &mut Vec<NodeId>,
    ) -> std::result::Result<(), Abort> {
        let primary: Option<Arc<dyn GenerativeClient>> = if graph.needs_primary() {
            Some(self.factory.primary()?)
        } else {
            None
        };

        let order = compute_order(graph)?;
        order_out.extend(order.iter().map(|n| n.id.clone()));

        for violation in graph.policy_violations() {
            warn!(node_id = %violation.node, "{}", violation);
        }

        let secondary = match secondary_key {
            Some(key) => Some(self.factory.secondary(key)?),
            None => None,
        };

        let env = NodeEnv {
            primary: primary.as_deref(),
            secondary: secondary.as_deref(),
            speaker: self.speaker.as_ref(),
            http: &self.http,
        };

        ctx.info(format!(
            "Pipeline execution started. Order: {}",
            order
                .iter()
                .map(|n| n.name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ")
        ));

        for node in order {
            ctx.set_current(Some(&node.id));
            ctx.info(format!("Executing node: {} ({})", node.name, node.node_type()));
            info!(node_id = %node.id, node_name = %node.name, node_type = %node.node_type(), "Executing node");

            let inputs = ctx.gather(graph, &node.id);
            let node_start = Instant::now();
            match handlers::dispatch(node, &inputs, &env, ctx).await {
                Ok(artifact) => {
                    ctx.store(node.id.clone(), artifact);
                    info!(
                        node_id = %node.id,
                        elapsed_ms = node_start.elapsed().as_millis() as u64,
                        "Node complete"
                    );
                }
                Err(e) => {
                    error!(node_id = %node.id, error = %e, "Node failed");
                    let failure = FlowError::NodeExecution {
                        node: node.name.clone(),
                        message: e.to_string(),
                    };
                    ctx.error(failure.to_string());
                    return Err(Abort {
                        node: Some(node.id.clone()),
                        error: e,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_core::graph::{Edge, Node};
    use nodeflow_core::settings::{OutputAction, OutputKind, ProcessMode};
    use nodeflow_core::traits::SuppliedCredential;
    use nodeflow_core::types::LogKind;
    use nodeflow_core::event::RunEvent;
    use nodeflow_test_utils::{MockClient, MockFactory, RecordingSink, RecordingSpeaker};

    struct Harness {
        factory: Arc<MockFactory>,
        sink: Arc<RecordingSink>,
        speaker: Arc<RecordingSpeaker>,
        runner: PipelineRunner,
    }

    fn harness(factory: MockFactory) -> Harness {
        let factory = Arc::new(factory);
        let sink = Arc::new(RecordingSink::new());
        let speaker = Arc::new(RecordingSpeaker::new());
        let runner = PipelineRunner::new(factory.clone())
            .with_sink(sink.clone())
            .with_speaker(speaker.clone())
            .with_http_client(reqwest::Client::new());
        Harness {
            factory,
            sink,
            speaker,
            runner,
        }
    }

    fn linear() -> Graph {
        Graph::new(
            vec![
                Node::input_text("a", "A", "hello"),
                Node::prompt("b", "B", "gemini-2.5-flash"),
                Node::output("c", "C", OutputKind::Console, OutputAction::Download),
            ],
            vec![Edge::new("a", "b"), Edge::new("b", "c")],
        )
    }

    fn ids(order: &[NodeId]) -> Vec<&str> {
        order.iter().map(|id| id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_linear_pipeline() {
        let h = harness(MockFactory::new(
            MockClient::new("Gemini").with_reply("Greeting acknowledged."),
            MockClient::new("OpenAI"),
        ));

        let report = h.runner.run(linear(), &SuppliedCredential::none()).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(ids(&report.order), vec!["a", "b", "c"]);
        assert_eq!(report.artifact(&"a".into()).unwrap().as_text(), "hello");
        assert_eq!(
            report.artifact(&"c".into()).unwrap().as_text(),
            "Greeting acknowledged."
        );
        assert_eq!(h.factory.primary_client().unwrap().prompts(), vec!["hello"]);

        let messages = h.sink.messages();
        assert_eq!(messages.first().unwrap(), "Pipeline execution started. Order: A -> B -> C");
        assert_eq!(messages.last().unwrap(), "Pipeline execution finished.");
        assert!(messages.contains(&"Executing node: B (prompt)".to_string()));
        let data = h.sink.messages_of(LogKind::Data);
        assert_eq!(data.last().unwrap(), "Greeting acknowledged.");
        assert_eq!(h.sink.statuses(), vec![RunStatus::Running, RunStatus::Success]);
        assert_eq!(report.events.len(), messages.len());
    }

    #[tokio::test]
    async fn test_running_flag_and_current_node() {
        let h = harness(MockFactory::default());
        h.runner.run(linear(), &SuppliedCredential::none()).await.unwrap();

        let events = h.sink.events();
        assert_eq!(events.first(), Some(&RunEvent::Running(true)));
        assert_eq!(
            &events[events.len() - 2..],
            &[RunEvent::Running(false), RunEvent::Node(None)]
        );
        let visited: Vec<String> = h.sink.visited().iter().map(|id| id.to_string()).collect();
        assert_eq!(visited, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_abort_on_error() {
        let h = harness(MockFactory::new(
            MockClient::new("Gemini").with_failure("Gemini API error: 500 - Internal error"),
            MockClient::new("OpenAI"),
        ));

        let report = h.runner.run(linear(), &SuppliedCredential::none()).await.unwrap();

        assert_eq!(report.status, RunStatus::Error);
        assert_eq!(report.failed_node, Some(NodeId::from("b")));
        assert!(report.artifact(&"c".into()).is_none());
        assert!(report.artifact(&"a".into()).is_some());

        let messages = h.sink.messages();
        assert!(!messages.iter().any(|m| m.contains("Executing node: C")));
        assert!(!messages.iter().any(|m| m.starts_with("Final Output")));
        assert_eq!(
            h.sink.messages_of(LogKind::Error),
            vec![
                "Error at node B: Gemini API error: 500 - Internal error",
                "Pipeline execution aborted: Gemini API error: 500 - Internal error",
            ]
        );
        assert_eq!(h.sink.statuses().last(), Some(&RunStatus::Error));
        assert_eq!(h.sink.events().last(), Some(&RunEvent::Node(None)));

        let summary = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(summary["status"], "error");
        assert_eq!(summary["failed_node"], "b");
        assert_eq!(summary["order"], serde_json::json!(["a", "b", "c"]));
        assert_eq!(summary["error"], "Gemini API error: 500 - Internal error");
        assert_eq!(summary["events"][0]["type"], "info");
    }

    #[tokio::test]
    async fn test_summary_omits_absent_failure() {
        let h = harness(MockFactory::default());
        let report = h.runner.run(linear(), &SuppliedCredential::none()).await.unwrap();

        let summary = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(summary["status"], "success");
        assert!(summary.get("failed_node").is_none());
        assert!(summary.get("error").is_none());
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_any_node() {
        let h = harness(MockFactory::default());
        let graph = Graph::new(
            vec![
                Node::iteration("a", "A"),
                Node::iteration("b", "B"),
                Node::input_text("c", "C", "alone"),
            ],
            vec![Edge::new("a", "b"), Edge::new("b", "a")],
        );

        let report = h.runner.run(graph, &SuppliedCredential::none()).await.unwrap();

        assert_eq!(report.status, RunStatus::Error);
        assert!(report.order.is_empty());
        assert!(report.artifacts.is_empty());
        assert!(matches!(report.error, Some(FlowError::CycleDetected { .. })));
        assert_eq!(
            h.sink.messages(),
            vec![
                "Pipeline execution aborted: Cycle detected or nodes are unreachable. \
                 The following nodes will not be executed: A, B"
            ]
        );
        assert_eq!(h.sink.events().last(), Some(&RunEvent::Node(None)));
    }

    #[tokio::test]
    async fn test_missing_secondary_credential_prevents_start() {
        let h = harness(MockFactory::default());
        let graph = Graph::new(vec![Node::prompt("p", "Ask", "gpt-4")], vec![]);

        let err = h
            .runner
            .run(graph, &SuppliedCredential::none())
            .await
            .unwrap_err();

        assert!(err.is_precondition());
        assert_eq!(err.to_string(), "OpenAI API key is missing.");
        assert!(h.sink.events().is_empty());
        assert_eq!(h.factory.secondary_builds(), 0);
    }

    #[tokio::test]
    async fn test_secondary_credential_used_per_run() {
        let h = harness(MockFactory::new(
            MockClient::new("Gemini"),
            MockClient::new("OpenAI").with_reply("from gpt"),
        ));
        let graph = Graph::new(
            vec![
                Node::input_text("i", "In", "question"),
                Node::prompt("p", "Ask", "gpt-4"),
            ],
            vec![Edge::new("i", "p")],
        );

        let report = h
            .runner
            .run(graph, &SuppliedCredential::new("sk-run"))
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.artifact(&"p".into()).unwrap().as_text(), "from gpt");
        assert_eq!(h.factory.credentials(), vec!["sk-run"]);
        // Nothing in this graph needs the primary provider.
        assert_eq!(h.factory.primary_builds(), 0);
    }

    #[tokio::test]
    async fn test_missing_primary_credential_aborts_before_nodes() {
        let h = harness(MockFactory::without_primary(MockClient::new("OpenAI")));

        let report = h.runner.run(linear(), &SuppliedCredential::none()).await.unwrap();

        assert_eq!(report.status, RunStatus::Error);
        assert!(report.artifacts.is_empty());
        assert_eq!(
            h.sink.messages(),
            vec!["Pipeline execution aborted: Gemini API key is missing."]
        );
    }

    #[tokio::test]
    async fn test_graph_without_generative_nodes_needs_no_clients() {
        let h = harness(MockFactory::without_primary(MockClient::new("OpenAI")));
        let graph = Graph::new(
            vec![
                Node::input_text("i", "In", "text"),
                Node::output("o", "Out", OutputKind::Audio, OutputAction::Download),
            ],
            vec![Edge::new("i", "o")],
        );

        let report = h.runner.run(graph, &SuppliedCredential::none()).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(h.speaker.spoken(), vec!["text"]);
        assert_eq!(report.files.len(), 1);
        assert_eq!(h.factory.primary_builds(), 0);
    }

    #[tokio::test]
    async fn test_fan_in_process_diff() {
        let h = harness(MockFactory::new(
            MockClient::new("Gemini").with_reply("- differs"),
            MockClient::new("OpenAI"),
        ));
        let graph = Graph::new(
            vec![
                Node::input_text("x", "X", "alpha"),
                Node::input_text("y", "Y", "beta"),
                Node::process("d", "Diff", ProcessMode::Diff),
            ],
            vec![Edge::new("x", "d"), Edge::new("y", "d")],
        );

        let report = h.runner.run(graph, &SuppliedCredential::none()).await.unwrap();

        assert!(report.succeeded());
        let prompts = h.factory.primary_client().unwrap().prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("alpha"));
        assert!(prompts[0].contains("beta"));
        assert!(prompts[0].contains("differences"));
    }

    #[tokio::test]
    async fn test_pdf_output_registers_file() {
        let h = harness(MockFactory::default());
        let graph = Graph::new(
            vec![
                Node::input_text("i", "Body", "Report body"),
                Node::output("r", "Report", OutputKind::Pdf, OutputAction::Download),
            ],
            vec![Edge::new("i", "r")],
        );

        let report = h.runner.run(graph, &SuppliedCredential::none()).await.unwrap();

        assert_eq!(report.files.len(), 1);
        let name = &report.files[0].name;
        let stamp = name
            .strip_prefix("Report_")
            .and_then(|s| s.strip_suffix(".pdf"))
            .unwrap();
        assert!(stamp.parse::<i64>().is_ok());
        assert_eq!(h.sink.files(), report.files);
    }

    #[tokio::test]
    async fn test_output_without_input_does_not_abort() {
        let h = harness(MockFactory::default());
        let graph = Graph::new(
            vec![
                Node::input_text("i", "Empty", ""),
                Node::output("o", "Out", OutputKind::Console, OutputAction::Download),
            ],
            vec![Edge::new("i", "o")],
        );

        let report = h.runner.run(graph, &SuppliedCredential::none()).await.unwrap();

        assert!(report.succeeded());
        assert_eq!(
            h.sink.messages_of(LogKind::Error),
            vec!["No input data received."]
        );
    }

    #[tokio::test]
    async fn test_runs_are_independent() {
        let h = harness(MockFactory::default());
        let first = h.runner.run(linear(), &SuppliedCredential::none()).await.unwrap();
        let second = h.runner.run(linear(), &SuppliedCredential::none()).await.unwrap();

        assert_ne!(first.run_id, second.run_id);
        assert_eq!(first.events.len(), second.events.len());
    }
}
