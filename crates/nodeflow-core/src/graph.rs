use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{FlowError, Result};
use crate::settings::*;

/// Unique node identifier.
///
/// Editors commonly use millisecond timestamps as ids, so both JSON strings
/// and integers are accepted and normalized to a string.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Int(i64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => NodeId(s),
            RawId::Int(n) => NodeId(n.to_string()),
        })
    }
}

/// A processing step in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNode", into = "RawNode")]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub settings: NodeSettings,
}

#[derive(Serialize, Deserialize)]
struct RawNode {
    id: NodeId,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default)]
    name: String,
    #[serde(default)]
    settings: serde_json::Value,
}

impl TryFrom<RawNode> for Node {
    type Error = serde_json::Error;

    fn try_from(raw: RawNode) -> std::result::Result<Self, Self::Error> {
        let settings = NodeSettings::from_value(raw.node_type, raw.settings)?;
        let name = if raw.name.is_empty() {
            default_name(raw.node_type)
        } else {
            raw.name
        };
        Ok(Node {
            id: raw.id,
            name,
            settings,
        })
    }
}

impl From<Node> for RawNode {
    fn from(node: Node) -> Self {
        RawNode {
            node_type: node.node_type(),
            settings: node.settings.to_value(),
            id: node.id,
            name: node.name,
        }
    }
}

fn default_name(node_type: NodeType) -> String {
    let s = node_type.as_str();
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl Node {
    /// Create a node of the given type with default settings.
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            settings: NodeSettings::default_for(node_type),
        }
    }

    /// An input node producing literal text.
    pub fn input_text(id: impl Into<NodeId>, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Input).with_settings(NodeSettings::Input(InputSettings {
            mode: InputMode::Text,
            text: text.into(),
            url: String::new(),
        }))
    }

    /// An input node fetching a URL.
    pub fn input_url(id: impl Into<NodeId>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Input).with_settings(NodeSettings::Input(InputSettings {
            mode: InputMode::Url,
            text: String::new(),
            url: url.into(),
        }))
    }

    /// A prompt node targeting `provider` (a model name such as `gpt-4`).
    pub fn prompt(id: impl Into<NodeId>, name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Prompt).with_settings(NodeSettings::Prompt(PromptSettings {
            provider: provider.into(),
            ..PromptSettings::default()
        }))
    }

    pub fn process(id: impl Into<NodeId>, name: impl Into<String>, mode: ProcessMode) -> Self {
        Self::new(id, name, NodeType::Process)
            .with_settings(NodeSettings::Process(ProcessSettings { mode }))
    }

    pub fn output(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        kind: OutputKind,
        action: OutputAction,
    ) -> Self {
        Self::new(id, name, NodeType::Output)
            .with_settings(NodeSettings::Output(OutputSettings { kind, action }))
    }

    pub fn iteration(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::new(id, name, NodeType::Iteration)
    }

    /// Replace the settings.
    pub fn with_settings(mut self, settings: NodeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the default prompt text. No-op for non-prompt nodes.
    pub fn with_prompt_text(mut self, text: impl Into<String>) -> Self {
        if let NodeSettings::Prompt(ref mut s) = self.settings {
            s.prompt_text = text.into();
        }
        self
    }

    pub fn node_type(&self) -> NodeType {
        self.settings.node_type()
    }
}

/// A data-flow edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEdge")]
pub struct Edge {
    pub id: String,
    pub from: NodeId,
    pub to: NodeId,
}

#[derive(Deserialize)]
struct RawEdge {
    #[serde(default)]
    id: Option<String>,
    from: NodeId,
    to: NodeId,
}

impl From<RawEdge> for Edge {
    fn from(raw: RawEdge) -> Self {
        match raw.id {
            Some(id) if !id.is_empty() => Edge {
                id,
                from: raw.from,
                to: raw.to,
            },
            _ => Edge::new(raw.from, raw.to),
        }
    }
}

impl Edge {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        let from = from.into();
        let to = to.into();
        Self {
            id: format!("edge-{}-{}", from, to),
            from,
            to,
        }
    }
}

/// A nodeflow graph snapshot.
///
/// Extra editor fields (positions, colors, comments, pan/zoom) are ignored
/// when a saved workflow document is deserialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default, rename = "workflowName", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// A node whose inbound-edge count exceeds what its type allows.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyViolation {
    pub node: NodeId,
    pub node_name: String,
    pub node_type: NodeType,
    pub inbound: usize,
    pub limit: usize,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} node '{}' has {} inputs (at most {} allowed)",
            self.node_type, self.node_name, self.inbound, self.limit
        )
    }
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            name: None,
            nodes,
            edges,
        }
    }

    /// Parse a graph snapshot or saved workflow document from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    /// Check structural invariants: node ids must be unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(&node.id) {
                return Err(FlowError::DuplicateNode(node.id.to_string()));
            }
        }
        Ok(())
    }

    /// Edges pointing at `id`, in declaration order.
    pub fn incoming<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.to == id)
    }

    /// Add an edge following the editor's linking rules.
    ///
    /// Duplicate edges are ignored. Single-input targets have their existing
    /// inbound edge replaced; process targets refuse a fourth input.
    pub fn connect(&mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Result<()> {
        let from = from.into();
        let to = to.into();

        if self.node(&from).is_none() {
            return Err(FlowError::NodeNotFound(from.to_string()));
        }
        let target = self
            .node(&to)
            .ok_or_else(|| FlowError::NodeNotFound(to.to_string()))?;
        let target_type = target.node_type();
        let target_name = target.name.clone();

        if self.edges.iter().any(|e| e.from == from && e.to == to) {
            return Ok(());
        }

        if target_type.replaces_inbound() {
            self.edges.retain(|e| e.to != to);
        } else if let Some(limit) = target_type.max_inbound() {
            if self.incoming(&to).count() >= limit {
                return Err(FlowError::InboundLimit {
                    node: target_name,
                    node_type: target_type.to_string(),
                    limit,
                });
            }
        }

        self.edges.push(Edge::new(from, to));
        Ok(())
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        let idx = self.nodes.iter().position(|n| &n.id == id)?;
        self.edges.retain(|e| &e.from != id && &e.to != id);
        Some(self.nodes.remove(idx))
    }

    /// Remove an edge by id.
    pub fn remove_edge(&mut self, edge_id: &str) -> Option<Edge> {
        let idx = self.edges.iter().position(|e| e.id == edge_id)?;
        Some(self.edges.remove(idx))
    }

    /// Nodes whose inbound-edge count exceeds their type's limit.
    pub fn policy_violations(&self) -> Vec<PolicyViolation> {
        self.nodes
            .iter()
            .filter_map(|node| {
                let limit = node.node_type().max_inbound()?;
                let inbound = self.incoming(&node.id).count();
                (inbound > limit).then(|| PolicyViolation {
                    node: node.id.clone(),
                    node_name: node.name.clone(),
                    node_type: node.node_type(),
                    inbound,
                    limit,
                })
            })
            .collect()
    }

    /// Whether any prompt node selects the secondary provider.
    pub fn needs_secondary(&self) -> bool {
        self.nodes.iter().any(|n| match &n.settings {
            NodeSettings::Prompt(s) => s.uses_secondary(),
            _ => false,
        })
    }

    /// Whether any node calls the primary provider.
    pub fn needs_primary(&self) -> bool {
        self.nodes.iter().any(|n| match &n.settings {
            NodeSettings::Prompt(s) => !s.uses_secondary(),
            NodeSettings::Process(_) => true,
            NodeSettings::Output(s) => s.kind == OutputKind::Image,
            NodeSettings::Input(_) | NodeSettings::Iteration(_) => false,
        })
    }
}
