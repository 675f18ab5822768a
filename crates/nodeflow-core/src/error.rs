use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    // Graph errors
    #[error(
        "Cycle detected or nodes are unreachable. The following nodes will not be executed: {}",
        .nodes.join(", ")
    )]
    CycleDetected { nodes: Vec<String> },

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("{node_type} node '{node}' cannot have more than {limit} inputs")]
    InboundLimit {
        node: String,
        node_type: String,
        limit: usize,
    },

    // Precondition errors
    #[error("{provider} API key is missing.")]
    MissingCredential { provider: String },

    // Node execution errors
    #[error("Error at node {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("{0}")]
    Input(String),

    // Provider errors
    #[error("{0}")]
    ProviderRequest(String),

    #[error("Provider response parse error: {0}")]
    ProviderParse(String),

    #[error("{provider} does not support {capability}")]
    UnsupportedCapability {
        provider: String,
        capability: String,
    },

    // Output errors
    #[error("Render error: {0}")]
    Render(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FlowError {
    /// Whether this error prevents a run from starting at all.
    pub fn is_precondition(&self) -> bool {
        matches!(self, FlowError::MissingCredential { .. })
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
