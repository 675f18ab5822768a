pub mod config;
pub mod error;
pub mod event;
pub mod graph;
pub mod settings;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{FlowError, Result};
pub use event::{EventBus, RunEvent};
pub use graph::{Edge, Graph, Node, NodeId, PolicyViolation};
pub use settings::*;
pub use types::*;
