pub mod context;
pub mod handlers;
pub mod pdf;
pub mod runner;
pub mod scheduler;
pub mod speech;

pub use context::{ExecutionContext, Inputs};
pub use handlers::{dispatch, NodeEnv};
pub use runner::{PipelineRunner, RunReport, RunSummary};
pub use scheduler::{compute_order, schedule, Schedule};
pub use speech::CommandSpeaker;
