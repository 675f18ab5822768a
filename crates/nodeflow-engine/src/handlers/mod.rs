//! One handler per node type, dispatched by an exhaustive match on the
//! node's settings.

mod input;
mod iteration;
mod output;
mod process;
mod prompt;

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::graph::Node;
use nodeflow_core::settings::NodeSettings;
use nodeflow_core::traits::{GenerativeClient, Speaker};
use nodeflow_core::types::Artifact;

use crate::context::{ExecutionContext, Inputs};

pub use output::file_stem;

/// Collaborators available to a handler for the duration of one run.
pub struct NodeEnv<'r> {
    pub primary: Option<&'r dyn GenerativeClient>,
    pub secondary: Option<&'r dyn GenerativeClient>,
    pub speaker: &'r dyn Speaker,
    pub http: &'r reqwest::Client,
}

impl<'r> NodeEnv<'r> {
    fn primary(&self) -> Result<&'r dyn GenerativeClient> {
        self.primary.ok_or_else(|| FlowError::MissingCredential {
            provider: "Gemini".to_string(),
        })
    }

    fn secondary(&self) -> Result<&'r dyn GenerativeClient> {
        self.secondary.ok_or_else(|| FlowError::MissingCredential {
            provider: "OpenAI".to_string(),
        })
    }
}

/// Run `node` against its gathered inputs and return the artifact to store.
pub async fn dispatch(
    node: &Node,
    inputs: &Inputs,
    env: &NodeEnv<'_>,
    ctx: &mut ExecutionContext,
) -> Result<Artifact> {
    match &node.settings {
        NodeSettings::Input(settings) => input::run(node, settings, inputs, env, ctx).await,
        NodeSettings::Prompt(settings) => prompt::run(node, settings, inputs, env, ctx).await,
        NodeSettings::Process(settings) => process::run(node, settings, inputs, env, ctx).await,
        NodeSettings::Output(settings) => output::run(node, settings, inputs, env, ctx).await,
        NodeSettings::Iteration(_) => Ok(iteration::run(node, inputs, ctx)),
    }
}

/// First 100 characters, for log previews.
fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}
