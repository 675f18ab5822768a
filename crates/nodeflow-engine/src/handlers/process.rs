use tracing::info;

use nodeflow_core::error::Result;
use nodeflow_core::graph::Node;
use nodeflow_core::settings::ProcessSettings;
use nodeflow_core::types::Artifact;

use super::{preview, NodeEnv};
use crate::context::{ExecutionContext, Inputs};

pub(super) async fn run(
    node: &Node,
    settings: &ProcessSettings,
    inputs: &Inputs,
    env: &NodeEnv<'_>,
    ctx: &mut ExecutionContext,
) -> Result<Artifact> {
    if inputs.is_empty() {
        ctx.info(format!("Process node {} has no input. Skipping.", node.name));
        return Ok(Artifact::empty());
    }

    let count = inputs.texts().len();
    ctx.data(format!(
        "Processing {} inputs with mode: {}",
        count,
        settings.mode.as_str()
    ));

    let client = env.primary()?;
    let prompt = settings.mode.build_prompt(inputs.texts());
    info!(node_id = %node.id, mode = settings.mode.as_str(), inputs = count, "Processing inputs");

    let reply = client.generate_text(&prompt, "").await?;
    ctx.success(format!("Process result: \"{}...\"", preview(&reply)));
    Ok(Artifact::Text(reply))
}
