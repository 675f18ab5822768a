use tracing::info;

use nodeflow_core::error::Result;
use nodeflow_core::graph::Node;
use nodeflow_core::settings::{PromptSettings, ProviderChoice, PRIMARY_MODEL, SECONDARY_MODEL};
use nodeflow_core::types::Artifact;

use super::{preview, NodeEnv};
use crate::context::{ExecutionContext, Inputs};

pub(super) async fn run(
    node: &Node,
    settings: &PromptSettings,
    inputs: &Inputs,
    env: &NodeEnv<'_>,
    ctx: &mut ExecutionContext,
) -> Result<Artifact> {
    let upstream = inputs.aggregate(node);
    let prompt = if upstream.is_empty() {
        settings.prompt_text.clone()
    } else {
        upstream
    };
    let model = if settings.provider.is_empty() {
        PRIMARY_MODEL
    } else {
        settings.provider.as_str()
    };
    ctx.data(format!("Using prompt with {}: \"{}...\"", model, preview(&prompt)));

    let (client, hint) = match settings.provider_choice() {
        ProviderChoice::Secondary => (env.secondary()?, SECONDARY_MODEL),
        ProviderChoice::Primary => (env.primary()?, model),
        ProviderChoice::Fallback(requested) => {
            let client = env.primary()?;
            ctx.info(format!(
                "Model {} not implemented. Falling back to {}.",
                requested,
                client.name()
            ));
            (client, "")
        }
    };

    info!(node_id = %node.id, provider = client.name(), model = hint, "Sending prompt");
    let reply = client.generate_text(&prompt, hint).await?;
    ctx.success(format!("{} response: \"{}...\"", client.name(), preview(&reply)));
    Ok(Artifact::Text(reply))
}
