use tracing::debug;

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::graph::Node;
use nodeflow_core::settings::{InputMode, InputSettings};
use nodeflow_core::types::Artifact;

use super::NodeEnv;
use crate::context::{ExecutionContext, Inputs};

pub(super) async fn run(
    node: &Node,
    settings: &InputSettings,
    inputs: &Inputs,
    env: &NodeEnv<'_>,
    ctx: &mut ExecutionContext,
) -> Result<Artifact> {
    if inputs.inbound() > 0 {
        ctx.info(format!(
            "Warning: Input node '{}' should not have inputs. It will be ignored.",
            node.name
        ));
    }

    match settings.mode {
        InputMode::Url => {
            ctx.data(format!("Fetching content from URL: {}", settings.url));
            let url = settings.url.trim();
            if url.is_empty() {
                return Err(FlowError::Input("URL is empty in Input node.".to_string()));
            }
            let body = fetch(env.http, url).await?;
            ctx.success(format!(
                "Successfully fetched content. Length: {}",
                body.chars().count()
            ));
            Ok(Artifact::Text(body))
        }
        InputMode::Text => {
            ctx.data(format!(
                "Using provided text. Length: {}",
                settings.text.chars().count()
            ));
            Ok(Artifact::Text(settings.text.clone()))
        }
    }
}

async fn fetch(http: &reqwest::Client, url: &str) -> Result<String> {
    debug!(url, "Fetching input URL");

    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| FlowError::Input(format!("Failed to fetch {}: {}", url, e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FlowError::Input(format!(
            "HTTP error! status: {}",
            status.as_u16()
        )));
    }

    response
        .text()
        .await
        .map_err(|e| FlowError::Input(format!("Failed to read response body: {}", e)))
}
