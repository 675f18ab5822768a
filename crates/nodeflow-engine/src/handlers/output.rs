use tracing::{info, warn};

use nodeflow_core::error::Result;
use nodeflow_core::graph::Node;
use nodeflow_core::settings::{OutputKind, OutputSettings};
use nodeflow_core::types::{Artifact, GeneratedFile, TEXT_CONTENT_SUFFIX};

use super::NodeEnv;
use crate::context::{ExecutionContext, Inputs};
use crate::pdf;

pub(super) async fn run(
    node: &Node,
    settings: &OutputSettings,
    inputs: &Inputs,
    env: &NodeEnv<'_>,
    ctx: &mut ExecutionContext,
) -> Result<Artifact> {
    ctx.success(format!("Final Output from {}:", node.name));

    let text = inputs.aggregate(node);
    if text.is_empty() {
        ctx.error("No input data received.");
        return Ok(Artifact::empty());
    }

    let stem = format!(
        "{}_{}",
        file_stem(&node.name),
        chrono::Utc::now().timestamp_millis()
    );

    match settings.kind {
        OutputKind::Console => {
            ctx.data(text.clone());
            Ok(Artifact::Text(text))
        }
        OutputKind::Pdf => {
            ctx.data("Generating PDF with content...");
            let bytes = pdf::render_text(&text);
            let name = format!("{}.pdf", stem);
            info!(node_id = %node.id, file = %name, bytes = bytes.len(), "Rendered PDF");
            ctx.add_file(GeneratedFile::from_bytes(&name, "application/pdf", &bytes, settings.action));
            Ok(Artifact::File { name, text })
        }
        OutputKind::Image => {
            let client = env.primary()?;
            ctx.data("Generating Image from prompt...");
            let bytes = client.generate_image(&text).await?;
            let name = format!("{}.png", stem);
            info!(node_id = %node.id, file = %name, bytes = bytes.len(), "Generated image");
            ctx.add_file(GeneratedFile::from_bytes(&name, "image/png", &bytes, settings.action));
            Ok(Artifact::File { name, text })
        }
        OutputKind::Audio => {
            ctx.data("Generating Audio from text...");
            // Speech is best effort and never aborts the run.
            if let Err(e) = env.speaker.speak(&text).await {
                warn!(node_id = %node.id, error = %e, "Text-to-speech unavailable");
                ctx.info(format!("Speech unavailable: {}", e));
            }
            let name = format!("{}.txt{}", stem, TEXT_CONTENT_SUFFIX);
            ctx.add_file(GeneratedFile::from_bytes(
                &name,
                "text/plain",
                text.as_bytes(),
                settings.action,
            ));
            Ok(Artifact::File { name, text })
        }
    }
}

/// Node name made safe for a file name: every run of whitespace or path
/// separators becomes `_` and leading dots are dropped.
pub fn file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    let mut in_gap = false;
    for c in name.trim_start_matches('.').chars() {
        if c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | ':') {
            if !in_gap {
                stem.push('_');
            }
            in_gap = true;
        } else {
            stem.push(c);
            in_gap = false;
        }
    }
    stem
}
