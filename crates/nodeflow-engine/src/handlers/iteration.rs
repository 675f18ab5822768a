use nodeflow_core::graph::Node;
use nodeflow_core::types::Artifact;

use crate::context::{ExecutionContext, Inputs};

/// Loop settings are stored but not evaluated; the input passes through.
pub(super) fn run(node: &Node, inputs: &Inputs, ctx: &mut ExecutionContext) -> Artifact {
    ctx.info("Iteration node (logic not implemented), passing input through.");
    Artifact::Text(inputs.aggregate(node))
}
