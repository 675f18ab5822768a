use std::collections::{HashMap, VecDeque};

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::graph::{Graph, Node, NodeId};

/// Result of topologically sorting a graph.
#[derive(Debug)]
pub struct Schedule<'g> {
    /// Nodes in execution order.
    pub order: Vec<&'g Node>,
    /// Nodes on a cycle or downstream of one, in declared order.
    pub excluded: Vec<&'g Node>,
}

impl<'g> Schedule<'g> {
    pub fn is_complete(&self) -> bool {
        self.excluded.is_empty()
    }

    pub fn into_result(self) -> Result<Vec<&'g Node>> {
        if self.excluded.is_empty() {
            Ok(self.order)
        } else {
            Err(FlowError::CycleDetected {
                nodes: self.excluded.iter().map(|n| n.name.clone()).collect(),
            })
        }
    }
}

/// Kahn's algorithm over the graph's edges.
///
/// The ready queue is seeded in declared node order and successors are
/// released in edge order, so identical graphs always sort identically.
/// Edges with an unknown endpoint are skipped.
pub fn schedule(graph: &Graph) -> Result<Schedule<'_>> {
    graph.validate()?;

    let index: HashMap<&NodeId, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (&n.id, i))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; graph.nodes.len()];

    for edge in &graph.edges {
        if let (Some(&from), Some(&to)) = (index.get(&edge.from), index.get(&edge.to)) {
            adjacency[from].push(to);
            in_degree[to] += 1;
        }
    }

    let mut queue: VecDeque<usize> = (0..graph.nodes.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut scheduled = vec![false; graph.nodes.len()];
    let mut order = Vec::with_capacity(graph.nodes.len());

    while let Some(current) = queue.pop_front() {
        scheduled[current] = true;
        order.push(&graph.nodes[current]);
        for &next in &adjacency[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    let excluded = graph
        .nodes
        .iter()
        .zip(&scheduled)
        .filter(|(_, done)| !**done)
        .map(|(n, _)| n)
        .collect();

    Ok(Schedule { order, excluded })
}

/// Execution order, or `CycleDetected` naming every node that cannot run.
pub fn compute_order(graph: &Graph) -> Result<Vec<&Node>> {
    schedule(graph)?.into_result()
}
