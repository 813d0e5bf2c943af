//! Serialized trace manifest for external tooling.

use serde::{Deserialize, Serialize};

use rowtrace_core::fingerprint::SCHEME_VERSION;
use rowtrace_plan::plan::Plan;

use crate::matrix::DependencyMatrix;
use crate::trace::RunTrace;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestNode {
    pub node: u32,
    pub kind: String,
    pub fingerprint: String,
    pub rows: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEdge {
    pub node: u32,
    pub input: usize,
    pub matrix: DependencyMatrix,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceManifest {
    pub scheme_version: u32,
    pub nodes: Vec<ManifestNode>,
    pub edges: Vec<ManifestEdge>,
}

impl TraceManifest {
    pub fn new(plan: &Plan, trace: &RunTrace) -> Self {
        let nodes = trace
            .nodes()
            .map(|(id, t)| ManifestNode {
                node: id.get(),
                kind: plan.node(id).kind.name().to_string(),
                fingerprint: t.fingerprint.to_hex(),
                rows: t.table.num_rows() as u32,
            })
            .collect();
        let edges = trace
            .edges()
            .map(|(node, input, matrix)| ManifestEdge {
                node: node.get(),
                input,
                matrix: (**matrix).clone(),
            })
            .collect();
        Self {
            scheme_version: SCHEME_VERSION,
            nodes,
            edges,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
