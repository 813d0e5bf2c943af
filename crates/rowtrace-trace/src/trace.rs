//! The run trace: per-node outputs and per-edge matrices.

use std::collections::BTreeMap;
use std::sync::Arc;

use rowtrace_core::fingerprint::Fingerprint;
use rowtrace_core::id::NodeId;
use rowtrace_core::table::Table;

use crate::error::{Result, TraceError};
use crate::matrix::DependencyMatrix;

#[derive(Debug, Clone)]
pub struct NodeTrace {
    pub fingerprint: Fingerprint,
    pub table: Arc<Table>,
}

/// Everything recorded while evaluating one run with tracing enabled.
/// Immutable once the run completes; owned by the run.
#[derive(Debug, Clone, Default)]
pub struct RunTrace {
    nodes: BTreeMap<NodeId, NodeTrace>,
    edges: BTreeMap<(NodeId, usize), Arc<DependencyMatrix>>,
}

impl RunTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&mut self, node: NodeId, fingerprint: Fingerprint, table: Arc<Table>) {
        self.nodes.insert(node, NodeTrace { fingerprint, table });
    }

    pub fn insert_edge(&mut self, node: NodeId, input: usize, matrix: Arc<DependencyMatrix>) {
        self.edges.insert((node, input), matrix);
    }

    pub fn node(&self, id: NodeId) -> Result<&NodeTrace> {
        self.nodes.get(&id).ok_or(TraceError::MissingNode(id))
    }

    pub fn edge(&self, node: NodeId, input: usize) -> Result<&Arc<DependencyMatrix>> {
        self.edges
            .get(&(node, input))
            .ok_or(TraceError::MissingEdge { node, input })
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &NodeTrace)> {
        self.nodes.iter().map(|(id, t)| (*id, t))
    }

    pub fn edges(&self) -> impl Iterator<Item = (NodeId, usize, &Arc<DependencyMatrix>)> {
        self.edges.iter().map(|((n, i), m)| (*n, *i, m))
    }

    /// Matrices for one node's edges, in input order, if all are present.
    pub fn edge_matrices(&self, node: NodeId, arity: usize) -> Result<Vec<Arc<DependencyMatrix>>> {
        (0..arity).map(|i| self.edge(node, i).map(Arc::clone)).collect()
    }
}
