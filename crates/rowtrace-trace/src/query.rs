//! Lazy lineage queries over a recorded trace.
//!
//! Nothing here materializes a full row-to-row relation; queries carry a
//! row set and push it through one matrix at a time.

use std::collections::BTreeMap;

use rowtrace_core::id::NodeId;
use rowtrace_plan::plan::Plan;

use crate::error::Result;
use crate::trace::RunTrace;

/// One hop of a spine walk: at `node`, the queried rows mapped through
/// the primary edge onto `input_node`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineStep {
    pub node: NodeId,
    pub input_node: NodeId,
    pub class: &'static str,
    /// Rows of `input_node` the queried rows depend on.
    pub rows: Vec<u32>,
}

/// Follow each node's designated primary input from `node` down to a
/// source, mapping `rows` edge by edge. The final step's `input_node` is
/// the source the spine lands on.
pub fn spine_walk(
    plan: &Plan,
    trace: &RunTrace,
    node: NodeId,
    rows: Vec<u32>,
) -> Result<Vec<SpineStep>> {
    let mut steps = Vec::new();
    let mut current = node;
    let mut current_rows = rows;
    while let Some(input_node) = plan.node(current).primary_input() {
        let primary = plan.node(current).primary;
        let matrix = trace.edge(current, primary)?;
        let mapped = matrix.map_rows(&current_rows)?;
        steps.push(SpineStep {
            node: current,
            input_node,
            class: matrix.class_name(),
            rows: mapped.clone(),
        });
        current = input_node;
        current_rows = mapped;
    }
    Ok(steps)
}

/// All source rows the queried rows transitively depend on, across every
/// edge (spine and side lineage alike). Returns a map from source node
/// to its contributing rows, ascending.
pub fn contributing_sources(
    plan: &Plan,
    trace: &RunTrace,
    node: NodeId,
    rows: Vec<u32>,
) -> Result<BTreeMap<NodeId, Vec<u32>>> {
    let order = plan
        .topo_order()
        .map_err(|e| crate::error::TraceError::Dimensions(e.to_string()))?;

    // Accumulate row sets walking the DAG backwards; reverse topological
    // order guarantees a node's set is complete before it is expanded.
    let mut pending: BTreeMap<NodeId, Vec<u32>> = BTreeMap::new();
    pending.insert(node, rows);

    let mut sources = BTreeMap::new();
    for id in order.into_iter().rev() {
        let Some(rows) = pending.remove(&id) else {
            continue;
        };
        if rows.is_empty() {
            continue;
        }
        let op = plan.node(id);
        if op.kind.is_source() {
            sources.insert(id, rows);
            continue;
        }
        for (input_idx, &input_node) in op.inputs.iter().enumerate() {
            let matrix = trace.edge(id, input_idx)?;
            let mapped = matrix.map_rows(&rows)?;
            let entry = pending.entry(input_node).or_default();
            entry.extend(mapped);
            entry.sort_unstable();
            entry.dedup();
        }
    }
    Ok(sources)
}
