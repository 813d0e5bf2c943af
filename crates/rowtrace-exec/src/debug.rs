//! Debug query surface over completed runs: lineage, drop summaries,
//! and fingerprint-driven run diffs.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use rowtrace_core::id::NodeId;
use rowtrace_core::table::Table;
use rowtrace_core::value::ValueKey;
use rowtrace_trace::error::TraceError;
use rowtrace_trace::query::{contributing_sources, spine_walk, SpineStep};

use crate::run::Run;

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("run has no output named '{0}'")]
    UnknownOutput(String),

    #[error("row {row} out of bounds for output of {rows} rows")]
    RowOutOfBounds { row: u32, rows: u32 },

    #[error("run was evaluated without tracing")]
    TraceMissing,

    #[error(transparent)]
    Trace(#[from] TraceError),
}

/// Which rows of one source fed the queried row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContribution {
    pub node: NodeId,
    /// The source's declared input name.
    pub input: Option<String>,
    pub rows: Vec<u32>,
}

/// Answer to "which raw input rows produced this output row, and
/// through which path?"
#[derive(Debug, Clone)]
pub struct LineageReport {
    pub output: String,
    pub row: u32,
    /// The walk along each node's primary input down to a source.
    pub spine: Vec<SpineStep>,
    /// Contributions across every edge, side lineage included.
    pub sources: Vec<SourceContribution>,
}

/// Trace one output row back to the source rows that produced it.
pub fn lineage_report(run: &Run, output: &str, row: u32) -> Result<LineageReport, DebugError> {
    let trace = run.trace.as_ref().ok_or(DebugError::TraceMissing)?;
    let &node = run
        .plan
        .outputs()
        .get(output)
        .ok_or_else(|| DebugError::UnknownOutput(output.to_string()))?;
    let rows = run
        .output(output)
        .map(|t| t.num_rows() as u32)
        .unwrap_or(0);
    if row >= rows {
        return Err(DebugError::RowOutOfBounds { row, rows });
    }

    let spine = spine_walk(&run.plan, trace, node, vec![row])?;
    let by_source = contributing_sources(&run.plan, trace, node, vec![row])?;

    let input_names: BTreeMap<NodeId, String> = run
        .plan
        .inputs()
        .iter()
        .map(|(name, &id)| (id, name.clone()))
        .collect();
    let sources = by_source
        .into_iter()
        .map(|(node, rows)| SourceContribution {
            node,
            input: input_names.get(&node).cloned(),
            rows,
        })
        .collect();

    Ok(LineageReport {
        output: output.to_string(),
        row,
        spine,
        sources,
    })
}

/// Reason code → count across the whole run.
pub fn drop_summary(run: &Run) -> BTreeMap<String, u64> {
    run.drops.summarize()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDiff {
    /// Upstream fingerprints match; rows were not compared.
    Unchanged,
    /// Row-level difference, as indices into each run's output.
    Changed {
        /// Rows of `b`'s output with no matching row in `a`.
        added: Vec<u32>,
        /// Rows of `a`'s output with no matching row in `b`.
        removed: Vec<u32>,
    },
    OnlyInFirst,
    OnlyInSecond,
}

#[derive(Debug, Clone, Default)]
pub struct RunDiff {
    pub outputs: BTreeMap<String, OutputDiff>,
}

/// Row-level diff of two runs over the same plan, driven by matching
/// fingerprints: an output whose terminal fingerprint is unchanged is
/// reported `Unchanged` without touching a single row.
pub fn diff_runs(a: &Run, b: &Run) -> RunDiff {
    let mut outputs = BTreeMap::new();

    for (name, &node_a) in a.plan.outputs() {
        let Some(&node_b) = b.plan.outputs().get(name) else {
            outputs.insert(name.clone(), OutputDiff::OnlyInFirst);
            continue;
        };
        if a.fingerprint_of(node_a).is_some() && a.fingerprint_of(node_a) == b.fingerprint_of(node_b)
        {
            outputs.insert(name.clone(), OutputDiff::Unchanged);
            continue;
        }
        let (Some(table_a), Some(table_b)) = (a.output(name), b.output(name)) else {
            continue;
        };
        outputs.insert(name.clone(), diff_tables(table_a, table_b));
    }
    for name in b.plan.outputs().keys() {
        if !a.plan.outputs().contains_key(name) {
            outputs.insert(name.clone(), OutputDiff::OnlyInSecond);
        }
    }
    RunDiff { outputs }
}

/// Multiset row diff by content.
fn diff_tables(a: &Table, b: &Table) -> OutputDiff {
    let key_of = |table: &Table, row: usize| -> Vec<ValueKey> {
        table
            .columns()
            .iter()
            .map(|c| c.values[row].key())
            .collect()
    };

    let mut counts: HashMap<Vec<ValueKey>, i64> = HashMap::new();
    for row in 0..a.num_rows() {
        *counts.entry(key_of(a, row)).or_insert(0) += 1;
    }
    let mut added = Vec::new();
    for row in 0..b.num_rows() {
        let key = key_of(b, row);
        match counts.get_mut(&key) {
            Some(count) if *count > 0 => *count -= 1,
            _ => added.push(row as u32),
        }
    }
    // Whatever remains positive was only in `a`; attribute indices by a
    // second pass so they refer to real rows.
    let mut removed = Vec::new();
    for row in (0..a.num_rows()).rev() {
        let key = key_of(a, row);
        if let Some(count) = counts.get_mut(&key) {
            if *count > 0 {
                *count -= 1;
                removed.push(row as u32);
            }
        }
    }
    removed.reverse();
    if added.is_empty() && removed.is_empty() {
        OutputDiff::Unchanged
    } else {
        OutputDiff::Changed { added, removed }
    }
}
