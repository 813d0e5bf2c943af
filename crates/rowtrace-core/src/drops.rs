//! Row-drop accounting.
//!
//! Drops are deliberate, audited row removals — a normal, expected
//! outcome with its own reporting, not a failure path. An operation with
//! drop semantics records exactly one record per input row it removes;
//! ancestry of a dropped row is recovered through trace composition, not
//! by double-counting here.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// The node's predicate rejected the row.
    PredicateFalse,
    /// The row duplicated an earlier row under the node's key.
    DuplicateRow,
    /// Caller-supplied reason code.
    Other(String),
}

impl DropReason {
    pub fn code(&self) -> &str {
        match self {
            DropReason::PredicateFalse => "predicate_false",
            DropReason::DuplicateRow => "duplicate_row",
            DropReason::Other(code) => code,
        }
    }
}

/// A drop as a kernel reports it, before the evaluator attributes it to
/// a node id. Cached alongside the node's table so a cache hit still
/// accounts for its drops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropEvent {
    /// Row index into the dropping operation's (primary) input.
    pub row: u32,
    pub reason: DropReason,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropRecord {
    /// The operation that removed the row.
    pub node: NodeId,
    /// Row index into that operation's (primary) input.
    pub row: u32,
    pub reason: DropReason,
    pub detail: Option<String>,
}

/// Append-only ledger of every drop in one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DropLedger {
    records: Vec<DropRecord>,
}

impl DropLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        node: NodeId,
        row: u32,
        reason: DropReason,
        detail: Option<String>,
    ) {
        self.records.push(DropRecord {
            node,
            row,
            reason,
            detail,
        });
    }

    pub fn append(&mut self, records: impl IntoIterator<Item = DropRecord>) {
        self.records.extend(records);
    }

    /// Attribute a kernel's drop events to the node that produced them.
    pub fn append_events(&mut self, node: NodeId, events: impl IntoIterator<Item = DropEvent>) {
        self.records.extend(events.into_iter().map(|e| DropRecord {
            node,
            row: e.row,
            reason: e.reason,
            detail: e.detail,
        }));
    }

    pub fn records(&self) -> &[DropRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All drops recorded by one operation, in record order.
    pub fn drops_for(&self, node: NodeId) -> Vec<&DropRecord> {
        self.records.iter().filter(|r| r.node == node).collect()
    }

    /// Reason code to count, across every operation.
    pub fn summarize(&self) -> BTreeMap<String, u64> {
        let mut out = BTreeMap::new();
        for record in &self.records {
            *out.entry(record.reason.code().to_string()).or_insert(0) += 1;
        }
        out
    }
}
