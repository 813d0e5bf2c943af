//! The result of one evaluation.

use std::collections::BTreeMap;
use std::sync::Arc;

use rowtrace_core::drops::DropLedger;
use rowtrace_core::fingerprint::Fingerprint;
use rowtrace_core::id::{NodeId, RunId};
use rowtrace_core::table::Table;
use rowtrace_plan::plan::Plan;
use rowtrace_trace::trace::RunTrace;

/// Cache hit/miss counters over the run's non-source nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// One execution of a plan against bound inputs. Owns its drop ledger
/// and trace; both are immutable once the run completes. The run's
/// cache entries outlive it in the store and are reclaimed by eviction
/// once unpinned — never by the evaluator.
#[derive(Debug)]
pub struct Run {
    pub id: RunId,
    pub plan: Arc<Plan>,
    pub outputs: BTreeMap<String, Arc<Table>>,
    pub drops: DropLedger,
    pub trace: Option<RunTrace>,
    pub cache: CacheStats,
    pub pinned: bool,
    fingerprints: BTreeMap<NodeId, Fingerprint>,
}

impl Run {
    pub(crate) fn new(
        id: RunId,
        plan: Arc<Plan>,
        outputs: BTreeMap<String, Arc<Table>>,
        drops: DropLedger,
        trace: Option<RunTrace>,
        cache: CacheStats,
        pinned: bool,
        fingerprints: BTreeMap<NodeId, Fingerprint>,
    ) -> Self {
        Self {
            id,
            plan,
            outputs,
            drops,
            trace,
            cache,
            pinned,
            fingerprints,
        }
    }

    pub fn output(&self, name: &str) -> Option<&Arc<Table>> {
        self.outputs.get(name)
    }

    /// Fingerprint a node evaluated under, source nodes included.
    pub fn fingerprint_of(&self, node: NodeId) -> Option<Fingerprint> {
        self.fingerprints.get(&node).copied()
    }

    /// Fingerprints of every cacheable (non-source) node, for pinning
    /// and run diffing.
    pub fn node_fingerprints(&self) -> &BTreeMap<NodeId, Fingerprint> {
        &self.fingerprints
    }
}
