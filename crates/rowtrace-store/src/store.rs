//! The store proper: in-memory index, claim/wait protocol, pinning, and
//! LRU eviction.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use rowtrace_core::cancel::CancelToken;
use rowtrace_core::drops::DropEvent;
use rowtrace_core::fingerprint::Fingerprint;
use rowtrace_core::id::RunId;
use rowtrace_core::table::Table;
use rowtrace_trace::matrix::DependencyMatrix;

use crate::disk::{DiskMirror, StoredEntry};
use crate::error::{Result, StoreError};

/// Per-edge matrices cached alongside a node's table.
pub type EdgeTraces = Vec<DependencyMatrix>;

/// What a probe hands back: the table, its per-edge matrices if they
/// were cached, and the drops its kernel reported when first computed.
#[derive(Clone)]
pub struct CachedNode {
    pub table: Arc<Table>,
    pub trace: Option<Arc<EdgeTraces>>,
    pub drops: Arc<Vec<DropEvent>>,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Disk mirror directory; `None` keeps the cache in memory only.
    pub dir: Option<std::path::PathBuf>,
    /// Byte budget over hot and cold entries together.
    pub budget_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: None,
            budget_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub entries: usize,
    pub bytes: u64,
    pub evictions: u64,
}

struct Entry {
    node: CachedNode,
    bytes: u64,
    last_used: u64,
}

#[derive(Default)]
struct State {
    hot: HashMap<Fingerprint, Entry>,
    /// On disk, not yet loaded this process; value is the file size.
    cold: HashMap<Fingerprint, u64>,
    in_flight: HashSet<Fingerprint>,
    pins: BTreeMap<RunId, BTreeSet<Fingerprint>>,
    pinned: HashMap<Fingerprint, u32>,
    live: HashMap<Fingerprint, u32>,
    tick: u64,
    bytes: u64,
    evictions: u64,
}

impl State {
    fn touch(&mut self, fp: &Fingerprint) {
        self.tick += 1;
        if let Some(entry) = self.hot.get_mut(fp) {
            entry.last_used = self.tick;
        }
    }

    fn is_protected(&self, fp: &Fingerprint) -> bool {
        self.pinned.get(fp).copied().unwrap_or(0) > 0
            || self.live.get(fp).copied().unwrap_or(0) > 0
            || self.in_flight.contains(fp)
    }
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
    disk: Option<DiskMirror>,
    degraded: AtomicBool,
    budget: u64,
}

/// Outcome of [`ResultStore::begin`].
pub enum Probe {
    /// A usable entry exists; reuse it.
    Hit(CachedNode),
    /// The caller owns the computation for this fingerprint. Other runs
    /// asking for it will block until the claim commits or is dropped.
    Claim(ComputeClaim),
}

/// Exclusive right to compute one fingerprint. Dropping the claim
/// without committing abandons it and wakes waiters so one of them can
/// take over; nothing partial is ever published.
pub struct ComputeClaim {
    shared: Arc<Shared>,
    fp: Fingerprint,
    committed: bool,
}

impl ComputeClaim {
    pub fn fingerprint(&self) -> Fingerprint {
        self.fp
    }

    /// Publish the computed node. Idempotent across runs: if an entry
    /// already exists the earlier table wins and only a missing trace is
    /// attached, so concurrent commits of one fingerprint coalesce.
    pub fn commit(mut self, node: CachedNode) -> CachedNode {
        self.committed = true;
        let shared = self.shared.clone();
        let fp = self.fp;
        let result = insert_entry(&shared, fp, node);
        let mut state = shared.state.lock().expect("store mutex poisoned");
        state.in_flight.remove(&fp);
        drop(state);
        shared.cond.notify_all();
        result
    }
}

impl Drop for ComputeClaim {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.shared.state.lock().expect("store mutex poisoned");
            state.in_flight.remove(&self.fp);
            drop(state);
            self.shared.cond.notify_all();
        }
    }
}

/// Content-addressed cache of evaluated tables, keyed by fingerprint.
#[derive(Clone)]
pub struct ResultStore {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore").finish_non_exhaustive()
    }
}

impl ResultStore {
    /// Open a store. With a directory configured, existing entries and
    /// the pin index are adopted from disk; failure to do so is
    /// `Unavailable` and the caller decides whether to fall back to a
    /// memory-only store.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let mut state = State::default();
        let disk = match &config.dir {
            Some(dir) => {
                let mirror = DiskMirror::open(dir)
                    .map_err(|e| StoreError::Unavailable(format!("open {}: {e}", dir.display())))?;
                let entries = mirror
                    .list_entries()
                    .map_err(|e| StoreError::Unavailable(format!("scan {}: {e}", dir.display())))?;
                for (fp, bytes) in entries {
                    state.bytes += bytes;
                    state.cold.insert(fp, bytes);
                }
                let pins = mirror
                    .read_pins()
                    .map_err(|e| StoreError::Unavailable(format!("read pins: {e}")))?;
                for fps in pins.values() {
                    for fp in fps {
                        *state.pinned.entry(*fp).or_insert(0) += 1;
                    }
                }
                state.pins = pins;
                Some(mirror)
            }
            None => None,
        };
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                cond: Condvar::new(),
                disk,
                degraded: AtomicBool::new(false),
                budget: config.budget_bytes,
            }),
        })
    }

    /// Memory-only store with the given budget.
    pub fn in_memory(budget_bytes: u64) -> Self {
        match Self::open(StoreConfig {
            dir: None,
            budget_bytes,
        }) {
            Ok(store) => store,
            Err(_) => unreachable!("memory-only store cannot fail to open"),
        }
    }

    /// Look up a fingerprint, promoting a cold disk entry if needed.
    pub fn get(&self, fp: &Fingerprint) -> Result<Option<CachedNode>> {
        let mut state = self.lock();
        if let Some(entry) = state.hot.get(fp) {
            let out = entry.node.clone();
            state.touch(fp);
            return Ok(Some(out));
        }
        if state.cold.contains_key(fp) {
            return self.promote(state, fp).map(Some);
        }
        Ok(None)
    }

    /// Probe for `fp`, claiming the computation on a miss.
    ///
    /// A hit requires a cached trace when `need_trace` is set; an entry
    /// without one is recomputed under a claim and its trace attached.
    /// If another run holds the claim, this blocks — cancellably — until
    /// that run commits or abandons, guaranteeing at-most-once
    /// computation per fingerprint per cache generation.
    pub fn begin(&self, fp: &Fingerprint, need_trace: bool, cancel: &CancelToken) -> Result<Probe> {
        let mut state = self.lock();
        loop {
            if cancel.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            if !state.in_flight.contains(fp) {
                if state.cold.contains_key(fp) && !state.hot.contains_key(fp) {
                    match self.promote(state, fp) {
                        Ok(node) => {
                            if !need_trace || node.trace.is_some() {
                                return Ok(Probe::Hit(node));
                            }
                        }
                        Err(e) => {
                            warn!(fingerprint = %fp.short(), error = %e, "cold cache entry unreadable; recomputing");
                        }
                    }
                    // Promotion dropped the lock; re-run every check so
                    // a claim raced in by another run is respected.
                    state = self.lock();
                    continue;
                }
                if let Some(entry) = state.hot.get(fp) {
                    if !need_trace || entry.node.trace.is_some() {
                        let out = Probe::Hit(entry.node.clone());
                        state.touch(fp);
                        return Ok(out);
                    }
                }
                state.in_flight.insert(*fp);
                return Ok(Probe::Claim(self.claim(*fp)));
            }
            let (next, _timeout) = self
                .shared
                .cond
                .wait_timeout(state, Duration::from_millis(25))
                .expect("store mutex poisoned");
            state = next;
        }
    }

    /// Direct insert, bypassing the claim protocol. Idempotent: an
    /// existing entry keeps its table and gains a missing trace.
    pub fn put(&self, fp: Fingerprint, node: CachedNode) -> CachedNode {
        insert_entry(&self.shared, fp, node)
    }

    pub fn contains(&self, fp: &Fingerprint) -> bool {
        let state = self.lock();
        state.hot.contains_key(fp) || state.cold.contains_key(fp)
    }

    /// Mark an entry as depended on by an in-flight run; protected from
    /// eviction until released.
    pub fn retain(&self, fp: &Fingerprint) {
        let mut state = self.lock();
        *state.live.entry(*fp).or_insert(0) += 1;
    }

    pub fn release(&self, fps: &[Fingerprint]) {
        let mut state = self.lock();
        for fp in fps {
            if let Some(count) = state.live.get_mut(fp) {
                *count -= 1;
                if *count == 0 {
                    state.live.remove(fp);
                }
            }
        }
        self.evict_to_budget(&mut state);
    }

    /// Exempt a run's entries from eviction. Atomic with respect to the
    /// eviction sweep: both run under the store lock.
    pub fn pin_run(&self, run: RunId, fps: impl IntoIterator<Item = Fingerprint>) {
        let mut state = self.lock();
        let set: BTreeSet<Fingerprint> = fps.into_iter().collect();
        for fp in &set {
            *state.pinned.entry(*fp).or_insert(0) += 1;
        }
        state.pins.insert(run, set);
        let pins = state.pins.clone();
        drop(state);
        self.persist_pins(&pins);
    }

    pub fn unpin_run(&self, run: RunId) {
        let mut state = self.lock();
        let Some(set) = state.pins.remove(&run) else {
            return;
        };
        for fp in &set {
            if let Some(count) = state.pinned.get_mut(fp) {
                *count -= 1;
                if *count == 0 {
                    state.pinned.remove(fp);
                }
            }
        }
        self.evict_to_budget(&mut state);
        let pins = state.pins.clone();
        drop(state);
        self.persist_pins(&pins);
    }

    pub fn pinned_runs(&self) -> Vec<RunId> {
        self.lock().pins.keys().copied().collect()
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.lock();
        StoreStats {
            entries: state.hot.len() + state.cold.len(),
            bytes: state.bytes,
            evictions: state.evictions,
        }
    }

    // --- internals ------------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.shared.state.lock().expect("store mutex poisoned")
    }

    fn claim(&self, fp: Fingerprint) -> ComputeClaim {
        ComputeClaim {
            shared: self.shared.clone(),
            fp,
            committed: false,
        }
    }

    /// Load a cold entry into memory. Consumes the lock guard because
    /// the read happens without it; an unreadable entry is dropped from
    /// the cold index so it is not retried forever.
    fn promote(
        &self,
        state: std::sync::MutexGuard<'_, State>,
        fp: &Fingerprint,
    ) -> Result<CachedNode> {
        drop(state);

        let read = match self.disk_if_healthy() {
            Some(disk) => disk.read_entry(fp).map_err(|e| {
                self.degrade(&format!("read {}: {e}", fp.short()));
                StoreError::Unavailable(e.to_string())
            }),
            None => Err(StoreError::Unavailable(
                "disk mirror degraded; cold entry unreachable".into(),
            )),
        };

        let mut state = self.lock();
        match read {
            Ok(stored) => {
                if let Some(entry) = state.hot.get(fp) {
                    // Another run promoted it while the lock was down.
                    let out = entry.node.clone();
                    state.touch(fp);
                    return Ok(out);
                }
                let file_bytes = state.cold.remove(fp).unwrap_or(0);
                state.bytes = state.bytes.saturating_sub(file_bytes);
                let node = CachedNode {
                    table: Arc::new(stored.table),
                    trace: stored.trace.map(Arc::new),
                    drops: Arc::new(stored.drops),
                };
                let bytes = node.table.approx_bytes();
                state.bytes += bytes;
                state.tick += 1;
                let tick = state.tick;
                state.hot.insert(
                    *fp,
                    Entry {
                        node: node.clone(),
                        bytes,
                        last_used: tick,
                    },
                );
                self.evict_to_budget(&mut state);
                Ok(node)
            }
            Err(e) => {
                let file_bytes = state.cold.remove(fp).unwrap_or(0);
                state.bytes = state.bytes.saturating_sub(file_bytes);
                Err(e)
            }
        }
    }

    fn disk_if_healthy(&self) -> Option<&DiskMirror> {
        if self.shared.degraded.load(Ordering::SeqCst) {
            return None;
        }
        self.shared.disk.as_ref()
    }

    fn degrade(&self, reason: &str) {
        if !self.shared.degraded.swap(true, Ordering::SeqCst) {
            warn!(reason, "result store degraded to memory-only");
        }
    }

    fn persist_pins(&self, pins: &BTreeMap<RunId, BTreeSet<Fingerprint>>) {
        if let Some(disk) = self.disk_if_healthy() {
            if let Err(e) = disk.write_pins(pins) {
                self.degrade(&format!("write pins: {e}"));
            }
        }
    }

    /// LRU sweep among entries that are neither pinned, live, nor being
    /// recomputed. Cold entries count as least recent.
    fn evict_to_budget(&self, state: &mut State) {
        while state.bytes > self.shared.budget {
            let cold_victim = state
                .cold
                .keys()
                .find(|fp| !state.is_protected(fp))
                .copied();
            if let Some(fp) = cold_victim {
                let bytes = state.cold.remove(&fp).unwrap_or(0);
                state.bytes = state.bytes.saturating_sub(bytes);
                state.evictions += 1;
                if let Some(disk) = self.disk_if_healthy() {
                    disk.delete_entry(&fp);
                }
                debug!(fingerprint = %fp.short(), "evicted cold cache entry");
                continue;
            }
            let hot_victim = state
                .hot
                .iter()
                .filter(|(fp, _)| !state.is_protected(fp))
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(fp, _)| *fp);
            let Some(fp) = hot_victim else {
                // Everything left is protected; the budget may be
                // exceeded until something unpins.
                break;
            };
            if let Some(entry) = state.hot.remove(&fp) {
                state.bytes = state.bytes.saturating_sub(entry.bytes);
                state.evictions += 1;
            }
            if let Some(disk) = self.disk_if_healthy() {
                disk.delete_entry(&fp);
            }
            debug!(fingerprint = %fp.short(), "evicted cache entry");
        }
    }
}

/// Shared insert path for `put` and `ComputeClaim::commit`.
fn insert_entry(shared: &Arc<Shared>, fp: Fingerprint, node: CachedNode) -> CachedNode {
    let store = ResultStore {
        shared: shared.clone(),
    };
    let mut state = store.lock();
    state.tick += 1;
    let tick = state.tick;

    let (result, survived) = match state.hot.get_mut(&fp) {
        Some(entry) => {
            // Coalesce: the first table wins, a missing trace is attached.
            if entry.node.trace.is_none() {
                entry.node.trace = node.trace;
            }
            entry.last_used = tick;
            (entry.node.clone(), true)
        }
        None => {
            let bytes = node.table.approx_bytes();
            state.bytes += bytes;
            state.hot.insert(
                fp,
                Entry {
                    node: node.clone(),
                    bytes,
                    last_used: tick,
                },
            );
            store.evict_to_budget(&mut state);
            (node, state.hot.contains_key(&fp))
        }
    };
    drop(state);

    // Write-through, outside the lock; skipped if the entry was evicted
    // immediately or the mirror has degraded.
    if survived {
        if let Some(disk) = store.disk_if_healthy() {
            let stored = StoredEntry {
                table: (*result.table).clone(),
                trace: result.trace.as_deref().cloned(),
                drops: (*result.drops).clone(),
            };
            if let Err(e) = disk.write_entry(&fp, &stored) {
                store.degrade(&format!("write {}: {e}", fp.short()));
            }
        }
    }
    result
}
