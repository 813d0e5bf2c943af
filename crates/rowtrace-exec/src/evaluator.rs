//! The evaluator: topological walk, store probes, kernel dispatch.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use rowtrace_core::cancel::CancelToken;
use rowtrace_core::drops::{DropEvent, DropLedger};
use rowtrace_core::fingerprint::{table_digest, Fingerprint, FingerprintBuilder};
use rowtrace_core::id::{NodeId, RunId};
use rowtrace_core::table::Table;
use rowtrace_ops::run_kernel;
use rowtrace_plan::error::PlanError;
use rowtrace_plan::node::OpNode;
use rowtrace_plan::plan::Plan;
use rowtrace_store::{CachedNode, Probe, ResultStore, StoreError};
use rowtrace_trace::matrix::DependencyMatrix;
use rowtrace_trace::trace::RunTrace;

use crate::error::{EvalError, Result};
use crate::run::{CacheStats, Run};

#[derive(Debug, Clone, Default)]
pub struct EvalOptions {
    /// Record per-edge dependency matrices and node outputs.
    pub trace: bool,
    /// Pin the run's cache entries against eviction on completion.
    pub pin: bool,
    pub cancel: CancelToken,
}

/// Evaluates plans against a result store. The store is injected —
/// never ambient — so runs are testable in isolation and independent
/// caches can coexist.
pub struct Evaluator {
    store: Arc<ResultStore>,
}

/// One node's work, prepared under the merge lock-step and executed
/// possibly on a worker thread.
struct Job {
    id: NodeId,
    fp: Fingerprint,
    input_tables: Vec<Arc<Table>>,
    import_table: Option<Arc<Table>>,
}

struct NodeOutcome {
    table: Arc<Table>,
    /// One matrix per input edge; `Some` iff tracing.
    matrices: Option<Vec<Arc<DependencyMatrix>>>,
    drops: Vec<DropEvent>,
    /// `None` for source nodes, which do not touch the cache.
    hit: Option<bool>,
}

struct Computed {
    table: Table,
    matrices: Option<Vec<DependencyMatrix>>,
    drops: Vec<DropEvent>,
}

/// Releases in-flight eviction protection when the run ends, normally
/// or not.
struct LiveGuard<'a> {
    store: &'a ResultStore,
    fps: Vec<Fingerprint>,
}

impl Drop for LiveGuard<'_> {
    fn drop(&mut self) {
        self.store.release(&self.fps);
    }
}

impl Evaluator {
    pub fn new(store: Arc<ResultStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Evaluate a plan against bound inputs.
    ///
    /// All-or-nothing: on any kernel error the run aborts and no outputs
    /// are surfaced. Independent nodes of the same depth evaluate in
    /// parallel on scoped threads; the store is the only shared mutable
    /// state.
    pub fn evaluate(
        &self,
        plan: Arc<Plan>,
        bound_inputs: &BTreeMap<String, Table>,
        opts: &EvalOptions,
    ) -> Result<Run> {
        let run_id = RunId::new();
        let imports = validate_inputs(&plan, bound_inputs)?;

        let depths = match plan.depths() {
            Ok(depths) => depths,
            Err(PlanError::Cycle) => return Err(EvalError::CyclicPlan),
            Err(e) => return Err(EvalError::Internal(e.to_string())),
        };
        let mut levels: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for id in plan.node_ids() {
            levels.entry(depths[id.index()]).or_default().push(id);
        }

        let mut tables: HashMap<NodeId, Arc<Table>> = HashMap::new();
        let mut fingerprints: BTreeMap<NodeId, Fingerprint> = BTreeMap::new();
        let mut ledger = DropLedger::new();
        let mut run_trace = opts.trace.then(RunTrace::new);
        let mut stats = CacheStats::default();
        let no_cache = AtomicBool::new(false);
        let mut live = LiveGuard {
            store: self.store.as_ref(),
            fps: Vec::new(),
        };

        for level in levels.into_values() {
            if opts.cancel.is_cancelled() {
                return Err(EvalError::Cancelled);
            }

            let jobs = level
                .iter()
                .map(|&id| self.prepare_job(&plan, id, &tables, &fingerprints, &imports))
                .collect::<Result<Vec<_>>>()?;

            let plan_ref: &Plan = &plan;
            let no_cache_ref = &no_cache;
            let outcomes: Vec<Result<NodeOutcome>> = if jobs.len() == 1 {
                vec![self.eval_node(plan_ref, &jobs[0], opts, no_cache_ref)]
            } else {
                std::thread::scope(|scope| {
                    let handles: Vec<_> = jobs
                        .iter()
                        .map(|job| {
                            scope.spawn(move || self.eval_node(plan_ref, job, opts, no_cache_ref))
                        })
                        .collect();
                    handles
                        .into_iter()
                        .map(|h| {
                            h.join().unwrap_or_else(|_| {
                                Err(EvalError::Internal("evaluation worker panicked".into()))
                            })
                        })
                        .collect()
                })
            };

            for (job, outcome) in jobs.into_iter().zip(outcomes) {
                let out = outcome?;
                if out.hit.is_some() && !no_cache.load(Ordering::SeqCst) {
                    self.store.retain(&job.fp);
                    live.fps.push(job.fp);
                }
                match out.hit {
                    Some(true) => stats.hits += 1,
                    Some(false) => stats.misses += 1,
                    None => {}
                }
                ledger.append_events(job.id, out.drops);
                if let Some(trace) = &mut run_trace {
                    trace.insert_node(job.id, job.fp, out.table.clone());
                    if let Some(matrices) = &out.matrices {
                        for (input, matrix) in matrices.iter().enumerate() {
                            trace.insert_edge(job.id, input, matrix.clone());
                        }
                    }
                }
                fingerprints.insert(job.id, job.fp);
                tables.insert(job.id, out.table);
            }
        }

        let mut outputs = BTreeMap::new();
        for (name, node) in plan.outputs() {
            let table = tables
                .get(node)
                .ok_or_else(|| EvalError::Internal(format!("output '{name}' never evaluated")))?;
            outputs.insert(name.clone(), table.clone());
        }

        if opts.pin {
            let pinnable = fingerprints
                .iter()
                .filter(|(id, _)| !plan.node(**id).kind.is_source())
                .map(|(_, fp)| *fp);
            self.store.pin_run(run_id, pinnable);
        }
        drop(live);

        debug!(
            run = %run_id,
            hits = stats.hits,
            misses = stats.misses,
            drops = ledger.len(),
            "run complete"
        );
        Ok(Run::new(
            run_id,
            plan,
            outputs,
            ledger,
            run_trace,
            stats,
            opts.pin,
            fingerprints,
        ))
    }

    fn prepare_job(
        &self,
        plan: &Plan,
        id: NodeId,
        tables: &HashMap<NodeId, Arc<Table>>,
        fingerprints: &BTreeMap<NodeId, Fingerprint>,
        imports: &BTreeMap<NodeId, Arc<Table>>,
    ) -> Result<Job> {
        let node = plan.node(id);
        let input_tables = node
            .inputs
            .iter()
            .map(|input| {
                tables
                    .get(input)
                    .cloned()
                    .ok_or_else(|| EvalError::Internal(format!("input {input} not yet evaluated")))
            })
            .collect::<Result<Vec<_>>>()?;
        let input_fps = node
            .inputs
            .iter()
            .map(|input| {
                fingerprints
                    .get(input)
                    .copied()
                    .ok_or_else(|| EvalError::Internal(format!("input {input} has no fingerprint")))
            })
            .collect::<Result<Vec<_>>>()?;
        let import_table = imports.get(&id).cloned();
        let fp = node_fingerprint(node, &input_fps, import_table.as_deref())?;
        Ok(Job {
            id,
            fp,
            input_tables,
            import_table,
        })
    }

    fn eval_node(
        &self,
        plan: &Plan,
        job: &Job,
        opts: &EvalOptions,
        no_cache: &AtomicBool,
    ) -> Result<NodeOutcome> {
        let node = plan.node(job.id);
        if node.kind.is_source() {
            let table = job
                .import_table
                .clone()
                .ok_or_else(|| EvalError::Internal(format!("import {} has no binding", job.id)))?;
            return Ok(NodeOutcome {
                table,
                matrices: opts.trace.then(Vec::new),
                drops: Vec::new(),
                hit: None,
            });
        }

        if !no_cache.load(Ordering::SeqCst) {
            match self.store.begin(&job.fp, opts.trace, &opts.cancel) {
                Ok(Probe::Hit(cached)) => {
                    debug!(node = %job.id, fingerprint = %job.fp.short(), "cache hit");
                    return outcome_from_cached(cached, opts.trace, true);
                }
                Ok(Probe::Claim(claim)) => {
                    // A kernel failure drops the claim, which abandons
                    // the in-flight slot and wakes any waiter.
                    let computed = compute_node(plan, job, opts.trace)?;
                    let cached = claim.commit(CachedNode {
                        table: Arc::new(computed.table),
                        trace: computed.matrices.map(Arc::new),
                        drops: Arc::new(computed.drops),
                    });
                    return outcome_from_cached(cached, opts.trace, false);
                }
                Err(StoreError::Cancelled) => return Err(EvalError::Cancelled),
                Err(StoreError::Unavailable(msg)) => {
                    warn!(node = %job.id, error = %msg, "cache unavailable; evaluating without it");
                    no_cache.store(true, Ordering::SeqCst);
                }
            }
        }

        let computed = compute_node(plan, job, opts.trace)?;
        Ok(NodeOutcome {
            table: Arc::new(computed.table),
            matrices: computed
                .matrices
                .map(|ms| ms.into_iter().map(Arc::new).collect()),
            drops: computed.drops,
            hit: Some(false),
        })
    }
}

fn validate_inputs(
    plan: &Plan,
    bound: &BTreeMap<String, Table>,
) -> Result<BTreeMap<NodeId, Arc<Table>>> {
    for name in bound.keys() {
        if !plan.inputs().contains_key(name) {
            return Err(EvalError::UnboundInput(format!(
                "'{name}' is not declared by the plan"
            )));
        }
    }
    let mut out = BTreeMap::new();
    for (name, &node) in plan.inputs() {
        let table = bound
            .get(name)
            .ok_or_else(|| EvalError::UnboundInput(format!("no table bound for '{name}'")))?;
        plan.node(node)
            .schema
            .check_table(table)
            .map_err(|detail| EvalError::SchemaMismatch {
                input: name.clone(),
                detail,
            })?;
        out.insert(node, Arc::new(table.clone()));
    }
    Ok(out)
}

/// Fingerprint of one node's computation: operation kind and parameters,
/// ordered input fingerprints, and for source nodes a digest of the
/// bound data.
fn node_fingerprint(
    node: &OpNode,
    input_fps: &[Fingerprint],
    source: Option<&Table>,
) -> Result<Fingerprint> {
    let mut builder = FingerprintBuilder::new()
        .update_serde(&node.kind)
        .map_err(|e| EvalError::Internal(e.to_string()))?;
    for fp in input_fps {
        builder = builder.update_fingerprint(fp);
    }
    if let Some(table) = source {
        let digest = table_digest(table).map_err(|e| EvalError::Internal(e.to_string()))?;
        builder = builder.update_fingerprint(&digest);
    }
    Ok(builder.finish())
}

fn compute_node(plan: &Plan, job: &Job, want_trace: bool) -> Result<Computed> {
    let node = plan.node(job.id);
    let input_refs: Vec<&Table> = job.input_tables.iter().map(Arc::as_ref).collect();
    let out = run_kernel(&node.kind, &node.schema, &input_refs)
        .map_err(|source| EvalError::Operation {
            node: job.id,
            source,
        })?;

    let matrices = if want_trace {
        let mut ms = Vec::with_capacity(out.recipes.len());
        for (input, recipe) in out.recipes.iter().enumerate() {
            let matrix = DependencyMatrix::classify(
                recipe,
                out.table.num_rows() as u32,
                input_refs[input].num_rows() as u32,
            )
            .map_err(|e| {
                EvalError::Internal(format!("edge ({}, {input}) unclassifiable: {e}", job.id))
            })?;
            ms.push(matrix);
        }
        Some(ms)
    } else {
        None
    };

    debug!(
        node = %job.id,
        kind = node.kind.name(),
        rows = out.table.num_rows(),
        "evaluated node"
    );
    Ok(Computed {
        table: out.table,
        matrices,
        drops: out.drops,
    })
}

fn outcome_from_cached(cached: CachedNode, want_trace: bool, hit: bool) -> Result<NodeOutcome> {
    let matrices = if want_trace {
        let trace = cached.trace.clone().ok_or_else(|| {
            EvalError::Internal("cache entry bound without its required trace".into())
        })?;
        Some(trace.iter().cloned().map(Arc::new).collect())
    } else {
        None
    };
    Ok(NodeOutcome {
        table: cached.table,
        matrices,
        drops: (*cached.drops).clone(),
        hit: Some(hit),
    })
}
