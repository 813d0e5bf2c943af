//! Fingerprint-driven reuse across runs.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{int_col, table, text_col};
use rowtrace_core::expr::Expr;
use rowtrace_core::schema::{Field, Schema};
use rowtrace_core::table::Table;
use rowtrace_core::value::DataType;
use rowtrace_exec::{EvalOptions, Evaluator};
use rowtrace_plan::plan::{Plan, PlanBuilder};
use rowtrace_plan::{ExcludePolicy, SelectColumn};
use rowtrace_store::ResultStore;

/// Two independent branches: filter over `a`, select over `b`.
fn two_branch_plan() -> Arc<Plan> {
    let mut b = PlanBuilder::new();
    let a = b
        .import("a", Schema::new(vec![Field::new("x", DataType::Int, false)]))
        .unwrap();
    let src_b = b
        .import("b", Schema::new(vec![Field::new("y", DataType::Int, false)]))
        .unwrap();
    let filtered = b
        .filter(a, Expr::parse("x > 1").unwrap(), ExcludePolicy::Discard)
        .unwrap();
    let selected = b
        .select(
            src_b,
            vec![SelectColumn {
                name: "y2".into(),
                expr: Expr::parse("y * 2").unwrap(),
            }],
        )
        .unwrap();
    b.export("fa", filtered).unwrap();
    b.export("sb", selected).unwrap();
    Arc::new(b.build().unwrap())
}

fn bind(a: Table, b: Table) -> BTreeMap<String, Table> {
    BTreeMap::from([("a".to_string(), a), ("b".to_string(), b)])
}

#[test]
fn warm_rerun_hits_everything() {
    let store = Arc::new(ResultStore::in_memory(1 << 24));
    let evaluator = Evaluator::new(store);
    let plan = two_branch_plan();
    let inputs = bind(
        table(vec![int_col("x", &[1, 2, 3])]),
        table(vec![int_col("y", &[5, 6])]),
    );

    let cold = evaluator
        .evaluate(plan.clone(), &inputs, &EvalOptions::default())
        .unwrap();
    assert_eq!(cold.cache.hits, 0);
    assert_eq!(cold.cache.misses, 2);

    let warm = evaluator
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    assert_eq!(warm.cache.hits, 2);
    assert_eq!(warm.cache.misses, 0);
    assert_eq!(warm.output("fa"), cold.output("fa"));
}

#[test]
fn changed_source_invalidates_only_its_own_path() {
    let store = Arc::new(ResultStore::in_memory(1 << 24));
    let evaluator = Evaluator::new(store);
    let plan = two_branch_plan();

    let first = bind(
        table(vec![int_col("x", &[1, 2, 3])]),
        table(vec![int_col("y", &[5, 6])]),
    );
    evaluator
        .evaluate(plan.clone(), &first, &EvalOptions::default())
        .unwrap();

    // Change one row of `a`; `b` is untouched.
    let second = bind(
        table(vec![int_col("x", &[1, 2, 99])]),
        table(vec![int_col("y", &[5, 6])]),
    );
    let rerun = evaluator
        .evaluate(plan, &second, &EvalOptions::default())
        .unwrap();

    // The sibling branch is served from cache; only the dirty path
    // recomputes.
    assert_eq!(rerun.cache.hits, 1);
    assert_eq!(rerun.cache.misses, 1);
    assert_eq!(common::int_values(rerun.output("fa").unwrap(), "x"), vec![2, 99]);
}

#[test]
fn eviction_then_recompute_reproduces_the_fingerprint() {
    // A budget too small to keep anything resident.
    let store = Arc::new(ResultStore::in_memory(1));
    let evaluator = Evaluator::new(store.clone());
    let plan = two_branch_plan();
    let inputs = bind(
        table(vec![int_col("x", &[1, 2, 3])]),
        table(vec![int_col("y", &[5, 6])]),
    );

    let first = evaluator
        .evaluate(plan.clone(), &inputs, &EvalOptions::default())
        .unwrap();
    let second = evaluator
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();

    // Everything was evicted between runs, so the rerun recomputes —
    // to identical fingerprints and identical bytes.
    assert_eq!(second.cache.hits, 0);
    assert_eq!(first.node_fingerprints(), second.node_fingerprints());
    assert_eq!(
        serde_json::to_vec(first.output("fa").unwrap().as_ref()).unwrap(),
        serde_json::to_vec(second.output("fa").unwrap().as_ref()).unwrap()
    );
}

#[test]
fn pinned_run_survives_unrelated_churn() {
    let row = table(vec![int_col("x", &[1, 2, 3])]);
    let bytes = row.approx_bytes();
    let store = Arc::new(ResultStore::in_memory(bytes * 3));
    let evaluator = Evaluator::new(store.clone());
    let plan = two_branch_plan();
    let inputs = bind(
        table(vec![int_col("x", &[1, 2, 3])]),
        table(vec![int_col("y", &[5, 6])]),
    );

    let pinned = evaluator
        .evaluate(
            plan.clone(),
            &inputs,
            &EvalOptions {
                pin: true,
                ..EvalOptions::default()
            },
        )
        .unwrap();
    assert!(pinned.pinned);

    // Unrelated runs blow well past the budget.
    for n in 0..6 {
        let other = bind(
            table(vec![int_col("x", &[n, n + 1, n + 2, n + 3])]),
            table(vec![int_col("y", &[n * 10, n * 11])]),
        );
        evaluator
            .evaluate(plan.clone(), &other, &EvalOptions::default())
            .unwrap();
    }

    // Every entry reachable from the pinned run is still resident.
    let rerun = evaluator
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    assert_eq!(rerun.cache.hits, 2);
    assert_eq!(rerun.cache.misses, 0);

    store.unpin_run(pinned.id);
}

#[test]
fn scenario_survives_separate_text_branch() {
    // Regression guard: a changed branch with text columns must not
    // disturb sibling fingerprints.
    let mut b = PlanBuilder::new();
    let src = b
        .import(
            "t",
            Schema::new(vec![
                Field::new("id", DataType::Int, false),
                Field::new("v", DataType::Text, false),
            ]),
        )
        .unwrap();
    let sel = b
        .select(
            src,
            vec![SelectColumn {
                name: "v".into(),
                expr: Expr::parse("v").unwrap(),
            }],
        )
        .unwrap();
    b.export("out", sel).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let store = Arc::new(ResultStore::in_memory(1 << 24));
    let evaluator = Evaluator::new(store);
    let inputs = BTreeMap::from([(
        "t".to_string(),
        table(vec![int_col("id", &[1]), text_col("v", &["a"])]),
    )]);
    let one = evaluator
        .evaluate(plan.clone(), &inputs, &EvalOptions::default())
        .unwrap();
    let two = evaluator
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    assert_eq!(one.node_fingerprints(), two.node_fingerprints());
}
