//! Drop ledger semantics.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{int_col, table};
use rowtrace_core::drops::{DropLedger, DropReason};
use rowtrace_core::expr::Expr;
use rowtrace_core::id::NodeId;
use rowtrace_core::schema::{Field, Schema};
use rowtrace_core::value::DataType;
use rowtrace_exec::{EvalOptions, Evaluator};
use rowtrace_plan::plan::PlanBuilder;
use rowtrace_plan::ExcludePolicy;
use rowtrace_store::ResultStore;

#[test]
fn dropping_filter_accounts_for_every_input_row() {
    let mut b = PlanBuilder::new();
    let src = b
        .import("t", Schema::new(vec![Field::new("x", DataType::Int, false)]))
        .unwrap();
    let kept = b
        .filter(
            src,
            Expr::parse("x > 5").unwrap(),
            ExcludePolicy::Drop {
                reason: DropReason::PredicateFalse,
                detail: Some("below threshold".into()),
            },
        )
        .unwrap();
    b.export("out", kept).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let input_rows = 7usize;
    let inputs = BTreeMap::from([(
        "t".to_string(),
        table(vec![int_col("x", &[1, 9, 2, 8, 3, 7, 4])]),
    )]);
    let run = Evaluator::new(Arc::new(ResultStore::in_memory(1 << 20)))
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();

    let out_rows = run.output("out").unwrap().num_rows();
    let dropped = run.drops.drops_for(kept).len();
    assert_eq!(input_rows, out_rows + dropped);

    for record in run.drops.drops_for(kept) {
        assert_eq!(record.reason, DropReason::PredicateFalse);
        assert_eq!(record.detail.as_deref(), Some("below threshold"));
    }
}

#[test]
fn discard_filters_leave_no_record() {
    let mut b = PlanBuilder::new();
    let src = b
        .import("t", Schema::new(vec![Field::new("x", DataType::Int, false)]))
        .unwrap();
    let kept = b
        .filter(src, Expr::parse("x > 5").unwrap(), ExcludePolicy::Discard)
        .unwrap();
    b.export("out", kept).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let inputs = BTreeMap::from([("t".to_string(), table(vec![int_col("x", &[1, 9])]))]);
    let run = Evaluator::new(Arc::new(ResultStore::in_memory(1 << 20)))
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    assert!(run.drops.is_empty());
}

#[test]
fn each_operation_accounts_only_for_its_own_rows() {
    // Two chained dropping filters; the second one's row indices refer
    // to *its* input, not the original source.
    let mut b = PlanBuilder::new();
    let src = b
        .import("t", Schema::new(vec![Field::new("x", DataType::Int, false)]))
        .unwrap();
    let first = b
        .filter(
            src,
            Expr::parse("x > 1").unwrap(),
            ExcludePolicy::Drop {
                reason: DropReason::PredicateFalse,
                detail: None,
            },
        )
        .unwrap();
    let second = b
        .filter(
            first,
            Expr::parse("x > 3").unwrap(),
            ExcludePolicy::Drop {
                reason: DropReason::Other("too_small".into()),
                detail: None,
            },
        )
        .unwrap();
    b.export("out", second).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let inputs = BTreeMap::from([(
        "t".to_string(),
        table(vec![int_col("x", &[1, 2, 3, 4])]),
    )]);
    let run = Evaluator::new(Arc::new(ResultStore::in_memory(1 << 20)))
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();

    // First filter drops source row 0; second sees [2, 3, 4] and drops
    // its own rows 0 and 1.
    let first_drops: Vec<u32> = run.drops.drops_for(first).iter().map(|r| r.row).collect();
    let second_drops: Vec<u32> = run.drops.drops_for(second).iter().map(|r| r.row).collect();
    assert_eq!(first_drops, vec![0]);
    assert_eq!(second_drops, vec![0, 1]);

    let summary = run.drops.summarize();
    assert_eq!(summary.get("predicate_false"), Some(&1));
    assert_eq!(summary.get("too_small"), Some(&2));
}

#[test]
fn ledger_is_queryable_by_node_and_reason() {
    let mut ledger = DropLedger::new();
    let n1 = NodeId::new(1);
    let n2 = NodeId::new(2);
    ledger.record(n1, 0, DropReason::PredicateFalse, None);
    ledger.record(n2, 3, DropReason::DuplicateRow, Some("seen before".into()));
    ledger.record(n1, 5, DropReason::PredicateFalse, None);

    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.drops_for(n1).len(), 2);
    assert_eq!(ledger.drops_for(n2).len(), 1);
    let summary = ledger.summarize();
    assert_eq!(summary.get("predicate_false"), Some(&2));
    assert_eq!(summary.get("duplicate_row"), Some(&1));
}

#[test]
fn drops_are_replayed_on_cache_hits() {
    let mut b = PlanBuilder::new();
    let src = b
        .import("t", Schema::new(vec![Field::new("x", DataType::Int, false)]))
        .unwrap();
    let kept = b
        .filter(
            src,
            Expr::parse("x > 5").unwrap(),
            ExcludePolicy::Drop {
                reason: DropReason::PredicateFalse,
                detail: None,
            },
        )
        .unwrap();
    b.export("out", kept).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let store = Arc::new(ResultStore::in_memory(1 << 20));
    let evaluator = Evaluator::new(store);
    let inputs = BTreeMap::from([("t".to_string(), table(vec![int_col("x", &[1, 9])]))]);

    let cold = evaluator
        .evaluate(plan.clone(), &inputs, &EvalOptions::default())
        .unwrap();
    let warm = evaluator
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();

    assert_eq!(warm.cache.hits, 1);
    assert_eq!(cold.drops.records(), warm.drops.records());
}
