//! End-to-end evaluation of small plans.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{int_col, table, text_col, text_values};
use rowtrace_core::cancel::CancelToken;
use rowtrace_core::drops::DropReason;
use rowtrace_core::expr::Expr;
use rowtrace_core::schema::{Field, Schema};
use rowtrace_core::table::Table;
use rowtrace_core::value::{DataType, Value};
use rowtrace_exec::{EvalError, EvalOptions, Evaluator};
use rowtrace_plan::plan::PlanBuilder;
use rowtrace_plan::{Aggregate, ExcludePolicy, SelectColumn};
use rowtrace_store::ResultStore;

fn evaluator() -> Evaluator {
    Evaluator::new(Arc::new(ResultStore::in_memory(64 * 1024 * 1024)))
}

fn id_v_schema() -> Schema {
    Schema::new(vec![
        Field::new("id", DataType::Int, false),
        Field::new("v", DataType::Text, false),
    ])
}

fn single_input(name: &str, t: Table) -> BTreeMap<String, Table> {
    BTreeMap::from([(name.to_string(), t)])
}

#[test]
fn select_projects_and_computes() {
    let mut b = PlanBuilder::new();
    let src = b
        .import(
            "t",
            Schema::new(vec![
                Field::new("x", DataType::Int, false),
                Field::new("y", DataType::Int, false),
            ]),
        )
        .unwrap();
    let sel = b
        .select(
            src,
            vec![
                SelectColumn {
                    name: "x".into(),
                    expr: Expr::parse("x").unwrap(),
                },
                SelectColumn {
                    name: "total".into(),
                    expr: Expr::parse("x + y").unwrap(),
                },
            ],
        )
        .unwrap();
    b.export("out", sel).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let inputs = single_input("t", table(vec![int_col("x", &[1, 2]), int_col("y", &[10, 20])]));
    let run = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    let out = run.output("out").unwrap();
    assert_eq!(common::int_values(out, "total"), vec![11, 22]);
}

#[test]
fn scenario_drop_filter_records_one_drop() {
    let mut b = PlanBuilder::new();
    let src = b.import("events", id_v_schema()).unwrap();
    let kept = b
        .filter(
            src,
            Expr::parse("v == \"a\"").unwrap(),
            ExcludePolicy::Drop {
                reason: DropReason::PredicateFalse,
                detail: None,
            },
        )
        .unwrap();
    b.export("out", kept).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let inputs = single_input(
        "events",
        table(vec![int_col("id", &[1, 2]), text_col("v", &["a", "b"])]),
    );
    let run = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();

    let out = run.output("out").unwrap();
    assert_eq!(out.num_rows(), 1);
    assert_eq!(common::int_values(out, "id"), vec![1]);

    let drops = run.drops.drops_for(kept);
    assert_eq!(drops.len(), 1);
    assert_eq!(drops[0].row, 1);
    assert_eq!(drops[0].reason, DropReason::PredicateFalse);
    assert_eq!(run.drops.summarize().get("predicate_false"), Some(&1));
}

#[test]
fn scenario_two_input_join_with_lineage() {
    let mut b = PlanBuilder::new();
    let left = b
        .import(
            "left",
            Schema::new(vec![
                Field::new("k", DataType::Int, false),
                Field::new("x", DataType::Int, false),
            ]),
        )
        .unwrap();
    let right = b
        .import(
            "right",
            Schema::new(vec![
                Field::new("k", DataType::Int, false),
                Field::new("y", DataType::Int, false),
            ]),
        )
        .unwrap();
    let joined = b.join(left, right, vec![("k".into(), "k".into())]).unwrap();
    b.export("out", joined).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let mut inputs = BTreeMap::new();
    inputs.insert(
        "left".to_string(),
        table(vec![int_col("k", &[1]), int_col("x", &[10])]),
    );
    inputs.insert(
        "right".to_string(),
        table(vec![int_col("k", &[1]), int_col("y", &[20])]),
    );

    let opts = EvalOptions {
        trace: true,
        ..EvalOptions::default()
    };
    let run = evaluator().evaluate(plan, &inputs, &opts).unwrap();

    let out = run.output("out").unwrap();
    assert_eq!(out.num_rows(), 1);
    assert_eq!(common::int_values(out, "k"), vec![1]);
    assert_eq!(common::int_values(out, "x"), vec![10]);
    assert_eq!(common::int_values(out, "y"), vec![20]);

    // Output row 0 depends on input row 0 on both edges.
    let trace = run.trace.as_ref().unwrap();
    for input in 0..2 {
        let matrix = trace.edge(joined, input).unwrap();
        assert_eq!(matrix.deps_of(0).unwrap(), vec![0]);
    }
}

#[test]
fn join_emits_one_row_per_matching_pair_in_left_major_order() {
    let mut b = PlanBuilder::new();
    let left = b
        .import(
            "left",
            Schema::new(vec![
                Field::new("k", DataType::Int, false),
                Field::new("x", DataType::Int, false),
            ]),
        )
        .unwrap();
    let right = b
        .import(
            "right",
            Schema::new(vec![
                Field::new("k", DataType::Int, false),
                Field::new("y", DataType::Int, false),
            ]),
        )
        .unwrap();
    let joined = b.join(left, right, vec![("k".into(), "k".into())]).unwrap();
    b.export("out", joined).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let mut inputs = BTreeMap::new();
    inputs.insert(
        "left".to_string(),
        table(vec![int_col("k", &[1, 2]), int_col("x", &[10, 20])]),
    );
    inputs.insert(
        "right".to_string(),
        table(vec![int_col("k", &[2, 2, 3]), int_col("y", &[7, 8, 9])]),
    );
    let run = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    let out = run.output("out").unwrap();
    assert_eq!(common::int_values(out, "x"), vec![20, 20]);
    assert_eq!(common::int_values(out, "y"), vec![7, 8]);
}

#[test]
fn group_preserves_first_seen_key_order() {
    let mut b = PlanBuilder::new();
    let src = b
        .import(
            "t",
            Schema::new(vec![
                Field::new("k", DataType::Text, false),
                Field::new("n", DataType::Int, false),
            ]),
        )
        .unwrap();
    let grouped = b
        .group(
            src,
            vec!["k".into()],
            vec![Aggregate::Count, Aggregate::Sum { column: "n".into() }],
        )
        .unwrap();
    b.export("out", grouped).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let inputs = single_input(
        "t",
        table(vec![
            text_col("k", &["b", "a", "b", "c"]),
            int_col("n", &[1, 2, 3, 4]),
        ]),
    );
    let run = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    let out = run.output("out").unwrap();
    assert_eq!(text_values(out, "k"), vec!["b", "a", "c"]);
    assert_eq!(common::int_values(out, "count"), vec![2, 1, 1]);
    let sums = out.column("sum_n").unwrap();
    assert_eq!(
        sums.values,
        vec![Value::Float(4.0), Value::Float(2.0), Value::Float(4.0)]
    );
}

#[test]
fn distinct_keeps_first_occurrence() {
    let mut b = PlanBuilder::new();
    let src = b.import("t", id_v_schema()).unwrap();
    let uniq = b.distinct(src, vec!["v".into()], false).unwrap();
    b.export("out", uniq).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let inputs = single_input(
        "t",
        table(vec![
            int_col("id", &[1, 2, 3, 4]),
            text_col("v", &["a", "b", "a", "b"]),
        ]),
    );
    let run = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    assert_eq!(common::int_values(run.output("out").unwrap(), "id"), vec![1, 2]);
}

#[test]
fn distinct_consecutive_only_collapses_runs() {
    let mut b = PlanBuilder::new();
    let src = b.import("t", id_v_schema()).unwrap();
    let uniq = b.distinct(src, vec!["v".into()], true).unwrap();
    b.export("out", uniq).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let inputs = single_input(
        "t",
        table(vec![
            int_col("id", &[1, 2, 3, 4]),
            text_col("v", &["a", "a", "b", "a"]),
        ]),
    );
    let run = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    // The final "a" is a new run, so it survives.
    assert_eq!(
        common::int_values(run.output("out").unwrap(), "id"),
        vec![1, 3, 4]
    );
}

#[test]
fn union_concatenates_in_operand_order() {
    let mut b = PlanBuilder::new();
    let first = b.import("first", id_v_schema()).unwrap();
    let second = b.import("second", id_v_schema()).unwrap();
    let both = b.union(vec![first, second]).unwrap();
    b.export("out", both).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let mut inputs = BTreeMap::new();
    inputs.insert(
        "first".to_string(),
        table(vec![int_col("id", &[1]), text_col("v", &["a"])]),
    );
    inputs.insert(
        "second".to_string(),
        table(vec![int_col("id", &[2]), text_col("v", &["b"])]),
    );
    let run = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap();
    assert_eq!(common::int_values(run.output("out").unwrap(), "id"), vec![1, 2]);
}

#[test]
fn identical_invocations_are_byte_identical() {
    let build = || {
        let mut b = PlanBuilder::new();
        let src = b.import("t", id_v_schema()).unwrap();
        let kept = b
            .filter(
                src,
                Expr::parse("id > 1").unwrap(),
                ExcludePolicy::Discard,
            )
            .unwrap();
        let grouped = b
            .group(kept, vec!["v".into()], vec![Aggregate::Count])
            .unwrap();
        b.export("out", grouped).unwrap();
        Arc::new(b.build().unwrap())
    };
    let inputs = single_input(
        "t",
        table(vec![
            int_col("id", &[1, 2, 3, 4]),
            text_col("v", &["x", "y", "x", "y"]),
        ]),
    );

    // Independent evaluators with independent stores.
    let run_a = evaluator()
        .evaluate(build(), &inputs, &EvalOptions::default())
        .unwrap();
    let run_b = evaluator()
        .evaluate(build(), &inputs, &EvalOptions::default())
        .unwrap();

    let bytes_a = serde_json::to_vec(&*run_a.output("out").unwrap().clone()).unwrap();
    let bytes_b = serde_json::to_vec(&*run_b.output("out").unwrap().clone()).unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn direct_edge_purity_only_the_mutated_row_changes() {
    let build = || {
        let mut b = PlanBuilder::new();
        let src = b
            .import("t", Schema::new(vec![Field::new("x", DataType::Int, false)]))
            .unwrap();
        let sel = b
            .select(
                src,
                vec![SelectColumn {
                    name: "doubled".into(),
                    expr: Expr::parse("x * 2").unwrap(),
                }],
            )
            .unwrap();
        b.export("out", sel).unwrap();
        Arc::new(b.build().unwrap())
    };

    let before = single_input("t", table(vec![int_col("x", &[1, 2, 3])]));
    let after = single_input("t", table(vec![int_col("x", &[1, 99, 3])]));

    let run_before = evaluator()
        .evaluate(build(), &before, &EvalOptions::default())
        .unwrap();
    let run_after = evaluator()
        .evaluate(build(), &after, &EvalOptions::default())
        .unwrap();

    let a = common::int_values(run_before.output("out").unwrap(), "doubled");
    let b = common::int_values(run_after.output("out").unwrap(), "doubled");
    assert_eq!(a[0], b[0]);
    assert_ne!(a[1], b[1]);
    assert_eq!(a[2], b[2]);
}

#[test]
fn missing_binding_is_unbound_input() {
    let mut b = PlanBuilder::new();
    let src = b.import("t", id_v_schema()).unwrap();
    b.export("out", src).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let err = evaluator()
        .evaluate(plan, &BTreeMap::new(), &EvalOptions::default())
        .unwrap_err();
    assert!(matches!(err, EvalError::UnboundInput(_)));
}

#[test]
fn extra_binding_is_unbound_input() {
    let mut b = PlanBuilder::new();
    let src = b.import("t", id_v_schema()).unwrap();
    b.export("out", src).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let mut inputs = single_input(
        "t",
        table(vec![int_col("id", &[1]), text_col("v", &["a"])]),
    );
    inputs.insert("mystery".to_string(), table(vec![int_col("id", &[1])]));
    let err = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap_err();
    assert!(matches!(err, EvalError::UnboundInput(_)));
}

#[test]
fn wrong_shape_is_schema_mismatch() {
    let mut b = PlanBuilder::new();
    let src = b.import("t", id_v_schema()).unwrap();
    b.export("out", src).unwrap();
    let plan = Arc::new(b.build().unwrap());

    // Text column where an int was declared.
    let inputs = single_input(
        "t",
        table(vec![text_col("id", &["1"]), text_col("v", &["a"])]),
    );
    let err = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap_err();
    assert!(matches!(err, EvalError::SchemaMismatch { .. }));
}

#[test]
fn kernel_error_carries_the_node_identity() {
    let mut b = PlanBuilder::new();
    let src = b
        .import("t", Schema::new(vec![Field::new("x", DataType::Int, false)]))
        .unwrap();
    let sel = b
        .select(
            src,
            vec![SelectColumn {
                name: "bad".into(),
                expr: Expr::parse("10 / x").unwrap(),
            }],
        )
        .unwrap();
    b.export("out", sel).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let inputs = single_input("t", table(vec![int_col("x", &[1, 0])]));
    let err = evaluator()
        .evaluate(plan, &inputs, &EvalOptions::default())
        .unwrap_err();
    match err {
        EvalError::Operation { node, .. } => assert_eq!(node, sel),
        other => panic!("expected operation error, got {other:?}"),
    }
}

#[test]
fn cancelled_token_aborts_the_run() {
    let mut b = PlanBuilder::new();
    let src = b.import("t", id_v_schema()).unwrap();
    b.export("out", src).unwrap();
    let plan = Arc::new(b.build().unwrap());

    let cancel = CancelToken::new();
    cancel.cancel();
    let opts = EvalOptions {
        cancel,
        ..EvalOptions::default()
    };
    let inputs = single_input(
        "t",
        table(vec![int_col("id", &[1]), text_col("v", &["a"])]),
    );
    let err = evaluator().evaluate(plan, &inputs, &opts).unwrap_err();
    assert!(matches!(err, EvalError::Cancelled));
}
