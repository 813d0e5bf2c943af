//! Plan construction and schema derivation.

use rowtrace_core::expr::Expr;
use rowtrace_core::schema::{Field, Schema};
use rowtrace_core::value::DataType;
use rowtrace_plan::plan::PlanBuilder;
use rowtrace_plan::{Aggregate, ExcludePolicy, PlanError, SelectColumn};

fn kv_schema() -> Schema {
    Schema::new(vec![
        Field::new("k", DataType::Int, false),
        Field::new("v", DataType::Text, false),
    ])
}

#[test]
fn select_infers_output_types() {
    let mut b = PlanBuilder::new();
    let src = b
        .import(
            "t",
            Schema::new(vec![
                Field::new("x", DataType::Int, false),
                Field::new("f", DataType::Float, true),
            ]),
        )
        .unwrap();
    let sel = b
        .select(
            src,
            vec![
                SelectColumn {
                    name: "sum".into(),
                    expr: Expr::parse("x + f").unwrap(),
                },
                SelectColumn {
                    name: "flag".into(),
                    expr: Expr::parse("x > 2").unwrap(),
                },
            ],
        )
        .unwrap();
    b.export("out", sel).unwrap();
    let plan = b.build().unwrap();

    let schema = &plan.node(sel).schema;
    assert_eq!(schema.fields[0].dtype, DataType::Float);
    assert!(schema.fields[0].nullable);
    assert_eq!(schema.fields[1].dtype, DataType::Bool);
}

#[test]
fn join_schema_keeps_the_key_once() {
    let mut b = PlanBuilder::new();
    let left = b.import("left", kv_schema()).unwrap();
    let right = b
        .import(
            "right",
            Schema::new(vec![
                Field::new("k", DataType::Int, false),
                Field::new("w", DataType::Text, false),
            ]),
        )
        .unwrap();
    let joined = b.join(left, right, vec![("k".into(), "k".into())]).unwrap();
    b.export("out", joined).unwrap();
    let plan = b.build().unwrap();

    let names: Vec<&str> = plan
        .node(joined)
        .schema
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    assert_eq!(names, vec!["k", "v", "w"]);
}

#[test]
fn join_rejects_key_type_mismatch() {
    let mut b = PlanBuilder::new();
    let left = b.import("left", kv_schema()).unwrap();
    let right = b
        .import(
            "right",
            Schema::new(vec![Field::new("k", DataType::Text, false)]),
        )
        .unwrap();
    let err = b
        .join(left, right, vec![("k".into(), "k".into())])
        .unwrap_err();
    assert!(matches!(err, PlanError::Type(_)));
}

#[test]
fn join_rejects_colliding_columns() {
    let mut b = PlanBuilder::new();
    let left = b.import("left", kv_schema()).unwrap();
    let right = b.import("right", kv_schema()).unwrap();
    // Both sides carry a non-key column "v".
    let err = b
        .join(left, right, vec![("k".into(), "k".into())])
        .unwrap_err();
    assert!(matches!(err, PlanError::DuplicateColumn(_)));
}

#[test]
fn group_schema_is_keys_then_aggregates() {
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
            vec![
                Aggregate::Count,
                Aggregate::Sum { column: "n".into() },
                Aggregate::Min { column: "n".into() },
            ],
        )
        .unwrap();
    b.export("out", grouped).unwrap();
    let plan = b.build().unwrap();

    let schema = &plan.node(grouped).schema;
    let names: Vec<&str> = schema.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["k", "count", "sum_n", "min_n"]);
    assert_eq!(schema.fields[1].dtype, DataType::Int);
    assert_eq!(schema.fields[2].dtype, DataType::Float);
    // Min keeps the source type.
    assert_eq!(schema.fields[3].dtype, DataType::Int);
}

#[test]
fn group_rejects_sum_over_text() {
    let mut b = PlanBuilder::new();
    let src = b.import("t", kv_schema()).unwrap();
    let err = b
        .group(src, vec!["k".into()], vec![Aggregate::Sum { column: "v".into() }])
        .unwrap_err();
    assert!(matches!(err, PlanError::Type(_)));
}

#[test]
fn union_rejects_differing_shapes() {
    let mut b = PlanBuilder::new();
    let first = b.import("first", kv_schema()).unwrap();
    let second = b
        .import(
            "second",
            Schema::new(vec![Field::new("k", DataType::Int, false)]),
        )
        .unwrap();
    let err = b.union(vec![first, second]).unwrap_err();
    assert!(matches!(err, PlanError::Type(_)));
}

#[test]
fn filter_rejects_unknown_predicate_columns() {
    let mut b = PlanBuilder::new();
    let src = b.import("t", kv_schema()).unwrap();
    let err = b
        .filter(
            src,
            Expr::parse("missing == 1").unwrap(),
            ExcludePolicy::Discard,
        )
        .unwrap_err();
    assert!(matches!(err, PlanError::UnknownColumn(_)));
}

#[test]
fn duplicate_bindings_are_rejected() {
    let mut b = PlanBuilder::new();
    let src = b.import("t", kv_schema()).unwrap();
    assert!(matches!(
        b.import("t", kv_schema()),
        Err(PlanError::DuplicateBinding(_))
    ));
    b.export("out", src).unwrap();
    assert!(matches!(
        b.export("out", src),
        Err(PlanError::DuplicateBinding(_))
    ));
}

#[test]
fn plans_without_outputs_are_rejected() {
    let mut b = PlanBuilder::new();
    b.import("t", kv_schema()).unwrap();
    assert!(matches!(b.build(), Err(PlanError::Malformed(_))));
}

#[test]
fn topo_order_is_deterministic_and_respects_dependencies() {
    let mut b = PlanBuilder::new();
    let a = b.import("a", kv_schema()).unwrap();
    let c = b.import("c", kv_schema()).unwrap();
    let u = b.union(vec![a, c]).unwrap();
    let d = b.distinct(u, vec!["k".into()], false).unwrap();
    b.export("out", d).unwrap();
    let plan = b.build().unwrap();

    let order = plan.topo_order().unwrap();
    let pos = |n| order.iter().position(|&x| x == n).unwrap();
    assert!(pos(a) < pos(u));
    assert!(pos(c) < pos(u));
    assert!(pos(u) < pos(d));
    assert_eq!(order, plan.topo_order().unwrap());
}

#[test]
fn depths_level_independent_branches_together() {
    let mut b = PlanBuilder::new();
    let a = b.import("a", kv_schema()).unwrap();
    let c = b.import("c", kv_schema()).unwrap();
    let fa = b
        .filter(a, Expr::parse("k > 0").unwrap(), ExcludePolicy::Discard)
        .unwrap();
    let fc = b
        .filter(c, Expr::parse("k > 0").unwrap(), ExcludePolicy::Discard)
        .unwrap();
    b.export("fa", fa).unwrap();
    b.export("fc", fc).unwrap();
    let plan = b.build().unwrap();

    let depths = plan.depths().unwrap();
    assert_eq!(depths[a.index()], 0);
    assert_eq!(depths[c.index()], 0);
    assert_eq!(depths[fa.index()], 1);
    assert_eq!(depths[fc.index()], 1);
}
