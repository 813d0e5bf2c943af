//! The debug query surface: lineage reports, drop summaries, run diffs.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{int_col, table, text_col};
use rowtrace_core::drops::DropReason;
use rowtrace_core::expr::Expr;
use rowtrace_core::schema::{Field, Schema};
use rowtrace_core::table::Table;
use rowtrace_core::value::DataType;
use rowtrace_exec::debug::DebugError;
use rowtrace_exec::{diff_runs, drop_summary, lineage_report, EvalOptions, Evaluator, OutputDiff, Run};
use rowtrace_plan::plan::{Plan, PlanBuilder};
use rowtrace_plan::ExcludePolicy;
use rowtrace_store::ResultStore;

fn drop_filter_plan() -> Arc<Plan> {
    let mut b = PlanBuilder::new();
    let src = b
        .import(
            "events",
            Schema::new(vec![
                Field::new("id", DataType::Int, false),
                Field::new("v", DataType::Text, false),
            ]),
        )
        .unwrap();
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
    Arc::new(b.build().unwrap())
}

fn run_with(plan: Arc<Plan>, t: Table, trace: bool) -> Run {
    let evaluator = Evaluator::new(Arc::new(ResultStore::in_memory(1 << 24)));
    let inputs = BTreeMap::from([("events".to_string(), t)]);
    let opts = EvalOptions {
        trace,
        ..EvalOptions::default()
    };
    evaluator.evaluate(plan, &inputs, &opts).unwrap()
}

fn sample() -> Table {
    table(vec![
        int_col("id", &[1, 2, 3]),
        text_col("v", &["a", "b", "a"]),
    ])
}

#[test]
fn lineage_report_names_the_source_rows() {
    let run = run_with(drop_filter_plan(), sample(), true);
    let report = lineage_report(&run, "out", 1).unwrap();
    assert_eq!(report.output, "out");
    assert_eq!(report.row, 1);
    assert_eq!(report.spine.len(), 1);
    // Output row 1 is input row 2.
    assert_eq!(report.spine[0].rows, vec![2]);
    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].input.as_deref(), Some("events"));
    assert_eq!(report.sources[0].rows, vec![2]);
}

#[test]
fn lineage_report_requires_a_trace() {
    let run = run_with(drop_filter_plan(), sample(), false);
    assert!(matches!(
        lineage_report(&run, "out", 0),
        Err(DebugError::TraceMissing)
    ));
}

#[test]
fn lineage_report_rejects_bad_targets() {
    let run = run_with(drop_filter_plan(), sample(), true);
    assert!(matches!(
        lineage_report(&run, "nope", 0),
        Err(DebugError::UnknownOutput(_))
    ));
    assert!(matches!(
        lineage_report(&run, "out", 99),
        Err(DebugError::RowOutOfBounds { .. })
    ));
}

#[test]
fn drop_summary_counts_by_reason() {
    let run = run_with(drop_filter_plan(), sample(), false);
    let summary = drop_summary(&run);
    assert_eq!(summary.get("predicate_false"), Some(&1));
}

#[test]
fn diff_of_identical_runs_is_unchanged_by_fingerprint() {
    let plan = drop_filter_plan();
    let a = run_with(plan.clone(), sample(), false);
    let b = run_with(plan, sample(), false);
    let diff = diff_runs(&a, &b);
    assert_eq!(diff.outputs.get("out"), Some(&OutputDiff::Unchanged));
}

#[test]
fn diff_reports_added_and_removed_rows() {
    let plan = drop_filter_plan();
    let a = run_with(plan.clone(), sample(), false);
    let b = run_with(
        plan,
        table(vec![
            int_col("id", &[1, 2, 4]),
            text_col("v", &["a", "b", "a"]),
        ]),
        false,
    );
    let diff = diff_runs(&a, &b);
    match diff.outputs.get("out") {
        Some(OutputDiff::Changed { added, removed }) => {
            // Row (3, "a") vanished, row (4, "a") appeared.
            assert_eq!(removed, &vec![1]);
            assert_eq!(added, &vec![1]);
        }
        other => panic!("expected row-level diff, got {other:?}"),
    }
}
