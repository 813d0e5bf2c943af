//! Filter kernel.
//!
//! Keeps rows whose predicate holds. With an audited policy the rejected
//! rows are reported as drops — exactly one record per excluded input
//! row — instead of vanishing silently.

use rowtrace_core::drops::DropEvent;
use rowtrace_core::expr::Expr;
use rowtrace_core::table::Table;
use rowtrace_plan::node::ExcludePolicy;

use crate::error::Result;
use crate::kernel::KernelOutput;
use crate::recipe::RowRecipe;

pub fn eval(predicate: &Expr, on_exclude: &ExcludePolicy, input: &Table) -> Result<KernelOutput> {
    let rows = input.num_rows();
    let mut kept: Vec<u32> = Vec::with_capacity(rows);
    let mut drops = Vec::new();

    for row in 0..rows {
        if predicate.evaluate_bool(input, row)? {
            kept.push(row as u32);
        } else if let ExcludePolicy::Drop { reason, detail } = on_exclude {
            drops.push(DropEvent {
                row: row as u32,
                reason: reason.clone(),
                detail: detail.clone(),
            });
        }
    }

    let table = input.gather(&kept);
    Ok(KernelOutput {
        table,
        recipes: vec![RowRecipe::gather(kept)],
        drops,
    })
}
