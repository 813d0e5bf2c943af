//! Select kernel: project or recompute columns, one output row per
//! input row.

use rowtrace_core::schema::Schema;
use rowtrace_core::table::{Column, Table};
use rowtrace_plan::node::SelectColumn;

use crate::error::Result;
use crate::kernel::KernelOutput;
use crate::recipe::RowRecipe;

pub fn eval(columns: &[SelectColumn], schema: &Schema, input: &Table) -> Result<KernelOutput> {
    let rows = input.num_rows();
    let mut out = Vec::with_capacity(columns.len());
    for (col, field) in columns.iter().zip(&schema.fields) {
        let mut values = Vec::with_capacity(rows);
        for row in 0..rows {
            values.push(col.expr.evaluate(input, row)?);
        }
        out.push(Column::new(
            field.name.clone(),
            field.dtype.clone(),
            field.nullable,
            values,
        ));
    }
    let table = Table::try_new(out)?;
    Ok(KernelOutput::plain(table, vec![RowRecipe::Identity]))
}
