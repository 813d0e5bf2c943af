//! Update kernel: keep the input shape, recomputing the assigned columns
//! in place.

use rowtrace_core::expr::Expr;
use rowtrace_core::schema::Schema;
use rowtrace_core::table::{Column, Table};

use crate::error::{KernelError, Result};
use crate::kernel::KernelOutput;
use crate::recipe::RowRecipe;

pub fn eval(
    assignments: &[(String, Expr)],
    schema: &Schema,
    input: &Table,
) -> Result<KernelOutput> {
    let rows = input.num_rows();
    let mut columns: Vec<Column> = input.columns().to_vec();
    for (name, expr) in assignments {
        let idx = columns
            .iter()
            .position(|c| &c.name == name)
            .ok_or_else(|| KernelError::Schema(format!("unknown column '{name}'")))?;
        let field = schema
            .field_named(name)
            .ok_or_else(|| KernelError::Schema(format!("column '{name}' missing from shape")))?;
        let mut values = Vec::with_capacity(rows);
        for row in 0..rows {
            values.push(expr.evaluate(input, row)?);
        }
        columns[idx] = Column::new(name.clone(), field.dtype.clone(), field.nullable, values);
    }
    let table = Table::try_new(columns)?;
    Ok(KernelOutput::plain(table, vec![RowRecipe::Identity]))
}
