//! Union kernel: concatenate operands in order.

use rowtrace_core::table::Table;

use crate::error::{KernelError, Result};
use crate::kernel::KernelOutput;
use crate::recipe::RowRecipe;

pub fn eval(inputs: &[&Table]) -> Result<KernelOutput> {
    if inputs.is_empty() {
        return Err(KernelError::Exec("union of zero inputs".into()));
    }
    let table = Table::concat(inputs)?;
    let total = table.num_rows();

    // Edge k covers the output range its operand landed in; rows outside
    // that range have an empty relation to it.
    let mut recipes = Vec::with_capacity(inputs.len());
    let mut offset = 0usize;
    for input in inputs {
        let rows = input.num_rows();
        let mut sources: Vec<Vec<u32>> = vec![Vec::new(); total];
        for i in 0..rows {
            sources[offset + i] = vec![i as u32];
        }
        recipes.push(RowRecipe::gather_multi(sources));
        offset += rows;
    }

    Ok(KernelOutput::plain(table, recipes))
}
