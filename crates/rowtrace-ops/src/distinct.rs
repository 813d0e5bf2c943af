//! Distinct kernel: keep the first row of each key, preserving order.
//!
//! `consecutive` restricts deduplication to adjacent runs of equal keys,
//! which is cheaper and is what run-length style inputs want.

use std::collections::HashSet;

use rowtrace_core::table::Table;
use rowtrace_core::value::ValueKey;

use crate::error::{KernelError, Result};
use crate::kernel::KernelOutput;
use crate::recipe::RowRecipe;

pub fn eval(keys: &[String], consecutive: bool, input: &Table) -> Result<KernelOutput> {
    let rows = input.num_rows();
    let key_columns: Vec<_> = if keys.is_empty() {
        input.columns().iter().collect()
    } else {
        keys.iter()
            .map(|k| {
                input
                    .column(k)
                    .ok_or_else(|| KernelError::Schema(format!("unknown key column '{k}'")))
            })
            .collect::<Result<_>>()?
    };

    let key_of = |row: usize| -> Vec<ValueKey> {
        key_columns.iter().map(|c| c.values[row].key()).collect()
    };

    let mut kept: Vec<u32> = Vec::new();
    if consecutive {
        let mut previous: Option<Vec<ValueKey>> = None;
        for row in 0..rows {
            let key = key_of(row);
            if previous.as_ref() != Some(&key) {
                kept.push(row as u32);
                previous = Some(key);
            }
        }
    } else {
        let mut seen: HashSet<Vec<ValueKey>> = HashSet::new();
        for row in 0..rows {
            if seen.insert(key_of(row)) {
                kept.push(row as u32);
            }
        }
    }

    let table = input.gather(&kept);
    Ok(KernelOutput::plain(table, vec![RowRecipe::gather(kept)]))
}
