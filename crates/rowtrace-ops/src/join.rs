//! Inner equi-join kernel: build a hash table on the right side, probe
//! with the left in order.
//!
//! Output order is left-major: every left row's matches appear together,
//! in right-side order. A null key never matches. The (left, right) index
//! pairs the probe produces are exactly the per-edge recipes lineage
//! needs.

use std::collections::HashMap;

use rowtrace_core::schema::Schema;
use rowtrace_core::table::{Column, Table};
use rowtrace_core::value::ValueKey;

use crate::error::{KernelError, Result};
use crate::kernel::KernelOutput;
use crate::recipe::RowRecipe;

pub fn eval(
    on: &[(String, String)],
    schema: &Schema,
    left: &Table,
    right: &Table,
) -> Result<KernelOutput> {
    let left_keys = key_columns(left, on.iter().map(|(l, _)| l.as_str()))?;
    let right_keys = key_columns(right, on.iter().map(|(_, r)| r.as_str()))?;

    // Build phase.
    let mut table: HashMap<Vec<ValueKey>, Vec<u32>> = HashMap::new();
    for row in 0..right.num_rows() {
        let Some(key) = row_key(&right_keys, row) else {
            continue;
        };
        table.entry(key).or_default().push(row as u32);
    }

    // Probe phase.
    let mut left_idx: Vec<u32> = Vec::new();
    let mut right_idx: Vec<u32> = Vec::new();
    for row in 0..left.num_rows() {
        let Some(key) = row_key(&left_keys, row) else {
            continue;
        };
        if let Some(matches) = table.get(&key) {
            for &r in matches {
                left_idx.push(row as u32);
                right_idx.push(r);
            }
        }
    }

    // Left fields, then right fields minus the join keys — the declared
    // shape the builder derived.
    let mut columns: Vec<Column> = Vec::with_capacity(schema.len());
    for col in left.columns() {
        columns.push(gathered(col, &left_idx));
    }
    for col in right.columns() {
        if on.iter().any(|(_, r)| r == &col.name) {
            continue;
        }
        columns.push(gathered(col, &right_idx));
    }

    let table = Table::try_new(columns)?;
    Ok(KernelOutput::plain(
        table,
        vec![RowRecipe::gather(left_idx), RowRecipe::gather(right_idx)],
    ))
}

fn key_columns<'a, 't>(
    table: &'t Table,
    names: impl Iterator<Item = &'a str>,
) -> Result<Vec<&'t Column>> {
    names
        .map(|name| {
            table
                .column(name)
                .ok_or_else(|| KernelError::Schema(format!("join key '{name}' not found")))
        })
        .collect()
}

/// Key of one row, or `None` if any component is null.
fn row_key(columns: &[&Column], row: usize) -> Option<Vec<ValueKey>> {
    let mut key = Vec::with_capacity(columns.len());
    for col in columns {
        let v = &col.values[row];
        if v.is_null() {
            return None;
        }
        key.push(v.key());
    }
    Some(key)
}

fn gathered(col: &Column, indices: &[u32]) -> Column {
    Column::new(
        col.name.clone(),
        col.dtype.clone(),
        col.nullable,
        indices
            .iter()
            .map(|&i| col.values[i as usize].clone())
            .collect(),
    )
}
