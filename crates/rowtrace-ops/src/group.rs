//! Group kernel: aggregate rows sharing a key, preserving first-seen key
//! order.
//!
//! The insertion-ordered table (Vec + HashMap) rather than bare HashMap
//! iteration keeps output order deterministic, which fingerprinting
//! depends on.

use std::collections::HashMap;

use rowtrace_core::schema::Schema;
use rowtrace_core::table::{Column, Table};
use rowtrace_core::value::{Value, ValueKey};
use rowtrace_plan::node::Aggregate;

use crate::error::{KernelError, Result};
use crate::kernel::KernelOutput;
use crate::recipe::RowRecipe;

pub fn eval(
    keys: &[String],
    aggregates: &[Aggregate],
    schema: &Schema,
    input: &Table,
) -> Result<KernelOutput> {
    let key_columns: Vec<&Column> = keys
        .iter()
        .map(|k| {
            input
                .column(k)
                .ok_or_else(|| KernelError::Schema(format!("unknown key column '{k}'")))
        })
        .collect::<Result<_>>()?;

    let mut index: HashMap<Vec<ValueKey>, usize> = HashMap::new();
    let mut members: Vec<Vec<u32>> = Vec::new();
    let mut first_row: Vec<u32> = Vec::new();

    for row in 0..input.num_rows() {
        let key: Vec<ValueKey> = key_columns.iter().map(|c| c.values[row].key()).collect();
        match index.get(&key) {
            Some(&group) => members[group].push(row as u32),
            None => {
                index.insert(key, members.len());
                members.push(vec![row as u32]);
                first_row.push(row as u32);
            }
        }
    }

    let groups = members.len();
    let mut columns: Vec<Column> = Vec::with_capacity(schema.len());

    for (key_col, field) in key_columns.iter().zip(&schema.fields) {
        let values = first_row
            .iter()
            .map(|&r| key_col.values[r as usize].clone())
            .collect();
        columns.push(Column::new(
            field.name.clone(),
            field.dtype.clone(),
            field.nullable,
            values,
        ));
    }

    for (agg, field) in aggregates.iter().zip(&schema.fields[keys.len()..]) {
        let source = match agg.column() {
            Some(name) => Some(
                input
                    .column(name)
                    .ok_or_else(|| KernelError::Schema(format!("unknown column '{name}'")))?,
            ),
            None => None,
        };
        let mut values = Vec::with_capacity(groups);
        for rows in &members {
            values.push(aggregate_group(agg, source, rows)?);
        }
        columns.push(Column::new(
            field.name.clone(),
            field.dtype.clone(),
            field.nullable,
            values,
        ));
    }

    let table = Table::try_new(columns)?;
    Ok(KernelOutput::plain(
        table,
        vec![RowRecipe::gather_multi(members)],
    ))
}

/// Fold one group. Nulls are skipped by every aggregate except Count,
/// which counts rows; an all-null group yields Null.
fn aggregate_group(agg: &Aggregate, source: Option<&Column>, rows: &[u32]) -> Result<Value> {
    let col_or_err = || {
        source.ok_or_else(|| KernelError::Exec("aggregate is missing its source column".into()))
    };
    match agg {
        Aggregate::Count => Ok(Value::Int(rows.len() as i64)),
        Aggregate::First { .. } => {
            let col = col_or_err()?;
            Ok(rows
                .first()
                .map(|&r| col.values[r as usize].clone())
                .unwrap_or(Value::Null))
        }
        Aggregate::Sum { .. } | Aggregate::Mean { .. } => {
            let col = col_or_err()?;
            let mut sum = 0.0f64;
            let mut count = 0u64;
            for &r in rows {
                match &col.values[r as usize] {
                    Value::Null => {}
                    Value::Int(i) => {
                        sum += *i as f64;
                        count += 1;
                    }
                    Value::Float(f) => {
                        sum += f;
                        count += 1;
                    }
                    other => {
                        return Err(KernelError::Exec(format!(
                            "cannot aggregate {} value in '{}'",
                            other.type_name(),
                            col.name
                        )))
                    }
                }
            }
            if count == 0 {
                return Ok(Value::Null);
            }
            Ok(Value::Float(match agg {
                Aggregate::Mean { .. } => sum / count as f64,
                _ => sum,
            }))
        }
        Aggregate::Min { .. } | Aggregate::Max { .. } => {
            let col = col_or_err()?;
            let mut best: Option<(ValueKey, Value)> = None;
            for &r in rows {
                let v = &col.values[r as usize];
                if v.is_null() {
                    continue;
                }
                let key = v.key();
                let better = match &best {
                    None => true,
                    Some((bk, _)) => match agg {
                        Aggregate::Min { .. } => key < *bk,
                        _ => key > *bk,
                    },
                };
                if better {
                    best = Some((key, v.clone()));
                }
            }
            Ok(best.map(|(_, v)| v).unwrap_or(Value::Null))
        }
    }
}
