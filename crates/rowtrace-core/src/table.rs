//! Immutable, ordered, columnar tables.
//!
//! Row order is semantically significant and preserved by every kernel
//! unless the operation is documented as reordering. The constructor is
//! the single place the equal-length and type-conformance invariants are
//! enforced; everything downstream may rely on them.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{Field, Schema};
use crate::value::{DataType, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub dtype: DataType,
    pub nullable: bool,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, dtype: DataType, nullable: bool, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn field(&self) -> Field {
        Field::new(self.name.clone(), self.dtype.clone(), self.nullable)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: usize,
}

impl Table {
    /// Build a table, enforcing the invariants: all columns share one row
    /// count and every value conforms to its column's type.
    pub fn try_new(columns: Vec<Column>) -> Result<Self> {
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        for col in &columns {
            if col.len() != rows {
                return Err(Error::Invariant(format!(
                    "column '{}' has {} rows, expected {}",
                    col.name,
                    col.len(),
                    rows
                )));
            }
            if let Some(idx) = col.values.iter().position(|v| !v.conforms_to(&col.dtype)) {
                return Err(Error::Invariant(format!(
                    "column '{}' row {}: {} value in a {} column",
                    col.name,
                    idx,
                    col.values[idx].type_name(),
                    col.dtype
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    /// An empty table with the given shape.
    pub fn empty(schema: &Schema) -> Self {
        let columns = schema
            .fields
            .iter()
            .map(|f| Column::new(f.name.clone(), f.dtype.clone(), f.nullable, Vec::new()))
            .collect();
        Self { columns, rows: 0 }
    }

    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn schema(&self) -> Schema {
        Schema::new(self.columns.iter().map(Column::field).collect())
    }

    /// One row as owned values, in column order.
    pub fn row(&self, idx: usize) -> Option<Vec<Value>> {
        if idx >= self.rows {
            return None;
        }
        Some(self.columns.iter().map(|c| c.values[idx].clone()).collect())
    }

    /// New table whose row i is this table's row `indices[i]`.
    ///
    /// Callers guarantee the indices are in range; this is the shared
    /// implementation behind filter, distinct, and join row selection.
    pub fn gather(&self, indices: &[u32]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                dtype: c.dtype.clone(),
                nullable: c.nullable,
                values: indices.iter().map(|&i| c.values[i as usize].clone()).collect(),
            })
            .collect();
        Self {
            columns,
            rows: indices.len(),
        }
    }

    /// Concatenate tables of identical shape, in operand order.
    pub fn concat(parts: &[&Table]) -> Result<Self> {
        let first = parts
            .first()
            .ok_or_else(|| Error::Invariant("concat of zero tables".into()))?;
        let schema = first.schema();
        let mut columns: Vec<Column> = first.columns.clone();
        for part in &parts[1..] {
            if part.schema() != schema {
                return Err(Error::Schema(
                    "concat requires identical column shapes".into(),
                ));
            }
            for (dst, src) in columns.iter_mut().zip(part.columns.iter()) {
                dst.values.extend_from_slice(&src.values);
            }
        }
        let rows = parts.iter().map(|t| t.num_rows()).sum();
        Ok(Self { columns, rows })
    }

    /// Rough in-memory size, used for cache budget accounting.
    pub fn approx_bytes(&self) -> u64 {
        self.columns
            .iter()
            .map(|c| {
                48 + c.name.len()
                    + c.values.iter().map(Value::approx_bytes).sum::<usize>()
            })
            .sum::<usize>() as u64
    }
}
