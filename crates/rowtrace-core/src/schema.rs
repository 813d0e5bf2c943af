//! Declared table shapes. Pure data; runtime tables are checked against
//! these by name, type, and order.

use serde::{Deserialize, Serialize};

use crate::table::Table;
use crate::value::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub dtype: DataType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, dtype: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, idx: usize) -> Option<&Field> {
        self.fields.get(idx)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Check a concrete table against this declared shape.
    ///
    /// Columns must agree in name, type, order, and nullability; a
    /// non-nullable column must not contain `Null`.
    pub fn check_table(&self, table: &Table) -> Result<(), String> {
        let cols = table.columns();
        if cols.len() != self.fields.len() {
            return Err(format!(
                "expected {} columns, found {}",
                self.fields.len(),
                cols.len()
            ));
        }
        for (field, col) in self.fields.iter().zip(cols) {
            if field.name != col.name {
                return Err(format!(
                    "expected column '{}', found '{}'",
                    field.name, col.name
                ));
            }
            if field.dtype != col.dtype {
                return Err(format!(
                    "column '{}': expected type {}, found {}",
                    field.name, field.dtype, col.dtype
                ));
            }
            if !field.nullable {
                if let Some(row) = col.values.iter().position(|v| v.is_null()) {
                    return Err(format!(
                        "column '{}' is not nullable but row {} is null",
                        field.name, row
                    ));
                }
            }
        }
        Ok(())
    }
}
