//! Schema-typed JSONL reader → `Table`. One JSON object per line.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use rowtrace_core::schema::Schema;
use rowtrace_core::table::{Column, Table};
use rowtrace_core::value::{parse_date, DataType, Value};

use crate::error::{IoError, Result};

pub struct JsonlReader<R: Read> {
    rdr: BufReader<R>,
    schema: Schema,
}

impl JsonlReader<File> {
    pub fn from_path(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        Ok(Self::from_reader(File::open(path)?, schema))
    }
}

impl<R: Read> JsonlReader<R> {
    pub fn from_reader(reader: R, schema: Schema) -> Self {
        Self {
            rdr: BufReader::new(reader),
            schema,
        }
    }

    pub fn read_table(self) -> Result<Table> {
        let mut columns: Vec<Column> = self
            .schema
            .fields
            .iter()
            .map(|f| Column::new(f.name.clone(), f.dtype.clone(), f.nullable, Vec::new()))
            .collect();

        for (row, line) in self.rdr.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let object: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(&line)?;
            for (field, column) in self.schema.fields.iter().zip(&mut columns) {
                let raw = object.get(&field.name).unwrap_or(&serde_json::Value::Null);
                column.values.push(from_json(raw, &field.dtype).ok_or_else(
                    || IoError::Parse {
                        column: field.name.clone(),
                        row,
                        value: raw.to_string(),
                        dtype: field.dtype.to_string(),
                    },
                )?);
            }
        }

        Ok(Table::try_new(columns)?)
    }
}

fn from_json(raw: &serde_json::Value, dtype: &DataType) -> Option<Value> {
    use serde_json::Value as J;
    Some(match (raw, dtype) {
        (J::Null, _) => Value::Null,
        (J::Bool(b), DataType::Bool) => Value::Bool(*b),
        (J::Number(n), DataType::Int) => Value::Int(n.as_i64()?),
        (J::Number(n), DataType::Float) => Value::Float(n.as_f64()?),
        (J::String(s), DataType::Text) => Value::Text(s.clone()),
        (J::String(s), DataType::Date) => Value::Date(parse_date(s)?),
        (J::String(s), DataType::Enum { variants }) => {
            if !variants.iter().any(|v| v == s) {
                return None;
            }
            Value::Enum(s.clone())
        }
        _ => return None,
    })
}
