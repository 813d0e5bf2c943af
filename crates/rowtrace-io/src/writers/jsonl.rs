//! `Table` → JSONL. One JSON object per row.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rowtrace_core::table::Table;
use rowtrace_core::value::{format_date, Value};

use crate::error::Result;

pub struct JsonlWriter<W: Write> {
    out: BufWriter<W>,
}

impl JsonlWriter<File> {
    pub fn to_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::to_writer(File::create(path)?))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn to_writer(writer: W) -> Self {
        Self {
            out: BufWriter::new(writer),
        }
    }

    pub fn write_table(mut self, table: &Table) -> Result<()> {
        for row in 0..table.num_rows() {
            let mut object = serde_json::Map::new();
            for col in table.columns() {
                object.insert(col.name.clone(), to_json(&col.values[row]));
            }
            serde_json::to_writer(&mut self.out, &serde_json::Value::Object(object))?;
            self.out.write_all(b"\n")?;
        }
        self.out.flush()?;
        Ok(())
    }
}

fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as J;
    match value {
        Value::Null => J::Null,
        Value::Bool(b) => J::Bool(*b),
        Value::Int(i) => J::Number((*i).into()),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(J::Number)
            .unwrap_or(J::Null),
        Value::Text(s) | Value::Enum(s) => J::String(s.clone()),
        Value::Date(d) => J::String(format_date(*d)),
    }
}
