//! Schema-typed CSV reader → `Table`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv as csv_crate;

use rowtrace_core::schema::Schema;
use rowtrace_core::table::{Column, Table};

use crate::error::{IoError, Result};
use crate::readers::parse_value;

pub struct CsvReader<R: Read> {
    rdr: csv_crate::Reader<R>,
    schema: Schema,
}

impl CsvReader<File> {
    pub fn from_path(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, schema)
    }
}

impl<R: Read> CsvReader<R> {
    /// The file's header row maps CSV columns onto schema fields; column
    /// order in the file need not match the schema.
    pub fn from_reader(reader: R, schema: Schema) -> Result<Self> {
        let rdr = csv_crate::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);
        Ok(Self { rdr, schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Read the whole file into one table.
    pub fn read_table(mut self) -> Result<Table> {
        let headers = self.rdr.headers()?.clone();
        let positions: Vec<usize> = self
            .schema
            .fields
            .iter()
            .map(|field| {
                headers
                    .iter()
                    .position(|h| h.trim() == field.name)
                    .ok_or_else(|| {
                        IoError::Schema(format!(
                            "missing column '{}' (file has: {:?})",
                            field.name,
                            headers.iter().collect::<Vec<_>>()
                        ))
                    })
            })
            .collect::<Result<_>>()?;

        let mut columns: Vec<Column> = self
            .schema
            .fields
            .iter()
            .map(|f| Column::new(f.name.clone(), f.dtype.clone(), f.nullable, Vec::new()))
            .collect();

        for (row, record) in self.rdr.records().enumerate() {
            let record = record?;
            for (col, (field, &pos)) in self.schema.fields.iter().zip(&positions).enumerate() {
                let raw = record.get(pos).unwrap_or("");
                let value = parse_value(raw, &field.dtype, field.nullable, &field.name, row)?;
                columns[col].values.push(value);
            }
        }

        Ok(Table::try_new(columns)?)
    }
}
