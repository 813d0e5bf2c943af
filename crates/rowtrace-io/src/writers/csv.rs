//! `Table` → CSV.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use csv as csv_crate;

use rowtrace_core::table::Table;

use crate::error::Result;

pub struct CsvWriter<W: Write> {
    wtr: csv_crate::Writer<W>,
}

impl CsvWriter<File> {
    pub fn to_path(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::to_writer(File::create(path)?))
    }
}

impl<W: Write> CsvWriter<W> {
    pub fn to_writer(writer: W) -> Self {
        Self {
            wtr: csv_crate::Writer::from_writer(writer),
        }
    }

    /// Write header plus every row. Nulls become empty cells.
    pub fn write_table(mut self, table: &Table) -> Result<()> {
        let headers: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
        self.wtr.write_record(&headers)?;
        for row in 0..table.num_rows() {
            let record: Vec<String> = table
                .columns()
                .iter()
                .map(|c| c.values[row].to_string())
                .collect();
            self.wtr.write_record(&record)?;
        }
        self.wtr.flush()?;
        Ok(())
    }
}
