//! Exporters persist run outputs.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use rowtrace_core::table::Table;

use crate::error::Result;
use crate::writers::csv::CsvWriter;

pub trait Exporter {
    fn export(&self, name: &str, table: &Table) -> Result<()>;
}

/// Collects outputs in memory, for tests and embedding.
#[derive(Default)]
pub struct MemoryExporter {
    tables: Mutex<BTreeMap<String, Table>>,
}

impl MemoryExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> BTreeMap<String, Table> {
        self.tables.lock().expect("exporter mutex poisoned").clone()
    }
}

impl Exporter for MemoryExporter {
    fn export(&self, name: &str, table: &Table) -> Result<()> {
        self.tables
            .lock()
            .expect("exporter mutex poisoned")
            .insert(name.to_string(), table.clone());
        Ok(())
    }
}

/// Writes `<root>/<name>.csv`.
pub struct DirExporter {
    root: PathBuf,
}

impl DirExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Exporter for DirExporter {
    fn export(&self, name: &str, table: &Table) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        CsvWriter::to_path(self.root.join(format!("{name}.csv")))?.write_table(table)
    }
}
