//! Importers bind declared plan inputs to concrete tables.

use std::collections::BTreeMap;
use std::path::PathBuf;

use rowtrace_core::schema::Schema;
use rowtrace_core::table::Table;

use crate::error::{IoError, Result};
use crate::readers::csv::CsvReader;
use crate::readers::jsonl::JsonlReader;

pub trait Importer {
    /// Produce the table bound to `name`, shaped by the declared schema.
    fn import(&self, name: &str, schema: &Schema) -> Result<Table>;
}

/// Tables held in memory, keyed by input name.
pub struct MemoryImporter {
    tables: BTreeMap<String, Table>,
}

impl MemoryImporter {
    pub fn new(tables: BTreeMap<String, Table>) -> Self {
        Self { tables }
    }
}

impl Importer for MemoryImporter {
    fn import(&self, name: &str, _schema: &Schema) -> Result<Table> {
        self.tables
            .get(name)
            .cloned()
            .ok_or_else(|| IoError::UnknownTable(name.to_string()))
    }
}

/// Reads `<root>/<name>.csv` (preferred) or `<root>/<name>.jsonl`.
pub struct DirImporter {
    root: PathBuf,
}

impl DirImporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Importer for DirImporter {
    fn import(&self, name: &str, schema: &Schema) -> Result<Table> {
        let csv_path = self.root.join(format!("{name}.csv"));
        if csv_path.exists() {
            return CsvReader::from_path(csv_path, schema.clone())?.read_table();
        }
        let jsonl_path = self.root.join(format!("{name}.jsonl"));
        if jsonl_path.exists() {
            return JsonlReader::from_path(jsonl_path, schema.clone())?.read_table();
        }
        Err(IoError::UnknownTable(name.to_string()))
    }
}
