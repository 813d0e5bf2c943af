//! Write-through disk mirror.
//!
//! Entries are JSON files named by fingerprint under a subdirectory
//! named for the fingerprint scheme version — a scheme change lands in a
//! fresh directory, so an old cache is a clean full miss rather than
//! corruption. Files are written to a temp name and renamed, so a reader
//! never observes a partial entry.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use rowtrace_core::drops::DropEvent;
use rowtrace_core::fingerprint::{Fingerprint, SCHEME_VERSION};
use rowtrace_core::id::RunId;
use rowtrace_core::table::Table;
use rowtrace_trace::matrix::DependencyMatrix;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    pub table: Table,
    pub trace: Option<Vec<DependencyMatrix>>,
    /// Drops the producing kernel reported; replayed into the ledger of
    /// any run that hits this entry.
    #[serde(default)]
    pub drops: Vec<DropEvent>,
}

#[derive(Debug)]
pub(crate) struct DiskMirror {
    root: PathBuf,
}

impl DiskMirror {
    pub fn open(dir: &Path) -> io::Result<Self> {
        let root = dir.join(format!("v{SCHEME_VERSION}"));
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn entry_path(&self, fp: &Fingerprint) -> PathBuf {
        self.root.join(format!("{}.json", fp.to_hex()))
    }

    pub fn write_entry(&self, fp: &Fingerprint, entry: &StoredEntry) -> io::Result<()> {
        let bytes = serde_json::to_vec(entry).map_err(io::Error::other)?;
        let tmp = self.root.join(format!("{}.tmp", fp.to_hex()));
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, self.entry_path(fp))
    }

    pub fn read_entry(&self, fp: &Fingerprint) -> io::Result<StoredEntry> {
        let bytes = fs::read(self.entry_path(fp))?;
        serde_json::from_slice(&bytes).map_err(io::Error::other)
    }

    pub fn delete_entry(&self, fp: &Fingerprint) {
        let _ = fs::remove_file(self.entry_path(fp));
    }

    /// Fingerprints present on disk, with file sizes.
    pub fn list_entries(&self) -> io::Result<Vec<(Fingerprint, u64)>> {
        let mut out = Vec::new();
        for item in fs::read_dir(&self.root)? {
            let item = item?;
            let name = item.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            let Some(fp) = Fingerprint::from_hex(stem) else {
                continue;
            };
            out.push((fp, item.metadata()?.len()));
        }
        Ok(out)
    }

    pub fn write_pins(&self, pins: &BTreeMap<RunId, BTreeSet<Fingerprint>>) -> io::Result<()> {
        let bytes = serde_json::to_vec_pretty(pins).map_err(io::Error::other)?;
        let tmp = self.root.join("pins.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(tmp, self.root.join("pins.json"))
    }

    pub fn read_pins(&self) -> io::Result<BTreeMap<RunId, BTreeSet<Fingerprint>>> {
        let path = self.root.join("pins.json");
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(io::Error::other)
    }
}
