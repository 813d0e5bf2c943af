#![forbid(unsafe_code)]
//! rowtrace-trace: who made this row?
//!
//! For every evaluated edge the tracker classifies a dependency matrix —
//! the relation between output row indices and input row indices — from
//! the kernel's reported row recipe, never by re-running the kernel. A
//! run trace aggregates the per-edge matrices with each node's output
//! table, and lineage queries walk that graph lazily, composing row sets
//! edge by edge rather than materializing full relations.

pub mod error;
pub mod manifest;
pub mod matrix;
pub mod query;
pub mod trace;

pub use error::{Result, TraceError};
pub use manifest::TraceManifest;
pub use matrix::DependencyMatrix;
pub use query::{contributing_sources, spine_walk, SpineStep};
pub use trace::{NodeTrace, RunTrace};
