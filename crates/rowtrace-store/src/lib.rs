#![forbid(unsafe_code)]
//! rowtrace-store: the content-addressed result cache.
//!
//! Identical fingerprint ⇒ identical table, by construction of the
//! fingerprint, which is what makes the store safe to share across
//! concurrent runs. The store is handed to the evaluator explicitly —
//! never reached through ambient state — so runs are testable in
//! isolation and several independent caches can coexist in one process.
//!
//! The cache is an optimization, never a correctness dependency: any
//! I/O failure degrades it to memory-only (or pass-through) with a
//! warning, and evaluation proceeds by recomputing.

mod disk;
pub mod error;
mod store;

pub use error::{Result, StoreError};
pub use store::{
    CachedNode, ComputeClaim, EdgeTraces, Probe, ResultStore, StoreConfig, StoreStats,
};
