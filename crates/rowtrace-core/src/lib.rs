#![forbid(unsafe_code)]
//! rowtrace-core: shared kernel for the rowtrace engine.
//!
//! This crate contains only *pure* types and small helpers. There is
//! **no I/O** and **no async** here, by design.
//!
//! Crates that use this:
//! - rowtrace-plan: operation nodes reference `Schema`, `Expr`, and ids.
//! - rowtrace-ops: kernels consume and produce `Table`s and emit drop records.
//! - rowtrace-trace: dependency matrices are keyed by `NodeId` and carried
//!   alongside `Fingerprint`s.
//! - rowtrace-store: cache entries are keyed by `Fingerprint`.
//! - rowtrace-exec: orchestrates everything and owns the `DropLedger` per run.

pub mod cancel;
pub mod drops;
pub mod error;
pub mod expr;
pub mod fingerprint;
pub mod id;
pub mod prelude;
pub mod schema;
pub mod table;
pub mod value;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
