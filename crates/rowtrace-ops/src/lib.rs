#![forbid(unsafe_code)]
//! rowtrace-ops: one kernel per operation kind.
//!
//! Kernels are pure, total, deterministic functions over tables. Besides
//! the output table each kernel reports, per input edge, the recipe by
//! which output rows were constructed — the lineage tracker classifies
//! dependency matrices from that metadata without re-running anything —
//! and, for drop-marked filters, the rows it removed.

pub mod distinct;
pub mod error;
pub mod filter;
pub mod group;
pub mod join;
pub mod kernel;
pub mod recipe;
pub mod select;
pub mod union;
pub mod update;

pub use error::{KernelError, Result};
pub use kernel::{run_kernel, KernelOutput};
pub use recipe::RowRecipe;
