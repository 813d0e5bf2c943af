#![forbid(unsafe_code)]
//! rowtrace-plan: the compiled plan a run evaluates.
//!
//! A plan is an arena of immutable operation nodes addressed by index,
//! so several outputs can share internal nodes without ownership cycles.
//! The builder derives output schemas and rejects malformed graphs; the
//! `dsl` module parses the YAML plan description the external compiler
//! (or a test) hands us.

pub mod dsl;
pub mod error;
pub mod node;
pub mod plan;

pub use error::{PlanError, Result};
pub use node::{Aggregate, ExcludePolicy, OpKind, OpNode, SelectColumn};
pub use plan::{Plan, PlanBuilder};
