//! Convenience re-exports of the types nearly every consumer needs.

pub use crate::cancel::CancelToken;
pub use crate::drops::{DropEvent, DropLedger, DropReason, DropRecord};
pub use crate::expr::{BinOp, Expr, ExprError, UnaryOp};
pub use crate::fingerprint::{Fingerprint, FingerprintBuilder};
pub use crate::id::{NodeId, RunId};
pub use crate::schema::{Field, Schema};
pub use crate::table::{Column, Table};
pub use crate::value::{DataType, Value, ValueKey};
