//! Operation nodes.
//!
//! The open set of operation kinds is a tagged variant dispatched through
//! one kernel function per kind (in rowtrace-ops); new kinds are added by
//! extending [`OpKind`] together with its kernel and tracer metadata.

use serde::{Deserialize, Serialize};

use rowtrace_core::drops::DropReason;
use rowtrace_core::expr::Expr;
use rowtrace_core::id::NodeId;
use rowtrace_core::schema::{Field, Schema};
use rowtrace_core::value::DataType;

use crate::error::{PlanError, Result};

/// One output column of a Select node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectColumn {
    pub name: String,
    pub expr: Expr,
}

/// What a Filter does with rows its predicate rejects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExcludePolicy {
    /// Ordinary filtering; rejected rows vanish without record.
    Discard,
    /// Audited removal: every rejected row is recorded in the drop
    /// ledger with this reason.
    Drop {
        reason: DropReason,
        detail: Option<String>,
    },
}

impl ExcludePolicy {
    pub fn is_drop(&self) -> bool {
        matches!(self, ExcludePolicy::Drop { .. })
    }
}

/// Aggregate functions for Group nodes. Output column names follow the
/// `func_column` convention (`sum_amount`, `count`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    Count,
    Sum { column: String },
    Min { column: String },
    Max { column: String },
    Mean { column: String },
    First { column: String },
}

impl Aggregate {
    /// Parse from a plan-description string like "count", "sum:amount".
    pub fn parse(s: &str) -> Result<Self> {
        if s == "count" {
            return Ok(Aggregate::Count);
        }
        let (func, col) = s
            .split_once(':')
            .ok_or_else(|| PlanError::Description(format!("invalid aggregate '{s}'")))?;
        let column = col.to_string();
        match func {
            "sum" => Ok(Aggregate::Sum { column }),
            "min" => Ok(Aggregate::Min { column }),
            "max" => Ok(Aggregate::Max { column }),
            "mean" => Ok(Aggregate::Mean { column }),
            "first" => Ok(Aggregate::First { column }),
            _ => Err(PlanError::Description(format!(
                "unknown aggregate function '{func}'"
            ))),
        }
    }

    pub fn column(&self) -> Option<&str> {
        match self {
            Aggregate::Count => None,
            Aggregate::Sum { column }
            | Aggregate::Min { column }
            | Aggregate::Max { column }
            | Aggregate::Mean { column }
            | Aggregate::First { column } => Some(column),
        }
    }

    /// Output field against a concrete input shape. Sum and Mean widen to
    /// Float; Min, Max, and First keep the source type; Count is Int.
    pub fn output_field(&self, input: &Schema) -> Result<Field> {
        match self {
            Aggregate::Count => Ok(Field::new("count", DataType::Int, false)),
            _ => {
                let column = self.column().expect("non-count aggregate has a column");
                let field = input
                    .field_named(column)
                    .ok_or_else(|| PlanError::UnknownColumn(column.to_string()))?;
                let (prefix, dtype) = match self {
                    Aggregate::Sum { .. } => ("sum", DataType::Float),
                    Aggregate::Mean { .. } => ("mean", DataType::Float),
                    Aggregate::Min { .. } => ("min", field.dtype.clone()),
                    Aggregate::Max { .. } => ("max", field.dtype.clone()),
                    Aggregate::First { .. } => ("first", field.dtype.clone()),
                    Aggregate::Count => unreachable!(),
                };
                match self {
                    Aggregate::Sum { .. } | Aggregate::Mean { .. } => {
                        if !matches!(field.dtype, DataType::Int | DataType::Float) {
                            return Err(PlanError::Type(format!(
                                "aggregate '{prefix}' requires a numeric column, '{column}' is {}",
                                field.dtype
                            )));
                        }
                    }
                    _ => {}
                }
                Ok(Field::new(format!("{prefix}_{column}"), dtype, true))
            }
        }
    }
}

/// The operation a node performs, with its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpKind {
    /// Source node; bound to a concrete table by name at run time.
    Import { name: String },
    /// Project or recompute columns; one output row per input row.
    Select { columns: Vec<SelectColumn> },
    /// Keep the input shape, recomputing the named columns in place.
    Update { assignments: Vec<(String, Expr)> },
    /// Keep rows whose predicate holds; rejected rows follow the policy.
    Filter {
        predicate: Expr,
        on_exclude: ExcludePolicy,
    },
    /// Keep the first row of each key, preserving first-seen order.
    /// `consecutive` restricts deduplication to adjacent runs.
    Distinct { keys: Vec<String>, consecutive: bool },
    /// Inner equi-join; one output row per matching pair, left-major
    /// order. Right key columns are not repeated in the output.
    Join { on: Vec<(String, String)> },
    /// Aggregate rows sharing a key, preserving first-seen key order.
    Group {
        keys: Vec<String>,
        aggregates: Vec<Aggregate>,
    },
    /// Concatenate operands in order; shapes must be identical.
    Union,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Import { .. } => "import",
            OpKind::Select { .. } => "select",
            OpKind::Update { .. } => "update",
            OpKind::Filter { .. } => "filter",
            OpKind::Distinct { .. } => "distinct",
            OpKind::Join { .. } => "join",
            OpKind::Group { .. } => "group",
            OpKind::Union => "union",
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, OpKind::Import { .. })
    }
}

/// Immutable node in the plan arena.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpNode {
    pub kind: OpKind,
    /// Arena indexes of the inputs, in operand order.
    pub inputs: Vec<NodeId>,
    /// Declared output shape.
    pub schema: Schema,
    /// Which input is the spine edge for lineage walks. Always 0 for the
    /// kinds built here (left for Join, first operand for Union).
    pub primary: usize,
}

impl OpNode {
    pub fn primary_input(&self) -> Option<NodeId> {
        self.inputs.get(self.primary).copied()
    }
}
