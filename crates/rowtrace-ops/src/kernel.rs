//! Kernel dispatch.
//!
//! Operation kinds are a tagged variant dispatched through this single
//! function; adding a kind means extending [`OpKind`] and its kernel and
//! recipe together.

use rowtrace_core::drops::DropEvent;
use rowtrace_core::schema::Schema;
use rowtrace_core::table::Table;
use rowtrace_plan::node::OpKind;

use crate::error::{KernelError, Result};
use crate::recipe::RowRecipe;
use crate::{distinct, filter, group, join, select, union, update};

#[derive(Debug, Clone)]
pub struct KernelOutput {
    pub table: Table,
    /// One recipe per input edge, in operand order.
    pub recipes: Vec<RowRecipe>,
    /// Drops not yet attributed to a node id — the evaluator attaches
    /// the id when it appends to the run's ledger.
    pub drops: Vec<DropEvent>,
}

impl KernelOutput {
    pub fn plain(table: Table, recipes: Vec<RowRecipe>) -> Self {
        Self {
            table,
            recipes,
            drops: Vec::new(),
        }
    }
}

/// Evaluate one node. `schema` is the node's declared output shape; the
/// produced table is checked against it before being returned, so a
/// kernel bug surfaces here rather than corrupting downstream nodes.
pub fn run_kernel(kind: &OpKind, schema: &Schema, inputs: &[&Table]) -> Result<KernelOutput> {
    let out = match kind {
        OpKind::Import { name } => {
            return Err(KernelError::Exec(format!(
                "import '{name}' is bound by the evaluator, not computed"
            )))
        }
        OpKind::Select { columns } => select::eval(columns, schema, one(inputs, "select")?)?,
        OpKind::Update { assignments } => update::eval(assignments, schema, one(inputs, "update")?)?,
        OpKind::Filter {
            predicate,
            on_exclude,
        } => filter::eval(predicate, on_exclude, one(inputs, "filter")?)?,
        OpKind::Distinct { keys, consecutive } => {
            distinct::eval(keys, *consecutive, one(inputs, "distinct")?)?
        }
        OpKind::Join { on } => {
            let &[left, right] = inputs else {
                return Err(KernelError::Exec("join expects two inputs".into()));
            };
            join::eval(on, schema, left, right)?
        }
        OpKind::Group { keys, aggregates } => {
            group::eval(keys, aggregates, schema, one(inputs, "group")?)?
        }
        OpKind::Union => union::eval(inputs)?,
    };

    schema
        .check_table(&out.table)
        .map_err(|e| KernelError::Schema(format!("kernel output diverged from declared shape: {e}")))?;
    if out.recipes.len() != inputs.len() {
        return Err(KernelError::Exec(format!(
            "kernel reported {} recipes for {} inputs",
            out.recipes.len(),
            inputs.len()
        )));
    }
    Ok(out)
}

fn one<'a>(inputs: &[&'a Table], kind: &str) -> Result<&'a Table> {
    match inputs {
        [t] => Ok(t),
        _ => Err(KernelError::Exec(format!("{kind} expects one input"))),
    }
}
