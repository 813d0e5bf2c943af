//! YAML plan description → [`Plan`].
//!
//! This is the serialized form the external compiler emits; unlike a
//! linear pipeline it names every node so joins and unions can reference
//! earlier results.
//!
//! Example:
//! ```yaml
//! inputs:
//!   - name: events
//!     schema:
//!       - { name: id, type: int }
//!       - { name: v, type: text }
//! nodes:
//!   - id: kept
//!     op: filter
//!     input: events
//!     predicate: 'v == "a"'
//!     drop: predicate_false
//! outputs:
//!   - name: result
//!     node: kept
//! ```

use serde::{Deserialize, Serialize};

use rowtrace_core::drops::DropReason;
use rowtrace_core::expr::Expr;
use rowtrace_core::id::NodeId;
use rowtrace_core::schema::{Field, Schema};
use rowtrace_core::value::DataType;

use crate::error::{PlanError, Result};
use crate::node::{Aggregate, ExcludePolicy, SelectColumn};
use crate::plan::{Plan, PlanBuilder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDoc {
    pub inputs: Vec<InputDef>,
    pub nodes: Vec<NodeDef>,
    pub outputs: Vec<OutputDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDef {
    pub name: String,
    pub schema: Vec<FieldDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub dtype: String,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDef {
    pub name: String,
    pub node: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum NodeDef {
    Select {
        id: String,
        input: String,
        columns: Vec<SelectColumnDef>,
    },
    Update {
        id: String,
        input: String,
        set: Vec<SelectColumnDef>,
    },
    Filter {
        id: String,
        input: String,
        predicate: String,
        /// Present ⇒ rejected rows are recorded with this reason code.
        #[serde(default)]
        drop: Option<String>,
        #[serde(default)]
        detail: Option<String>,
    },
    Distinct {
        id: String,
        input: String,
        #[serde(default)]
        keys: Vec<String>,
        #[serde(default)]
        consecutive: bool,
    },
    Join {
        id: String,
        left: String,
        right: String,
        on: Vec<(String, String)>,
    },
    Group {
        id: String,
        input: String,
        keys: Vec<String>,
        #[serde(default)]
        aggregates: Vec<String>,
    },
    Union {
        id: String,
        operands: Vec<String>,
    },
}

impl NodeDef {
    fn id(&self) -> &str {
        match self {
            NodeDef::Select { id, .. }
            | NodeDef::Update { id, .. }
            | NodeDef::Filter { id, .. }
            | NodeDef::Distinct { id, .. }
            | NodeDef::Join { id, .. }
            | NodeDef::Group { id, .. }
            | NodeDef::Union { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectColumnDef {
    pub name: String,
    pub expr: String,
}

fn parse_dtype(s: &str) -> Result<DataType> {
    match s {
        "bool" | "boolean" => Ok(DataType::Bool),
        "int" | "integer" => Ok(DataType::Int),
        "float" | "double" => Ok(DataType::Float),
        "text" | "string" => Ok(DataType::Text),
        "date" => Ok(DataType::Date),
        other => {
            if let Some(body) = other.strip_prefix("enum(").and_then(|r| r.strip_suffix(')')) {
                return Ok(DataType::Enum {
                    variants: body.split('|').map(str::to_string).collect(),
                });
            }
            Err(PlanError::Description(format!("unknown type '{other}'")))
        }
    }
}

fn parse_drop_reason(code: &str) -> DropReason {
    match code {
        "predicate_false" => DropReason::PredicateFalse,
        "duplicate_row" => DropReason::DuplicateRow,
        other => DropReason::Other(other.to_string()),
    }
}

fn to_schema(fields: &[FieldDef]) -> Result<Schema> {
    let fields = fields
        .iter()
        .map(|f| Ok(Field::new(f.name.clone(), parse_dtype(&f.dtype)?, f.nullable)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::new(fields))
}

fn parse_expr(s: &str) -> Result<Expr> {
    Expr::parse(s).map_err(|e| PlanError::Description(e.to_string()))
}

/// Parse a YAML plan description into a validated [`Plan`].
///
/// Node ids may only reference inputs or earlier nodes, which keeps the
/// description acyclic by construction.
pub fn parse_yaml_plan(src: &str) -> Result<Plan> {
    let doc: PlanDoc =
        serde_yaml::from_str(src).map_err(|e| PlanError::Description(e.to_string()))?;

    let mut builder = PlanBuilder::new();
    let mut bound: std::collections::BTreeMap<String, NodeId> = Default::default();

    for input in &doc.inputs {
        let id = builder.import(input.name.clone(), to_schema(&input.schema)?)?;
        if bound.insert(input.name.clone(), id).is_some() {
            return Err(PlanError::DuplicateBinding(input.name.clone()));
        }
    }

    let resolve = |bound: &std::collections::BTreeMap<String, NodeId>, name: &str| {
        bound
            .get(name)
            .copied()
            .ok_or_else(|| PlanError::Description(format!("unknown node id '{name}'")))
    };

    for node in &doc.nodes {
        let id = match node {
            NodeDef::Select { input, columns, .. } => {
                let input = resolve(&bound, input)?;
                let columns = columns
                    .iter()
                    .map(|c| {
                        Ok(SelectColumn {
                            name: c.name.clone(),
                            expr: parse_expr(&c.expr)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                builder.select(input, columns)?
            }
            NodeDef::Update { input, set, .. } => {
                let input = resolve(&bound, input)?;
                let assignments = set
                    .iter()
                    .map(|c| Ok((c.name.clone(), parse_expr(&c.expr)?)))
                    .collect::<Result<Vec<_>>>()?;
                builder.update(input, assignments)?
            }
            NodeDef::Filter {
                input,
                predicate,
                drop,
                detail,
                ..
            } => {
                let input = resolve(&bound, input)?;
                let on_exclude = match drop {
                    Some(code) => ExcludePolicy::Drop {
                        reason: parse_drop_reason(code),
                        detail: detail.clone(),
                    },
                    None => ExcludePolicy::Discard,
                };
                builder.filter(input, parse_expr(predicate)?, on_exclude)?
            }
            NodeDef::Distinct {
                input,
                keys,
                consecutive,
                ..
            } => {
                let input = resolve(&bound, input)?;
                builder.distinct(input, keys.clone(), *consecutive)?
            }
            NodeDef::Join {
                left, right, on, ..
            } => {
                let left = resolve(&bound, left)?;
                let right = resolve(&bound, right)?;
                builder.join(left, right, on.clone())?
            }
            NodeDef::Group {
                input,
                keys,
                aggregates,
                ..
            } => {
                let input = resolve(&bound, input)?;
                let aggregates = aggregates
                    .iter()
                    .map(|a| Aggregate::parse(a))
                    .collect::<Result<Vec<_>>>()?;
                builder.group(input, keys.clone(), aggregates)?
            }
            NodeDef::Union { operands, .. } => {
                let operands = operands
                    .iter()
                    .map(|o| resolve(&bound, o))
                    .collect::<Result<Vec<_>>>()?;
                builder.union(operands)?
            }
        };
        if bound.insert(node.id().to_string(), id).is_some() {
            return Err(PlanError::DuplicateBinding(node.id().to_string()));
        }
    }

    for output in &doc.outputs {
        let node = resolve(&bound, &output.node)?;
        builder.export(output.name.clone(), node)?;
    }

    builder.build()
}
