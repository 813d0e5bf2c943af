//! Plan arena and builder.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use rowtrace_core::expr::Expr;
use rowtrace_core::id::NodeId;
use rowtrace_core::schema::{Field, Schema};

use crate::error::{PlanError, Result};
use crate::node::{Aggregate, ExcludePolicy, OpKind, OpNode, SelectColumn};

/// A compiled, immutable DAG of operation nodes.
///
/// Nodes live in an arena and reference each other by index; several
/// named outputs may share internal nodes. Construction goes through
/// [`PlanBuilder`], which cannot produce cycles, but evaluation still
/// re-checks acyclicity defensively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    nodes: Vec<OpNode>,
    inputs: BTreeMap<String, NodeId>,
    outputs: BTreeMap<String, NodeId>,
}

impl Plan {
    pub fn node(&self, id: NodeId) -> &OpNode {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&OpNode> {
        self.nodes.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId::new)
    }

    /// Declared input name to its Import node.
    pub fn inputs(&self) -> &BTreeMap<String, NodeId> {
        &self.inputs
    }

    /// Declared output name to its terminal node.
    pub fn outputs(&self) -> &BTreeMap<String, NodeId> {
        &self.outputs
    }

    /// Kahn ordering over the arena. Ties resolve by node index so the
    /// order is deterministic. Fails on a cycle; builder-produced plans
    /// cannot cycle, so this is a defensive check for hand-built ones.
    pub fn topo_order(&self) -> Result<Vec<NodeId>> {
        let n = self.nodes.len();
        let mut indegree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, node) in self.nodes.iter().enumerate() {
            for input in &node.inputs {
                if input.index() >= n {
                    return Err(PlanError::UnknownNode(input.get()));
                }
                indegree[idx] += 1;
                dependents[input.index()].push(idx);
            }
        }

        // `ready` is kept sorted descending so the smallest index pops
        // first, making the order deterministic.
        let mut ready: Vec<usize> = (0..n).rev().filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(idx) = ready.pop() {
            order.push(NodeId::new(idx as u32));
            for &dep in &dependents[idx] {
                indegree[dep] -= 1;
                if indegree[dep] == 0 {
                    let pos = ready.partition_point(|&x| x > dep);
                    ready.insert(pos, dep);
                }
            }
        }
        if order.len() != n {
            return Err(PlanError::Cycle);
        }
        Ok(order)
    }

    /// Depth of each node: sources at 0, every other node one past its
    /// deepest input. Nodes of equal depth are independent.
    pub fn depths(&self) -> Result<Vec<usize>> {
        let order = self.topo_order()?;
        let mut depth = vec![0usize; self.nodes.len()];
        for id in order {
            let node = self.node(id);
            depth[id.index()] = node
                .inputs
                .iter()
                .map(|i| depth[i.index()] + 1)
                .max()
                .unwrap_or(0);
        }
        Ok(depth)
    }
}

/// Incremental plan construction with schema derivation.
#[derive(Debug, Default)]
pub struct PlanBuilder {
    nodes: Vec<OpNode>,
    inputs: BTreeMap<String, NodeId>,
    outputs: BTreeMap<String, NodeId>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: OpNode) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn schema_of(&self, id: NodeId) -> Result<&Schema> {
        self.nodes
            .get(id.index())
            .map(|n| &n.schema)
            .ok_or(PlanError::UnknownNode(id.get()))
    }

    fn require_columns(schema: &Schema, names: &[String]) -> Result<()> {
        for name in names {
            if schema.field_named(name).is_none() {
                return Err(PlanError::UnknownColumn(name.clone()));
            }
        }
        Ok(())
    }

    fn reject_duplicates(fields: &[Field]) -> Result<()> {
        for (i, field) in fields.iter().enumerate() {
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(PlanError::DuplicateColumn(field.name.clone()));
            }
        }
        Ok(())
    }

    /// Declare a named source with its expected shape.
    pub fn import(&mut self, name: impl Into<String>, schema: Schema) -> Result<NodeId> {
        let name = name.into();
        if self.inputs.contains_key(&name) {
            return Err(PlanError::DuplicateBinding(name));
        }
        Self::reject_duplicates(&schema.fields)?;
        let id = self.push(OpNode {
            kind: OpKind::Import { name: name.clone() },
            inputs: Vec::new(),
            schema,
            primary: 0,
        });
        self.inputs.insert(name, id);
        Ok(id)
    }

    pub fn select(&mut self, input: NodeId, columns: Vec<SelectColumn>) -> Result<NodeId> {
        let in_schema = self.schema_of(input)?.clone();
        let mut fields = Vec::with_capacity(columns.len());
        for col in &columns {
            let (dtype, nullable) = col.expr.infer_type(&in_schema)?;
            fields.push(Field::new(col.name.clone(), dtype, nullable));
        }
        Self::reject_duplicates(&fields)?;
        Ok(self.push(OpNode {
            kind: OpKind::Select { columns },
            inputs: vec![input],
            schema: Schema::new(fields),
            primary: 0,
        }))
    }

    pub fn update(&mut self, input: NodeId, assignments: Vec<(String, Expr)>) -> Result<NodeId> {
        let in_schema = self.schema_of(input)?.clone();
        let mut fields = in_schema.fields.clone();
        for (name, expr) in &assignments {
            let idx = in_schema
                .index_of(name)
                .ok_or_else(|| PlanError::UnknownColumn(name.clone()))?;
            let (dtype, nullable) = expr.infer_type(&in_schema)?;
            fields[idx] = Field::new(name.clone(), dtype, nullable);
        }
        Ok(self.push(OpNode {
            kind: OpKind::Update { assignments },
            inputs: vec![input],
            schema: Schema::new(fields),
            primary: 0,
        }))
    }

    pub fn filter(
        &mut self,
        input: NodeId,
        predicate: Expr,
        on_exclude: ExcludePolicy,
    ) -> Result<NodeId> {
        let schema = self.schema_of(input)?.clone();
        Self::require_columns(&schema, &predicate.referenced_columns())?;
        Ok(self.push(OpNode {
            kind: OpKind::Filter {
                predicate,
                on_exclude,
            },
            inputs: vec![input],
            schema,
            primary: 0,
        }))
    }

    pub fn distinct(
        &mut self,
        input: NodeId,
        keys: Vec<String>,
        consecutive: bool,
    ) -> Result<NodeId> {
        let schema = self.schema_of(input)?.clone();
        Self::require_columns(&schema, &keys)?;
        Ok(self.push(OpNode {
            kind: OpKind::Distinct { keys, consecutive },
            inputs: vec![input],
            schema,
            primary: 0,
        }))
    }

    /// Inner equi-join. The output carries every left field followed by
    /// the right fields that are not join keys; the key value appears
    /// once, from the left side.
    pub fn join(
        &mut self,
        left: NodeId,
        right: NodeId,
        on: Vec<(String, String)>,
    ) -> Result<NodeId> {
        if on.is_empty() {
            return Err(PlanError::Malformed("join requires at least one key".into()));
        }
        let left_schema = self.schema_of(left)?.clone();
        let right_schema = self.schema_of(right)?.clone();
        for (l, r) in &on {
            let lf = left_schema
                .field_named(l)
                .ok_or_else(|| PlanError::UnknownColumn(l.clone()))?;
            let rf = right_schema
                .field_named(r)
                .ok_or_else(|| PlanError::UnknownColumn(r.clone()))?;
            if lf.dtype != rf.dtype {
                return Err(PlanError::Type(format!(
                    "join key types differ: '{}' is {}, '{}' is {}",
                    l, lf.dtype, r, rf.dtype
                )));
            }
        }
        let mut fields = left_schema.fields.clone();
        for field in &right_schema.fields {
            if on.iter().any(|(_, r)| r == &field.name) {
                continue;
            }
            fields.push(field.clone());
        }
        Self::reject_duplicates(&fields)?;
        Ok(self.push(OpNode {
            kind: OpKind::Join { on },
            inputs: vec![left, right],
            schema: Schema::new(fields),
            primary: 0,
        }))
    }

    pub fn group(
        &mut self,
        input: NodeId,
        keys: Vec<String>,
        aggregates: Vec<Aggregate>,
    ) -> Result<NodeId> {
        if keys.is_empty() {
            return Err(PlanError::Malformed("group requires at least one key".into()));
        }
        let in_schema = self.schema_of(input)?.clone();
        let mut fields: Vec<Field> = Vec::with_capacity(keys.len() + aggregates.len());
        for k in &keys {
            let field = in_schema
                .field_named(k)
                .cloned()
                .ok_or_else(|| PlanError::UnknownColumn(k.clone()))?;
            fields.push(field);
        }
        for agg in &aggregates {
            fields.push(agg.output_field(&in_schema)?);
        }
        Self::reject_duplicates(&fields)?;
        Ok(self.push(OpNode {
            kind: OpKind::Group { keys, aggregates },
            inputs: vec![input],
            schema: Schema::new(fields),
            primary: 0,
        }))
    }

    pub fn union(&mut self, operands: Vec<NodeId>) -> Result<NodeId> {
        let first = *operands
            .first()
            .ok_or_else(|| PlanError::Malformed("union of zero operands".into()))?;
        let schema = self.schema_of(first)?.clone();
        for &op in &operands[1..] {
            let other = self.schema_of(op)?;
            if *other != schema {
                return Err(PlanError::Type(
                    "union operands must share one shape".into(),
                ));
            }
        }
        Ok(self.push(OpNode {
            kind: OpKind::Union,
            inputs: operands,
            schema,
            primary: 0,
        }))
    }

    /// Name a node as a run output.
    pub fn export(&mut self, name: impl Into<String>, node: NodeId) -> Result<()> {
        let name = name.into();
        if node.index() >= self.nodes.len() {
            return Err(PlanError::UnknownNode(node.get()));
        }
        if self.outputs.contains_key(&name) {
            return Err(PlanError::DuplicateBinding(name));
        }
        self.outputs.insert(name, node);
        Ok(())
    }

    pub fn build(self) -> Result<Plan> {
        if self.outputs.is_empty() {
            return Err(PlanError::Malformed("plan declares no outputs".into()));
        }
        let plan = Plan {
            nodes: self.nodes,
            inputs: self.inputs,
            outputs: self.outputs,
        };
        plan.topo_order()?;
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The builder cannot create a cycle, so the defensive check is
    // exercised on a hand-assembled arena.
    #[test]
    fn topo_order_rejects_cycles() {
        let schema = Schema::new(vec![Field::new(
            "x",
            rowtrace_core::value::DataType::Int,
            false,
        )]);
        let plan = Plan {
            nodes: vec![
                OpNode {
                    kind: OpKind::Union,
                    inputs: vec![NodeId::new(1)],
                    schema: schema.clone(),
                    primary: 0,
                },
                OpNode {
                    kind: OpKind::Union,
                    inputs: vec![NodeId::new(0)],
                    schema,
                    primary: 0,
                },
            ],
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        };
        assert!(matches!(plan.topo_order(), Err(PlanError::Cycle)));
    }
}
