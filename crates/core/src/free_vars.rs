//! The dependency graph between definitions found during one walk.
//!
//! Nodes are [`ExpressionId`]s, one per function, class or with-block that
//! still needs a structural walk. Each node keeps the chains its definition
//! mentions and what each one resolved to: either a plain value, or another
//! node of the same graph. The node-to-node edges are exactly what
//! [`strongly_connected_components`](crate::scc::strongly_connected_components)
//! groups.

use std::collections::HashMap;
use std::fmt;

use graphport_ir::FreeVariableChain;
use indexmap::IndexMap;

use crate::heap::ValueRef;

/// A definition node, local to one walk. Unrelated to object ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpressionId(u32);

impl ExpressionId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// What a chain (or a base class) resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// A value walked on its own.
    Value(ValueRef),
    /// Another definition of this graph.
    Expression(ExpressionId),
}

/// A resolved chain of one definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBinding {
    pub chain: FreeVariableChain,
    pub binding: Binding,
}

#[derive(Debug)]
struct Node {
    value: ValueRef,
    parent: Option<ExpressionId>,
    chains: Vec<ChainBinding>,
    bases: Vec<Binding>,
    dependents: Vec<ExpressionId>,
}

#[derive(Debug, Default)]
pub struct FreeVariableGraph {
    nodes: Vec<Node>,
    by_value: HashMap<ValueRef, ExpressionId>,
}

impl FreeVariableGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The node for `value`, creating it with `parent` if it is new. The
    /// flag is true for a new node.
    pub fn node_for(
        &mut self,
        value: ValueRef,
        parent: Option<ExpressionId>,
    ) -> (ExpressionId, bool) {
        if let Some(id) = self.by_value.get(&value) {
            return (*id, false);
        }
        let id = ExpressionId(self.nodes.len() as u32);
        self.nodes.push(Node {
            value,
            parent,
            chains: Vec::new(),
            bases: Vec::new(),
            dependents: Vec::new(),
        });
        self.by_value.insert(value, id);
        (id, true)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ExpressionId> {
        (0..self.nodes.len() as u32).map(ExpressionId)
    }

    fn node(&self, id: ExpressionId) -> Option<&Node> {
        self.nodes.get(id.0 as usize)
    }

    pub fn value(&self, id: ExpressionId) -> Option<ValueRef> {
        self.node(id).map(|n| n.value)
    }

    pub fn parent(&self, id: ExpressionId) -> Option<ExpressionId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// `id` followed by each node it was discovered from, up to the root.
    pub fn ancestry(&self, id: ExpressionId) -> Vec<ExpressionId> {
        let mut line = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            line.push(parent);
            current = parent;
        }
        line
    }

    fn add_dependent(&mut self, id: ExpressionId, binding: Binding) {
        let node = self.nodes.get_mut(id.0 as usize);
        if let (Binding::Expression(target), Some(node)) = (binding, node) {
            if !node.dependents.contains(&target) {
                node.dependents.push(target);
            }
        }
    }

    /// Record that a chain of `id` resolved to `binding`. A chain whose
    /// consumed prefix is already recorded is ignored.
    pub fn add_chain(&mut self, id: ExpressionId, chain: FreeVariableChain, binding: Binding) {
        let Some(node) = self.nodes.get_mut(id.0 as usize) else {
            return;
        };
        if node.chains.iter().any(|c| c.chain.names == chain.names) {
            return;
        }
        node.chains.push(ChainBinding { chain, binding });
        self.add_dependent(id, binding);
    }

    pub fn add_base(&mut self, id: ExpressionId, binding: Binding) {
        if let Some(node) = self.nodes.get_mut(id.0 as usize) {
            node.bases.push(binding);
        }
        self.add_dependent(id, binding);
    }

    /// The resolved chains of `id`, in discovery order.
    pub fn chain_for(&self, id: ExpressionId) -> &[ChainBinding] {
        self.node(id).map(|n| n.chains.as_slice()).unwrap_or_default()
    }

    pub fn bases(&self, id: ExpressionId) -> &[Binding] {
        self.node(id).map(|n| n.bases.as_slice()).unwrap_or_default()
    }

    /// Definitions `id` needs, each listed once, in discovery order.
    pub fn dependent_expression_ids(&self, id: ExpressionId) -> &[ExpressionId] {
        self.node(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or_default()
    }

    /// Every node with its dependencies, in node order.
    pub fn expression_id_graph(&self) -> IndexMap<ExpressionId, Vec<ExpressionId>> {
        self.ids()
            .map(|id| (id, self.dependent_expression_ids(id).to_vec()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;

    #[test]
    fn nodes_are_keyed_by_value() {
        let heap = Heap::new();
        let (f, g) = (heap.int(1), heap.int(2));
        let mut graph = FreeVariableGraph::new();
        let (a, new_a) = graph.node_for(f, None);
        let (b, new_b) = graph.node_for(g, Some(a));
        let (again, new_again) = graph.node_for(f, Some(b));
        assert!(new_a && new_b && !new_again);
        assert_eq!(again, a);
        assert_eq!(graph.parent(a), None);
        assert_eq!(graph.ancestry(b), vec![b, a]);
    }

    #[test]
    fn edges_follow_expression_bindings_only() {
        let heap = Heap::new();
        let (f, g, x) = (heap.int(1), heap.int(2), heap.int(3));
        let mut graph = FreeVariableGraph::new();
        let (a, _) = graph.node_for(f, None);
        let (b, _) = graph.node_for(g, Some(a));

        graph.add_chain(a, FreeVariableChain::new(["g"], 2, 4), Binding::Expression(b));
        graph.add_chain(a, FreeVariableChain::new(["x"], 3, 4), Binding::Value(x));
        graph.add_chain(a, FreeVariableChain::new(["g"], 5, 4), Binding::Expression(b));
        graph.add_chain(b, FreeVariableChain::new(["f"], 8, 4), Binding::Expression(a));

        assert_eq!(graph.chain_for(a).len(), 2);
        assert_eq!(graph.dependent_expression_ids(a), &[b]);

        let expected: IndexMap<ExpressionId, Vec<ExpressionId>> =
            [(a, vec![b]), (b, vec![a])].into_iter().collect();
        assert_eq!(graph.expression_id_graph(), expected);
    }

    #[test]
    fn bases_are_edges_too() {
        let heap = Heap::new();
        let (c, d) = (heap.int(1), heap.int(2));
        let mut graph = FreeVariableGraph::new();
        let (child, _) = graph.node_for(c, None);
        let (base, _) = graph.node_for(d, Some(child));
        graph.add_base(child, Binding::Expression(base));
        assert_eq!(graph.bases(child), &[Binding::Expression(base)]);
        assert_eq!(graph.dependent_expression_ids(child), &[base]);
    }
}
