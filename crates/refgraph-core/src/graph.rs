//! Graph vocabulary and an in-memory fact graph.
//!
//! Node and edge kinds follow the cross-reference schema the indexer emits:
//! declarations, structural type nodes (`tbuiltin`, `tapp`), template
//! abstractions, anchors, files, and docs.
//!
//! [`FactGraph`] stores emitted facts in a `petgraph::StableGraph` so tests
//! and drivers can query the output structurally.

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::NodeId;
use crate::range::Range;

// ============================================================================
// Edge Kinds
// ============================================================================

/// Typed relationships between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Anchor spans a definition
    Defines,
    /// Anchor spans the name a definition binds
    DefinesBinding,
    Ref,
    /// Anchor spans a call of the target
    RefCall,
    /// Anchor of a forward declaration is completed by the target
    Completes,
    ChildOf,
    /// Ordered: parameter of a function, template, or type application
    Param,
    Typed,
    Instantiates,
    Specializes,
    Documents,
    Extends,
    Aliases,
    /// Node is identified externally by the target `usr` node
    Usr,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Defines => "defines",
            EdgeKind::DefinesBinding => "defines/binding",
            EdgeKind::Ref => "ref",
            EdgeKind::RefCall => "ref/call",
            EdgeKind::Completes => "completes",
            EdgeKind::ChildOf => "childof",
            EdgeKind::Param => "param",
            EdgeKind::Typed => "typed",
            EdgeKind::Instantiates => "instantiates",
            EdgeKind::Specializes => "specializes",
            EdgeKind::Documents => "documents",
            EdgeKind::Extends => "extends",
            EdgeKind::Aliases => "aliases",
            EdgeKind::Usr => "usr",
        }
    }

    /// Whether edges of this kind carry an ordinal.
    pub fn is_ordered(&self) -> bool {
        matches!(self, EdgeKind::Param)
    }
}

// ============================================================================
// Node Kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Anchor,
    File,
    Doc,
    Function,
    Variable,
    Record,
    /// Enumeration
    Sum,
    /// Enumerator or constant template argument
    Constant,
    TAlias,
    TBuiltin,
    /// Type application: a constructor node applied to ordered arguments
    TApp,
    /// Template abstraction
    Abs,
    /// Template parameter
    AbsVar,
    /// Namespace
    Package,
    /// Dependent name resolved only at instantiation
    Lookup,
    /// External identifier
    Usr,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Anchor => "anchor",
            NodeKind::File => "file",
            NodeKind::Doc => "doc",
            NodeKind::Function => "function",
            NodeKind::Variable => "variable",
            NodeKind::Record => "record",
            NodeKind::Sum => "sum",
            NodeKind::Constant => "constant",
            NodeKind::TAlias => "talias",
            NodeKind::TBuiltin => "tbuiltin",
            NodeKind::TApp => "tapp",
            NodeKind::Abs => "abs",
            NodeKind::AbsVar => "absvar",
            NodeKind::Package => "package",
            NodeKind::Lookup => "lookup",
            NodeKind::Usr => "usr",
        }
    }
}

// ============================================================================
// Attributes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    Definition,
    Incomplete,
}

/// Facts attached to a declared node.
///
/// All fields are optional; two declarations of a node agree when their
/// attributes are equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    /// Human-readable signature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Refinement of the node kind ("struct", "constructor", "field", ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subkind: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completeness: Option<Completeness>,

    /// Comment text for doc nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Path for file nodes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none()
            && self.subkind.is_none()
            && self.completeness.is_none()
            && self.text.is_none()
            && self.path.is_none()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_subkind(mut self, subkind: impl Into<String>) -> Self {
        self.subkind = Some(subkind.into());
        self
    }

    pub fn with_completeness(mut self, completeness: Completeness) -> Self {
        self.completeness = Some(completeness);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

// ============================================================================
// Fact Graph
// ============================================================================

/// A node in the fact graph.
///
/// `kind` stays `None` for nodes only seen as edge endpoints; they are
/// declared by another job or another translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    pub attributes: Attributes,
    /// Source range, for anchors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

impl GraphNode {
    pub fn placeholder(id: NodeId) -> Self {
        Self {
            id,
            kind: None,
            attributes: Attributes::default(),
            range: None,
        }
    }

    pub fn declared(id: NodeId, kind: NodeKind, attributes: Attributes) -> Self {
        Self {
            id,
            kind: Some(kind),
            attributes,
            range: None,
        }
    }

    pub fn anchor(id: NodeId, range: Range) -> Self {
        Self {
            id,
            kind: Some(NodeKind::Anchor),
            attributes: Attributes::default(),
            range: Some(range),
        }
    }

    pub fn is_declared(&self) -> bool {
        self.kind.is_some()
    }
}

/// Edge weight stored in the fact graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeData {
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
}

impl EdgeData {
    pub fn new(kind: EdgeKind, ordinal: Option<u32>) -> Self {
        Self { kind, ordinal }
    }
}

/// An edge with both endpoints, as returned by [`FactGraph::iter_edges`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
}

/// A petgraph-backed graph of emitted facts.
///
/// Edges are deduplicated: adding an identical (source, kind, target,
/// ordinal) edge twice stores it once.
#[derive(Debug, Clone, Default)]
pub struct FactGraph {
    graph: StableGraph<GraphNode, EdgeData, petgraph::Directed>,
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl FactGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Node Operations
    // ------------------------------------------------------------------------

    /// Index of `id`, inserting a placeholder if the node is unknown.
    pub fn ensure_node(&mut self, id: &NodeId) -> NodeIndex {
        if let Some(&idx) = self.node_index_map.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(GraphNode::placeholder(id.clone()));
        self.node_index_map.insert(id.clone(), idx);
        idx
    }

    /// Insert or fill in a node. An existing declared node is left unchanged.
    pub fn upsert_node(&mut self, node: GraphNode) -> NodeIndex {
        let idx = self.ensure_node(&node.id);
        if let Some(existing) = self.graph.node_weight_mut(idx) {
            if !existing.is_declared() {
                *existing = node;
            }
        }
        idx
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.node_index_map
            .get(id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.node_index_map.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.graph.node_weights()
    }

    pub fn nodes_by_kind(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> {
        self.graph
            .node_weights()
            .filter(move |n| n.kind == Some(kind))
    }

    // ------------------------------------------------------------------------
    // Edge Operations
    // ------------------------------------------------------------------------

    /// Add an edge, creating placeholder endpoints as needed.
    ///
    /// Returns `None` when the identical edge already exists.
    pub fn add_edge(
        &mut self,
        source: &NodeId,
        target: &NodeId,
        data: EdgeData,
    ) -> Option<EdgeIndex> {
        let source_idx = self.ensure_node(source);
        let target_idx = self.ensure_node(target);
        let duplicate = self
            .graph
            .edges_connecting(source_idx, target_idx)
            .any(|e| *e.weight() == data);
        if duplicate {
            return None;
        }
        Some(self.graph.add_edge(source_idx, target_idx, data))
    }

    pub fn has_edge(&self, source: &NodeId, kind: EdgeKind, target: &NodeId) -> bool {
        self.outgoing_edges(source)
            .any(|(node, data)| data.kind == kind && &node.id == target)
    }

    /// Edges leaving `id`, with their target nodes.
    pub fn outgoing_edges(&self, id: &NodeId) -> impl Iterator<Item = (&GraphNode, &EdgeData)> {
        self.directed_edges(id, Direction::Outgoing)
    }

    /// Edges arriving at `id`, with their source nodes.
    pub fn incoming_edges(&self, id: &NodeId) -> impl Iterator<Item = (&GraphNode, &EdgeData)> {
        self.directed_edges(id, Direction::Incoming)
    }

    fn directed_edges(
        &self,
        id: &NodeId,
        direction: Direction,
    ) -> impl Iterator<Item = (&GraphNode, &EdgeData)> {
        let idx = self.node_index_map.get(id).copied();
        idx.into_iter()
            .flat_map(move |idx| self.graph.edges_directed(idx, direction))
            .filter_map(move |edge_ref| {
                let other = match direction {
                    Direction::Outgoing => edge_ref.target(),
                    Direction::Incoming => edge_ref.source(),
                };
                let node = self.graph.node_weight(other)?;
                Some((node, edge_ref.weight()))
            })
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn iter_edges(&self) -> impl Iterator<Item = FactEdge> + '_ {
        self.graph.edge_references().filter_map(move |edge_ref| {
            let source = self.graph.node_weight(edge_ref.source())?;
            let target = self.graph.node_weight(edge_ref.target())?;
            Some(FactEdge {
                source: source.id.clone(),
                target: target.id.clone(),
                kind: edge_ref.weight().kind,
                ordinal: edge_ref.weight().ordinal,
            })
        })
    }

    pub fn edges_by_kind(
        &self,
        kind: EdgeKind,
    ) -> impl Iterator<Item = (&GraphNode, &GraphNode, &EdgeData)> {
        self.graph.edge_references().filter_map(move |edge_ref| {
            if edge_ref.weight().kind != kind {
                return None;
            }
            let source = self.graph.node_weight(edge_ref.source())?;
            let target = self.graph.node_weight(edge_ref.target())?;
            Some((source, target, edge_ref.weight()))
        })
    }

    /// Targets of `id`'s `param` edges, ordered by ordinal.
    pub fn params_of(&self, id: &NodeId) -> Vec<(u32, NodeId)> {
        let mut params: Vec<_> = self
            .outgoing_edges(id)
            .filter(|(_, data)| data.kind == EdgeKind::Param)
            .map(|(node, data)| (data.ordinal.unwrap_or_default(), node.id.clone()))
            .collect();
        params.sort();
        params
    }

    pub fn inner(&self) -> &StableGraph<GraphNode, EdgeData, petgraph::Directed> {
        &self.graph
    }
}
