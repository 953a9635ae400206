//! Fact graph validation utilities for integration tests.
//!
//! Checks the shape every indexing run must produce regardless of input:
//! anchors carry ranges, only `param` edges carry ordinals, parameter
//! ordinals are dense, and anchor-only edge kinds leave anchors.

#![allow(dead_code)]

use refgraph_core::{EdgeKind, FactGraph, NodeId, NodeKind};
use std::collections::{BTreeMap, HashMap};

// ============================================================================
// Validation Result Types
// ============================================================================

/// Result of graph validation
#[derive(Debug, Default)]
pub struct GraphValidationResult {
    /// Node-level problems (missing ranges, empty labels)
    pub structural_errors: Vec<String>,
    /// Edge-level problems (ordinals, anchor-only kinds)
    pub relational_errors: Vec<String>,
    pub stats: GraphStats,
}

impl GraphValidationResult {
    pub fn is_valid(&self) -> bool {
        self.structural_errors.is_empty() && self.relational_errors.is_empty()
    }

    pub fn all_errors(&self) -> Vec<String> {
        let mut all = Vec::new();
        all.extend(
            self.structural_errors
                .iter()
                .map(|e| format!("[structural] {e}")),
        );
        all.extend(
            self.relational_errors
                .iter()
                .map(|e| format!("[relational] {e}")),
        );
        all
    }
}

/// Graph statistics
#[derive(Debug, Default)]
pub struct GraphStats {
    pub nodes_by_kind: BTreeMap<NodeKind, usize>,
    pub edges_by_kind: BTreeMap<EdgeKind, usize>,
    /// Edge endpoints never declared in this graph
    pub placeholders: usize,
}

impl GraphStats {
    pub fn nodes(&self, kind: NodeKind) -> usize {
        self.nodes_by_kind.get(&kind).copied().unwrap_or_default()
    }

    pub fn edges(&self, kind: EdgeKind) -> usize {
        self.edges_by_kind.get(&kind).copied().unwrap_or_default()
    }
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validate node shape
pub fn validate_structural(graph: &FactGraph) -> Vec<String> {
    let mut errors = Vec::new();

    for node in graph.iter_nodes() {
        if node.id.as_str().is_empty() {
            errors.push("Node has empty id".to_string());
        }
        match node.kind {
            Some(NodeKind::Anchor) if node.range.is_none() => {
                errors.push(format!("Anchor {} has no range", node.id));
            }
            Some(NodeKind::File) if node.attributes.path.is_none() => {
                errors.push(format!("File node {} has no path", node.id));
            }
            Some(NodeKind::Doc) if node.attributes.text.is_none() => {
                errors.push(format!("Doc node {} has no text", node.id));
            }
            _ => {}
        }
        if node.attributes.label.as_deref() == Some("") {
            errors.push(format!("Node {} has an empty label", node.id));
        }
    }

    errors
}

/// Validate edges
pub fn validate_relational(graph: &FactGraph) -> Vec<String> {
    let mut errors = Vec::new();
    let mut ordinals: HashMap<NodeId, Vec<u32>> = HashMap::new();
    let anchor_only = [
        EdgeKind::Defines,
        EdgeKind::DefinesBinding,
        EdgeKind::Ref,
        EdgeKind::RefCall,
        EdgeKind::Completes,
    ];

    for edge in graph.iter_edges() {
        match (edge.kind.is_ordered(), edge.ordinal) {
            (true, None) => errors.push(format!("{} edge from {} has no ordinal", edge.kind.as_str(), edge.source)),
            (false, Some(_)) => errors.push(format!(
                "{} edge from {} carries an ordinal",
                edge.kind.as_str(),
                edge.source
            )),
            _ => {}
        }
        if let Some(ordinal) = edge.ordinal {
            ordinals.entry(edge.source.clone()).or_default().push(ordinal);
        }

        let source_kind = graph.get_node(&edge.source).and_then(|n| n.kind);
        if anchor_only.contains(&edge.kind) && source_kind != Some(NodeKind::Anchor) {
            errors.push(format!(
                "{} edge leaves non-anchor {}",
                edge.kind.as_str(),
                edge.source
            ));
        }
    }

    for (source, mut list) in ordinals {
        list.sort_unstable();
        list.dedup();
        let dense = list.iter().enumerate().all(|(i, o)| *o == i as u32);
        if !dense {
            errors.push(format!("param ordinals of {source} are not dense: {list:?}"));
        }
    }

    errors
}

/// Count nodes and edges by kind
pub fn compute_stats(graph: &FactGraph) -> GraphStats {
    let mut stats = GraphStats::default();
    for node in graph.iter_nodes() {
        match node.kind {
            Some(kind) => *stats.nodes_by_kind.entry(kind).or_default() += 1,
            None => stats.placeholders += 1,
        }
    }
    for edge in graph.iter_edges() {
        *stats.edges_by_kind.entry(edge.kind).or_default() += 1;
    }
    stats
}

/// Run every validation
pub fn validate_all(graph: &FactGraph) -> GraphValidationResult {
    GraphValidationResult {
        structural_errors: validate_structural(graph),
        relational_errors: validate_relational(graph),
        stats: compute_stats(graph),
    }
}

/// Panic with every error if the graph is malformed
pub fn assert_valid(graph: &FactGraph) {
    let result = validate_all(graph);
    assert!(
        result.is_valid(),
        "graph validation failed:\n{}",
        result.all_errors().join("\n")
    );
}
