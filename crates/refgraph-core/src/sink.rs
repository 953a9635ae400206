//! Receivers of emitted graph facts.
//!
//! The indexer calls a [`GraphSink`] synchronously from a single thread.
//! Three sinks ship with the crate:
//!
//! - [`MemorySink`] keeps every fact and mirrors them into a [`FactGraph`]
//! - [`JsonLinesSink`] streams one JSON object per fact to a writer
//! - [`NullSink`] claims every file and discards everything else

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::{self, Write};
use tracing::{trace, warn};

use crate::graph::{Attributes, EdgeData, EdgeKind, FactGraph, GraphNode, NodeKind};
use crate::ids::NodeId;
use crate::range::Range;
use crate::source::FileId;

/// Result of declaring a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclareOutcome {
    /// First declaration of the node
    New,
    /// Same kind and attributes as before; ignored
    Duplicate,
    /// Different kind or attributes than before; the first declaration wins
    Conflict,
}

/// Observer of the facts one indexing run produces.
pub trait GraphSink {
    /// Declare a node. Repeating a declaration is a no-op; a differing one
    /// is reported as [`DeclareOutcome::Conflict`].
    fn declare(&mut self, id: &NodeId, kind: NodeKind, attributes: &Attributes) -> DeclareOutcome;

    /// Add an edge. `ordinal` is present only for ordered kinds.
    fn edge(&mut self, source: &NodeId, kind: EdgeKind, target: &NodeId, ordinal: Option<u32>);

    /// Bind the anchor `anchor` at `range` to `target` with an edge of `kind`.
    fn anchor(&mut self, anchor: &NodeId, range: &Range, kind: EdgeKind, target: &NodeId);

    /// Mark `file` as receiving facts from this run. Returns `false` when
    /// another producer is responsible for it.
    fn claim_file(&mut self, file: FileId) -> bool;

    /// Files claimed so far, in ascending order.
    fn claimed_files(&self) -> Vec<FileId>;

    /// Whether this run should emit the implicit instantiation `id`.
    fn claim_implicit(&mut self, _id: &NodeId) -> bool {
        true
    }
}

/// One emitted fact, as recorded by [`MemorySink`] and written by
/// [`JsonLinesSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "fact", rename_all = "snake_case")]
pub enum Fact {
    Node {
        id: NodeId,
        kind: NodeKind,
        #[serde(default, skip_serializing_if = "Attributes::is_empty")]
        attributes: Attributes,
    },
    Edge {
        source: NodeId,
        kind: EdgeKind,
        target: NodeId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ordinal: Option<u32>,
    },
    Anchor {
        id: NodeId,
        range: Range,
        kind: EdgeKind,
        target: NodeId,
        /// Path of the anchored file, when the sink knows it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

/// Bookkeeping shared by the sinks for idempotent declarations.
#[derive(Debug, Default, Clone)]
struct DeclarationLog {
    declared: HashMap<NodeId, (NodeKind, Attributes)>,
}

impl DeclarationLog {
    fn record(&mut self, id: &NodeId, kind: NodeKind, attributes: &Attributes) -> DeclareOutcome {
        match self.declared.get(id) {
            None => {
                self.declared
                    .insert(id.clone(), (kind, attributes.clone()));
                DeclareOutcome::New
            }
            Some((k, a)) if *k == kind && a == attributes => DeclareOutcome::Duplicate,
            Some(_) => DeclareOutcome::Conflict,
        }
    }
}

// ============================================================================
// Memory Sink
// ============================================================================

/// Keeps every fact in emission order plus a queryable [`FactGraph`].
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    facts: Vec<Fact>,
    graph: FactGraph,
    log: DeclarationLog,
    claimed: BTreeSet<FileId>,
    foreign: HashSet<FileId>,
    implicit: HashSet<NodeId>,
    conflicts: Vec<NodeId>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `files` as owned by another producer: claims on them fail.
    pub fn with_foreign_files(mut self, files: impl IntoIterator<Item = FileId>) -> Self {
        self.foreign.extend(files);
        self
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub fn graph(&self) -> &FactGraph {
        &self.graph
    }

    /// Nodes whose repeated declaration disagreed with the first one.
    pub fn conflicts(&self) -> &[NodeId] {
        &self.conflicts
    }

    /// How many `Node` facts were recorded for `id` (at most one).
    pub fn declarations_of(&self, id: &NodeId) -> usize {
        self.facts
            .iter()
            .filter(|f| matches!(f, Fact::Node { id: node, .. } if node == id))
            .count()
    }

    /// Anchors bound to `target` with an edge of `kind`.
    pub fn anchors_to(&self, target: &NodeId, kind: EdgeKind) -> Vec<(&NodeId, &Range)> {
        self.facts
            .iter()
            .filter_map(|f| match f {
                Fact::Anchor {
                    id,
                    range,
                    kind: k,
                    target: t,
                    ..
                } if t == target && *k == kind => Some((id, range)),
                _ => None,
            })
            .collect()
    }

    /// Declared nodes of `kind`, in declaration order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<&NodeId> {
        self.facts
            .iter()
            .filter_map(|f| match f {
                Fact::Node { id, kind: k, .. } if *k == kind => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn attributes_of(&self, id: &NodeId) -> Option<&Attributes> {
        self.log.declared.get(id).map(|(_, a)| a)
    }
}

impl GraphSink for MemorySink {
    fn declare(&mut self, id: &NodeId, kind: NodeKind, attributes: &Attributes) -> DeclareOutcome {
        let outcome = self.log.record(id, kind, attributes);
        match outcome {
            DeclareOutcome::New => {
                self.graph
                    .upsert_node(GraphNode::declared(id.clone(), kind, attributes.clone()));
                self.facts.push(Fact::Node {
                    id: id.clone(),
                    kind,
                    attributes: attributes.clone(),
                });
            }
            DeclareOutcome::Duplicate => {}
            DeclareOutcome::Conflict => {
                warn!(%id, kind = kind.as_str(), "conflicting declaration");
                self.conflicts.push(id.clone());
            }
        }
        outcome
    }

    fn edge(&mut self, source: &NodeId, kind: EdgeKind, target: &NodeId, ordinal: Option<u32>) {
        if self
            .graph
            .add_edge(source, target, EdgeData::new(kind, ordinal))
            .is_some()
        {
            self.facts.push(Fact::Edge {
                source: source.clone(),
                kind,
                target: target.clone(),
                ordinal,
            });
        }
    }

    fn anchor(&mut self, anchor: &NodeId, range: &Range, kind: EdgeKind, target: &NodeId) {
        self.graph
            .upsert_node(GraphNode::anchor(anchor.clone(), range.clone()));
        if self
            .graph
            .add_edge(anchor, target, EdgeData::new(kind, None))
            .is_some()
        {
            self.facts.push(Fact::Anchor {
                id: anchor.clone(),
                range: range.clone(),
                kind,
                target: target.clone(),
                path: None,
            });
        }
    }

    fn claim_file(&mut self, file: FileId) -> bool {
        if self.foreign.contains(&file) {
            return false;
        }
        self.claimed.insert(file);
        true
    }

    fn claimed_files(&self) -> Vec<FileId> {
        self.claimed.iter().copied().collect()
    }

    fn claim_implicit(&mut self, id: &NodeId) -> bool {
        self.implicit.insert(id.clone())
    }
}

// ============================================================================
// JSON Lines Sink
// ============================================================================

/// Streams facts as newline-delimited JSON.
///
/// Write errors are held until [`JsonLinesSink::finish`]; after the first
/// one, further facts are dropped.
pub struct JsonLinesSink<W: Write> {
    writer: W,
    log: DeclarationLog,
    claimed: BTreeSet<FileId>,
    implicit: HashSet<NodeId>,
    paths: Vec<String>,
    written: usize,
    error: Option<io::Error>,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            log: DeclarationLog::default(),
            claimed: BTreeSet::new(),
            implicit: HashSet::new(),
            paths: Vec::new(),
            written: 0,
            error: None,
        }
    }

    /// File paths indexed by `FileId`, used to label anchors.
    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }

    /// Facts written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and return the writer, or the first write error.
    pub fn finish(mut self) -> io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write(&mut self, fact: &Fact) {
        if self.error.is_some() {
            return;
        }
        let result = serde_json::to_writer(&mut self.writer, fact)
            .map_err(io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        match result {
            Ok(()) => self.written += 1,
            Err(err) => {
                warn!(error = %err, "failed to write fact; dropping the rest");
                self.error = Some(err);
            }
        }
    }
}

impl<W: Write> GraphSink for JsonLinesSink<W> {
    fn declare(&mut self, id: &NodeId, kind: NodeKind, attributes: &Attributes) -> DeclareOutcome {
        let outcome = self.log.record(id, kind, attributes);
        if outcome == DeclareOutcome::New {
            self.write(&Fact::Node {
                id: id.clone(),
                kind,
                attributes: attributes.clone(),
            });
        }
        outcome
    }

    fn edge(&mut self, source: &NodeId, kind: EdgeKind, target: &NodeId, ordinal: Option<u32>) {
        self.write(&Fact::Edge {
            source: source.clone(),
            kind,
            target: target.clone(),
            ordinal,
        });
    }

    fn anchor(&mut self, anchor: &NodeId, range: &Range, kind: EdgeKind, target: &NodeId) {
        let path = range
            .span()
            .and_then(|span| self.paths.get(span.file.index()))
            .cloned();
        self.write(&Fact::Anchor {
            id: anchor.clone(),
            range: range.clone(),
            kind,
            target: target.clone(),
            path,
        });
    }

    fn claim_file(&mut self, file: FileId) -> bool {
        self.claimed.insert(file);
        true
    }

    fn claimed_files(&self) -> Vec<FileId> {
        self.claimed.iter().copied().collect()
    }

    fn claim_implicit(&mut self, id: &NodeId) -> bool {
        self.implicit.insert(id.clone())
    }
}

// ============================================================================
// Null Sink
// ============================================================================

/// Discards every fact; still tracks claimed files so file sweeps run.
#[derive(Debug, Default, Clone)]
pub struct NullSink {
    claimed: BTreeSet<FileId>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GraphSink for NullSink {
    fn declare(&mut self, id: &NodeId, kind: NodeKind, _attributes: &Attributes) -> DeclareOutcome {
        trace!(%id, kind = kind.as_str(), "discarding declaration");
        DeclareOutcome::New
    }

    fn edge(&mut self, _source: &NodeId, _kind: EdgeKind, _target: &NodeId, _ordinal: Option<u32>) {}

    fn anchor(&mut self, _anchor: &NodeId, _range: &Range, _kind: EdgeKind, _target: &NodeId) {}

    fn claim_file(&mut self, file: FileId) -> bool {
        self.claimed.insert(file);
        true
    }

    fn claimed_files(&self) -> Vec<FileId> {
        self.claimed.iter().copied().collect()
    }
}
