//! Indexer error and diagnostic types.

use crate::ast::DeclId;
use serde::Serialize;
use thiserror::Error;

/// Errors that stop an indexing run.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// A construct with no indexing rule, under the abort policy
    #[error("unimplemented construct '{construct}'")]
    Unimplemented {
        construct: String,
        decl: Option<DeclId>,
    },

    /// An arena index points past the end of its arena
    #[error("dangling {kind} reference {index} (arena holds {len})")]
    DanglingReference {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    /// The tree is structurally unusable
    #[error("invalid syntax tree: {0}")]
    InvalidTree(String),

    /// A job was offered after the worklist reached its terminal state
    #[error("worklist is closed; rejected {0}")]
    WorklistClosed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexerError {
    pub fn unimplemented(construct: impl Into<String>, decl: Option<DeclId>) -> Self {
        Self::Unimplemented {
            construct: construct.into(),
            decl,
        }
    }

    pub fn dangling(kind: &'static str, index: usize, len: usize) -> Self {
        Self::DanglingReference { kind, index, len }
    }
}

/// Category of a recoverable problem found during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A construct was skipped under the continue policy
    Unimplemented,
    /// Two redeclarations disagree on their structural identity
    InconsistentRedeclaration,
    /// The sink saw one node declared with different attributes
    ConflictingDeclaration,
}

/// A recoverable problem; the run continues with degraded output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decl: Option<DeclId>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, decl: Option<DeclId>) -> Self {
        Self {
            kind,
            message: message.into(),
            decl,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.decl {
            Some(decl) => write!(f, "{:?} (decl {}): {}", self.kind, decl.0, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}
