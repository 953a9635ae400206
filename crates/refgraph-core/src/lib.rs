//! Refgraph Core - semantic graph indexing for resolved syntax trees
//!
//! This crate turns one translation unit's syntax tree into graph facts:
//! - Deterministic, content-addressed node identities
//! - Canonical source ranges with macro and implicit-code handling
//! - A per-run job worklist with cooperative cancellation
//! - An emission layer reporting nodes, edges, and anchors to a sink

pub mod ast;
pub mod builder;
pub mod emitter;
pub mod error;
pub mod graph;
pub mod identity;
pub mod ids;
pub mod indexer;
pub mod options;
pub mod parent_map;
pub mod range;
pub mod scheduler;
pub mod semantic_hash;
pub mod signature;
pub mod sink;
pub mod source;

// Input model re-exports
pub use ast::{
    AstNode, Decl, DeclId, DeclKind, DeclName, Dialect, InstanceKind, Qualifier, RawComment,
    RecordTag, Stmt, StmtId, StmtKind, SyntaxTree, TemplateArg, TemplateInstance, TypeExpr,
    TypeExprId, TypeKind,
};
pub use builder::TreeBuilder;
pub use source::{
    FileId, FileLoc, FileSpan, MacroExpansion, MacroId, SourceFile, SourceLoc, SourceSpan,
    TextScanner, TokenScanner,
};

// Identity and graph re-exports
pub use graph::{Attributes, Completeness, EdgeKind, FactGraph, GraphNode, NodeKind};
pub use identity::{usr_string, IdentityBuilder};
pub use ids::{NodeId, NodeSet, Signature};
pub use range::{Range, RangeResolver, SpellingMode};

// Run re-exports
pub use error::{Diagnostic, DiagnosticKind, IndexerError};
pub use indexer::{index_tree, Indexer, RunSummary};
pub use options::{
    ForwardDeclCommentPolicy, ForwardDeclComments, IndexerOptions, TemplatePolicy,
    UnimplementedPolicy, Verbosity,
};
pub use scheduler::{Job, SchedulerState, Worklist};
pub use signature::{CachedRenderer, QualifiedNameRenderer, SignatureRenderer};
pub use sink::{DeclareOutcome, Fact, GraphSink, JsonLinesSink, MemorySink, NullSink};

pub use tokio_util::sync::CancellationToken;
