//! Resolution of raw source spans to canonical ranges.
//!
//! A [`Range`] is either a byte span in a physical file or an implicit marker
//! keyed to the node that owns compiler-synthesized code. The resolver maps
//! macro locations to their expansion point (or, on request, their spelling),
//! widens zero-width spans to one token, and falls back to the implicit
//! marker when a span cannot be placed in a file.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ast::{AstNode, DeclId, StmtId, SyntaxTree};
use crate::ids::NodeId;
use crate::parent_map::ParentMap;
use crate::source::{FileLoc, FileSpan, SourceLoc, SourceSpan, TokenScanner};

/// A canonical source range, or the implicit marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Range {
    Physical {
        span: FileSpan,
        /// Distinguishes the same text seen through different template
        /// instantiations
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<NodeId>,
    },
    /// Compiler-synthesized code; recorded on `owner` rather than on text
    Implicit { owner: NodeId },
}

impl Range {
    pub fn physical(span: FileSpan) -> Self {
        Range::Physical {
            span,
            context: None,
        }
    }

    pub fn implicit(owner: NodeId) -> Self {
        Range::Implicit { owner }
    }

    /// Attach an instantiation context to a physical range.
    pub fn in_context(self, context: Option<&NodeId>) -> Self {
        match self {
            Range::Physical { span, .. } => Range::Physical {
                span,
                context: context.cloned(),
            },
            implicit => implicit,
        }
    }

    pub fn span(&self) -> Option<&FileSpan> {
        match self {
            Range::Physical { span, .. } => Some(span),
            Range::Implicit { .. } => None,
        }
    }

    pub fn is_implicit(&self) -> bool {
        matches!(self, Range::Implicit { .. })
    }
}

/// Which location of a macro-produced token the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpellingMode {
    /// Where the macro was invoked
    #[default]
    Expansion,
    /// Where the token was written in the macro definition
    Spelling,
}

/// Outcome of resolving the span of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StmtRange {
    Resolved(FileSpan),
    /// The statement has no usable span; `owner` is the nearest enclosing
    /// declaration in the current job
    Implicit { owner: Option<DeclId> },
}

/// Maps raw spans to canonical file ranges.
pub struct RangeResolver<'t> {
    tree: &'t SyntaxTree,
    scanner: &'t dyn TokenScanner,
}

impl<'t> RangeResolver<'t> {
    pub fn new(tree: &'t SyntaxTree, scanner: &'t dyn TokenScanner) -> Self {
        Self { tree, scanner }
    }

    /// Resolve `span` to a non-empty file span, or `None` if it cannot be
    /// placed in a single physical file.
    pub fn resolve(&self, span: &SourceSpan, mode: SpellingMode) -> Option<FileSpan> {
        let begin = self.map_loc(span.begin, mode, false)?;
        let end = self.map_loc(span.end, mode, true)?;
        if begin.file != end.file || end.offset < begin.offset {
            trace!(?span, "span crosses files or is inverted");
            return None;
        }
        let resolved = FileSpan::new(begin.file, begin.offset, end.offset);
        if resolved.is_empty() {
            self.expand(resolved)
        } else {
            Some(resolved)
        }
    }

    /// Resolve `span`, falling back to an implicit range owned by `owner`.
    pub fn resolve_or_implicit(
        &self,
        span: &SourceSpan,
        mode: SpellingMode,
        owner: &NodeId,
    ) -> Range {
        match self.resolve(span, mode) {
            Some(resolved) => Range::physical(resolved),
            None => Range::implicit(owner.clone()),
        }
    }

    /// Canonicalize an existing range. Non-empty physical ranges and
    /// implicit ranges are returned unchanged.
    pub fn normalize(&self, range: Range) -> Range {
        match range {
            Range::Physical { span, context } if span.is_empty() => Range::Physical {
                span: self.expand(span).unwrap_or(span),
                context,
            },
            other => other,
        }
    }

    /// Resolve a statement's span, consulting the parent map for the owner
    /// of implicit code.
    pub fn resolve_stmt(&self, stmt: StmtId, parents: &ParentMap, mode: SpellingMode) -> StmtRange {
        let node = self.tree.stmt(stmt);
        if !node.implicit {
            if let Some(span) = self.resolve(&node.span, mode) {
                return StmtRange::Resolved(span);
            }
        }
        StmtRange::Implicit {
            owner: parents.enclosing_decl(AstNode::Stmt(stmt)),
        }
    }

    /// Widen a zero-width span to the token starting at it.
    fn expand(&self, span: FileSpan) -> Option<FileSpan> {
        let token = self.scanner.token_at(span.file, span.begin)?;
        if token.is_empty() {
            return None;
        }
        Some(token)
    }

    fn map_loc(&self, loc: SourceLoc, mode: SpellingMode, is_end: bool) -> Option<FileLoc> {
        match loc {
            SourceLoc::File { file, offset } => Some(FileLoc { file, offset }),
            SourceLoc::Macro {
                expansion,
                spelling,
            } => {
                if mode == SpellingMode::Spelling {
                    if let Some(spelling) = spelling {
                        return Some(spelling);
                    }
                }
                let expansion = self.tree.macro_expansion(expansion)?;
                let span = expansion.expansion;
                Some(FileLoc {
                    file: span.file,
                    offset: if is_end { span.end } else { span.begin },
                })
            }
            SourceLoc::Invalid => None,
        }
    }
}
