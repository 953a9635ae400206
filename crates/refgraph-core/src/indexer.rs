//! Run driver: seeds the worklist, executes jobs, and runs the file sweep.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ast::SyntaxTree;
use crate::emitter::GraphEmitter;
use crate::error::{Diagnostic, IndexerError};
use crate::options::IndexerOptions;
use crate::scheduler::{Job, Worklist};
use crate::signature::{CachedRenderer, SignatureRenderer};
use crate::sink::GraphSink;
use crate::source::{TextScanner, TokenScanner};

/// What one run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Jobs dequeued and executed, file sweeps included
    pub jobs_started: usize,
    pub decl_jobs: usize,
    pub file_jobs: usize,
    /// The run stopped early because its token was cancelled
    pub cancelled: bool,
    /// Spans that fell back to implicit ranges
    pub unresolved_ranges: usize,
    pub diagnostics: Vec<Diagnostic>,
}

/// Indexes one translation unit into a [`GraphSink`].
///
/// ```ignore
/// let mut sink = MemorySink::new();
/// let summary = Indexer::new(&tree, IndexerOptions::default()).index(&mut sink)?;
/// ```
pub struct Indexer<'t> {
    tree: &'t SyntaxTree,
    options: IndexerOptions,
    cancel: CancellationToken,
    /// Falls back to a [`TextScanner`] over the tree's file text
    scanner: Option<Box<dyn TokenScanner + 't>>,
    renderer: Box<dyn SignatureRenderer + 't>,
}

impl<'t> Indexer<'t> {
    pub fn new(tree: &'t SyntaxTree, options: IndexerOptions) -> Self {
        Self {
            tree,
            options,
            cancel: CancellationToken::new(),
            scanner: None,
            renderer: Box::new(CachedRenderer::default()),
        }
    }

    /// Stop between jobs once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_scanner(mut self, scanner: Box<dyn TokenScanner + 't>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn with_renderer(mut self, renderer: Box<dyn SignatureRenderer + 't>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn options(&self) -> &IndexerOptions {
        &self.options
    }

    /// A handle that cancels this indexer's runs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run every job for the tree, reporting facts to `sink`.
    ///
    /// Under the abort policy the first unimplemented construct ends the run
    /// with an error and no file sweep. Cancellation is not an error: the
    /// summary reports it and the sweep is skipped.
    pub fn index(&mut self, sink: &mut dyn GraphSink) -> Result<RunSummary, IndexerError> {
        let tree = self.tree;
        tree.validate()?;

        let text_scanner = TextScanner::new(&tree.files);
        let scanner: &dyn TokenScanner = match &self.scanner {
            Some(scanner) => scanner.as_ref(),
            None => &text_scanner,
        };
        let mut emitter = GraphEmitter::new(tree, &self.options, scanner, self.renderer.as_mut());
        let mut worklist = Worklist::new();
        let mut summary = RunSummary::default();

        worklist.seed(tree.top_level_decls().iter().copied())?;
        while let Some(job) = next_job(&self.cancel, &mut worklist, &mut summary) {
            let Job::Decl(decl) = job else {
                continue;
            };
            summary.decl_jobs += 1;
            if let Err(err) = emitter.run_decl_job(decl, sink) {
                let dropped = worklist.terminate();
                debug!(dropped, "run aborted");
                return Err(err);
            }
            for found in emitter.take_discovered() {
                worklist.enqueue(Job::Decl(found))?;
            }
        }

        if !summary.cancelled {
            worklist.begin_file_sweep(sink.claimed_files())?;
            while let Some(job) = next_job(&self.cancel, &mut worklist, &mut summary) {
                let Job::FileSweep(file) = job else {
                    continue;
                };
                summary.file_jobs += 1;
                if let Err(err) = emitter.run_file_job(file, sink) {
                    worklist.terminate();
                    return Err(err);
                }
            }
        }

        let dropped = worklist.terminate();
        summary.jobs_started = worklist.started();
        summary.unresolved_ranges = emitter.unresolved_ranges();
        summary.diagnostics = emitter.take_diagnostics();
        info!(
            decl_jobs = summary.decl_jobs,
            file_jobs = summary.file_jobs,
            diagnostics = summary.diagnostics.len(),
            cancelled = summary.cancelled,
            dropped,
            "indexing run finished"
        );
        Ok(summary)
    }
}

/// Dequeue the next job unless the run has been cancelled.
fn next_job(
    cancel: &CancellationToken,
    worklist: &mut Worklist,
    summary: &mut RunSummary,
) -> Option<Job> {
    if cancel.is_cancelled() {
        if !summary.cancelled {
            info!(remaining = worklist.len(), "run cancelled");
        }
        summary.cancelled = true;
        return None;
    }
    worklist.dequeue()
}

/// Index `tree` with default collaborators.
pub fn index_tree(
    tree: &SyntaxTree,
    options: IndexerOptions,
    sink: &mut dyn GraphSink,
) -> Result<RunSummary, IndexerError> {
    Indexer::new(tree, options).index(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{DeclId, Dialect};
    use crate::builder::TreeBuilder;
    use crate::graph::NodeKind;
    use crate::options::UnimplementedPolicy;
    use crate::sink::MemorySink;

    fn two_functions() -> SyntaxTree {
        let mut b = TreeBuilder::new(Dialect::C);
        let file = b.add_file("a.c", None);
        b.function(b.root(), "f", None, b.span(file, 5, 6));
        b.function(b.root(), "g", None, b.span(file, 20, 21));
        b.comment(b.span(file, 30, 40), "// trailer", None);
        b.finish()
    }

    #[test]
    fn test_runs_decl_jobs_then_file_sweep() {
        let tree = two_functions();
        let mut sink = MemorySink::new();
        let summary = index_tree(&tree, IndexerOptions::default(), &mut sink).unwrap();

        assert_eq!(summary.decl_jobs, 2);
        assert_eq!(summary.file_jobs, 1);
        assert_eq!(summary.jobs_started, 3);
        assert!(!summary.cancelled);
        assert_eq!(sink.nodes_of_kind(NodeKind::Function).len(), 2);
        assert_eq!(sink.nodes_of_kind(NodeKind::File).len(), 1);
        assert_eq!(sink.nodes_of_kind(NodeKind::Doc).len(), 1);
    }

    #[test]
    fn test_cancelled_before_start() {
        let tree = two_functions();
        let token = CancellationToken::new();
        token.cancel();
        let mut sink = MemorySink::new();
        let summary = Indexer::new(&tree, IndexerOptions::default())
            .with_cancellation(token)
            .index(&mut sink)
            .unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.jobs_started, 0);
        assert!(sink.facts().is_empty());
    }

    #[test]
    fn test_abort_returns_error() {
        let mut b = TreeBuilder::new(Dialect::C);
        b.add_decl(
            b.root(),
            crate::ast::Decl::new(
                crate::ast::DeclName::ident("x"),
                crate::ast::DeclKind::Unsupported {
                    construct: "asm_label".to_string(),
                },
            ),
        );
        let tree = b.finish();

        let options = IndexerOptions::default().with_unimplemented(UnimplementedPolicy::Abort);
        let err = index_tree(&tree, options, &mut MemorySink::new()).unwrap_err();
        assert!(matches!(
            err,
            IndexerError::Unimplemented { decl: Some(DeclId(1)), .. }
        ));

        let summary = index_tree(&tree, IndexerOptions::default(), &mut MemorySink::new()).unwrap();
        assert_eq!(summary.diagnostics.len(), 1);
    }

    #[test]
    fn test_custom_renderer() {
        struct Fixed;
        impl SignatureRenderer for Fixed {
            fn render(&mut self, _tree: &SyntaxTree, _decl: DeclId) -> Option<String> {
                Some("fixed".to_string())
            }
        }

        let tree = two_functions();
        let mut sink = MemorySink::new();
        Indexer::new(&tree, IndexerOptions::default())
            .with_renderer(Box::new(Fixed))
            .index(&mut sink)
            .unwrap();
        let f = sink.nodes_of_kind(NodeKind::Function)[0].clone();
        assert_eq!(
            sink.attributes_of(&f).and_then(|a| a.label.as_deref()),
            Some("fixed")
        );
    }
}
