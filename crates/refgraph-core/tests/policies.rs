//! Behaviour under each indexer switch.

mod common;

use common::graph_validator::assert_valid;
use common::{decl_id, forward_then_definition, index};
use pretty_assertions::assert_eq;
use refgraph_core::{
    index_tree, usr_string, DiagnosticKind, Dialect, EdgeKind, Fact, FileLoc, ForwardDeclCommentPolicy,
    ForwardDeclComments, IndexerError, IndexerOptions, MacroExpansion, MemorySink, NodeKind,
    Range, RecordTag, SourceSpan, Stmt, StmtKind, SyntaxTree, TreeBuilder, UnimplementedPolicy,
    Verbosity,
};

// ============================================================================
// Unimplemented constructs
// ============================================================================

/// `f` contains a statement with no indexing rule; `g` follows it.
fn tree_with_unsupported_statement() -> SyntaxTree {
    let mut b = TreeBuilder::new(Dialect::ObjC);
    let file = b.add_file("u.m", Some("void f(void) { @try {} }\nvoid g(void) { }\n"));
    let f = b.function(b.root(), "f", None, b.span(file, 5, 6));
    let odd = b.add_stmt(
        Stmt::new(StmtKind::Unsupported {
            construct: "objc_try".to_string(),
        })
        .at(b.span(file, 15, 22)),
    );
    let body = b.compound(vec![odd]);
    b.set_body(f, body);
    let g = b.function(b.root(), "g", None, b.span(file, 30, 31));
    let body = b.compound(Vec::new());
    b.set_body(g, body);
    b.finish()
}

#[test]
fn test_abort_stops_run_without_file_sweep() {
    let tree = tree_with_unsupported_statement();
    let options = IndexerOptions::default().with_unimplemented(UnimplementedPolicy::Abort);
    let mut sink = MemorySink::new();

    let err = index_tree(&tree, options, &mut sink).unwrap_err();
    match err {
        IndexerError::Unimplemented { construct, .. } => assert_eq!(construct, "objc_try"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(sink.nodes_of_kind(NodeKind::File).is_empty());
    assert_eq!(sink.nodes_of_kind(NodeKind::Function).len(), 1);
}

#[test]
fn test_continue_records_diagnostic_and_finishes() {
    let tree = tree_with_unsupported_statement();
    let (sink, summary) = index(&tree, IndexerOptions::default());

    assert_eq!(summary.diagnostics.len(), 1);
    assert_eq!(summary.diagnostics[0].kind, DiagnosticKind::Unimplemented);
    assert!(summary.diagnostics[0].message.contains("objc_try"));
    assert_eq!(sink.nodes_of_kind(NodeKind::Function).len(), 2);
    assert_eq!(sink.nodes_of_kind(NodeKind::File).len(), 1);
    assert_valid(sink.graph());
}

// ============================================================================
// External identifiers
// ============================================================================

#[test]
fn test_usr_nodes_follow_byte_size() {
    let fixture = forward_then_definition(0);
    let f = decl_id(&fixture.tree, fixture.definition);
    let x = decl_id(&fixture.tree, fixture.x);

    let (none, _) = index(&fixture.tree, IndexerOptions::default());
    assert!(none.nodes_of_kind(NodeKind::Usr).is_empty());

    let (sink, _) = index(
        &fixture.tree,
        IndexerOptions::default().with_usr_byte_size(8),
    );
    let usrs = sink.nodes_of_kind(NodeKind::Usr);
    assert_eq!(usrs.len(), 1);
    let usr = usrs[0].clone();
    assert!(sink.graph().has_edge(&f, EdgeKind::Usr, &usr));
    assert!(!sink.graph().has_edge(&x, EdgeKind::Usr, &usr));

    let label = sink
        .attributes_of(&usr)
        .and_then(|a| a.label.clone())
        .unwrap();
    assert_eq!(label.len(), 16);
    assert!(label.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));

    // Both declarations of `f` spell the same USR.
    assert_eq!(usr_string(&fixture.tree, fixture.forward), "c:@F@f#int");
    assert_eq!(usr_string(&fixture.tree, fixture.definition), "c:@F@f#int");
}

// ============================================================================
// Forward declaration comments
// ============================================================================

fn documented_forward_record(dialect: Dialect) -> SyntaxTree {
    let mut b = TreeBuilder::new(dialect);
    let file = b.add_file("doc.h", Some("/// A thing\nstruct S;\n"));
    let record = b.record(b.root(), Some("S"), RecordTag::Struct, false, b.span(file, 19, 20));
    b.comment(b.span(file, 0, 11), "/// A thing", Some(record));
    b.finish()
}

#[test]
fn test_forward_comment_policy_is_per_dialect_family() {
    let ignore_cpp = IndexerOptions::default().with_forward_decl_comments(ForwardDeclComments {
        cpp: ForwardDeclCommentPolicy::Ignore,
        objc: ForwardDeclCommentPolicy::Emit,
    });

    let (cpp, _) = index(&documented_forward_record(Dialect::Cpp), ignore_cpp.clone());
    assert!(cpp.nodes_of_kind(NodeKind::Doc).is_empty());

    let (objc, _) = index(&documented_forward_record(Dialect::ObjCpp), ignore_cpp);
    let docs = objc.nodes_of_kind(NodeKind::Doc);
    assert_eq!(docs.len(), 1);
    assert_eq!(
        objc.attributes_of(docs[0]).and_then(|a| a.text.as_deref()),
        Some("/// A thing")
    );
}

// ============================================================================
// Ranges
// ============================================================================

#[test]
fn test_macro_declaration_anchored_at_expansion() {
    let mut b = TreeBuilder::new(Dialect::C);
    let file = b.add_file("m.c", Some("#define V(n) int n\nV(y);\n"));
    let expansion = b.add_macro(MacroExpansion {
        name: "V".to_string(),
        expansion: refgraph_core::FileSpan::new(file, 19, 23),
        definition: Some(refgraph_core::FileSpan::new(file, 8, 18)),
    });
    let int = b.builtin("int");
    let y = b.var(
        b.root(),
        "y",
        int,
        SourceSpan::in_macro(expansion, Some(FileLoc { file, offset: 21 })),
    );
    let tree = b.finish();

    let (sink, summary) = index(&tree, IndexerOptions::default());
    assert_eq!(summary.unresolved_ranges, 0);
    let y = decl_id(&tree, y);
    let bindings = sink.anchors_to(&y, EdgeKind::DefinesBinding);
    assert_eq!(bindings.len(), 1);
    assert_eq!(
        bindings[0].1.span().map(|s| (s.begin, s.end)),
        Some((19, 23))
    );
}

/// `g` is called from `f` through compiler-generated code only.
fn tree_with_implicit_call() -> SyntaxTree {
    let mut b = TreeBuilder::new(Dialect::Cpp);
    let file = b.add_file("i.cc", Some("void g() { }\nvoid f() { }\n"));
    let g = b.function(b.root(), "g", None, b.span(file, 5, 6));
    let body = b.compound(Vec::new());
    b.set_body(g, body);

    let f = b.function(b.root(), "f", None, b.span(file, 18, 19));
    let callee = b.decl_ref(g, SourceSpan::invalid());
    let call = b.add_stmt(
        Stmt::new(StmtKind::Call {
            callee,
            args: Vec::new(),
        })
        .implicit(),
    );
    let body = b.compound(vec![call]);
    b.set_body(f, body);
    b.finish()
}

#[test]
fn test_implicit_call_owned_by_enclosing_function() {
    let tree = tree_with_implicit_call();
    let g = decl_id(&tree, refgraph_core::DeclId(1));
    let f = decl_id(&tree, refgraph_core::DeclId(2));

    let (full, summary) = index(&tree, IndexerOptions::default());
    assert_eq!(summary.unresolved_ranges, 1);
    let calls = full.anchors_to(&g, EdgeKind::RefCall);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1, &Range::implicit(f.clone()));
    assert!(full.graph().has_edge(calls[0].0, EdgeKind::ChildOf, &f));

    let common = IndexerOptions::default().with_verbosity(Verbosity::Common);
    let (common, _) = index(&tree, common);
    assert!(common.anchors_to(&g, EdgeKind::RefCall).is_empty());
    assert_eq!(common.nodes_of_kind(NodeKind::Function).len(), 2);
}

// ============================================================================
// Claimed files
// ============================================================================

#[test]
fn test_foreign_file_gets_no_anchors_or_sweep() {
    let fixture = forward_then_definition(0);
    let mut sink = MemorySink::new().with_foreign_files([refgraph_core::FileId(0)]);
    let summary = index_tree(&fixture.tree, IndexerOptions::default(), &mut sink).unwrap();

    assert_eq!(summary.file_jobs, 0);
    assert!(!sink
        .facts()
        .iter()
        .any(|fact| matches!(fact, Fact::Anchor { .. })));
    assert!(sink.nodes_of_kind(NodeKind::File).is_empty());
    // Semantic nodes are still reported.
    let f = decl_id(&fixture.tree, fixture.definition);
    assert_eq!(sink.declarations_of(&f), 1);
}
