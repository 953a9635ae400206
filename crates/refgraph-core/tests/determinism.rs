//! Node identities depend on meaning, never on layout or run order.

mod common;

use common::{decl_id, forward_then_definition, index, max_template};
use pretty_assertions::assert_eq;
use refgraph_core::{
    Dialect, Fact, IdentityBuilder, IndexerOptions, MemorySink, NodeId, NodeKind, Qualifier,
    SyntaxTree, TreeBuilder, UnimplementedPolicy,
};
use std::collections::BTreeSet;

/// Every declared node except anchors, whose ids track offsets.
fn semantic_nodes(sink: &MemorySink) -> BTreeSet<(NodeKind, NodeId)> {
    sink.graph()
        .iter_nodes()
        .filter_map(|node| Some((node.kind?, node.id.clone())))
        .filter(|(kind, _)| *kind != NodeKind::Anchor)
        .collect()
}

fn all_decl_ids(tree: &SyntaxTree) -> Vec<NodeId> {
    let mut ids = IdentityBuilder::new(UnimplementedPolicy::Continue);
    (1..tree.decls.len() as u32)
        .map(|i| ids.decl_id(tree, refgraph_core::DeclId(i)).unwrap())
        .collect()
}

#[test]
fn test_whitespace_does_not_change_declaration_ids() {
    let tight = forward_then_definition(0);
    let padded = forward_then_definition(17);

    assert_eq!(all_decl_ids(&tight.tree), all_decl_ids(&padded.tree));
    assert_eq!(
        decl_id(&tight.tree, tight.x),
        decl_id(&padded.tree, padded.x)
    );
}

#[test]
fn test_whitespace_does_not_change_emitted_nodes() {
    let tight = max_template(0);
    let padded = max_template(9);

    let (tight_sink, _) = index(&tight.tree, IndexerOptions::default());
    let (padded_sink, _) = index(&padded.tree, IndexerOptions::default());
    assert_eq!(semantic_nodes(&tight_sink), semantic_nodes(&padded_sink));

    // Anchors move with the text.
    let anchors = |sink: &MemorySink| -> BTreeSet<NodeId> {
        sink.facts()
            .iter()
            .filter_map(|fact| match fact {
                Fact::Anchor { id, .. } => Some(id.clone()),
                _ => None,
            })
            .collect()
    };
    assert_ne!(anchors(&tight_sink), anchors(&padded_sink));
}

#[test]
fn test_repeated_runs_emit_identical_facts() {
    let fixture = max_template(0);
    let (first, _) = index(&fixture.tree, IndexerOptions::default());
    let (second, _) = index(&fixture.tree, IndexerOptions::default());
    assert_eq!(first.facts(), second.facts());
}

#[test]
fn test_qualifier_order_is_irrelevant() {
    let mut b = TreeBuilder::new(Dialect::Cpp);
    let file = b.add_file("q.cc", None);
    let int = b.builtin("int");
    let cv = b.qualified(vec![Qualifier::Const, Qualifier::Volatile], int);
    let vc = b.qualified(vec![Qualifier::Volatile, Qualifier::Const], int);
    let cv_ptr = b.pointer(cv);
    let vc_ptr = b.pointer(vc);
    let first = b.var(b.root(), "a", cv_ptr, b.span(file, 0, 1));
    let second = b.var(b.root(), "b", vc_ptr, b.span(file, 4, 5));
    let tree = b.finish();

    let mut ids = IdentityBuilder::new(UnimplementedPolicy::Continue);
    assert_eq!(
        ids.type_set(&tree, cv).unwrap().primary(),
        ids.type_set(&tree, vc).unwrap().primary()
    );
    assert_eq!(
        ids.type_set(&tree, cv_ptr).unwrap().primary(),
        ids.type_set(&tree, vc_ptr).unwrap().primary()
    );
    assert_ne!(ids.decl_id(&tree, first).unwrap(), ids.decl_id(&tree, second).unwrap());
}

#[test]
fn test_memoized_and_fresh_builders_agree() {
    let fixture = max_template(0);
    let mut shared = IdentityBuilder::new(UnimplementedPolicy::Continue);
    let decls = [
        fixture.int_instance,
        fixture.template,
        fixture.pattern,
        fixture.double_instance,
        fixture.caller,
    ];
    for decl in decls {
        assert_eq!(shared.decl_id(&fixture.tree, decl).unwrap(), decl_id(&fixture.tree, decl));
    }
    assert!(shared.memoized_decls() >= decls.len());
}
