//! Shared test utilities for refgraph-core integration tests
//!
//! Builds small translation units by hand and runs them through the
//! indexer with a [`MemorySink`].

#![allow(dead_code)]

pub mod graph_validator;

use refgraph_core::{
    DeclId, Dialect, IdentityBuilder, IndexerOptions, MemorySink, NodeId, RunSummary, SyntaxTree,
    TemplateArg, TreeBuilder, UnimplementedPolicy,
};

/// Index `tree` into a fresh memory sink.
pub fn index(tree: &SyntaxTree, options: IndexerOptions) -> (MemorySink, RunSummary) {
    let mut sink = MemorySink::new();
    let summary = refgraph_core::index_tree(tree, options, &mut sink).expect("indexing failed");
    (sink, summary)
}

/// The node id `decl` receives in `tree`.
pub fn decl_id(tree: &SyntaxTree, decl: DeclId) -> NodeId {
    IdentityBuilder::new(UnimplementedPolicy::Continue)
        .decl_id(tree, decl)
        .expect("identity failed")
}

/// Pad `text` with `shift` leading spaces.
fn shifted(text: &str, shift: u32) -> String {
    format!("{}{}", " ".repeat(shift as usize), text)
}

// ============================================================================
// Forward declaration then definition
// ============================================================================

pub struct ForwardThenDefinition {
    pub tree: SyntaxTree,
    pub forward: DeclId,
    pub definition: DeclId,
    pub x: DeclId,
}

/// ```text
/// void f(int);
/// void f(int x) { }
/// ```
///
/// Every offset is moved right by `shift`.
pub fn forward_then_definition(shift: u32) -> ForwardThenDefinition {
    let text = shifted("void f(int);\nvoid f(int x) { }\n", shift);
    let mut b = TreeBuilder::new(Dialect::Cpp);
    let file = b.add_file("f.cc", Some(&text));
    let int = b.builtin("int");

    let forward = b.function(b.root(), "f", None, b.span(file, shift + 5, shift + 6));
    b.param(forward, None, int, b.span(file, shift + 7, shift + 10));

    let definition = b.function(b.root(), "f", None, b.span(file, shift + 18, shift + 19));
    let x = b.param(definition, Some("x"), int, b.span(file, shift + 24, shift + 25));
    b.redeclare(definition, forward);
    let body = b.compound(Vec::new());
    b.set_body(definition, body);

    ForwardThenDefinition {
        tree: b.finish(),
        forward,
        definition,
        x,
    }
}

// ============================================================================
// Function template with two instantiations
// ============================================================================

pub struct MaxTemplate {
    pub tree: SyntaxTree,
    pub template: DeclId,
    pub pattern: DeclId,
    pub int_instance: DeclId,
    pub double_instance: DeclId,
    pub caller: DeclId,
}

/// ```text
/// template <typename T> T max(T a, T b) { }
/// void use() { max(1, 2); max(1.0, 2.0); }
/// ```
pub fn max_template(shift: u32) -> MaxTemplate {
    let text = shifted(
        "template <typename T> T max(T a, T b) { }\nvoid use() { max(1, 2); max(1.0, 2.0); }\n",
        shift,
    );
    let at = |offset: u32| offset + shift;
    let mut b = TreeBuilder::new(Dialect::Cpp);
    let file = b.add_file("max.cc", Some(&text));

    let (template, pattern) =
        b.function_template(b.root(), "max", None, b.span(file, at(24), at(27)));
    let t = b.template_param(template, "T", b.span(file, at(19), at(20)));
    let a_ty = b.named(t, b.span(file, at(28), at(29)));
    b.param(pattern, Some("a"), a_ty, b.span(file, at(30), at(31)));
    let b_ty = b.named(t, b.span(file, at(33), at(34)));
    b.param(pattern, Some("b"), b_ty, b.span(file, at(35), at(36)));
    let body = b.compound(Vec::new());
    b.set_body(pattern, body);

    let int = b.builtin("int");
    let int_instance =
        b.instantiate_function(template, vec![TemplateArg::Type(int)], Some(int), vec![int, int]);
    let double = b.builtin("double");
    let double_instance = b.instantiate_function(
        template,
        vec![TemplateArg::Type(double)],
        Some(double),
        vec![double, double],
    );

    let caller = b.function(b.root(), "use", None, b.span(file, at(47), at(50)));
    let int_ref = b.decl_ref(int_instance, b.span(file, at(55), at(58)));
    let one = b.literal("1", b.span(file, at(59), at(60)));
    let two = b.literal("2", b.span(file, at(62), at(63)));
    let int_call = b.call(int_ref, vec![one, two], b.span(file, at(55), at(64)));
    let double_ref = b.decl_ref(double_instance, b.span(file, at(66), at(69)));
    let one = b.literal("1.0", b.span(file, at(70), at(73)));
    let two = b.literal("2.0", b.span(file, at(75), at(78)));
    let double_call = b.call(double_ref, vec![one, two], b.span(file, at(66), at(79)));
    let caller_body = b.compound(vec![int_call, double_call]);
    b.set_body(caller, caller_body);

    MaxTemplate {
        tree: b.finish(),
        template,
        pattern,
        int_instance,
        double_instance,
        caller,
    }
}

/// `count` functions named `f0`, `f1`, ... each on its own line.
pub fn many_functions(count: u32) -> SyntaxTree {
    let mut b = TreeBuilder::new(Dialect::C);
    let text: String = (0..count).map(|i| format!("void f{i}(void) {{ }}\n")).collect();
    let file = b.add_file("many.c", Some(&text));
    let mut offset = 0;
    for i in 0..count {
        let name_len = format!("f{i}").len() as u32;
        let span = b.span(file, offset + 5, offset + 5 + name_len);
        let f = b.function(b.root(), &format!("f{i}"), None, span);
        let body = b.compound(Vec::new());
        b.set_body(f, body);
        offset += format!("void f{i}(void) {{ }}\n").len() as u32;
    }
    b.finish()
}
