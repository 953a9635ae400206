//! Walks declaration subtrees and reports facts to a [`GraphSink`].
//!
//! One [`GraphEmitter`] lives for one run. Each job hands it a declaration
//! (or a file, during the sweep); the emitter computes identities, resolves
//! ranges, and emits nodes, edges, and anchors. Declarations found while
//! visiting that deserve their own job (implicit template instantiations)
//! are collected and handed back to the scheduler.

use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

use crate::ast::{
    AstNode, DeclId, DeclKind, DeclName, FunctionDecl, InstanceKind, RecordDecl, StmtId, StmtKind,
    SyntaxTree, TemplateArg, TemplateDecl, TypeExprId, TypeKind,
};
use crate::error::{Diagnostic, DiagnosticKind, IndexerError};
use crate::graph::{Attributes, Completeness, EdgeKind, NodeKind};
use crate::identity::{anchor_id, file_node, usr_node, usr_string, IdentityBuilder};
use crate::ids::{NodeId, Signature};
use crate::options::{ForwardDeclCommentPolicy, IndexerOptions, UnimplementedPolicy, Verbosity};
use crate::parent_map::LazyParentMap;
use crate::range::{Range, RangeResolver, SpellingMode, StmtRange};
use crate::signature::SignatureRenderer;
use crate::sink::{DeclareOutcome, GraphSink};
use crate::source::{FileId, SourceSpan, TokenScanner};

type EmitResult = Result<(), IndexerError>;

/// Per-run fact emitter.
pub struct GraphEmitter<'t> {
    tree: &'t SyntaxTree,
    options: &'t IndexerOptions,
    resolver: RangeResolver<'t>,
    renderer: &'t mut dyn SignatureRenderer,
    ids: IdentityBuilder,
    /// Parent map of the running job
    parents: Option<LazyParentMap<'t>>,
    /// Nodes this run already declared
    declared: HashSet<NodeId>,
    claims: HashMap<FileId, bool>,
    /// Functions whose bodies are being visited; calls are attributed to the
    /// innermost one
    blame: Vec<NodeId>,
    /// Type applications whose instantiation bodies are being visited
    contexts: Vec<NodeId>,
    discovered: Vec<DeclId>,
    diagnostics: Vec<Diagnostic>,
    unresolved_ranges: usize,
}

impl<'t> GraphEmitter<'t> {
    pub fn new(
        tree: &'t SyntaxTree,
        options: &'t IndexerOptions,
        scanner: &'t dyn TokenScanner,
        renderer: &'t mut dyn SignatureRenderer,
    ) -> Self {
        Self {
            tree,
            options,
            resolver: RangeResolver::new(tree, scanner),
            renderer,
            ids: IdentityBuilder::new(options.on_unimplemented),
            parents: None,
            declared: HashSet::new(),
            claims: HashMap::new(),
            blame: Vec::new(),
            contexts: Vec::new(),
            discovered: Vec::new(),
            diagnostics: Vec::new(),
            unresolved_ranges: 0,
        }
    }

    /// Declarations discovered since the last call, in discovery order.
    pub fn take_discovered(&mut self) -> Vec<DeclId> {
        std::mem::take(&mut self.discovered)
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        let mut diagnostics = self.ids.take_diagnostics();
        diagnostics.append(&mut self.diagnostics);
        diagnostics
    }

    /// Spans that could not be placed in a file and became implicit ranges.
    pub fn unresolved_ranges(&self) -> usize {
        self.unresolved_ranges
    }

    // ------------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------------

    /// Visit `decl` and everything under it.
    pub fn run_decl_job(&mut self, decl: DeclId, sink: &mut dyn GraphSink) -> EmitResult {
        debug!(decl = decl.0, kind = self.tree.decl(decl).kind.as_str(), "decl job");
        self.parents = Some(LazyParentMap::new(self.tree, decl));
        self.blame.clear();
        self.contexts.clear();
        let result = self.visit_decl(decl, sink);
        self.flush_structural(sink);
        self.parents = None;
        result
    }

    /// Emit the file node and the unattached comments of `file`.
    pub fn run_file_job(&mut self, file: FileId, sink: &mut dyn GraphSink) -> EmitResult {
        let tree = self.tree;
        let Some(source) = tree.file(file) else {
            warn!(file = file.0, "file sweep for unknown file");
            return Ok(());
        };
        debug!(path = %source.path, "file job");
        let file_id = file_node(&source.path);
        self.declare(
            &file_id,
            NodeKind::File,
            &Attributes::new().with_path(source.path.clone()),
            None,
            sink,
        );

        let mut ordinal = 0;
        for comment in tree.comments.iter().filter(|c| c.attached_to.is_none()) {
            let Some(span) = self.resolver.resolve(&comment.span, SpellingMode::Expansion) else {
                continue;
            };
            if span.file != file {
                continue;
            }
            let doc = Signature::new("doc")
                .id(&file_id)
                .number(ordinal)
                .text(&comment.text)
                .finish();
            ordinal += 1;
            self.declare(
                &doc,
                NodeKind::Doc,
                &Attributes::new().with_text(comment.text.clone()),
                None,
                sink,
            );
            sink.edge(&doc, EdgeKind::Documents, &file_id, None);
            let range = Range::physical(span);
            sink.anchor(&anchor_id(tree, &range), &range, EdgeKind::Documents, &file_id);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    fn visit_decl(&mut self, decl: DeclId, sink: &mut dyn GraphSink) -> EmitResult {
        let tree = self.tree;
        match &tree.decl(decl).kind {
            DeclKind::TranslationUnit { decls } => {
                for child in decls {
                    self.visit_decl(*child, sink)?;
                }
                Ok(())
            }
            DeclKind::Namespace { decls } => self.visit_namespace(decl, decls, sink),
            DeclKind::Function(function) => self.visit_function(decl, function, sink),
            DeclKind::Var(var) => self.visit_variable(decl, var.ty, var.init, sink),
            DeclKind::Field(field) => self.visit_variable(decl, field.ty, field.init, sink),
            DeclKind::Param(param) => self.visit_param(decl, param.ty, param.default, sink),
            DeclKind::Record(record) => self.visit_record(decl, record, sink),
            DeclKind::Enum(e) => {
                let id = self.ids.decl_id(tree, decl)?;
                let subkind = if e.scoped { "enum_class" } else { "enum" };
                self.declare_decl(decl, &id, NodeKind::Sum, Some(subkind), sink)?;
                self.anchor_name(decl, &id, EdgeKind::DefinesBinding, sink);
                self.visit_definition(decl, &id, sink)?;
                self.emit_docs(decl, &id, sink);
                if let Some(underlying) = e.underlying {
                    self.visit_type_refs(underlying, &id, sink)?;
                }
                for enumerator in e.enumerators.iter().flatten() {
                    self.visit_decl(*enumerator, sink)?;
                }
                Ok(())
            }
            DeclKind::Enumerator(_) => {
                let id = self.ids.decl_id(tree, decl)?;
                if self.declare_decl(decl, &id, NodeKind::Constant, None, sink)? {
                    if let Some(parent) = tree.decl(decl).parent {
                        let sum = self.ids.decl_id(tree, parent)?;
                        sink.edge(&id, EdgeKind::Typed, &sum, None);
                    }
                }
                self.anchor_name(decl, &id, EdgeKind::DefinesBinding, sink);
                self.emit_docs(decl, &id, sink);
                Ok(())
            }
            DeclKind::TypeAlias(alias) => {
                let id = self.ids.decl_id(tree, decl)?;
                if self.declare_decl(decl, &id, NodeKind::TAlias, None, sink)? {
                    let target = self.ids.type_set(tree, alias.target)?;
                    sink.edge(&id, EdgeKind::Aliases, target.primary(), None);
                }
                self.anchor_name(decl, &id, EdgeKind::DefinesBinding, sink);
                self.emit_docs(decl, &id, sink);
                self.visit_type_refs(alias.target, &id, sink)
            }
            DeclKind::Template(template) => self.visit_template(decl, template, sink),
            DeclKind::TemplateTypeParam(_) => self.visit_template_param(decl, sink).map(|_| ()),
            DeclKind::Unsupported { construct } => self.unimplemented(construct, Some(decl)),
        }
    }

    fn visit_namespace(
        &mut self,
        decl: DeclId,
        decls: &[DeclId],
        sink: &mut dyn GraphSink,
    ) -> EmitResult {
        let id = self.ids.decl_id(self.tree, decl)?;
        self.declare_decl(decl, &id, NodeKind::Package, Some("namespace"), sink)?;
        self.anchor_name(decl, &id, EdgeKind::DefinesBinding, sink);
        self.emit_docs(decl, &id, sink);
        for child in decls {
            self.visit_decl(*child, sink)?;
        }
        Ok(())
    }

    fn visit_function(
        &mut self,
        decl: DeclId,
        function: &FunctionDecl,
        sink: &mut dyn GraphSink,
    ) -> EmitResult {
        let tree = self.tree;
        if is_implicit_instance(tree, decl) {
            return self.visit_instance(decl, NodeKind::Function, sink);
        }
        let id = self.ids.decl_id(tree, decl)?;
        let subkind = function_subkind(&tree.decl(decl).name);
        if self.declare_decl(decl, &id, NodeKind::Function, subkind, sink)? {
            self.emit_signature_edges(&id, function, sink)?;
            if let Some(instance) = &function.instance {
                let tapp = self.ids.type_app(tree, instance.template, &instance.args)?;
                sink.edge(&id, EdgeKind::Specializes, &tapp, None);
            }
        }
        self.anchor_name(decl, &id, EdgeKind::DefinesBinding, sink);
        self.visit_definition(decl, &id, sink)?;
        self.emit_docs(decl, &id, sink);
        self.visit_function_parts(&id, function, sink)
    }

    /// Return type, parameters, and body.
    fn visit_function_parts(
        &mut self,
        id: &NodeId,
        function: &FunctionDecl,
        sink: &mut dyn GraphSink,
    ) -> EmitResult {
        if let Some(ret) = function.return_type {
            self.visit_type_refs(ret, id, sink)?;
        }
        for param in &function.params {
            self.visit_decl(*param, sink)?;
        }
        if let Some(body) = function.body {
            self.blame.push(id.clone());
            let result = self.visit_stmt(body, sink);
            self.blame.pop();
            result?;
        }
        Ok(())
    }

    /// `typed` and ordered `param` edges of a function node.
    fn emit_signature_edges(
        &mut self,
        id: &NodeId,
        function: &FunctionDecl,
        sink: &mut dyn GraphSink,
    ) -> EmitResult {
        let tree = self.tree;
        let fn_type = self.ids.function_type(tree, function)?;
        sink.edge(id, EdgeKind::Typed, &fn_type, None);
        for (ordinal, param) in function.params.iter().enumerate() {
            let param_id = self.ids.decl_id(tree, *param)?;
            sink.edge(id, EdgeKind::Param, &param_id, Some(ordinal as u32));
        }
        Ok(())
    }

    fn visit_param(
        &mut self,
        decl: DeclId,
        ty: TypeExprId,
        default: Option<StmtId>,
        sink: &mut dyn GraphSink,
    ) -> EmitResult {
        let tree = self.tree;
        let id = self.ids.decl_id(tree, decl)?;
        if self.declare_decl(decl, &id, NodeKind::Variable, Some("parameter"), sink)?
            && self.options.verbosity == Verbosity::Full
        {
            let ty = self.ids.type_set(tree, ty)?;
            sink.edge(&id, EdgeKind::Typed, ty.primary(), None);
        }
        if !tree.decl(decl).name.is_anonymous() {
            self.anchor_name(decl, &id, EdgeKind::DefinesBinding, sink);
        }
        self.visit_type_refs(ty, &id, sink)?;
        if let Some(default) = default {
            self.visit_stmt(default, sink)?;
        }
        Ok(())
    }

    /// Variables and fields.
    fn visit_variable(
        &mut self,
        decl: DeclId,
        ty: TypeExprId,
        init: Option<StmtId>,
        sink: &mut dyn GraphSink,
    ) -> EmitResult {
        let tree = self.tree;
        let id = self.ids.decl_id(tree, decl)?;
        let local = self.is_function_local(decl);
        let subkind = match tree.decl(decl).kind {
            DeclKind::Field(_) => Some("field"),
            _ if local => Some("local"),
            _ => None,
        };
        let typed = !(local && self.options.verbosity == Verbosity::Common);
        if self.declare_decl(decl, &id, NodeKind::Variable, subkind, sink)? && typed {
            let ty = self.ids.type_set(tree, ty)?;
            sink.edge(&id, EdgeKind::Typed, ty.primary(), None);
        }
        self.anchor_name(decl, &id, EdgeKind::DefinesBinding, sink);
        if tree.decl(decl).is_definition() {
            self.emit_completions(decl, &id, sink)?;
        }
        self.emit_docs(decl, &id, sink);
        self.visit_type_refs(ty, &id, sink)?;
        if let Some(init) = init {
            self.visit_stmt(init, sink)?;
        }
        Ok(())
    }

    fn visit_record(
        &mut self,
        decl: DeclId,
        record: &RecordDecl,
        sink: &mut dyn GraphSink,
    ) -> EmitResult {
        let tree = self.tree;
        if is_implicit_instance(tree, decl) {
            return self.visit_instance(decl, NodeKind::Record, sink);
        }
        let id = self.ids.decl_id(tree, decl)?;
        if self.declare_decl(decl, &id, NodeKind::Record, Some(record.tag.as_str()), sink)? {
            if let Some(instance) = &record.instance {
                let tapp = self.ids.type_app(tree, instance.template, &instance.args)?;
                sink.edge(&id, EdgeKind::Specializes, &tapp, None);
            }
        }
        self.anchor_name(decl, &id, EdgeKind::DefinesBinding, sink);
        self.visit_definition(decl, &id, sink)?;
        self.emit_docs(decl, &id, sink);
        if tree.decl(decl).is_definition() {
            for base in &record.bases {
                let base_id = self.ids.type_set(tree, *base)?;
                sink.edge(&id, EdgeKind::Extends, base_id.primary(), None);
                self.visit_type_refs(*base, &id, sink)?;
            }
        }
        for member in record.members.iter().flatten() {
            self.visit_decl(*member, sink)?;
        }
        Ok(())
    }

    /// An implicit instantiation, visited in its own job.
    ///
    /// Anchors inside carry the instantiation's type application as their
    /// context, so the shared source text yields one anchor per
    /// instantiation.
    fn visit_instance(&mut self, decl: DeclId, kind: NodeKind, sink: &mut dyn GraphSink) -> EmitResult {
        let tree = self.tree;
        let tapp = self.ids.ref_id(tree, decl)?;
        if !sink.claim_implicit(&tapp) {
            debug!(%tapp, "instantiation already emitted elsewhere");
            return Ok(());
        }
        let id = self.ids.decl_id(tree, decl)?;
        let first = self.declare_decl(decl, &id, kind, None, sink)?;
        if first {
            sink.edge(&id, EdgeKind::Instantiates, &tapp, None);
        }

        self.contexts.push(tapp);
        let result = self.visit_instance_parts(decl, &id, first, sink);
        self.contexts.pop();
        result
    }

    fn visit_instance_parts(
        &mut self,
        decl: DeclId,
        id: &NodeId,
        first: bool,
        sink: &mut dyn GraphSink,
    ) -> EmitResult {
        let tree = self.tree;
        self.anchor_name(decl, id, EdgeKind::DefinesBinding, sink);
        match &tree.decl(decl).kind {
            DeclKind::Function(function) => {
                if first {
                    self.emit_signature_edges(id, function, sink)?;
                }
                self.visit_function_parts(id, function, sink)
            }
            DeclKind::Record(record) => {
                for member in record.members.iter().flatten() {
                    self.visit_decl(*member, sink)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn visit_template(
        &mut self,
        decl: DeclId,
        template: &TemplateDecl,
        sink: &mut dyn GraphSink,
    ) -> EmitResult {
        let tree = self.tree;
        let abs = self.ids.decl_id(tree, decl)?;
        let first = self.declare_decl(decl, &abs, NodeKind::Abs, None, sink)?;
        for (ordinal, param) in template.params.iter().enumerate() {
            let param_id = self.visit_template_param(*param, sink)?;
            if first {
                sink.edge(&abs, EdgeKind::Param, &param_id, Some(ordinal as u32));
            }
        }

        self.visit_decl(template.pattern, sink)?;
        let pattern = self.ids.decl_id(tree, template.pattern)?;
        sink.edge(&pattern, EdgeKind::ChildOf, &abs, None);
        self.emit_docs(decl, &abs, sink);

        if self.options.visits_instantiations() {
            self.discovered.extend(template.instantiations.iter().copied());
        }
        Ok(())
    }

    /// Declare a template parameter and visit its default; returns its id.
    fn visit_template_param(
        &mut self,
        decl: DeclId,
        sink: &mut dyn GraphSink,
    ) -> Result<NodeId, IndexerError> {
        let tree = self.tree;
        let id = self.ids.decl_id(tree, decl)?;
        let attributes = Attributes::new().with_label(tree.name_text(decl));
        self.declare(&id, NodeKind::AbsVar, &attributes, Some(decl), sink);
        self.anchor_name(decl, &id, EdgeKind::DefinesBinding, sink);
        if let DeclKind::TemplateTypeParam(param) = &tree.decl(decl).kind {
            if let Some(default) = param.default {
                self.visit_type_refs(default, &id, sink)?;
            }
        }
        Ok(id)
    }

    /// Defining anchor over the full extent, plus `completes` anchors on
    /// the other redeclarations.
    fn visit_definition(&mut self, decl: DeclId, id: &NodeId, sink: &mut dyn GraphSink) -> EmitResult {
        let node = self.tree.decl(decl);
        if !node.is_definition() {
            return Ok(());
        }
        if node.extent.is_valid() {
            self.anchor_span(&node.extent, id, EdgeKind::Defines, id, sink);
        }
        self.emit_completions(decl, id, sink)
    }

    fn emit_completions(&mut self, decl: DeclId, id: &NodeId, sink: &mut dyn GraphSink) -> EmitResult {
        let tree = self.tree;
        for other in tree.redecls(decl) {
            if other == decl || tree.decl(other).is_definition() {
                continue;
            }
            let other_id = self.ids.decl_id(tree, other)?;
            if other_id != *id {
                self.diagnose(
                    DiagnosticKind::InconsistentRedeclaration,
                    format!(
                        "redeclaration of '{}' does not match its definition",
                        tree.qualified_name(decl)
                    ),
                    Some(other),
                );
                continue;
            }
            self.anchor_name(other, id, EdgeKind::Completes, sink);
        }
        Ok(())
    }

    /// Declare a declaration's node the first time this run meets it, with
    /// its `childof` and `usr` edges. Returns whether this call declared it.
    fn declare_decl(
        &mut self,
        decl: DeclId,
        id: &NodeId,
        kind: NodeKind,
        subkind: Option<&str>,
        sink: &mut dyn GraphSink,
    ) -> Result<bool, IndexerError> {
        if self.declared.contains(id) {
            return Ok(false);
        }
        let tree = self.tree;
        let mut attributes = Attributes::new();
        let label_source = self.label_source(decl);
        if let Some(label) = self.renderer.render(tree, label_source) {
            attributes = attributes.with_label(label);
        }
        if let Some(subkind) = subkind {
            attributes = attributes.with_subkind(subkind);
        }
        if matches!(
            kind,
            NodeKind::Function | NodeKind::Variable | NodeKind::Record | NodeKind::Sum
        ) {
            let complete = match tree.definition(decl) {
                Some(def) => self.ids.decl_id(tree, def)? == *id,
                None => false,
            };
            attributes = attributes.with_completeness(if complete {
                Completeness::Definition
            } else {
                Completeness::Incomplete
            });
        }

        self.declare(id, kind, &attributes, Some(decl), sink);
        if let Some(context) = self.ids.context_id(tree, decl)? {
            sink.edge(id, EdgeKind::ChildOf, &context, None);
        }
        self.emit_usr(decl, id, sink);
        Ok(true)
    }

    /// Labels come from the group's definition so that every run names a
    /// node the same way. A parameter borrows its name from the matching
    /// parameter of the defining function.
    fn label_source(&self, decl: DeclId) -> DeclId {
        let tree = self.tree;
        let node = tree.decl(decl);
        if let (DeclKind::Param(_), Some(function)) = (&node.kind, node.parent) {
            let Some(def) = tree.definition(function) else {
                return decl;
            };
            return params_of(tree, function)
                .iter()
                .position(|p| *p == decl)
                .and_then(|ordinal| params_of(tree, def).get(ordinal).copied())
                .unwrap_or(decl);
        }
        tree.definition(decl).unwrap_or(decl)
    }

    /// Declare `id` once per run. Returns whether this call declared it.
    fn declare(
        &mut self,
        id: &NodeId,
        kind: NodeKind,
        attributes: &Attributes,
        decl: Option<DeclId>,
        sink: &mut dyn GraphSink,
    ) -> bool {
        if !self.declared.insert(id.clone()) {
            return false;
        }
        trace!(%id, kind = kind.as_str(), "declare");
        if sink.declare(id, kind, attributes) == DeclareOutcome::Conflict {
            self.diagnose(
                DiagnosticKind::ConflictingDeclaration,
                format!("node {id} was declared with different attributes"),
                decl,
            );
        }
        true
    }

    fn emit_usr(&mut self, decl: DeclId, id: &NodeId, sink: &mut dyn GraphSink) {
        if !self.options.emits_usrs() || !self.contexts.is_empty() {
            return;
        }
        let tree = self.tree;
        let node = tree.decl(decl);
        let eligible = !node.name.is_anonymous()
            && !matches!(
                node.kind,
                DeclKind::Param(_) | DeclKind::TemplateTypeParam(_) | DeclKind::TranslationUnit { .. }
            )
            && !self.in_ignorable_subtree(decl);
        if !eligible {
            return;
        }
        let usr = usr_string(tree, tree.definition(decl).unwrap_or(decl));
        if let Some((usr_id, usr)) = usr_node(&usr, self.options.usr_byte_size) {
            self.declare(
                &usr_id,
                NodeKind::Usr,
                &Attributes::new().with_label(usr),
                Some(decl),
                sink,
            );
            sink.edge(id, EdgeKind::Usr, &usr_id, None);
        }
    }

    /// Doc comments attached to `decl`, documenting `target`.
    fn emit_docs(&mut self, decl: DeclId, target: &NodeId, sink: &mut dyn GraphSink) {
        let tree = self.tree;
        let forward = !tree.decl(decl).is_definition();
        if forward
            && self.options.forward_decl_comments.for_dialect(tree.dialect)
                == ForwardDeclCommentPolicy::Ignore
        {
            return;
        }
        for (_, comment) in tree.comments_for(decl) {
            let doc = Signature::new("doc").id(target).text(&comment.text).finish();
            self.declare(
                &doc,
                NodeKind::Doc,
                &Attributes::new().with_text(comment.text.clone()),
                Some(decl),
                sink,
            );
            sink.edge(&doc, EdgeKind::Documents, target, None);
            self.anchor_span(&comment.span, target, EdgeKind::Documents, target, sink);
        }
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn visit_stmt(&mut self, stmt: StmtId, sink: &mut dyn GraphSink) -> EmitResult {
        let tree = self.tree;
        match &tree.stmt(stmt).kind {
            StmtKind::Compound { stmts } => self.visit_stmts(stmts, sink),
            StmtKind::Other { children } => self.visit_stmts(children, sink),
            StmtKind::DeclStmt { decls } => {
                for decl in decls {
                    self.visit_decl(*decl, sink)?;
                }
                Ok(())
            }
            StmtKind::Return { value } => match value {
                Some(value) => self.visit_stmt(*value, sink),
                None => Ok(()),
            },
            StmtKind::DeclRef { decl, name_span } => self.visit_ref(*decl, name_span, sink),
            StmtKind::Member {
                base,
                member,
                name_span,
            } => {
                self.visit_ref(*member, name_span, sink)?;
                self.visit_stmt(*base, sink)
            }
            StmtKind::Call { callee, args } => {
                if let Some(target) = self.callee_target(*callee)? {
                    self.emit_call(stmt, &target, sink)?;
                }
                self.visit_stmt(*callee, sink)?;
                self.visit_stmts(args, sink)
            }
            StmtKind::Construct { constructor, args } => {
                self.discover_instance(*constructor);
                let target = self.ids.ref_id(tree, *constructor)?;
                self.emit_call(stmt, &target, sink)?;
                self.visit_stmts(args, sink)
            }
            StmtKind::Literal { .. } => Ok(()),
            StmtKind::Unsupported { construct } => self.unimplemented(construct, None),
        }
    }

    fn visit_stmts(&mut self, stmts: &[StmtId], sink: &mut dyn GraphSink) -> EmitResult {
        for stmt in stmts {
            self.visit_stmt(*stmt, sink)?;
        }
        Ok(())
    }

    fn visit_ref(&mut self, decl: DeclId, span: &SourceSpan, sink: &mut dyn GraphSink) -> EmitResult {
        self.discover_instance(decl);
        let target = self.ids.ref_id(self.tree, decl)?;
        if span.is_valid() {
            let owner = self.blame.last().cloned().unwrap_or_else(|| target.clone());
            self.anchor_span(span, &owner, EdgeKind::Ref, &target, sink);
        }
        Ok(())
    }

    /// The node a call expression invokes, looking through wrappers the
    /// front end leaves around the callee.
    fn callee_target(&mut self, callee: StmtId) -> Result<Option<NodeId>, IndexerError> {
        let tree = self.tree;
        let mut current = callee;
        loop {
            match &tree.stmt(current).kind {
                StmtKind::DeclRef { decl, .. } | StmtKind::Member { member: decl, .. } => {
                    return self.ids.ref_id(tree, *decl).map(Some);
                }
                StmtKind::Other { children } if children.len() == 1 => current = children[0],
                _ => return Ok(None),
            }
        }
    }

    /// A `ref/call` anchor over `stmt`, blamed on the innermost function.
    fn emit_call(&mut self, stmt: StmtId, target: &NodeId, sink: &mut dyn GraphSink) -> EmitResult {
        let Some(range) = self.stmt_range(stmt)? else {
            return Ok(());
        };
        if let Some(anchor) = self.emit_anchor(range, EdgeKind::RefCall, target, sink) {
            if let Some(caller) = self.blame.last() {
                sink.edge(&anchor, EdgeKind::ChildOf, caller, None);
            }
        }
        Ok(())
    }

    fn stmt_range(&mut self, stmt: StmtId) -> Result<Option<Range>, IndexerError> {
        let tree = self.tree;
        let node = tree.stmt(stmt);
        if !node.implicit {
            if let Some(span) = self.resolver.resolve(&node.span, SpellingMode::Expansion) {
                return Ok(Some(Range::physical(span).in_context(self.contexts.last())));
            }
        }
        let owner = match &self.parents {
            Some(parents) => {
                match self
                    .resolver
                    .resolve_stmt(stmt, parents.get(), SpellingMode::Expansion)
                {
                    StmtRange::Resolved(span) => {
                        return Ok(Some(Range::physical(span).in_context(self.contexts.last())))
                    }
                    StmtRange::Implicit { owner } => owner,
                }
            }
            None => None,
        };
        self.unresolved_ranges += 1;
        let owner = match owner {
            Some(decl) => Some(self.ids.decl_id(tree, decl)?),
            None => self.blame.last().cloned(),
        };
        Ok(owner.map(Range::implicit))
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// `ref` anchors on named types spelled inside `ty`.
    fn visit_type_refs(&mut self, ty: TypeExprId, owner: &NodeId, sink: &mut dyn GraphSink) -> EmitResult {
        let tree = self.tree;
        let node = tree.type_expr(ty);
        match &node.kind {
            TypeKind::Named { decl } => {
                self.discover_instance(*decl);
                if node.span.is_valid() {
                    let target = self.ids.ref_id(tree, *decl)?;
                    self.anchor_span(&node.span, owner, EdgeKind::Ref, &target, sink);
                }
                Ok(())
            }
            TypeKind::Specialization { args, .. } => {
                if node.span.is_valid() {
                    let target = self.ids.type_set(tree, ty)?;
                    self.anchor_span(&node.span, owner, EdgeKind::Ref, target.primary(), sink);
                }
                for arg in args {
                    if let TemplateArg::Type(arg) = arg {
                        self.visit_type_refs(*arg, owner, sink)?;
                    }
                }
                Ok(())
            }
            TypeKind::Pointer { pointee: inner }
            | TypeKind::LValueReference { referent: inner }
            | TypeKind::RValueReference { referent: inner }
            | TypeKind::Qualified { inner, .. }
            | TypeKind::Array { element: inner, .. }
            | TypeKind::Paren { inner } => self.visit_type_refs(*inner, owner, sink),
            TypeKind::Function { ret, params, .. } => {
                self.visit_type_refs(*ret, owner, sink)?;
                for param in params {
                    self.visit_type_refs(*param, owner, sink)?;
                }
                Ok(())
            }
            TypeKind::Dependent {
                qualifier: Some(qualifier),
                ..
            } => self.visit_type_refs(*qualifier, owner, sink),
            TypeKind::Dependent { qualifier: None, .. }
            | TypeKind::Builtin { .. }
            | TypeKind::Auto { .. }
            | TypeKind::Unsupported { .. } => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Anchors
    // ------------------------------------------------------------------------

    /// Anchor the name of `decl`, pointing at `target`.
    fn anchor_name(
        &mut self,
        decl: DeclId,
        target: &NodeId,
        kind: EdgeKind,
        sink: &mut dyn GraphSink,
    ) -> Option<NodeId> {
        let location = self.tree.decl(decl).location;
        if !location.is_valid() {
            return None;
        }
        self.anchor_span(&location, target, kind, target, sink)
    }

    /// Resolve `span` and bind an anchor there. Unresolvable spans become
    /// implicit ranges owned by `owner`.
    fn anchor_span(
        &mut self,
        span: &SourceSpan,
        owner: &NodeId,
        kind: EdgeKind,
        target: &NodeId,
        sink: &mut dyn GraphSink,
    ) -> Option<NodeId> {
        let range = match self.resolver.resolve(span, SpellingMode::Expansion) {
            Some(resolved) => Range::physical(resolved).in_context(self.contexts.last()),
            None => {
                self.unresolved_ranges += 1;
                Range::implicit(owner.clone())
            }
        };
        self.emit_anchor(range, kind, target, sink)
    }

    fn emit_anchor(
        &mut self,
        range: Range,
        kind: EdgeKind,
        target: &NodeId,
        sink: &mut dyn GraphSink,
    ) -> Option<NodeId> {
        match &range {
            Range::Physical { span, .. } => {
                if !self.claim(span.file, sink) {
                    return None;
                }
            }
            Range::Implicit { .. } => {
                if self.options.verbosity == Verbosity::Common {
                    return None;
                }
            }
        }
        let anchor = anchor_id(self.tree, &range);
        trace!(%anchor, kind = kind.as_str(), %target, "anchor");
        sink.anchor(&anchor, &range, kind, target);
        Some(anchor)
    }

    /// Whether this run emits anchors in `file`; asks the sink once.
    fn claim(&mut self, file: FileId, sink: &mut dyn GraphSink) -> bool {
        *self.claims.entry(file).or_insert_with(|| {
            let claimed = sink.claim_file(file);
            if !claimed {
                debug!(file = file.0, "file claimed elsewhere; skipping its anchors");
            }
            claimed
        })
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Whether `decl` sits inside a function body or parameter list. The
    /// job's parent map answers for the nodes it covers.
    fn is_function_local(&self, decl: DeclId) -> bool {
        let node = AstNode::Decl(decl);
        match self.parents.as_ref().map(LazyParentMap::get) {
            Some(map) if map.parent(node).is_some() => map.is_function_local(self.tree, node),
            _ => self.tree.is_function_local(decl),
        }
    }

    /// Declarations that get no external identifier: function-local ones and
    /// anything under an implicit instantiation.
    fn in_ignorable_subtree(&self, decl: DeclId) -> bool {
        if self.is_function_local(decl) {
            return true;
        }
        match self.parents.as_ref().map(LazyParentMap::get) {
            Some(map) => map.is_under_implicit_instantiation(self.tree, AstNode::Decl(decl)),
            None => is_implicit_instance(self.tree, decl),
        }
    }

    fn discover_instance(&mut self, decl: DeclId) {
        if self.options.visits_instantiations() && is_implicit_instance(self.tree, decl) {
            self.discovered.push(decl);
        }
    }

    /// Declare structural type nodes computed since the last flush.
    fn flush_structural(&mut self, sink: &mut dyn GraphSink) {
        for node in self.ids.take_structural() {
            let attributes = Attributes::new().with_label(node.label);
            if self.declare(&node.id, node.kind, &attributes, None, sink) {
                for (ordinal, param) in node.params.iter().enumerate() {
                    sink.edge(&node.id, EdgeKind::Param, param, Some(ordinal as u32));
                }
            }
        }
    }

    fn unimplemented(&mut self, construct: &str, decl: Option<DeclId>) -> EmitResult {
        match self.options.on_unimplemented {
            UnimplementedPolicy::Abort => {
                warn!(construct, decl = ?decl, "aborting on unimplemented construct");
                Err(IndexerError::unimplemented(construct, decl))
            }
            UnimplementedPolicy::Continue => {
                self.diagnose(
                    DiagnosticKind::Unimplemented,
                    format!("skipped unimplemented construct '{construct}'"),
                    decl,
                );
                Ok(())
            }
        }
    }

    fn diagnose(&mut self, kind: DiagnosticKind, message: String, decl: Option<DeclId>) {
        warn!(?kind, decl = ?decl, "{message}");
        self.diagnostics.push(Diagnostic::new(kind, message, decl));
    }
}

fn is_implicit_instance(tree: &SyntaxTree, decl: DeclId) -> bool {
    tree.decl(decl)
        .kind
        .instance()
        .is_some_and(|i| i.kind == InstanceKind::ImplicitInstantiation)
}

fn params_of(tree: &SyntaxTree, function: DeclId) -> &[DeclId] {
    match &tree.decl(function).kind {
        DeclKind::Function(f) => &f.params,
        _ => &[],
    }
}

fn function_subkind(name: &DeclName) -> Option<&'static str> {
    match name {
        DeclName::Constructor => Some("constructor"),
        DeclName::Destructor => Some("destructor"),
        DeclName::Conversion(_) => Some("conversion"),
        DeclName::Operator(_) => Some("operator"),
        DeclName::Anonymous | DeclName::Identifier(_) => None,
    }
}
