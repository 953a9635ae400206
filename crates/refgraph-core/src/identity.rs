//! Stable node identities for declarations, types, and template arguments.
//!
//! Every identity is a [`Signature`] over structural content only: the
//! enclosing context's id, the name's equivalence class, and for functions
//! the parameter and return type ids. Arena indices never enter a
//! signature, so two runs over equivalent trees agree on every id.
//!
//! Types without a declaration (built-ins, pointers, arrays, qualified
//! types, function types) become structural nodes. The builder queues each
//! one the first time it is computed; the emitter drains the queue with
//! [`IdentityBuilder::take_structural`] and declares them.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::ast::{
    AstNode, DeclId, DeclKind, DeclName, FunctionDecl, InstanceKind, RecordTag, SyntaxTree,
    TemplateArg, TemplateDecl, TypeExprId, TypeKind,
};
use crate::error::{Diagnostic, DiagnosticKind, IndexerError};
use crate::graph::NodeKind;
use crate::ids::{external_hash, Claimability, NameEqClass, NameId, NodeId, NodeSet, Signature};
use crate::options::UnimplementedPolicy;
use crate::range::Range;
use crate::semantic_hash::semantic_hash;
use crate::signature::{type_shape, type_spelling};

/// A node synthesized while computing a type identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub label: String,
    /// Ordered `param` targets (constructor first for `tapp`)
    pub params: Vec<NodeId>,
}

/// Per-run identity memo and structural-node queue.
pub struct IdentityBuilder {
    policy: UnimplementedPolicy,
    decl_ids: HashMap<DeclId, NodeId>,
    type_ids: HashMap<TypeExprId, NodeSet>,
    /// Guards against cycles in malformed trees
    in_progress: HashSet<AstNode>,
    siblings: Option<HashMap<DeclId, u32>>,
    structural: Vec<StructuralNode>,
    structural_seen: HashSet<NodeId>,
    diagnostics: Vec<Diagnostic>,
}

impl IdentityBuilder {
    pub fn new(policy: UnimplementedPolicy) -> Self {
        Self {
            policy,
            decl_ids: HashMap::new(),
            type_ids: HashMap::new(),
            in_progress: HashSet::new(),
            siblings: None,
            structural: Vec::new(),
            structural_seen: HashSet::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Number of memoized declaration ids.
    pub fn memoized_decls(&self) -> usize {
        self.decl_ids.len()
    }

    /// Drain structural nodes computed since the last call.
    pub fn take_structural(&mut self) -> Vec<StructuralNode> {
        std::mem::take(&mut self.structural)
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    /// The id a declaration is defined under.
    ///
    /// Templates resolve to their abstraction node and implicit
    /// instantiations to an `inst` node wrapping their type application.
    pub fn decl_id(&mut self, tree: &SyntaxTree, decl: DeclId) -> Result<NodeId, IndexerError> {
        if let Some(id) = self.decl_ids.get(&decl) {
            return Ok(id.clone());
        }
        let key = AstNode::Decl(decl);
        if !self.in_progress.insert(key) {
            self.unimplemented("cyclic declaration identity", Some(decl))?;
            return Ok(Signature::new("cycle")
                .text(tree.decl(decl).kind.as_str())
                .text(&tree.qualified_name(decl))
                .finish());
        }
        let result = self.compute_decl_id(tree, decl);
        self.in_progress.remove(&key);
        let id = result?;
        self.decl_ids.insert(decl, id.clone());
        Ok(id)
    }

    /// The id references to `decl` point at.
    ///
    /// Differs from [`decl_id`](Self::decl_id) only for implicit
    /// instantiations, which are referenced through their type application.
    pub fn ref_id(&mut self, tree: &SyntaxTree, decl: DeclId) -> Result<NodeId, IndexerError> {
        match tree.decl(decl).kind.instance() {
            Some(instance) if instance.kind == InstanceKind::ImplicitInstantiation => {
                self.type_app(tree, instance.template, &instance.args)
            }
            _ => self.decl_id(tree, decl),
        }
    }

    /// Id of the nearest enclosing named context, `None` at file scope.
    pub fn context_id(
        &mut self,
        tree: &SyntaxTree,
        decl: DeclId,
    ) -> Result<Option<NodeId>, IndexerError> {
        let mut current = tree.decl(decl).parent;
        while let Some(parent) = current {
            match tree.decl(parent).kind {
                DeclKind::TranslationUnit { .. } => return Ok(None),
                // A template and its pattern share one scope.
                DeclKind::Template(_) => current = tree.decl(parent).parent,
                _ => return self.decl_id(tree, parent).map(Some),
            }
        }
        Ok(None)
    }

    fn compute_decl_id(&mut self, tree: &SyntaxTree, decl: DeclId) -> Result<NodeId, IndexerError> {
        let node = tree.decl(decl);
        let name = name_id(tree, decl);
        let sig = match &node.kind {
            DeclKind::TranslationUnit { .. } => Signature::new("tu"),
            DeclKind::Namespace { .. } => {
                let ctx = self.context_id(tree, decl)?;
                let sig = Signature::new("package").opt_id(ctx.as_ref());
                if node.name.is_anonymous() {
                    sig.text("anon")
                } else {
                    name.sign(sig)
                }
            }
            DeclKind::Function(function) => return self.function_id(tree, decl, function),
            DeclKind::Var(_) => {
                let first = tree.first_redecl(decl);
                if first != decl {
                    return self.decl_id(tree, first);
                }
                let ctx = self.context_id(tree, decl)?;
                let index = self.sibling_index(tree, decl);
                name.sign(Signature::new("var").opt_id(ctx.as_ref()))
                    .number(index.into())
            }
            DeclKind::Param(_) => {
                let owner = node.parent.filter(|p| {
                    matches!(tree.decl(*p).kind, DeclKind::Function(_))
                });
                match owner {
                    Some(function) => {
                        let ordinal = param_ordinal(tree, function, decl);
                        let function_id = self.decl_id(tree, function)?;
                        Signature::new("param").id(&function_id).number(ordinal.into())
                    }
                    None => {
                        let ctx = self.context_id(tree, decl)?;
                        name.sign(Signature::new("param").opt_id(ctx.as_ref()))
                    }
                }
            }
            DeclKind::Field(_) => {
                let ctx = self.context_id(tree, decl)?;
                let sig = name.sign(Signature::new("field").opt_id(ctx.as_ref()));
                if node.name.is_anonymous() {
                    sig.number(self.sibling_index(tree, decl).into())
                } else {
                    sig
                }
            }
            DeclKind::Record(record) => {
                if let Some(instance) = &record.instance {
                    let tapp = self.type_app(tree, instance.template, &instance.args)?;
                    match instance.kind {
                        InstanceKind::ImplicitInstantiation => Signature::new("inst").id(&tapp),
                        InstanceKind::ExplicitSpecialization => {
                            let ctx = self.context_id(tree, decl)?;
                            name.sign(Signature::new("spec"))
                                .opt_id(ctx.as_ref())
                                .id(&tapp)
                        }
                    }
                } else {
                    self.scoped_type_sig(tree, decl, "record")?
                }
            }
            DeclKind::Enum(_) => self.scoped_type_sig(tree, decl, "sum")?,
            DeclKind::Enumerator(_) => {
                let ctx = self.context_id(tree, decl)?;
                name.sign(Signature::new("constant").opt_id(ctx.as_ref()))
            }
            DeclKind::TypeAlias(_) => {
                let ctx = self.context_id(tree, decl)?;
                name.sign(Signature::new("talias").opt_id(ctx.as_ref()))
            }
            DeclKind::Template(template) => {
                let pattern = self.decl_id(tree, template.pattern)?;
                Signature::new("abs").id(&pattern)
            }
            DeclKind::TemplateTypeParam(_) => self.template_param_sig(tree, decl)?,
            DeclKind::Unsupported { construct } => {
                self.unimplemented(construct, Some(decl))?;
                let ctx = self.context_id(tree, decl)?;
                let index = self.sibling_index(tree, decl);
                name.sign(Signature::new("unsupported").opt_id(ctx.as_ref()).text(construct))
                    .number(index.into())
            }
        };
        Ok(sig.finish())
    }

    fn function_id(
        &mut self,
        tree: &SyntaxTree,
        decl: DeclId,
        function: &FunctionDecl,
    ) -> Result<NodeId, IndexerError> {
        let name = name_id(tree, decl);
        let sig = match &function.instance {
            Some(instance) => {
                let tapp = self.type_app(tree, instance.template, &instance.args)?;
                match instance.kind {
                    InstanceKind::ImplicitInstantiation => {
                        return Ok(Signature::new("inst").id(&tapp).finish());
                    }
                    InstanceKind::ExplicitSpecialization => {
                        let ctx = self.context_id(tree, decl)?;
                        name.sign(Signature::new("spec"))
                            .opt_id(ctx.as_ref())
                            .id(&tapp)
                    }
                }
            }
            None => {
                let ctx = self.context_id(tree, decl)?;
                name.sign(Signature::new("function").opt_id(ctx.as_ref()))
            }
        };
        Ok(self.sign_function(tree, sig, function)?.finish())
    }

    /// Append the overload fingerprint: return type, parameter types,
    /// variadic flag, and canonical member qualifiers.
    fn sign_function(
        &mut self,
        tree: &SyntaxTree,
        sig: Signature,
        function: &FunctionDecl,
    ) -> Result<Signature, IndexerError> {
        let ret = match function.return_type {
            Some(ty) => Some(self.type_set(tree, ty)?.primary().clone()),
            None => None,
        };
        let mut sig = sig.opt_id(ret.as_ref()).number(function.params.len() as i128);
        for param in &function.params {
            sig = match &tree.decl(*param).kind {
                DeclKind::Param(p) => sig.id(self.type_set(tree, p.ty)?.primary()),
                _ => sig.text("?"),
            };
        }
        sig = sig.number(i128::from(function.variadic));
        let mut qualifiers = function.qualifiers.clone();
        qualifiers.sort();
        qualifiers.dedup();
        for qualifier in qualifiers {
            sig = sig.text(qualifier.as_str());
        }
        Ok(sig)
    }

    /// Records and enums: named ones by scope and name, anonymous ones by
    /// scope, sibling index, and content hash.
    fn scoped_type_sig(
        &mut self,
        tree: &SyntaxTree,
        decl: DeclId,
        tag: &str,
    ) -> Result<Signature, IndexerError> {
        let ctx = self.context_id(tree, decl)?;
        let sig = Signature::new(tag).opt_id(ctx.as_ref());
        if tree.decl(decl).name.is_anonymous() {
            let first = tree.first_redecl(decl);
            let index = self.sibling_index(tree, first);
            Ok(sig
                .text("anon")
                .number(index.into())
                .number(semantic_hash(tree, decl).into()))
        } else {
            Ok(name_id(tree, decl).sign(sig))
        }
    }

    /// Template parameters are keyed by their template's scope, name, arity,
    /// and pattern shape plus their own position. The template's own id
    /// depends on its pattern's parameter types, so it cannot be used here;
    /// the shape spells those types with parameters by position instead,
    /// which keeps overloaded function templates apart.
    fn template_param_sig(
        &mut self,
        tree: &SyntaxTree,
        decl: DeclId,
    ) -> Result<Signature, IndexerError> {
        let owner = tree.decl(decl).parent.and_then(|p| match &tree.decl(p).kind {
            DeclKind::Template(template) => Some((p, template)),
            _ => None,
        });
        let Some((template_decl, template)) = owner else {
            let ctx = self.context_id(tree, decl)?;
            return Ok(name_id(tree, decl).sign(Signature::new("absvar").opt_id(ctx.as_ref())));
        };
        let ordinal = template
            .params
            .iter()
            .position(|p| *p == decl)
            .unwrap_or_default();
        let ctx = self.context_id(tree, template_decl)?;
        Ok(name_id(tree, template_decl)
            .sign(Signature::new("absvar").opt_id(ctx.as_ref()))
            .number(template.params.len() as i128)
            .text(&pattern_shape(tree, template))
            .number(ordinal as i128))
    }

    // ------------------------------------------------------------------------
    // Template applications
    // ------------------------------------------------------------------------

    /// The `tapp` node applying `template`'s abstraction to `args`.
    pub fn type_app(
        &mut self,
        tree: &SyntaxTree,
        template: DeclId,
        args: &[TemplateArg],
    ) -> Result<NodeId, IndexerError> {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(self.decl_id(tree, template)?);
        for arg in args {
            params.push(self.template_arg_id(tree, arg)?);
        }
        let id = apply(&params);
        let spelled: Vec<String> = args.iter().map(|arg| arg_spelling(tree, arg)).collect();
        let label = format!("{}<{}>", tree.qualified_name(template), spelled.join(", "));
        self.push_structural(id.clone(), NodeKind::TApp, label, params);
        Ok(id)
    }

    pub fn template_arg_id(
        &mut self,
        tree: &SyntaxTree,
        arg: &TemplateArg,
    ) -> Result<NodeId, IndexerError> {
        match arg {
            TemplateArg::Type(ty) => Ok(self.type_set(tree, *ty)?.primary().clone()),
            TemplateArg::Integral(value) => Ok(self.constant(i128::from(*value))),
            TemplateArg::Template(decl) => self.ref_id(tree, *decl),
        }
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// Resolve a written type to its node set.
    pub fn type_set(&mut self, tree: &SyntaxTree, ty: TypeExprId) -> Result<NodeSet, IndexerError> {
        if let Some(set) = self.type_ids.get(&ty) {
            return Ok(set.clone());
        }
        let key = AstNode::Type(ty);
        if !self.in_progress.insert(key) {
            self.unimplemented("cyclic type", None)?;
            return Ok(NodeSet::claimable(self.builtin("<cycle>")));
        }
        let result = self.compute_type_set(tree, ty);
        self.in_progress.remove(&key);
        let set = result?;
        self.type_ids.insert(ty, set.clone());
        Ok(set)
    }

    fn compute_type_set(&mut self, tree: &SyntaxTree, ty: TypeExprId) -> Result<NodeSet, IndexerError> {
        let set = match &tree.type_expr(ty).kind {
            TypeKind::Builtin { name } => NodeSet::claimable(self.builtin(name)),
            TypeKind::Named { decl } => NodeSet::unclaimable(self.ref_id(tree, *decl)?),
            TypeKind::Pointer { pointee } => self.wrap_one(tree, ty, "ptr", *pointee)?,
            TypeKind::LValueReference { referent } => self.wrap_one(tree, ty, "lvr", *referent)?,
            TypeKind::RValueReference { referent } => self.wrap_one(tree, ty, "rvr", *referent)?,
            TypeKind::Qualified { qualifiers, inner } => {
                let inner_set = self.type_set(tree, *inner)?;
                let mut qualifiers = qualifiers.clone();
                qualifiers.sort();
                qualifiers.dedup();
                if qualifiers.is_empty() {
                    return Ok(inner_set);
                }
                let mut current = inner_set.primary().clone();
                let mut label = type_spelling(tree, *inner);
                for qualifier in qualifiers {
                    label = format!("{} {label}", qualifier.as_str());
                    current = self.app(qualifier.as_str(), vec![current], label.clone());
                }
                NodeSet::wrap(current, Claimability::Claimable, inner_set)
            }
            TypeKind::Array { element, size } => {
                let element = self.type_set(tree, *element)?.primary().clone();
                let label = type_spelling(tree, ty);
                let id = match size {
                    Some(size) => {
                        let size = self.constant(i128::from(*size));
                        self.app("carr", vec![element, size], label)
                    }
                    None => self.app("iarr", vec![element], label),
                };
                NodeSet::claimable(id)
            }
            TypeKind::Function {
                ret,
                params,
                variadic,
            } => {
                let mut args = vec![self.type_set(tree, *ret)?.primary().clone()];
                for param in params {
                    args.push(self.type_set(tree, *param)?.primary().clone());
                }
                let ctor = if *variadic { "fnvararg" } else { "fn" };
                NodeSet::claimable(self.app(ctor, args, type_spelling(tree, ty)))
            }
            TypeKind::Specialization { template, args } => {
                NodeSet::claimable(self.type_app(tree, *template, args)?)
            }
            TypeKind::Dependent { qualifier, name } => {
                let qualifier = match qualifier {
                    Some(q) => Some(self.type_set(tree, *q)?.primary().clone()),
                    None => None,
                };
                let id = Signature::new("lookup")
                    .opt_id(qualifier.as_ref())
                    .text(name)
                    .finish();
                self.push_structural(id.clone(), NodeKind::Lookup, name.clone(), Vec::new());
                NodeSet::claimable(id)
            }
            TypeKind::Auto { deduced } => match deduced {
                Some(deduced) => self.type_set(tree, *deduced)?,
                None => NodeSet::claimable(self.builtin("auto")),
            },
            TypeKind::Paren { inner } => self.type_set(tree, *inner)?,
            TypeKind::Unsupported { construct } => {
                self.unimplemented(construct, None)?;
                NodeSet::claimable(self.builtin(&format!("<{construct}>")))
            }
        };
        Ok(set)
    }

    /// The function type (`fn` or `fnvararg` over return and parameter
    /// types) a function declaration is typed as.
    pub fn function_type(
        &mut self,
        tree: &SyntaxTree,
        function: &FunctionDecl,
    ) -> Result<NodeId, IndexerError> {
        let (ret, ret_label) = match function.return_type {
            Some(ty) => (self.type_set(tree, ty)?.primary().clone(), type_spelling(tree, ty)),
            None => (self.builtin("void"), "void".to_string()),
        };
        let mut args = vec![ret];
        let mut spelled = Vec::with_capacity(function.params.len());
        for param in &function.params {
            if let DeclKind::Param(p) = &tree.decl(*param).kind {
                args.push(self.type_set(tree, p.ty)?.primary().clone());
                spelled.push(type_spelling(tree, p.ty));
            }
        }
        if function.variadic {
            spelled.push("...".to_string());
        }
        let ctor = if function.variadic { "fnvararg" } else { "fn" };
        let label = format!("{ret_label}({})", spelled.join(", "));
        Ok(self.app(ctor, args, label))
    }

    fn wrap_one(
        &mut self,
        tree: &SyntaxTree,
        ty: TypeExprId,
        ctor: &str,
        inner: TypeExprId,
    ) -> Result<NodeSet, IndexerError> {
        let inner = self.type_set(tree, inner)?.primary().clone();
        Ok(NodeSet::claimable(self.app(ctor, vec![inner], type_spelling(tree, ty))))
    }

    /// A `tbuiltin` node.
    pub fn builtin(&mut self, name: &str) -> NodeId {
        let id = Signature::new("tbuiltin").text(name).finish();
        self.push_structural(id.clone(), NodeKind::TBuiltin, name.to_string(), Vec::new());
        id
    }

    /// A `constant` node for an integral value.
    pub fn constant(&mut self, value: i128) -> NodeId {
        let id = Signature::new("constant").number(value).finish();
        self.push_structural(id.clone(), NodeKind::Constant, value.to_string(), Vec::new());
        id
    }

    /// Apply the builtin constructor `ctor` to `args`.
    fn app(&mut self, ctor: &str, args: Vec<NodeId>, label: String) -> NodeId {
        let mut params = Vec::with_capacity(args.len() + 1);
        params.push(self.builtin(ctor));
        params.extend(args);
        let id = apply(&params);
        self.push_structural(id.clone(), NodeKind::TApp, label, params);
        id
    }

    fn push_structural(&mut self, id: NodeId, kind: NodeKind, label: String, params: Vec<NodeId>) {
        if self.structural_seen.insert(id.clone()) {
            self.structural.push(StructuralNode {
                id,
                kind,
                label,
                params,
            });
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn unimplemented(&mut self, construct: &str, decl: Option<DeclId>) -> Result<(), IndexerError> {
        match self.policy {
            UnimplementedPolicy::Abort => Err(IndexerError::unimplemented(construct, decl)),
            UnimplementedPolicy::Continue => {
                warn!(construct, decl = ?decl, "no identity rule; using a coarse id");
                self.diagnostics.push(Diagnostic::new(
                    DiagnosticKind::Unimplemented,
                    format!("coarse identity for '{construct}'"),
                    decl,
                ));
                Ok(())
            }
        }
    }

    fn sibling_index(&mut self, tree: &SyntaxTree, decl: DeclId) -> u32 {
        self.siblings
            .get_or_insert_with(|| index_siblings(tree))
            .get(&decl)
            .copied()
            .unwrap_or_default()
    }
}

/// `tapp` over ordered parameters.
fn apply(params: &[NodeId]) -> NodeId {
    params
        .iter()
        .fold(Signature::new("tapp"), |sig, p| sig.id(p))
        .finish()
}

/// Position of each first declaration among same-named, same-kind siblings.
fn index_siblings(tree: &SyntaxTree) -> HashMap<DeclId, u32> {
    let mut counters: HashMap<(Option<DeclId>, &'static str, String), u32> = HashMap::new();
    let mut indices = HashMap::new();
    for (index, decl) in tree.decls.iter().enumerate() {
        if decl.previous.is_some() {
            continue;
        }
        let id = DeclId(index as u32);
        let key = (decl.parent, decl.kind.as_str(), tree.name_text(id));
        let slot = counters.entry(key).or_default();
        indices.insert(id, *slot);
        *slot += 1;
    }
    indices
}

fn param_ordinal(tree: &SyntaxTree, function: DeclId, param: DeclId) -> u32 {
    match &tree.decl(function).kind {
        DeclKind::Function(f) => f
            .params
            .iter()
            .position(|p| *p == param)
            .map_or(0, |i| i as u32),
        _ => 0,
    }
}

/// `ret(params...) qualifiers` of a function pattern with the template's
/// parameters spelled by position; empty for other patterns.
fn pattern_shape(tree: &SyntaxTree, template: &TemplateDecl) -> String {
    let DeclKind::Function(function) = &tree.decl(template.pattern).kind else {
        return String::new();
    };
    let shape = |ty: TypeExprId| type_shape(tree, ty, &template.params);
    let mut params: Vec<String> = function
        .params
        .iter()
        .map(|p| match &tree.decl(*p).kind {
            DeclKind::Param(param) => shape(param.ty),
            _ => "?".to_string(),
        })
        .collect();
    if function.variadic {
        params.push("...".to_string());
    }
    let mut qualifiers: Vec<&str> = function.qualifiers.iter().map(|q| q.as_str()).collect();
    qualifiers.sort_unstable();
    qualifiers.dedup();
    format!(
        "{}({}){}",
        function.return_type.map(shape).unwrap_or_default(),
        params.join(","),
        qualifiers.concat()
    )
}

fn arg_spelling(tree: &SyntaxTree, arg: &TemplateArg) -> String {
    match arg {
        TemplateArg::Type(ty) => type_spelling(tree, *ty),
        TemplateArg::Integral(value) => value.to_string(),
        TemplateArg::Template(decl) => tree.qualified_name(*decl),
    }
}

/// Reduce a declaration's name to its equivalence class.
pub fn name_id(tree: &SyntaxTree, decl: DeclId) -> NameId {
    match &tree.decl(decl).name {
        DeclName::Anonymous => NameId::new(NameEqClass::Anonymous, ""),
        DeclName::Identifier(name) => NameId::new(NameEqClass::Plain, name.as_str()),
        DeclName::Constructor => NameId::new(NameEqClass::Constructor, ""),
        DeclName::Destructor => NameId::new(NameEqClass::Destructor, ""),
        DeclName::Conversion(_) => NameId::new(NameEqClass::Conversion, ""),
        DeclName::Operator(op) => NameId::new(NameEqClass::Operator, op.as_str()),
    }
}

/// The `usr` node for a USR string, and its hashed external spelling.
pub fn usr_node(usr: &str, byte_size: u8) -> Option<(NodeId, String)> {
    let hashed = external_hash(usr, byte_size)?;
    let id = Signature::new("usr").text(&hashed).finish();
    Some((id, hashed))
}

/// Clang-style USR of `decl`: one `@`-tagged component per enclosing
/// context, e.g. `c:@N@io@F@write#int#const char*#const`.
///
/// Template parameters inside a function template's signature are spelled
/// by position, so renaming them keeps the USR.
pub fn usr_string(tree: &SyntaxTree, decl: DeclId) -> String {
    let mut parts = Vec::new();
    let mut current = Some(decl);
    while let Some(id) = current {
        if let Some(part) = usr_component(tree, id) {
            parts.push(part);
        }
        current = tree.decl(id).parent;
    }
    parts.reverse();
    format!("c:{}", parts.concat())
}

/// The template whose pattern is `decl`: either its parent or a sibling,
/// depending on how the front end parents patterns.
fn templated_by(tree: &SyntaxTree, decl: DeclId) -> Option<&TemplateDecl> {
    let parent = tree.decl(decl).parent?;
    let as_template = |id: DeclId| match &tree.decl(id).kind {
        DeclKind::Template(t) if t.pattern == decl => Some(t),
        _ => None,
    };
    as_template(parent).or_else(|| {
        tree.decl_children(tree.decl(parent))
            .into_iter()
            .find_map(|child| match child {
                AstNode::Decl(id) if id != decl => as_template(id),
                _ => None,
            })
    })
}

fn usr_component(tree: &SyntaxTree, decl: DeclId) -> Option<String> {
    let node = tree.decl(decl);
    let name = tree.name_text(decl);
    let anonymous = node.name.is_anonymous();
    let template = templated_by(tree, decl);

    let mut part = match &node.kind {
        DeclKind::TranslationUnit { .. } | DeclKind::Template(_) => return None,
        DeclKind::Namespace { .. } if anonymous => "@aN".to_string(),
        DeclKind::Namespace { .. } => format!("@N@{name}"),
        DeclKind::Record(record) => {
            let tag = match (record.tag, template) {
                (_, Some(t)) => format!("@ST>{}", t.params.len()),
                (RecordTag::Union, None) => "@U".to_string(),
                (_, None) => "@S".to_string(),
            };
            if anonymous {
                format!("{tag}a")
            } else {
                format!("{tag}@{name}")
            }
        }
        DeclKind::Enum(_) if anonymous => "@Ea".to_string(),
        DeclKind::Enum(_) => format!("@E@{name}"),
        DeclKind::Field(_) => format!("@FI@{name}"),
        DeclKind::TypeAlias(_) => format!("@T@{name}"),
        DeclKind::Enumerator(_)
        | DeclKind::Var(_)
        | DeclKind::Param(_)
        | DeclKind::TemplateTypeParam(_) => format!("@{name}"),
        DeclKind::Function(function) => {
            let params: &[DeclId] = template.map(|t| t.params.as_slice()).unwrap_or_default();
            let mut part = match template {
                Some(t) => format!("@FT@>{}@{name}", t.params.len()),
                None => format!("@F@{name}"),
            };
            for param in &function.params {
                part.push('#');
                if let DeclKind::Param(p) = &tree.decl(*param).kind {
                    part.push_str(&type_shape(tree, p.ty, params));
                }
            }
            if function.variadic {
                part.push_str("#...");
            }
            let mut qualifiers: Vec<&str> = function.qualifiers.iter().map(|q| q.as_str()).collect();
            qualifiers.sort_unstable();
            qualifiers.dedup();
            for qualifier in qualifiers {
                part.push('#');
                part.push_str(qualifier);
            }
            part
        }
        DeclKind::Unsupported { construct } => format!("@{construct}@{name}"),
    };

    if let Some(instance) = node.kind.instance() {
        let args: Vec<String> = instance.args.iter().map(|a| arg_spelling(tree, a)).collect();
        part.push('>');
        part.push_str(&args.join("#"));
    }
    Some(part)
}

/// The `file` node for a path.
pub fn file_node(path: &str) -> NodeId {
    Signature::new("file").text(path).finish()
}

/// Identity of the anchor for `range`.
///
/// Physical anchors are keyed by file path and offsets (never the run-local
/// file index) plus the instantiation context; implicit anchors by owner.
pub fn anchor_id(tree: &SyntaxTree, range: &Range) -> NodeId {
    match range {
        Range::Physical { span, context } => {
            let path = tree.file(span.file).map_or("", |f| f.path.as_str());
            Signature::new("anchor")
                .text(path)
                .number(span.begin.into())
                .number(span.end.into())
                .opt_id(context.as_ref())
                .finish()
        }
        Range::Implicit { owner } => Signature::new("anchor").text("implicit").id(owner).finish(),
    }
}
