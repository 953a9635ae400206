//! Arena-based syntax tree consumed by the indexer.
//!
//! The front end resolves names, types, and template arguments before the
//! tree reaches this crate; nothing here parses source text. Declarations,
//! type expressions, and statements live in flat arenas and refer to each
//! other by index, so cyclic references (a record naming itself through a
//! template instantiation, a redeclaration chain) never form ownership cycles.
//!
//! Every node kind is a closed enum; the indexer dispatches over them with
//! exhaustive `match`es.

use crate::error::IndexerError;
use crate::source::{MacroExpansion, SourceFile, SourceLoc, SourceSpan};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(
    /// Index into [`SyntaxTree::decls`].
    DeclId
);
arena_id!(
    /// Index into [`SyntaxTree::types`].
    TypeExprId
);
arena_id!(
    /// Index into [`SyntaxTree::stmts`].
    StmtId
);

/// Visit state of a node during a cycle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unseen,
    Open,
    Done,
}

/// Any node the parent map can index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AstNode {
    Decl(DeclId),
    Type(TypeExprId),
    Stmt(StmtId),
}

/// Source language of the translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    C,
    #[default]
    Cpp,
    ObjC,
    ObjCpp,
}

impl Dialect {
    pub fn is_objc(self) -> bool {
        matches!(self, Dialect::ObjC | Dialect::ObjCpp)
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// The name a declaration is introduced with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclName {
    #[default]
    Anonymous,
    Identifier(String),
    Constructor,
    Destructor,
    /// Conversion operator to the given type
    Conversion(TypeExprId),
    /// Overloaded operator, spelled without the `operator` keyword (`+`, `[]`)
    Operator(String),
}

impl DeclName {
    pub fn ident(name: impl Into<String>) -> Self {
        DeclName::Identifier(name.into())
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, DeclName::Anonymous)
    }

    /// The identifier, if this is a plain identifier.
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            DeclName::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

/// CV and restrict qualifiers, on types and on member functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Qualifier {
    Const,
    Volatile,
    Restrict,
}

impl Qualifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Qualifier::Const => "const",
            Qualifier::Volatile => "volatile",
            Qualifier::Restrict => "restrict",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordTag {
    Struct,
    Class,
    Union,
}

impl RecordTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordTag::Struct => "struct",
            RecordTag::Class => "class",
            RecordTag::Union => "union",
        }
    }
}

/// One argument of a template instance or specialization type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateArg {
    Type(TypeExprId),
    Integral(i64),
    Template(DeclId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    /// Produced by the compiler from the primary template
    ImplicitInstantiation,
    /// Written by the user (`template<> struct S<int> { ... }`)
    ExplicitSpecialization,
}

/// Links a declaration to the template it instantiates or specializes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInstance {
    /// The `Template` declaration
    pub template: DeclId,
    pub args: Vec<TemplateArg>,
    pub kind: InstanceKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FunctionDecl {
    #[serde(default)]
    pub params: Vec<DeclId>,
    #[serde(default)]
    pub return_type: Option<TypeExprId>,
    /// Present only on the defining declaration
    #[serde(default)]
    pub body: Option<StmtId>,
    /// Member function qualifiers (`void f() const`)
    #[serde(default)]
    pub qualifiers: Vec<Qualifier>,
    #[serde(default)]
    pub variadic: bool,
    #[serde(default)]
    pub instance: Option<TemplateInstance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarDecl {
    pub ty: TypeExprId,
    #[serde(default)]
    pub init: Option<StmtId>,
    #[serde(default)]
    pub is_extern: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamDecl {
    pub ty: TypeExprId,
    #[serde(default)]
    pub default: Option<StmtId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub ty: TypeExprId,
    #[serde(default)]
    pub init: Option<StmtId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub tag: RecordTag,
    /// `None` for a forward declaration
    #[serde(default)]
    pub members: Option<Vec<DeclId>>,
    #[serde(default)]
    pub bases: Vec<TypeExprId>,
    #[serde(default)]
    pub instance: Option<TemplateInstance>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnumDecl {
    #[serde(default)]
    pub underlying: Option<TypeExprId>,
    /// `None` for an opaque declaration
    #[serde(default)]
    pub enumerators: Option<Vec<DeclId>>,
    #[serde(default)]
    pub scoped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EnumeratorDecl {
    #[serde(default)]
    pub value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAliasDecl {
    pub target: TypeExprId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateDecl {
    #[serde(default)]
    pub params: Vec<DeclId>,
    /// The templated function or record
    pub pattern: DeclId,
    /// Implicit instantiations the front end materialized, in the order it
    /// produced them
    #[serde(default)]
    pub instantiations: Vec<DeclId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemplateTypeParamDecl {
    #[serde(default)]
    pub default: Option<TypeExprId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeclKind {
    TranslationUnit {
        #[serde(default)]
        decls: Vec<DeclId>,
    },
    Namespace {
        #[serde(default)]
        decls: Vec<DeclId>,
    },
    Function(FunctionDecl),
    Var(VarDecl),
    Param(ParamDecl),
    Field(FieldDecl),
    Record(RecordDecl),
    Enum(EnumDecl),
    Enumerator(EnumeratorDecl),
    TypeAlias(TypeAliasDecl),
    Template(TemplateDecl),
    TemplateTypeParam(TemplateTypeParamDecl),
    /// A construct the front end surfaced but this indexer has no rule for
    Unsupported { construct: String },
}

impl DeclKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclKind::TranslationUnit { .. } => "translation_unit",
            DeclKind::Namespace { .. } => "namespace",
            DeclKind::Function(_) => "function",
            DeclKind::Var(_) => "var",
            DeclKind::Param(_) => "param",
            DeclKind::Field(_) => "field",
            DeclKind::Record(_) => "record",
            DeclKind::Enum(_) => "enum",
            DeclKind::Enumerator(_) => "enumerator",
            DeclKind::TypeAlias(_) => "type_alias",
            DeclKind::Template(_) => "template",
            DeclKind::TemplateTypeParam(_) => "template_type_param",
            DeclKind::Unsupported { .. } => "unsupported",
        }
    }

    /// The template instance this declaration was produced from, if any.
    pub fn instance(&self) -> Option<&TemplateInstance> {
        match self {
            DeclKind::Function(f) => f.instance.as_ref(),
            DeclKind::Record(r) => r.instance.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decl {
    #[serde(flatten)]
    pub kind: DeclKind,
    #[serde(default)]
    pub name: DeclName,
    /// Semantic parent (enclosing declaration context)
    #[serde(default)]
    pub parent: Option<DeclId>,
    /// Span of the declared name
    #[serde(default)]
    pub location: SourceSpan,
    /// Span of the whole declaration
    #[serde(default)]
    pub extent: SourceSpan,
    /// Synthesized by the compiler
    #[serde(default)]
    pub implicit: bool,
    /// Previous declaration of the same entity
    #[serde(default)]
    pub previous: Option<DeclId>,
}

impl Decl {
    pub fn new(name: DeclName, kind: DeclKind) -> Self {
        Self {
            kind,
            name,
            parent: None,
            location: SourceSpan::invalid(),
            extent: SourceSpan::invalid(),
            implicit: false,
            previous: None,
        }
    }

    pub fn at(mut self, location: SourceSpan) -> Self {
        self.location = location;
        if !self.extent.is_valid() {
            self.extent = location;
        }
        self
    }

    pub fn with_extent(mut self, extent: SourceSpan) -> Self {
        self.extent = extent;
        self
    }

    pub fn redeclares(mut self, previous: DeclId) -> Self {
        self.previous = Some(previous);
        self
    }

    pub fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }

    /// Whether this declaration is the defining one of its redeclaration group.
    pub fn is_definition(&self) -> bool {
        match &self.kind {
            DeclKind::Function(f) => f.body.is_some(),
            DeclKind::Var(v) => !v.is_extern,
            DeclKind::Record(r) => r.members.is_some(),
            DeclKind::Enum(e) => e.enumerators.is_some(),
            _ => true,
        }
    }
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    Builtin {
        name: String,
    },
    /// Reference to a declared record, enum, alias, or template parameter
    Named {
        decl: DeclId,
    },
    Pointer {
        pointee: TypeExprId,
    },
    LValueReference {
        referent: TypeExprId,
    },
    RValueReference {
        referent: TypeExprId,
    },
    Qualified {
        qualifiers: Vec<Qualifier>,
        inner: TypeExprId,
    },
    Array {
        element: TypeExprId,
        #[serde(default)]
        size: Option<u64>,
    },
    Function {
        #[serde(rename = "return")]
        ret: TypeExprId,
        #[serde(default)]
        params: Vec<TypeExprId>,
        #[serde(default)]
        variadic: bool,
    },
    /// A template named with arguments (`vector<int>`)
    Specialization {
        template: DeclId,
        args: Vec<TemplateArg>,
    },
    /// A name that cannot be resolved until instantiation (`typename T::type`)
    Dependent {
        #[serde(default)]
        qualifier: Option<TypeExprId>,
        name: String,
    },
    Auto {
        #[serde(default)]
        deduced: Option<TypeExprId>,
    },
    Paren {
        inner: TypeExprId,
    },
    Unsupported {
        construct: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeExpr {
    #[serde(flatten)]
    pub kind: TypeKind,
    /// Spelling of the type in source; invalid when the type was not written
    #[serde(default)]
    pub span: SourceSpan,
}

impl TypeExpr {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            span: SourceSpan::invalid(),
        }
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = span;
        self
    }
}

// ============================================================================
// Statements and expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StmtKind {
    Compound {
        #[serde(default)]
        stmts: Vec<StmtId>,
    },
    /// Local declarations
    DeclStmt {
        decls: Vec<DeclId>,
    },
    Return {
        #[serde(default)]
        value: Option<StmtId>,
    },
    DeclRef {
        decl: DeclId,
        #[serde(default)]
        name_span: SourceSpan,
    },
    Member {
        base: StmtId,
        member: DeclId,
        #[serde(default)]
        name_span: SourceSpan,
    },
    Call {
        callee: StmtId,
        #[serde(default)]
        args: Vec<StmtId>,
    },
    /// Constructor invocation, often implicit
    Construct {
        constructor: DeclId,
        #[serde(default)]
        args: Vec<StmtId>,
    },
    Literal {
        text: String,
    },
    /// Any other construct; only its children matter to the indexer
    Other {
        #[serde(default)]
        children: Vec<StmtId>,
    },
    Unsupported {
        construct: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stmt {
    #[serde(flatten)]
    pub kind: StmtKind,
    #[serde(default)]
    pub span: SourceSpan,
    #[serde(default)]
    pub implicit: bool,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self {
            kind,
            span: SourceSpan::invalid(),
            implicit: false,
        }
    }

    pub fn at(mut self, span: SourceSpan) -> Self {
        self.span = span;
        self
    }

    pub fn implicit(mut self) -> Self {
        self.implicit = true;
        self
    }
}

/// A comment as it appears in source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawComment {
    pub span: SourceSpan,
    pub text: String,
    /// Declaration this comment documents; `None` for file-level comments
    #[serde(default)]
    pub attached_to: Option<DeclId>,
}

// ============================================================================
// Syntax Tree
// ============================================================================

/// One translation unit as produced by the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntaxTree {
    #[serde(default)]
    pub dialect: Dialect,
    pub files: Vec<SourceFile>,
    #[serde(default)]
    pub macros: Vec<MacroExpansion>,
    pub decls: Vec<Decl>,
    #[serde(default)]
    pub types: Vec<TypeExpr>,
    #[serde(default)]
    pub stmts: Vec<Stmt>,
    #[serde(default)]
    pub comments: Vec<RawComment>,
    /// The translation-unit declaration
    pub root: DeclId,

    /// Forward links of the redeclaration chains, built on first use
    #[serde(skip)]
    pub(crate) next_redecl: OnceCell<Vec<Option<DeclId>>>,
}

impl SyntaxTree {
    /// Parse a tree from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, IndexerError> {
        let tree: SyntaxTree = serde_json::from_str(json)?;
        tree.validate()?;
        Ok(tree)
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn type_expr(&self, id: TypeExprId) -> &TypeExpr {
        &self.types[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn file(&self, id: crate::source::FileId) -> Option<&SourceFile> {
        self.files.get(id.index())
    }

    pub fn macro_expansion(&self, id: crate::source::MacroId) -> Option<&MacroExpansion> {
        self.macros.get(id.index())
    }

    /// Declarations directly under the root, in source order.
    pub fn top_level_decls(&self) -> &[DeclId] {
        match &self.decl(self.root).kind {
            DeclKind::TranslationUnit { decls } => decls,
            _ => &[],
        }
    }

    /// Check that every arena reference is in bounds and that the tree has
    /// no cycles through children or parents.
    ///
    /// Accessors such as [`SyntaxTree::decl`] index directly and traversals
    /// recurse, so the indexer validates once before traversal.
    pub fn validate(&self) -> Result<(), IndexerError> {
        self.check_decl(self.root)?;
        if !matches!(self.decl(self.root).kind, DeclKind::TranslationUnit { .. }) {
            return Err(IndexerError::InvalidTree(
                "root is not a translation unit".to_string(),
            ));
        }

        for decl in &self.decls {
            if let Some(parent) = decl.parent {
                self.check_decl(parent)?;
            }
            if let Some(previous) = decl.previous {
                self.check_decl(previous)?;
            }
            if let DeclName::Conversion(ty) = decl.name {
                self.check_type(ty)?;
            }
            self.check_span(&decl.location)?;
            for child in self.decl_children(decl) {
                self.check_node(child)?;
            }
            if let Some(instance) = decl.kind.instance() {
                self.check_decl(instance.template)?;
                self.check_args(&instance.args)?;
            }
        }
        for ty in &self.types {
            for child in self.type_children(ty) {
                self.check_node(child)?;
            }
            match &ty.kind {
                TypeKind::Named { decl } => self.check_decl(*decl)?,
                TypeKind::Specialization { template, args } => {
                    self.check_decl(*template)?;
                    self.check_args(args)?;
                }
                _ => {}
            }
        }
        for stmt in &self.stmts {
            for child in self.stmt_children(stmt) {
                self.check_node(child)?;
            }
            match &stmt.kind {
                StmtKind::DeclRef { decl, .. } => self.check_decl(*decl)?,
                StmtKind::Member { member, .. } => self.check_decl(*member)?,
                StmtKind::Construct { constructor, .. } => self.check_decl(*constructor)?,
                _ => {}
            }
        }
        for comment in &self.comments {
            if let Some(decl) = comment.attached_to {
                self.check_decl(decl)?;
            }
            self.check_span(&comment.span)?;
        }
        self.check_parent_chains()?;
        self.check_acyclic()
    }

    /// Every `parent` chain must end at a parentless declaration.
    fn check_parent_chains(&self) -> Result<(), IndexerError> {
        let mut marks = vec![Mark::Unseen; self.decls.len()];
        for start in 0..self.decls.len() {
            let mut path = Vec::new();
            let mut current = Some(DeclId(start as u32));
            while let Some(id) = current {
                match marks[id.index()] {
                    Mark::Done => break,
                    Mark::Open => {
                        return Err(IndexerError::InvalidTree(format!(
                            "parent chain of decl {} loops",
                            id.index()
                        )))
                    }
                    Mark::Unseen => {
                        marks[id.index()] = Mark::Open;
                        path.push(id);
                        current = self.decl(id).parent;
                    }
                }
            }
            for id in path {
                marks[id.index()] = Mark::Done;
            }
        }
        Ok(())
    }

    /// No node may be its own structural descendant. Shared subtrees, such
    /// as a body reused by an instantiation, are allowed.
    fn check_acyclic(&self) -> Result<(), IndexerError> {
        let roots = (0..self.decls.len())
            .map(|i| AstNode::Decl(DeclId(i as u32)))
            .chain((0..self.types.len()).map(|i| AstNode::Type(TypeExprId(i as u32))))
            .chain((0..self.stmts.len()).map(|i| AstNode::Stmt(StmtId(i as u32))));
        let mut marks: HashMap<AstNode, Mark> = HashMap::new();

        for root in roots {
            if marks.contains_key(&root) {
                continue;
            }
            marks.insert(root, Mark::Open);
            let mut stack = vec![(root, self.children(root), 0usize)];
            while let Some((node, children, next)) = stack.last_mut() {
                let Some(child) = children.get(*next).copied() else {
                    marks.insert(*node, Mark::Done);
                    stack.pop();
                    continue;
                };
                *next += 1;
                match marks.get(&child).copied() {
                    Some(Mark::Open) => {
                        return Err(IndexerError::InvalidTree(format!(
                            "{child:?} is its own descendant"
                        )))
                    }
                    Some(_) => {}
                    None => {
                        marks.insert(child, Mark::Open);
                        let grandchildren = self.children(child);
                        stack.push((child, grandchildren, 0));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_node(&self, node: AstNode) -> Result<(), IndexerError> {
        match node {
            AstNode::Decl(id) => self.check_decl(id),
            AstNode::Type(id) => self.check_type(id),
            AstNode::Stmt(id) => {
                if id.index() < self.stmts.len() {
                    Ok(())
                } else {
                    Err(IndexerError::dangling("stmt", id.index(), self.stmts.len()))
                }
            }
        }
    }

    fn check_decl(&self, id: DeclId) -> Result<(), IndexerError> {
        if id.index() < self.decls.len() {
            Ok(())
        } else {
            Err(IndexerError::dangling("decl", id.index(), self.decls.len()))
        }
    }

    fn check_type(&self, id: TypeExprId) -> Result<(), IndexerError> {
        if id.index() < self.types.len() {
            Ok(())
        } else {
            Err(IndexerError::dangling("type", id.index(), self.types.len()))
        }
    }

    fn check_args(&self, args: &[TemplateArg]) -> Result<(), IndexerError> {
        for arg in args {
            match arg {
                TemplateArg::Type(ty) => self.check_type(*ty)?,
                TemplateArg::Template(decl) => self.check_decl(*decl)?,
                TemplateArg::Integral(_) => {}
            }
        }
        Ok(())
    }

    fn check_span(&self, span: &SourceSpan) -> Result<(), IndexerError> {
        for loc in [span.begin, span.end] {
            match loc {
                SourceLoc::File { file, .. } if file.index() >= self.files.len() => {
                    return Err(IndexerError::dangling(
                        "file",
                        file.index(),
                        self.files.len(),
                    ));
                }
                SourceLoc::Macro { expansion, .. } if expansion.index() >= self.macros.len() => {
                    return Err(IndexerError::dangling(
                        "macro",
                        expansion.index(),
                        self.macros.len(),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Structure
    // ------------------------------------------------------------------------

    /// Structural children of a declaration, in traversal order.
    pub fn decl_children(&self, decl: &Decl) -> Vec<AstNode> {
        let mut out = Vec::new();
        match &decl.kind {
            DeclKind::TranslationUnit { decls } | DeclKind::Namespace { decls } => {
                out.extend(decls.iter().copied().map(AstNode::Decl));
            }
            DeclKind::Function(f) => {
                out.extend(f.params.iter().copied().map(AstNode::Decl));
                out.extend(f.return_type.map(AstNode::Type));
                out.extend(f.body.map(AstNode::Stmt));
            }
            DeclKind::Var(v) => {
                out.push(AstNode::Type(v.ty));
                out.extend(v.init.map(AstNode::Stmt));
            }
            DeclKind::Param(p) => {
                out.push(AstNode::Type(p.ty));
                out.extend(p.default.map(AstNode::Stmt));
            }
            DeclKind::Field(f) => {
                out.push(AstNode::Type(f.ty));
                out.extend(f.init.map(AstNode::Stmt));
            }
            DeclKind::Record(r) => {
                out.extend(r.bases.iter().copied().map(AstNode::Type));
                if let Some(members) = &r.members {
                    out.extend(members.iter().copied().map(AstNode::Decl));
                }
            }
            DeclKind::Enum(e) => {
                out.extend(e.underlying.map(AstNode::Type));
                if let Some(enumerators) = &e.enumerators {
                    out.extend(enumerators.iter().copied().map(AstNode::Decl));
                }
            }
            DeclKind::TypeAlias(a) => out.push(AstNode::Type(a.target)),
            DeclKind::Template(t) => {
                out.extend(t.params.iter().copied().map(AstNode::Decl));
                out.push(AstNode::Decl(t.pattern));
                out.extend(t.instantiations.iter().copied().map(AstNode::Decl));
            }
            DeclKind::TemplateTypeParam(p) => out.extend(p.default.map(AstNode::Type)),
            DeclKind::Enumerator(_) | DeclKind::Unsupported { .. } => {}
        }
        out
    }

    /// Structural children of a type expression.
    pub fn type_children(&self, ty: &TypeExpr) -> Vec<AstNode> {
        match &ty.kind {
            TypeKind::Pointer { pointee: inner }
            | TypeKind::LValueReference { referent: inner }
            | TypeKind::RValueReference { referent: inner }
            | TypeKind::Qualified { inner, .. }
            | TypeKind::Array { element: inner, .. }
            | TypeKind::Paren { inner } => vec![AstNode::Type(*inner)],
            TypeKind::Function { ret, params, .. } => std::iter::once(*ret)
                .chain(params.iter().copied())
                .map(AstNode::Type)
                .collect(),
            TypeKind::Specialization { args, .. } => args
                .iter()
                .filter_map(|arg| match arg {
                    TemplateArg::Type(ty) => Some(AstNode::Type(*ty)),
                    _ => None,
                })
                .collect(),
            TypeKind::Dependent { qualifier, .. } => qualifier.map(AstNode::Type).into_iter().collect(),
            TypeKind::Auto { deduced } => deduced.map(AstNode::Type).into_iter().collect(),
            TypeKind::Builtin { .. } | TypeKind::Named { .. } | TypeKind::Unsupported { .. } => {
                Vec::new()
            }
        }
    }

    /// Structural children of a statement.
    pub fn stmt_children(&self, stmt: &Stmt) -> Vec<AstNode> {
        match &stmt.kind {
            StmtKind::Compound { stmts } => stmts.iter().copied().map(AstNode::Stmt).collect(),
            StmtKind::DeclStmt { decls } => decls.iter().copied().map(AstNode::Decl).collect(),
            StmtKind::Return { value } => value.map(AstNode::Stmt).into_iter().collect(),
            StmtKind::Member { base, .. } => vec![AstNode::Stmt(*base)],
            StmtKind::Call { callee, args } => std::iter::once(*callee)
                .chain(args.iter().copied())
                .map(AstNode::Stmt)
                .collect(),
            StmtKind::Construct { args, .. } => args.iter().copied().map(AstNode::Stmt).collect(),
            StmtKind::Other { children } => children.iter().copied().map(AstNode::Stmt).collect(),
            StmtKind::DeclRef { .. } | StmtKind::Literal { .. } | StmtKind::Unsupported { .. } => {
                Vec::new()
            }
        }
    }

    /// Structural children of any node.
    pub fn children(&self, node: AstNode) -> Vec<AstNode> {
        match node {
            AstNode::Decl(id) => self.decl_children(self.decl(id)),
            AstNode::Type(id) => self.type_children(self.type_expr(id)),
            AstNode::Stmt(id) => self.stmt_children(self.stmt(id)),
        }
    }

    // ------------------------------------------------------------------------
    // Redeclarations
    // ------------------------------------------------------------------------

    /// The first declaration of `id`'s redeclaration chain.
    pub fn first_redecl(&self, id: DeclId) -> DeclId {
        let mut current = id;
        // Bounded walk: a malformed chain must not loop forever.
        for _ in 0..self.decls.len() {
            match self.decl(current).previous {
                Some(previous) if previous != id => current = previous,
                _ => break,
            }
        }
        current
    }

    /// Every declaration of the entity `id` declares, first to last.
    pub fn redecls(&self, id: DeclId) -> Vec<DeclId> {
        let next = self.next_redecl.get_or_init(|| {
            let mut next = vec![None; self.decls.len()];
            for (index, decl) in self.decls.iter().enumerate() {
                if let Some(previous) = decl.previous {
                    if let Some(slot) = next.get_mut(previous.index()) {
                        slot.get_or_insert(DeclId(index as u32));
                    }
                }
            }
            next
        });

        let mut chain = vec![self.first_redecl(id)];
        while let Some(Some(following)) = chain.last().and_then(|d| next.get(d.index())) {
            if chain.contains(following) {
                break;
            }
            chain.push(*following);
        }
        chain
    }

    /// The defining declaration of `id`'s entity, if the unit contains one.
    pub fn definition(&self, id: DeclId) -> Option<DeclId> {
        self.redecls(id)
            .into_iter()
            .find(|d| self.decl(*d).is_definition())
    }

    // ------------------------------------------------------------------------
    // Names
    // ------------------------------------------------------------------------

    /// Whether `id` is declared inside a function (parameters included).
    pub fn is_function_local(&self, id: DeclId) -> bool {
        let mut current = self.decl(id).parent;
        while let Some(parent) = current {
            if matches!(self.decl(parent).kind, DeclKind::Function(_)) {
                return true;
            }
            current = self.decl(parent).parent;
        }
        false
    }

    /// Human-readable spelling of a declaration's own name.
    pub fn name_text(&self, id: DeclId) -> String {
        let decl = self.decl(id);
        match &decl.name {
            DeclName::Anonymous => "(anonymous)".to_string(),
            DeclName::Identifier(name) => name.clone(),
            DeclName::Constructor => self.enclosing_record_name(decl),
            DeclName::Destructor => format!("~{}", self.enclosing_record_name(decl)),
            DeclName::Conversion(_) => "operator conversion".to_string(),
            DeclName::Operator(op) => format!("operator{op}"),
        }
    }

    fn enclosing_record_name(&self, decl: &Decl) -> String {
        decl.parent
            .and_then(|p| self.decl(p).name.as_identifier().map(str::to_string))
            .unwrap_or_else(|| "(anonymous)".to_string())
    }

    /// `::`-joined names from the outermost named context down to `id`.
    pub fn qualified_name(&self, id: DeclId) -> String {
        let mut parts = vec![self.name_text(id)];
        let mut current = self.decl(id).parent;
        while let Some(parent) = current {
            let decl = self.decl(parent);
            match decl.kind {
                DeclKind::TranslationUnit { .. } => break,
                // Template wrappers share the name of their pattern.
                DeclKind::Template(_) => {}
                _ => parts.push(self.name_text(parent)),
            }
            current = decl.parent;
        }
        parts.reverse();
        parts.join("::")
    }

    /// Comments attached to `id`, in arena order.
    pub fn comments_for(&self, id: DeclId) -> impl Iterator<Item = (usize, &RawComment)> {
        self.comments
            .iter()
            .enumerate()
            .filter(move |(_, c)| c.attached_to == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use crate::source::FileId;

    #[test]
    fn test_redecl_chain_order() {
        let mut b = TreeBuilder::new(Dialect::Cpp);
        let file = b.add_file("a.cc", None);
        let int = b.builtin("int");
        let void = b.builtin("void");
        let first = b.function(b.root(), "f", Some(void), b.span(file, 5, 6));
        b.param(first, None, int, SourceSpan::invalid());
        let second = b.function(b.root(), "f", Some(void), b.span(file, 20, 21));
        b.param(second, Some("x"), int, b.span(file, 28, 29));
        b.redeclare(second, first);
        let body = b.compound(Vec::new());
        b.set_body(second, body);
        let tree = b.finish();

        assert_eq!(tree.redecls(first), vec![first, second]);
        assert_eq!(tree.redecls(second), vec![first, second]);
        assert_eq!(tree.first_redecl(second), first);
        assert_eq!(tree.definition(first), Some(second));
        assert!(!tree.decl(first).is_definition());
    }

    #[test]
    fn test_validate_rejects_dangling_reference() {
        let mut b = TreeBuilder::new(Dialect::Cpp);
        let file = b.add_file("a.cc", None);
        let var = b.var(b.root(), "v", TypeExprId(42), b.span(file, 0, 1));
        let tree = b.finish();
        let err = tree.validate().unwrap_err();
        assert!(err.to_string().contains("type"));
        assert!(tree.decl(var).name.as_identifier() == Some("v"));
    }

    #[test]
    fn test_validate_rejects_bad_file() {
        let mut b = TreeBuilder::new(Dialect::Cpp);
        let int = b.builtin("int");
        b.var(b.root(), "v", int, SourceSpan::file(FileId(3), 0, 1));
        let tree = b.finish();
        assert!(tree.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_statement_cycles() {
        let mut b = TreeBuilder::new(Dialect::C);
        let file = b.add_file("a.c", None);
        let f = b.function(b.root(), "f", None, b.span(file, 5, 6));
        let body = b.compound(Vec::new());
        b.set_body(f, body);
        let mut tree = b.finish();
        tree.stmts[body.index()].kind = StmtKind::Compound { stmts: vec![body] };

        let err = tree.validate().unwrap_err();
        assert!(matches!(err, IndexerError::InvalidTree(_)));
        assert!(err.to_string().contains("own descendant"));
    }

    #[test]
    fn test_validate_rejects_callee_cycle() {
        let mut b = TreeBuilder::new(Dialect::C);
        let file = b.add_file("a.c", None);
        let f = b.function(b.root(), "f", None, b.span(file, 5, 6));
        let callee = b.decl_ref(f, b.span(file, 12, 13));
        let call = b.call(callee, Vec::new(), b.span(file, 12, 15));
        let body = b.compound(vec![call]);
        b.set_body(f, body);
        let mut tree = b.finish();
        tree.stmts[callee.index()].kind = StmtKind::Other {
            children: vec![call],
        };

        assert!(matches!(tree.validate(), Err(IndexerError::InvalidTree(_))));
    }

    #[test]
    fn test_validate_rejects_parent_cycle() {
        let mut b = TreeBuilder::new(Dialect::Cpp);
        let file = b.add_file("a.cc", None);
        let outer = b.namespace(b.root(), Some("outer"), b.span(file, 10, 15));
        let inner = b.namespace(outer, Some("inner"), b.span(file, 30, 35));
        let mut tree = b.finish();
        tree.decls[outer.index()].parent = Some(inner);

        let err = tree.validate().unwrap_err();
        assert!(err.to_string().contains("parent chain"));
    }

    #[test]
    fn test_validate_accepts_shared_instantiation_body() {
        let mut b = TreeBuilder::new(Dialect::Cpp);
        let file = b.add_file("a.cc", None);
        let (template, pattern) = b.function_template(b.root(), "id", None, b.span(file, 22, 24));
        let t = b.template_param(template, "T", b.span(file, 18, 19));
        let t_ty = b.named(t, b.span(file, 25, 26));
        b.param(pattern, Some("v"), t_ty, b.span(file, 27, 28));
        let body = b.compound(Vec::new());
        b.set_body(pattern, body);
        let int = b.builtin("int");
        b.instantiate_function(template, vec![TemplateArg::Type(int)], None, vec![int]);
        let tree = b.finish();

        assert!(tree.validate().is_ok());
    }

    #[test]
    fn test_qualified_name() {
        let mut b = TreeBuilder::new(Dialect::Cpp);
        let file = b.add_file("a.cc", None);
        let ns = b.namespace(b.root(), Some("outer"), b.span(file, 10, 15));
        let record = b.record(ns, Some("Widget"), RecordTag::Class, true, b.span(file, 25, 31));
        let ctor = b.add_decl(
            record,
            Decl::new(DeclName::Constructor, DeclKind::Function(FunctionDecl::default())),
        );
        let dtor = b.add_decl(
            record,
            Decl::new(DeclName::Destructor, DeclKind::Function(FunctionDecl::default())),
        );
        let tree = b.finish();

        assert_eq!(tree.qualified_name(record), "outer::Widget");
        assert_eq!(tree.qualified_name(ctor), "outer::Widget::Widget");
        assert_eq!(tree.qualified_name(dtor), "outer::Widget::~Widget");
        assert!(!tree.is_function_local(ctor));
    }

    #[test]
    fn test_json_roundtrip_preserves_structure() {
        let mut b = TreeBuilder::new(Dialect::C);
        let file = b.add_file("a.c", Some("int v;"));
        let int = b.builtin("int");
        b.var(b.root(), "v", int, b.span(file, 4, 5));
        let tree = b.finish();

        let json = serde_json::to_string(&tree).unwrap();
        let parsed = SyntaxTree::from_json(&json).unwrap();
        assert_eq!(parsed.decls, tree.decls);
        assert_eq!(parsed.dialect, Dialect::C);
        assert_eq!(parsed.top_level_decls().len(), 1);
    }
}
