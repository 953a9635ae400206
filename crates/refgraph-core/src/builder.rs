//! Programmatic construction of [`SyntaxTree`]s.
//!
//! Front-end adapters and tests assemble trees through `TreeBuilder` rather
//! than pushing into the arenas by hand: it keeps parent links and the
//! containing declaration lists consistent.
//!
//! ## Usage
//!
//! ```ignore
//! use refgraph_core::builder::TreeBuilder;
//! use refgraph_core::ast::Dialect;
//!
//! let mut b = TreeBuilder::new(Dialect::Cpp);
//! let file = b.add_file("a.cc", Some("void f(int x) { }"));
//! let void = b.builtin("void");
//! let int = b.builtin("int");
//! let f = b.function(b.root(), "f", Some(void), b.span(file, 5, 6));
//! b.param(f, Some("x"), int, b.span(file, 11, 12));
//! let tree = b.finish();
//! ```

use once_cell::sync::OnceCell;

use crate::ast::{
    Decl, DeclId, DeclKind, DeclName, Dialect, EnumDecl, EnumeratorDecl, FieldDecl,
    FunctionDecl, InstanceKind, ParamDecl, Qualifier, RawComment, RecordDecl, RecordTag, Stmt,
    StmtId, StmtKind, SyntaxTree, TemplateArg, TemplateDecl, TemplateInstance,
    TemplateTypeParamDecl, TypeAliasDecl, TypeExpr, TypeExprId, TypeKind, VarDecl,
};
use crate::source::{FileId, MacroExpansion, MacroId, SourceFile, SourceSpan};

/// Incrementally builds a [`SyntaxTree`].
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    dialect: Dialect,
    files: Vec<SourceFile>,
    macros: Vec<MacroExpansion>,
    decls: Vec<Decl>,
    types: Vec<TypeExpr>,
    stmts: Vec<Stmt>,
    comments: Vec<RawComment>,
    root: DeclId,
}

impl TreeBuilder {
    /// Create a builder holding only the translation-unit declaration.
    pub fn new(dialect: Dialect) -> Self {
        let root = Decl::new(
            DeclName::Anonymous,
            DeclKind::TranslationUnit { decls: Vec::new() },
        );
        Self {
            dialect,
            files: Vec::new(),
            macros: Vec::new(),
            decls: vec![root],
            types: Vec::new(),
            stmts: Vec::new(),
            comments: Vec::new(),
            root: DeclId(0),
        }
    }

    pub fn root(&self) -> DeclId {
        self.root
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn finish(self) -> SyntaxTree {
        SyntaxTree {
            dialect: self.dialect,
            files: self.files,
            macros: self.macros,
            decls: self.decls,
            types: self.types,
            stmts: self.stmts,
            comments: self.comments,
            root: self.root,
            next_redecl: OnceCell::new(),
        }
    }

    // ------------------------------------------------------------------------
    // Files and locations
    // ------------------------------------------------------------------------

    pub fn add_file(&mut self, path: &str, text: Option<&str>) -> FileId {
        let mut file = SourceFile::new(path);
        file.text = text.map(str::to_string);
        self.files.push(file);
        FileId(self.files.len() as u32 - 1)
    }

    pub fn add_macro(&mut self, expansion: MacroExpansion) -> MacroId {
        self.macros.push(expansion);
        MacroId(self.macros.len() as u32 - 1)
    }

    pub fn span(&self, file: FileId, begin: u32, end: u32) -> SourceSpan {
        SourceSpan::file(file, begin, end)
    }

    pub fn comment(&mut self, span: SourceSpan, text: &str, attached_to: Option<DeclId>) {
        self.comments.push(RawComment {
            span,
            text: text.to_string(),
            attached_to,
        });
    }

    // ------------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------------

    /// Add `decl` under `parent`, linking it into the parent's natural slot
    /// (scope members, parameters, enumerators, template parameters).
    pub fn add_decl(&mut self, parent: DeclId, decl: Decl) -> DeclId {
        let id = self.add_detached(parent, decl);
        let child_kind = self.decls[id.index()].kind.clone();
        match (&mut self.decls[parent.index()].kind, child_kind) {
            (DeclKind::TranslationUnit { decls }, _) | (DeclKind::Namespace { decls }, _) => {
                decls.push(id)
            }
            (DeclKind::Record(record), _) => {
                if let Some(members) = record.members.as_mut() {
                    members.push(id);
                }
            }
            (DeclKind::Function(function), DeclKind::Param(_)) => function.params.push(id),
            (DeclKind::Enum(e), DeclKind::Enumerator(_)) => {
                e.enumerators.get_or_insert_with(Vec::new).push(id)
            }
            (DeclKind::Template(template), DeclKind::TemplateTypeParam(_)) => {
                template.params.push(id)
            }
            _ => {}
        }
        id
    }

    /// Add `decl` with `parent` as its semantic parent without linking it
    /// into any list.
    pub fn add_detached(&mut self, parent: DeclId, mut decl: Decl) -> DeclId {
        decl.parent = Some(parent);
        self.decls.push(decl);
        DeclId(self.decls.len() as u32 - 1)
    }

    pub fn redeclare(&mut self, decl: DeclId, previous: DeclId) {
        self.decls[decl.index()].previous = Some(previous);
    }

    pub fn namespace(&mut self, parent: DeclId, name: Option<&str>, loc: SourceSpan) -> DeclId {
        let name = name.map(DeclName::ident).unwrap_or_default();
        self.add_decl(
            parent,
            Decl::new(name, DeclKind::Namespace { decls: Vec::new() }).at(loc),
        )
    }

    pub fn function(
        &mut self,
        parent: DeclId,
        name: &str,
        return_type: Option<TypeExprId>,
        loc: SourceSpan,
    ) -> DeclId {
        let function = FunctionDecl {
            return_type,
            ..FunctionDecl::default()
        };
        self.add_decl(
            parent,
            Decl::new(DeclName::ident(name), DeclKind::Function(function)).at(loc),
        )
    }

    pub fn param(
        &mut self,
        function: DeclId,
        name: Option<&str>,
        ty: TypeExprId,
        loc: SourceSpan,
    ) -> DeclId {
        let name = name.map(DeclName::ident).unwrap_or_default();
        self.add_decl(
            function,
            Decl::new(name, DeclKind::Param(ParamDecl { ty, default: None })).at(loc),
        )
    }

    pub fn set_body(&mut self, function: DeclId, body: StmtId) {
        if let DeclKind::Function(f) = &mut self.decls[function.index()].kind {
            f.body = Some(body);
        }
    }

    pub fn set_method_qualifiers(&mut self, function: DeclId, qualifiers: Vec<Qualifier>) {
        if let DeclKind::Function(f) = &mut self.decls[function.index()].kind {
            f.qualifiers = qualifiers;
        }
    }

    pub fn set_param_default(&mut self, param: DeclId, default: StmtId) {
        if let DeclKind::Param(p) = &mut self.decls[param.index()].kind {
            p.default = Some(default);
        }
    }

    pub fn var(&mut self, parent: DeclId, name: &str, ty: TypeExprId, loc: SourceSpan) -> DeclId {
        self.add_decl(
            parent,
            Decl::new(
                DeclName::ident(name),
                DeclKind::Var(VarDecl {
                    ty,
                    init: None,
                    is_extern: false,
                }),
            )
            .at(loc),
        )
    }

    pub fn set_init(&mut self, decl: DeclId, init: StmtId) {
        match &mut self.decls[decl.index()].kind {
            DeclKind::Var(v) => v.init = Some(init),
            DeclKind::Field(f) => f.init = Some(init),
            _ => {}
        }
    }

    pub fn record(
        &mut self,
        parent: DeclId,
        name: Option<&str>,
        tag: RecordTag,
        is_definition: bool,
        loc: SourceSpan,
    ) -> DeclId {
        let name = name.map(DeclName::ident).unwrap_or_default();
        let record = RecordDecl {
            tag,
            members: is_definition.then(Vec::new),
            bases: Vec::new(),
            instance: None,
        };
        self.add_decl(parent, Decl::new(name, DeclKind::Record(record)).at(loc))
    }

    pub fn add_base(&mut self, record: DeclId, base: TypeExprId) {
        if let DeclKind::Record(r) = &mut self.decls[record.index()].kind {
            r.bases.push(base);
        }
    }

    pub fn field(&mut self, record: DeclId, name: &str, ty: TypeExprId, loc: SourceSpan) -> DeclId {
        self.add_decl(
            record,
            Decl::new(
                DeclName::ident(name),
                DeclKind::Field(FieldDecl { ty, init: None }),
            )
            .at(loc),
        )
    }

    pub fn enumeration(&mut self, parent: DeclId, name: Option<&str>, loc: SourceSpan) -> DeclId {
        let name = name.map(DeclName::ident).unwrap_or_default();
        self.add_decl(parent, Decl::new(name, DeclKind::Enum(EnumDecl::default())).at(loc))
    }

    pub fn enumerator(
        &mut self,
        enumeration: DeclId,
        name: &str,
        value: Option<i64>,
        loc: SourceSpan,
    ) -> DeclId {
        self.add_decl(
            enumeration,
            Decl::new(
                DeclName::ident(name),
                DeclKind::Enumerator(EnumeratorDecl { value }),
            )
            .at(loc),
        )
    }

    pub fn alias(
        &mut self,
        parent: DeclId,
        name: &str,
        target: TypeExprId,
        loc: SourceSpan,
    ) -> DeclId {
        self.add_decl(
            parent,
            Decl::new(
                DeclName::ident(name),
                DeclKind::TypeAlias(TypeAliasDecl { target }),
            )
            .at(loc),
        )
    }

    /// Wrap an already-added, unlinked `pattern` in a template declared
    /// under `parent`.
    pub fn template(&mut self, parent: DeclId, pattern: DeclId) -> DeclId {
        let pattern_decl = &self.decls[pattern.index()];
        let decl = Decl::new(
            pattern_decl.name.clone(),
            DeclKind::Template(TemplateDecl {
                params: Vec::new(),
                pattern,
                instantiations: Vec::new(),
            }),
        )
        .at(pattern_decl.location)
        .with_extent(pattern_decl.extent);
        self.add_decl(parent, decl)
    }

    /// A function template `name` under `parent`; returns (template, pattern).
    pub fn function_template(
        &mut self,
        parent: DeclId,
        name: &str,
        return_type: Option<TypeExprId>,
        loc: SourceSpan,
    ) -> (DeclId, DeclId) {
        let function = FunctionDecl {
            return_type,
            ..FunctionDecl::default()
        };
        let pattern = self.add_detached(
            parent,
            Decl::new(DeclName::ident(name), DeclKind::Function(function)).at(loc),
        );
        (self.template(parent, pattern), pattern)
    }

    pub fn template_param(&mut self, template: DeclId, name: &str, loc: SourceSpan) -> DeclId {
        self.add_decl(
            template,
            Decl::new(
                DeclName::ident(name),
                DeclKind::TemplateTypeParam(TemplateTypeParamDecl::default()),
            )
            .at(loc),
        )
    }

    /// Materialize an implicit instantiation of a function template.
    ///
    /// The instantiation shares the pattern's name, location, and body; its
    /// parameters are re-created with the substituted `param_types`.
    pub fn instantiate_function(
        &mut self,
        template: DeclId,
        args: Vec<TemplateArg>,
        return_type: Option<TypeExprId>,
        param_types: Vec<TypeExprId>,
    ) -> DeclId {
        let pattern = match &self.decls[template.index()].kind {
            DeclKind::Template(t) => t.pattern,
            _ => return template,
        };
        let pattern_decl = self.decls[pattern.index()].clone();
        let (pattern_params, body) = match &pattern_decl.kind {
            DeclKind::Function(f) => (f.params.clone(), f.body),
            _ => (Vec::new(), None),
        };

        let function = FunctionDecl {
            return_type,
            body,
            instance: Some(TemplateInstance {
                template,
                args,
                kind: InstanceKind::ImplicitInstantiation,
            }),
            ..FunctionDecl::default()
        };
        let mut decl = Decl::new(pattern_decl.name.clone(), DeclKind::Function(function))
            .at(pattern_decl.location)
            .with_extent(pattern_decl.extent);
        decl.implicit = true;
        let parent = pattern_decl.parent.unwrap_or(self.root);
        let instance = self.add_detached(parent, decl);

        for (index, ty) in param_types.into_iter().enumerate() {
            let (name, loc) = pattern_params
                .get(index)
                .map(|p| {
                    let p = &self.decls[p.index()];
                    (p.name.clone(), p.location)
                })
                .unwrap_or_default();
            self.add_decl(
                instance,
                Decl::new(name, DeclKind::Param(ParamDecl { ty, default: None })).at(loc),
            );
        }

        if let DeclKind::Template(t) = &mut self.decls[template.index()].kind {
            t.instantiations.push(instance);
        }
        instance
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    pub fn add_type(&mut self, ty: TypeExpr) -> TypeExprId {
        self.types.push(ty);
        TypeExprId(self.types.len() as u32 - 1)
    }

    pub fn builtin(&mut self, name: &str) -> TypeExprId {
        self.add_type(TypeExpr::new(TypeKind::Builtin {
            name: name.to_string(),
        }))
    }

    pub fn named(&mut self, decl: DeclId, span: SourceSpan) -> TypeExprId {
        self.add_type(TypeExpr::new(TypeKind::Named { decl }).at(span))
    }

    pub fn pointer(&mut self, pointee: TypeExprId) -> TypeExprId {
        self.add_type(TypeExpr::new(TypeKind::Pointer { pointee }))
    }

    pub fn lvalue_ref(&mut self, referent: TypeExprId) -> TypeExprId {
        self.add_type(TypeExpr::new(TypeKind::LValueReference { referent }))
    }

    pub fn qualified(&mut self, qualifiers: Vec<Qualifier>, inner: TypeExprId) -> TypeExprId {
        self.add_type(TypeExpr::new(TypeKind::Qualified { qualifiers, inner }))
    }

    pub fn array(&mut self, element: TypeExprId, size: Option<u64>) -> TypeExprId {
        self.add_type(TypeExpr::new(TypeKind::Array { element, size }))
    }

    pub fn specialization(
        &mut self,
        template: DeclId,
        args: Vec<TemplateArg>,
        span: SourceSpan,
    ) -> TypeExprId {
        self.add_type(TypeExpr::new(TypeKind::Specialization { template, args }).at(span))
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    pub fn add_stmt(&mut self, stmt: Stmt) -> StmtId {
        self.stmts.push(stmt);
        StmtId(self.stmts.len() as u32 - 1)
    }

    pub fn compound(&mut self, stmts: Vec<StmtId>) -> StmtId {
        self.add_stmt(Stmt::new(StmtKind::Compound { stmts }))
    }

    pub fn decl_stmt(&mut self, decls: Vec<DeclId>) -> StmtId {
        self.add_stmt(Stmt::new(StmtKind::DeclStmt { decls }))
    }

    pub fn decl_ref(&mut self, decl: DeclId, span: SourceSpan) -> StmtId {
        self.add_stmt(
            Stmt::new(StmtKind::DeclRef {
                decl,
                name_span: span,
            })
            .at(span),
        )
    }

    pub fn call(&mut self, callee: StmtId, args: Vec<StmtId>, span: SourceSpan) -> StmtId {
        self.add_stmt(Stmt::new(StmtKind::Call { callee, args }).at(span))
    }

    pub fn literal(&mut self, text: &str, span: SourceSpan) -> StmtId {
        self.add_stmt(
            Stmt::new(StmtKind::Literal {
                text: text.to_string(),
            })
            .at(span),
        )
    }
}
