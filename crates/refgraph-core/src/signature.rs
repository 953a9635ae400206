//! Human-readable labels for declarations.
//!
//! Labels are informational only; they never feed node identity. The one
//! spelling identity does use is [`type_shape`], which names template
//! parameters by position.

use lru::LruCache;
use std::num::NonZeroUsize;

use crate::ast::{DeclId, DeclKind, SyntaxTree, TemplateArg, TypeExprId, TypeKind};

/// Default number of labels kept by [`CachedRenderer`].
pub const DEFAULT_LABEL_CACHE_SIZE: usize = 4096;

/// Type nesting beyond which spelling gives up.
const MAX_SPELLING_DEPTH: usize = 64;

/// Renders a declaration into a display label.
pub trait SignatureRenderer {
    fn render(&mut self, tree: &SyntaxTree, decl: DeclId) -> Option<String>;
}

/// Renders `ns::Class::method(int, const char*) const`.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualifiedNameRenderer;

impl SignatureRenderer for QualifiedNameRenderer {
    fn render(&mut self, tree: &SyntaxTree, decl: DeclId) -> Option<String> {
        let node = tree.decl(decl);
        match &node.kind {
            DeclKind::TranslationUnit { .. } => None,
            DeclKind::Function(function) => {
                let params: Vec<String> = function
                    .params
                    .iter()
                    .filter_map(|p| match &tree.decl(*p).kind {
                        DeclKind::Param(param) => Some(type_spelling(tree, param.ty)),
                        _ => None,
                    })
                    .collect();
                let mut label = format!("{}({})", tree.qualified_name(decl), params.join(", "));
                if function.variadic {
                    label.insert_str(label.len() - 1, if params.is_empty() { "..." } else { ", ..." });
                }
                for qualifier in &function.qualifiers {
                    label.push(' ');
                    label.push_str(qualifier.as_str());
                }
                Some(label)
            }
            DeclKind::Template(template) => self.render(tree, template.pattern),
            _ => Some(tree.qualified_name(decl)),
        }
    }
}

/// Memoizes another renderer in a bounded LRU cache.
///
/// Keys are arena ids, so one cache serves exactly one tree.
pub struct CachedRenderer<R> {
    inner: R,
    cache: LruCache<DeclId, Option<String>>,
}

impl<R: SignatureRenderer> CachedRenderer<R> {
    pub fn new(inner: R, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: LruCache::new(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for CachedRenderer<QualifiedNameRenderer> {
    fn default() -> Self {
        Self::new(QualifiedNameRenderer, DEFAULT_LABEL_CACHE_SIZE)
    }
}

impl<R: SignatureRenderer> SignatureRenderer for CachedRenderer<R> {
    fn render(&mut self, tree: &SyntaxTree, decl: DeclId) -> Option<String> {
        if let Some(label) = self.cache.get(&decl) {
            return label.clone();
        }
        let label = self.inner.render(tree, decl);
        self.cache.put(decl, label.clone());
        label
    }
}

/// Source-like spelling of a type expression.
pub fn type_spelling(tree: &SyntaxTree, ty: TypeExprId) -> String {
    Speller { tree, params: &[] }.spell(ty, 0)
}

/// Spelling of `ty` with each of `params` written as `$<position>`, so that
/// renaming a template parameter leaves the shape unchanged.
pub fn type_shape(tree: &SyntaxTree, ty: TypeExprId, params: &[DeclId]) -> String {
    Speller { tree, params }.spell(ty, 0)
}

struct Speller<'a> {
    tree: &'a SyntaxTree,
    params: &'a [DeclId],
}

impl Speller<'_> {
    fn spell(&self, ty: TypeExprId, depth: usize) -> String {
        if depth > MAX_SPELLING_DEPTH {
            return "...".to_string();
        }
        let tree = self.tree;
        let next = depth + 1;
        match &tree.type_expr(ty).kind {
            TypeKind::Builtin { name } => name.clone(),
            TypeKind::Named { decl } => match self.params.iter().position(|p| p == decl) {
                Some(position) => format!("${position}"),
                None => tree.qualified_name(*decl),
            },
            TypeKind::Pointer { pointee } => format!("{}*", self.spell(*pointee, next)),
            TypeKind::LValueReference { referent } => format!("{}&", self.spell(*referent, next)),
            TypeKind::RValueReference { referent } => format!("{}&&", self.spell(*referent, next)),
            TypeKind::Qualified { qualifiers, inner } => {
                let mut qualifiers = qualifiers.clone();
                qualifiers.sort();
                qualifiers.dedup();
                let prefix: Vec<&str> = qualifiers.iter().map(|q| q.as_str()).collect();
                format!("{} {}", prefix.join(" "), self.spell(*inner, next))
            }
            TypeKind::Array { element, size } => match size {
                Some(size) => format!("{}[{size}]", self.spell(*element, next)),
                None => format!("{}[]", self.spell(*element, next)),
            },
            TypeKind::Function {
                ret,
                params,
                variadic,
            } => {
                let mut parts: Vec<String> = params.iter().map(|p| self.spell(*p, next)).collect();
                if *variadic {
                    parts.push("...".to_string());
                }
                format!("{}({})", self.spell(*ret, next), parts.join(", "))
            }
            TypeKind::Specialization { template, args } => {
                let args: Vec<String> = args
                    .iter()
                    .map(|arg| match arg {
                        TemplateArg::Type(ty) => self.spell(*ty, next),
                        TemplateArg::Integral(value) => value.to_string(),
                        TemplateArg::Template(decl) => tree.qualified_name(*decl),
                    })
                    .collect();
                format!("{}<{}>", tree.qualified_name(*template), args.join(", "))
            }
            TypeKind::Dependent { qualifier, name } => match qualifier {
                Some(qualifier) => format!("{}::{name}", self.spell(*qualifier, next)),
                None => name.clone(),
            },
            TypeKind::Auto { deduced } => match deduced {
                Some(deduced) => self.spell(*deduced, next),
                None => "auto".to_string(),
            },
            TypeKind::Paren { inner } => self.spell(*inner, next),
            TypeKind::Unsupported { construct } => format!("<{construct}>"),
        }
    }
}
