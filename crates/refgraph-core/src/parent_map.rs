//! Structural parent index over one job's subtree.
//!
//! The map is built on first use and then only read for the rest of the job.
//! It covers the job's root declaration, everything structurally beneath it,
//! and the implicit instantiations of any template in that subtree.

use once_cell::unsync::OnceCell;
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::ast::{AstNode, DeclId, DeclKind, InstanceKind, SyntaxTree};

/// A node's structural parent and its position among the parent's children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexedParent {
    pub parent: AstNode,
    pub index: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParentMap {
    parents: HashMap<AstNode, IndexedParent>,
}

impl ParentMap {
    /// Index every node reachable from `root`.
    ///
    /// A node reachable along two paths keeps the parent seen first.
    pub fn build(tree: &SyntaxTree, root: DeclId) -> Self {
        let mut parents = HashMap::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(AstNode::Decl(root), None)];
        while let Some((node, parent)) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            if let Some(parent) = parent {
                parents.insert(node, parent);
            }
            // Reversed so the first child is visited first.
            for (index, child) in tree.children(node).into_iter().enumerate().rev() {
                if !seen.contains(&child) {
                    stack.push((
                        child,
                        Some(IndexedParent {
                            parent: node,
                            index,
                        }),
                    ));
                }
            }
        }
        Self { parents }
    }

    pub fn parent(&self, node: AstNode) -> Option<IndexedParent> {
        self.parents.get(&node).copied()
    }

    /// Structural ancestors of `node`, nearest first.
    pub fn ancestors(&self, node: AstNode) -> impl Iterator<Item = AstNode> + '_ {
        std::iter::successors(self.parent(node).map(|p| p.parent), move |current| {
            self.parent(*current).map(|p| p.parent)
        })
    }

    /// The nearest declaration at or above `node`.
    pub fn enclosing_decl(&self, node: AstNode) -> Option<DeclId> {
        if let AstNode::Decl(id) = node {
            return Some(id);
        }
        self.ancestors(node).find_map(|n| match n {
            AstNode::Decl(id) => Some(id),
            _ => None,
        })
    }

    /// Whether `node` sits under an implicit template instantiation.
    pub fn is_under_implicit_instantiation(&self, tree: &SyntaxTree, node: AstNode) -> bool {
        std::iter::once(node)
            .chain(self.ancestors(node))
            .any(|n| match n {
                AstNode::Decl(id) => tree
                    .decl(id)
                    .kind
                    .instance()
                    .is_some_and(|i| i.kind == InstanceKind::ImplicitInstantiation),
                _ => false,
            })
    }

    /// Whether `node` sits inside a function body or parameter list.
    pub fn is_function_local(&self, tree: &SyntaxTree, node: AstNode) -> bool {
        self.ancestors(node).any(|n| match n {
            AstNode::Decl(id) => matches!(tree.decl(id).kind, DeclKind::Function(_)),
            _ => false,
        })
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// A [`ParentMap`] for one job, computed on first access.
pub struct LazyParentMap<'t> {
    tree: &'t SyntaxTree,
    root: DeclId,
    cell: OnceCell<ParentMap>,
}

impl<'t> LazyParentMap<'t> {
    pub fn new(tree: &'t SyntaxTree, root: DeclId) -> Self {
        Self {
            tree,
            root,
            cell: OnceCell::new(),
        }
    }

    pub fn get(&self) -> &ParentMap {
        self.cell.get_or_init(|| {
            let map = ParentMap::build(self.tree, self.root);
            debug!(root = self.root.0, nodes = map.len(), "built parent map");
            map
        })
    }

    pub fn is_built(&self) -> bool {
        self.cell.get().is_some()
    }

    pub fn root(&self) -> DeclId {
        self.root
    }
}
