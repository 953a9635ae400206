//! Content hash for declarations that have no name to identify them by.
//!
//! Two anonymous records (or enums) in the same scope are told apart by their
//! sibling index; the hash additionally keeps an id stable when an unrelated
//! anonymous sibling is added or removed and the contents stay the same.

use sha2::{Digest, Sha256};

use crate::ast::{DeclId, DeclKind, SyntaxTree};

/// Nesting depth after which anonymous members stop contributing.
const MAX_DEPTH: usize = 8;

/// Hash the member names and kinds of `decl`.
pub fn semantic_hash(tree: &SyntaxTree, decl: DeclId) -> u64 {
    let mut hasher = Sha256::new();
    feed(tree, decl, 0, &mut hasher);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

fn feed(tree: &SyntaxTree, decl: DeclId, depth: usize, hasher: &mut Sha256) {
    let node = tree.decl(decl);
    hasher.update(node.kind.as_str().as_bytes());
    hasher.update([0]);

    let members: &[DeclId] = match &node.kind {
        DeclKind::Record(record) => record.members.as_deref().unwrap_or_default(),
        DeclKind::Enum(e) => e.enumerators.as_deref().unwrap_or_default(),
        _ => &[],
    };
    for &member in members {
        let child = tree.decl(member);
        if child.name.is_anonymous() && depth < MAX_DEPTH {
            hasher.update(b"{");
            feed(tree, member, depth + 1, hasher);
            hasher.update(b"}");
            continue;
        }
        hasher.update(child.kind.as_str().as_bytes());
        hasher.update([1]);
        hasher.update(tree.name_text(member).as_bytes());
        hasher.update([2]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Dialect, RecordTag};
    use crate::builder::TreeBuilder;

    #[test]
    fn test_hash_depends_on_members_not_positions() {
        let mut b = TreeBuilder::new(Dialect::C);
        let file = b.add_file("a.c", None);
        let int = b.builtin("int");
        let first = b.record(b.root(), None, RecordTag::Struct, true, b.span(file, 0, 6));
        b.field(first, "x", int, b.span(file, 13, 14));
        let second = b.record(b.root(), None, RecordTag::Struct, true, b.span(file, 40, 46));
        b.field(second, "x", int, b.span(file, 60, 61));
        let third = b.record(b.root(), None, RecordTag::Struct, true, b.span(file, 80, 86));
        b.field(third, "y", int, b.span(file, 93, 94));
        let tree = b.finish();

        assert_eq!(semantic_hash(&tree, first), semantic_hash(&tree, second));
        assert_ne!(semantic_hash(&tree, first), semantic_hash(&tree, third));
    }

    #[test]
    fn test_enum_hash_covers_enumerators() {
        let mut b = TreeBuilder::new(Dialect::C);
        let file = b.add_file("a.c", None);
        let a = b.enumeration(b.root(), None, b.span(file, 0, 4));
        b.enumerator(a, "RED", None, b.span(file, 7, 10));
        let c = b.enumeration(b.root(), None, b.span(file, 20, 24));
        b.enumerator(c, "BLUE", None, b.span(file, 27, 31));
        let tree = b.finish();

        assert_ne!(semantic_hash(&tree, a), semantic_hash(&tree, c));
    }
}
