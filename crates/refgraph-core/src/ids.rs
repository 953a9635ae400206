//! Content-addressed node identifiers.
//!
//! A [`NodeId`] is the SHA-256 digest of a canonical signature: a tag plus a
//! sequence of length-prefixed components (names, child ids, ordinals).
//! Nothing run-specific (arena indices, byte offsets of named entities)
//! enters a signature, so equivalent trees produce equal ids.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of digest bytes kept in a [`NodeId`].
const NODE_ID_BYTES: usize = 16;

/// Opaque, deterministic identifier of a graph node.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical signature accumulator.
///
/// ```ignore
/// let id = Signature::new("tapp").id(&abs).id(&arg).finish();
/// ```
#[derive(Debug, Clone)]
pub struct Signature {
    buf: String,
}

impl Signature {
    pub fn new(tag: &str) -> Self {
        let mut sig = Self {
            buf: String::with_capacity(64),
        };
        sig.push(tag);
        sig
    }

    fn push(&mut self, part: &str) {
        self.buf.push_str(&part.len().to_string());
        self.buf.push(':');
        self.buf.push_str(part);
        self.buf.push(';');
    }

    pub fn text(mut self, part: &str) -> Self {
        self.push(part);
        self
    }

    pub fn id(mut self, id: &NodeId) -> Self {
        self.push(id.as_str());
        self
    }

    pub fn opt_id(self, id: Option<&NodeId>) -> Self {
        match id {
            Some(id) => self.id(id),
            None => self.text("-"),
        }
    }

    pub fn number(mut self, n: i128) -> Self {
        self.push(&n.to_string());
        self
    }

    /// The canonical text, before hashing.
    pub fn canonical(&self) -> &str {
        &self.buf
    }

    pub fn finish(self) -> NodeId {
        let digest = Sha256::digest(self.buf.as_bytes());
        NodeId(hex_lower(&digest[..NODE_ID_BYTES]))
    }
}

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Upper-case hex of the first `byte_size` bytes of the SHA-256 of `input`.
///
/// Returns `None` when `byte_size` is zero.
pub fn external_hash(input: &str, byte_size: u8) -> Option<String> {
    if byte_size == 0 {
        return None;
    }
    let digest = Sha256::digest(input.as_bytes());
    let take = (byte_size as usize).min(digest.len());
    Some(digest[..take].iter().map(|b| format!("{b:02X}")).collect())
}

// ============================================================================
// Names
// ============================================================================

/// Equivalence class of a declared name.
///
/// Constructors, destructors and conversion operators are matched by class
/// alone; their spelling never reaches the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameEqClass {
    Plain,
    Constructor,
    Destructor,
    Conversion,
    Operator,
    Anonymous,
}

impl NameEqClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            NameEqClass::Plain => "plain",
            NameEqClass::Constructor => "ctor",
            NameEqClass::Destructor => "dtor",
            NameEqClass::Conversion => "conv",
            NameEqClass::Operator => "op",
            NameEqClass::Anonymous => "anon",
        }
    }
}

/// A declaration's own name reduced to its equivalence class.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NameId {
    pub eq_class: NameEqClass,
    /// Spelling for plain names and operators; empty otherwise
    pub text: String,
}

impl NameId {
    pub fn new(eq_class: NameEqClass, text: impl Into<String>) -> Self {
        Self {
            eq_class,
            text: text.into(),
        }
    }

    /// Append this name to a signature.
    pub fn sign(&self, sig: Signature) -> Signature {
        sig.text(self.eq_class.as_str()).text(&self.text)
    }
}

// ============================================================================
// Node Sets
// ============================================================================

/// Whether the visit that produced an id is responsible for declaring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Claimability {
    /// Structural node synthesized by this visit
    Claimable,
    /// Node owned by a declaration visited elsewhere
    Unclaimable,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeSetEntry {
    pub id: NodeId,
    pub claimability: Claimability,
}

/// Ids a written type expression resolves to, outermost first.
///
/// A qualified or wrapped type yields its own node followed by the chain it
/// wraps.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeSet {
    entries: Vec<NodeSetEntry>,
}

impl NodeSet {
    pub fn new(id: NodeId, claimability: Claimability) -> Self {
        Self {
            entries: vec![NodeSetEntry { id, claimability }],
        }
    }

    pub fn claimable(id: NodeId) -> Self {
        Self::new(id, Claimability::Claimable)
    }

    pub fn unclaimable(id: NodeId) -> Self {
        Self::new(id, Claimability::Unclaimable)
    }

    /// Prepend a wrapper id in front of `inner`.
    pub fn wrap(id: NodeId, claimability: Claimability, inner: NodeSet) -> Self {
        let mut entries = Vec::with_capacity(inner.entries.len() + 1);
        entries.push(NodeSetEntry { id, claimability });
        entries.extend(inner.entries);
        Self { entries }
    }

    /// The id that stands for the whole type expression.
    pub fn primary(&self) -> &NodeId {
        &self.entries[0].id
    }

    pub fn primary_claimability(&self) -> Claimability {
        self.entries[0].claimability
    }

    pub fn entries(&self) -> &[NodeSetEntry] {
        &self.entries
    }

    pub fn claimable_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.entries
            .iter()
            .filter(|e| e.claimability == Claimability::Claimable)
            .map(|e| &e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = Signature::new("function").text("f").number(2).finish();
        let b = Signature::new("function").text("f").number(2).finish();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), NODE_ID_BYTES * 2);
    }

    #[test]
    fn test_signature_components_are_unambiguous() {
        let a = Signature::new("x").text("ab").text("c").finish();
        let b = Signature::new("x").text("a").text("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_name_eq_classes_are_distinct() {
        let ctor = NameId::new(NameEqClass::Constructor, "");
        let plain = NameId::new(NameEqClass::Plain, "");
        let a = ctor.sign(Signature::new("n")).finish();
        let b = plain.sign(Signature::new("n")).finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_external_hash() {
        assert_eq!(external_hash("c:@F@f", 0), None);
        let usr = external_hash("c:@F@f", 8).unwrap();
        assert_eq!(usr.len(), 16);
        assert!(usr.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(external_hash("c:@F@f", 255).unwrap().len(), 64);
    }

    #[test]
    fn test_node_set_wrap() {
        let inner = NodeSet::unclaimable(Signature::new("record").text("S").finish());
        let wrapper = Signature::new("tapp").text("const").finish();
        let set = NodeSet::wrap(wrapper.clone(), Claimability::Claimable, inner.clone());
        assert_eq!(set.primary(), &wrapper);
        assert_eq!(set.entries().len(), 2);
        assert_eq!(set.claimable_ids().collect::<Vec<_>>(), vec![&wrapper]);
        assert_eq!(set.entries()[1].id, *inner.primary());
    }
}
