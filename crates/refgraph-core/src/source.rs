//! Source files, locations, and macro expansion metadata.
//!
//! Locations arrive from the front end already resolved to either a byte
//! offset in a physical file or a position inside a macro expansion. The
//! [`TokenScanner`] trait is the narrow lexical collaborator the range
//! resolver uses to widen zero-width spans to a whole token.

use serde::{Deserialize, Serialize};

/// Index of a file in [`crate::ast::SyntaxTree::files`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u32);

impl FileId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a macro expansion in [`crate::ast::SyntaxTree::macros`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacroId(pub u32);

impl MacroId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A physical source file seen by the translation unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path as spelled by the compilation (used for file node identity)
    pub path: String,
    /// File contents, when the front end supplies them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// A byte position inside a physical file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileLoc {
    pub file: FileId,
    pub offset: u32,
}

/// A half-open byte range `[begin, end)` inside one physical file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileSpan {
    pub file: FileId,
    pub begin: u32,
    pub end: u32,
}

impl FileSpan {
    pub fn new(file: FileId, begin: u32, end: u32) -> Self {
        Self { file, begin, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.begin
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.begin)
    }

    /// Whether `other` lies entirely within this span.
    pub fn contains(&self, other: &FileSpan) -> bool {
        self.file == other.file && self.begin <= other.begin && other.end <= self.end
    }
}

/// A raw location as reported by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLoc {
    /// Offset in a physical file
    File { file: FileId, offset: u32 },
    /// Position produced by a macro expansion; `spelling` is where the token
    /// was written inside the macro definition, if known
    Macro {
        expansion: MacroId,
        #[serde(default)]
        spelling: Option<FileLoc>,
    },
    /// Compiler-synthesized or otherwise unknown location
    #[default]
    Invalid,
}

impl SourceLoc {
    pub fn file(file: FileId, offset: u32) -> Self {
        SourceLoc::File { file, offset }
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, SourceLoc::Invalid)
    }

    pub fn is_macro(&self) -> bool {
        matches!(self, SourceLoc::Macro { .. })
    }
}

/// A raw span: begin and end locations, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SourceSpan {
    pub begin: SourceLoc,
    pub end: SourceLoc,
}

impl SourceSpan {
    pub fn new(begin: SourceLoc, end: SourceLoc) -> Self {
        Self { begin, end }
    }

    /// Span covering `[begin, end)` in a physical file.
    pub fn file(file: FileId, begin: u32, end: u32) -> Self {
        Self {
            begin: SourceLoc::file(file, begin),
            end: SourceLoc::file(file, end),
        }
    }

    /// Zero-width span at one offset; the resolver widens it to a token.
    pub fn point(file: FileId, offset: u32) -> Self {
        Self::file(file, offset, offset)
    }

    /// Span entirely inside one macro expansion.
    pub fn in_macro(expansion: MacroId, spelling: Option<FileLoc>) -> Self {
        let loc = SourceLoc::Macro {
            expansion,
            spelling,
        };
        Self {
            begin: loc,
            end: loc,
        }
    }

    pub fn invalid() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.begin.is_valid() && self.end.is_valid()
    }
}

/// One macro expansion recorded by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacroExpansion {
    /// Macro name, for diagnostics
    pub name: String,
    /// The invocation text in the physical file (the expansion point)
    pub expansion: FileSpan,
    /// Where the macro body was defined, if known
    #[serde(default)]
    pub definition: Option<FileSpan>,
}

// ============================================================================
// Token Scanning
// ============================================================================

/// Locates token boundaries in source text.
pub trait TokenScanner {
    /// Return the span of the first token starting at or after `offset`, or
    /// `None` when no token can be found there.
    fn token_at(&self, file: FileId, offset: u32) -> Option<FileSpan>;
}

/// Punctuators scanned as a single token, longest first.
const MULTI_CHAR_PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "->*", "...", "::", "->", "++", "--", "<<", ">>", "<=", ">=", "==", "!=", "&&",
    "||", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", ".*", "##",
];

/// [`TokenScanner`] over file text carried in the syntax tree.
///
/// Recognizes identifiers and numbers, string and character literals, and
/// C-family punctuators. Files without text never yield tokens.
#[derive(Debug, Clone, Copy)]
pub struct TextScanner<'a> {
    files: &'a [SourceFile],
}

impl<'a> TextScanner<'a> {
    pub fn new(files: &'a [SourceFile]) -> Self {
        Self { files }
    }
}

impl TokenScanner for TextScanner<'_> {
    fn token_at(&self, file: FileId, offset: u32) -> Option<FileSpan> {
        let text = self.files.get(file.index())?.text.as_deref()?;
        let bytes = text.as_bytes();
        let mut begin = offset as usize;

        while begin < bytes.len() && bytes[begin].is_ascii_whitespace() {
            begin += 1;
        }
        if begin >= bytes.len() {
            return None;
        }

        let first = bytes[begin];
        let end = if is_ident_byte(first) {
            let mut end = begin + 1;
            while end < bytes.len() && is_ident_byte(bytes[end]) {
                end += 1;
            }
            end
        } else if first == b'"' || first == b'\'' {
            let mut end = begin + 1;
            while end < bytes.len() && bytes[end] != first {
                if bytes[end] == b'\\' {
                    end += 1;
                }
                end += 1;
            }
            (end + 1).min(bytes.len())
        } else {
            let rest = &text[begin..];
            MULTI_CHAR_PUNCTUATORS
                .iter()
                .find(|p| rest.starts_with(**p))
                .map(|p| begin + p.len())
                .unwrap_or_else(|| begin + rest.chars().next().map_or(1, char::len_utf8))
        };

        Some(FileSpan::new(file, begin as u32, end as u32))
    }
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}
