//! Behavior switches fixed for the lifetime of an indexing run.

use serde::{Deserialize, Serialize};

use crate::ast::Dialect;

/// What to do with a construct the indexer has no rule for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnimplementedPolicy {
    /// Stop the run at the first such construct
    Abort,
    /// Skip the construct, record a diagnostic, and carry on
    #[default]
    Continue,
}

/// Whether implicit template instantiations are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplatePolicy {
    Skip,
    #[default]
    #[serde(alias = "visit_instantiations")]
    Visit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Full,
    /// Omit facts most consumers never read
    #[serde(alias = "common_only")]
    Common,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForwardDeclCommentPolicy {
    #[default]
    Emit,
    Ignore,
}

/// Forward-declaration comment handling, per dialect family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForwardDeclComments {
    /// C and C++
    #[serde(default)]
    pub cpp: ForwardDeclCommentPolicy,
    /// Objective-C and Objective-C++
    #[serde(default)]
    pub objc: ForwardDeclCommentPolicy,
}

impl ForwardDeclComments {
    pub fn for_dialect(&self, dialect: Dialect) -> ForwardDeclCommentPolicy {
        if dialect.is_objc() {
            self.objc
        } else {
            self.cpp
        }
    }
}

/// Configuration of one [`Indexer`](crate::indexer::Indexer) run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerOptions {
    #[serde(default)]
    pub on_unimplemented: UnimplementedPolicy,
    #[serde(default)]
    pub templates: TemplatePolicy,
    #[serde(default)]
    pub verbosity: Verbosity,
    #[serde(default)]
    pub forward_decl_comments: ForwardDeclComments,
    /// Bytes of SHA-256 kept for external identifiers; 0 disables them
    #[serde(default)]
    pub usr_byte_size: u8,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            on_unimplemented: UnimplementedPolicy::Continue,
            templates: TemplatePolicy::Visit,
            verbosity: Verbosity::Full,
            forward_decl_comments: ForwardDeclComments::default(),
            usr_byte_size: 0,
        }
    }
}

impl IndexerOptions {
    pub fn with_unimplemented(mut self, policy: UnimplementedPolicy) -> Self {
        self.on_unimplemented = policy;
        self
    }

    pub fn with_templates(mut self, policy: TemplatePolicy) -> Self {
        self.templates = policy;
        self
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn with_forward_decl_comments(mut self, comments: ForwardDeclComments) -> Self {
        self.forward_decl_comments = comments;
        self
    }

    pub fn with_usr_byte_size(mut self, bytes: u8) -> Self {
        self.usr_byte_size = bytes;
        self
    }

    pub fn visits_instantiations(&self) -> bool {
        self.templates == TemplatePolicy::Visit
    }

    pub fn emits_usrs(&self) -> bool {
        self.usr_byte_size > 0
    }
}
