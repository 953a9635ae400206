//! CLI command implementations

pub mod config;
pub mod index;

use std::path::PathBuf;

use anyhow::{Context, Result};
use refgraph_config::{
    CommentMode, ConfigLoader, ConfigOverrides, IndexerConfig, RefgraphConfig, TemplateMode,
    UnimplementedMode, VerbosityMode,
};
use refgraph_core::{
    ForwardDeclCommentPolicy, ForwardDeclComments, IndexerOptions, TemplatePolicy,
    UnimplementedPolicy, Verbosity,
};

use crate::GlobalOptions;

/// Directory whose `.refgraph/config.toml` is merged over the global file.
pub fn working_dir() -> Result<PathBuf> {
    std::env::current_dir().context("Failed to get current directory")
}

/// Load configuration with optional config file override.
///
/// An explicit `--config` file replaces the local config; the global file
/// still sits underneath it.
pub fn load_config(
    global: &GlobalOptions,
    overrides: Option<&ConfigOverrides>,
) -> Result<RefgraphConfig> {
    let mut loader = ConfigLoader::new();

    if let Some(ref config_path) = global.config {
        if !config_path.is_file() {
            anyhow::bail!("Config file not found: {}", config_path.display());
        }
        return loader
            .load_file(config_path, overrides)
            .context("Failed to load config file");
    }

    loader
        .load(&working_dir()?, overrides)
        .context("Failed to load configuration")
}

/// Translate the `[indexer]` table into run options.
pub fn to_indexer_options(config: &IndexerConfig) -> IndexerOptions {
    let comments = |mode: CommentMode| match mode {
        CommentMode::Emit => ForwardDeclCommentPolicy::Emit,
        CommentMode::Ignore => ForwardDeclCommentPolicy::Ignore,
    };

    IndexerOptions::default()
        .with_unimplemented(match config.on_unimplemented {
            UnimplementedMode::Abort => UnimplementedPolicy::Abort,
            UnimplementedMode::Continue => UnimplementedPolicy::Continue,
        })
        .with_templates(match config.templates {
            TemplateMode::Skip => TemplatePolicy::Skip,
            TemplateMode::Visit => TemplatePolicy::Visit,
        })
        .with_verbosity(match config.verbosity {
            VerbosityMode::Full => Verbosity::Full,
            VerbosityMode::Common => Verbosity::Common,
        })
        .with_forward_decl_comments(ForwardDeclComments {
            cpp: comments(config.forward_decl_comments.cpp),
            objc: comments(config.forward_decl_comments.objc),
        })
        .with_usr_byte_size(config.usr_byte_size)
}

/// Parse a config keyword (`skip`, `abort`, ...) from a flag value.
pub fn parse_keyword<T>(s: &str) -> Result<T, String>
where
    T: std::str::FromStr<Err = refgraph_config::ConfigError>,
{
    s.parse().map_err(|e: refgraph_config::ConfigError| e.to_string())
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
