//! Errors raised while loading, merging, and saving refgraph configuration.
//!
//! Paths in messages are the layer that failed: the global
//! `~/.refgraph/config.toml`, the workspace `.refgraph/config.toml`, or a
//! file named with `--config` / `REFGRAPH_CONFIG`.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the refgraph configuration layers.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A config layer exists but could not be read
    #[error("failed to read refgraph config '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config layer is not valid TOML
    #[error("refgraph config '{path}' is not valid TOML: {source}")]
    ParseToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// `RefgraphConfig` could not be rendered back to TOML
    #[error("failed to render refgraph config as TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `config set` or `config init` could not write the layer
    #[error("failed to write refgraph config '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The `.refgraph` directory could not be created
    #[error("failed to create refgraph config directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No home directory, so there is no global layer to write
    #[error("could not determine home directory for ~/.refgraph/config.toml")]
    NoHomeDir,

    /// A known key holds a value the indexer cannot use, e.g.
    /// `indexer.usr_byte_size` above the hash width or an unknown
    /// `indexer.templates` mode
    #[error("invalid refgraph setting '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// The merged layers do not deserialize into `RefgraphConfig`
    #[error("merged refgraph config does not match the schema: {0}")]
    ValidationError(String),
}

impl ConfigError {
    /// Wrap an I/O failure while reading the layer at `path`.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Wrap a TOML syntax error in the layer at `path`.
    pub fn parse_toml(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.into(),
            source,
        }
    }

    pub fn write_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.into(),
            source,
        }
    }

    pub fn create_dir(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.into(),
            source,
        }
    }

    /// Reject `message` for the dotted setting `key` (`indexer.templates`).
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
