//! Refgraph Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.refgraph/config.toml`
//! - Local config: `.refgraph/config.toml` (in the working directory)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Log levels accepted by `[logging] level`.
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Widest external identifier hash, in bytes (a full SHA-256).
pub const MAX_USR_BYTE_SIZE: u8 = 32;

/// Root configuration for Refgraph.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RefgraphConfig {
    /// Indexer behaviour switches
    pub indexer: IndexerConfig,

    /// Output configuration
    pub output: OutputConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

// ============================================================================
// Indexer
// ============================================================================

/// What to do with constructs the indexer has no rule for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnimplementedMode {
    Abort,
    #[default]
    Continue,
}

/// Whether implicit template instantiations are visited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TemplateMode {
    Skip,
    #[default]
    Visit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VerbosityMode {
    #[default]
    Full,
    Common,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommentMode {
    #[default]
    Emit,
    Ignore,
}

macro_rules! keyword_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($name::$variant => write!(f, $text),)+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(ConfigError::invalid_value(
                        stringify!($name),
                        format!("unknown value '{s}'"),
                    )),
                }
            }
        }
    };
}

keyword_enum!(UnimplementedMode { Abort => "abort", Continue => "continue" });
keyword_enum!(TemplateMode { Skip => "skip", Visit => "visit" });
keyword_enum!(VerbosityMode { Full => "full", Common => "common" });
keyword_enum!(CommentMode { Emit => "emit", Ignore => "ignore" });

/// Forward-declaration comment handling per dialect family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct ForwardDeclCommentConfig {
    /// C and C++
    pub cpp: CommentMode,
    /// Objective-C and Objective-C++
    pub objc: CommentMode,
}

/// Indexer configuration.
///
/// # Example TOML
///
/// ```toml
/// [indexer]
/// on_unimplemented = "abort"
/// templates = "skip"
/// verbosity = "common"
/// usr_byte_size = 8
///
/// [indexer.forward_decl_comments]
/// objc = "ignore"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct IndexerConfig {
    pub on_unimplemented: UnimplementedMode,
    pub templates: TemplateMode,
    pub verbosity: VerbosityMode,
    pub forward_decl_comments: ForwardDeclCommentConfig,
    /// Bytes of hash kept for external identifiers (0 disables them)
    pub usr_byte_size: u8,
}

// ============================================================================
// Output
// ============================================================================

/// Shape of the `index` command's output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON object per fact
    #[default]
    Jsonl,
    /// Node and edge counts per translation unit
    Graph,
}

keyword_enum!(OutputFormat { Jsonl => "jsonl", Graph => "graph" });

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Pretty-print the graph summary
    pub pretty: bool,
}

// ============================================================================
// Logging
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error, off) or an `EnvFilter`
    /// directive such as `refgraph_core=debug`
    pub level: String,

    /// Log format (text, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON structured logging
    Json,
}

// ============================================================================
// Overrides
// ============================================================================

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub on_unimplemented: Option<UnimplementedMode>,
    pub templates: Option<TemplateMode>,
    pub verbosity: Option<VerbosityMode>,
    pub usr_byte_size: Option<u8>,
    pub output_format: Option<OutputFormat>,

    /// Override log level
    pub log_level: Option<String>,
}

impl RefgraphConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(mode) = overrides.on_unimplemented {
            self.indexer.on_unimplemented = mode;
        }
        if let Some(mode) = overrides.templates {
            self.indexer.templates = mode;
        }
        if let Some(mode) = overrides.verbosity {
            self.indexer.verbosity = mode;
        }
        if let Some(bytes) = overrides.usr_byte_size {
            self.indexer.usr_byte_size = bytes;
        }
        if let Some(format) = overrides.output_format {
            self.output.format = format;
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.indexer.usr_byte_size > MAX_USR_BYTE_SIZE {
            return Err(ConfigError::invalid_value(
                "indexer.usr_byte_size",
                format!(
                    "{} exceeds the {MAX_USR_BYTE_SIZE}-byte hash",
                    self.indexer.usr_byte_size
                ),
            ));
        }
        validate_log_level(&self.logging.level)
    }
}

/// Accept a bare level or `EnvFilter` directives whose levels are known.
fn validate_log_level(level: &str) -> Result<(), ConfigError> {
    let known = |l: &str| LOG_LEVELS.contains(&l.trim().to_lowercase().as_str());
    let valid = !level.trim().is_empty()
        && level.split(',').all(|directive| match directive.rsplit_once('=') {
            Some((target, l)) => !target.trim().is_empty() && known(l),
            None => known(directive),
        });
    if valid {
        Ok(())
    } else {
        Err(ConfigError::invalid_value(
            "logging.level",
            format!("unknown log level '{level}'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = RefgraphConfig::default();
        assert_eq!(config.indexer.on_unimplemented, UnimplementedMode::Continue);
        assert_eq!(config.indexer.templates, TemplateMode::Visit);
        assert_eq!(config.indexer.verbosity, VerbosityMode::Full);
        assert_eq!(config.indexer.usr_byte_size, 0);
        assert_eq!(config.output.format, OutputFormat::Jsonl);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = RefgraphConfig::default();
        let overrides = ConfigOverrides {
            templates: Some(TemplateMode::Skip),
            usr_byte_size: Some(8),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };

        config.apply_overrides(&overrides);

        assert_eq!(config.indexer.templates, TemplateMode::Skip);
        assert_eq!(config.indexer.usr_byte_size, 8);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.indexer.on_unimplemented, UnimplementedMode::Continue);
    }

    #[test]
    fn test_validate_usr_byte_size() {
        let mut config = RefgraphConfig::default();
        config.indexer.usr_byte_size = 32;
        assert!(config.validate().is_ok());

        config.indexer.usr_byte_size = 33;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("indexer.usr_byte_size"));
    }

    #[test]
    fn test_validate_log_level() {
        for level in ["info", "WARN", "refgraph_core=trace", "info,refgraph_core=debug"] {
            assert!(validate_log_level(level).is_ok(), "{level}");
        }
        for level in ["", "loud", "refgraph_core=loud", "=debug"] {
            assert!(validate_log_level(level).is_err(), "{level}");
        }
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("abort".parse::<UnimplementedMode>().unwrap(), UnimplementedMode::Abort);
        assert_eq!("Visit".parse::<TemplateMode>().unwrap(), TemplateMode::Visit);
        assert_eq!("common".parse::<VerbosityMode>().unwrap(), VerbosityMode::Common);
        assert_eq!("graph".parse::<OutputFormat>().unwrap(), OutputFormat::Graph);
        assert!("sometimes".parse::<CommentMode>().is_err());
        assert_eq!(CommentMode::Ignore.to_string(), "ignore");
    }

    #[test]
    fn test_indexer_config_toml() {
        let config: RefgraphConfig = toml::from_str(
            r#"
            [indexer]
            on_unimplemented = "abort"
            usr_byte_size = 4

            [indexer.forward_decl_comments]
            objc = "ignore"

            [output]
            format = "graph"
            pretty = true
            "#,
        )
        .unwrap();

        assert_eq!(config.indexer.on_unimplemented, UnimplementedMode::Abort);
        assert_eq!(config.indexer.templates, TemplateMode::Visit);
        assert_eq!(config.indexer.usr_byte_size, 4);
        assert_eq!(config.indexer.forward_decl_comments.cpp, CommentMode::Emit);
        assert_eq!(config.indexer.forward_decl_comments.objc, CommentMode::Ignore);
        assert_eq!(config.output.format, OutputFormat::Graph);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut config = RefgraphConfig::default();
        config.indexer.verbosity = VerbosityMode::Common;
        config.logging.format = LogFormat::Json;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: RefgraphConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
