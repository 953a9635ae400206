//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.refgraph/config.toml`
//! 2. Local config: `.refgraph/config.toml` (in the working directory)
//! 3. CLI overrides
//!
//! Later sources override earlier ones key by key, so a local file that
//! sets only `[indexer] templates` keeps every other global setting.

use crate::error::ConfigError;
use crate::{ConfigOverrides, RefgraphConfig};
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".refgraph";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".refgraph";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.refgraph`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config table
    global_config: Option<Table>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.refgraph`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a working directory.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a working directory with optional CLI
    /// overrides, then validate it.
    ///
    /// Merges config in order: global → local → overrides.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<RefgraphConfig, ConfigError> {
        let mut merged = Table::new();

        if let Some(global) = self.load_global_table()? {
            merge_tables(&mut merged, global);
        }

        let local_path = self.local_config_path(workspace_root);
        if let Some(local) = load_optional_table(&local_path)? {
            merge_tables(&mut merged, local);
        }

        let mut config = into_config(merged)?;
        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit config file over the global one, ignoring any
    /// local config.
    pub fn load_file(
        &mut self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<RefgraphConfig, ConfigError> {
        let mut merged = self.load_global_table()?.unwrap_or_default();
        merge_tables(&mut merged, load_table(path)?);

        let mut config = into_config(merged)?;
        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<RefgraphConfig>, ConfigError> {
        self.load_global_table()?.map(into_config).transpose()
    }

    /// Load only the local configuration for a working directory.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<RefgraphConfig>, ConfigError> {
        load_optional_table(&self.local_config_path(workspace_root))?
            .map(into_config)
            .transpose()
    }

    fn load_global_table(&mut self) -> Result<Option<Table>, ConfigError> {
        if let Some(ref table) = self.global_config {
            return Ok(Some(table.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        let table = load_optional_table(&global_path)?;
        self.global_config = table.clone();
        Ok(table)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &RefgraphConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        save_config_file(&global_dir.join(CONFIG_FILE_NAME), config)
    }

    /// Save configuration to the local config file.
    pub fn save_local(
        &self,
        workspace_root: &Path,
        config: &RefgraphConfig,
    ) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(workspace_root), config)
    }

    /// Create `~/.refgraph/config.toml` with the defaults unless it exists.
    pub fn init_global(&self) -> Result<PathBuf, ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };
        init_config_file(&global_dir.join(CONFIG_FILE_NAME))
    }

    /// Create `.refgraph/config.toml` with the defaults unless it exists.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        init_config_file(&self.local_config_path(workspace_root))
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

fn load_table(path: &Path) -> Result<Table, ConfigError> {
    debug!("Loading config from {:?}", path);
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    content
        .parse::<Table>()
        .map_err(|e| ConfigError::parse_toml(path, e))
}

fn load_optional_table(path: &Path) -> Result<Option<Table>, ConfigError> {
    if !path.exists() {
        trace!("Config not found at {:?}", path);
        return Ok(None);
    }
    load_table(path).map(Some)
}

fn into_config(table: Table) -> Result<RefgraphConfig, ConfigError> {
    Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ValidationError(e.to_string()))
}

fn init_config_file(path: &Path) -> Result<PathBuf, ConfigError> {
    if !path.exists() {
        save_config_file(path, &RefgraphConfig::default())?;
    }
    Ok(path.to_path_buf())
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &RefgraphConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge `overlay` into `base`; nested tables merge key by key, anything
/// else is replaced.
fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        let Value::Table(nested) = value else {
            base.insert(key, value);
            continue;
        };
        if let Some(Value::Table(existing)) = base.get_mut(&key) {
            merge_tables(existing, nested);
            continue;
        }
        base.insert(key, Value::Table(nested));
    }
}
