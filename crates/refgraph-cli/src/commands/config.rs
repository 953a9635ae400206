//! Config command - View and manage configuration
//!
//! Provides commands for viewing and modifying Refgraph configuration:
//! - Show the merged configuration
//! - Get or set a single value (local or global)
//! - Show or create configuration files

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use refgraph_config::{ConfigLoader, RefgraphConfig};
use serde::Serialize;

use super::{load_config, working_dir};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the effective configuration
    Show(ShowArgs),

    /// Get a specific configuration value
    Get(GetArgs),

    /// Set a configuration value
    Set(SetArgs),

    /// Show configuration file paths
    Path(PathArgs),

    /// Write a default configuration file
    Init(InitArgs),
}

/// Arguments for the show command
#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Output as JSON instead of TOML
    #[arg(long)]
    json: bool,
}

/// Arguments for the get command
#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Configuration key (e.g., "indexer.templates")
    key: String,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the set command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Configuration key (e.g., "indexer.templates")
    key: String,

    /// Value to set
    value: String,

    /// Set in global config (~/.refgraph/config.toml) instead of local
    #[arg(long)]
    global: bool,
}

/// Arguments for the path command
#[derive(clap::Args, Debug)]
pub struct PathArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Arguments for the init command
#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Create the global config instead of the local one
    #[arg(long)]
    global: bool,
}

/// Configuration paths
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    /// Global config file path
    pub global: Option<PathBuf>,
    /// Local config file path
    pub local: PathBuf,
    /// Whether global config exists
    pub global_exists: bool,
    /// Whether local config exists
    pub local_exists: bool,
}

/// Execute the config command
pub fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    match cmd {
        ConfigCommand::Show(args) => execute_show(args, global),
        ConfigCommand::Get(args) => execute_get(args, global),
        ConfigCommand::Set(args) => execute_set(args),
        ConfigCommand::Path(args) => execute_path(args),
        ConfigCommand::Init(args) => execute_init(args, global),
    }
}

fn execute_show(args: ShowArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global, None)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        print!("{}", toml::to_string_pretty(&config)?);
    }
    Ok(())
}

fn execute_get(args: GetArgs, global: GlobalOptions) -> Result<()> {
    let config = load_config(&global, None)?;

    let value = get_config_value(&config, &args.key)
        .ok_or_else(|| anyhow::anyhow!("Unknown configuration key: {}", args.key))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match value {
            serde_json::Value::String(s) => println!("{}", s),
            serde_json::Value::Bool(b) => println!("{}", b),
            serde_json::Value::Number(n) => println!("{}", n),
            serde_json::Value::Null => println!("null"),
            other => println!("{}", serde_json::to_string_pretty(&other)?),
        }
    }
    Ok(())
}

fn execute_set(args: SetArgs) -> Result<()> {
    let workspace_path = working_dir()?;
    let mut loader = ConfigLoader::new();

    let mut config = if args.global {
        loader.load_global()?.unwrap_or_default()
    } else {
        loader.load_local(&workspace_path)?.unwrap_or_default()
    };

    set_config_value(&mut config, &args.key, &args.value)
        .with_context(|| format!("Failed to set configuration key: {}", args.key))?;
    config.validate()?;

    if args.global {
        loader.save_global(&config)?;
        println!("Set {} = {} in global config", args.key, args.value);
    } else {
        loader.save_local(&workspace_path, &config)?;
        println!("Set {} = {} in local config", args.key, args.value);
    }
    Ok(())
}

fn execute_path(args: PathArgs) -> Result<()> {
    let workspace_path = working_dir()?;
    let loader = ConfigLoader::new();

    let global_path = loader.global_config_path();
    let local_path = loader.local_config_path(&workspace_path);

    let paths = ConfigPaths {
        global_exists: global_path.as_ref().is_some_and(|p| p.exists()),
        global: global_path,
        local_exists: local_path.exists(),
        local: local_path,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&paths)?);
    } else {
        let status = |exists: bool| if exists { "exists" } else { "not found" };
        match paths.global {
            Some(ref gp) => println!("Global: {} ({})", gp.display(), status(paths.global_exists)),
            None => println!("Global: not available (no home directory)"),
        }
        println!("Local:  {} ({})", paths.local.display(), status(paths.local_exists));
    }
    Ok(())
}

fn execute_init(args: InitArgs, global: GlobalOptions) -> Result<()> {
    let loader = ConfigLoader::new();
    let path = if args.global {
        loader.init_global()?
    } else {
        loader.init_local(&working_dir()?)?
    };

    if !global.quiet {
        println!("{}", path.display());
    }
    Ok(())
}

/// Get a configuration value by key path
fn get_config_value(config: &RefgraphConfig, key: &str) -> Option<serde_json::Value> {
    let json = serde_json::to_value(config).ok()?;
    key.split('.')
        .try_fold(&json, |current, part| current.get(part))
        .cloned()
}

/// Set a configuration value by key path
fn set_config_value(config: &mut RefgraphConfig, key: &str, value: &str) -> Result<()> {
    match key {
        // Indexer
        "indexer.on_unimplemented" => config.indexer.on_unimplemented = value.parse()?,
        "indexer.templates" => config.indexer.templates = value.parse()?,
        "indexer.verbosity" => config.indexer.verbosity = value.parse()?,
        "indexer.usr_byte_size" => config.indexer.usr_byte_size = value.parse()?,
        "indexer.forward_decl_comments.cpp" => {
            config.indexer.forward_decl_comments.cpp = value.parse()?
        }
        "indexer.forward_decl_comments.objc" => {
            config.indexer.forward_decl_comments.objc = value.parse()?
        }

        // Output
        "output.format" => config.output.format = value.parse()?,
        "output.pretty" => config.output.pretty = value.parse()?,

        // Logging
        "logging.level" => config.logging.level = value.to_string(),

        _ => anyhow::bail!("Unknown or read-only configuration key: {}", key),
    }
    Ok(())
}
