//! Katalogus CLI - manage the per-organisation plugin catalog
//!
//! Thin front end over `katalogus-core`: catalog commands build the plugin
//! service from the configuration and call one service operation; `config`
//! commands read and write the configuration file itself.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use katalogus_core::{ConfigManager, Plugin, PluginService, Repository, create_plugin_service};

#[derive(Parser)]
#[command(name = "katalogus")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Per-organisation plugin catalog", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse and enable plugins
    #[command(subcommand)]
    Plugins(PluginCommands),

    /// Manage plugin settings
    #[command(subcommand)]
    Settings(SettingsCommands),

    /// Manage plugin repositories
    #[command(subcommand)]
    Repositories(RepositoryCommands),

    /// Show or change the configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Write the current configuration to the config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Set one value, e.g. `storage.backend memory`, and save
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum PluginCommands {
    /// List every plugin visible to an organisation
    List {
        #[arg(long)]
        org: String,
    },

    /// Show plugin details
    Show {
        #[arg(long)]
        org: String,
        /// Repository the plugin belongs to
        #[arg(long, default_value = "LOCAL")]
        repository: String,
        plugin: String,
    },

    /// Enable a plugin
    Enable {
        #[arg(long)]
        org: String,
        #[arg(long, default_value = "LOCAL")]
        repository: String,
        plugin: String,
    },

    /// Disable a plugin
    Disable {
        #[arg(long)]
        org: String,
        #[arg(long, default_value = "LOCAL")]
        repository: String,
        plugin: String,
    },

    /// Print the settings schema of a plugin
    Schema { plugin: String },
}

#[derive(Subcommand)]
enum SettingsCommands {
    /// List the settings of a plugin
    List {
        #[arg(long)]
        org: String,
        #[arg(long)]
        plugin: String,
    },

    /// Set one setting
    Set {
        #[arg(long)]
        org: String,
        #[arg(long)]
        plugin: String,
        key: String,
        value: String,
    },

    /// Delete one setting, disabling the plugin if it becomes unusable
    Delete {
        #[arg(long)]
        org: String,
        #[arg(long)]
        plugin: String,
        key: String,
    },

    /// Delete all settings of a plugin
    Clear {
        #[arg(long)]
        org: String,
        #[arg(long)]
        plugin: String,
    },
}

#[derive(Subcommand)]
enum RepositoryCommands {
    /// List the repositories of an organisation
    List {
        #[arg(long)]
        org: String,
    },

    /// Register a remote repository
    Add {
        #[arg(long)]
        org: String,
        id: String,
        name: String,
        base_url: String,
    },

    /// Remove a registered repository
    Remove {
        #[arg(long)]
        org: String,
        id: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config_manager = ConfigManager::open(cli.config.clone()).context("Failed to load configuration")?;

    // RUST_LOG wins over both --verbose and the configured level
    let default_filter = if cli.verbose {
        "info,katalogus_core=debug".to_string()
    } else {
        config_manager.config().general.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    debug!("Using configuration {}", config_manager.path().display());

    let build = |config_manager: &ConfigManager| {
        create_plugin_service(config_manager.config()).context("Failed to initialise plugin service")
    };

    match cli.command {
        Commands::Plugins(cmd) => handle_plugin_command(&build(&config_manager)?, cmd),
        Commands::Settings(cmd) => handle_settings_command(&build(&config_manager)?, cmd),
        Commands::Repositories(cmd) => handle_repository_command(&build(&config_manager)?, cmd),
        Commands::Config(cmd) => handle_config_command(&mut config_manager, cmd),
    }
}

fn handle_config_command(config_manager: &mut ConfigManager, cmd: ConfigCommands) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let location = if config_manager.exists() { "" } else { " (not created yet)" };
            println!("{}", style("Configuration:").bold());
            println!();
            println!(
                "  Config file: {}{}",
                style(config_manager.path().display()).dim(),
                location
            );
            println!();
            println!("{}", toml::to_string_pretty(config_manager.config())?);
        }

        ConfigCommands::Init { force } => {
            if config_manager.exists() && !force {
                anyhow::bail!(
                    "{} already exists, use --force to overwrite it",
                    config_manager.path().display()
                );
            }
            config_manager.save()?;
            println!(
                "{}",
                style(format!("Configuration written to {}", config_manager.path().display())).green()
            );
        }

        ConfigCommands::Set { key, value } => {
            config_manager.set(&key, &value)?;
            config_manager.save()?;
            println!("{}", style(format!("Set {} = {}", key, value)).green());
        }
    }

    Ok(())
}

fn status(plugin: &Plugin) -> console::StyledObject<&'static str> {
    if plugin.is_enabled() {
        style("enabled").green()
    } else {
        style("disabled").red()
    }
}

fn handle_plugin_command(service: &PluginService, cmd: PluginCommands) -> anyhow::Result<()> {
    match cmd {
        PluginCommands::List { org } => {
            let plugins = service.get_all(&org)?;
            println!("{}", style(format!("Plugins for {}:", org)).bold());
            println!();

            if plugins.is_empty() {
                println!("  {}", style("No plugins available").dim());
            }
            for plugin in &plugins {
                println!(
                    "  {} {} ({}) {} [{}]",
                    style("•").cyan(),
                    style(plugin.id()).bold(),
                    plugin.plugin_type(),
                    style(plugin.repository_id()).dim(),
                    status(plugin)
                );
            }
        }

        PluginCommands::Show { org, repository, plugin } => {
            let found = service.repository_plugin(&repository, &plugin, &org)?;
            print_plugin(&found);
            if let Some(description) = service.description(&plugin) {
                println!();
                println!("{}", description.trim_end());
            }
        }

        PluginCommands::Enable { org, repository, plugin } => {
            service.update_by_id(&repository, &plugin, &org, true)?;
            println!("{}", style(format!("Plugin '{}' enabled for {}", plugin, org)).green());
        }

        PluginCommands::Disable { org, repository, plugin } => {
            service.update_by_id(&repository, &plugin, &org, false)?;
            println!("{}", style(format!("Plugin '{}' disabled for {}", plugin, org)).green());
        }

        PluginCommands::Schema { plugin } => match service.schema(&plugin) {
            Some(schema) => println!("{}", serde_json::to_string_pretty(&schema)?),
            None => println!("{}", style(format!("Plugin '{}' has no settings schema", plugin)).dim()),
        },
    }

    Ok(())
}

fn print_plugin(plugin: &Plugin) {
    let base = plugin.base();
    println!("{}", style(format!("{}: {}", plugin.plugin_type(), base.name)).bold());
    println!();
    println!("  Id: {}", base.id);
    println!("  Repository: {}", base.repository_id);
    if let Some(version) = &base.version {
        println!("  Version: {}", version);
    }
    if let Some(description) = &base.description {
        println!("  Description: {}", description);
    }
    println!("  Status: {}", status(plugin));

    match plugin {
        Plugin::Boefje(boefje) => {
            println!("  Scan level: {}", boefje.scan_level);
            println!("  Consumes: {}", join(boefje.consumes.iter()));
            println!("  Produces: {}", join(boefje.produces.iter()));
            if !base.environment_keys.is_empty() {
                println!("  Environment keys: {}", join(base.environment_keys.iter()));
            }
        }
        Plugin::Normalizer(normalizer) => {
            println!("  Consumes: {}", join(normalizer.consumes.iter()));
            println!("  Produces: {}", join(normalizer.produces.iter()));
        }
        Plugin::Bit(bit) => {
            println!("  Consumes: {}", bit.consumes);
            println!("  Produces: {}", join(bit.produces.iter()));
            println!("  Parameters: {}", join(bit.parameters.iter()));
        }
    }
}

fn join<'a>(items: impl Iterator<Item = &'a String>) -> String {
    let joined = items.map(String::as_str).collect::<Vec<_>>().join(", ");
    if joined.is_empty() { "-".to_string() } else { joined }
}

fn handle_settings_command(service: &PluginService, cmd: SettingsCommands) -> anyhow::Result<()> {
    match cmd {
        SettingsCommands::List { org, plugin } => {
            let settings = service.get_all_settings(&org, &plugin)?;
            println!("{}", style(format!("Settings of {} for {}:", plugin, org)).bold());
            println!();

            if settings.is_empty() {
                println!("  {}", style("No settings").dim());
            }
            for (key, value) in &settings {
                println!("  {} = {}", style(key).cyan(), value);
            }
        }

        SettingsCommands::Set { org, plugin, key, value } => {
            service.upsert_settings(&BTreeMap::from([(key.clone(), value)]), &org, &plugin)?;
            println!("{}", style(format!("Setting '{}' saved", key)).green());
        }

        SettingsCommands::Delete { org, plugin, key } => {
            service.delete_setting_by_key(&key, &org, &plugin)?;
            println!("{}", style(format!("Setting '{}' deleted", key)).green());
        }

        SettingsCommands::Clear { org, plugin } => {
            service.clear_settings(&org, &plugin)?;
            println!("{}", style(format!("Settings of '{}' cleared", plugin)).green());
        }
    }

    Ok(())
}

fn handle_repository_command(service: &PluginService, cmd: RepositoryCommands) -> anyhow::Result<()> {
    match cmd {
        RepositoryCommands::List { org } => {
            println!("{}", style(format!("Repositories for {}:", org)).bold());
            println!();
            for repository in service.repositories(&org)? {
                println!(
                    "  {} {} - {} {}",
                    style("•").cyan(),
                    style(&repository.id).bold(),
                    repository.name,
                    style(&repository.base_url).dim()
                );
            }
        }

        RepositoryCommands::Add { org, id, name, base_url } => {
            service.add_repository(&Repository::new(id.clone(), name, base_url), &org)?;
            println!("{}", style(format!("Repository '{}' added", id)).green());
        }

        RepositoryCommands::Remove { org, id } => {
            service.remove_repository(&id, &org)?;
            println!("{}", style(format!("Repository '{}' removed", id)).green());
        }
    }

    Ok(())
}
