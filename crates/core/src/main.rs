//! Headwind CMS operator CLI.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use headwind_core::collection::CollectionRegistry;
use headwind_core::config::Config;
use headwind_core::{cli, db, plugin};

#[derive(Parser, Debug)]
#[command(name = "headwind", version, about = "Headwind CMS core tooling")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Schema migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Collection configs
    Collections {
        #[command(subcommand)]
        action: CollectionsAction,
    },
    /// Installed plugins
    Plugins {
        #[command(subcommand)]
        action: PluginsAction,
    },
    /// Stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Persisted system logs
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },
    /// Run migrations, sync collections and install core plugins
    Init,
}

#[derive(Subcommand, Debug)]
enum MigrateAction {
    /// Show applied and pending migrations
    Status,
    /// Apply pending migrations
    Run,
    /// Check the schema for missing tables and columns
    Validate,
}

#[derive(Subcommand, Debug)]
enum CollectionsAction {
    /// Sync config files into the database
    Sync,
    /// List stored collections
    List,
}

#[derive(Subcommand, Debug)]
enum PluginsAction {
    /// List installed plugins
    List,
    /// Install or upgrade the core plugins
    Bootstrap {
        /// Also install the demo plugins
        #[arg(long)]
        demo: bool,
    },
    /// Activate a plugin
    Activate { name: String },
    /// Deactivate a plugin
    Deactivate { name: String },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print a setting
    Get { category: String, key: String },
    /// Store a setting (JSON value)
    Set {
        category: String,
        key: String,
        value: String,
    },
}

#[derive(Subcommand, Debug)]
enum LogsAction {
    /// Delete entries past their retention
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    debug!(url = %config.database_url, "configuration loaded");

    let pool = db::create_pool(&config).await?;

    match args.command {
        Command::Migrate { action } => match action {
            MigrateAction::Status => cli::cmd_migrate_status(&pool).await,
            MigrateAction::Run => cli::cmd_migrate_run(&pool).await,
            MigrateAction::Validate => cli::cmd_migrate_validate(&pool).await,
        },
        Command::Collections { action } => {
            let registry = CollectionRegistry::with_dir(config.collections_dir.clone());
            match action {
                CollectionsAction::Sync => cli::cmd_collections_sync(&pool, &registry).await,
                CollectionsAction::List => cli::cmd_collections_list(&pool).await,
            }
        }
        Command::Plugins { action } => match action {
            PluginsAction::List => plugin::cli::cmd_plugin_list(&pool).await,
            PluginsAction::Bootstrap { demo } => plugin::cli::cmd_plugin_bootstrap(&pool, demo).await,
            PluginsAction::Activate { name } => plugin::cli::cmd_plugin_activate(&pool, &name).await,
            PluginsAction::Deactivate { name } => {
                plugin::cli::cmd_plugin_deactivate(&pool, &name).await
            }
        },
        Command::Settings { action } => match action {
            SettingsAction::Get { category, key } => {
                cli::cmd_settings_get(&pool, &category, &key).await
            }
            SettingsAction::Set {
                category,
                key,
                value,
            } => cli::cmd_settings_set(&pool, &category, &key, &value).await,
        },
        Command::Logs { action } => match action {
            LogsAction::Cleanup => cli::cmd_logs_cleanup(&pool).await,
        },
        Command::Init => {
            let registry = CollectionRegistry::with_dir(config.collections_dir.clone());
            cli::cmd_init(&pool, &registry).await
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
