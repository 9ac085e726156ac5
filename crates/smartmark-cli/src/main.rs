//! Smartmark CLI
//!
//! Command-line shell for Smartmark - bookmarks synced to a hosted backend.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use smartmark_core::Config;

mod commands;
mod metadata;
mod output;
mod prompt;

use commands::Context as AppContext;
use output::{Output, OutputFormat};

#[derive(Parser)]
#[command(name = "smartmark")]
#[command(about = "Smartmark - bookmarks with realtime sync")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use a specific config file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with Google
    Login {
        /// Callback URL to complete with (skips the prompt)
        #[arg(long)]
        callback: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// List bookmarks
    #[command(alias = "ls")]
    List,
    /// Save a bookmark
    Add {
        /// URL to save
        url: String,
        /// Title (fetched from the page if omitted)
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// Description
        #[arg(short, long)]
        description: Option<String>,
        /// Tags to add
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// Edit a bookmark
    Edit {
        /// Bookmark ID (full or prefix)
        id: String,
        /// New title
        #[arg(short = 'T', long)]
        title: Option<String>,
        /// New description
        #[arg(short, long)]
        description: Option<String>,
        /// Replace the tags
        #[arg(short, long)]
        tag: Vec<String>,
    },
    /// Delete a bookmark
    #[command(alias = "rm")]
    Delete {
        /// Bookmark ID (full or prefix)
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Follow changes live until interrupted
    Watch,
    /// Show session and backend status
    Status,
    /// Show or set configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (data_dir, supabase_url, supabase_anon_key, site_url, realtime_enabled, log_file)
        key: String,
        /// Configuration value
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let output = Output::new(OutputFormat::from_flags(cli.json, cli.quiet));

    // Config commands work without a backend
    if let Commands::Config { command } = &cli.command {
        let path = cli.config.as_ref();
        return match command.clone() {
            Some(ConfigCommands::Show) | None => commands::config::show(path, &output),
            Some(ConfigCommands::Set { key, value }) => {
                commands::config::set(key, value, path, &output)
            }
        };
    }

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config);

    if let Commands::Status = cli.command {
        return commands::status::show(&config, &output).await;
    }

    let ctx = AppContext::open(config)?;

    match cli.command {
        Commands::Login { callback } => commands::auth::login(&ctx, callback, &output).await,
        Commands::Logout => commands::auth::logout(&ctx, &output).await,
        Commands::List => commands::bookmark::list(&ctx, &output).await,
        Commands::Add {
            url,
            title,
            description,
            tag,
        } => commands::bookmark::add(&ctx, url, title, description, tag, &output).await,
        Commands::Edit {
            id,
            title,
            description,
            tag,
        } => commands::bookmark::edit(&ctx, id, title, description, tag, &output).await,
        Commands::Delete { id, yes } => commands::bookmark::delete(&ctx, id, yes, &output).await,
        Commands::Watch => commands::watch::run(&ctx, &output).await,
        Commands::Status | Commands::Config { .. } => Ok(()),
    }
}

/// Load configuration from `path`, or the default location
pub(crate) fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")
}

/// Initialize file logging when SMARTMARK_LOG is set
fn init_logging(config: &Config) {
    let Ok(log_level) = std::env::var("SMARTMARK_LOG") else {
        return;
    };

    let log_path = config.log_path();
    let log_file = match File::create(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not create log file {:?}: {}", log_path, e);
            return;
        }
    };

    let env_filter = EnvFilter::new(format!(
        "smartmark_core={},smartmark_cli={}",
        log_level, log_level
    ));

    // ignore error if already initialized
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(log_file)
        .try_init();

    info!("Logging initialized to {:?}", log_path);
}
