//! Folio CLI
//!
//! Command-line tools for Folio libraries.
//!
//! # Commands
//!
//! - `merge` - Merge two manifest files and print the result
//! - `validate` - Check every record of a manifest file
//! - `checkpoint` - List, create, inspect and restore checkpoints
//! - `sync` - Run one sync cycle against a folder remote

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Folio library tools.
#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the library directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge a local and a remote manifest file
    Merge {
        /// Local manifest (its device id is kept)
        local: PathBuf,

        /// Remote manifest
        remote: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate every record of a manifest file
    Validate {
        /// Manifest file
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Manage checkpoints of a library
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },

    /// Run one sync cycle against a folder remote
    Sync {
        /// Remote folder holding manifest.json
        #[arg(short, long)]
        remote: PathBuf,

        /// Device id (defaults to the one stored in the library)
        #[arg(short, long)]
        device: Option<String>,

        /// Sign-in strategy (mock, web, native)
        #[arg(short, long, default_value = "mock")]
        auth: String,

        /// Keep backups of the pre-sync manifest in this folder
        #[arg(short, long)]
        backup_dir: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// List checkpoints, newest first
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Checkpoint the library now
    Create {
        /// What caused the checkpoint
        #[arg(short, long, default_value = "manual")]
        trigger: String,
    },

    /// Compare a checkpoint with the library without changing anything
    Inspect {
        /// Checkpoint id
        id: u64,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Replace the library with a checkpoint
    Restore {
        /// Checkpoint id
        id: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Merge {
            local,
            remote,
            output,
        } => {
            commands::merge::run(&local, &remote, output.as_deref())?;
        }
        Commands::Validate { file, format } => {
            commands::validate::run(&file, &format)?;
        }
        Commands::Checkpoint { action } => {
            let path = cli.path.ok_or("Library path required for checkpoint")?;
            match action {
                CheckpointAction::List { format } => commands::checkpoint::list(&path, &format)?,
                CheckpointAction::Create { trigger } => {
                    commands::checkpoint::create(&path, &trigger)?
                }
                CheckpointAction::Inspect { id, format } => {
                    commands::checkpoint::inspect(&path, id, &format)?
                }
                CheckpointAction::Restore { id } => commands::checkpoint::restore(&path, id)?,
            }
        }
        Commands::Sync {
            remote,
            device,
            auth,
            backup_dir,
            format,
        } => {
            let path = cli.path.ok_or("Library path required for sync")?;
            let options = commands::sync::SyncOptions {
                remote,
                device,
                auth: commands::sync::parse_auth(&auth)?,
                backup_dir,
            };
            commands::sync::run(&path, options, &format)?;
        }
        Commands::Version => {
            println!("Folio CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Folio Core v{}", folio_core::VERSION);
        }
    }

    Ok(())
}
