//! # QDMS CLI Module
//!
//! This module implements the CLI interface for QDMS.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `init` - Initialize the database and seed the admin user
//! - `status` - Show collection counts

mod commands;

use clap::{Parser, Subcommand};
use qdms_core::QdmsError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// QDMS - Quality Document Management Server
///
/// Controlled documents with staged approval, read receipts, and the
/// quality record families (complaints, CAPA, audits, risks, calibration).
#[derive(Parser, Debug)]
#[command(name = "qdms")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the record database
    #[arg(short = 'D', long, global = true, default_value = "qdms.redb")]
    pub database: PathBuf,

    /// Path to an optional qdms.toml configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Initialize the database and seed the admin user + default roles
    Init {
        /// Admin username
        #[arg(long, default_value = "admin")]
        admin_username: String,

        /// Admin password
        #[arg(long)]
        admin_password: String,
    },

    /// Show collection counts
    Status,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), QdmsError> {
    let json_mode = cli.json_mode;
    let config_path = cli.config.as_deref();

    match cli.command {
        Some(Commands::Server { host, port }) => {
            cmd_server(&cli.database, config_path, host, port).await
        }
        Some(Commands::Init {
            admin_username,
            admin_password,
        }) => cmd_init(&cli.database, &admin_username, &admin_password, json_mode),
        // No subcommand - show status by default
        Some(Commands::Status) | None => cmd_status(&cli.database, json_mode),
    }
}
