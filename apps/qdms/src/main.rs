//! # QDMS - Quality Document Management Server
//!
//! The main binary for the QDMS backend.
//!
//! This application provides:
//! - HTTP REST API server (axum-based, under `/api`)
//! - CLI interface for operating the store
//!
//! ## Usage
//!
//! ```bash
//! # Initialize the database and seed the admin user
//! qdms init --admin-password change-me
//!
//! # Start the HTTP server
//! qdms server --host 0.0.0.0 --port 8080
//!
//! # Inspect collection counts
//! qdms status --json-mode
//! ```

use clap::Parser;
use qdms::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing. QDMS_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("QDMS_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "qdms=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the QDMS startup banner.
fn print_banner() {
    println!(
        r#"
   ██████╗ ██████╗ ███╗   ███╗███████╗
  ██╔═══██╗██╔══██╗████╗ ████║██╔════╝
  ██║   ██║██║  ██║██╔████╔██║███████╗
  ██║▄▄ ██║██║  ██║██║╚██╔╝██║╚════██║
  ╚██████╔╝██████╔╝██║ ╚═╝ ██║███████║
   ╚══▀▀═╝ ╚═════╝ ╚═╝     ╚═╝╚══════╝

  Quality Document Management Server v{}

  Controlled • Traceable • Auditable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
