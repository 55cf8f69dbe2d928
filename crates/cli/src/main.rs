//! voxtask CLI — the main entry point.
//!
//! Commands:
//! - `serve`  — Start the voice gateway (WebSocket + REST)
//! - `query`  — Run one agent turn from the command line
//! - `status` — Show store counts and accumulated API spend

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "voxtask",
    about = "voxtask — voice-driven task assistant server",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send a single query to the agent and print its events
    Query {
        /// The query text
        #[arg(short, long)]
        message: String,
    },

    /// Show system status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Query { message } => commands::query::run(&message).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
