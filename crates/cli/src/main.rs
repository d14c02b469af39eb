//! Atelier CLI - migrations, offline cache management and the kiosk proxy.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! atelier migrate
//!
//! # List portfolios from the CMS
//! atelier portfolios
//!
//! # Cache a portfolio for offline viewing (the site must be reachable)
//! atelier cache clx9portfolio
//!
//! # Show cache usage and cached portfolios
//! atelier status
//! atelier records
//!
//! # Delete every cache and record
//! atelier clear --yes
//!
//! # Serve the site through the offline caches on localhost:8080
//! atelier proxy --port 8080
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "atelier")]
#[command(author, version, about = "Atelier CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// List portfolios available in the CMS
    Portfolios,
    /// Cache a portfolio for offline viewing
    Cache {
        /// CMS id of the portfolio
        portfolio_id: String,
    },
    /// Show cache usage
    Status,
    /// Print cached portfolio records as JSON
    Records,
    /// Delete every cache and cached portfolio record
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Serve the site through the offline caches
    Proxy {
        /// Local port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Portfolios => commands::content::list_portfolios().await?,
        Commands::Cache { portfolio_id } => commands::offline::cache(&portfolio_id).await?,
        Commands::Status => commands::offline::status().await?,
        Commands::Records => commands::offline::records().await?,
        Commands::Clear { yes } => commands::offline::clear(yes).await?,
        Commands::Proxy { port } => commands::proxy::serve(port).await?,
    }
    Ok(())
}
