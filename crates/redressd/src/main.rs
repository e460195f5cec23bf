//! Redress Daemon - complaint management service
//!
//! Serves the HTTP API and seeds sample data.

use anyhow::Result;
use clap::{Parser, Subcommand};
use redress_common::config::{Config, CONFIG_PATH};
use redress_common::credentials::PasswordHasher;
use redress_common::Store;
use redressd::{seed, server};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "redressd")]
#[command(about = "Redress - complaint management service", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: /etc/redress/config.toml, then /var/lib/redress/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,

    /// Load sample accounts and complaints
    Seed {
        /// Wipe existing data first
        #[arg(long)]
        force: bool,
    },

    /// Write a config file with every default filled in
    InitConfig {
        #[arg(default_value = CONFIG_PATH)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = Config::resolve(cli.config.as_deref())?;
            info!("Redress Daemon v{} starting", env!("CARGO_PKG_VERSION"));
            server::run(config).await
        }
        Commands::Seed { force } => {
            let config = Config::resolve(cli.config.as_deref())?;
            let store = Store::open(config.database.location()).await?;
            let hasher = PasswordHasher::new(config.auth.hash_iterations);
            let report = seed::seed(&store, hasher, force).await?;

            println!(
                "Seeded {} users and {} complaints",
                report.users, report.complaints
            );
            println!("  Admin: admin@example.com / Admin@123");
            println!("  Staff: staff@example.com / Staff@123");
            println!("  User:  john@example.com / User@123");
            Ok(())
        }
        Commands::InitConfig { path } => {
            Config::save_default(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
