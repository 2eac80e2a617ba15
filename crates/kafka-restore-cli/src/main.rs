use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "kafka-restore")]
#[command(about = "Replay day-partitioned Kafka archives back into a topic", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a restore operation
    Restore {
        /// Path to the configuration file (environment only if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the days and archive prefixes a restore would read
    Plan {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List archived objects for the configured range or a single day
    List {
        /// Path to the configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Only list this day (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match cli.verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Restore { config, format } => {
            commands::restore::run(config.as_deref(), &format).await?;
        }
        Commands::Plan { config } => {
            commands::plan::run(config.as_deref()).await?;
        }
        Commands::List { config, date } => {
            commands::list::run(config.as_deref(), date).await?;
        }
    }

    Ok(())
}
