//! rowferry command line interface.

mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rowferry", version, about = "Batch relational data mover")]
struct Cli {
    /// Log level when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline end to end.
    Run {
        /// Pipeline YAML file.
        pipeline: PathBuf,
        /// Target SQLite database file.
        #[arg(long)]
        database: PathBuf,
        /// Separate source database for direct pipelines; defaults to the
        /// target database.
        #[arg(long)]
        source_database: Option<PathBuf>,
    },
    /// Parse a pipeline and print the SQL it would run.
    Check {
        /// Pipeline YAML file.
        pipeline: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            pipeline,
            database,
            source_database,
        } => commands::run(&pipeline, &database, source_database.as_deref()).await,
        Commands::Check { pipeline } => commands::check(&pipeline),
    };

    if let Err(err) = result {
        tracing::error!(error = %err, "Command failed");
        std::process::exit(1);
    }
}
