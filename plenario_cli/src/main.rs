mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "plenario")]
#[command(about = "Collect and reconcile Brazilian federal legislative data")]
struct Cli {
    /// Output format: table or json
    #[arg(long, default_value = "table", global = true)]
    output: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a collection pipeline for one target (or all of them)
    Collect(Box<commands::collect::CollectArgs>),
    /// List legislators from the Câmara API
    Legislators(commands::legislators::LegislatorsArgs),
    /// Inspect or clean the local response cache
    Cache(commands::cache::CacheArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("plenario=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        _ => OutputFormat::Table,
    };

    match &cli.command {
        Commands::Collect(args) => commands::collect::run(args.as_ref(), &format).await?,
        Commands::Legislators(args) => commands::legislators::run(args, &format).await?,
        Commands::Cache(args) => commands::cache::run(args, &format)?,
    }

    Ok(())
}
