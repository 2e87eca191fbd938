use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "odh-cli")]
#[command(about = "Open data catalog harvester command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Reconcile the source catalog feed against the target catalog.
    Harvest {
        /// Also infer and upload structures for created/updated datasets.
        #[arg(long)]
        import_structures: bool,
    },
    /// Infer and upload structures for datasets recorded in the status file.
    ImportStructures,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Harvest {
        import_structures: false,
    }) {
        Commands::Harvest { import_structures } => {
            let summary = odh_sync::run_harvest_from_env(import_structures).await?;
            println!(
                "harvest complete: run_id={} created={} updated={} unchanged={} deleted={} errors={} status={}",
                summary.run_id,
                summary.created,
                summary.updated,
                summary.unchanged,
                summary.deleted,
                summary.errors,
                summary.status_path
            );
        }
        Commands::ImportStructures => {
            let summary = odh_sync::run_structure_import_from_env().await?;
            println!(
                "structure import complete: processed={} structures={} errors={}",
                summary.processed, summary.structures_created, summary.errors
            );
        }
    }

    Ok(())
}
