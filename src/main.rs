use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pdf_retrieval::Result;
use pdf_retrieval::commands::{
    ask, configure, ingest_directory, load_config, search_pages, show_status,
};

#[derive(Parser)]
#[command(name = "pdf-retrieval")]
#[command(about = "Embed PDF pages into a vector database and search them")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the local vector database
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write or show the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed every page of the PDFs in a directory
    Ingest {
        /// Directory containing the PDF files
        dir: PathBuf,
        /// Collection to store the pages in
        #[arg(long)]
        collection: Option<String>,
        /// Drop the collection before ingesting
        #[arg(long)]
        cleanup: bool,
        /// Skip unreadable PDFs instead of aborting
        #[arg(long)]
        skip_failures: bool,
    },
    /// Find the pages most similar to a query
    Search {
        query: String,
        #[arg(long)]
        collection: Option<String>,
        /// Maximum number of pages to return
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Search, then have a language model carry out a task over the matches
    Ask {
        query: String,
        /// Instruction given to the model, e.g. "Summarize these pages"
        #[arg(long)]
        task: String,
        #[arg(long)]
        collection: Option<String>,
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Show the state of the vector store
    Status {
        #[arg(long)]
        collection: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            configure(&config, show)?;
        }
        Commands::Ingest {
            dir,
            collection,
            cleanup,
            skip_failures,
        } => {
            ingest_directory(&config, dir, collection, cleanup, skip_failures).await?;
        }
        Commands::Search {
            query,
            collection,
            limit,
        } => {
            search_pages(&config, query, collection, limit).await?;
        }
        Commands::Ask {
            query,
            task,
            collection,
            limit,
        } => {
            ask(&config, query, task, collection, limit).await?;
        }
        Commands::Status { collection } => {
            show_status(&config, collection).await?;
        }
    }

    Ok(())
}
