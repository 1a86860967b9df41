use std::path::{Path, PathBuf};

use console::style;
use tracing::{info, warn};

use crate::Result;
use crate::config::{Config, FailurePolicy, show_config};
use crate::database::VectorStore;
use crate::display::{print_generated_answer, print_search_results};
use crate::embeddings::EmbeddingClient;
use crate::generation::CompletionClient;
use crate::ingest::PdfDirectory;
use crate::session::{GeneratedAnswer, IngestReport, SearchResponse, with_session};

/// Load configuration from `config_dir`, or the user's configuration directory
#[inline]
pub fn load_config(config_dir: Option<&Path>) -> Result<Config> {
    let config = match config_dir {
        Some(dir) => Config::load_with_env(dir)?,
        None => Config::load_default()?,
    };
    Ok(config)
}

fn resolve_collection(config: &Config, collection: Option<String>) -> String {
    collection.unwrap_or_else(|| config.database.collection.clone())
}

/// Embed every page of every PDF in `directory` into the collection
#[inline]
pub async fn ingest_directory(
    config: &Config,
    directory: PathBuf,
    collection: Option<String>,
    cleanup: bool,
    skip_failures: bool,
) -> Result<IngestReport> {
    let collection = resolve_collection(config, collection);
    let on_error = if skip_failures {
        FailurePolicy::Skip
    } else {
        config.ingest.on_error
    };

    info!(
        "Ingesting PDFs from {} into '{}'",
        directory.display(),
        collection
    );

    let embedder = EmbeddingClient::new(config)?;
    let source = PdfDirectory::new(directory).with_failure_policy(on_error);

    let report = with_session(config, &collection, embedder, move |session| {
        Box::pin(async move { session.create_db(&source, cleanup).await })
    })
    .await?;

    for skipped in &report.skipped {
        warn!("Skipped {}: {}", skipped.path.display(), skipped.reason);
        eprintln!(
            "{} {} ({})",
            style("Skipped").yellow(),
            skipped.path.display(),
            skipped.reason
        );
    }

    if report.collection_dropped {
        eprintln!("Dropped existing collection '{}'", collection);
    }
    eprintln!(
        "{} {} pages from {} files into '{}'",
        style("Stored").green().bold(),
        report.chunks_stored,
        report.files_processed,
        collection
    );

    Ok(report)
}

/// Print the pages most similar to `query`
#[inline]
pub async fn search_pages(
    config: &Config,
    query: String,
    collection: Option<String>,
    limit: Option<usize>,
) -> Result<SearchResponse> {
    let collection = resolve_collection(config, collection);
    let limit = limit.unwrap_or(config.search.limit);
    let embedder = EmbeddingClient::new(config)?;

    let response = with_session(config, &collection, embedder, move |session| {
        Box::pin(async move { session.search(&query, limit).await })
    })
    .await?;

    print_search_results(&response);
    Ok(response)
}

/// Search, then have the completion model carry out `task` over the matches
#[inline]
pub async fn ask(
    config: &Config,
    query: String,
    task: String,
    collection: Option<String>,
    limit: Option<usize>,
) -> Result<GeneratedAnswer> {
    let collection = resolve_collection(config, collection);
    let limit = limit.unwrap_or(config.search.limit);
    let embedder = EmbeddingClient::new(config)?;
    let generator = CompletionClient::new(config)?;

    let answer = with_session(config, &collection, embedder, move |session| {
        Box::pin(async move {
            session
                .search_and_answer(&generator, &query, &task, limit)
                .await
        })
    })
    .await?;

    print_generated_answer(&answer);
    Ok(answer)
}

/// Show the vector store location and its collections
#[inline]
pub async fn show_status(config: &Config, collection: Option<String>) -> Result<()> {
    let collection = resolve_collection(config, collection);

    println!("{}", style("Vector Store Status").bold().cyan());
    println!("{}", "=".repeat(40));

    let store = match VectorStore::open(config).await {
        Ok(store) => {
            println!("  {} LanceDB: {}", style("ok").green(), store.uri());
            store
        }
        Err(e) => {
            println!("  {} LanceDB: {}", style("failed").red(), e);
            return Err(e);
        }
    };

    let names = store.collection_names().await?;
    if names.is_empty() {
        println!("  No collections yet.");
    } else {
        println!("  Collections: {}", names.join(", "));
    }

    if names.iter().any(|name| *name == collection) {
        let count = store.count(&collection).await?;
        let dimension = store.vector_dimension(&collection).await?;
        println!(
            "  '{}': {} records, {} dimensions",
            collection, count, dimension
        );
    } else {
        println!(
            "  '{}': {}",
            collection,
            style("not created (run `pdf-retrieval ingest <DIR>`)").yellow()
        );
    }

    match config.api_key() {
        Ok(_) => println!("  {} API key", style("ok").green()),
        Err(e) => println!("  {} {}", style("missing").red(), e),
    }

    store.close();
    Ok(())
}

/// Show the configuration, or write it to disk when it does not exist yet
#[inline]
pub fn configure(config: &Config, show: bool) -> Result<()> {
    if show {
        show_config(config);
        return Ok(());
    }

    let path = config.config_file_path();
    if path.exists() {
        eprintln!("Configuration already exists at {}", path.display());
    } else {
        config.save()?;
        eprintln!(
            "{} default configuration to {}",
            style("Wrote").green(),
            path.display()
        );
    }
    show_config(config);
    Ok(())
}
