//! The orchestrator tying ingestion, embedding and the vector store together.
//!
//! A [`Session`] owns the only connection to the vector store. The connection
//! is released when the session is closed or dropped, so every exit path
//! (success, error, panic) gives it back.

#[cfg(test)]
mod tests;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::Result;
use crate::config::{Config, validate_collection_name};
use crate::database::{EmbeddingRecord, SearchHit, VectorStore};
use crate::embeddings::Embedder;
use crate::generation::{Generator, grouped_task_prompt};
use crate::ingest::{ChunkSource, SkippedFile, TextChunk};
use crate::RetrievalError;

/// Outcome of [`Session::create_db`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files_processed: usize,
    pub chunks_stored: usize,
    pub skipped: Vec<SkippedFile>,
    /// Whether an existing collection was dropped first
    pub collection_dropped: bool,
}

/// A query together with its matches, most similar first
#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub task: String,
    pub response: SearchResponse,
    pub generated: String,
}

pub struct Session<E: Embedder> {
    store: VectorStore,
    collection: String,
    embedder: E,
    dimension: usize,
    batch_size: usize,
    default_limit: usize,
}

impl<E: Embedder> Session<E> {
    /// Connect to the configured vector store and scope the session to `collection`
    #[inline]
    pub async fn connect(config: &Config, collection: &str, embedder: E) -> Result<Self> {
        validate_collection_name(collection)?;
        let store = VectorStore::open(config).await?;

        info!(
            "Opened session for collection '{}' at {}",
            collection,
            store.uri()
        );

        Ok(Self {
            store,
            collection: collection.to_string(),
            embedder,
            dimension: config.embedding.dimension as usize,
            batch_size: (config.embedding.batch_size as usize).max(1),
            default_limit: config.search.limit,
        })
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    /// Build the collection from `source`
    ///
    /// Chunks are extracted and embedded before the collection is touched, so
    /// a source that fails to read or embed leaves the existing collection as
    /// it was. With `cleanup` the collection is dropped and recreated,
    /// otherwise records are added to it, replacing stored chunks with the
    /// same identifier.
    #[inline]
    pub async fn create_db<S>(&mut self, source: &S, cleanup: bool) -> Result<IngestReport>
    where
        S: ChunkSource + Sync + ?Sized,
    {
        let extraction = source.extract_chunks()?;
        info!(
            "Extracted {} chunks from {} files ({} skipped)",
            extraction.chunks.len(),
            extraction.files_processed,
            extraction.skipped.len()
        );

        let records = self.embed_chunks(&extraction.chunks)?;

        let collection_dropped = if cleanup {
            self.store.delete_collection(&self.collection).await?
        } else {
            false
        };

        let chunks_stored = self.store_records(records).await?;

        Ok(IngestReport {
            files_processed: extraction.files_processed,
            chunks_stored,
            skipped: extraction.skipped,
            collection_dropped,
        })
    }

    /// Embed `chunks` and store them, returning how many records were written
    ///
    /// Chunks whose text is blank are not embedded or stored.
    #[inline]
    pub async fn populate_db(&mut self, chunks: &[TextChunk]) -> Result<usize> {
        let records = self.embed_chunks(chunks)?;
        self.store_records(records).await
    }

    /// Number of records in the collection
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        self.store.count(&self.collection).await
    }

    /// Find the chunks most similar to `query`
    ///
    /// A `limit` of zero uses the configured default.
    #[inline]
    pub async fn search(&self, query: &str, limit: usize) -> Result<SearchResponse> {
        let limit = if limit == 0 {
            self.default_limit
        } else {
            limit
        };

        debug!("Searching '{}' for '{}' (limit {})", self.collection, query, limit);

        let query_vector = self.embedder.embed(query)?;
        let hits = self
            .store
            .search(&self.collection, &query_vector, limit)
            .await?;

        Ok(SearchResponse {
            query: query.to_string(),
            hits,
        })
    }

    /// Search, then ask `generator` to carry out `task` over the matched pages
    #[inline]
    pub async fn search_and_answer<G>(
        &self,
        generator: &G,
        query: &str,
        task: &str,
        limit: usize,
    ) -> Result<GeneratedAnswer>
    where
        G: Generator + ?Sized,
    {
        let response = self.search(query, limit).await?;
        let prompt = grouped_task_prompt(
            task,
            response.hits.iter().map(|hit| hit.metadata.text.as_str()),
        );
        let generated = generator.generate(&prompt)?;

        Ok(GeneratedAnswer {
            task: task.to_string(),
            response,
            generated,
        })
    }

    /// End the session and release the connection
    #[inline]
    pub fn close(self) {
        drop(self);
    }

    fn embed_chunks(&self, chunks: &[TextChunk]) -> Result<Vec<EmbeddingRecord>> {
        let chunks: Vec<&TextChunk> = chunks
            .iter()
            .filter(|chunk| {
                let blank = chunk.text.trim().is_empty();
                if blank {
                    debug!("Skipping blank chunk {}", chunk.unique_identifier());
                }
                !blank
            })
            .collect();

        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts)?;

            if vectors.len() != batch.len() {
                return Err(RetrievalError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }

            records.extend(
                batch
                    .iter()
                    .zip(vectors)
                    .map(|(chunk, vector)| EmbeddingRecord::from_chunk(chunk, vector)),
            );
            debug!("Embedded {}/{} chunks", records.len(), chunks.len());
        }

        Ok(records)
    }

    async fn store_records(&self, records: Vec<EmbeddingRecord>) -> Result<usize> {
        self.ensure_collection().await?;
        self.store.insert(&self.collection, records).await
    }

    async fn ensure_collection(&self) -> Result<()> {
        if !self.store.collection_exists(&self.collection).await? {
            self.store
                .create_collection(&self.collection, self.dimension)
                .await?;
        }
        Ok(())
    }
}

impl<E: Embedder> Drop for Session<E> {
    fn drop(&mut self) {
        debug!(
            "Releasing vector store connection for collection '{}'",
            self.collection
        );
    }
}

/// Run `f` inside a session that is closed afterwards, whatever `f` returns
///
/// ```no_run
/// # async fn demo(config: pdf_retrieval::config::Config, embedder: pdf_retrieval::embeddings::EmbeddingClient) -> pdf_retrieval::Result<()> {
/// use pdf_retrieval::ingest::PdfDirectory;
/// use pdf_retrieval::session::with_session;
///
/// let source = PdfDirectory::new("papers");
/// let report = with_session(&config, "PdfPages", embedder, move |session| {
///     Box::pin(async move { session.create_db(&source, true).await })
/// })
/// .await?;
/// println!("stored {} pages", report.chunks_stored);
/// # Ok(())
/// # }
/// ```
#[inline]
pub async fn with_session<E, T, F>(config: &Config, collection: &str, embedder: E, f: F) -> Result<T>
where
    E: Embedder,
    F: for<'s> FnOnce(&'s mut Session<E>) -> BoxFuture<'s, Result<T>>,
{
    let mut session = Session::connect(config, collection, embedder).await?;
    let result = f(&mut session).await;
    session.close();
    result
}
