use super::*;
use crate::ingest::PdfDirectory;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

const DIM: usize = 64;
const COLLECTION: &str = "Pages";

/// Bag-of-words vectors: identical texts embed identically, shared words pull texts together
struct HashingEmbedder;

fn hash_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; DIM];
    for word in text.split_whitespace() {
        let word = word
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if word.is_empty() {
            continue;
        }
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        vector[(hasher.finish() % DIM as u64) as usize] += 1.0;
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    } else {
        vector[0] = 1.0;
    }
    vector
}

impl Embedder for HashingEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Embedding services reject empty input
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(RetrievalError::Embedding("input must not be empty".to_string()));
        }
        Ok(texts.iter().map(|t| hash_embed(t)).collect())
    }
}

/// Records when it is dropped, i.e. when the owning session is released
struct TrackedEmbedder {
    released: Arc<AtomicBool>,
    fail: bool,
}

impl Embedder for TrackedEmbedder {
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(RetrievalError::Embedding("service unavailable".to_string()));
        }
        HashingEmbedder.embed_batch(texts)
    }
}

impl Drop for TrackedEmbedder {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingGenerator {
    prompt: Mutex<Option<String>>,
}

impl Generator for RecordingGenerator {
    fn generate(&self, prompt: &str) -> Result<String> {
        if let Ok(mut slot) = self.prompt.lock() {
            *slot = Some(prompt.to_string());
        }
        Ok("A short summary.".to_string())
    }
}

fn test_config() -> (Config, TempDir) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.embedding.dimension = DIM as u32;
    config.embedding.batch_size = 2;
    (config, temp_dir)
}

fn sample_chunks() -> Vec<TextChunk> {
    vec![
        TextChunk::new(
            "ecology.pdf",
            1,
            "Warming oceans are bleaching coral reefs across the tropics.",
        ),
        TextChunk::new(
            "ecology.pdf",
            2,
            "Climate change forces many species to migrate toward the poles.",
        ),
        TextChunk::new(
            "ecology.pdf",
            3,
            "Wetland restoration stores carbon and shelters migratory birds.",
        ),
        TextChunk::new(
            "finance.pdf",
            1,
            "Quarterly revenue grew while operating costs remained flat.",
        ),
    ]
}

async fn open_session(config: &Config) -> Session<HashingEmbedder> {
    Session::connect(config, COLLECTION, HashingEmbedder)
        .await
        .expect("should open session")
}

#[tokio::test]
async fn create_db_stores_one_record_per_chunk() {
    let (config, _temp_dir) = test_config();
    let mut session = open_session(&config).await;

    let report = session
        .create_db(&sample_chunks(), true)
        .await
        .expect("ingestion should succeed");

    assert_eq!(report.chunks_stored, 4);
    assert_eq!(report.files_processed, 2);
    assert!(report.skipped.is_empty());
    assert!(!report.collection_dropped);
    assert_eq!(session.count().await.expect("should count"), 4);
}

#[tokio::test]
async fn cleanup_ingestion_is_idempotent() {
    let (config, _temp_dir) = test_config();
    let mut session = open_session(&config).await;

    session
        .create_db(&sample_chunks(), true)
        .await
        .expect("first ingestion should succeed");
    let report = session
        .create_db(&sample_chunks(), true)
        .await
        .expect("second ingestion should succeed");

    assert!(report.collection_dropped);
    assert_eq!(session.count().await.expect("should count"), 4);
}

#[tokio::test]
async fn ingestion_without_cleanup_does_not_duplicate() {
    let (config, _temp_dir) = test_config();
    let mut session = open_session(&config).await;

    session
        .create_db(&sample_chunks(), false)
        .await
        .expect("first ingestion should succeed");
    session
        .create_db(&sample_chunks(), false)
        .await
        .expect("second ingestion should succeed");

    assert_eq!(session.count().await.expect("should count"), 4);
}

#[tokio::test]
async fn cleanup_drops_records_missing_from_source() {
    let (config, _temp_dir) = test_config();
    let mut session = open_session(&config).await;

    session
        .create_db(&sample_chunks(), true)
        .await
        .expect("first ingestion should succeed");
    let reduced = vec![sample_chunks().remove(0)];
    session
        .create_db(&reduced, true)
        .await
        .expect("second ingestion should succeed");

    assert_eq!(session.count().await.expect("should count"), 1);
}

#[tokio::test]
async fn empty_source_creates_empty_collection() {
    let (config, temp_dir) = test_config();
    let pdf_dir = temp_dir.path().join("pdfs");
    std::fs::create_dir(&pdf_dir).expect("should create pdf dir");
    let mut session = open_session(&config).await;

    let report = session
        .create_db(&PdfDirectory::new(&pdf_dir), true)
        .await
        .expect("empty directory should not be an error");

    assert_eq!(report.chunks_stored, 0);
    assert!(
        session
            .store()
            .collection_exists(COLLECTION)
            .await
            .expect("should check collection")
    );
    assert_eq!(session.count().await.expect("should count"), 0);

    let response = session
        .search("anything at all", 3)
        .await
        .expect("search on empty collection should succeed");
    assert!(response.hits.is_empty());
}

#[tokio::test]
async fn failed_extraction_leaves_collection_untouched() {
    let (config, temp_dir) = test_config();
    let mut session = open_session(&config).await;
    session
        .create_db(&sample_chunks(), true)
        .await
        .expect("ingestion should succeed");

    let missing = PdfDirectory::new(temp_dir.path().join("missing"));
    let result = session.create_db(&missing, true).await;

    assert!(matches!(result, Err(RetrievalError::Io { .. })));
    assert_eq!(session.count().await.expect("should count"), 4);
}

#[tokio::test]
async fn exact_text_query_round_trips() {
    let (config, _temp_dir) = test_config();
    let mut session = open_session(&config).await;
    let chunks = sample_chunks();
    session
        .create_db(&chunks, true)
        .await
        .expect("ingestion should succeed");

    let response = session
        .search(&chunks[2].text, 3)
        .await
        .expect("search should succeed");

    assert_eq!(response.query, chunks[2].text);
    let top = response.hits.first().expect("should have a hit");
    assert_eq!(top.id, "ecology.pdf#3");
    assert_eq!(top.metadata.text, chunks[2].text);
    assert!(top.similarity > 0.99, "similarity was {}", top.similarity);
}

#[tokio::test]
async fn search_respects_limit_and_order() {
    let (config, _temp_dir) = test_config();
    let mut session = open_session(&config).await;
    session
        .create_db(&sample_chunks(), true)
        .await
        .expect("ingestion should succeed");

    let response = session
        .search("climate and species", 2)
        .await
        .expect("search should succeed");

    assert!(response.hits.len() <= 2);
    assert!(!response.hits.is_empty());
    assert_eq!(response.hits[0].id, "ecology.pdf#2");
    for pair in response.hits.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
    for hit in &response.hits {
        assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&hit.similarity));
    }
}

#[tokio::test]
async fn zero_limit_uses_configured_default() {
    let (mut config, _temp_dir) = test_config();
    config.search.limit = 2;
    let mut session = open_session(&config).await;
    session
        .create_db(&sample_chunks(), true)
        .await
        .expect("ingestion should succeed");

    let response = session
        .search("species", 0)
        .await
        .expect("search should succeed");

    assert_eq!(response.hits.len(), 2);
}

#[tokio::test]
async fn search_and_answer_sends_task_with_passages() {
    let (config, _temp_dir) = test_config();
    let mut session = open_session(&config).await;
    session
        .create_db(&sample_chunks(), true)
        .await
        .expect("ingestion should succeed");
    let generator = RecordingGenerator::default();

    let answer = session
        .search_and_answer(&generator, "climate and species", "Summarize the findings", 2)
        .await
        .expect("generative search should succeed");

    assert_eq!(answer.generated, "A short summary.");
    assert_eq!(answer.task, "Summarize the findings");
    assert_eq!(answer.response.hits.len(), 2);

    let prompt = generator
        .prompt
        .lock()
        .expect("prompt lock")
        .clone()
        .expect("generator should have been called");
    assert!(prompt.starts_with("Summarize the findings"));
    assert!(prompt.contains(&answer.response.hits[0].metadata.text));
}

#[tokio::test]
async fn embedding_failure_propagates() {
    let (config, _temp_dir) = test_config();
    let released = Arc::new(AtomicBool::new(false));
    let embedder = TrackedEmbedder {
        released: Arc::clone(&released),
        fail: true,
    };
    let mut session = Session::connect(&config, COLLECTION, embedder)
        .await
        .expect("should open session");

    let result = session.create_db(&sample_chunks(), true).await;
    assert!(matches!(result, Err(RetrievalError::Embedding(_))));
    assert!(!released.load(Ordering::SeqCst));

    session.close();
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn with_session_releases_after_failure() {
    let (config, _temp_dir) = test_config();
    let released = Arc::new(AtomicBool::new(false));
    let embedder = TrackedEmbedder {
        released: Arc::clone(&released),
        fail: true,
    };
    let chunks = sample_chunks();

    let result = with_session(&config, COLLECTION, embedder, move |session| {
        Box::pin(async move { session.create_db(&chunks, true).await })
    })
    .await;

    assert!(matches!(result, Err(RetrievalError::Embedding(_))));
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn with_session_releases_after_success() {
    let (config, _temp_dir) = test_config();
    let released = Arc::new(AtomicBool::new(false));
    let embedder = TrackedEmbedder {
        released: Arc::clone(&released),
        fail: false,
    };
    let chunks = sample_chunks();

    let stored = with_session(&config, COLLECTION, embedder, move |session| {
        Box::pin(async move {
            let report = session.create_db(&chunks, true).await?;
            Ok(report.chunks_stored)
        })
    })
    .await
    .expect("session should succeed");

    assert_eq!(stored, 4);
    assert!(released.load(Ordering::SeqCst));

    // A later session sees what the first one stored
    let session = open_session(&config).await;
    assert_eq!(session.count().await.expect("should count"), 4);
}

#[tokio::test]
async fn invalid_collection_name_is_rejected() {
    let (config, _temp_dir) = test_config();

    let result = Session::connect(&config, "bad name", HashingEmbedder).await;
    assert!(matches!(result, Err(RetrievalError::Config(_))));
}

#[tokio::test]
async fn searching_before_ingestion_is_database_error() {
    let (config, _temp_dir) = test_config();
    let session = open_session(&config).await;

    let result = session.search("anything", 3).await;
    assert!(matches!(result, Err(RetrievalError::Database(_))));
}

#[tokio::test]
async fn blank_chunks_are_not_embedded() {
    let (config, _temp_dir) = test_config();
    let mut session = open_session(&config).await;
    let chunks = vec![
        TextChunk::new("scan.pdf", 1, "Cover letter about coral reefs."),
        TextChunk::new("scan.pdf", 2, "  \n\t "),
        TextChunk::new("scan.pdf", 3, "Appendix on species migration."),
    ];

    let stored = session
        .populate_db(&chunks)
        .await
        .expect("blank chunks should be skipped");

    assert_eq!(stored, 2);
    assert_eq!(session.count().await.expect("should count"), 2);
}

#[tokio::test]
async fn embedding_failure_keeps_existing_collection() {
    let (config, _temp_dir) = test_config();
    let mut session = open_session(&config).await;
    session
        .create_db(&sample_chunks(), true)
        .await
        .expect("ingestion should succeed");
    session.close();

    let embedder = TrackedEmbedder {
        released: Arc::new(AtomicBool::new(false)),
        fail: true,
    };
    let mut failing = Session::connect(&config, COLLECTION, embedder)
        .await
        .expect("should open session");
    let result = failing.create_db(&sample_chunks(), true).await;

    assert!(matches!(result, Err(RetrievalError::Embedding(_))));
    assert_eq!(failing.count().await.expect("should count"), 4);
}
