
use super::{ChunkMetadata, EmbeddingRecord, SearchHit};
use crate::config::Config;
use crate::{Result, RetrievalError};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    query::{ExecutableQuery, QueryBase},
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Handle to a LanceDB database; each collection is one table
pub struct VectorStore {
    connection: Connection,
    uri: String,
}

impl VectorStore {
    /// Connect to the database configured in `config`
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        Self::connect(&config.vector_database_uri()).await
    }

    /// Connect to the database at `uri`, creating a local directory if needed
    ///
    /// # Arguments
    /// * `uri` - `file://` path, plain local path, or any URI LanceDB accepts
    #[inline]
    pub async fn connect(uri: &str) -> Result<Self> {
        let local_path = uri
            .strip_prefix("file://")
            .or_else(|| (!uri.contains("://")).then_some(uri));
        if let Some(path) = local_path {
            debug!("Initializing LanceDB at path: {}", path);
            std::fs::create_dir_all(path).map_err(|e| RetrievalError::io(Path::new(path), e))?;
        }

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| RetrievalError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        info!("Connected to vector store at {}", uri);
        Ok(Self {
            connection,
            uri: uri.to_string(),
        })
    }

    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Release the connection
    #[inline]
    pub fn close(self) {
        debug!("Closing vector store connection to {}", self.uri);
    }

    #[inline]
    pub async fn collection_names(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RetrievalError::Database(format!("Failed to list tables: {}", e)))
    }

    #[inline]
    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collection_names().await?.iter().any(|t| t == name))
    }

    /// Create an empty collection whose vectors have `vector_dim` dimensions
    #[inline]
    pub async fn create_collection(&self, name: &str, vector_dim: usize) -> Result<()> {
        info!(
            "Creating collection '{}' with {} dimensions",
            name, vector_dim
        );

        self.connection
            .create_empty_table(name, create_schema(vector_dim)?)
            .execute()
            .await
            .map_err(|e| {
                RetrievalError::Database(format!("Failed to create collection '{}': {}", name, e))
            })?;

        Ok(())
    }

    /// Drop a collection; returns whether there was one to drop
    #[inline]
    pub async fn delete_collection(&self, name: &str) -> Result<bool> {
        if !self.collection_exists(name).await? {
            debug!("Collection '{}' does not exist, nothing to delete", name);
            return Ok(false);
        }

        info!("Dropping collection '{}'", name);
        self.connection.drop_table(name).await.map_err(|e| {
            RetrievalError::Database(format!("Failed to drop collection '{}': {}", name, e))
        })?;

        Ok(true)
    }

    /// Number of dimensions of the collection's vector column
    #[inline]
    pub async fn vector_dimension(&self, name: &str) -> Result<usize> {
        let schema = self
            .open_collection(name)
            .await?
            .schema()
            .await
            .map_err(|e| RetrievalError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return usize::try_from(*size).map_err(|_| {
                        RetrievalError::Database(format!("Invalid vector dimension {}", size))
                    });
                }
            }
        }

        Err(RetrievalError::Database(format!(
            "Collection '{}' has no vector column",
            name
        )))
    }

    #[inline]
    pub async fn count(&self, name: &str) -> Result<u64> {
        let count = self
            .open_collection(name)
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RetrievalError::Database(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    /// Store records, replacing any stored record with the same id
    ///
    /// The replace is a single merge on `id`, so a failed write leaves the
    /// stored records untouched. Returns the number of records written. When
    /// the collection is still empty and the vectors have a different
    /// dimension than its schema, the collection is recreated with the
    /// observed dimension.
    #[inline]
    pub async fn insert(&self, name: &str, records: Vec<EmbeddingRecord>) -> Result<usize> {
        let records = dedupe_by_id(records);
        let Some(first) = records.first() else {
            debug!("No records to store");
            return Ok(0);
        };

        let vector_dim = first.vector.len();
        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(RetrievalError::Database(format!(
                "Record '{}' has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        let existing = self.count(name).await?;
        let stored_dim = self.vector_dimension(name).await?;
        if stored_dim != vector_dim {
            if existing > 0 {
                return Err(RetrievalError::Database(format!(
                    "Collection '{}' stores {}-dimensional vectors, got {}",
                    name, stored_dim, vector_dim
                )));
            }
            info!(
                "Vector dimension changed from {} to {}, recreating collection '{}'",
                stored_dim, vector_dim, name
            );
            self.delete_collection(name).await?;
            self.create_collection(name, vector_dim).await?;
        }

        let table = self.open_collection(name).await?;

        let record_batch = create_record_batch(&records, vector_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);

        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| RetrievalError::Database(format!("Failed to insert records: {}", e)))?;

        info!("Stored {} records in '{}'", records.len(), name);
        Ok(records.len())
    }

    /// Nearest neighbours of `query_vector`, most similar first
    ///
    /// # Arguments
    /// * `name` - Collection to search
    /// * `query_vector` - Embedding of the query text
    /// * `limit` - Maximum number of results to return
    #[inline]
    pub async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        debug!(
            "Searching '{}' for similar vectors with limit: {}",
            name, limit
        );

        let table = self.open_collection(name).await?;

        let rows = table
            .count_rows(None)
            .await
            .map_err(|e| RetrievalError::Database(format!("Failed to count rows: {}", e)))?;
        if rows == 0 || limit == 0 {
            return Ok(Vec::new());
        }

        let results = table
            .vector_search(query_vector)
            .map_err(|e| {
                RetrievalError::Database(format!("Failed to create vector search: {}", e))
            })?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RetrievalError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = parse_search_results_stream(results).await?;
        hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        hits.truncate(limit);

        Ok(hits)
    }

    async fn open_collection(&self, name: &str) -> Result<Table> {
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| {
                RetrievalError::Database(format!("Failed to open collection '{}': {}", name, e))
            })
    }
}

/// Keep the last record for every id
fn dedupe_by_id(records: Vec<EmbeddingRecord>) -> Vec<EmbeddingRecord> {
    let mut seen = HashSet::new();
    let mut unique: Vec<EmbeddingRecord> = records
        .into_iter()
        .rev()
        .filter(|r| seen.insert(r.id.clone()))
        .collect();
    unique.reverse();
    unique
}

/// Create schema with the specified vector dimension
fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
    let list_size = i32::try_from(vector_dim)
        .map_err(|_| RetrievalError::Database(format!("Invalid vector dimension {}", vector_dim)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                list_size,
            ),
            false,
        ),
        Field::new("source", DataType::Utf8, false),
        Field::new("chunk_number", DataType::UInt32, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("token_count", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

/// Create a RecordBatch from embedding records
fn create_record_batch(records: &[EmbeddingRecord], vector_dim: usize) -> Result<RecordBatch> {
    let schema = create_schema(vector_dim)?;
    let list_size = i32::try_from(vector_dim)
        .map_err(|_| RetrievalError::Database(format!("Invalid vector dimension {}", vector_dim)))?;

    let flat_values: Vec<f32> = records
        .iter()
        .flat_map(|r| r.vector.iter().copied())
        .collect();
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        list_size,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| RetrievalError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.id.as_str()),
        )),
        Arc::new(vector_array),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.source.as_str()),
        )),
        Arc::new(UInt32Array::from_iter_values(
            records.iter().map(|r| r.metadata.chunk_number),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.text.as_str()),
        )),
        Arc::new(UInt32Array::from_iter_values(
            records.iter().map(|r| r.metadata.token_count),
        )),
        Arc::new(StringArray::from_iter_values(
            records.iter().map(|r| r.metadata.created_at.as_str()),
        )),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RetrievalError::Database(format!("Failed to create record batch: {}", e)))
}

/// Parse search results from LanceDB stream into SearchHit structs
async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<SearchHit>> {
    let mut hits = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| RetrievalError::Database(format!("Failed to read result stream: {}", e)))?
    {
        hits.extend(parse_search_batch(&batch)?);
    }

    debug!("Parsed {} search results from stream", hits.len());
    Ok(hits)
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RetrievalError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RetrievalError::Database(format!("Invalid {} column type", name)))
}

/// Parse a single record batch from search results
fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
    let ids = column::<StringArray>(batch, "id")?;
    let sources = column::<StringArray>(batch, "source")?;
    let chunk_numbers = column::<UInt32Array>(batch, "chunk_number")?;
    let texts = column::<StringArray>(batch, "text")?;
    let token_counts = column::<UInt32Array>(batch, "token_count")?;
    let created_ats = column::<StringArray>(batch, "created_at")?;
    let distances = column::<Float32Array>(batch, "_distance")?;

    Ok((0..batch.num_rows())
        .map(|row| {
            let metadata = ChunkMetadata {
                source: sources.value(row).to_string(),
                chunk_number: chunk_numbers.value(row),
                text: texts.value(row).to_string(),
                token_count: token_counts.value(row),
                created_at: created_ats.value(row).to_string(),
            };
            let distance = if distances.is_null(row) {
                f32::NAN
            } else {
                distances.value(row)
            };
            SearchHit::from_distance(ids.value(row).to_string(), metadata, distance)
        })
        .collect())
}
