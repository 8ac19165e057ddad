//! LanceDB collection backend.
//!
//! Each physical collection is a LanceDB database directory holding a single
//! table. Metadata fields are stored as flat columns so filters translate
//! directly into LanceDB `WHERE` clauses.

use super::super::config::{CollectionConfig, LANCEDB_TABLE_NAME};
use super::super::metadata::{ChunkMetadata, FilterField, FilterValue, MetadataFilter};
use super::super::traits::{ChunkCollection, ChunkInsert, ChunkMatch, VectorMetric};
use crate::error::{DbError, DbResult};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lance_arrow::FixedSizeListArrayExt;
use lancedb::{
    connect,
    query::{ExecutableQuery, QueryBase},
    Connection, Table,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::runtime::Runtime;
use tracing::{debug, trace};

/// LanceDB chunk collection.
pub struct LanceDbCollection {
    name: String,

    #[allow(dead_code)]
    path: PathBuf,

    dimension: usize,

    metric: VectorMetric,

    connection: Connection,

    /// Table handle (lazily opened or created).
    table: RwLock<Option<Table>>,

    /// Tokio runtime for async operations.
    runtime: Runtime,
}

impl LanceDbCollection {
    /// Open or create a LanceDB collection in `path`.
    pub fn open(name: &str, path: &Path, config: &CollectionConfig) -> DbResult<Self> {
        debug!("Opening LanceDbCollection '{}' at {:?}", name, path);

        let runtime = Runtime::new()
            .map_err(|e| DbError::internal(format!("Failed to create runtime: {}", e)))?;

        let connection = runtime
            .block_on(async { connect(path.to_string_lossy().as_ref()).execute().await })
            .map_err(|e| DbError::LanceDb {
                message: format!("Failed to connect: {}", e),
            })?;

        let collection = Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            dimension: config.dimension,
            metric: config.metric,
            connection,
            table: RwLock::new(None),
            runtime,
        };

        collection.ensure_table()?;
        Ok(collection)
    }

    fn ensure_table(&self) -> DbResult<()> {
        let mut table_guard = self
            .table
            .write()
            .map_err(|e| DbError::internal(format!("Failed to acquire table lock: {}", e)))?;

        if table_guard.is_some() {
            return Ok(());
        }

        let table_names = self
            .runtime
            .block_on(async { self.connection.table_names().execute().await })
            .map_err(|e| DbError::LanceDb {
                message: format!("Failed to list tables: {}", e),
            })?;

        let table = if table_names.iter().any(|t| t == LANCEDB_TABLE_NAME) {
            debug!("Opening existing table '{}'", LANCEDB_TABLE_NAME);
            self.runtime
                .block_on(async {
                    self.connection
                        .open_table(LANCEDB_TABLE_NAME)
                        .execute()
                        .await
                })
                .map_err(|e| DbError::LanceDb {
                    message: format!("Failed to open table: {}", e),
                })?
        } else {
            debug!("Creating new table '{}'", LANCEDB_TABLE_NAME);
            let schema = Arc::new(self.create_schema());
            let batch = self.chunks_to_batch(&[])?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

            self.runtime
                .block_on(async {
                    self.connection
                        .create_table(LANCEDB_TABLE_NAME, Box::new(batches))
                        .execute()
                        .await
                })
                .map_err(|e| DbError::LanceDb {
                    message: format!("Failed to create table: {}", e),
                })?
        };

        *table_guard = Some(table);
        Ok(())
    }

    fn get_table(&self) -> DbResult<Table> {
        self.ensure_table()?;

        let guard = self
            .table
            .read()
            .map_err(|e| DbError::internal(format!("Failed to acquire table lock: {}", e)))?;

        guard
            .clone()
            .ok_or_else(|| DbError::internal("Table not initialized"))
    }

    /// Arrow schema: id, vector, text, then one column per metadata field.
    fn create_schema(&self) -> Schema {
        let mut fields = vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
        ];
        for field in FilterField::ALL {
            let data_type = if field.is_flag() {
                DataType::Int64
            } else {
                DataType::Utf8
            };
            fields.push(Field::new(field.as_str(), data_type, false));
        }
        Schema::new(fields)
    }

    fn chunks_to_batch(&self, chunks: &[ChunkInsert]) -> DbResult<RecordBatch> {
        let ids: ArrayRef = Arc::new(StringArray::from(
            chunks.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        ));

        let flat_vectors: Vec<f32> = chunks.iter().flat_map(|c| c.vector.clone()).collect();
        let vector_array =
            FixedSizeListArray::try_new_from_values(Float32Array::from(flat_vectors), self.dimension as i32)
                .map_err(|e| DbError::internal(format!("Failed to create vector array: {}", e)))?;
        let vectors: ArrayRef = Arc::new(vector_array);

        let texts: ArrayRef = Arc::new(StringArray::from(
            chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>(),
        ));

        let mut columns = vec![ids, vectors, texts];
        for field in FilterField::ALL {
            let column: ArrayRef = if field.is_flag() {
                Arc::new(Int64Array::from(
                    chunks
                        .iter()
                        .map(|c| flag_value(&c.metadata, field))
                        .collect::<Vec<_>>(),
                ))
            } else {
                Arc::new(StringArray::from(
                    chunks
                        .iter()
                        .map(|c| text_value(&c.metadata, field))
                        .collect::<Vec<_>>(),
                ))
            };
            columns.push(column);
        }

        RecordBatch::try_new(Arc::new(self.create_schema()), columns)
            .map_err(|e| DbError::internal(format!("Failed to create batch: {}", e)))
    }

    fn distance_type(&self) -> lancedb::DistanceType {
        match self.metric {
            VectorMetric::Cosine => lancedb::DistanceType::Cosine,
            VectorMetric::Dot => lancedb::DistanceType::Dot,
            VectorMetric::L2 => lancedb::DistanceType::L2,
        }
    }
}

impl ChunkCollection for LanceDbCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: Option<&MetadataFilter>,
    ) -> DbResult<Vec<ChunkMatch>> {
        trace!("Querying '{}', limit={}", self.name, limit);

        if let Some(f) = filter {
            f.validate()?;
        }
        if embedding.len() != self.dimension {
            return Err(DbError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        if limit == 0 || self.is_empty()? {
            return Ok(Vec::new());
        }

        let table = self.get_table()?;

        self.runtime.block_on(async {
            let mut query = table
                .vector_search(embedding.to_vec())
                .map_err(|e| DbError::LanceDb {
                    message: format!("Failed to create query: {}", e),
                })?;

            if let Some(f) = filter {
                let clause = f.to_lance_filter();
                debug!("Applying filter: {}", clause);
                query = query.only_if(clause);
            }

            query = query.limit(limit).distance_type(self.distance_type());

            // Errors from here on concern the WHERE clause when a filter is set
            let results = query.execute().await.map_err(|e| match filter {
                Some(_) => DbError::filter_rejected(e.to_string()),
                None => DbError::LanceDb {
                    message: format!("Query failed: {}", e),
                },
            })?;

            let batches: Vec<RecordBatch> =
                results.try_collect().await.map_err(|e| DbError::LanceDb {
                    message: format!("Failed to collect results: {}", e),
                })?;

            let mut matches = Vec::new();
            for batch in &batches {
                matches.extend(batch_to_matches(batch)?);
            }
            matches.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            Ok(matches)
        })
    }

    fn upsert(&self, chunks: &[ChunkInsert]) -> DbResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        debug!("Upserting {} chunks into '{}'", chunks.len(), self.name);

        for insert in chunks {
            if insert.vector.len() != self.dimension {
                return Err(DbError::DimensionMismatch {
                    expected: self.dimension,
                    actual: insert.vector.len(),
                });
            }
        }

        let table = self.get_table()?;
        let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
        let delete_filter = id_in_clause(&ids);

        self.runtime.block_on(async {
            if let Err(e) = table.delete(&delete_filter).await {
                debug!("Delete before upsert returned error (may be ok): {}", e);
            }

            let batch = self.chunks_to_batch(chunks)?;
            let schema = batch.schema();
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

            table
                .add(Box::new(batches))
                .execute()
                .await
                .map_err(|e| DbError::LanceDb {
                    message: format!("Insert failed: {}", e),
                })?;

            Ok(())
        })
    }

    fn delete(&self, ids: &[String]) -> DbResult<()> {
        if ids.is_empty() {
            return Ok(());
        }

        debug!("Deleting {} chunks from '{}'", ids.len(), self.name);

        let table = self.get_table()?;
        let delete_filter = id_in_clause(ids);

        self.runtime.block_on(async {
            table
                .delete(&delete_filter)
                .await
                .map_err(|e| DbError::LanceDb {
                    message: format!("Delete failed: {}", e),
                })?;
            Ok(())
        })
    }

    fn flush(&self) -> DbResult<()> {
        // LanceDB writes are durable once `add` returns
        Ok(())
    }

    fn len(&self) -> DbResult<usize> {
        let table = self.get_table()?;

        self.runtime.block_on(async {
            let count = table.count_rows(None).await.map_err(|e| DbError::LanceDb {
                message: format!("Count failed: {}", e),
            })?;
            Ok(count)
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn metric(&self) -> VectorMetric {
        self.metric
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn text_value(metadata: &ChunkMetadata, field: FilterField) -> String {
    match metadata.value_of(field) {
        FilterValue::Str(s) => s,
        FilterValue::Int(i) => i.to_string(),
    }
}

fn flag_value(metadata: &ChunkMetadata, field: FilterField) -> i64 {
    match metadata.value_of(field) {
        FilterValue::Int(i) => i,
        FilterValue::Str(_) => 0,
    }
}

fn id_in_clause(ids: &[String]) -> String {
    let quoted = ids
        .iter()
        .map(|id| format!("'{}'", id.replace('\'', "''")))
        .collect::<Vec<_>>()
        .join(", ");
    format!("id IN ({})", quoted)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> DbResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| DbError::internal(format!("Missing string column '{}'", name)))
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> DbResult<&'a Int64Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| DbError::internal(format!("Missing integer column '{}'", name)))
}

fn batch_to_matches(batch: &RecordBatch) -> DbResult<Vec<ChunkMatch>> {
    let ids = string_column(batch, "id")?;
    let texts = string_column(batch, "text")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| DbError::internal("Missing '_distance' column"))?;

    let text = |name: &str, row: usize| -> DbResult<String> {
        Ok(string_column(batch, name)?.value(row).to_string())
    };
    let flag = |name: &str, row: usize| -> DbResult<i64> { Ok(int_column(batch, name)?.value(row)) };

    let mut matches = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let metadata = ChunkMetadata {
            report_id: text("report_id", row)?,
            title: text("title", row)?,
            severity: text("severity", row)?,
            category: text("category", row)?,
            country: text("country", row)?,
            city: text("city", row)?,
            location: text("location", row)?,
            year: text("year", row)?,
            risk: text("risk", row)?,
            section: text("section", row)?,
            is_major: flag("is_major", row)?,
            is_high_risk: flag("is_high_risk", row)?,
            has_injury: flag("has_injury", row)?,
            is_near_miss: flag("is_near_miss", row)?,
            injury: text("injury", row)?,
            classification: text("classification", row)?,
        };
        matches.push(ChunkMatch::new(
            ids.value(row),
            texts.value(row),
            metadata,
            distances.value(row),
        ));
    }
    Ok(matches)
}

// ============================================================================
// Tests
// ============================================================================
