//! Chunked, transactional loading of one batch into the raw table.
//!
//! Each chunk of `chunk_size` single-row inserts is committed on its own.
//! A failure rolls back only the open chunk: rows from earlier commits stay
//! visible, tagged with the batch id. The session is closed on every exit
//! path.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use super::batch::BatchId;
use super::error::{LoadError, WarehouseError};
use super::warehouse::{WarehouseConnector, WarehouseSession};
use super::{Sink, StoreReport};
use crate::fetch::Record;

/// Default rows per committed chunk.
pub const DEFAULT_INSERT_CHUNK: usize = 500;

/// Writes record batches to a warehouse in committed chunks.
#[derive(Clone)]
pub struct BatchLoader {
    connector: Arc<dyn WarehouseConnector>,
    chunk_size: usize,
}

impl std::fmt::Debug for BatchLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchLoader")
            .field("destination", &self.connector.describe())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl BatchLoader {
    /// Creates a loader; `chunk_size` is clamped to at least 1.
    #[must_use]
    pub fn new(connector: Arc<dyn WarehouseConnector>, chunk_size: usize) -> Self {
        Self {
            connector,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Returns the configured chunk size.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Loads `records` as one batch.
    ///
    /// An empty input is a no-op: nothing is written and no batch id is
    /// issued.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Serialize`] before touching the warehouse if a
    /// record cannot be serialized, or [`LoadError::Warehouse`] after
    /// rolling back the open chunk.
    #[instrument(skip(self, records), fields(rows = records.len(), chunk_size = self.chunk_size))]
    pub async fn load(&self, records: Vec<Record>) -> Result<StoreReport, LoadError> {
        let destination = self.connector.describe();
        if records.is_empty() {
            warn!("no rows to save");
            return Ok(StoreReport {
                rows: 0,
                batch_id: None,
                destination,
            });
        }

        let batch_id = BatchId::generate();
        let rows = records
            .iter()
            .enumerate()
            .map(|(index, record)| {
                record
                    .to_json()
                    .map_err(|source| LoadError::Serialize { index, source })
            })
            .collect::<Result<Vec<String>, LoadError>>()?;
        let total = rows.len();

        let mut session = self
            .connector
            .open_session()
            .await
            .map_err(|source| warehouse_failure(&batch_id, 0, total, source))?;

        let written = self
            .write_chunks(session.as_mut(), &rows, batch_id.as_str())
            .await;

        if let Err((_, cause)) = &written {
            error!(batch_id = %batch_id, error = %cause, "warehouse save failed");
            if let Err(rollback_err) = session.rollback().await {
                warn!(error = %rollback_err, "rollback failed");
            }
        }
        if let Err(close_err) = session.close().await {
            warn!(error = %close_err, "failed to release warehouse session");
        }

        let inserted =
            written.map_err(|(committed, source)| warehouse_failure(&batch_id, committed, total, source))?;

        info!(rows = inserted, batch_id = %batch_id, destination = %destination, "saved batch");
        Ok(StoreReport {
            rows: inserted,
            batch_id: Some(batch_id),
            destination,
        })
    }

    /// Ensures the table, then inserts and commits chunk by chunk.
    ///
    /// On failure returns the number of rows committed so far with the cause.
    async fn write_chunks(
        &self,
        session: &mut dyn WarehouseSession,
        rows: &[String],
        batch_id: &str,
    ) -> Result<usize, (usize, WarehouseError)> {
        session.ensure_table().await.map_err(|e| (0, e))?;

        let total = rows.len();
        let mut inserted = 0;
        for chunk in rows.chunks(self.chunk_size) {
            session.begin().await.map_err(|e| (inserted, e))?;
            for raw in chunk {
                session
                    .insert_row(raw, batch_id)
                    .await
                    .map_err(|e| (inserted, e))?;
            }
            session.commit().await.map_err(|e| (inserted, e))?;
            inserted += chunk.len();
            info!(inserted, total, "inserted {inserted}/{total}");
        }
        Ok(inserted)
    }
}

fn warehouse_failure(
    batch_id: &BatchId,
    committed: usize,
    total: usize,
    source: WarehouseError,
) -> LoadError {
    LoadError::Warehouse {
        batch_id: batch_id.to_string(),
        committed,
        total,
        source,
    }
}

#[async_trait]
impl Sink for BatchLoader {
    async fn store(&self, records: Vec<Record>) -> Result<StoreReport, LoadError> {
        self.load(records).await
    }

    fn describe(&self) -> String {
        self.connector.describe()
    }
}
