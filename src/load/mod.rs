//! Record sinks: the chunked warehouse loader and the NDJSON file sink.
//!
//! Both implement [`Sink`]; [`select_sink`] builds the configured one.

mod batch;
mod error;
mod file;
mod loader;
mod selector;
mod warehouse;

use async_trait::async_trait;

use crate::fetch::Record;

pub use batch::BatchId;
pub use error::{LoadError, WarehouseError, WarehouseErrorKind};
pub use file::{DEFAULT_ARTIFACTS_DIR, FileSink, NDJSON_FILE_NAME};
pub use loader::{BatchLoader, DEFAULT_INSERT_CHUNK};
pub use selector::{SinkKind, SinkSetupError, UnknownSinkKind, select_sink, warehouse_from_config};
pub use warehouse::{PingReport, RAW_TABLE, SqlWarehouse, WarehouseConnector, WarehouseSession};

/// Result of one [`Sink::store`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreReport {
    /// Rows written.
    pub rows: usize,
    /// Batch tag, when the sink issues one.
    pub batch_id: Option<BatchId>,
    /// Where the rows went.
    pub destination: String,
}

/// Destination for one run's records.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Persists `records` as a single batch.
    async fn store(&self, records: Vec<Record>) -> Result<StoreReport, LoadError>;

    /// Destination description for logs.
    fn describe(&self) -> String;
}
