//! Clinical-trials ingestion library.
//!
//! Pages through the public registry's study search API and stores the raw
//! study documents in a warehouse table (or a local NDJSON file), tagging
//! every row with the run's batch id.
//!
//! # Architecture
//!
//! - [`config`] - Run configuration built once at startup
//! - [`credentials`] - Secret-store and environment credential strategies
//! - [`fetch`] - Bounded-retry HTTP client and cursor paginator
//! - [`load`] - Chunked transactional loader and file sink
//! - [`pipeline`] - Fetch-then-load orchestration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod fetch;
pub mod load;
pub mod pipeline;

// Re-export commonly used types
pub use config::{ConfigError, ConfigOverrides, IngestConfig};
pub use credentials::{CredentialError, CredentialResolver, WarehouseCredentials};
pub use fetch::{
    FetchError, FetchOutcome, PageSource, PaginationLimits, Paginator, Record, RegistryClient,
    RetryPolicy, StopReason,
};
pub use load::{
    BatchId, BatchLoader, FileSink, LoadError, Sink, SinkKind, SqlWarehouse, StoreReport,
    select_sink,
};
pub use pipeline::{IngestSummary, InvocationResponse, PipelineError, handle_invocation, ingest, run};
