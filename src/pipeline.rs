//! Fetch-then-load orchestration.
//!
//! Fetch failures end pagination early and the partial batch is still
//! stored. Load failures are fatal and surface as [`PipelineError`].

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::IngestConfig;
use crate::credentials::SecretStore;
use crate::fetch::{FetchError, PageSource, Paginator, RegistryClient, StopReason};
use crate::load::{BatchId, LoadError, Sink, SinkSetupError, select_sink};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The HTTP client could not be built.
    #[error("failed to build registry client: {0}")]
    Client(#[source] FetchError),

    /// The configured sink could not be built.
    #[error(transparent)]
    SinkSetup(#[from] SinkSetupError),

    /// Storing the batch failed.
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// Pages fetched.
    pub pages: u32,
    /// Records gathered from the registry.
    pub fetched: usize,
    /// Records written by the sink.
    pub stored: usize,
    /// Batch tag, when the sink issued one.
    pub batch_id: Option<BatchId>,
    /// Why pagination stopped.
    #[serde(serialize_with = "serialize_stop_reason")]
    pub stop_reason: StopReason,
    /// Sink destination.
    pub destination: String,
}

fn serialize_stop_reason<S: serde::Serializer>(
    reason: &StopReason,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(reason.as_str())
}

/// Fixed response for wrapped (function-style) invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationResponse {
    /// Always 200 once the pipeline returns.
    pub status_code: u16,
    /// Always `"OK"`.
    pub body: String,
}

impl InvocationResponse {
    /// The success response.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status_code: 200,
            body: "OK".to_string(),
        }
    }
}

/// Runs one fetch-then-load pass over explicit collaborators.
///
/// # Errors
///
/// Returns [`PipelineError::Load`] if the sink fails. Fetch failures are
/// not errors; they end pagination with whatever was gathered.
#[instrument(skip_all, fields(sink = %sink.describe()))]
pub async fn run(
    config: &IngestConfig,
    source: &dyn PageSource,
    sink: &dyn Sink,
) -> Result<IngestSummary, PipelineError> {
    info!(
        sink = %config.sink.kind,
        page_size = source.page_size(),
        max_pages = config.limits.max_pages,
        max_records = config.limits.max_records,
        "starting ingestion"
    );

    let outcome = Paginator::new(config.limits).fetch_all(source).await;
    let fetched = outcome.records.len();

    if fetched == 0 {
        warn!(stop_reason = %outcome.stop_reason, "no records fetched; nothing to store");
        return Ok(IngestSummary {
            pages: outcome.pages,
            fetched: 0,
            stored: 0,
            batch_id: None,
            stop_reason: outcome.stop_reason,
            destination: sink.describe(),
        });
    }

    let report = sink.store(outcome.records).await?;

    info!(
        rows = report.rows,
        batch_id = report.batch_id.as_ref().map_or("-", BatchId::as_str),
        pages = outcome.pages,
        stop_reason = %outcome.stop_reason,
        "ingestion complete"
    );

    Ok(IngestSummary {
        pages: outcome.pages,
        fetched,
        stored: report.rows,
        batch_id: report.batch_id,
        stop_reason: outcome.stop_reason,
        destination: report.destination,
    })
}

/// Builds the registry client and configured sink, then runs the pipeline.
///
/// Sink setup happens first, so credential problems fail before any
/// registry request.
///
/// # Errors
///
/// Returns [`PipelineError`] on setup or load failure.
pub async fn ingest(
    config: &IngestConfig,
    secret_store: Option<Arc<dyn SecretStore>>,
) -> Result<IngestSummary, PipelineError> {
    let sink = select_sink(config, secret_store).await?;
    let client = RegistryClient::new(
        config.api.base_url.clone(),
        config.api.study_query(),
        config.api.timeout,
    )
    .map_err(PipelineError::Client)?;
    run(config, &client, sink.as_ref()).await
}

/// Wrapped entrypoint: runs [`ingest`] and answers with the fixed success
/// response regardless of how much data was delivered.
///
/// # Errors
///
/// Propagates [`PipelineError`] from [`ingest`].
pub async fn handle_invocation(
    config: &IngestConfig,
    secret_store: Option<Arc<dyn SecretStore>>,
) -> Result<InvocationResponse, PipelineError> {
    ingest(config, secret_store).await?;
    Ok(InvocationResponse::ok())
}
