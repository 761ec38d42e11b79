//! Sink selection from configuration.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument};

use super::error::WarehouseError;
use super::file::FileSink;
use super::loader::BatchLoader;
use super::warehouse::SqlWarehouse;
use super::Sink;
use crate::config::{IngestConfig, WarehouseConfig};
use crate::credentials::{CredentialError, CredentialResolver, SecretStore, WarehouseCredentials};

/// Which sink receives the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// NDJSON file under the artifacts directory.
    File,
    /// Chunked load into the raw warehouse table.
    Warehouse,
}

impl SinkKind {
    /// Returns the canonical name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Warehouse => "warehouse",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized sink name.
#[derive(Debug, Clone, Error)]
#[error("unknown sink `{0}`")]
pub struct UnknownSinkKind(pub String);

impl FromStr for SinkKind {
    type Err = UnknownSinkKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "warehouse" | "snowflake" => Ok(Self::Warehouse),
            _ => Err(UnknownSinkKind(s.to_string())),
        }
    }
}

/// Errors building the configured sink.
#[derive(Debug, Error)]
pub enum SinkSetupError {
    /// No credential strategy succeeded.
    #[error("warehouse credentials unavailable: {0}")]
    Credential(#[from] CredentialError),

    /// The warehouse location is unusable.
    #[error("warehouse setup failed: {0}")]
    Warehouse(#[from] WarehouseError),
}

/// Prepares the warehouse pool described by `config` without connecting.
///
/// `credentials` are attached when given; read-only callers such as `ping`
/// pass `None`.
///
/// # Errors
///
/// Returns [`WarehouseError`] if the connection URL is malformed.
pub fn warehouse_from_config(
    config: &WarehouseConfig,
    credentials: Option<WarehouseCredentials>,
) -> Result<SqlWarehouse, WarehouseError> {
    let label = format!("{} ({})", config.qualified_schema(), config.warehouse);
    let warehouse = SqlWarehouse::open_lazy(&config.connection_url(), label)?;
    Ok(match credentials {
        Some(credentials) => warehouse.with_credentials(credentials),
        None => warehouse,
    })
}

/// Builds the sink named by `config.sink.kind`.
///
/// For the warehouse sink, credentials are resolved first so a missing login
/// fails before any registry request is made.
///
/// # Errors
///
/// Returns [`SinkSetupError`] when credentials or the warehouse location are
/// unusable.
#[instrument(skip_all, fields(sink = %config.sink.kind))]
pub async fn select_sink(
    config: &IngestConfig,
    secret_store: Option<Arc<dyn SecretStore>>,
) -> Result<Box<dyn Sink>, SinkSetupError> {
    match config.sink.kind {
        SinkKind::File => {
            let sink = FileSink::new(&config.sink.artifacts_dir);
            info!(path = %sink.path().display(), "using file sink");
            Ok(Box::new(sink))
        }
        SinkKind::Warehouse => {
            let resolver = CredentialResolver::standard(
                config.credential_env.clone(),
                config.warehouse.secret_id.as_deref(),
                secret_store,
            );
            let credentials = resolver.resolve().await?;
            let identity = credentials.identity();
            let warehouse = warehouse_from_config(&config.warehouse, Some(credentials))?;
            info!(
                %identity,
                warehouse = %config.warehouse.warehouse,
                schema = %config.warehouse.qualified_schema(),
                role = config.warehouse.role.as_deref().unwrap_or("default"),
                "using warehouse sink"
            );
            Ok(Box::new(BatchLoader::new(
                Arc::new(warehouse),
                config.sink.insert_chunk,
            )))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::credentials::EnvCredentials;
    use crate::load::RAW_TABLE;

    fn full_credentials() -> EnvCredentials {
        EnvCredentials {
            account: Some("acct".to_string()),
            user: Some("loader".to_string()),
            password: Some("secret".to_string()),
        }
    }

    #[test]
    fn test_sink_kind_parsing() {
        assert_eq!("file".parse::<SinkKind>().unwrap(), SinkKind::File);
        assert_eq!(" Warehouse ".parse::<SinkKind>().unwrap(), SinkKind::Warehouse);
        assert_eq!("SNOWFLAKE".parse::<SinkKind>().unwrap(), SinkKind::Warehouse);
        assert!("s3".parse::<SinkKind>().is_err());
        assert_eq!(SinkKind::File.to_string(), "file");
    }

    #[tokio::test]
    async fn test_file_sink_selected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IngestConfig::default();
        config.sink.kind = SinkKind::File;
        config.sink.artifacts_dir = dir.path().to_path_buf();

        let sink = select_sink(&config, None).await.unwrap();
        assert!(sink.describe().ends_with("raw_ctgov_studies.ndjson"));
    }

    #[tokio::test]
    async fn test_warehouse_sink_requires_credentials() {
        let config = IngestConfig::default();
        let err = select_sink(&config, None).await.err().unwrap();
        assert!(matches!(err, SinkSetupError::Credential(CredentialError::Missing { .. })));
    }

    #[tokio::test]
    async fn test_warehouse_sink_selected_with_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IngestConfig::default();
        config.credential_env = full_credentials();
        config.warehouse.url = Some(format!("sqlite://{}", dir.path().join("wh.db").display()));

        let sink = select_sink(&config, None).await.unwrap();
        assert!(sink.describe().contains(RAW_TABLE));
        assert!(sink.describe().contains("CLINICAL_TRIALS_DEV.RAW"));
    }

    #[test]
    fn test_malformed_warehouse_url_rejected() {
        let mut config = IngestConfig::default().warehouse;
        config.url = Some("sqlite://wh.db?bogus=1".to_string());
        assert!(warehouse_from_config(&config, None).is_err());
    }

    #[tokio::test]
    async fn test_resolved_credentials_reach_warehouse() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = IngestConfig::default().warehouse;
        config.url = Some(format!("sqlite://{}", dir.path().join("wh.db").display()));

        let creds = WarehouseCredentials::new("acct", "loader", "secret");
        let warehouse = warehouse_from_config(&config, Some(creds.clone())).unwrap();
        assert_eq!(warehouse.credentials(), Some(&creds));

        let anonymous = warehouse_from_config(&config, None).unwrap();
        assert!(anonymous.credentials().is_none());
    }
}
