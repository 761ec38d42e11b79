//! Run configuration.
//!
//! [`IngestConfig`] is built once at startup from a variable lookup and then
//! passed into every component; nothing below this module reads process
//! state. [`IngestConfig::from_env`] is the adapter over `std::env`.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::credentials::EnvCredentials;
use crate::fetch::{
    DEFAULT_BASE_URL, DEFAULT_HTTP_TIMEOUT, DEFAULT_MAX_PAGES, OPEN_END_DATE, PaginationLimits,
    StudyQuery,
};
use crate::load::{DEFAULT_ARTIFACTS_DIR, DEFAULT_INSERT_CHUNK, SinkKind};

/// Default page size requested from the registry.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Default lower bound on first submission date.
pub const DEFAULT_START_DATE: &str = "2015-01-01";

const MAX_PAGE_SIZE: u32 = 1000;
const MAX_TIMEOUT_SECS: u64 = 3600;
const MAX_INSERT_CHUNK: usize = 100_000;

/// Configuration errors; all are raised before any network activity.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A value could not be parsed or is out of range.
    #[error("invalid value for `{name}`: {value:?}\n  Suggestion: {expected}")]
    Invalid {
        /// Variable or flag name.
        name: &'static str,
        /// Offending value.
        value: String,
        /// What would be accepted.
        expected: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, value: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Registry request settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Studies endpoint.
    pub base_url: Url,
    /// Rows per page (1..=1000).
    pub page_size: u32,
    /// Lower bound on first submission date (`YYYY-MM-DD`).
    pub start_date: String,
    /// Upper bound (`YYYY-MM-DD`) or `MAX` for none.
    pub end_date: String,
    /// Per-attempt request timeout.
    pub timeout: Duration,
}

impl ApiConfig {
    /// Builds the search query for this configuration.
    #[must_use]
    pub fn study_query(&self) -> StudyQuery {
        StudyQuery::new(self.page_size, &self.start_date, &self.end_date)
    }
}

/// Output settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Which sink receives the batch.
    pub kind: SinkKind,
    /// Rows per committed warehouse chunk.
    pub insert_chunk: usize,
    /// Directory for the NDJSON file sink.
    pub artifacts_dir: PathBuf,
}

/// Warehouse location and session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    /// Explicit connection URL; derived from `database` when absent.
    pub url: Option<String>,
    /// Compute warehouse name.
    pub warehouse: String,
    /// Database name.
    pub database: String,
    /// Schema name.
    pub schema: String,
    /// Optional role.
    pub role: Option<String>,
    /// Secret-store id holding credentials.
    pub secret_id: Option<String>,
}

impl WarehouseConfig {
    /// Returns the connection URL, defaulting to a local database file
    /// named after the database.
    #[must_use]
    pub fn connection_url(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}.db", self.database.to_ascii_lowercase()))
    }

    /// Returns `DATABASE.SCHEMA` for logs.
    #[must_use]
    pub fn qualified_schema(&self) -> String {
        format!("{}.{}", self.database, self.schema)
    }
}

/// Complete configuration for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Registry request settings.
    pub api: ApiConfig,
    /// Pagination caps.
    pub limits: PaginationLimits,
    /// Output settings.
    pub sink: SinkConfig,
    /// Warehouse settings.
    pub warehouse: WarehouseConfig,
    /// Credential values captured from the environment.
    pub credential_env: EnvCredentials,
    /// Fallback log level when `RUST_LOG` is unset.
    pub log_level: LevelFilter,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: default_base_url(),
                page_size: DEFAULT_PAGE_SIZE,
                start_date: DEFAULT_START_DATE.to_string(),
                end_date: OPEN_END_DATE.to_string(),
                timeout: DEFAULT_HTTP_TIMEOUT,
            },
            limits: PaginationLimits {
                max_pages: DEFAULT_MAX_PAGES,
                max_records: 0,
            },
            sink: SinkConfig {
                kind: SinkKind::Warehouse,
                insert_chunk: DEFAULT_INSERT_CHUNK,
                artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            },
            warehouse: WarehouseConfig {
                url: None,
                warehouse: "TRANSFORM_WH".to_string(),
                database: "CLINICAL_TRIALS_DEV".to_string(),
                schema: "RAW".to_string(),
                role: None,
                secret_id: None,
            },
            credential_env: EnvCredentials::default(),
            log_level: LevelFilter::INFO,
        }
    }
}

#[allow(clippy::expect_used)]
fn default_base_url() -> Url {
    Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid")
}

impl IngestConfig {
    /// Reads configuration from the process environment, applies
    /// `overrides`, then validates once.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed or out-of-range values.
    pub fn from_env(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup_with(|name| std::env::var(name).ok(), overrides)
    }

    /// Reads configuration through `lookup`; blank values count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed or out-of-range values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_lookup_with(lookup, &ConfigOverrides::default())
    }

    /// Reads configuration through `lookup` and layers `overrides` on top.
    ///
    /// Range checks run on the merged result, so an out-of-range variable
    /// can be corrected by an override.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed or out-of-range values.
    pub fn from_lookup_with<F>(lookup: F, overrides: &ConfigOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::read_lookup(lookup)?;
        config.merge(overrides)?;
        config.validate()?;
        Ok(config)
    }

    fn read_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(raw) = get("CTGOV_BASE_URL") {
            config.api.base_url = parse_url("CTGOV_BASE_URL", &raw)?;
        }
        if let Some(raw) = get("CTGOV_PAGE_SIZE") {
            config.api.page_size = parse_number("CTGOV_PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = get("CTGOV_MAX_PAGES") {
            config.limits.max_pages = parse_number("CTGOV_MAX_PAGES", &raw)?;
        }
        if let Some(raw) = get("CTGOV_MAX_RECORDS") {
            config.limits.max_records = parse_number("CTGOV_MAX_RECORDS", &raw)?;
        }
        if let Some(raw) = get("CTGOV_START_DATE") {
            config.api.start_date = raw;
        }
        if let Some(raw) = get("CTGOV_END_DATE") {
            config.api.end_date = raw;
        }
        if let Some(raw) = get("HTTP_TIMEOUT_SECONDS") {
            config.api.timeout = Duration::from_secs(parse_number("HTTP_TIMEOUT_SECONDS", &raw)?);
        }
        if let Some(raw) = get("SINK") {
            config.sink.kind = parse_sink("SINK", &raw)?;
        }
        if let Some(raw) = get("WAREHOUSE_INSERT_CHUNK") {
            config.sink.insert_chunk = parse_number("WAREHOUSE_INSERT_CHUNK", &raw)?;
        }
        if let Some(raw) = get("ARTIFACTS_DIR") {
            config.sink.artifacts_dir = PathBuf::from(raw);
        }

        config.warehouse.url = get("WAREHOUSE_URL");
        if let Some(raw) = get("WAREHOUSE_NAME") {
            config.warehouse.warehouse = raw;
        }
        if let Some(raw) = get("WAREHOUSE_DATABASE") {
            config.warehouse.database = raw;
        }
        if let Some(raw) = get("WAREHOUSE_SCHEMA") {
            config.warehouse.schema = raw;
        }
        config.warehouse.role = get("WAREHOUSE_ROLE");
        config.warehouse.secret_id = get("WAREHOUSE_SECRET_ID");
        config.credential_env = EnvCredentials::from_lookup(&get);

        if let Some(raw) = get("LOG_LEVEL") {
            config.log_level = parse_log_level(&raw);
        }

        Ok(config)
    }

    /// Applies command-line overrides, then re-validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an override is invalid.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        self.merge(overrides)?;
        self.validate()
    }

    fn merge(&mut self, overrides: &ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(page_size) = overrides.page_size {
            self.api.page_size = page_size;
        }
        if let Some(max_pages) = overrides.max_pages {
            self.limits.max_pages = max_pages;
        }
        if let Some(max_records) = overrides.max_records {
            self.limits.max_records = max_records;
        }
        if let Some(start_date) = &overrides.start_date {
            self.api.start_date.clone_from(start_date);
        }
        if let Some(end_date) = &overrides.end_date {
            self.api.end_date.clone_from(end_date);
        }
        if let Some(secs) = overrides.timeout_secs {
            self.api.timeout = Duration::from_secs(secs);
        }
        if let Some(sink) = &overrides.sink {
            self.sink.kind = parse_sink("--sink", sink)?;
        }
        if let Some(chunk) = overrides.insert_chunk {
            self.sink.insert_chunk = chunk;
        }
        Ok(())
    }

    /// Checks ranges and formats.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.api.page_size) {
            return Err(ConfigError::invalid(
                "CTGOV_PAGE_SIZE",
                self.api.page_size.to_string(),
                format!("expected range 1..={MAX_PAGE_SIZE}"),
            ));
        }
        let timeout_secs = self.api.timeout.as_secs();
        if !(1..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(ConfigError::invalid(
                "HTTP_TIMEOUT_SECONDS",
                timeout_secs.to_string(),
                format!("expected range 1..={MAX_TIMEOUT_SECS}"),
            ));
        }
        if !(1..=MAX_INSERT_CHUNK).contains(&self.sink.insert_chunk) {
            return Err(ConfigError::invalid(
                "WAREHOUSE_INSERT_CHUNK",
                self.sink.insert_chunk.to_string(),
                format!("expected range 1..={MAX_INSERT_CHUNK}"),
            ));
        }
        validate_date("CTGOV_START_DATE", &self.api.start_date, false)?;
        validate_date("CTGOV_END_DATE", &self.api.end_date, true)?;
        Ok(())
    }
}

/// Values supplied on the command line; `None` keeps the configured value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// `--page-size`.
    pub page_size: Option<u32>,
    /// `--max-pages`.
    pub max_pages: Option<u32>,
    /// `--max-records`.
    pub max_records: Option<usize>,
    /// `--start-date`.
    pub start_date: Option<String>,
    /// `--end-date`.
    pub end_date: Option<String>,
    /// `--timeout-secs`.
    pub timeout_secs: Option<u64>,
    /// `--sink`.
    pub sink: Option<String>,
    /// `--chunk-size`.
    pub insert_chunk: Option<usize>,
}

fn parse_number<T: std::str::FromStr>(name: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::invalid(name, raw, "expected a non-negative integer"))
}

/// Maps a level name to a filter. Accepts the Python-style `WARNING` and
/// `CRITICAL` names; anything unrecognized falls back to `info`.
fn parse_log_level(raw: &str) -> LevelFilter {
    match raw.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" | "warning" => LevelFilter::WARN,
        "error" | "critical" | "fatal" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::invalid(name, raw, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(name, raw, "expected an http(s) URL"));
    }
    Ok(url)
}

fn parse_sink(name: &'static str, raw: &str) -> Result<SinkKind, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::invalid(name, raw, "expected one of: file, warehouse"))
}

fn validate_date(name: &'static str, raw: &str, allow_open: bool) -> Result<(), ConfigError> {
    if allow_open && raw.eq_ignore_ascii_case(OPEN_END_DATE) {
        return Ok(());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| {
            let expected = if allow_open {
                "expected YYYY-MM-DD or MAX"
            } else {
                "expected YYYY-MM-DD"
            };
            ConfigError::invalid(name, raw, expected)
        })
}
