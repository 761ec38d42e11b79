//! Registry fetching: bounded-retry HTTP requests and cursor pagination.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use ctgov_ingest::fetch::{PaginationLimits, Paginator, RegistryClient, StudyQuery};
//! use url::Url;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = RegistryClient::new(
//!     Url::parse("https://clinicaltrials.gov/api/v2/studies")?,
//!     StudyQuery::new(100, "2015-01-01", "MAX"),
//!     Duration::from_secs(30),
//! )?;
//! let outcome = Paginator::new(PaginationLimits::default()).fetch_all(&client).await;
//! println!("{} records in {} pages", outcome.records.len(), outcome.pages);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod paginator;
mod query;
mod record;
mod retry;

pub use client::{DEFAULT_BASE_URL, DEFAULT_HTTP_TIMEOUT, PageSource, RegistryClient};
pub use error::{BODY_PREVIEW_CHARS, FetchError, body_preview};
pub use paginator::{DEFAULT_MAX_PAGES, FetchOutcome, PaginationLimits, Paginator, StopReason};
pub use query::{OPEN_END_DATE, STUDY_FIELDS, StudyQuery};
pub use record::{Page, Record};
pub use retry::{DEFAULT_MAX_ATTEMPTS, Delay, RetryDecision, RetryPolicy, TokioDelay};
