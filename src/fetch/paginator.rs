//! Cursor-driven pagination over a [`PageSource`].
//!
//! The loop runs until one of the stop conditions in [`StopReason`] fires.
//! Checks are applied after each page is merged, in this order: record
//! limit, page limit, missing continuation token, repeated token. Fetch
//! failures stop the loop with whatever was gathered so far.

use std::collections::HashSet;
use std::fmt;

use tracing::{info, instrument, warn};

use super::client::PageSource;
use super::record::Record;

/// Default page cap (0 = unlimited).
pub const DEFAULT_MAX_PAGES: u32 = 5;

/// Run-wide caps on pagination. Zero means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationLimits {
    /// Maximum pages to fetch.
    pub max_pages: u32,
    /// Maximum records to keep; the accumulator is truncated to this count.
    pub max_records: usize,
}

impl Default for PaginationLimits {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            max_records: 0,
        }
    }
}

impl PaginationLimits {
    /// No page or record cap.
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_pages: 0,
            max_records: 0,
        }
    }
}

/// Why the pagination loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The fetcher gave up after exhausting retries.
    FetchFailed,
    /// The record cap was reached.
    MaxRecords,
    /// The page cap was reached.
    MaxPages,
    /// The last page carried no continuation token.
    EndOfData,
    /// The registry returned a token already used this run.
    RepeatedToken,
}

impl StopReason {
    /// Returns the stable label used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchFailed => "fetch_failed",
            Self::MaxRecords => "max_records",
            Self::MaxPages => "max_pages",
            Self::EndOfData => "end_of_data",
            Self::RepeatedToken => "repeated_token",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one pagination run.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Records in fetch order.
    pub records: Vec<Record>,
    /// Pages successfully fetched.
    pub pages: u32,
    /// Condition that ended the loop.
    pub stop_reason: StopReason,
    /// Continuation tokens followed during the run.
    pub tokens_followed: usize,
}

/// Drives the fetch loop across pages.
#[derive(Debug, Clone, Default)]
pub struct Paginator {
    limits: PaginationLimits,
}

impl Paginator {
    /// Creates a paginator with the given caps.
    #[must_use]
    pub fn new(limits: PaginationLimits) -> Self {
        Self { limits }
    }

    /// Returns the configured caps.
    #[must_use]
    pub fn limits(&self) -> PaginationLimits {
        self.limits
    }

    /// Fetches pages until a stop condition fires.
    ///
    /// Never fails: a fetch failure ends the run with partial results.
    #[instrument(skip(self, source), fields(max_pages = self.limits.max_pages, max_records = self.limits.max_records))]
    pub async fn fetch_all(&self, source: &dyn PageSource) -> FetchOutcome {
        let mut records: Vec<Record> = Vec::new();
        let mut seen_tokens: HashSet<String> = HashSet::new();
        let mut page_token: Option<String> = None;
        let mut expected_pages: Option<u64> = None;
        let mut pages: u32 = 0;

        let stop_reason = loop {
            let page = match source.fetch_page(page_token.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(pages, collected = records.len(), error = %err, "stopping after fetch failure");
                    break StopReason::FetchFailed;
                }
            };

            if expected_pages.is_none()
                && let Some(total) = page.total_count
            {
                let estimate = total.div_ceil(u64::from(source.page_size().max(1))).max(1);
                expected_pages = Some(estimate);
                info!(total_count = total, expected_pages = estimate, "registry reported total");
            }

            let page_rows = page.studies.len();
            records.extend(page.studies);
            pages += 1;
            info!(
                page = pages,
                rows = page_rows,
                total = records.len(),
                has_next = page.next_page_token.is_some(),
                "fetched page"
            );

            if self.limits.max_records > 0 && records.len() >= self.limits.max_records {
                records.truncate(self.limits.max_records);
                info!(max_records = self.limits.max_records, "reached record limit");
                break StopReason::MaxRecords;
            }
            if self.limits.max_pages > 0 && pages >= self.limits.max_pages {
                info!(max_pages = self.limits.max_pages, "reached page limit");
                break StopReason::MaxPages;
            }

            let Some(next) = page.next_page_token.filter(|token| !token.is_empty()) else {
                break StopReason::EndOfData;
            };
            if !seen_tokens.insert(next.clone()) {
                warn!(token = %next, "continuation token repeated; stopping");
                break StopReason::RepeatedToken;
            }
            page_token = Some(next);
        };

        info!(collected = records.len(), pages, stop = %stop_reason, "pagination finished");
        FetchOutcome {
            records,
            pages,
            stop_reason,
            tokens_followed: seen_tokens.len(),
        }
    }
}
