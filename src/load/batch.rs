//! Batch identifiers tagging every row written by one ingestion run.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

/// Identifier shared by all rows of one load.
///
/// Format: `batch_YYYYMMDD_HHMMSS_xxxx` (UTC, second granularity) where
/// `xxxx` is a random 16-bit hex suffix so two runs started in the same
/// second do not collide in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Generates an identifier from the current UTC time.
    #[must_use]
    pub fn generate() -> Self {
        Self::at(Utc::now(), rand::thread_rng().r#gen())
    }

    /// Builds an identifier for a given start time and suffix.
    #[must_use]
    pub fn at(started_at: DateTime<Utc>, suffix: u16) -> Self {
        Self(format!(
            "batch_{}_{suffix:04x}",
            started_at.format("%Y%m%d_%H%M%S")
        ))
    }

    /// Returns the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
