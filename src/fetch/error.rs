//! Error types for registry fetches.

use thiserror::Error;

/// Maximum characters of an error response body kept for logging.
pub const BODY_PREVIEW_CHARS: usize = 500;

/// Errors from a single request attempt, or from exhausting all attempts.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection refused, reset, TLS).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// Request URL without query string.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The attempt exceeded the configured per-attempt timeout.
    #[error("timeout requesting {url}")]
    Timeout {
        /// Request URL without query string.
        url: String,
    },

    /// Non-2xx response.
    #[error("HTTP {status} from {url}: {body_preview}")]
    HttpStatus {
        /// Request URL without query string.
        url: String,
        /// Response status code.
        status: u16,
        /// Truncated, single-line response body.
        body_preview: String,
    },

    /// The response body was not a valid page document.
    #[error("invalid page payload from {url}: {message}")]
    Decode {
        /// Request URL without query string.
        url: String,
        /// Decoder error text.
        message: String,
    },

    /// Every attempt failed; carries the last attempt's error.
    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Error from the final attempt.
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Classifies a reqwest error as timeout or network failure.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error, truncating the body for logging.
    pub fn http_status(url: impl Into<String>, status: u16, body: &str) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            body_preview: body_preview(body),
        }
    }

    /// Creates a decode error.
    pub fn decode(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Wraps the final attempt error after retries are exhausted.
    #[must_use]
    pub fn exhausted(attempts: u32, last: FetchError) -> Self {
        Self::Exhausted {
            attempts,
            last: Box::new(last),
        }
    }

    /// Returns the HTTP status, when the (last) failure was a status error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            Self::Network { .. } | Self::Timeout { .. } | Self::Decode { .. } => None,
        }
    }
}

/// Truncates a response body to [`BODY_PREVIEW_CHARS`] and flattens newlines.
#[must_use]
pub fn body_preview(body: &str) -> String {
    body.chars()
        .take(BODY_PREVIEW_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}
