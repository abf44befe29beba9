use thiserror::Error;

use crate::browser::SignError;

/// Failure of a single note fetch
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The request was malformed before it left the process
    #[error("validation failed: {0}")]
    Validation(String),

    /// The remote service rejected the request (auth expired, rate limited, note removed)
    #[error("data fetch failed (code {code}): {message}")]
    Fetch { code: i64, message: String },

    /// Transport or signing trouble that may clear up on another attempt
    #[error("transient failure: {0}")]
    Transient(String),

    /// Anything else; the note is abandoned without further attempts
    #[error("fatal failure: {0}")]
    Fatal(String),
}

impl CrawlError {
    /// Whether the orchestrator should spend another attempt on this note
    pub fn is_retryable(&self) -> bool {
        matches!(self, CrawlError::Fetch { .. } | CrawlError::Transient(_))
    }

    /// Short label used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            CrawlError::Validation(_) => "validation",
            CrawlError::Fetch { .. } => "fetch",
            CrawlError::Transient(_) => "transient",
            CrawlError::Fatal(_) => "fatal",
        }
    }
}

impl From<SignError> for CrawlError {
    fn from(err: SignError) -> Self {
        CrawlError::Transient(format!("signing failed: {}", err))
    }
}

impl From<reqwest::Error> for CrawlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CrawlError::Fatal(format!("undecodable response: {}", err))
        } else {
            CrawlError::Transient(format!("request failed: {}", err))
        }
    }
}
