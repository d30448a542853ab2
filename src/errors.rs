//! Typed error taxonomy for the ingestion & analysis pipeline.
//!
//! Mirrors the classes in the error handling design: transient errors are
//! retried via the queue ladder, everything else routes straight to the
//! dead-letter tier. Repositories and adapters raise these; `anyhow::Error`
//! is used at service boundaries that just need to propagate with context.

use thiserror::Error;

/// Errors raised by a vendor adapter while fetching or parsing meetings.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("vendor={vendor} city={city_slug}: http request failed: {source}")]
    Http {
        vendor: String,
        city_slug: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("vendor={vendor} city={city_slug}: failed to parse response: {message}")]
    Parsing {
        vendor: String,
        city_slug: String,
        message: String,
    },

    #[error("vendor={vendor} city={city_slug}: unsupported operation: {message}")]
    Unsupported {
        vendor: String,
        city_slug: String,
        message: String,
    },
}

impl VendorError {
    /// Transient errors are safe to retry through the queue ladder;
    /// parsing and unsupported errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VendorError::Http { .. })
    }
}

/// Errors raised while turning a URL into normalized text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to download {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unsupported content type for {url}: {content_type}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("{url} produced no extractable text")]
    Empty { url: String },

    #[error("failed to parse PDF at {url}: {message}")]
    Pdf { url: String, message: String },
}

/// Validation failures for malformed domain records.
///
/// Non-retryable: the offending record is stored with minimal fields and
/// excluded from downstream LLM work rather than blocking the rest of a
/// meeting.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("postcondition failed: {0}")]
    PostconditionFailed(String),

    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ValidationError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Raised when an LLM batch response cannot be bound back to the item that
/// requested it (missing key, or the content-matching remap fails to find a
/// confident match).
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("no response for item key {item_key}")]
    MissingKey { item_key: String },

    #[error("response for item key {item_key} failed content-match remap")]
    UnresolvedRemap { item_key: String },
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Request(_) | LlmError::Provider { .. })
    }
}

/// Errors raised by the job queue / store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl StoreError {
    /// Database errors (connection drop, deadlock) are transient;
    /// validation failures recur on every retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_))
    }
}
