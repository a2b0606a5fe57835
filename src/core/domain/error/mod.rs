use std::backtrace::Backtrace;
use thiserror::Error;

/// The main error type for all reconciliation and API operations.
///
/// Variants map onto the failure classes a caller has to distinguish:
/// transport problems are retriable, API errors only when the cluster says
/// so, validation failures are fatal before any call is issued.
#[derive(Error, Debug)]
pub enum PveError {
    /// Connectivity, TLS or HTTP framing failure. The request may never
    /// have reached the cluster; callers are free to retry.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A non-2xx response from the cluster. `body` is kept verbatim because
    /// PVE reports per-field reasons only there (`{errors: {field: msg}}`).
    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        body: String,
    },

    /// Login failed, or the ticket response was missing the ticket or the
    /// CSRF prevention token. Never retried without a fresh login.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A desired-state value failed validation before any API call.
    #[error("Validation error: {source}")]
    Validation {
        source: ValidationError,
        #[backtrace]
        backtrace: Backtrace,
    },

    /// The cluster rejected the request outright (HTTP 400/409), with its
    /// own message preserved.
    #[error("Conflict ({status}): {message}")]
    Conflict { status: u16, message: String },

    /// A lock wait or state wait exceeded its deadline.
    #[error("Timed out after {elapsed_secs}s waiting for {operation}")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    /// An object stayed absent after the create-then-read retries.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl PveError {
    /// Whether a retry can reasonably be expected to succeed without any
    /// operator intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            PveError::Transport(_) => true,
            PveError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<ValidationError> for PveError {
    fn from(error: ValidationError) -> Self {
        PveError::Validation {
            source: error,
            backtrace: Backtrace::capture(),
        }
    }
}

/// Specialized error type for validation failures.
///
/// Decoders always embed the offending input in the message so the caller
/// can see exactly which configuration string the cluster handed back.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A named field failed validation.
    #[error("Field '{field}' validation failed: {message}")]
    Field { field: String, message: String },

    /// A configuration string could not be parsed.
    #[error("Format error: {0}")]
    Format(String),

    /// A domain invariant would be violated (position out of range, disk
    /// shrink, duplicate slot, ...).
    #[error("Domain constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Type alias for Results that may fail with a PveError
pub type PveResult<T> = Result<T, PveError>;
