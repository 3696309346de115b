//! Error types for the docsift library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`InferenceError`] — a single backend call failed (connection refused,
//!   timeout, bad HTTP status). These are *transient-or-not* decisions: the
//!   gateway inspects them to choose between retry, backoff, and fallback,
//!   so they carry the host, elapsed time, and HTTP status where known.
//!
//! * [`ExtractError`] — a pipeline stage failed for one document (inference
//!   exhausted, unparseable model output, validation below threshold). These
//!   are terminal for the document but never escape the orchestrator: it
//!   converts them into a failed [`crate::ExtractionRecord`] with a stable
//!   error code, so a batch of N documents always yields N records.

use std::time::Duration;
use thiserror::Error;

/// HTTP statuses worth retrying: request timeout, rate limit, and the
/// transient 5xx family. Anything else (400/401/403/404 …) is a caller or
/// configuration problem that retrying cannot fix.
pub(crate) const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// A failure from a single completion-backend call.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Could not reach the backend at all.
    #[error("Connection to '{host}' failed: {detail}")]
    Connection { host: String, detail: String },

    /// The call exceeded the configured request timeout.
    #[error("Request to '{provider}' timed out after {elapsed:?} (limit {timeout_secs}s)")]
    Timeout {
        provider: String,
        timeout_secs: u64,
        elapsed: Duration,
    },

    /// The backend answered, but with an error status or an unusable body.
    ///
    /// `status` is `Some` for HTTP-level failures so retry logic can
    /// discriminate (429 backs off, 401 aborts); `None` for body-level
    /// problems such as an empty completion.
    #[error("Invalid response from '{provider}'{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Response {
        provider: String,
        status: Option<u16>,
        detail: String,
    },

    /// The backend cannot be constructed (missing API key etc.).
    #[error("Backend '{provider}' is not configured: {hint}")]
    NotConfigured { provider: String, hint: String },
}

impl InferenceError {
    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            InferenceError::Response { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether another attempt against the same backend could succeed.
    ///
    /// Timeouts and connection failures are always retryable. Response
    /// errors are retryable only for 408/429/5xx; a response error without
    /// an HTTP status (malformed body) is retried since the next completion
    /// may well be fine. Misconfiguration is never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            InferenceError::Connection { .. } | InferenceError::Timeout { .. } => true,
            InferenceError::Response { status, .. } => match status {
                Some(code) => RETRYABLE_STATUSES.contains(code),
                None => true,
            },
            InferenceError::NotConfigured { .. } => false,
        }
    }

    /// Stable machine-readable code for logs and failed records.
    pub fn code(&self) -> &'static str {
        match self {
            InferenceError::Connection { .. } => "LLM_CONNECTION_FAILED",
            InferenceError::Timeout { .. } => "LLM_TIMEOUT",
            InferenceError::Response { .. } => "LLM_INVALID_RESPONSE",
            InferenceError::NotConfigured { .. } => "LLM_NOT_CONFIGURED",
        }
    }
}

/// A terminal failure for a single document's extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// All inference attempts (primary retries + fallback) failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// No strategy could recover a JSON object from the model output.
    ///
    /// `snippet` holds a bounded copy of the raw completion for diagnostics.
    #[error("Failed to parse model output: {detail}")]
    ParseFailure { detail: String, snippet: String },

    /// The extraction validated below the configured quality bar.
    #[error("Extraction failed validation: score {score:.3} with {critical_issues} critical issue(s)")]
    ValidationFailure {
        score: f64,
        critical_issues: usize,
    },

    /// The document text was empty or whitespace-only.
    #[error("Document contains no extractable text")]
    EmptyDocument,

    /// Builder or environment validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExtractError {
    /// Stable machine-readable code, used as `error.code` in failed records.
    pub fn code(&self) -> &'static str {
        match self {
            ExtractError::Inference(e) => e.code(),
            ExtractError::ParseFailure { .. } => "PARSE_FAILURE",
            ExtractError::ValidationFailure { .. } => "VALIDATION_FAILURE",
            ExtractError::EmptyDocument => "EMPTY_DOCUMENT",
            ExtractError::InvalidConfig(_) => "INVALID_CONFIG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_and_connection_are_retryable() {
        let t = InferenceError::Timeout {
            provider: "ollama".into(),
            timeout_secs: 60,
            elapsed: Duration::from_secs(61),
        };
        assert!(t.is_retryable());

        let c = InferenceError::Connection {
            host: "http://localhost:11434".into(),
            detail: "connection refused".into(),
        };
        assert!(c.is_retryable());
    }

    #[test]
    fn status_discrimination() {
        let retryable = [408u16, 429, 500, 502, 503, 504];
        for code in retryable {
            let e = InferenceError::Response {
                provider: "groq".into(),
                status: Some(code),
                detail: String::new(),
            };
            assert!(e.is_retryable(), "HTTP {code} should be retryable");
        }
        for code in [400u16, 401, 403, 404, 422] {
            let e = InferenceError::Response {
                provider: "groq".into(),
                status: Some(code),
                detail: String::new(),
            };
            assert!(!e.is_retryable(), "HTTP {code} should abort");
        }
    }

    #[test]
    fn bodyless_response_error_is_retryable() {
        let e = InferenceError::Response {
            provider: "ollama".into(),
            status: None,
            detail: "Empty response from model".into(),
        };
        assert!(e.is_retryable());
    }

    #[test]
    fn extract_error_codes_are_stable() {
        let e = ExtractError::ParseFailure {
            detail: "no object found".into(),
            snippet: "garbage".into(),
        };
        assert_eq!(e.code(), "PARSE_FAILURE");

        let v = ExtractError::ValidationFailure {
            score: 0.2,
            critical_issues: 2,
        };
        assert_eq!(v.code(), "VALIDATION_FAILURE");
        assert!(v.to_string().contains("0.200"));
    }

    #[test]
    fn response_error_display_includes_status() {
        let e = InferenceError::Response {
            provider: "groq".into(),
            status: Some(429),
            detail: "rate limited".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("429"), "got: {msg}");
        assert!(msg.contains("groq"));
    }
}
