use reqwest::StatusCode;

use crate::models::job::Stage;

/// How the retry policy should treat a failed collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeout, rate limit or upstream 5xx. Retried with backoff.
    Transient,
    /// Validation or auth/permission failure. Fails the stage immediately.
    NonRetryable,
    /// Asset is out of scope for the pipeline. The job is skipped, not failed.
    Skip,
}

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExternalError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{service} unavailable: {message}")]
    Transient { service: String, message: String },

    #[error("{service} rejected the request: {message}")]
    NonRetryable { service: String, message: String },

    #[error("asset is not analyzable: {0}")]
    NotAnalyzable(String),

    #[error("cost guard rejected analysis: {0}")]
    CostGuardRejected(String),
}

impl ExternalError {
    pub fn transient(service: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            service: service.to_string(),
            message: message.into(),
        }
    }

    pub fn non_retryable(service: &str, message: impl Into<String>) -> Self {
        Self::NonRetryable {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// Default classifier used by the pipeline.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transient { .. } => ErrorClass::Transient,
            Self::Validation(_) | Self::NonRetryable { .. } => ErrorClass::NonRetryable,
            Self::NotAnalyzable(_) | Self::CostGuardRejected(_) => ErrorClass::Skip,
        }
    }

    /// Map a non-success HTTP status onto the taxonomy.
    pub fn from_status(service: &str, status: StatusCode, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
        if status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
            || status.is_server_error()
        {
            Self::transient(service, message)
        } else {
            Self::non_retryable(service, message)
        }
    }

    /// Map a transport-level reqwest failure onto the taxonomy.
    pub fn from_reqwest(service: &str, err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(service, status, &err.to_string());
        }
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            Self::transient(service, err.to_string())
        } else {
            Self::non_retryable(service, err.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Outcome of a pipeline stage that did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage} failed after {attempts} attempt(s): {source}")]
    StageFailed {
        stage: Stage,
        attempts: u32,
        #[source]
        source: ExternalError,
    },

    #[error("skipped: {0}")]
    Skipped(String),

    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    /// Convert a collaborator error that the retry policy gave up on.
    pub fn from_external(stage: Stage, attempts: u32, err: ExternalError) -> Self {
        let class = err.class();
        Self::classified(stage, attempts, err, class)
    }

    /// Same as [`PipelineError::from_external`], with the class decided by
    /// a caller-supplied classifier.
    pub fn classified(stage: Stage, attempts: u32, err: ExternalError, class: ErrorClass) -> Self {
        match class {
            ErrorClass::Skip => Self::Skipped(err.to_string()),
            _ => Self::StageFailed {
                stage,
                attempts,
                source: err,
            },
        }
    }
}
