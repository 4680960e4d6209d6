//! Classification of provider failures into retry decisions.
//!
//! The HTTP client reports raw [`ApiFailure`] values. [`classify`] folds them
//! into a [`FailureKind`] so the orchestrators can switch on the tag instead
//! of inspecting status codes and response bodies themselves.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Fragment the provider places in a 400 body when a label is already taken.
pub const LABEL_CONFLICT_MESSAGE: &str = "label must be unique";

/// Raw failure reported by a [`crate::linode::LinodeApi`] implementation.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiFailure {
    /// The connection or the request timed out.
    #[error("request timed out: {message}")]
    Timeout {
        /// Message reported by the HTTP client.
        message: String,
    },
    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Value of the `Retry-After` header in seconds, when present.
        retry_after: Option<u64>,
        /// Raw response body.
        body: String,
    },
    /// The request failed before a response was received.
    #[error("transport failure: {message}")]
    Transport {
        /// Message reported by the HTTP client.
        message: String,
    },
    /// A success response could not be decoded.
    #[error("failed to decode provider response: {message}")]
    Decode {
        /// Decoder error message.
        message: String,
    },
}

/// One entry of the provider's structured error list.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct FieldError {
    /// Request field the error refers to, when the provider names one.
    #[serde(default)]
    pub field: Option<String>,
    /// Human readable reason.
    pub reason: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    errors: Vec<FieldError>,
}

/// Decodes the `{"errors": [{"field": .., "reason": ..}]}` body returned by
/// the provider on client errors.
///
/// # Errors
///
/// Returns the decoder error when the body does not match that shape.
pub fn decode_field_errors(body: &str) -> Result<Vec<FieldError>, serde_json::Error> {
    serde_json::from_str::<ErrorEnvelope>(body).map(|envelope| envelope.errors)
}

/// Retry decision derived from an [`ApiFailure`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FailureKind {
    /// Timeout; retry with exponential backoff.
    Transient,
    /// Provider backpressure; retry after the hinted delay plus jitter.
    RateLimited {
        /// Delay requested by the provider (zero when the header is absent).
        retry_after: Duration,
    },
    /// The generated label raced with another instance; regenerate and retry.
    LabelConflict,
    /// The request was rejected; never retried.
    UserError {
        /// Decoded field errors, or `None` when the body could not be decoded.
        errors: Option<Vec<FieldError>>,
    },
    /// The resource does not exist.
    NotFound,
    /// Anything else; never retried.
    Unknown,
}

impl FailureKind {
    /// Returns `true` for failures that are retried after a backoff sleep.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited { .. })
    }

    /// Short name used in log lines.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Transient => "Transient",
            Self::RateLimited { .. } => "RateLimited",
            Self::LabelConflict => "LabelConflict",
            Self::UserError { .. } => "UserError",
            Self::NotFound => "NotFound",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps a raw provider failure to its [`FailureKind`].
#[must_use]
pub fn classify(failure: &ApiFailure) -> FailureKind {
    match failure {
        ApiFailure::Timeout { .. } | ApiFailure::Http { status: 408, .. } => FailureKind::Transient,
        ApiFailure::Http {
            status: 429,
            retry_after,
            ..
        } => FailureKind::RateLimited {
            retry_after: Duration::from_secs(retry_after.unwrap_or(0)),
        },
        ApiFailure::Http {
            status: 400, body, ..
        } => {
            if body.to_ascii_lowercase().contains(LABEL_CONFLICT_MESSAGE) {
                FailureKind::LabelConflict
            } else {
                FailureKind::UserError {
                    errors: decode_field_errors(body).ok(),
                }
            }
        }
        ApiFailure::Http { status: 404, .. } => FailureKind::NotFound,
        ApiFailure::Http { .. } | ApiFailure::Transport { .. } | ApiFailure::Decode { .. } => {
            FailureKind::Unknown
        }
    }
}

#[cfg(test)]
mod tests;
