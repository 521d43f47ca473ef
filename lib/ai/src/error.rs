//! Error types for the AI crate.
//!
//! `LlmError` covers talking to a language model backend. The advisor maps
//! every one of them to the fallback suggestions, so these errors only ever
//! reach logs and tests.

use std::fmt;

/// Errors from LLM backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// No backend is configured.
    NotConfigured,
    /// The request could not be sent or the connection dropped.
    RequestFailed { reason: String },
    /// The provider answered with a failure status.
    Status { status: u16, body: String },
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// The response did not have the expected shape.
    ResponseParseFailed { reason: String },
    /// No answer within the advisor's time budget.
    Timeout { after_ms: u64 },
    /// The reply contained no usable suggestion.
    EmptyResponse,
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "no LLM backend configured"),
            Self::RequestFailed { reason } => write!(f, "LLM request failed: {reason}"),
            Self::Status { status, body } => {
                write!(f, "LLM provider returned status {status}: {body}")
            }
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::Timeout { after_ms } => write!(f, "LLM request timed out after {after_ms}ms"),
            Self::EmptyResponse => write!(f, "LLM returned no usable suggestions"),
        }
    }
}

impl std::error::Error for LlmError {}
