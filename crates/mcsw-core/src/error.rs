//! Normalized remote operation errors.
//!
//! A failure coming off the wire is a [`RemoteFailure`]. Once it is tied to
//! the operation that produced it, it becomes an [`OperationError`], the
//! only error shape handed to callers of remote operations. The two are
//! distinct types, so "already normalized" never needs to be guessed.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The media server (or the link to it) is unavailable.
pub const MEDIA_SERVER_OFFLINE: i64 = 2001;

/// A remote call did not complete within the configured call timeout.
pub const REQUEST_TIMEOUT: i64 = 2002;

/// Error code as sent by the remote: numeric or symbolic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Numeric(i64),
    Named(String),
}

impl Default for ErrorCode {
    fn default() -> Self {
        Self::Numeric(0)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(code) => write!(f, "{code}"),
            Self::Named(code) => f.write_str(code),
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        Self::Numeric(code)
    }
}

/// Raw failure payload of a rejected remote call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RemoteFailure {
    #[serde(default)]
    pub code: ErrorCode,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// Normalized error of a remote operation:
/// `{code, message, details, operation, params}`.
///
/// Immutable once built; it is passed through unchanged to whoever called
/// the operation.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{operation} failed with code {code}: {message}")]
pub struct OperationError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub details: Value,
    pub operation: String,
    #[serde(default)]
    pub params: Value,
}

impl OperationError {
    /// Normalizes a wire failure for `operation` called with `params`.
    pub fn from_remote(failure: RemoteFailure, operation: impl Into<String>, params: Value) -> Self {
        Self {
            code: failure.code,
            message: failure.message,
            details: failure.details,
            operation: operation.into(),
            params,
        }
    }

    /// The link could not carry the call (not open, or lost while pending).
    pub fn offline(operation: impl Into<String>, params: Value, reason: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Numeric(MEDIA_SERVER_OFFLINE),
            message: "MEDIA_SERVER_OFFLINE".to_string(),
            details: Value::String(reason.into()),
            operation: operation.into(),
            params,
        }
    }

    /// The call was sent but no answer arrived in time.
    pub fn timeout(operation: impl Into<String>, params: Value, after_ms: u64) -> Self {
        Self {
            code: ErrorCode::Numeric(REQUEST_TIMEOUT),
            message: "REQUEST_TIMEOUT".to_string(),
            details: Value::String(format!("no response after {after_ms}ms")),
            operation: operation.into(),
            params,
        }
    }

    /// The remote answered but the result did not have the expected shape.
    pub fn malformed(operation: impl Into<String>, params: Value, reason: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::Named("MALFORMED_RESPONSE".to_string()),
            message: "MALFORMED_RESPONSE".to_string(),
            details: Value::String(reason.into()),
            operation: operation.into(),
            params,
        }
    }

    /// Returns true if the error came from the link being unavailable.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.code == ErrorCode::Numeric(MEDIA_SERVER_OFFLINE)
    }
}
