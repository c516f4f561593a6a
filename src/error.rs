use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced to whoever drives a session.
///
/// Per-probe failures never show up here: they are recorded as metric
/// samples. Fatal transport errors that happen while a continuous session is
/// running are logged and recovered from instead.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("transport unavailable: {0}")]
    Transport(#[from] TransportError),
}

impl SessionError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        SessionError::InvalidConfiguration(reason.into())
    }

    pub fn is_invalid_configuration(&self) -> bool {
        matches!(self, SessionError::InvalidConfiguration(_))
    }
}
