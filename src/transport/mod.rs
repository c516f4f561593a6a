//! Probe transport contract.
//!
//! Sessions never touch sockets directly. They ask a [`Transport`] for a
//! [`ProbeHandle`], issue probes on it, listen to its fatal-error channel and
//! close it when they are done. [`icmp::IcmpTransport`] is the socket-backed
//! implementation.

pub mod icmp;
pub mod packet;

#[cfg(test)]
pub mod fake;

use std::future::Future;

use thiserror::Error;

pub const DEFAULT_PACKET_SIZE: usize = 16;
pub const DEFAULT_RETRIES: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleConfig {
    pub packet_size: usize,
    pub retries: u32,
    pub timeout_ms: u64,
}

impl HandleConfig {
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            packet_size: DEFAULT_PACKET_SIZE,
            retries: DEFAULT_RETRIES,
            timeout_ms,
        }
    }
}

/// Per-probe failure reported by a handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    #[error("request timed out")]
    TimedOut,
    #[error("destination unreachable")]
    DestinationUnreachable,
    #[error("{0}")]
    Other(String),
}

/// Raw result of one probe. Timestamps are milliseconds on the handle's own
/// monotonic clock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReply {
    pub error: Option<ProbeFailure>,
    pub sent_ms: Option<u64>,
    pub received_ms: Option<u64>,
}

impl ProbeReply {
    pub fn success(sent_ms: u64, received_ms: u64) -> Self {
        Self {
            error: None,
            sent_ms: Some(sent_ms),
            received_ms: Some(received_ms),
        }
    }

    pub fn failed(failure: ProbeFailure) -> Self {
        Self {
            error: Some(failure),
            sent_ms: None,
            received_ms: None,
        }
    }
}

/// Handle-level errors.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("failed to open ICMP socket: {0}. Raw socket privileges may be required.")]
    Socket(#[from] std::io::Error),
    #[error("transport session failed: {0}")]
    Fatal(String),
}

pub type FatalErrorCallback = Box<dyn Fn(&TransportError) + Send + Sync>;

pub trait ProbeHandle: Send + Sync + 'static {
    /// Send one echo request to `target` and wait for the outcome. Timeouts
    /// are enforced here, using the handle's configured timeout.
    fn probe(&self, target: &str) -> impl Future<Output = ProbeReply> + Send;

    /// Register a listener for failures that make the whole handle unusable.
    fn on_fatal_error(&self, callback: FatalErrorCallback);

    /// Release the underlying resources. Calling it more than once is harmless.
    fn close(&self);
}

pub trait Transport: Send + Sync + 'static {
    type Handle: ProbeHandle;

    fn create_handle(&self, config: &HandleConfig) -> Result<Self::Handle, TransportError>;
}
