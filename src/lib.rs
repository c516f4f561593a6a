//! ICMP latency probing for live charts.
//!
//! [`ContinuousSession`] keeps a rolling window of samples for one target and
//! hands a fresh [`Frame`] to a render callback after every probe.
//! [`BatchSession`] sends a fixed number of probes and returns one
//! [`AggregateReport`]. Both talk to the network through the
//! [`transport::Transport`] trait.

pub mod config;
pub mod display;
pub mod dns;
pub mod error;
pub mod history;
pub mod outcome;
pub mod session;
pub mod stats;
pub mod transport;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::{BatchConfig, SessionConfig};
pub use error::SessionError;
pub use outcome::{MetricSample, ProbeOutcome, classify};
pub use session::{BatchSession, ContinuousSession, Frame, SessionRegistry, SessionState};
pub use stats::AggregateReport;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
