use std::fmt;

use crate::transport::{ProbeFailure, ProbeReply};

/// What happened to one probe attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { round_trip_ms: u64 },
    Timeout,
    Unreachable,
    TransportError { detail: String },
}

impl ProbeOutcome {
    /// A reply with no error and no receive timestamp counts as a timeout.
    pub fn from_reply(reply: ProbeReply) -> Self {
        match reply.error {
            Some(ProbeFailure::TimedOut) => ProbeOutcome::Timeout,
            Some(ProbeFailure::DestinationUnreachable) => ProbeOutcome::Unreachable,
            Some(ProbeFailure::Other(detail)) => ProbeOutcome::TransportError { detail },
            None => match reply.received_ms {
                Some(received) => ProbeOutcome::Success {
                    round_trip_ms: received.saturating_sub(reply.sent_ms.unwrap_or(0)),
                },
                None => ProbeOutcome::Timeout,
            },
        }
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self, ProbeOutcome::TransportError { .. })
    }
}

/// Signed encoding of an outcome: the round trip in milliseconds, or a
/// negative code for each kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricSample(i64);

impl MetricSample {
    pub const TIMEOUT: MetricSample = MetricSample(-1);
    pub const UNREACHABLE: MetricSample = MetricSample(-2);
    pub const TRANSPORT_ERROR: MetricSample = MetricSample(-3);

    pub fn from_latency(ms: u64) -> Self {
        MetricSample(i64::try_from(ms).unwrap_or(i64::MAX))
    }

    pub fn value(self) -> i64 {
        self.0
    }

    pub fn latency_ms(self) -> Option<u64> {
        u64::try_from(self.0).ok()
    }

    pub fn is_failure(self) -> bool {
        self.0 < 0
    }
}

impl From<MetricSample> for i64 {
    fn from(sample: MetricSample) -> i64 {
        sample.0
    }
}

impl fmt::Display for MetricSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn classify(outcome: &ProbeOutcome) -> MetricSample {
    match outcome {
        ProbeOutcome::Success { round_trip_ms } => MetricSample::from_latency(*round_trip_ms),
        ProbeOutcome::Timeout => MetricSample::TIMEOUT,
        ProbeOutcome::Unreachable => MetricSample::UNREACHABLE,
        ProbeOutcome::TransportError { .. } => MetricSample::TRANSPORT_ERROR,
    }
}
