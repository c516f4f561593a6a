//! Scripted transport for session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{FatalErrorCallback, HandleConfig, ProbeFailure, ProbeHandle, ProbeReply, Transport, TransportError};
use crate::lock_unpoisoned as lock;

pub fn ok(ms: u64) -> ProbeReply {
    ProbeReply::success(1_000, 1_000 + ms)
}

pub fn timeout() -> ProbeReply {
    ProbeReply::failed(ProbeFailure::TimedOut)
}

pub fn unreachable() -> ProbeReply {
    ProbeReply::failed(ProbeFailure::DestinationUnreachable)
}

pub fn broken(detail: &str) -> ProbeReply {
    ProbeReply::failed(ProbeFailure::Other(detail.to_string()))
}

#[derive(Default)]
struct State {
    script: Mutex<VecDeque<(Duration, ProbeReply)>>,
    configs: Mutex<Vec<HandleConfig>>,
    fatal_callbacks: Mutex<Vec<FatalErrorCallback>>,
    created: AtomicUsize,
    closed: AtomicUsize,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    refuse_handles: AtomicBool,
}

/// Pops one scripted reply per probe. Once the script runs out every probe
/// times out.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<State>,
}

impl FakeTransport {
    pub fn new(replies: impl IntoIterator<Item = ProbeReply>) -> Self {
        Self::with_delays(replies.into_iter().map(|reply| (Duration::ZERO, reply)))
    }

    /// Each reply is returned after its delay has elapsed.
    pub fn with_delays(steps: impl IntoIterator<Item = (Duration, ProbeReply)>) -> Self {
        let transport = Self::default();
        lock(&transport.state.script).extend(steps);
        transport
    }

    pub fn refuse_handles(&self, refuse: bool) {
        self.state.refuse_handles.store(refuse, Ordering::SeqCst);
    }

    /// Fire the out-of-band fatal channel of every handle created so far.
    pub fn raise_fatal(&self, detail: &str) {
        let err = TransportError::Fatal(detail.to_string());
        for callback in lock(&self.state.fatal_callbacks).iter() {
            callback(&err);
        }
    }

    pub fn created(&self) -> usize {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.state.probes.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn configs(&self) -> Vec<HandleConfig> {
        lock(&self.state.configs).clone()
    }
}

impl Transport for FakeTransport {
    type Handle = FakeHandle;

    fn create_handle(&self, config: &HandleConfig) -> Result<FakeHandle, TransportError> {
        if self.state.refuse_handles.load(Ordering::SeqCst) {
            return Err(TransportError::Socket(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "operation not permitted",
            )));
        }
        self.state.created.fetch_add(1, Ordering::SeqCst);
        lock(&self.state.configs).push(config.clone());
        Ok(FakeHandle {
            state: self.state.clone(),
        })
    }
}

pub struct FakeHandle {
    state: Arc<State>,
}

impl ProbeHandle for FakeHandle {
    async fn probe(&self, _target: &str) -> ProbeReply {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        let step = lock(&self.state.script).pop_front();
        let (delay, reply) = step.unwrap_or_else(|| (Duration::ZERO, timeout()));

        let in_flight = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    fn on_fatal_error(&self, callback: FatalErrorCallback) {
        lock(&self.state.fatal_callbacks).push(callback);
    }

    fn close(&self) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }
}
