//! Long-running probe loop feeding a live chart.
//!
//! The session owns one transport handle while it runs. A tick probes the
//! target, folds the classified sample into the history and scale, and hands
//! the new frame to the render callback. Ticks never overlap: the loop waits
//! for each probe before taking the next tick, and ticks that elapse
//! meanwhile are skipped.
//!
//! A transport error tears the handle down and opens a fresh one without
//! leaving the running state. Only [`ContinuousSession::stop`] ends a
//! session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::{Frame, SessionState};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::history::{AdaptiveScale, RollingHistory};
use crate::lock_unpoisoned;
use crate::outcome::{MetricSample, ProbeOutcome, classify};
use crate::transport::{ProbeHandle, Transport, TransportError};

type RenderCallback = Box<dyn FnMut(&Frame) + Send>;
type Shared<H> = Arc<Mutex<State<H>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopping,
}

struct Link<H> {
    handle: Arc<H>,
    fatal: Arc<AtomicBool>,
}

impl<H: ProbeHandle> Link<H> {
    fn open<T>(transport: &T, config: &SessionConfig) -> Result<Self, TransportError>
    where
        T: Transport<Handle = H>,
    {
        let handle = transport.create_handle(&config.handle_config())?;
        let fatal = Arc::new(AtomicBool::new(false));

        let flag = fatal.clone();
        let target = config.target.clone();
        handle.on_fatal_error(Box::new(move |err: &TransportError| {
            error!("Transport for {} failed: {}", target, err);
            flag.store(true, Ordering::SeqCst);
        }));

        Ok(Self {
            handle: Arc::new(handle),
            fatal,
        })
    }
}

struct State<H> {
    lifecycle: Lifecycle,
    generation: u64,
    history: RollingHistory,
    scale: AdaptiveScale,
    running_max: i64,
    link: Option<Link<H>>,
    task: Option<JoinHandle<()>>,
    render: Option<RenderCallback>,
}

impl<H> State<H> {
    fn new() -> Self {
        Self {
            lifecycle: Lifecycle::Idle,
            generation: 0,
            history: RollingHistory::new(),
            scale: AdaptiveScale::new(),
            running_max: 0,
            link: None,
            task: None,
            render: None,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lifecycle == Lifecycle::Running && self.generation == generation
    }

    fn public_state(&self) -> SessionState {
        match self.lifecycle {
            Lifecycle::Idle => SessionState::Idle,
            Lifecycle::Running | Lifecycle::Stopping => SessionState::Running,
        }
    }

    fn frame(&self) -> Frame {
        Frame::capture(&self.history, &self.scale, self.running_max)
    }

    fn record(&mut self, sample: MetricSample) -> Frame {
        self.scale.observe(sample);
        self.history.push(sample);
        self.running_max = self.running_max.max(sample.value());
        self.frame()
    }
}

/// A probing session bound to one target at a time.
///
/// `start` spawns onto the current tokio runtime, so it must be called from
/// within one. The render callback runs while the session state is locked and
/// must not call back into the session.
pub struct ContinuousSession<T: Transport> {
    transport: Arc<T>,
    state: Shared<T::Handle>,
}

impl<T: Transport> ContinuousSession<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            state: Arc::new(Mutex::new(State::new())),
        }
    }

    pub fn start<F>(&self, config: SessionConfig, render: F) -> Result<SessionState, SessionError>
    where
        F: FnMut(&Frame) + Send + 'static,
    {
        config.validate()?;

        let mut state = self.lock();
        if state.lifecycle != Lifecycle::Idle {
            debug!("Session for {} is already running", config.target);
            return Ok(state.public_state());
        }

        let link = Link::open(&*self.transport, &config)?;
        state.generation = state.generation.wrapping_add(1);
        state.history.clear();
        state.scale.reset();
        state.running_max = 0;
        state.link = Some(link);
        state.render = Some(Box::new(render));
        state.lifecycle = Lifecycle::Running;

        info!(
            "Probing {} every {}ms (timeout {}ms)",
            config.target, config.interval_ms, config.timeout_ms
        );
        state.task = Some(tokio::spawn(run_ticks(
            self.transport.clone(),
            self.state.clone(),
            state.generation,
            config,
        )));

        Ok(SessionState::Running)
    }

    /// Stop probing and release the transport handle. Once this returns the
    /// render callback is never invoked again.
    pub fn stop(&self) {
        let (task, link) = {
            let mut state = self.lock();
            if state.lifecycle != Lifecycle::Running {
                return;
            }
            state.lifecycle = Lifecycle::Stopping;
            state.render = None;
            (state.task.take(), state.link.take())
        };

        if let Some(task) = task {
            task.abort();
        }
        if let Some(link) = link {
            link.handle.close();
        }

        self.lock().lifecycle = Lifecycle::Idle;
        info!("Probing stopped");
    }

    pub fn state(&self) -> SessionState {
        self.lock().public_state()
    }

    pub fn current_frame(&self) -> Frame {
        self.lock().frame()
    }

    fn lock(&self) -> MutexGuard<'_, State<T::Handle>> {
        lock_unpoisoned(&self.state)
    }
}

impl<T: Transport> Drop for ContinuousSession<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Settled {
    Rendered,
    Recovered,
    Ended,
}

async fn run_ticks<T: Transport>(
    transport: Arc<T>,
    shared: Shared<T::Handle>,
    generation: u64,
    config: SessionConfig,
) {
    let period = config.interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let link = {
            let state = lock_unpoisoned(&shared);
            if !state.is_current(generation) {
                return;
            }
            state
                .link
                .as_ref()
                .map(|link| (link.handle.clone(), link.fatal.load(Ordering::SeqCst)))
        };

        let outcome = match link {
            Some((handle, false)) => ProbeOutcome::from_reply(handle.probe(&config.target).await),
            Some((_, true)) => ProbeOutcome::TransportError {
                detail: "handle reported a fatal error".to_string(),
            },
            None => ProbeOutcome::TransportError {
                detail: "no open transport handle".to_string(),
            },
        };

        match settle(&*transport, &shared, generation, &config, outcome) {
            Settled::Rendered => {}
            Settled::Recovered => ticker.reset(),
            Settled::Ended => return,
        }
    }
}

fn settle<T: Transport>(
    transport: &T,
    shared: &Shared<T::Handle>,
    generation: u64,
    config: &SessionConfig,
    outcome: ProbeOutcome,
) -> Settled {
    let mut guard = lock_unpoisoned(shared);
    let state = &mut *guard;
    if !state.is_current(generation) {
        return Settled::Ended;
    }

    if let ProbeOutcome::TransportError { detail } = &outcome {
        warn!("Probe of {} hit a transport error ({}), reopening handle", config.target, detail);
        // The faulting tick is recorded but leaves the scale and maximum alone
        state.history.push(classify(&outcome));
        if let Some(stale) = state.link.take() {
            stale.handle.close();
        }
        match Link::open(transport, config) {
            Ok(link) => state.link = Some(link),
            Err(e) => error!("Could not reopen transport for {}: {}", config.target, e),
        }
        return Settled::Recovered;
    }

    let frame = state.record(classify(&outcome));
    if let Some(render) = state.render.as_mut() {
        render(&frame);
    }
    Settled::Rendered
}
