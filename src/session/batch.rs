use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::JoinSet;
use tokio::time::{self, Instant};

use crate::config::BatchConfig;
use crate::error::SessionError;
use crate::outcome::{MetricSample, ProbeOutcome, classify};
use crate::stats::{AggregateReport, ProbeTally};
use crate::transport::{ProbeHandle, Transport, TransportError};

/// How often progress is reported while a batch is outstanding.
pub const PROGRESS_CADENCE: Duration = Duration::from_millis(500);

type ProgressCallback = Box<dyn FnMut(u32, u32) + Send>;

/// A fixed number of probes, spaced `interval_ms` apart, summarized once.
///
/// Probe `i` is sent `i * interval_ms` after the start regardless of whether
/// earlier probes have answered, so with a timeout longer than the interval
/// several probes are outstanding at once and may finish in any order.
pub struct BatchSession<T: Transport> {
    transport: Arc<T>,
    config: BatchConfig,
    progress: Option<ProgressCallback>,
}

impl<T: Transport> BatchSession<T> {
    pub fn new(transport: Arc<T>, config: BatchConfig) -> Self {
        Self {
            transport,
            config,
            progress: None,
        }
    }

    /// Called with `(successful, total)` every [`PROGRESS_CADENCE`].
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(u32, u32) + Send + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    pub async fn run(mut self) -> Result<AggregateReport, SessionError> {
        self.config.validate()?;

        let total = self.config.count;
        let handle = Arc::new(self.transport.create_handle(&self.config.handle_config())?);
        let target = self.config.target.clone();
        handle.on_fatal_error(Box::new(move |err: &TransportError| {
            error!("Transport for batch against {} failed: {}", target, err);
        }));
        info!("Sending {} probes to {}", total, self.config.target);

        let mut probes = JoinSet::new();
        for i in 0..total {
            let handle = handle.clone();
            let target = self.config.target.clone();
            let delay = send_offset(self.config.interval(), i);
            probes.spawn(async move {
                time::sleep(delay).await;
                classify(&ProbeOutcome::from_reply(handle.probe(&target).await))
            });
        }

        let mut tally = ProbeTally::new();
        let mut progress = time::interval_at(Instant::now() + PROGRESS_CADENCE, PROGRESS_CADENCE);

        loop {
            tokio::select! {
                joined = probes.join_next() => match joined {
                    Some(Ok(sample)) => {
                        debug!("Batch probe to {} settled: {}", self.config.target, sample);
                        tally.record(sample);
                    }
                    Some(Err(e)) => {
                        warn!("Batch probe task failed: {}", e);
                        tally.record(MetricSample::TRANSPORT_ERROR);
                    }
                    None => break,
                },
                _ = progress.tick() => {
                    if let Some(callback) = self.progress.as_mut() {
                        callback(tally.received, total);
                    }
                }
            }
        }

        handle.close();

        let report = AggregateReport::from_tally(&tally, total);
        info!(
            "Batch against {} finished: avg {:.2}ms, loss {:.2}%",
            self.config.target, report.average_latency_ms, report.loss_percent
        );
        Ok(report)
    }
}

fn send_offset(interval: Duration, index: u32) -> Duration {
    interval.saturating_mul(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{FakeTransport, broken, ok, timeout, unreachable};
    use std::sync::Mutex;

    fn config(count: u32) -> BatchConfig {
        BatchConfig::new("10.0.0.1").with_count(count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_average_and_loss() {
        let transport = FakeTransport::new([ok(10), ok(20), timeout(), unreachable(), ok(15)]);
        let report = BatchSession::new(Arc::new(transport.clone()), config(5))
            .run()
            .await
            .unwrap();

        assert_eq!(report.average_latency_ms, 15.0);
        assert_eq!(report.loss_percent, 40.0);
        assert_eq!(report.successful, 3);
        assert_eq!(report.lost, 2);
        assert_eq!(transport.probes(), 5);
        assert_eq!(transport.created(), 1);
        assert_eq!(transport.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_completion() {
        // Earlier probes take longer, so they settle last
        let transport = FakeTransport::with_delays([
            (Duration::from_millis(400), ok(30)),
            (Duration::from_millis(200), timeout()),
            (Duration::from_millis(10), ok(10)),
        ]);
        let report = BatchSession::new(Arc::new(transport.clone()), config(3).with_timeout_ms(500))
            .run()
            .await
            .unwrap();

        assert!(transport.max_in_flight() > 1);
        assert_eq!(report.average_latency_ms, 20.0);
        assert!((report.loss_percent - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(transport.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_failures_release_handle_once() {
        let transport = FakeTransport::new([timeout(), broken("socket reset"), unreachable(), timeout()]);
        let report = BatchSession::new(Arc::new(transport.clone()), config(4))
            .run()
            .await
            .unwrap();

        assert_eq!(report.average_latency_ms, 0.0);
        assert_eq!(report.loss_percent, 100.0);
        assert_eq!(transport.created(), 1);
        assert_eq!(transport.closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports() {
        let transport = FakeTransport::new([ok(5), ok(5), ok(5), ok(5)]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let report = BatchSession::new(
            Arc::new(transport.clone()),
            config(4).with_interval_ms(400),
        )
        .on_progress(move |successful, total| sink.lock().unwrap().push((successful, total)))
        .run()
        .await
        .unwrap();

        // Probes go out at 0, 400, 800 and 1200ms; progress fires at 500 and 1000ms
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![(2, 4), (3, 4)]);
        assert_eq!(report.successful, 4);
    }

    #[tokio::test]
    async fn test_invalid_batch_rejected() {
        let transport = FakeTransport::default();

        let err = BatchSession::new(Arc::new(transport.clone()), config(0)).run().await.unwrap_err();
        assert!(err.is_invalid_configuration());

        let err = BatchSession::new(Arc::new(transport.clone()), BatchConfig::new(""))
            .run()
            .await
            .unwrap_err();
        assert!(err.is_invalid_configuration());
        assert_eq!(transport.created(), 0);
    }

    #[tokio::test]
    async fn test_oversized_interval_rejected() {
        let transport = FakeTransport::default();
        let config = config(1002).with_interval_ms(u64::MAX);

        let err = BatchSession::new(Arc::new(transport.clone()), config).run().await.unwrap_err();
        assert!(err.is_invalid_configuration());
        assert_eq!(transport.created(), 0);
    }

    #[test]
    fn test_send_offset_saturates() {
        assert_eq!(send_offset(Duration::from_millis(25), 4), Duration::from_millis(100));
        assert_eq!(send_offset(Duration::MAX, 2), Duration::MAX);
    }
}
