use crate::outcome::MetricSample;

/// Running counters over a set of samples.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeTally {
    pub received: u32,
    pub lost: u32,
    pub total_time_ms: u64,
    pub min_time_ms: Option<u64>,
    pub max_time_ms: Option<u64>,
}

impl ProbeTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_samples(samples: impl IntoIterator<Item = MetricSample>) -> Self {
        let mut tally = Self::new();
        for sample in samples {
            tally.record(sample);
        }
        tally
    }

    pub fn record(&mut self, sample: MetricSample) {
        match sample.latency_ms() {
            Some(ms) => self.record_received(ms),
            None => self.record_lost(),
        }
    }

    pub fn record_received(&mut self, time_ms: u64) {
        self.received += 1;
        self.total_time_ms = self.total_time_ms.saturating_add(time_ms);
        self.min_time_ms = Some(self.min_time_ms.map_or(time_ms, |min| min.min(time_ms)));
        self.max_time_ms = Some(self.max_time_ms.map_or(time_ms, |max| max.max(time_ms)));
    }

    pub fn record_lost(&mut self) {
        self.lost += 1;
    }

    pub fn attempts(&self) -> u32 {
        self.received + self.lost
    }

    pub fn average_time(&self) -> f64 {
        if self.received == 0 {
            return 0.0;
        }
        self.total_time_ms as f64 / self.received as f64
    }

    /// Loss relative to `total` planned probes.
    pub fn loss_percentage_of(&self, total: u32) -> f64 {
        if total == 0 {
            return 0.0;
        }
        (self.lost as f64 / total as f64) * 100.0
    }

    pub fn loss_percentage(&self) -> f64 {
        self.loss_percentage_of(self.attempts())
    }
}

/// Final result of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateReport {
    pub total: u32,
    pub successful: u32,
    pub lost: u32,
    pub total_latency_ms: u64,
    pub average_latency_ms: f64,
    pub loss_percent: f64,
}

impl AggregateReport {
    pub fn from_tally(tally: &ProbeTally, total: u32) -> Self {
        Self {
            total,
            successful: tally.received,
            lost: tally.lost,
            total_latency_ms: tally.total_time_ms,
            average_latency_ms: tally.average_time(),
            loss_percent: tally.loss_percentage_of(total),
        }
    }
}
