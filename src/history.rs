use std::collections::VecDeque;

use crate::outcome::MetricSample;

pub const HISTORY_CAPACITY: usize = 50;
pub const SCALE_DECAY: f64 = 0.85;
pub const SCALE_FLOOR: f64 = 50.0;

/// Fixed-capacity window of samples, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingHistory {
    samples: VecDeque<MetricSample>,
}

impl RollingHistory {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
        }
    }

    pub fn push(&mut self, sample: MetricSample) {
        self.samples.push_back(sample);
        while self.samples.len() > HISTORY_CAPACITY {
            self.samples.pop_front();
        }
    }

    pub fn latest(&self) -> Option<MetricSample> {
        self.samples.back().copied()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MetricSample> + '_ {
        self.samples.iter().copied()
    }

    pub fn to_vec(&self) -> Vec<MetricSample> {
        self.iter().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl Default for RollingHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Chart normalization value.
///
/// Jumps up to any sample above it and otherwise decays by [`SCALE_DECAY`]
/// per observation, never below [`SCALE_FLOOR`]. It starts at zero, so
/// until the first decay it may sit below the floor.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdaptiveScale {
    value: f64,
}

impl AdaptiveScale {
    pub fn new() -> Self {
        Self { value: 0.0 }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn observe(&mut self, sample: MetricSample) -> f64 {
        let value = sample.value() as f64;
        if !sample.is_failure() && value > self.value {
            self.value = value;
        } else {
            self.value = SCALE_FLOOR.max(self.value * SCALE_DECAY);
        }
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}
