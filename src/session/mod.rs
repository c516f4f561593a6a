pub mod batch;
pub mod continuous;
pub mod registry;

pub use batch::{BatchSession, PROGRESS_CADENCE};
pub use continuous::ContinuousSession;
pub use registry::SessionRegistry;

use crate::history::{AdaptiveScale, RollingHistory};
use crate::outcome::MetricSample;
use crate::stats::ProbeTally;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// Everything a renderer needs to draw one chart update.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub latest: Option<MetricSample>,
    pub running_max: i64,
    pub history: Vec<MetricSample>,
    pub scale: f64,
}

impl Frame {
    pub fn empty() -> Self {
        Self {
            latest: None,
            running_max: 0,
            history: Vec::new(),
            scale: 0.0,
        }
    }

    pub(crate) fn capture(history: &RollingHistory, scale: &AdaptiveScale, running_max: i64) -> Self {
        Self {
            latest: history.latest(),
            running_max,
            history: history.to_vec(),
            scale: scale.value(),
        }
    }

    pub fn values(&self) -> Vec<i64> {
        self.history.iter().map(|s| s.value()).collect()
    }

    /// Statistics over the samples currently in the window.
    pub fn window(&self) -> ProbeTally {
        ProbeTally::from_samples(self.history.iter().copied())
    }
}
