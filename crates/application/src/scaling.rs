//! Threshold Auto-Scaling
//!
//! Tasks-per-worker watermark policy: one worker is added when the mean
//! load crosses the high watermark and one removed when it falls under
//! the low watermark, clamped to `[min_workers, max_workers]`.

use nimbus_ports::{LoadSnapshot, ScalingPolicy};

/// Watermark-driven scaling policy
#[derive(Debug, Clone)]
pub struct ThresholdScaling {
    scale_up_ratio: f64,
    scale_down_ratio: f64,
    min_workers: usize,
    max_workers: usize,
}

impl ThresholdScaling {
    pub fn new(scale_up_ratio: f64, scale_down_ratio: f64, max_workers: usize) -> Self {
        Self {
            scale_up_ratio,
            scale_down_ratio,
            min_workers: 1,
            max_workers,
        }
    }
}

impl ScalingPolicy for ThresholdScaling {
    fn plan(&self, snapshot: &LoadSnapshot) -> Option<usize> {
        let active = snapshot.active_workers.max(1);
        let load = f64::from(snapshot.tasks_in_flight) / active as f64;

        if load > self.scale_up_ratio {
            Some((snapshot.active_workers + 1).min(self.max_workers))
        } else if load < self.scale_down_ratio {
            Some(snapshot.active_workers.saturating_sub(1).max(self.min_workers))
        } else {
            None
        }
    }
}
