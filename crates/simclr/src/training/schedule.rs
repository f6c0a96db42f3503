//! Per-epoch learning-rate schedules.

/// Scheduler collaborator: advanced at most once per epoch by the driver.
pub trait EpochScheduler {
    /// Advance the schedule by one epoch.
    fn step(&mut self);
    /// Learning rate for the current epoch.
    fn lr(&self) -> f64;
}

/// Whether the schedule advances after `epoch` (0-based).
///
/// The first `warmup_epochs` epochs keep the initial rate.
pub fn should_advance(epoch: usize, warmup_epochs: usize) -> bool {
    epoch >= warmup_epochs
}

/// Cosine annealing from `base_lr` to `min_lr` over `t_max` advances.
///
/// The rate stays at `min_lr` once `t_max` advances have happened.
#[derive(Debug, Clone)]
pub struct CosineAnnealing {
    base_lr: f64,
    min_lr: f64,
    t_max: usize,
    t: usize,
}

impl CosineAnnealing {
    pub fn new(base_lr: f64, t_max: usize, min_lr: f64) -> Self {
        Self {
            base_lr,
            min_lr,
            t_max: t_max.max(1),
            t: 0,
        }
    }

    /// Number of advances so far.
    pub fn position(&self) -> usize {
        self.t
    }
}

impl EpochScheduler for CosineAnnealing {
    fn step(&mut self) {
        self.t += 1;
    }

    fn lr(&self) -> f64 {
        let progress = (self.t as f64 / self.t_max as f64).min(1.0);
        self.min_lr
            + (self.base_lr - self.min_lr) * 0.5 * (1.0 + (std::f64::consts::PI * progress).cos())
    }
}

/// Fixed learning rate; `step` is a no-op.
#[derive(Debug, Clone, Copy)]
pub struct ConstantLr(pub f64);

impl EpochScheduler for ConstantLr {
    fn step(&mut self) {}

    fn lr(&self) -> f64 {
        self.0
    }
}
