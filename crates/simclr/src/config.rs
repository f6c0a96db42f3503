//! Run configuration for SimCLR pre-training.

use burn::prelude::*;

use crate::error::ConfigError;

/// Hyperparameters and run metadata for a contrastive pre-training run.
#[derive(Config, Debug)]
pub struct SimClrConfig {
    /// Images per batch (B). Each image contributes `n_views` rows.
    #[config(default = 256)]
    pub batch_size: usize,
    /// Augmented views per image (N).
    #[config(default = 2)]
    pub n_views: usize,
    /// Softmax temperature dividing the cosine similarities.
    #[config(default = 0.07)]
    pub temperature: f64,
    /// Device name; the CLI resolves it to a backend device.
    #[config(default = "String::from(\"cpu\")")]
    pub device: String,
    /// Number of passes over the loader.
    #[config(default = 100)]
    pub train_epochs: usize,
    /// Train with dynamic loss scaling for reduced-precision backends.
    #[config(default = false)]
    pub fp16_precision: bool,
    /// Steps between tracker metric events.
    #[config(default = 100)]
    pub log_every_n_steps: usize,
    /// Architecture identifier stored in checkpoints.
    #[config(default = "String::from(\"mlp\")")]
    pub arch: String,
    /// Epochs before the scheduler starts advancing.
    #[config(default = 10)]
    pub warmup_epochs: usize,
    /// Tracker project name.
    #[config(default = "String::from(\"simclr\")")]
    pub project: String,
    /// Base learning rate handed to the scheduler.
    #[config(default = 3e-4)]
    pub lr: f64,
    /// Optimizer weight decay.
    #[config(default = 1e-4)]
    pub weight_decay: f64,
    /// Seed for data generation.
    #[config(default = 0)]
    pub seed: u64,
}

impl SimClrConfig {
    /// Reject configurations that cannot produce a well-formed contrastive batch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::BatchSize(self.batch_size));
        }
        if self.n_views < 2 {
            return Err(ConfigError::TooFewViews(self.n_views));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ConfigError::Temperature(self.temperature));
        }
        if self.log_every_n_steps == 0 {
            return Err(ConfigError::LogInterval);
        }
        Ok(())
    }
}
