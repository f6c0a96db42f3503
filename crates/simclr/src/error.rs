//! Error types for configuration, checkpointing, and the training driver.

use crate::training::checkpoint::CheckpointError;

/// Invalid run configuration. Always raised before any optimizer step.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    /// Fewer than two views per image leaves no positive pair per row.
    #[error("n_views must be >= 2 to form positive pairs, got {0}")]
    TooFewViews(usize),

    /// Temperature must be a finite value strictly greater than zero.
    #[error("temperature must be > 0, got {0}")]
    Temperature(f64),

    /// Batch size must be at least one image.
    #[error("batch_size must be > 0, got {0}")]
    BatchSize(usize),

    /// Logging interval of zero would never (or always) fire.
    #[error("log_every_n_steps must be > 0")]
    LogInterval,

    /// Feature tensor row count does not match `n_views * batch_size`.
    #[error("feature tensor has {got} rows, expected n_views * batch_size = {expected}")]
    FeatureRows { expected: usize, got: usize },

    /// Batch carries a different number of views than configured.
    #[error("batch has {got} views, expected {expected}")]
    ViewCount { expected: usize, got: usize },

    /// Every image dimension must be non-zero.
    #[error("image shape must have no zero dimension, got {0:?}")]
    ImageShape([usize; 3]),

    /// Synthetic view noise must be a finite, non-negative half-width.
    #[error("noise must be >= 0, got {0}")]
    Noise(f32),
}

/// Fatal errors from the training driver.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
