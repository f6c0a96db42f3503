//! SimCLR contrastive self-supervised pre-training on burn.
//!
//! Builds InfoNCE logits from `n_views` augmented views of each image, trains
//! an encoder with cross-entropy over positive-vs-negative similarities
//! (optionally under dynamic loss scaling), reports metrics to an experiment
//! tracker, and checkpoints model and optimizer state when training ends.
//!
//! # Key types
//!
//! - [`SimClrConfig`]: run hyperparameters
//! - [`training::loss::PairLayout`] / [`training::loss::info_nce_logits`]: pair construction
//! - [`training::trainer::train`]: the training driver
//! - [`RunContext`]: run directory + tracker handle
//! - [`tracking::Tracker`]: experiment-tracking collaborator

pub mod config;
pub mod error;
pub mod model;
pub mod run;
pub mod tracking;
pub mod training;

pub use config::SimClrConfig;
pub use error::{ConfigError, TrainError};
pub use model::ContrastiveEncoder;
pub use run::RunContext;
pub use training::trainer::{train, train_step, TrainOutcome};
