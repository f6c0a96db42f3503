//! SimCLR training pipeline: InfoNCE pairing, metrics, loss scaling,
//! schedules, multi-view data, checkpoints, and the training driver.

pub mod checkpoint;
pub mod data;
pub mod loss;
pub mod metrics;
pub mod scaler;
pub mod schedule;
pub mod trainer;
pub mod watch;
