//! Experiment-tracking collaborator.
//!
//! The tracker receives a run start (project + config snapshot), periodic
//! metric records, checkpoint artifacts, and a finish call. Trackers are
//! network-facing and treated as unreliable: the driver reaches them only
//! through [`crate::run::RunContext`], which logs and swallows their errors.
//!
//! - [`HttpTracker`]: JSON-over-HTTP tracking server client
//! - [`JsonlTracker`]: offline tracker appending events to a local file
//! - [`mocks`]: recording and failing trackers for tests

pub mod http;
pub mod jsonl;
pub mod mocks;

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

pub use http::HttpTracker;
pub use jsonl::JsonlTracker;

#[derive(Debug, thiserror::Error)]
pub enum TrackingError {
    #[error("tracking request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid tracking URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("tracking server rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("tracking run not started")]
    NotStarted,
}

/// One metric event emitted every `log_every_n_steps` steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub loss: f64,
    pub top1: f64,
    pub top5: f64,
    pub learning_rate: f64,
    /// Global L2 norm of the gradients of this step.
    pub grad_norm: f64,
    /// Global L2 norm of the parameters after this step.
    pub param_norm: f64,
    pub global_step: u64,
}

impl MetricRecord {
    /// Flat string-keyed view used on the wire.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("loss".to_string(), self.loss),
            ("acc/top1".to_string(), self.top1),
            ("acc/top5".to_string(), self.top5),
            ("learning_rate".to_string(), self.learning_rate),
            ("grad_norm".to_string(), self.grad_norm),
            ("param_norm".to_string(), self.param_norm),
            ("global_step".to_string(), self.global_step as f64),
        ])
    }
}

/// Tracking service collaborator.
#[async_trait]
pub trait Tracker: Send {
    /// Open a run under `project` with a snapshot of the configuration.
    async fn start_run(&mut self, project: &str, config: &serde_json::Value) -> Result<(), TrackingError>;

    async fn log_metrics(&mut self, record: &MetricRecord) -> Result<(), TrackingError>;

    /// Upload a file, or every file of a directory, as a run artifact.
    async fn save_artifact(&mut self, path: &Path) -> Result<(), TrackingError>;

    async fn finish(&mut self) -> Result<(), TrackingError>;
}

/// Files to upload for an artifact path, as `(name, path)` pairs.
///
/// Directories expand to their direct children, named `dir/file`.
pub(crate) fn artifact_files(path: &Path) -> Result<Vec<(String, std::path::PathBuf)>, TrackingError> {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !path.is_dir() {
        return Ok(vec![(base, path.to_path_buf())]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            let name = format!("{base}/{}", entry.file_name().to_string_lossy());
            files.push((name, entry.path()));
        }
    }
    files.sort();
    Ok(files)
}
