//! Offline tracker: appends one JSON object per event to a local file.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::json;

use super::{MetricRecord, Tracker, TrackingError};

/// Writes `start`, `metrics`, `artifact`, and `finish` events as JSON lines.
pub struct JsonlTracker {
    path: PathBuf,
}

impl JsonlTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, event: serde_json::Value) -> Result<(), TrackingError> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        serde_json::to_writer(&mut file, &event)?;
        file.write_all(b"\n")?;
        Ok(())
    }
}

#[async_trait]
impl Tracker for JsonlTracker {
    async fn start_run(&mut self, project: &str, config: &serde_json::Value) -> Result<(), TrackingError> {
        self.append(json!({ "event": "start", "project": project, "config": config }))
    }

    async fn log_metrics(&mut self, record: &MetricRecord) -> Result<(), TrackingError> {
        self.append(json!({ "event": "metrics", "step": record.global_step, "metrics": record.to_map() }))
    }

    async fn save_artifact(&mut self, path: &Path) -> Result<(), TrackingError> {
        self.append(json!({ "event": "artifact", "path": path.display().to_string() }))
    }

    async fn finish(&mut self) -> Result<(), TrackingError> {
        self.append(json!({ "event": "finish" }))
    }
}
