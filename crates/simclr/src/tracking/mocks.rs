//! Mock trackers for testing without a tracking server.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{MetricRecord, Tracker, TrackingError};

/// Event captured by [`RecordingTracker`].
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Start { project: String, config: serde_json::Value },
    Metrics(MetricRecord),
    Artifact(PathBuf),
    Finish,
}

/// Tracker that records every call into a shared log.
///
/// Clones share the same log, so a test can keep one handle while the run
/// context owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracker {
    events: Arc<Mutex<Vec<TrackerEvent>>>,
}

impl RecordingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn metrics(&self) -> Vec<MetricRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TrackerEvent::Metrics(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TrackerEvent::Artifact(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: TrackerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[async_trait]
impl Tracker for RecordingTracker {
    async fn start_run(&mut self, project: &str, config: &serde_json::Value) -> Result<(), TrackingError> {
        self.push(TrackerEvent::Start {
            project: project.to_string(),
            config: config.clone(),
        });
        Ok(())
    }

    async fn log_metrics(&mut self, record: &MetricRecord) -> Result<(), TrackingError> {
        self.push(TrackerEvent::Metrics(record.clone()));
        Ok(())
    }

    async fn save_artifact(&mut self, path: &Path) -> Result<(), TrackingError> {
        self.push(TrackerEvent::Artifact(path.to_path_buf()));
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), TrackingError> {
        self.push(TrackerEvent::Finish);
        Ok(())
    }
}

/// Tracker whose every call fails, simulating an unreachable service.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingTracker;

fn unavailable() -> TrackingError {
    TrackingError::Rejected {
        status: 503,
        body: "service unavailable".to_string(),
    }
}

#[async_trait]
impl Tracker for FailingTracker {
    async fn start_run(&mut self, _project: &str, _config: &serde_json::Value) -> Result<(), TrackingError> {
        Err(unavailable())
    }

    async fn log_metrics(&mut self, _record: &MetricRecord) -> Result<(), TrackingError> {
        Err(unavailable())
    }

    async fn save_artifact(&mut self, _path: &Path) -> Result<(), TrackingError> {
        Err(unavailable())
    }

    async fn finish(&mut self) -> Result<(), TrackingError> {
        Err(unavailable())
    }
}
