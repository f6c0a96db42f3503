//! Run context: the run directory and the tracker handle for one training run.
//!
//! Local state (run directory, `config.json`, checkpoints) is authoritative.
//! The tracker mirrors it on a best-effort basis; its failures are logged as
//! warnings and never abort the run.

use std::path::{Path, PathBuf};

use burn::config::Config;

use crate::config::SimClrConfig;
use crate::tracking::{MetricRecord, Tracker};

pub struct RunContext {
    run_dir: PathBuf,
    tracker: Box<dyn Tracker>,
    tracker_failures: usize,
}

impl RunContext {
    /// Create the run directory, save `config.json`, and start the tracker run.
    ///
    /// Fails only on local I/O errors.
    pub async fn start(
        run_dir: impl Into<PathBuf>,
        config: &SimClrConfig,
        mut tracker: Box<dyn Tracker>,
    ) -> std::io::Result<Self> {
        let run_dir = run_dir.into();
        std::fs::create_dir_all(&run_dir)?;
        config.save(run_dir.join("config.json"))?;

        let mut tracker_failures = 0;
        let snapshot = serde_json::to_value(config).unwrap_or(serde_json::Value::Null);
        if let Err(e) = tracker.start_run(&config.project, &snapshot).await {
            tracker_failures += 1;
            tracing::warn!(error = %e, "Tracker unavailable at run start, continuing without it");
        }

        tracing::info!(run_dir = %run_dir.display(), project = %config.project, "Run started");
        Ok(Self {
            run_dir,
            tracker,
            tracker_failures,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Tracker calls that failed so far.
    pub fn tracker_failures(&self) -> usize {
        self.tracker_failures
    }

    /// Send a metric record. Returns whether the tracker accepted it.
    pub async fn log_metrics(&mut self, record: &MetricRecord) -> bool {
        match self.tracker.log_metrics(record).await {
            Ok(()) => true,
            Err(e) => {
                self.tracker_failures += 1;
                tracing::warn!(step = record.global_step, error = %e, "Failed to log metrics to tracker");
                false
            }
        }
    }

    /// Mirror a local artifact to the tracker. The local copy is never touched.
    pub async fn mirror_artifact(&mut self, path: &Path) -> bool {
        match self.tracker.save_artifact(path).await {
            Ok(()) => true,
            Err(e) => {
                self.tracker_failures += 1;
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to mirror artifact to tracker; local copy kept"
                );
                false
            }
        }
    }

    /// Close the tracker run.
    pub async fn finish(mut self) {
        if let Err(e) = self.tracker.finish().await {
            self.tracker_failures += 1;
            tracing::warn!(error = %e, "Failed to finish tracker run");
        }
        tracing::info!(
            run_dir = %self.run_dir.display(),
            tracker_failures = self.tracker_failures,
            "Run closed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::mocks::{FailingTracker, RecordingTracker, TrackerEvent};
    use tempfile::TempDir;

    fn record(step: u64) -> MetricRecord {
        MetricRecord {
            loss: 1.0,
            top1: 0.0,
            top5: 0.0,
            learning_rate: 0.1,
            grad_norm: 1.0,
            param_norm: 1.0,
            global_step: step,
        }
    }

    #[tokio::test]
    async fn test_start_saves_config_and_starts_run() {
        let tmp = TempDir::new().unwrap();
        let tracker = RecordingTracker::new();
        let config = SimClrConfig::new().with_project("unit".to_string());

        let ctx = RunContext::start(tmp.path().join("run"), &config, Box::new(tracker.clone()))
            .await
            .unwrap();

        let saved = SimClrConfig::load(ctx.run_dir().join("config.json")).unwrap();
        assert_eq!(saved.project, "unit");
        match &tracker.events()[0] {
            TrackerEvent::Start { project, config } => {
                assert_eq!(project, "unit");
                assert_eq!(config["batch_size"], 256);
            }
            other => panic!("expected start event, got {other:?}"),
        }

        ctx.finish().await;
        assert_eq!(tracker.events().last(), Some(&TrackerEvent::Finish));
    }

    #[tokio::test]
    async fn test_failing_tracker_is_swallowed() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("artifact.bin");
        std::fs::write(&artifact, b"weights").unwrap();

        let mut ctx = RunContext::start(tmp.path(), &SimClrConfig::new(), Box::new(FailingTracker))
            .await
            .unwrap();
        assert!(!ctx.log_metrics(&record(0)).await);
        assert!(!ctx.mirror_artifact(&artifact).await);
        assert_eq!(ctx.tracker_failures(), 3);
        assert_eq!(std::fs::read(&artifact).unwrap(), b"weights");
        ctx.finish().await;
    }
}
