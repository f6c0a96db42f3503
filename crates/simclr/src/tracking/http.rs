//! HTTP client for a JSON tracking server.
//!
//! Endpoints, relative to the base URL (any path prefix is kept):
//! - `POST api/runs` `{project, config}` -> `{id}`
//! - `POST api/runs/{id}/metrics` `{step, metrics}`
//! - `PUT  api/runs/{id}/artifacts/{name}` raw bytes
//! - `POST api/runs/{id}/finish`
//!
//! No retries: the caller treats every failure as non-fatal.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use super::{artifact_files, MetricRecord, Tracker, TrackingError};

#[derive(Serialize)]
struct StartRunRequest<'a> {
    project: &'a str,
    config: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct StartRunResponse {
    id: String,
}

#[derive(Serialize)]
struct LogRequest {
    step: u64,
    metrics: std::collections::BTreeMap<String, f64>,
}

/// Tracker backed by a remote tracking server.
pub struct HttpTracker {
    client: Client,
    base_url: Url,
    run_id: Option<String>,
}

impl HttpTracker {
    /// Build a client for `server_url`. Does not contact the server.
    pub fn new(server_url: &str) -> Result<Self, TrackingError> {
        let mut base_url = Url::parse(server_url)?;
        // Url::join drops the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url,
            run_id: None,
        })
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    fn endpoint(&self, path: &str) -> Result<Url, TrackingError> {
        Ok(self.base_url.join(path)?)
    }

    fn run_url(&self, suffix: &str) -> Result<Url, TrackingError> {
        let id = self.run_id.as_deref().ok_or(TrackingError::NotStarted)?;
        self.endpoint(&format!("api/runs/{id}/{suffix}"))
    }

    async fn check(resp: Response) -> Result<Response, TrackingError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body: String = resp.text().await.unwrap_or_default().chars().take(200).collect();
        Err(TrackingError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl Tracker for HttpTracker {
    async fn start_run(&mut self, project: &str, config: &serde_json::Value) -> Result<(), TrackingError> {
        let url = self.endpoint("api/runs")?;
        let resp = self
            .client
            .post(url)
            .json(&StartRunRequest { project, config })
            .send()
            .await?;
        let body: StartRunResponse = Self::check(resp).await?.json().await?;
        tracing::info!(run_id = %body.id, url = %self.base_url, "Tracking run started");
        self.run_id = Some(body.id);
        Ok(())
    }

    async fn log_metrics(&mut self, record: &MetricRecord) -> Result<(), TrackingError> {
        let url = self.run_url("metrics")?;
        let resp = self
            .client
            .post(url)
            .json(&LogRequest {
                step: record.global_step,
                metrics: record.to_map(),
            })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn save_artifact(&mut self, path: &Path) -> Result<(), TrackingError> {
        for (name, file) in artifact_files(path)? {
            let url = self.run_url(&format!("artifacts/{name}"))?;
            let bytes = tokio::fs::read(&file).await?;
            let resp = self.client.put(url).body(bytes).send().await?;
            Self::check(resp).await?;
            tracing::debug!(artifact = %name, "Artifact uploaded");
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), TrackingError> {
        let url = self.run_url("finish")?;
        let resp = self.client.post(url).send().await?;
        Self::check(resp).await?;
        self.run_id = None;
        Ok(())
    }
}
