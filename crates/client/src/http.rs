//! HTTP client for the capture job API.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use tethercap_core::{
    CalibrationPreset, CameraStatus, CapturedFrame, JobId, JobListing, JobSnapshot,
    StartJobRequest,
};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(String),
    #[error("API error ({status}) {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("parse error: {0}")]
    Decode(String),
}

impl ClientError {
    /// HTTP status for API errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StartJobResponse {
    job_id: JobId,
}

#[derive(Debug, Deserialize)]
struct StartBatchResponse {
    job_ids: Vec<JobId>,
}

#[derive(Debug, Deserialize)]
struct PresetsResponse {
    presets: Vec<CalibrationPreset>,
}

#[derive(Debug, Deserialize)]
struct CommandResponse {
    job: Option<JobSnapshot>,
}

/// Typed client for one server.
#[derive(Debug, Clone)]
pub struct JobsClient {
    api_url: String,
    http: reqwest::Client,
}

impl JobsClient {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(api_url, reqwest::Client::new())
    }

    /// Client whose requests give up after `timeout`.
    pub fn with_timeout(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self::with_client(api_url, http))
    }

    pub fn with_client(api_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Check connectivity by hitting the health endpoint.
    pub async fn check_connectivity(&self) -> bool {
        matches!(
            self.request(Method::GET, "/health").send().await,
            Ok(resp) if resp.status().is_success()
        )
    }

    pub async fn start(&self, request: &StartJobRequest) -> Result<JobId, ClientError> {
        let resp: StartJobResponse = self
            .send(self.request(Method::POST, "/jobs").json(request))
            .await?;
        Ok(resp.job_id)
    }

    /// Start jobs that the server runs one after another; ids come back in
    /// run order.
    pub async fn start_batch(&self, requests: &[StartJobRequest]) -> Result<Vec<JobId>, ClientError> {
        let resp: StartBatchResponse = self
            .send(self.request(Method::POST, "/jobs/batch").json(requests))
            .await?;
        Ok(resp.job_ids)
    }

    pub async fn presets(&self) -> Result<Vec<CalibrationPreset>, ClientError> {
        let resp: PresetsResponse = self.send(self.request(Method::GET, "/jobs/presets")).await?;
        Ok(resp.presets)
    }

    pub async fn status(&self, job_id: JobId) -> Result<JobSnapshot, ClientError> {
        self.send(self.request(Method::GET, &format!("/jobs/{job_id}")))
            .await
    }

    pub async fn list(&self) -> Result<JobListing, ClientError> {
        self.send(self.request(Method::GET, "/jobs")).await
    }

    pub async fn pause(&self, job_id: JobId) -> Result<JobSnapshot, ClientError> {
        self.command(job_id, "pause").await
    }

    pub async fn resume(&self, job_id: JobId) -> Result<JobSnapshot, ClientError> {
        self.command(job_id, "resume").await
    }

    pub async fn cancel(&self, job_id: JobId) -> Result<JobSnapshot, ClientError> {
        self.command(job_id, "cancel").await
    }

    pub async fn purge(&self, job_id: JobId) -> Result<(), ClientError> {
        let _: CommandResponse = self
            .send(self.request(Method::DELETE, &format!("/jobs/{job_id}")))
            .await?;
        Ok(())
    }

    pub async fn camera_status(&self) -> Result<CameraStatus, ClientError> {
        self.send(self.request(Method::GET, "/camera")).await
    }

    /// Ad hoc capture outside any job.
    pub async fn capture(
        &self,
        base_name: Option<&str>,
        exposure_time: Option<&str>,
        iso: Option<&str>,
    ) -> Result<CapturedFrame, ClientError> {
        let body = json!({
            "base_name": base_name,
            "exposure_time": exposure_time,
            "iso": iso,
        });
        self.send(self.request(Method::POST, "/camera/capture").json(&body))
            .await
    }

    async fn command(&self, job_id: JobId, action: &str) -> Result<JobSnapshot, ClientError> {
        let resp: CommandResponse = self
            .send(self.request(Method::POST, &format!("/jobs/{job_id}/{action}")))
            .await?;
        resp.job
            .ok_or_else(|| ClientError::Decode(format!("{action} response carried no job")))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.api_url, path))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await.map_err(|e| ClientError::Network(e.to_string()))?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => (body.error, body.message),
            Err(_) => ("unknown".to_string(), text),
        };
        return Err(ClientError::Api {
            status: status.as_u16(),
            code,
            message,
        });
    }
    resp.json().await.map_err(|e| ClientError::Decode(e.to_string()))
}
