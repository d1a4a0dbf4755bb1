//! services/api/src/adapters/vlm.rs
//!
//! Document parser adapter backed by the VLM Run REST API.
//!
//! A parse is two calls: the file is uploaded to `/files`, then a batch
//! prediction is requested for it on `/document/generate`. The prediction id
//! is the job handle polled through `/predictions/{id}`.

use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use resume_review_core::domain::ParseJobStatus;
use resume_review_core::ports::{DocumentParserService, PortError, PortResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum VlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl From<VlmError> for PortError {
    fn from(e: VlmError) -> Self {
        PortError::Upstream(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    file_id: &'a str,
    domain: &'a str,
    batch: bool,
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    id: String,
    status: String,
    #[serde(default)]
    response: Option<Value>,
    #[serde(default)]
    errors: Option<Value>,
}

impl PredictionResponse {
    fn into_job_status(self) -> ParseJobStatus {
        match self.status.as_str() {
            "completed" => match self.response {
                Some(parsed) if !parsed.is_null() => ParseJobStatus::Completed(parsed),
                _ => ParseJobStatus::Failed("parser returned no content".to_string()),
            },
            "failed" => ParseJobStatus::Failed(describe_errors(self.errors)),
            _ => ParseJobStatus::Pending,
        }
    }
}

fn describe_errors(errors: Option<Value>) -> String {
    match errors {
        None | Some(Value::Null) => "unknown error".to_string(),
        Some(Value::String(message)) => message,
        Some(Value::Array(items)) if items.is_empty() => "unknown error".to_string(),
        Some(other) => other.to_string(),
    }
}

/// Client for the VLM Run API.
#[derive(Clone)]
pub struct VlmParserAdapter {
    client: Client,
    base_url: String,
    api_key: String,
}

impl VlmParserAdapter {
    pub fn new(api_key: String, base_url: &str) -> Result<Self, VlmError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn upload_file(&self, contents: &[u8], filename: &str) -> Result<String, VlmError> {
        let part = multipart::Part::bytes(contents.to_vec()).file_name(filename.to_string());
        let form = multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let response = self
            .client
            .post(self.url("files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let file: FileResponse = checked(response).await?.json().await?;
        Ok(file.id)
    }
}

/// Turns a non-2xx response into `VlmError::Api`.
async fn checked(response: Response) -> Result<Response, VlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    warn!("VLM API returned {}: {}", status, message);
    Err(VlmError::Api {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl DocumentParserService for VlmParserAdapter {
    async fn submit(&self, contents: &[u8], filename: &str, domain: &str) -> PortResult<String> {
        let file_id = self.upload_file(contents, filename).await?;
        debug!("Uploaded {} to the parser as {}", filename, file_id);

        let response = self
            .client
            .post(self.url("document/generate"))
            .bearer_auth(&self.api_key)
            .json(&GenerateRequest {
                file_id: &file_id,
                domain,
                batch: true,
            })
            .send()
            .await
            .map_err(VlmError::from)?;

        let prediction: PredictionResponse = checked(response)
            .await?
            .json()
            .await
            .map_err(VlmError::from)?;
        Ok(prediction.id)
    }

    async fn get_status(&self, job_id: &str) -> PortResult<ParseJobStatus> {
        let response = self
            .client
            .get(self.url(&format!("predictions/{}", job_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(VlmError::from)?;

        let prediction: PredictionResponse = checked(response)
            .await?
            .json()
            .await
            .map_err(VlmError::from)?;
        Ok(prediction.into_job_status())
    }
}
