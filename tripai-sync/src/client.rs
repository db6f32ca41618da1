//! Analyze API client
//!
//! Multipart upload of one photo to `POST {base_url}/api/analyze`; the server
//! answers with the landmark description as JSON.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tripai_common::models::UNASSIGNED_SERVER_ID;
use tripai_common::LandmarkDetails;

const USER_AGENT: &str = concat!("TripAI/", env!("CARGO_PKG_VERSION"));

/// Analyze call errors
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for AnalyzeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AnalyzeError::Timeout
        } else {
            AnalyzeError::Network(e.to_string())
        }
    }
}

/// One photo to analyze; every field but the image is optional on the wire
#[derive(Debug, Clone, Default)]
pub struct AnalyzeRequest {
    pub image: Vec<u8>,
    pub user_id: Option<i64>,
    pub device_id: Option<String>,
    pub language: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Analyze endpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    #[serde(default = "unassigned")]
    pub id: i64,
    #[serde(flatten)]
    pub details: LandmarkDetails,
}

fn unassigned() -> i64 {
    UNASSIGNED_SERVER_ID
}

/// The remote analysis call
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisResponse, AnalyzeError>;
}

/// reqwest-backed [`AnalysisService`]
pub struct HttpAnalysisClient {
    http_client: reqwest::Client,
    analyze_url: String,
}

impl HttpAnalysisClient {
    /// `timeout` bounds the whole request (connect, upload and response)
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AnalyzeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| AnalyzeError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            analyze_url: format!("{}/api/analyze", base_url.trim_end_matches('/')),
        })
    }

    pub fn analyze_url(&self) -> &str {
        &self.analyze_url
    }

    fn build_form(request: AnalyzeRequest) -> Result<Form, AnalyzeError> {
        let image = Part::bytes(request.image)
            .file_name("photo.jpg")
            .mime_str("image/jpeg")
            .map_err(|e| AnalyzeError::Network(e.to_string()))?;

        let mut form = Form::new().part("image", image);

        if let Some(user_id) = request.user_id {
            form = form.text("user_id", user_id.to_string());
        }
        if let Some(device_id) = request.device_id {
            form = form.text("device_id", device_id);
        }
        if let Some(language) = request.language {
            form = form.text("language", language);
        }
        if let Some(latitude) = request.latitude {
            form = form.text("latitude", latitude.to_string());
        }
        if let Some(longitude) = request.longitude {
            form = form.text("longitude", longitude.to_string());
        }

        Ok(form)
    }
}

/// Pull the server's `message` (or `error`) out of an error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisResponse, AnalyzeError> {
        tracing::debug!(
            bytes = request.image.len(),
            has_location = request.latitude.is_some() && request.longitude.is_some(),
            "Uploading photo for analysis"
        );

        let form = Self::build_form(request)?;
        let response = self
            .http_client
            .post(&self.analyze_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AnalyzeError::Api(status.as_u16(), error_message(&body)));
        }

        let analysis: AnalysisResponse =
            serde_json::from_str(&body).map_err(|e| AnalyzeError::Parse(e.to_string()))?;

        tracing::info!(
            server_id = analysis.id,
            name = %analysis.details.name,
            "Analysis successful"
        );

        Ok(analysis)
    }
}
