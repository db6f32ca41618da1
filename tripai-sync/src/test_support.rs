//! Stub collaborators shared by unit tests

use crate::client::{AnalysisResponse, AnalysisService, AnalyzeError, AnalyzeRequest};
use crate::image_prep::{ImagePreparer, PreparedImage};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tripai_common::LandmarkDetails;

type Respond = Box<dyn Fn(&str) -> Result<AnalysisResponse, AnalyzeError> + Send + Sync>;

/// Analyzer keyed by the photo reference [`StubImages`] encodes as bytes
pub struct StubAnalyzer {
    respond: Respond,
    pub delay: Option<Duration>,
    /// (entered, release): signals `entered` then waits for `release`
    pub gate: Option<(Arc<Notify>, Arc<Notify>)>,
    requests: std::sync::Mutex<Vec<AnalyzeRequest>>,
}

impl StubAnalyzer {
    pub fn new(
        respond: impl Fn(&str) -> Result<AnalysisResponse, AnalyzeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            delay: None,
            gate: None,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(|photo| Ok(landmark(7, &format!("Landmark {}", photo))))
    }

    pub fn failing() -> Self {
        Self::new(|_| Err(AnalyzeError::Network("connection refused".to_string())))
    }

    pub fn requests(&self) -> Vec<AnalyzeRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnalysisService for StubAnalyzer {
    async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalysisResponse, AnalyzeError> {
        let photo = String::from_utf8_lossy(&request.image).to_string();
        self.requests.lock().unwrap().push(request);

        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        (self.respond)(&photo)
    }
}

/// Images whose bytes are the photo reference itself
pub struct StubImages {
    pub compress: bool,
    pub unreadable: HashSet<String>,
    discarded: std::sync::Mutex<Vec<String>>,
}

impl StubImages {
    pub fn raw() -> Self {
        Self {
            compress: false,
            unreadable: HashSet::new(),
            discarded: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn compressing() -> Self {
        Self {
            compress: true,
            ..Self::raw()
        }
    }

    /// Compressing stub that cannot read `photo_refs` at all
    pub fn with_unreadable(photo_refs: &[&str]) -> Self {
        Self {
            unreadable: photo_refs.iter().map(|r| r.to_string()).collect(),
            ..Self::compressing()
        }
    }

    /// Prepared references handed back through `discard`
    pub fn discarded(&self) -> Vec<String> {
        self.discarded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImagePreparer for StubImages {
    async fn prepare(&self, photo_ref: &str) -> Option<PreparedImage> {
        if !self.compress || self.unreadable.contains(photo_ref) {
            return None;
        }
        Some(PreparedImage {
            bytes: photo_ref.as_bytes().to_vec(),
            prepared_ref: format!("/cache/compressed_images/{}", photo_ref.replace('/', "_")),
        })
    }

    async fn read_raw(&self, photo_ref: &str) -> Option<Vec<u8>> {
        if self.unreadable.contains(photo_ref) {
            None
        } else {
            Some(photo_ref.as_bytes().to_vec())
        }
    }

    async fn discard(&self, prepared_ref: &str) {
        self.discarded.lock().unwrap().push(prepared_ref.to_string());
    }
}

pub fn landmark(id: i64, name: &str) -> AnalysisResponse {
    AnalysisResponse {
        id,
        details: LandmarkDetails {
            name: name.to_string(),
            location: "Paris, France".to_string(),
            status: "Landmark".to_string(),
            ..LandmarkDetails::default()
        },
    }
}

pub fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}
