//! Capture-time analysis
//!
//! The user waits on this path, so the analyzer gets the shorter interactive
//! timeout. A failure while offline queues the photo for a later drain; a
//! failure while online is reported and nothing is queued.

use crate::client::{AnalysisService, AnalyzeError, AnalyzeRequest};
use crate::connectivity::ConnectivityProbe;
use crate::image_prep::ImagePreparer;
use crate::journal::LandmarkJournal;
use crate::queue::PendingQueue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tripai_common::config::IdentityConfig;
use tripai_common::{Error, LandmarkRecord, PendingItem, Result};

/// Default bound for the analysis the user is waiting on
pub const DEFAULT_INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Analyzed now and stored in the journal (not yet saved)
    Analyzed(LandmarkRecord),
    /// Device offline; photo queued with a placeholder
    Queued(PendingItem),
    /// Server reachable but the analysis failed
    Failed(String),
}

pub struct CaptureFlow {
    queue: PendingQueue,
    journal: LandmarkJournal,
    analyzer: Arc<dyn AnalysisService>,
    images: Arc<dyn ImagePreparer>,
    probe: Arc<dyn ConnectivityProbe>,
    identity: IdentityConfig,
    timeout: Duration,
}

impl CaptureFlow {
    pub fn new(
        queue: PendingQueue,
        journal: LandmarkJournal,
        analyzer: Arc<dyn AnalysisService>,
        images: Arc<dyn ImagePreparer>,
        probe: Arc<dyn ConnectivityProbe>,
    ) -> Self {
        Self {
            queue,
            journal,
            analyzer,
            images,
            probe,
            identity: IdentityConfig::default(),
            timeout: DEFAULT_INTERACTIVE_TIMEOUT,
        }
    }

    pub fn with_identity(mut self, identity: IdentityConfig) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Analyze a freshly captured photo, queueing it when offline
    ///
    /// Errors only when the photo cannot be read or the store cannot be written.
    pub async fn analyze_capture(
        &self,
        photo_ref: &str,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<CaptureOutcome> {
        let (image, prepared_ref) = match self.images.prepare(photo_ref).await {
            Some(prepared) => (prepared.bytes, Some(prepared.prepared_ref)),
            None => match self.images.read_raw(photo_ref).await {
                Some(raw) => (raw, None),
                None => return Err(Error::InvalidInput("Failed to load image".to_string())),
            },
        };

        let outcome = self
            .analyze_prepared(photo_ref, image, prepared_ref.as_deref(), latitude, longitude)
            .await;

        // Queued items are prepared again at drain time
        if let Some(prepared_ref) = &prepared_ref {
            if !matches!(outcome, Ok(CaptureOutcome::Analyzed(_))) {
                self.images.discard(prepared_ref).await;
            }
        }

        outcome
    }

    async fn analyze_prepared(
        &self,
        photo_ref: &str,
        image: Vec<u8>,
        prepared_ref: Option<&str>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<CaptureOutcome> {
        let request = AnalyzeRequest {
            image,
            user_id: self.identity.user_id,
            device_id: self.identity.device_id.clone(),
            language: self.identity.language.clone(),
            latitude,
            longitude,
        };

        let result = tokio::time::timeout(self.timeout, self.analyzer.analyze(request))
            .await
            .unwrap_or(Err(AnalyzeError::Timeout));

        let error = match result {
            Ok(response) => {
                let record = self
                    .journal
                    .record_analyzed(
                        prepared_ref.unwrap_or(photo_ref),
                        response,
                        latitude,
                        longitude,
                        self.identity.language.clone(),
                        chrono::Utc::now(),
                    )
                    .await?;
                return Ok(CaptureOutcome::Analyzed(record));
            }
            Err(e) => e,
        };

        if self.probe.is_online().await {
            warn!(photo_ref, error = %error, "Capture analysis failed");
            return Ok(CaptureOutcome::Failed(error.to_string()));
        }

        info!(photo_ref, error = %error, "Offline, queueing photo for later analysis");
        let item = self
            .queue
            .enqueue(photo_ref, latitude, longitude, chrono::Utc::now())
            .await?;
        Ok(CaptureOutcome::Queued(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use crate::test_support::{landmark, StubAnalyzer, StubImages};
    use async_trait::async_trait;

    struct FixedProbe(bool);

    #[async_trait]
    impl ConnectivityProbe for FixedProbe {
        async fn is_online(&self) -> bool {
            self.0
        }
    }

    fn flow(analyzer: StubAnalyzer, images: StubImages, online: bool) -> (CaptureFlow, LocalStore) {
        let (flow, store, _images) = flow_with_images(analyzer, images, online);
        (flow, store)
    }

    fn flow_with_images(
        analyzer: StubAnalyzer,
        images: StubImages,
        online: bool,
    ) -> (CaptureFlow, LocalStore, Arc<StubImages>) {
        let store = LocalStore::in_memory();
        let images = Arc::new(images);
        let flow = CaptureFlow::new(
            PendingQueue::new(store.clone()),
            LandmarkJournal::new(store.clone()),
            Arc::new(analyzer),
            images.clone(),
            Arc::new(FixedProbe(online)),
        );
        (flow, store, images)
    }

    #[tokio::test]
    async fn test_success_stores_unsaved_record_with_prepared_ref() {
        let (flow, store) = flow(
            StubAnalyzer::new(|_| Ok(landmark(42, "Eiffel Tower"))),
            StubImages::compressing(),
            true,
        );
        let flow = flow.with_identity(IdentityConfig {
            language: Some("es".to_string()),
            ..IdentityConfig::default()
        });

        let outcome = flow.analyze_capture("p/shot.jpg", Some(48.85), Some(2.29)).await.unwrap();

        let CaptureOutcome::Analyzed(record) = outcome else {
            panic!("expected Analyzed, got {:?}", outcome);
        };
        assert_eq!(record.server_id, 42);
        assert!(!record.is_saved);
        assert_eq!(record.photo_ref, "/cache/compressed_images/p_shot.jpg");
        assert_eq!(record.language.as_deref(), Some("es"));
        assert_eq!(store.landmarks().await, vec![record]);
        assert!(store.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_offline_failure_queues_original_photo() {
        let (flow, store) = flow(StubAnalyzer::failing(), StubImages::compressing(), false);

        let outcome = flow.analyze_capture("p/shot.jpg", Some(1.0), Some(2.0)).await.unwrap();

        let CaptureOutcome::Queued(item) = outcome else {
            panic!("expected Queued, got {:?}", outcome);
        };
        assert_eq!(item.photo_ref, "p/shot.jpg");
        assert_eq!(store.pending().await, vec![item.clone()]);

        let landmarks = store.landmarks().await;
        assert_eq!(landmarks.len(), 1);
        assert!(landmarks[0].is_pending());
        assert_eq!(landmarks[0].pending_id, Some(item.id));
    }

    #[tokio::test]
    async fn test_online_failure_is_reported_not_queued() {
        let (flow, store) = flow(
            StubAnalyzer::new(|_| Err(AnalyzeError::Api(500, "quota exceeded".to_string()))),
            StubImages::raw(),
            true,
        );

        let outcome = flow.analyze_capture("p/shot.jpg", None, None).await.unwrap();

        assert_eq!(
            outcome,
            CaptureOutcome::Failed("Server error 500: quota exceeded".to_string())
        );
        assert!(store.pending().await.is_empty());
        assert!(store.landmarks().await.is_empty());
    }

    #[tokio::test]
    async fn test_interactive_timeout_reported() {
        let mut analyzer = StubAnalyzer::succeeding();
        analyzer.delay = Some(Duration::from_secs(5));
        let (flow, _store) = flow(analyzer, StubImages::raw(), true);
        let flow = flow.with_timeout(Duration::from_millis(20));

        let outcome = flow.analyze_capture("p/slow.jpg", None, None).await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Failed("Request timed out".to_string()));
    }

    #[tokio::test]
    async fn test_queued_capture_discards_prepared_copy() {
        let (flow, store, images) =
            flow_with_images(StubAnalyzer::failing(), StubImages::compressing(), false);

        let outcome = flow.analyze_capture("p/shot.jpg", None, None).await.unwrap();

        assert!(matches!(outcome, CaptureOutcome::Queued(_)));
        assert_eq!(store.pending().await[0].photo_ref, "p/shot.jpg");
        assert_eq!(images.discarded(), vec!["/cache/compressed_images/p_shot.jpg"]);
    }

    #[tokio::test]
    async fn test_failed_capture_discards_prepared_copy() {
        let (flow, _store, images) =
            flow_with_images(StubAnalyzer::failing(), StubImages::compressing(), true);

        let outcome = flow.analyze_capture("p/shot.jpg", None, None).await.unwrap();

        assert!(matches!(outcome, CaptureOutcome::Failed(_)));
        assert_eq!(images.discarded(), vec!["/cache/compressed_images/p_shot.jpg"]);
    }

    #[tokio::test]
    async fn test_analyzed_capture_keeps_prepared_copy() {
        let (flow, _store, images) =
            flow_with_images(StubAnalyzer::succeeding(), StubImages::compressing(), true);

        flow.analyze_capture("p/shot.jpg", None, None).await.unwrap();

        assert!(images.discarded().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_photo_is_an_error() {
        let images = StubImages::with_unreadable(&["p/gone.jpg"]);
        let (flow, store) = flow(StubAnalyzer::succeeding(), images, false);

        let result = flow.analyze_capture("p/gone.jpg", None, None).await;

        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(store.pending().await.is_empty());
    }
}
