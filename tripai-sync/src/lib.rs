//! tripai-sync library interface
//!
//! Offline pending-analysis queue for the TripAI landmark journal and the
//! engine that drains it against the analyze server.

pub mod capture;
pub mod client;
pub mod connectivity;
pub mod engine;
pub mod image_prep;
pub mod journal;
pub mod queue;
pub mod store;

#[cfg(test)]
mod test_support;

pub use crate::engine::{SyncEngine, SyncSummary};

use crate::capture::CaptureFlow;
use crate::client::HttpAnalysisClient;
use crate::connectivity::HttpHealthProbe;
use crate::image_prep::JpegImagePreparer;
use crate::journal::LandmarkJournal;
use crate::queue::PendingQueue;
use crate::store::{LocalStore, SqliteKvStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tripai_common::config::{RootFolderLayout, TomlConfig};
use tripai_common::events::EventBus;
use tripai_common::{Error, Result};

/// Services wired from configuration, shared by the CLI commands
pub struct AppContext {
    pub config: TomlConfig,
    pub layout: RootFolderLayout,
    pub event_bus: EventBus,
    pub store: LocalStore,
    pub queue: PendingQueue,
    pub journal: LandmarkJournal,
    pub engine: Arc<SyncEngine>,
    pub capture: CaptureFlow,
    pub probe: Arc<HttpHealthProbe>,
}

impl AppContext {
    /// Open the on-device store under `layout` and build every service
    pub async fn open(config: TomlConfig, layout: RootFolderLayout) -> Result<Self> {
        config.validate()?;
        layout.ensure_directories()?;

        let db_path = layout.database_path();
        info!("Database: {}", db_path.display());
        let kv = SqliteKvStore::open(&db_path).await?;
        let store = LocalStore::new(Arc::new(kv));

        let queue = PendingQueue::new(store.clone());
        let journal = LandmarkJournal::new(store.clone());
        let event_bus = EventBus::new(100);

        let server = &config.server;
        let batch_timeout = Duration::from_secs(server.batch_timeout_secs);
        let interactive_timeout = Duration::from_secs(server.interactive_timeout_secs);

        let batch_client = HttpAnalysisClient::new(&server.base_url, batch_timeout)
            .map_err(|e| Error::Config(e.to_string()))?;
        let interactive_client = HttpAnalysisClient::new(&server.base_url, interactive_timeout)
            .map_err(|e| Error::Config(e.to_string()))?;
        let probe = Arc::new(HttpHealthProbe::new(
            &server.base_url,
            Duration::from_secs(config.connectivity.probe_timeout_secs),
        )?);
        let images = Arc::new(JpegImagePreparer::new(
            layout.image_cache_dir(),
            config.image.max_edge,
            config.image.jpeg_quality,
        ));

        let engine = Arc::new(
            SyncEngine::new(store.clone(), Arc::new(batch_client), images.clone())
                .with_identity(config.identity.clone())
                .with_item_timeout(batch_timeout)
                .with_event_bus(event_bus.clone()),
        );

        let capture = CaptureFlow::new(
            queue.clone(),
            journal.clone(),
            Arc::new(interactive_client),
            images,
            probe.clone(),
        )
        .with_identity(config.identity.clone())
        .with_timeout(interactive_timeout);

        Ok(Self {
            config,
            layout,
            event_bus,
            store,
            queue,
            journal,
            engine,
            capture,
            probe,
        })
    }
}
