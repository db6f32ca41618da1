//! Connectivity-driven sync prompting
//!
//! [`ConnectivityMonitor`] polls a [`ConnectivityProbe`] and publishes
//! reachability on a watch channel. [`SyncTrigger`] asks the user whether to
//! drain the queue at startup and whenever the device comes back online, with at
//! most one prompt showing at a time.

use crate::engine::{SyncEngine, SyncSummary};
use crate::queue::PendingQueue;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tripai_common::{Error, Result};

/// "Is the device online right now?"
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Online iff `GET {base_url}/api/health` answers 2xx within the timeout
pub struct HttpHealthProbe {
    http_client: reqwest::Client,
    health_url: String,
}

impl HttpHealthProbe {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            health_url: format!("{}/api/health", base_url.trim_end_matches('/')),
        })
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }
}

#[async_trait]
impl ConnectivityProbe for HttpHealthProbe {
    async fn is_online(&self) -> bool {
        match self.http_client.get(&self.health_url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(url = %self.health_url, error = %e, "Health probe failed");
                false
            }
        }
    }
}

/// Periodic reachability polling
pub struct ConnectivityMonitor {
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
    tx: watch::Sender<bool>,
}

impl ConnectivityMonitor {
    /// Probe once so subscribers start from the real state
    pub async fn new(probe: Arc<dyn ConnectivityProbe>, interval: Duration) -> Self {
        let online = probe.is_online().await;
        let (tx, _) = watch::channel(online);
        Self { probe, interval, tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Probe now and publish only if the state changed
    pub async fn check_now(&self) -> bool {
        let online = self.probe.is_online().await;
        self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            info!(online, "Connectivity changed");
            true
        });
        online
    }

    /// Poll until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    self.check_now().await;
                }
            }
        }
        debug!("Connectivity monitor stopped");
    }
}

/// The user-facing half of a sync: ask, then report
#[async_trait]
pub trait SyncPrompt: Send + Sync {
    /// Whether to analyze `pending_count` queued photos now
    async fn confirm(&self, pending_count: usize) -> bool;

    async fn show_result(&self, summary: &SyncSummary) {
        info!("{}", summary.message());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    NothingPending,
    Offline,
    PromptAlreadyShowing,
    Declined,
    Synced(SyncSummary),
}

/// Clears the "prompt showing" flag however the prompt ends
struct PromptGuard<'a>(&'a AtomicBool);

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncTrigger {
    queue: PendingQueue,
    engine: Arc<SyncEngine>,
    probe: Arc<dyn ConnectivityProbe>,
    prompt: Arc<dyn SyncPrompt>,
    prompt_showing: AtomicBool,
}

impl SyncTrigger {
    pub fn new(
        queue: PendingQueue,
        engine: Arc<SyncEngine>,
        probe: Arc<dyn ConnectivityProbe>,
        prompt: Arc<dyn SyncPrompt>,
    ) -> Self {
        Self {
            queue,
            engine,
            probe,
            prompt,
            prompt_showing: AtomicBool::new(false),
        }
    }

    /// Offer a sync if anything is queued and the device is online
    pub async fn check_and_prompt(&self) -> TriggerOutcome {
        let pending = self.queue.count().await;
        if pending == 0 {
            return TriggerOutcome::NothingPending;
        }

        if !self.probe.is_online().await {
            debug!(pending, "Offline, not offering sync");
            return TriggerOutcome::Offline;
        }

        if self
            .prompt_showing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return TriggerOutcome::PromptAlreadyShowing;
        }

        let confirmed = {
            let _showing = PromptGuard(&self.prompt_showing);
            self.prompt.confirm(pending).await
        };

        if !confirmed {
            info!(pending, "Sync declined");
            return TriggerOutcome::Declined;
        }

        let summary = self.engine.sync_all().await;
        self.prompt.show_result(&summary).await;
        TriggerOutcome::Synced(summary)
    }

    /// Check once now, then on every offline-to-online transition
    pub async fn run(&self, mut online_rx: watch::Receiver<bool>, cancel: CancellationToken) {
        let mut was_online = *online_rx.borrow_and_update();
        let outcome = self.check_and_prompt().await;
        debug!(?outcome, "Startup sync check");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online && !was_online {
                        let outcome = self.check_and_prompt().await;
                        debug!(?outcome, "Back online sync check");
                    }
                    was_online = online;
                }
            }
        }
        debug!("Sync trigger stopped");
    }
}

/// Wait for named background tasks after cancellation
///
/// A task that panicked or was aborted is logged; returns how many did.
pub async fn join_background_tasks(tasks: Vec<(&str, JoinHandle<()>)>) -> usize {
    let mut failed = 0;
    for (name, handle) in tasks {
        if let Err(e) = handle.await {
            warn!(task = name, error = %e, "Background task failed");
            failed += 1;
        }
    }
    failed
}
