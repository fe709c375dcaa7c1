//! Runtime wiring: builds every component from configuration and owns the
//! background tasks.

use std::sync::Arc;

use futures::future::join_all;
use notify::DeliveryQueue;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::GuardianConfig;
use crate::error::Result;
use crate::scoring::SignalScorer;
use crate::settings::SettingsManager;
use crate::storage::{FileStore, KeyValueStore};
use crate::store::IncidentStore;
use crate::triage::IncidentTriage;

/// A running monitor.
///
/// Background tasks (retention sweep, delivery retries) run until
/// [`Guardian::shutdown`].
pub struct Guardian {
    config: GuardianConfig,
    triage: Arc<IncidentTriage>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Guardian {
    /// Build components backed by the configured data directory without
    /// starting background tasks.
    pub async fn open(config: GuardianConfig) -> Result<Self> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(&config.data_dir));
        Self::open_with_store(config, kv, SignalScorer::default()).await
    }

    /// Build components over an explicit key-value store and scorer.
    pub async fn open_with_store(
        config: GuardianConfig,
        kv: Arc<dyn KeyValueStore>,
        scorer: SignalScorer,
    ) -> Result<Self> {
        config.validate()?;

        let settings = Arc::new(SettingsManager::load(Arc::clone(&kv)).await);
        let store = Arc::new(IncidentStore::load(kv, config.retention.max_age()).await);
        let delivery = Arc::new(DeliveryQueue::from_config(
            config.channels.telegram.clone(),
            config.channels.whatsapp.clone(),
            config.delivery.clone(),
        ));

        let triage = Arc::new(IncidentTriage::new(
            scorer,
            store,
            settings,
            delivery,
            config.device.clone(),
        ));

        Ok(Self {
            config,
            triage,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Open and spawn the background tasks.
    pub async fn start(config: GuardianConfig) -> Result<Self> {
        let mut guardian = Self::open(config).await?;
        guardian.spawn_background();
        Ok(guardian)
    }

    /// Spawn the retention sweep and the delivery retry worker. Idempotent.
    pub fn spawn_background(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }

        let retention = Arc::clone(self.triage.store())
            .spawn_retention(self.config.retention.sweep_interval(), self.cancel.child_token());
        let retries = Arc::clone(self.triage.delivery()).spawn_retry_worker(self.cancel.child_token());
        self.tasks = vec![retention, retries];

        info!(
            device_id = %self.config.device.id,
            data_dir = %self.config.data_dir.display(),
            channels = self.triage.delivery().channel_count(),
            "Guardian started"
        );
    }

    pub fn config(&self) -> &GuardianConfig {
        &self.config
    }

    pub fn triage(&self) -> &Arc<IncidentTriage> {
        &self.triage
    }

    /// Token cancelled on shutdown. Cancelling it stops background tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop background tasks, wait for them, and persist the incident
    /// snapshot.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();

        for result in join_all(self.tasks.drain(..)).await {
            if let Err(e) = result {
                error!(error = %e, "Background task failed");
            }
        }

        self.triage.store().flush().await;

        let pending = self.triage.delivery().pending_len().await;
        if pending > 0 {
            info!(pending, "Undelivered alerts discarded at shutdown");
        }
        info!("Guardian stopped");
    }
}
