use crate::config::NodeConfig;
use merit_ledger::{BondingLedger, LedgerStorage, MemoryLedgerStorage};
use merit_reaper::{Reaper, ReaperLock};
use merit_store::{EventStorage, EventStore, MemoryEventStorage};
use merit_types::Result;
use std::sync::Arc;
use tracing::info;

/// Wires the event store, bonding ledger, and reaper into one process-wide
/// engine. Constructed once; all operations go through its handles.
pub struct MeritEngine {
    pub store: Arc<EventStore>,
    pub ledger: Arc<BondingLedger>,
    pub reaper: Arc<Reaper>,
}

impl MeritEngine {
    /// Engine over in-memory backends, for development and tests.
    pub fn new(config: &NodeConfig) -> Self {
        Self::with_storage(
            config,
            Arc::new(MemoryEventStorage::new()),
            Arc::new(MemoryLedgerStorage::new()),
            None,
        )
    }

    /// Engine over injected storage backends and an optional reaper lock.
    pub fn with_storage(
        config: &NodeConfig,
        event_storage: Arc<dyn EventStorage>,
        ledger_storage: Arc<dyn LedgerStorage>,
        reaper_lock: Option<Arc<dyn ReaperLock>>,
    ) -> Self {
        let store = Arc::new(EventStore::new(event_storage, config.store_config()));
        let ledger = Arc::new(BondingLedger::new(
            ledger_storage,
            store.clone(),
            config.ledger_config(),
        ));
        let reaper = Arc::new(Reaper::new(
            ledger.clone(),
            config.reaper_config(),
            reaper_lock,
        ));

        Self {
            store,
            ledger,
            reaper,
        }
    }

    /// Hydrate derived state from durable storage, then start background
    /// work. Must complete before the engine serves requests.
    pub async fn start(&self) -> Result<()> {
        self.store.hydrate().await?;
        self.reaper.start().await;
        info!("🚀 Merit engine started");
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.reaper.stop().await;
        info!("Merit engine shut down");
    }
}
