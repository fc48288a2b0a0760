use merit_types::RepAmount;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// System-wide REP accounting. `circulating = total_minted - total_burned`
/// holds at all times; forfeiture burns are the only outflow.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SupplyMetrics {
    pub total_minted: RepAmount,
    pub total_burned: RepAmount,
    pub circulating: RepAmount,
}

#[derive(Clone, Default)]
pub struct RepSupply {
    metrics: Arc<RwLock<SupplyMetrics>>,
}

impl RepSupply {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mint(&self, amount: RepAmount) {
        if amount.is_zero() {
            return;
        }
        let mut metrics = self.metrics.write().await;
        metrics.total_minted = metrics.total_minted.saturating_add(amount);
        metrics.circulating = metrics.circulating.saturating_add(amount);
    }

    pub async fn burn(&self, amount: RepAmount) {
        if amount.is_zero() {
            return;
        }
        let mut metrics = self.metrics.write().await;
        metrics.total_burned = metrics.total_burned.saturating_add(amount);
        metrics.circulating = metrics.circulating.saturating_sub(amount);
        info!(
            burned = %amount,
            circulating = %metrics.circulating,
            "🔥 REP burned"
        );
    }

    pub async fn metrics(&self) -> SupplyMetrics {
        *self.metrics.read().await
    }
}
