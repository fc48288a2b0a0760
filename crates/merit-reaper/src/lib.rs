//! The reaper: a timer-driven loop that slashes overdue tickets.
//!
//! Runs an initial pass shortly after startup, then reschedules itself at
//! `base_interval ± jitter%` so multiple instances do not thunder in step.
//! Cross-instance exclusion is an injected, best-effort capability; the
//! ledger's per-ticket state transition remains the actual safety net
//! against double forfeiture.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use merit_ledger::BondingLedger;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    pub enabled: bool,
    /// Delay before the first pass after startup.
    pub initial_delay: Duration,
    pub base_interval: Duration,
    /// Uniform jitter applied to each interval, as a fraction of it.
    pub jitter_percent: f64,
    /// Fraction of an overdue bond that is burned.
    pub slash_percent: f64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(5),
            base_interval: Duration::from_secs(300),
            jitter_percent: 0.10,
            slash_percent: 0.5,
        }
    }
}

/// Best-effort, time-limited cross-instance mutual exclusion.
///
/// `try_acquire` returning `false` means another instance holds the lock and
/// this pass should be skipped. Implementations must expire held locks so a
/// crashed holder cannot starve the others.
#[async_trait]
pub trait ReaperLock: Send + Sync {
    async fn try_acquire(&self) -> bool;
}

/// In-process lock with expiry, for tests and single-node deployments.
pub struct LocalLock {
    ttl: Duration,
    held_until: Mutex<Option<tokio::time::Instant>>,
}

impl LocalLock {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            held_until: Mutex::new(None),
        }
    }
}

#[async_trait]
impl ReaperLock for LocalLock {
    async fn try_acquire(&self) -> bool {
        let now = tokio::time::Instant::now();
        let mut held = self.held_until.lock().await;
        match *held {
            Some(until) if until > now => false,
            _ => {
                *held = Some(now + self.ttl);
                true
            }
        }
    }
}

pub struct Reaper {
    ledger: Arc<BondingLedger>,
    config: ReaperConfig,
    lock: Option<Arc<dyn ReaperLock>>,
    last_heartbeat: Arc<RwLock<Option<DateTime<Utc>>>>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Reaper {
    pub fn new(
        ledger: Arc<BondingLedger>,
        config: ReaperConfig,
        lock: Option<Arc<dyn ReaperLock>>,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ledger,
            config,
            lock,
            last_heartbeat: Arc::new(RwLock::new(None)),
            shutdown,
            handle: Mutex::new(None),
        }
    }

    /// Spawn the scheduler loop. Idempotent only in the sense that callers
    /// are expected to start once per process.
    pub async fn start(&self) {
        if !self.config.enabled {
            info!("⏸️ Reaper disabled by configuration");
            return;
        }
        if self.lock.is_none() {
            // Without a lock capability every instance slashes independently;
            // fine for one instance, wrong for a fleet.
            warn!("Reaper running without a cross-instance lock; safe for single-instance deployments only");
        }

        info!(
            interval_secs = self.config.base_interval.as_secs(),
            jitter_percent = self.config.jitter_percent,
            slash_percent = self.config.slash_percent,
            "⏰ Reaper started"
        );

        let ledger = self.ledger.clone();
        let config = self.config.clone();
        let lock = self.lock.clone();
        let heartbeat = self.last_heartbeat.clone();
        let mut shutdown_rx = self.shutdown.subscribe();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(config.initial_delay) => {}
                _ = shutdown_rx.changed() => {
                    info!("🛑 Reaper stopped before first pass");
                    return;
                }
            }

            loop {
                execute_pass(&ledger, &config, lock.as_deref(), &heartbeat).await;

                let pause = jittered_interval(config.base_interval, config.jitter_percent);
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = shutdown_rx.changed() => {
                        info!("🛑 Reaper stopped");
                        return;
                    }
                }
            }
        });

        *self.handle.lock().await = Some(handle);
    }

    /// Signal shutdown, let an in-flight pass finish, and join the task.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        if let Some(handle) = self.handle.lock().await.take() {
            let _ = handle.await;
        }
    }

    /// Run a single pass outside the timer, e.g. from tests or an operator
    /// command.
    pub async fn run_once(&self) -> usize {
        execute_pass(
            &self.ledger,
            &self.config,
            self.lock.as_deref(),
            &self.last_heartbeat,
        )
        .await
    }

    /// Timestamp of the last completed pass, for liveness checks.
    pub async fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        *self.last_heartbeat.read().await
    }
}

async fn execute_pass(
    ledger: &BondingLedger,
    config: &ReaperConfig,
    lock: Option<&dyn ReaperLock>,
    heartbeat: &RwLock<Option<DateTime<Utc>>>,
) -> usize {
    if let Some(lock) = lock {
        if !lock.try_acquire().await {
            debug!("Another instance holds the reaper lock, skipping pass");
            return 0;
        }
    }

    match ledger.process_forfeitures(config.slash_percent).await {
        Ok(outcomes) => {
            if !outcomes.is_empty() {
                info!(processed = outcomes.len(), "💀 Reaper executed forfeitures");
                for outcome in &outcomes {
                    info!(
                        ticket_id = %outcome.ticket_id,
                        actor = %outcome.actor_id,
                        slashed = %outcome.slashed,
                        returned = %outcome.returned,
                        "Forfeited overdue ticket"
                    );
                }
            }
            *heartbeat.write().await = Some(Utc::now());
            outcomes.len()
        }
        Err(e) => {
            // A failed pass waits for the next scheduled run; no retries here.
            error!(error = %e, "Reaper pass failed");
            0
        }
    }
}

fn jittered_interval(base: Duration, jitter_percent: f64) -> Duration {
    if jitter_percent <= 0.0 {
        return base;
    }
    let jitter = rand::thread_rng().gen_range(-jitter_percent..=jitter_percent);
    let millis = base.as_millis() as f64 * (1.0 + jitter);
    Duration::from_millis(millis.max(1000.0) as u64)
}
