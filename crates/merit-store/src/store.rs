//! The event store: owns the log, serializes writes, and keeps a live
//! materialized view of per-actor XP state.

use crate::storage::EventStorage;
use async_trait::async_trait;
use chrono::Utc;
use merit_projection::{Projector, XpVector};
use merit_types::{ActorId, AuditSink, Event, EventId, EventPayload, MeritError, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    /// Number of events retained in the in-memory log. Older events are
    /// dropped from memory only; durable storage keeps the full history.
    pub retention: usize,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self { retention: 1000 }
    }
}

#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub actor_id: ActorId,
    pub vector: XpVector,
}

struct StoreInner {
    log: VecDeque<Event>,
    projector: Projector,
    materialized: HashMap<ActorId, XpVector>,
    seen_ids: HashSet<EventId>,
    appended: u64,
}

/// Append-only event store with a single logical writer.
///
/// Concurrent `append` calls queue on the writer mutex and are applied
/// strictly in arrival order; reads observe the snapshot produced by the
/// most recently completed append.
pub struct EventStore {
    storage: Arc<dyn EventStorage>,
    config: EventStoreConfig,
    write_lock: Mutex<()>,
    inner: RwLock<StoreInner>,
}

impl EventStore {
    pub fn new(storage: Arc<dyn EventStorage>, config: EventStoreConfig) -> Self {
        Self {
            storage,
            config,
            write_lock: Mutex::new(()),
            inner: RwLock::new(StoreInner {
                log: VecDeque::new(),
                projector: Projector::new(),
                materialized: HashMap::new(),
                seen_ids: HashSet::new(),
                appended: 0,
            }),
        }
    }

    /// Load durable history and rebuild derived state. Must run before the
    /// first append; replayed events are authoritative, snapshots fill in
    /// actors whose events predate the durable log.
    pub async fn hydrate(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        {
            let inner = self.inner.read().await;
            if inner.appended > 0 {
                return Err(MeritError::InvalidTransition(
                    "hydrate must run before the store accepts appends".into(),
                ));
            }
        }

        let events = self.storage.load_events().await?;
        let snapshots = self.storage.load_actor_snapshots().await?;

        let mut projector = Projector::new();
        for event in &events {
            projector.apply(event);
        }
        let mut seeded = 0usize;
        for (actor, vector) in snapshots {
            if !projector.contains_actor(&actor) {
                projector.seed_vector(actor, vector);
                seeded += 1;
            }
        }

        let mut inner = self.inner.write().await;
        inner.seen_ids = events.iter().map(|e| e.id.clone()).collect();
        inner.materialized = projector.snapshot(Utc::now());
        inner.projector = projector;
        let skip = events.len().saturating_sub(self.config.retention);
        inner.log = events.into_iter().skip(skip).collect();

        info!(
            events = inner.seen_ids.len(),
            retained = inner.log.len(),
            actors = inner.materialized.len(),
            seeded_from_snapshots = seeded,
            "✅ Event store hydrated"
        );
        Ok(())
    }

    /// Validate and append an untrusted raw event.
    ///
    /// On validation failure the store is untouched; on success the event is
    /// durable and the materialized state reflects it before this returns.
    pub async fn append(&self, raw: serde_json::Value) -> Result<EventId> {
        let _guard = self.write_lock.lock().await;
        let event = Event::parse(raw)?;
        self.append_locked(event).await
    }

    /// Typed append for trusted internal producers (the ledger audit trail).
    /// Goes through the same writer lock and duplicate check as `append`.
    pub async fn append_event(&self, event: Event) -> Result<EventId> {
        let _guard = self.write_lock.lock().await;
        event.validate()?;
        self.append_locked(event).await
    }

    async fn append_locked(&self, event: Event) -> Result<EventId> {
        {
            let inner = self.inner.read().await;
            if inner.seen_ids.contains(&event.id) {
                return Err(MeritError::Validation(format!(
                    "duplicate event id: {}",
                    event.id
                )));
            }
        }

        // Durable first: a persistence failure leaves memory untouched.
        self.storage.put_event(&event).await?;

        let event_id = event.id.clone();
        let touched = touched_actors(&event.payload);

        let mut inner = self.inner.write().await;
        inner.projector.apply(&event);
        inner.seen_ids.insert(event.id.clone());
        inner.log.push_back(event.clone());
        while inner.log.len() > self.config.retention {
            inner.log.pop_front();
            debug!(retention = self.config.retention, "Compacted in-memory log");
        }
        let materialized = inner.projector.snapshot(Utc::now());
        inner.materialized = materialized;
        inner.appended += 1;

        // Write-through snapshots for the actors this event names. Failures
        // are logged, not fatal: the durable event log already holds the
        // truth and hydration replays it.
        for actor in &touched {
            if let Some(vector) = inner.materialized.get(actor) {
                if let Err(e) = self.storage.put_actor_snapshot(actor, vector).await {
                    warn!(actor = %actor, error = %e, "Failed to write actor snapshot");
                }
            }
        }

        info!(
            event_id = %event_id,
            event_type = event.type_tag(),
            log_len = inner.log.len(),
            "📦 Event appended"
        );
        Ok(event_id)
    }

    /// Materialized state as of the most recently completed append.
    pub async fn get_state(&self) -> HashMap<ActorId, XpVector> {
        self.inner.read().await.materialized.clone()
    }

    pub async fn get_actor(&self, actor: &ActorId) -> Option<XpVector> {
        self.inner.read().await.materialized.get(actor).cloned()
    }

    /// Actors sorted by confirmed XP descending; equal totals order by actor
    /// id ascending so pagination is stable.
    pub async fn get_leaderboard(&self, offset: usize, limit: usize) -> Vec<LeaderboardEntry> {
        let inner = self.inner.read().await;
        let mut entries: Vec<LeaderboardEntry> = inner
            .materialized
            .iter()
            .map(|(actor_id, vector)| LeaderboardEntry {
                actor_id: actor_id.clone(),
                vector: vector.clone(),
            })
            .collect();

        entries.sort_by(|a, b| {
            b.vector
                .total_xp
                .cmp(&a.vector.total_xp)
                .then_with(|| a.actor_id.cmp(&b.actor_id))
        });

        entries.into_iter().skip(offset).take(limit).collect()
    }

    pub async fn user_count(&self) -> usize {
        self.inner.read().await.materialized.len()
    }

    /// Number of events currently retained in memory.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.log.len()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.inner.read().await.log.iter().cloned().collect()
    }
}

#[async_trait]
impl AuditSink for EventStore {
    async fn record(&self, event: Event) -> Result<()> {
        self.append_event(event).await.map(|_| ())
    }
}

fn touched_actors(payload: &EventPayload) -> Vec<ActorId> {
    match payload {
        EventPayload::ContributionSubmitted { user_id, .. } => vec![user_id.clone()],
        EventPayload::VerificationSubmitted { verifier_id, .. } => vec![verifier_id.clone()],
        EventPayload::ProjectCompleted { evaluations, .. } => {
            evaluations.iter().map(|e| e.user_id.clone()).collect()
        }
        EventPayload::StakePlaced { actor_id, .. }
        | EventPayload::StakeReleased { actor_id, .. }
        | EventPayload::TicketClaimed { actor_id, .. }
        | EventPayload::TicketCompleted { actor_id, .. }
        | EventPayload::ForfeitureExecuted { actor_id, .. } => vec![actor_id.clone()],
        EventPayload::ProjectCreated { .. } | EventPayload::SquadAssigned { .. } => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryEventStorage;
    use serde_json::json;

    fn contribution_raw(id: &str, user: &str, complexity: u32) -> serde_json::Value {
        json!({
            "id": id,
            "stream_id": "actions",
            "timestamp": 1_700_000_000,
            "type": "CONTRIBUTION_SUBMITTED",
            "payload": {
                "user_id": user,
                "url": "https://example.com/pr/1",
                "complexity_score": complexity,
            },
        })
    }

    fn approval_raw(id: &str, verifier: &str, target: &str) -> serde_json::Value {
        json!({
            "id": id,
            "stream_id": "actions",
            "timestamp": 1_700_000_100,
            "type": "VERIFICATION_SUBMITTED",
            "payload": {
                "verifier_id": verifier,
                "target_contribution_id": target,
                "verdict": "APPROVE",
            },
        })
    }

    fn new_store(retention: usize) -> EventStore {
        EventStore::new(
            Arc::new(MemoryEventStorage::new()),
            EventStoreConfig { retention },
        )
    }

    #[tokio::test]
    async fn test_append_updates_materialized_state() {
        let store = new_store(1000);
        store
            .append(contribution_raw("c1", "alice", 5))
            .await
            .unwrap();

        let alice = store.get_actor(&ActorId::new("alice")).await.unwrap();
        assert_eq!(alice.pending_xp, 15);
    }

    #[tokio::test]
    async fn test_invalid_event_leaves_store_untouched() {
        let store = new_store(1000);
        let result = store
            .append(json!({
                "id": "bad",
                "stream_id": "actions",
                "timestamp": 1_700_000_000,
                "type": "NOT_A_REAL_TYPE",
                "payload": {},
            }))
            .await;

        assert!(matches!(result, Err(MeritError::Validation(_))));
        assert_eq!(store.event_count().await, 0);
        assert_eq!(store.user_count().await, 0);
    }

    #[tokio::test]
    async fn test_duplicate_event_id_rejected() {
        let store = new_store(1000);
        store
            .append(contribution_raw("c1", "alice", 1))
            .await
            .unwrap();
        let result = store.append(contribution_raw("c1", "alice", 1)).await;

        assert!(matches!(result, Err(MeritError::Validation(_))));
        assert_eq!(store.event_count().await, 1);
    }

    #[tokio::test]
    async fn test_compaction_preserves_state() {
        let store = new_store(3);

        for i in 0..10 {
            store
                .append(contribution_raw(&format!("c{}", i), "alice", 1))
                .await
                .unwrap();
        }

        assert_eq!(store.event_count().await, 3);
        // 10 contributions at 11 XP each, all still pending.
        let alice = store.get_actor(&ActorId::new("alice")).await.unwrap();
        assert_eq!(alice.pending_xp, 110);
    }

    #[tokio::test]
    async fn test_hydration_restores_from_durable_storage() {
        let storage = Arc::new(MemoryEventStorage::new());

        {
            let store = EventStore::new(storage.clone(), EventStoreConfig::default());
            store
                .append(contribution_raw("c1", "alice", 5))
                .await
                .unwrap();
            store.append(approval_raw("v1", "bob", "c1")).await.unwrap();
        }

        // Fresh instance over the same durable storage, as after a restart.
        let store = EventStore::new(storage, EventStoreConfig::default());
        store.hydrate().await.unwrap();

        let alice = store.get_actor(&ActorId::new("alice")).await.unwrap();
        assert_eq!(alice.total_xp, 15);
        assert_eq!(alice.pending_xp, 0);

        // Duplicate detection survives hydration.
        let result = store.append(contribution_raw("c1", "alice", 5)).await;
        assert!(matches!(result, Err(MeritError::Validation(_))));
    }

    #[tokio::test]
    async fn test_hydrate_after_append_rejected() {
        let store = new_store(1000);
        store
            .append(contribution_raw("c1", "alice", 1))
            .await
            .unwrap();

        assert!(matches!(
            store.hydrate().await,
            Err(MeritError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_leaderboard_sort_and_tiebreak() {
        let store = new_store(1000);

        // bob ends with 20 confirmed XP, alice and carol tie at 11.
        for (contribution_id, user, complexity) in
            [("c1", "bob", 10), ("c2", "alice", 1), ("c3", "carol", 1)]
        {
            store
                .append(contribution_raw(contribution_id, user, complexity))
                .await
                .unwrap();
        }
        for (verification_id, target) in [("v1", "c1"), ("v2", "c2"), ("v3", "c3")] {
            store
                .append(approval_raw(verification_id, "dave", target))
                .await
                .unwrap();
        }

        let board = store.get_leaderboard(0, 10).await;
        let order: Vec<&str> = board.iter().map(|e| e.actor_id.as_str()).collect();
        assert_eq!(order, vec!["bob", "alice", "carol", "dave"]);

        let page = store.get_leaderboard(1, 2).await;
        let order: Vec<&str> = page.iter().map(|e| e.actor_id.as_str()).collect();
        assert_eq!(order, vec!["alice", "carol"]);
    }

    #[tokio::test]
    async fn test_concurrent_appends_serialize() {
        let store = Arc::new(new_store(1000));

        let mut handles = vec![];
        for i in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append(contribution_raw(&format!("c{}", i), "alice", 1))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.event_count().await, 20);
        let alice = store.get_actor(&ActorId::new("alice")).await.unwrap();
        assert_eq!(alice.pending_xp, 20 * 11);
    }
}
