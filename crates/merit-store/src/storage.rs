use async_trait::async_trait;
use merit_projection::XpVector;
use merit_types::{ActorId, Event, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Durable storage for the append-only event table and per-actor XP
/// snapshots. The store depends only on these operations being atomic and
/// durable, not on any particular engine.
#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Append one event to the durable table.
    async fn put_event(&self, event: &Event) -> Result<()>;

    /// Load every durable event, ascending by timestamp (stable for ties).
    async fn load_events(&self) -> Result<Vec<Event>>;

    /// Upsert the write-through snapshot for one actor.
    async fn put_actor_snapshot(&self, actor: &ActorId, vector: &XpVector) -> Result<()>;

    /// Load all actor snapshots.
    async fn load_actor_snapshots(&self) -> Result<HashMap<ActorId, XpVector>>;
}

/// In-memory reference backend for testing and development.
pub struct MemoryEventStorage {
    events: Arc<RwLock<Vec<Event>>>,
    snapshots: Arc<RwLock<HashMap<ActorId, XpVector>>>,
}

impl MemoryEventStorage {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

impl Default for MemoryEventStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStorage for MemoryEventStorage {
    async fn put_event(&self, event: &Event) -> Result<()> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(())
    }

    async fn load_events(&self) -> Result<Vec<Event>> {
        let events = self.events.read().await;
        let mut ordered = events.clone();
        // Stable sort keeps arrival order for equal timestamps.
        ordered.sort_by_key(|e| e.timestamp);
        Ok(ordered)
    }

    async fn put_actor_snapshot(&self, actor: &ActorId, vector: &XpVector) -> Result<()> {
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(actor.clone(), vector.clone());
        Ok(())
    }

    async fn load_actor_snapshots(&self) -> Result<HashMap<ActorId, XpVector>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use merit_types::{EventId, EventPayload};

    fn event(id: &str, secs: i64) -> Event {
        Event::new(
            EventId::new(id),
            "actions",
            Utc.timestamp_opt(secs, 0).unwrap(),
            EventPayload::ContributionSubmitted {
                user_id: ActorId::new("alice"),
                url: "https://example.com/pr/1".into(),
                complexity_score: None,
                specialty: None,
            },
        )
    }

    #[tokio::test]
    async fn test_events_load_in_timestamp_order() {
        let storage = MemoryEventStorage::new();
        storage.put_event(&event("later", 200)).await.unwrap();
        storage.put_event(&event("earlier", 100)).await.unwrap();

        let loaded = storage.load_events().await.unwrap();
        assert_eq!(loaded[0].id, EventId::new("earlier"));
        assert_eq!(loaded[1].id, EventId::new("later"));
    }

    #[tokio::test]
    async fn test_snapshot_upsert() {
        let storage = MemoryEventStorage::new();
        let actor = ActorId::new("alice");

        let mut vector = XpVector::default();
        vector.total_xp = 10;
        storage.put_actor_snapshot(&actor, &vector).await.unwrap();

        vector.total_xp = 25;
        storage.put_actor_snapshot(&actor, &vector).await.unwrap();

        let snapshots = storage.load_actor_snapshots().await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[&actor].total_xp, 25);
    }
}
