use crate::types::{ActorLedgerState, Stake, Ticket, TicketStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use merit_types::{ActorId, Result, StakeId, TicketId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

type ActorMap = HashMap<ActorId, ActorLedgerState>;
type StakeMap = HashMap<StakeId, Stake>;
type TicketMap = HashMap<TicketId, Ticket>;
type TransactionBackup = Option<(ActorMap, StakeMap, TicketMap)>;

/// Transactional storage for actor, stake, and ticket rows. The ledger
/// depends only on these operations being atomic and durable.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    async fn get_actor(&self, actor: &ActorId) -> Result<Option<ActorLedgerState>>;
    async fn put_actor(&self, actor: &ActorId, state: &ActorLedgerState) -> Result<()>;
    async fn all_actors(&self) -> Result<Vec<(ActorId, ActorLedgerState)>>;

    async fn get_stake(&self, id: &StakeId) -> Result<Option<Stake>>;
    async fn put_stake(&self, stake: &Stake) -> Result<()>;
    async fn stakes_by_actor(&self, actor: &ActorId) -> Result<Vec<Stake>>;
    /// The stake escrowed to a ticket, if any.
    async fn stake_for_ticket(&self, ticket: &TicketId) -> Result<Option<Stake>>;

    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>>;
    async fn put_ticket(&self, ticket: &Ticket) -> Result<()>;
    /// OPEN tickets ordered by deadline ascending.
    async fn open_tickets(&self, limit: usize) -> Result<Vec<Ticket>>;
    /// CLAIMED tickets whose deadline passed before `cutoff`.
    async fn claimed_tickets_due_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Ticket>>;
    async fn claimed_tickets_by_actor(&self, actor: &ActorId) -> Result<Vec<Ticket>>;

    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;
}

/// In-memory reference backend. Transactions snapshot the three row maps on
/// begin and restore them on rollback.
pub struct MemoryLedgerStorage {
    actors: Arc<RwLock<ActorMap>>,
    stakes: Arc<RwLock<StakeMap>>,
    tickets: Arc<RwLock<TicketMap>>,
    backup: Arc<RwLock<TransactionBackup>>,
}

impl MemoryLedgerStorage {
    pub fn new() -> Self {
        Self {
            actors: Arc::new(RwLock::new(HashMap::new())),
            stakes: Arc::new(RwLock::new(HashMap::new())),
            tickets: Arc::new(RwLock::new(HashMap::new())),
            backup: Arc::new(RwLock::new(None)),
        }
    }
}

impl Default for MemoryLedgerStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStorage for MemoryLedgerStorage {
    async fn get_actor(&self, actor: &ActorId) -> Result<Option<ActorLedgerState>> {
        let actors = self.actors.read().await;
        Ok(actors.get(actor).cloned())
    }

    async fn put_actor(&self, actor: &ActorId, state: &ActorLedgerState) -> Result<()> {
        let mut actors = self.actors.write().await;
        actors.insert(actor.clone(), state.clone());
        Ok(())
    }

    async fn all_actors(&self) -> Result<Vec<(ActorId, ActorLedgerState)>> {
        let actors = self.actors.read().await;
        Ok(actors
            .iter()
            .map(|(id, state)| (id.clone(), state.clone()))
            .collect())
    }

    async fn get_stake(&self, id: &StakeId) -> Result<Option<Stake>> {
        let stakes = self.stakes.read().await;
        Ok(stakes.get(id).cloned())
    }

    async fn put_stake(&self, stake: &Stake) -> Result<()> {
        let mut stakes = self.stakes.write().await;
        stakes.insert(stake.id.clone(), stake.clone());
        Ok(())
    }

    async fn stakes_by_actor(&self, actor: &ActorId) -> Result<Vec<Stake>> {
        let stakes = self.stakes.read().await;
        let mut owned: Vec<Stake> = stakes
            .values()
            .filter(|s| &s.actor_id == actor)
            .cloned()
            .collect();
        owned.sort_by_key(|s| s.created_at);
        Ok(owned)
    }

    async fn stake_for_ticket(&self, ticket: &TicketId) -> Result<Option<Stake>> {
        let stakes = self.stakes.read().await;
        Ok(stakes
            .values()
            .find(|s| s.ticket_id.as_ref() == Some(ticket))
            .cloned())
    }

    async fn get_ticket(&self, id: &TicketId) -> Result<Option<Ticket>> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(id).cloned())
    }

    async fn put_ticket(&self, ticket: &Ticket) -> Result<()> {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id.clone(), ticket.clone());
        Ok(())
    }

    async fn open_tickets(&self, limit: usize) -> Result<Vec<Ticket>> {
        let tickets = self.tickets.read().await;
        let mut open: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.status == TicketStatus::Open)
            .cloned()
            .collect();
        open.sort_by_key(|t| t.deadline);
        open.truncate(limit);
        Ok(open)
    }

    async fn claimed_tickets_due_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Ticket>> {
        let tickets = self.tickets.read().await;
        let mut due: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.status == TicketStatus::Claimed && t.deadline < cutoff)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.deadline);
        Ok(due)
    }

    async fn claimed_tickets_by_actor(&self, actor: &ActorId) -> Result<Vec<Ticket>> {
        let tickets = self.tickets.read().await;
        Ok(tickets
            .values()
            .filter(|t| t.status == TicketStatus::Claimed && t.claimed_by.as_ref() == Some(actor))
            .cloned()
            .collect())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let actors = self.actors.read().await;
        let stakes = self.stakes.read().await;
        let tickets = self.tickets.read().await;

        let mut backup = self.backup.write().await;
        *backup = Some((actors.clone(), stakes.clone(), tickets.clone()));
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut backup = self.backup.write().await;
        *backup = None;
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut backup = self.backup.write().await;
        if let Some((actors_backup, stakes_backup, tickets_backup)) = backup.take() {
            let mut actors = self.actors.write().await;
            let mut stakes = self.stakes.write().await;
            let mut tickets = self.tickets.write().await;
            *actors = actors_backup;
            *stakes = stakes_backup;
            *tickets = tickets_backup;

            info!(storage_type = "memory", "❌ Ledger transaction rolled back");
        }
        Ok(())
    }
}
