//! The bonding ledger: stake/ticket lifecycle over per-actor REP balances.
//!
//! Every operation runs as one atomic transaction against the rows it
//! touches. REP conservation holds across all of them except `credit`
//! (minting) and `process_forfeitures` (which burns exactly the slashed
//! amount and nothing else).

use crate::storage::LedgerStorage;
use crate::supply::{RepSupply, SupplyMetrics};
use crate::types::{
    ActorLedgerState, ForfeitureOutcome, Stake, StakeStatus, StakeSummary, Ticket, TicketStatus,
};
use chrono::Utc;
use merit_types::{
    ActorId, AuditSink, Event, EventId, EventPayload, MeritError, RepAmount, Result, StakeId,
    TicketId,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Smallest bond a ticket may require.
    pub min_bond: RepAmount,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_bond: RepAmount::new(1),
        }
    }
}

/// Stream id under which ledger audit events are appended.
const AUDIT_STREAM: &str = "bonding";

pub struct BondingLedger {
    storage: Arc<dyn LedgerStorage>,
    audit: Arc<dyn AuditSink>,
    supply: RepSupply,
    config: LedgerConfig,
    /// Serializes the validate-mutate-persist sequence of each operation.
    tx_lock: Mutex<()>,
    nonce: AtomicU64,
}

impl BondingLedger {
    pub fn new(
        storage: Arc<dyn LedgerStorage>,
        audit: Arc<dyn AuditSink>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            storage,
            audit,
            supply: RepSupply::new(),
            config,
            tx_lock: Mutex::new(()),
            nonce: AtomicU64::new(0),
        }
    }

    /// Mint liquid REP for an actor. The only balance inflow; everything
    /// else conserves `current + staked`.
    pub async fn credit(&self, actor_id: &ActorId, amount: RepAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let _guard = self.tx_lock.lock().await;

        let mut state = self.load_or_default(actor_id).await?;
        state.current_rep = state
            .current_rep
            .checked_add(amount)
            .ok_or_else(|| MeritError::Validation(format!("balance overflow for {}", actor_id)))?;
        self.storage.put_actor(actor_id, &state).await?;
        self.supply.mint(amount).await;

        info!(
            actor = %actor_id,
            amount = %amount,
            balance_after = %state.current_rep,
            "💰 REP credited"
        );
        Ok(())
    }

    /// Lock `amount` of the actor's liquid REP as a free-floating stake.
    pub async fn stake(&self, actor_id: &ActorId, amount: RepAmount) -> Result<Stake> {
        if amount.is_zero() {
            return Err(MeritError::Validation(
                "stake amount must be positive".into(),
            ));
        }
        let _guard = self.tx_lock.lock().await;
        self.storage.begin_transaction().await?;

        match self.stake_locked(actor_id, amount).await {
            Ok((stake, event)) => {
                self.storage.commit_transaction().await?;
                self.emit(event).await;
                Ok(stake)
            }
            Err(e) => {
                self.storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    async fn stake_locked(
        &self,
        actor_id: &ActorId,
        amount: RepAmount,
    ) -> Result<(Stake, Event)> {
        let mut state = self.load_or_default(actor_id).await?;

        if state.current_rep < amount {
            return Err(MeritError::InsufficientBalance {
                have: state.current_rep,
                need: amount,
            });
        }
        state.current_rep = state.current_rep.saturating_sub(amount);
        state.staked_rep = state.staked_rep.saturating_add(amount);

        let now = Utc::now();
        let stake = Stake {
            id: StakeId::derive(
                actor_id,
                amount.units(),
                now.timestamp(),
                self.next_nonce(),
            ),
            actor_id: actor_id.clone(),
            amount,
            ticket_id: None,
            status: StakeStatus::Active,
            created_at: now,
            released_at: None,
        };

        self.storage.put_actor(actor_id, &state).await?;
        self.storage.put_stake(&stake).await?;

        info!(
            actor = %actor_id,
            stake_id = %stake.id,
            amount = %amount,
            staked_after = %state.staked_rep,
            "🔒 REP staked"
        );

        let event = self.audit_event(
            stake.id.as_str(),
            EventPayload::StakePlaced {
                actor_id: actor_id.clone(),
                stake_id: stake.id.clone(),
                amount,
                total_staked: state.staked_rep,
            },
        );
        Ok((stake, event))
    }

    /// Return a free stake's REP to the liquid balance. A stake escrowed to
    /// a still-claimed ticket is locked until the ticket resolves.
    pub async fn release_stake(&self, actor_id: &ActorId, stake_id: &StakeId) -> Result<Stake> {
        let _guard = self.tx_lock.lock().await;
        self.storage.begin_transaction().await?;

        match self.release_stake_locked(actor_id, stake_id).await {
            Ok((stake, event)) => {
                self.storage.commit_transaction().await?;
                self.emit(event).await;
                Ok(stake)
            }
            Err(e) => {
                self.storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    async fn release_stake_locked(
        &self,
        actor_id: &ActorId,
        stake_id: &StakeId,
    ) -> Result<(Stake, Event)> {
        let mut stake = self
            .storage
            .get_stake(stake_id)
            .await?
            .filter(|s| &s.actor_id == actor_id)
            .ok_or_else(|| MeritError::NotFound(format!("stake {}", stake_id)))?;

        if stake.status != StakeStatus::Active {
            return Err(MeritError::InvalidTransition(format!(
                "stake {} is {:?}, not ACTIVE",
                stake_id, stake.status
            )));
        }
        if let Some(ticket_id) = &stake.ticket_id {
            if let Some(ticket) = self.storage.get_ticket(ticket_id).await? {
                if ticket.status == TicketStatus::Claimed {
                    return Err(MeritError::StakeLocked(stake_id.clone()));
                }
            }
        }

        let mut state = self.load_or_default(actor_id).await?;
        state.staked_rep = state.staked_rep.saturating_sub(stake.amount);
        state.current_rep = state.current_rep.saturating_add(stake.amount);

        stake.status = StakeStatus::Released;
        stake.released_at = Some(Utc::now());

        self.storage.put_actor(actor_id, &state).await?;
        self.storage.put_stake(&stake).await?;

        info!(
            actor = %actor_id,
            stake_id = %stake_id,
            amount = %stake.amount,
            "🔓 Stake released"
        );

        let event = self.audit_event(
            stake_id.as_str(),
            EventPayload::StakeReleased {
                actor_id: actor_id.clone(),
                stake_id: stake_id.clone(),
                amount: stake.amount,
            },
        );
        Ok((stake, event))
    }

    /// Create an OPEN ticket. No ledger effect until it is claimed.
    pub async fn create_ticket(
        &self,
        work_package_id: impl Into<String>,
        title: impl Into<String>,
        description: Option<String>,
        bond_required: RepAmount,
        deadline: chrono::DateTime<Utc>,
    ) -> Result<Ticket> {
        if bond_required.is_zero() {
            return Err(MeritError::Validation(
                "bond_required must be positive".into(),
            ));
        }
        if bond_required < self.config.min_bond {
            return Err(MeritError::Validation(format!(
                "bond {} below minimum {}",
                bond_required, self.config.min_bond
            )));
        }

        let work_package_id = work_package_id.into();
        let now = Utc::now();
        let ticket = Ticket {
            id: TicketId::derive(&work_package_id, now.timestamp(), self.next_nonce()),
            work_package_id,
            title: title.into(),
            description,
            bond_required,
            deadline,
            status: TicketStatus::Open,
            claimed_by: None,
            created_at: now,
            claimed_at: None,
            completed_at: None,
        };
        self.storage.put_ticket(&ticket).await?;

        info!(
            ticket_id = %ticket.id,
            bond = %bond_required,
            deadline = %deadline,
            "🎫 Ticket created"
        );
        Ok(ticket)
    }

    /// Claim an OPEN ticket by escrowing `bond_required` out of the actor's
    /// uncommitted staked REP.
    pub async fn claim_ticket(&self, actor_id: &ActorId, ticket_id: &TicketId) -> Result<Ticket> {
        let _guard = self.tx_lock.lock().await;
        self.storage.begin_transaction().await?;

        match self.claim_ticket_locked(actor_id, ticket_id).await {
            Ok((ticket, event)) => {
                self.storage.commit_transaction().await?;
                self.emit(event).await;
                Ok(ticket)
            }
            Err(e) => {
                self.storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    async fn claim_ticket_locked(
        &self,
        actor_id: &ActorId,
        ticket_id: &TicketId,
    ) -> Result<(Ticket, Event)> {
        let mut ticket = self
            .storage
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| MeritError::NotFound(format!("ticket {}", ticket_id)))?;

        if ticket.status != TicketStatus::Open {
            return Err(MeritError::InvalidTransition(format!(
                "ticket {} is {:?}, not available",
                ticket_id, ticket.status
            )));
        }

        let mut state = self.load_or_default(actor_id).await?;
        // The aggregate staked balance is not enough: only staked REP that
        // is not already escrowed to another claim may back this one.
        let available = state.uncommitted_staked();
        if available < ticket.bond_required {
            return Err(MeritError::InsufficientStakedBalance {
                available,
                need: ticket.bond_required,
            });
        }
        state.committed_rep = state.committed_rep.saturating_add(ticket.bond_required);

        let now = Utc::now();
        let stake = Stake {
            id: StakeId::derive(
                actor_id,
                ticket.bond_required.units(),
                now.timestamp(),
                self.next_nonce(),
            ),
            actor_id: actor_id.clone(),
            amount: ticket.bond_required,
            ticket_id: Some(ticket_id.clone()),
            status: StakeStatus::Active,
            created_at: now,
            released_at: None,
        };

        ticket.status = TicketStatus::Claimed;
        ticket.claimed_by = Some(actor_id.clone());
        ticket.claimed_at = Some(now);

        self.storage.put_actor(actor_id, &state).await?;
        self.storage.put_stake(&stake).await?;
        self.storage.put_ticket(&ticket).await?;

        info!(
            actor = %actor_id,
            ticket_id = %ticket_id,
            stake_id = %stake.id,
            bond = %ticket.bond_required,
            committed_after = %state.committed_rep,
            "🤝 Ticket claimed"
        );

        let event = self.audit_event(
            ticket_id.as_str(),
            EventPayload::TicketClaimed {
                actor_id: actor_id.clone(),
                ticket_id: ticket_id.clone(),
                stake_id: stake.id.clone(),
                title: ticket.title.clone(),
                deadline: ticket.deadline,
            },
        );
        Ok((ticket, event))
    }

    /// Complete a CLAIMED ticket: the escrowed bond returns to the
    /// claimant's liquid balance.
    pub async fn complete_ticket(
        &self,
        ticket_id: &TicketId,
        verifier_id: &ActorId,
    ) -> Result<Ticket> {
        let _guard = self.tx_lock.lock().await;
        self.storage.begin_transaction().await?;

        match self.complete_ticket_locked(ticket_id, verifier_id).await {
            Ok((ticket, event)) => {
                self.storage.commit_transaction().await?;
                self.emit(event).await;
                Ok(ticket)
            }
            Err(e) => {
                self.storage.rollback_transaction().await?;
                Err(e)
            }
        }
    }

    async fn complete_ticket_locked(
        &self,
        ticket_id: &TicketId,
        verifier_id: &ActorId,
    ) -> Result<(Ticket, Event)> {
        let mut ticket = self
            .storage
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| MeritError::NotFound(format!("ticket {}", ticket_id)))?;

        if ticket.status != TicketStatus::Claimed {
            return Err(MeritError::InvalidTransition(format!(
                "ticket {} is {:?}, cannot complete",
                ticket_id, ticket.status
            )));
        }
        let claimant = ticket.claimed_by.clone().ok_or_else(|| {
            MeritError::InvalidTransition(format!("ticket {} has no claimant", ticket_id))
        })?;
        let mut stake = self
            .storage
            .stake_for_ticket(ticket_id)
            .await?
            .filter(|s| s.status == StakeStatus::Active)
            .ok_or_else(|| {
                MeritError::InvalidTransition(format!(
                    "ticket {} has no active escrowed stake",
                    ticket_id
                ))
            })?;

        let mut state = self.load_or_default(&claimant).await?;
        state.staked_rep = state.staked_rep.saturating_sub(stake.amount);
        state.committed_rep = state.committed_rep.saturating_sub(stake.amount);
        state.current_rep = state.current_rep.saturating_add(stake.amount);

        let now = Utc::now();
        stake.status = StakeStatus::Released;
        stake.released_at = Some(now);
        ticket.status = TicketStatus::Completed;
        ticket.completed_at = Some(now);

        self.storage.put_actor(&claimant, &state).await?;
        self.storage.put_stake(&stake).await?;
        self.storage.put_ticket(&ticket).await?;

        info!(
            actor = %claimant,
            ticket_id = %ticket_id,
            bond_returned = %stake.amount,
            verified_by = %verifier_id,
            "✅ Ticket completed"
        );

        let event = self.audit_event(
            ticket_id.as_str(),
            EventPayload::TicketCompleted {
                actor_id: claimant,
                ticket_id: ticket_id.clone(),
                bond_returned: stake.amount,
                verified_by: verifier_id.clone(),
            },
        );
        Ok((ticket, event))
    }

    /// Slash every CLAIMED ticket whose deadline has passed.
    ///
    /// For each overdue ticket: `slashed = floor(bond * slash_percent)` is
    /// burned, the remainder returns to the claimant. One ticket failing
    /// does not stop the rest.
    pub async fn process_forfeitures(
        &self,
        slash_percent: f64,
    ) -> Result<Vec<ForfeitureOutcome>> {
        if !(0.0..=1.0).contains(&slash_percent) {
            return Err(MeritError::Validation(format!(
                "slash_percent {} outside 0..=1",
                slash_percent
            )));
        }

        let now = Utc::now();
        let overdue = self.storage.claimed_tickets_due_before(now).await?;
        let mut outcomes = Vec::new();

        for ticket in overdue {
            let _guard = self.tx_lock.lock().await;
            self.storage.begin_transaction().await?;

            match self.forfeit_one_locked(&ticket.id, slash_percent).await {
                Ok(Some((outcome, event))) => {
                    self.storage.commit_transaction().await?;
                    self.emit(event).await;
                    outcomes.push(outcome);
                }
                // Raced with a completion between scan and transaction.
                Ok(None) => {
                    self.storage.rollback_transaction().await?;
                }
                Err(e) => {
                    self.storage.rollback_transaction().await?;
                    error!(ticket_id = %ticket.id, error = %e, "Forfeiture failed");
                }
            }
        }

        Ok(outcomes)
    }

    async fn forfeit_one_locked(
        &self,
        ticket_id: &TicketId,
        slash_percent: f64,
    ) -> Result<Option<(ForfeitureOutcome, Event)>> {
        let mut ticket = self
            .storage
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| MeritError::NotFound(format!("ticket {}", ticket_id)))?;

        // Re-check under the transaction: the per-ticket state transition is
        // the actual safety net against double forfeiture.
        if ticket.status != TicketStatus::Claimed {
            return Ok(None);
        }
        let claimant = ticket.claimed_by.clone().ok_or_else(|| {
            MeritError::InvalidTransition(format!("ticket {} has no claimant", ticket_id))
        })?;
        let mut stake = self
            .storage
            .stake_for_ticket(ticket_id)
            .await?
            .filter(|s| s.status == StakeStatus::Active)
            .ok_or_else(|| {
                MeritError::InvalidTransition(format!(
                    "ticket {} has no active escrowed stake",
                    ticket_id
                ))
            })?;

        let bond = stake.amount;
        let slashed = bond.slash_portion(slash_percent);
        let returned = bond.saturating_sub(slashed);

        let mut state = self.load_or_default(&claimant).await?;
        state.staked_rep = state.staked_rep.saturating_sub(bond);
        state.committed_rep = state.committed_rep.saturating_sub(bond);
        state.current_rep = state.current_rep.saturating_add(returned);

        let now = Utc::now();
        stake.status = StakeStatus::Forfeited;
        stake.released_at = Some(now);
        ticket.status = TicketStatus::Forfeited;
        ticket.completed_at = Some(now);

        self.storage.put_actor(&claimant, &state).await?;
        self.storage.put_stake(&stake).await?;
        self.storage.put_ticket(&ticket).await?;
        // The slashed portion leaves the system for good.
        self.supply.burn(slashed).await;

        warn!(
            actor = %claimant,
            ticket_id = %ticket_id,
            bond = %bond,
            slashed = %slashed,
            returned = %returned,
            "💀 Forfeiture executed"
        );

        let outcome = ForfeitureOutcome {
            ticket_id: ticket_id.clone(),
            actor_id: claimant.clone(),
            original_stake: bond,
            slashed,
            returned,
        };
        let event = self.audit_event(
            ticket_id.as_str(),
            EventPayload::ForfeitureExecuted {
                actor_id: claimant,
                ticket_id: ticket_id.clone(),
                original_stake: bond,
                slashed,
                returned,
            },
        );
        Ok(Some((outcome, event)))
    }

    pub async fn get_actor_state(&self, actor_id: &ActorId) -> Result<ActorLedgerState> {
        Ok(self.load_or_default(actor_id).await?)
    }

    pub async fn get_stake_summary(&self, actor_id: &ActorId) -> Result<StakeSummary> {
        let state = self.load_or_default(actor_id).await?;
        let stakes = self.storage.stakes_by_actor(actor_id).await?;
        let tickets = self.storage.claimed_tickets_by_actor(actor_id).await?;

        Ok(StakeSummary {
            current_rep: state.current_rep,
            staked_rep: state.staked_rep,
            committed_rep: state.committed_rep,
            active_stakes: stakes
                .iter()
                .filter(|s| s.status == StakeStatus::Active)
                .count(),
            active_tickets: tickets.len(),
        })
    }

    pub async fn list_open_tickets(&self, limit: usize) -> Result<Vec<Ticket>> {
        self.storage.open_tickets(limit).await
    }

    pub async fn get_ticket(&self, ticket_id: &TicketId) -> Result<Ticket> {
        self.storage
            .get_ticket(ticket_id)
            .await?
            .ok_or_else(|| MeritError::NotFound(format!("ticket {}", ticket_id)))
    }

    pub async fn supply_metrics(&self) -> SupplyMetrics {
        self.supply.metrics().await
    }

    async fn load_or_default(&self, actor_id: &ActorId) -> Result<ActorLedgerState> {
        Ok(self
            .storage
            .get_actor(actor_id)
            .await?
            .unwrap_or_default())
    }

    fn next_nonce(&self) -> u64 {
        self.nonce.fetch_add(1, Ordering::Relaxed)
    }

    fn audit_event(&self, subject: &str, payload: EventPayload) -> Event {
        let now = Utc::now();
        Event::new(
            EventId::derive(payload.type_tag(), subject, now.timestamp(), self.next_nonce()),
            AUDIT_STREAM,
            now,
            payload,
        )
    }

    /// Audit failures never unwind a committed ledger transaction; the
    /// ledger rows are authoritative, the event trail is advisory.
    async fn emit(&self, event: Event) {
        if let Err(e) = self.audit.record(event).await {
            warn!(error = %e, "Failed to record ledger audit event");
        }
    }
}
