use chrono::{DateTime, Utc};
use merit_types::{ActorId, RepAmount, StakeId, TicketId};
use serde::{Deserialize, Serialize};

/// Per-actor REP balances, mutated only inside ledger transactions.
///
/// `committed_rep` is the portion of `staked_rep` escrowed to CLAIMED
/// tickets; `staked_rep - committed_rep` is what remains available to back a
/// new claim, so the same staked REP can never collateralize two tickets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActorLedgerState {
    pub current_rep: RepAmount,
    pub staked_rep: RepAmount,
    pub committed_rep: RepAmount,
}

impl ActorLedgerState {
    /// Liquid plus staked; conserved by every operation except minting and
    /// forfeiture.
    pub fn total(&self) -> RepAmount {
        self.current_rep.saturating_add(self.staked_rep)
    }

    /// Staked REP not yet escrowed to a claimed ticket.
    pub fn uncommitted_staked(&self) -> RepAmount {
        self.staked_rep.saturating_sub(self.committed_rep)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StakeStatus {
    Active,
    Released,
    Forfeited,
}

/// A locked portion of an actor's REP. With no ticket link it is a
/// free-floating deposit; linked, it is escrow for that ticket only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stake {
    pub id: StakeId,
    pub actor_id: ActorId,
    pub amount: RepAmount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<TicketId>,
    pub status: StakeStatus,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub released_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    Claimed,
    Completed,
    Forfeited,
    /// Reserved; no operation produces it yet.
    Cancelled,
}

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Forfeited | Self::Cancelled)
    }
}

/// A time-boxed work commitment backed by a REP bond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub work_package_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub bond_required: RepAmount,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub deadline: DateTime<Utc>,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<ActorId>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Read-only staking overview for one actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeSummary {
    pub current_rep: RepAmount,
    pub staked_rep: RepAmount,
    pub committed_rep: RepAmount,
    pub active_stakes: usize,
    pub active_tickets: usize,
}

/// Result of slashing one overdue ticket.
#[derive(Debug, Clone, PartialEq)]
pub struct ForfeitureOutcome {
    pub ticket_id: TicketId,
    pub actor_id: ActorId,
    pub original_stake: RepAmount,
    pub slashed: RepAmount,
    pub returned: RepAmount,
}
