//! The closed event union.
//!
//! Events are the sole source of truth for derived XP state. Each variant is
//! matched exhaustively in the projection reducer, so adding a type is a
//! compile-time-visible change everywhere it must be handled.

use crate::amount::RepAmount;
use crate::error::{MeritError, Result};
use crate::id::{ActorId, EventId, ProjectId, StakeId, TicketId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Work domain an actor specializes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specialty {
    Backend,
    Frontend,
    Devops,
    Security,
    Research,
}

impl Specialty {
    /// Fallback domain for contributions that do not declare one.
    pub const FALLBACK: Self = Self::Research;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backend => "BACKEND",
            Self::Frontend => "FRONTEND",
            Self::Devops => "DEVOPS",
            Self::Security => "SECURITY",
            Self::Research => "RESEARCH",
        }
    }
}

/// Role under which XP is attributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Builder,
    Architect,
    Guardian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approve,
    Reject,
}

/// Per-actor score attached to a completed project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub user_id: ActorId,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

/// Type-specific payload, tagged by the event type name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    ContributionSubmitted {
        user_id: ActorId,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        complexity_score: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        specialty: Option<Specialty>,
    },
    VerificationSubmitted {
        verifier_id: ActorId,
        target_contribution_id: EventId,
        verdict: Verdict,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality_score: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        specialty: Option<Specialty>,
    },
    ProjectCreated {
        project_id: ProjectId,
        name: String,
        domain: Specialty,
    },
    SquadAssigned {
        project_id: ProjectId,
        squad_ids: Vec<String>,
    },
    ProjectCompleted {
        project_id: ProjectId,
        evaluations: Vec<Evaluation>,
    },
    StakePlaced {
        actor_id: ActorId,
        stake_id: StakeId,
        amount: RepAmount,
        total_staked: RepAmount,
    },
    StakeReleased {
        actor_id: ActorId,
        stake_id: StakeId,
        amount: RepAmount,
    },
    TicketClaimed {
        actor_id: ActorId,
        ticket_id: TicketId,
        stake_id: StakeId,
        title: String,
        #[serde(with = "chrono::serde::ts_seconds")]
        deadline: DateTime<Utc>,
    },
    TicketCompleted {
        actor_id: ActorId,
        ticket_id: TicketId,
        bond_returned: RepAmount,
        verified_by: ActorId,
    },
    ForfeitureExecuted {
        actor_id: ActorId,
        ticket_id: TicketId,
        original_stake: RepAmount,
        slashed: RepAmount,
        returned: RepAmount,
    },
}

impl EventPayload {
    /// Stable type tag, matching the serialized `type` field.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::ContributionSubmitted { .. } => "CONTRIBUTION_SUBMITTED",
            Self::VerificationSubmitted { .. } => "VERIFICATION_SUBMITTED",
            Self::ProjectCreated { .. } => "PROJECT_CREATED",
            Self::SquadAssigned { .. } => "SQUAD_ASSIGNED",
            Self::ProjectCompleted { .. } => "PROJECT_COMPLETED",
            Self::StakePlaced { .. } => "STAKE_PLACED",
            Self::StakeReleased { .. } => "STAKE_RELEASED",
            Self::TicketClaimed { .. } => "TICKET_CLAIMED",
            Self::TicketCompleted { .. } => "TICKET_COMPLETED",
            Self::ForfeitureExecuted { .. } => "FORFEITURE_EXECUTED",
        }
    }
}

/// An immutable record in the append-only log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub stream_id: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(
        id: EventId,
        stream_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id,
            stream_id: stream_id.into(),
            timestamp,
            payload,
        }
    }

    /// Parse and validate an untrusted raw event. Structural mismatches and
    /// out-of-range fields both come back as `Validation`.
    pub fn parse(raw: serde_json::Value) -> Result<Self> {
        let event: Self = serde_json::from_value(raw)?;
        event.validate()?;
        Ok(event)
    }

    /// Semantic checks beyond what deserialization enforces.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(MeritError::Validation("event id must not be empty".into()));
        }
        if self.stream_id.is_empty() {
            return Err(MeritError::Validation(
                "event stream_id must not be empty".into(),
            ));
        }

        match &self.payload {
            EventPayload::ContributionSubmitted {
                user_id,
                url,
                complexity_score,
                ..
            } => {
                if user_id.as_str().is_empty() {
                    return Err(MeritError::Validation("user_id must not be empty".into()));
                }
                if url.is_empty() {
                    return Err(MeritError::Validation("url must not be empty".into()));
                }
                if let Some(score) = complexity_score {
                    if !(1..=10).contains(score) {
                        return Err(MeritError::Validation(format!(
                            "complexity_score {} outside 1..=10",
                            score
                        )));
                    }
                }
            }
            EventPayload::VerificationSubmitted {
                verifier_id,
                target_contribution_id,
                quality_score,
                ..
            } => {
                if verifier_id.as_str().is_empty() {
                    return Err(MeritError::Validation(
                        "verifier_id must not be empty".into(),
                    ));
                }
                if target_contribution_id.is_empty() {
                    return Err(MeritError::Validation(
                        "target_contribution_id must not be empty".into(),
                    ));
                }
                if let Some(score) = quality_score {
                    if !(1..=5).contains(score) {
                        return Err(MeritError::Validation(format!(
                            "quality_score {} outside 1..=5",
                            score
                        )));
                    }
                }
            }
            EventPayload::ProjectCreated { project_id, .. }
            | EventPayload::SquadAssigned { project_id, .. } => {
                if project_id.as_str().is_empty() {
                    return Err(MeritError::Validation(
                        "project_id must not be empty".into(),
                    ));
                }
            }
            EventPayload::ProjectCompleted { evaluations, .. } => {
                for eval in evaluations {
                    if !(0.0..=1.0).contains(&eval.score) {
                        return Err(MeritError::Validation(format!(
                            "evaluation score {} outside 0..=1",
                            eval.score
                        )));
                    }
                }
            }
            EventPayload::StakePlaced { amount, .. } => {
                if amount.is_zero() {
                    return Err(MeritError::Validation(
                        "stake amount must be positive".into(),
                    ));
                }
            }
            EventPayload::StakeReleased { .. }
            | EventPayload::TicketClaimed { .. }
            | EventPayload::TicketCompleted { .. }
            | EventPayload::ForfeitureExecuted { .. } => {}
        }

        Ok(())
    }

    pub fn type_tag(&self) -> &'static str {
        self.payload.type_tag()
    }
}

/// Sink for audit events emitted by subsystems outside the event store.
///
/// The event store implements this so the bonding ledger can record its
/// audit trail without a crate dependency cycle.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: Event) -> Result<()>;
}
