//! Replay reducer: folds the ordered event log into per-actor XP vectors.
//!
//! The reducer state carries forward across appends, so compacting the
//! in-memory log never loses derived state; `project` remains the pure
//! reference semantics (fold everything, then snapshot).

use crate::vector::XpVector;
use chrono::{DateTime, Utc};
use merit_types::{ActorId, Event, EventId, EventPayload, ProjectId, Role, Specialty, Verdict};
use std::collections::HashMap;

/// XP granted for a contribution before its complexity bonus.
const BASE_CONTRIBUTION_XP: u64 = 10;
/// Fixed reward for the first approving verifier of a contribution.
const VERIFIER_REWARD_XP: u64 = 2;
/// Monthly decay multiplier applied to confirmed XP after the grace period.
const DECAY_FACTOR: f64 = 0.95;
/// Days of inactivity tolerated before decay months start accruing.
const GRACE_PERIOD_DAYS: f64 = 30.0;
const DAYS_PER_MONTH: f64 = 30.0;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone)]
struct ContributionRecord {
    user_id: ActorId,
    xp_value: u64,
    approved: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct RunningAverage {
    total: f64,
    count: u64,
}

/// Incremental reducer over the event log.
///
/// Applying events one at a time through `apply` yields exactly the same
/// snapshot as replaying the full sequence from scratch.
#[derive(Debug, Clone, Default)]
pub struct Projector {
    vectors: HashMap<ActorId, XpVector>,
    contributions: HashMap<EventId, ContributionRecord>,
    project_domains: HashMap<ProjectId, Specialty>,
    success_tracking: HashMap<ActorId, HashMap<Specialty, RunningAverage>>,
}

impl Projector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a baseline vector, used when hydrating from durable snapshots.
    pub fn seed_vector(&mut self, actor: ActorId, vector: XpVector) {
        self.vectors.insert(actor, vector);
    }

    /// Fold one event into the reducer state.
    pub fn apply(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::ContributionSubmitted {
                user_id,
                complexity_score,
                specialty,
                ..
            } => {
                let xp_value = BASE_CONTRIBUTION_XP + u64::from(complexity_score.unwrap_or(0));
                let specialty = specialty.unwrap_or(Specialty::FALLBACK);

                self.contributions.insert(
                    event.id.clone(),
                    ContributionRecord {
                        user_id: user_id.clone(),
                        xp_value,
                        approved: false,
                    },
                );

                let vector = self.vectors.entry(user_id.clone()).or_default();
                vector.pending_xp += xp_value;
                vector.execution += xp_value;
                vector.record_role_action(Role::Builder, specialty);
                vector.touch(event.timestamp);
            }

            EventPayload::VerificationSubmitted {
                verifier_id,
                target_contribution_id,
                verdict,
                ..
            } => {
                let Some(work) = self.contributions.get_mut(target_contribution_id) else {
                    return;
                };
                // First approval wins; later verdicts for the same
                // contribution are no-ops, verifier reward included.
                if work.approved || *verdict != Verdict::Approve {
                    return;
                }
                work.approved = true;

                let contributor = self.vectors.entry(work.user_id.clone()).or_default();
                contributor.pending_xp = contributor.pending_xp.saturating_sub(work.xp_value);
                contributor.total_xp += work.xp_value;

                let verifier = self.vectors.entry(verifier_id.clone()).or_default();
                verifier.total_xp += VERIFIER_REWARD_XP;
                verifier.judgment += VERIFIER_REWARD_XP;
                verifier.touch(event.timestamp);
            }

            EventPayload::ProjectCreated {
                project_id, domain, ..
            } => {
                self.project_domains.insert(project_id.clone(), *domain);
            }

            EventPayload::ProjectCompleted {
                project_id,
                evaluations,
            } => {
                // Evaluations for projects with no recorded domain have
                // nowhere to attribute success, so they are skipped.
                let Some(domain) = self.project_domains.get(project_id).copied() else {
                    return;
                };

                for evaluation in evaluations {
                    let tracking = self
                        .success_tracking
                        .entry(evaluation.user_id.clone())
                        .or_default()
                        .entry(domain)
                        .or_default();
                    tracking.total += evaluation.score;
                    tracking.count += 1;
                    let average = tracking.total / tracking.count as f64;

                    let vector = self.vectors.entry(evaluation.user_id.clone()).or_default();
                    vector.success_rate.insert(domain, average);
                }
            }

            // Squad assignment and the ledger audit trail carry no XP.
            EventPayload::SquadAssigned { .. }
            | EventPayload::StakePlaced { .. }
            | EventPayload::StakeReleased { .. }
            | EventPayload::TicketClaimed { .. }
            | EventPayload::TicketCompleted { .. }
            | EventPayload::ForfeitureExecuted { .. } => {}
        }
    }

    /// Materialize the state as of `as_of`, applying inactivity decay to a
    /// copy. Decay is never written back, so it cannot compound across
    /// repeated snapshots.
    pub fn snapshot(&self, as_of: DateTime<Utc>) -> HashMap<ActorId, XpVector> {
        let mut state = self.vectors.clone();

        for vector in state.values_mut() {
            let Some(last_activity) = vector.last_activity else {
                continue;
            };
            let days_inactive =
                (as_of - last_activity).num_seconds() as f64 / SECONDS_PER_DAY;
            if days_inactive <= GRACE_PERIOD_DAYS {
                continue;
            }
            let months_inactive =
                ((days_inactive - GRACE_PERIOD_DAYS) / DAYS_PER_MONTH).floor() as i32;
            if months_inactive > 0 {
                let decayed =
                    (vector.total_xp as f64 * DECAY_FACTOR.powi(months_inactive)).floor();
                vector.total_xp = decayed as u64;
            }
        }

        state
    }

    pub fn actor_count(&self) -> usize {
        self.vectors.len()
    }

    pub fn contains_actor(&self, actor: &ActorId) -> bool {
        self.vectors.contains_key(actor)
    }
}

/// Pure replay: `(ordered events, as_of) -> per-actor state`. Deterministic —
/// the same inputs always produce the same output.
pub fn project(events: &[Event], as_of: DateTime<Utc>) -> HashMap<ActorId, XpVector> {
    let mut projector = Projector::new();
    for event in events {
        projector.apply(event);
    }
    projector.snapshot(as_of)
}
