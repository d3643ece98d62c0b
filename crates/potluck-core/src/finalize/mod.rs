//! Meal plan finalization state machine.
//!
//! Decides, from a snapshot of persisted rows and a caller-supplied `now`,
//! whether a plan may leave `awaiting_votes` and which option each event
//! ends up with. No I/O happens here; the worker loads the snapshot and
//! applies the decision.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use potluck_db::models::{
    MealPlan, MealPlanEvent, MealPlanOption, MealPlanOptionVote, MealPlanStatus,
};

use crate::tally::{BallotError, EventTally, TieBreaker, VoteTally};

/// Everything the state machine needs to know about one plan.
#[derive(Debug, Clone)]
pub struct PlanSnapshot {
    pub plan: MealPlan,
    pub events: Vec<MealPlanEvent>,
    pub options: Vec<MealPlanOption>,
    pub votes: Vec<MealPlanOptionVote>,
    /// Current household members. Empty means membership is unknown and
    /// quorum is not enforced.
    pub member_ids: Vec<Uuid>,
}

/// The option picked for one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventChoice {
    pub event_id: Uuid,
    pub option_id: Uuid,
    pub tiebroken: bool,
}

/// Why a plan may finalize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeReason {
    /// Every event has a winner and every member has voted on it.
    AllEventsDecided,
    /// The voting deadline has passed.
    DeadlinePassed,
}

/// Problems in the snapshot that are reported and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    EventWithoutOptions { event_id: Uuid },
    /// A vote on an option that is not among the snapshot's live options.
    OrphanVote { vote_id: Uuid, option_id: Uuid },
}

impl std::fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventWithoutOptions { event_id } => {
                write!(f, "event {event_id} has no options")
            }
            Self::OrphanVote { vote_id, option_id } => {
                write!(f, "vote {vote_id} references unknown option {option_id}")
            }
        }
    }
}

/// What to do with the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Finalize with one choice per event that has options, in event order.
    Finalize {
        reason: FinalizeReason,
        choices: Vec<EventChoice>,
    },
    /// Leave the plan awaiting votes.
    NotReady { undecided_events: Vec<Uuid> },
    /// The plan is already terminal.
    AlreadyFinalized,
}

/// The decision plus everything observed while reaching it.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    /// Per-event tallies, in event order (events without options excluded).
    pub tallies: Vec<EventTally>,
    pub issues: Vec<IntegrityIssue>,
}

impl Evaluation {
    /// Every rejected ballot across the plan.
    pub fn rejected_ballots(&self) -> impl Iterator<Item = &BallotError> {
        self.tallies.iter().flat_map(|t| t.rejected.iter())
    }
}

/// The meal plan state machine.
///
/// ```text
/// awaiting_votes -> finalized
/// ```
///
/// `finalized` is terminal.
pub struct FinalizationStateMachine;

impl FinalizationStateMachine {
    pub fn is_valid_transition(from: MealPlanStatus, to: MealPlanStatus) -> bool {
        !from.is_terminal() && to.is_terminal()
    }

    /// Evaluate `snapshot` at instant `now`.
    ///
    /// An event is decided when its tally has a winner and, if the household
    /// has recorded members, each of them has an accepted ballot on it. The
    /// plan finalizes when every event with options is decided (and there is
    /// at least one such event), or unconditionally once
    /// `now >= voting_deadline`. On the deadline path an undecided event
    /// keeps its tally winner if it has one, and otherwise goes to
    /// [`TieBreaker`] across all its options.
    pub fn evaluate(snapshot: &PlanSnapshot, now: DateTime<Utc>) -> Evaluation {
        if !Self::is_valid_transition(snapshot.plan.status, MealPlanStatus::Finalized) {
            return Evaluation {
                decision: Decision::AlreadyFinalized,
                tallies: Vec::new(),
                issues: Vec::new(),
            };
        }

        let mut issues = Vec::new();

        let mut options_by_event: BTreeMap<Uuid, BTreeSet<Uuid>> = BTreeMap::new();
        let mut event_of_option: BTreeMap<Uuid, Uuid> = BTreeMap::new();
        for option in &snapshot.options {
            options_by_event
                .entry(option.belongs_to_meal_plan_event)
                .or_default()
                .insert(option.id);
            event_of_option.insert(option.id, option.belongs_to_meal_plan_event);
        }

        let mut votes_by_event: BTreeMap<Uuid, Vec<&MealPlanOptionVote>> = BTreeMap::new();
        for vote in &snapshot.votes {
            match event_of_option.get(&vote.belongs_to_meal_plan_option) {
                Some(event_id) => votes_by_event.entry(*event_id).or_default().push(vote),
                None => issues.push(IntegrityIssue::OrphanVote {
                    vote_id: vote.id,
                    option_id: vote.belongs_to_meal_plan_option,
                }),
            }
        }

        let members: BTreeSet<Uuid> = snapshot.member_ids.iter().copied().collect();
        let deadline_passed = now >= snapshot.plan.voting_deadline;

        let mut tallies = Vec::new();
        let mut choices = Vec::new();
        let mut undecided_events = Vec::new();
        for event in &snapshot.events {
            let Some(option_ids) = options_by_event.get(&event.id) else {
                issues.push(IntegrityIssue::EventWithoutOptions { event_id: event.id });
                continue;
            };

            let votes = votes_by_event
                .get(&event.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let tally = VoteTally::tally(event.id, option_ids, votes.iter().copied());

            let quorum = members.is_subset(&tally.voters);
            match tally.winner {
                Some(winner) if quorum || deadline_passed => {
                    choices.push(EventChoice {
                        event_id: event.id,
                        option_id: winner.option_id(),
                        tiebroken: winner.is_tiebroken(),
                    });
                }
                _ if deadline_passed => {
                    let all: Vec<Uuid> = option_ids.iter().copied().collect();
                    if let Some(option_id) = TieBreaker::resolve(&all, &tally.abstentions) {
                        choices.push(EventChoice {
                            event_id: event.id,
                            option_id,
                            tiebroken: true,
                        });
                    }
                }
                _ => undecided_events.push(event.id),
            }
            tallies.push(tally);
        }

        let decision = if deadline_passed {
            Decision::Finalize {
                reason: FinalizeReason::DeadlinePassed,
                choices,
            }
        } else if undecided_events.is_empty() && !tallies.is_empty() {
            Decision::Finalize {
                reason: FinalizeReason::AllEventsDecided,
                choices,
            }
        } else {
            Decision::NotReady { undecided_events }
        };

        Evaluation {
            decision,
            tallies,
            issues,
        }
    }
}
