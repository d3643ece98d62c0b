//! Per-voter ballots for one event, checked before they are scored.

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use potluck_db::models::MealPlanOptionVote;

/// One voter's votes on one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub voter: Uuid,
    /// Non-abstaining votes: option -> rank (0 = most preferred).
    pub ranks: BTreeMap<Uuid, u32>,
    /// Options the voter explicitly declined to rank.
    pub abstained: BTreeSet<Uuid>,
}

impl Ballot {
    /// True when the voter abstained on everything they touched.
    pub fn is_full_abstention(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// A persisted ballot that cannot be scored.
///
/// Votes are validated on submission, so these only show up for historical
/// anomalies. A rejected ballot is dropped as a whole.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BallotError {
    #[error("voter {voter} voted more than once on option {option_id}")]
    DuplicateOption { voter: Uuid, option_id: Uuid },

    #[error("voter {voter} voted on option {option_id}, which does not belong to event {event_id}")]
    ForeignOption {
        voter: Uuid,
        option_id: Uuid,
        event_id: Uuid,
    },

    #[error("voter {voter} gave negative rank {rank} to option {option_id}")]
    NegativeRank {
        voter: Uuid,
        option_id: Uuid,
        rank: i32,
    },

    #[error("ranks from voter {voter} on event {event_id} are not a permutation of 0..{expected}: {ranks:?}")]
    NotAPermutation {
        voter: Uuid,
        event_id: Uuid,
        expected: usize,
        ranks: Vec<u32>,
    },
}

impl BallotError {
    /// The voter whose ballot was rejected.
    pub fn voter(&self) -> Uuid {
        match self {
            Self::DuplicateOption { voter, .. }
            | Self::ForeignOption { voter, .. }
            | Self::NegativeRank { voter, .. }
            | Self::NotAPermutation { voter, .. } => *voter,
        }
    }
}

/// Group `votes` into one ballot per voter and validate each ballot.
///
/// Returns the accepted ballots ordered by voter ID and the rejections.
/// The result does not depend on the order of `votes`.
pub fn collect_ballots<'a>(
    event_id: Uuid,
    option_ids: &BTreeSet<Uuid>,
    votes: impl IntoIterator<Item = &'a MealPlanOptionVote>,
) -> (Vec<Ballot>, Vec<BallotError>) {
    let mut by_voter: BTreeMap<Uuid, Vec<&MealPlanOptionVote>> = BTreeMap::new();
    for vote in votes {
        by_voter.entry(vote.by_user).or_default().push(vote);
    }

    let mut ballots = Vec::with_capacity(by_voter.len());
    let mut rejected = Vec::new();
    for (voter, mut rows) in by_voter {
        rows.sort_by_key(|v| (v.belongs_to_meal_plan_option, v.id));
        match build_ballot(event_id, option_ids, voter, &rows) {
            Ok(ballot) => ballots.push(ballot),
            Err(e) => rejected.push(e),
        }
    }
    (ballots, rejected)
}

fn build_ballot(
    event_id: Uuid,
    option_ids: &BTreeSet<Uuid>,
    voter: Uuid,
    rows: &[&MealPlanOptionVote],
) -> Result<Ballot, BallotError> {
    let mut ranks = BTreeMap::new();
    let mut abstained = BTreeSet::new();

    for vote in rows {
        let option_id = vote.belongs_to_meal_plan_option;
        if !option_ids.contains(&option_id) {
            return Err(BallotError::ForeignOption {
                voter,
                option_id,
                event_id,
            });
        }
        if ranks.contains_key(&option_id) || abstained.contains(&option_id) {
            return Err(BallotError::DuplicateOption { voter, option_id });
        }
        if vote.abstain {
            abstained.insert(option_id);
            continue;
        }
        let rank = u32::try_from(vote.rank).map_err(|_| BallotError::NegativeRank {
            voter,
            option_id,
            rank: vote.rank,
        })?;
        ranks.insert(option_id, rank);
    }

    let mut sorted: Vec<u32> = ranks.values().copied().collect();
    sorted.sort_unstable();
    let is_permutation = sorted
        .iter()
        .enumerate()
        .all(|(i, rank)| usize::try_from(*rank).is_ok_and(|r| r == i));
    if !is_permutation {
        return Err(BallotError::NotAPermutation {
            voter,
            event_id,
            expected: sorted.len(),
            ranks: sorted,
        });
    }

    Ok(Ballot {
        voter,
        ranks,
        abstained,
    })
}
