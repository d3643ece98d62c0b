//! Ranked-vote tally for a single meal plan event.
//!
//! Each option scores the sum of the ranks it received (lower is better).
//! Only options ranked by at least one accepted ballot are candidates.

pub mod ballot;
pub mod tiebreak;

use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use potluck_db::models::MealPlanOptionVote;

pub use ballot::{Ballot, BallotError, collect_ballots};
pub use tiebreak::TieBreaker;

/// How an event's winner was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// A single option had the lowest score.
    Clear(Uuid),
    /// Several options shared the lowest score; [`TieBreaker`] picked this
    /// one.
    Tiebroken(Uuid),
}

impl Winner {
    pub fn option_id(&self) -> Uuid {
        match self {
            Self::Clear(id) | Self::Tiebroken(id) => *id,
        }
    }

    pub fn is_tiebroken(&self) -> bool {
        matches!(self, Self::Tiebroken(_))
    }
}

/// Result of tallying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTally {
    pub event_id: Uuid,
    /// Candidate option -> sum of ranks.
    pub scores: BTreeMap<Uuid, u64>,
    /// Candidates ordered best first (score, then ID).
    pub ranking: Vec<Uuid>,
    /// Candidates sharing the lowest score, ordered by ID.
    pub tied: Vec<Uuid>,
    /// `None` when no accepted ballot ranked anything.
    pub winner: Option<Winner>,
    /// Voters with an accepted ballot, including full abstentions.
    pub voters: BTreeSet<Uuid>,
    /// Option -> number of accepted ballots abstaining on it.
    pub abstentions: BTreeMap<Uuid, u32>,
    pub rejected: Vec<BallotError>,
}

impl EventTally {
    pub fn is_decided(&self) -> bool {
        self.winner.is_some()
    }
}

pub struct VoteTally;

impl VoteTally {
    /// Tally the votes cast on one event whose live options are
    /// `option_ids`.
    ///
    /// Malformed ballots are excluded and returned in
    /// [`EventTally::rejected`]; they never fail the tally.
    pub fn tally<'a>(
        event_id: Uuid,
        option_ids: &BTreeSet<Uuid>,
        votes: impl IntoIterator<Item = &'a MealPlanOptionVote>,
    ) -> EventTally {
        let (ballots, rejected) = collect_ballots(event_id, option_ids, votes);

        let mut scores: BTreeMap<Uuid, u64> = BTreeMap::new();
        let mut abstentions: BTreeMap<Uuid, u32> = BTreeMap::new();
        let mut voters = BTreeSet::new();
        for ballot in &ballots {
            voters.insert(ballot.voter);
            for (option_id, rank) in &ballot.ranks {
                *scores.entry(*option_id).or_default() += u64::from(*rank);
            }
            for option_id in &ballot.abstained {
                *abstentions.entry(*option_id).or_default() += 1;
            }
        }

        let mut ranking: Vec<Uuid> = scores.keys().copied().collect();
        ranking.sort_by_key(|id| (scores[id], *id));

        let tied: Vec<Uuid> = match ranking.first().map(|id| scores[id]) {
            Some(best) => ranking
                .iter()
                .copied()
                .filter(|id| scores[id] == best)
                .collect(),
            None => Vec::new(),
        };

        let winner = match tied.as_slice() {
            [] => None,
            [only] => Some(Winner::Clear(*only)),
            _ => TieBreaker::resolve(&tied, &abstentions).map(Winner::Tiebroken),
        };

        EventTally {
            event_id,
            scores,
            ranking,
            tied,
            winner,
            voters,
            abstentions,
            rejected,
        }
    }
}
