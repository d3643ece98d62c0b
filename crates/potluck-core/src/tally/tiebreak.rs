//! Deterministic tie resolution.
//!
//! The order applied to a tied set is fixed:
//!
//! 1. fewest abstentions recorded against the option;
//! 2. smallest option ID.
//!
//! `Uuid` compares by its 16 bytes, which is the same order as its
//! lowercase hyphenated string form, so step 2 is the lexicographically
//! smallest identifier. Nothing else (clock, randomness, row order) takes
//! part, so every re-run over the same rows picks the same option.

use std::collections::BTreeMap;

use uuid::Uuid;

pub struct TieBreaker;

impl TieBreaker {
    /// Pick one option from `tied`. Returns `None` only when `tied` is empty.
    pub fn resolve(tied: &[Uuid], abstentions: &BTreeMap<Uuid, u32>) -> Option<Uuid> {
        tied.iter()
            .copied()
            .min_by_key(|id| (abstentions.get(id).copied().unwrap_or(0), *id))
    }
}
