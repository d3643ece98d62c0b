//! Database query functions for the `meal_plan_option_votes` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::MealPlanOptionVote;

/// Parameters for inserting a new vote row.
#[derive(Debug, Clone)]
pub struct NewMealPlanOptionVote {
    pub option_id: Uuid,
    pub by_user: Uuid,
    pub rank: i32,
    pub abstain: bool,
}

impl NewMealPlanOptionVote {
    /// A ranked vote.
    pub fn ranked(option_id: Uuid, by_user: Uuid, rank: i32) -> Self {
        Self {
            option_id,
            by_user,
            rank,
            abstain: false,
        }
    }

    /// An abstention on one option.
    pub fn abstain(option_id: Uuid, by_user: Uuid) -> Self {
        Self {
            option_id,
            by_user,
            rank: 0,
            abstain: true,
        }
    }
}

/// Insert a vote row. No validation is performed here; ballots are checked
/// when they are tallied.
pub async fn insert_vote<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewMealPlanOptionVote,
) -> Result<MealPlanOptionVote> {
    let vote = sqlx::query_as::<_, MealPlanOptionVote>(
        "INSERT INTO meal_plan_option_votes (belongs_to_meal_plan_option, by_user, rank, abstain) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(new.option_id)
    .bind(new.by_user)
    .bind(new.rank)
    .bind(new.abstain)
    .fetch_one(executor)
    .await
    .with_context(|| {
        format!(
            "failed to insert vote by {} on option {}",
            new.by_user, new.option_id
        )
    })?;

    Ok(vote)
}

/// List every live vote cast on a plan's live options.
///
/// Votes on archived options or archived events are excluded.
pub async fn list_votes_for_meal_plan<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: Uuid,
) -> Result<Vec<MealPlanOptionVote>> {
    let votes = sqlx::query_as::<_, MealPlanOptionVote>(
        "SELECT v.* FROM meal_plan_option_votes v \
         JOIN meal_plan_options o ON o.id = v.belongs_to_meal_plan_option \
         JOIN meal_plan_events e ON e.id = o.belongs_to_meal_plan_event \
         WHERE e.belongs_to_meal_plan = $1 \
           AND v.archived_at IS NULL \
           AND o.archived_at IS NULL \
           AND e.archived_at IS NULL \
         ORDER BY v.id ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to list votes for meal plan {meal_plan_id}"))?;

    Ok(votes)
}
