//! Database query functions for the `meal_plans` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::models::MealPlan;

/// Insert a new meal plan in `awaiting_votes`. Returns the inserted row with
/// server-generated defaults (id, created_at, status).
pub async fn insert_meal_plan<'e>(
    executor: impl PgExecutor<'e>,
    household_id: Uuid,
    voting_deadline: DateTime<Utc>,
    notes: &str,
) -> Result<MealPlan> {
    let plan = sqlx::query_as::<_, MealPlan>(
        "INSERT INTO meal_plans (belongs_to_household, voting_deadline, notes) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(household_id)
    .bind(voting_deadline)
    .bind(notes)
    .fetch_one(executor)
    .await
    .context("failed to insert meal plan")?;

    Ok(plan)
}

/// Fetch a non-archived meal plan by its ID.
pub async fn get_meal_plan<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<Option<MealPlan>> {
    let plan = sqlx::query_as::<_, MealPlan>(
        "SELECT * FROM meal_plans WHERE id = $1 AND archived_at IS NULL",
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to fetch meal plan {id}"))?;

    Ok(plan)
}

/// List the IDs of plans still `awaiting_votes` whose voting deadline is at
/// or before `now`, oldest deadline first.
pub async fn list_due_meal_plan_ids<'e>(
    executor: impl PgExecutor<'e>,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT id FROM meal_plans \
         WHERE status = 'awaiting_votes' \
           AND archived_at IS NULL \
           AND voting_deadline <= $1 \
         ORDER BY voting_deadline ASC, id ASC \
         LIMIT $2",
    )
    .bind(now)
    .bind(limit)
    .fetch_all(executor)
    .await
    .context("failed to list meal plans past their voting deadline")?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Atomically move a plan from `awaiting_votes` to `finalized`.
///
/// The WHERE clause includes the expected prior status, so the row is only
/// updated by the first caller. Returns the number of rows affected: 0 means
/// the plan was already finalized (or archived, or does not exist).
pub async fn finalize_meal_plan(conn: &mut PgConnection, id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE meal_plans \
         SET status = 'finalized', \
             finalized_at = now(), \
             last_updated_at = now() \
         WHERE id = $1 \
           AND status = 'awaiting_votes' \
           AND archived_at IS NULL",
    )
    .bind(id)
    .execute(conn)
    .await
    .with_context(|| format!("failed to finalize meal plan {id}"))?;

    Ok(result.rows_affected())
}

/// Soft-delete a meal plan.
pub async fn archive_meal_plan<'e>(executor: impl PgExecutor<'e>, id: Uuid) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE meal_plans SET archived_at = now() WHERE id = $1 AND archived_at IS NULL",
    )
    .bind(id)
    .execute(executor)
    .await
    .with_context(|| format!("failed to archive meal plan {id}"))?;

    Ok(result.rows_affected())
}

/// Resolve the plan that owns a meal plan event.
pub async fn find_meal_plan_id_for_event<'e>(
    executor: impl PgExecutor<'e>,
    event_id: Uuid,
) -> Result<Option<Uuid>> {
    let id = sqlx::query_scalar(
        "SELECT belongs_to_meal_plan FROM meal_plan_events \
         WHERE id = $1 AND archived_at IS NULL",
    )
    .bind(event_id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to resolve meal plan for event {event_id}"))?;

    Ok(id)
}

/// Resolve the plan that owns a meal plan option (through its event).
pub async fn find_meal_plan_id_for_option<'e>(
    executor: impl PgExecutor<'e>,
    option_id: Uuid,
) -> Result<Option<Uuid>> {
    let id = sqlx::query_scalar(
        "SELECT e.belongs_to_meal_plan \
         FROM meal_plan_options o \
         JOIN meal_plan_events e ON e.id = o.belongs_to_meal_plan_event \
         WHERE o.id = $1 AND o.archived_at IS NULL AND e.archived_at IS NULL",
    )
    .bind(option_id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to resolve meal plan for option {option_id}"))?;

    Ok(id)
}
