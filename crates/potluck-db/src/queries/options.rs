//! Database query functions for the `meal_plan_options` table.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::models::MealPlanOption;

/// Insert a new candidate meal for an event. Returns the inserted row with
/// `chosen` and `tiebroken` both false.
pub async fn insert_meal_plan_option<'e>(
    executor: impl PgExecutor<'e>,
    event_id: Uuid,
    meal_id: Uuid,
    meal_scale: f64,
    notes: &str,
) -> Result<MealPlanOption> {
    let option = sqlx::query_as::<_, MealPlanOption>(
        "INSERT INTO meal_plan_options (belongs_to_meal_plan_event, meal_id, meal_scale, notes) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(event_id)
    .bind(meal_id)
    .bind(meal_scale)
    .bind(notes)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert option for event {event_id}"))?;

    Ok(option)
}

/// List the non-archived options of every non-archived event in a plan.
pub async fn list_options_for_meal_plan<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: Uuid,
) -> Result<Vec<MealPlanOption>> {
    let options = sqlx::query_as::<_, MealPlanOption>(
        "SELECT o.* FROM meal_plan_options o \
         JOIN meal_plan_events e ON e.id = o.belongs_to_meal_plan_event \
         WHERE e.belongs_to_meal_plan = $1 \
           AND e.archived_at IS NULL \
           AND o.archived_at IS NULL \
         ORDER BY o.belongs_to_meal_plan_event ASC, o.id ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to list options for meal plan {meal_plan_id}"))?;

    Ok(options)
}

/// Mark `option_id` as the chosen option of `event_id` and clear the flag on
/// every sibling. `tiebroken` is recorded on the winner only.
///
/// Returns the number of option rows touched.
pub async fn mark_option_chosen(
    conn: &mut PgConnection,
    event_id: Uuid,
    option_id: Uuid,
    tiebroken: bool,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE meal_plan_options \
         SET chosen = (id = $2), \
             tiebroken = (id = $2 AND $3), \
             last_updated_at = now() \
         WHERE belongs_to_meal_plan_event = $1 AND archived_at IS NULL",
    )
    .bind(event_id)
    .bind(option_id)
    .bind(tiebroken)
    .execute(conn)
    .await
    .with_context(|| format!("failed to mark option {option_id} chosen for event {event_id}"))?;

    Ok(result.rows_affected())
}
