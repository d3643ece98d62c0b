//! Database query functions for the `meal_plan_events` table.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::{MealName, MealPlanEvent};

/// Parameters for inserting a new meal plan event.
#[derive(Debug, Clone)]
pub struct NewMealPlanEvent<'a> {
    pub meal_plan_id: Uuid,
    pub meal_name: MealName,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: &'a str,
}

/// Insert a new event row. Returns the inserted row.
pub async fn insert_meal_plan_event<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewMealPlanEvent<'_>,
) -> Result<MealPlanEvent> {
    let event = sqlx::query_as::<_, MealPlanEvent>(
        "INSERT INTO meal_plan_events (belongs_to_meal_plan, meal_name, starts_at, ends_at, notes) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(new.meal_plan_id)
    .bind(new.meal_name)
    .bind(new.starts_at)
    .bind(new.ends_at)
    .bind(new.notes)
    .fetch_one(executor)
    .await
    .with_context(|| {
        format!(
            "failed to insert {} event for meal plan {}",
            new.meal_name, new.meal_plan_id
        )
    })?;

    Ok(event)
}

/// List the non-archived events of a plan in schedule order.
pub async fn list_events_for_meal_plan<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: Uuid,
) -> Result<Vec<MealPlanEvent>> {
    let events = sqlx::query_as::<_, MealPlanEvent>(
        "SELECT * FROM meal_plan_events \
         WHERE belongs_to_meal_plan = $1 AND archived_at IS NULL \
         ORDER BY starts_at ASC, id ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to list events for meal plan {meal_plan_id}"))?;

    Ok(events)
}
