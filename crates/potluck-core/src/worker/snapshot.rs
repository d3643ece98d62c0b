//! Consistent read of everything finalization needs for one plan.

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use potluck_db::queries::{events, households, meal_plans, options, votes};

use crate::finalize::PlanSnapshot;

/// Load a plan with its events, options, votes and household members in a
/// single `REPEATABLE READ` read-only transaction. Returns `None` when the
/// plan does not exist or is archived.
pub async fn load_snapshot(pool: &PgPool, meal_plan_id: Uuid) -> Result<Option<PlanSnapshot>> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin snapshot transaction")?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await
        .context("failed to set snapshot isolation")?;

    let Some(plan) = meal_plans::get_meal_plan(&mut *tx, meal_plan_id).await? else {
        tx.rollback()
            .await
            .context("failed to close snapshot transaction")?;
        return Ok(None);
    };
    let events = events::list_events_for_meal_plan(&mut *tx, meal_plan_id).await?;
    let options = options::list_options_for_meal_plan(&mut *tx, meal_plan_id).await?;
    let votes = votes::list_votes_for_meal_plan(&mut *tx, meal_plan_id).await?;
    let member_ids =
        households::list_household_member_ids(&mut *tx, plan.belongs_to_household).await?;

    tx.commit()
        .await
        .context("failed to close snapshot transaction")?;

    Ok(Some(PlanSnapshot {
        plan,
        events,
        options,
        votes,
        member_ids,
    }))
}
