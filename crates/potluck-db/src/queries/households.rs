//! Database query functions for the `household_user_memberships` table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::HouseholdUserMembership;

/// Add a user to a household.
///
/// Uses `ON CONFLICT DO NOTHING` against the active-membership index, so
/// adding an existing member is a no-op that returns `None`.
pub async fn add_household_member<'e>(
    executor: impl PgExecutor<'e>,
    household_id: Uuid,
    user_id: Uuid,
) -> Result<Option<HouseholdUserMembership>> {
    let membership = sqlx::query_as::<_, HouseholdUserMembership>(
        "INSERT INTO household_user_memberships (belongs_to_household, belongs_to_user) \
         VALUES ($1, $2) \
         ON CONFLICT (belongs_to_household, belongs_to_user) WHERE archived_at IS NULL \
         DO NOTHING \
         RETURNING *",
    )
    .bind(household_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to add user {user_id} to household {household_id}"))?;

    Ok(membership)
}

/// Remove a user from a household (soft delete).
pub async fn remove_household_member<'e>(
    executor: impl PgExecutor<'e>,
    household_id: Uuid,
    user_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE household_user_memberships SET archived_at = now() \
         WHERE belongs_to_household = $1 AND belongs_to_user = $2 AND archived_at IS NULL",
    )
    .bind(household_id)
    .bind(user_id)
    .execute(executor)
    .await
    .with_context(|| format!("failed to remove user {user_id} from household {household_id}"))?;

    Ok(result.rows_affected())
}

/// List the user IDs of a household's current members.
pub async fn list_household_member_ids<'e>(
    executor: impl PgExecutor<'e>,
    household_id: Uuid,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT belongs_to_user FROM household_user_memberships \
         WHERE belongs_to_household = $1 AND archived_at IS NULL \
         ORDER BY belongs_to_user",
    )
    .bind(household_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to list members of household {household_id}"))?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}
