//! Database query functions for the `grocery_list_items` table.
//!
//! Items are keyed by `(belongs_to_meal_plan, valid_ingredient,
//! valid_measurement_unit)` among non-archived rows. Upserts only ever write
//! the needed quantities; purchase tracking and status belong to the shopper.

use anyhow::{Context, Result};
use sqlx::{PgConnection, PgExecutor};
use uuid::Uuid;

use crate::models::{GroceryListItem, GroceryListItemStatus};

/// Desired needed-quantity state for one grocery list key.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGroceryListItem {
    pub meal_plan_id: Uuid,
    pub valid_ingredient: Uuid,
    pub valid_measurement_unit: Uuid,
    pub minimum_quantity_needed: f64,
    pub maximum_quantity_needed: Option<f64>,
}

/// What an upsert did to the row at its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(Uuid),
    Updated(Uuid),
    /// A live row already carried the same quantities.
    Unchanged,
}

impl UpsertOutcome {
    /// The written row's ID, if anything was written.
    pub fn written_id(&self) -> Option<Uuid> {
        match self {
            Self::Inserted(id) | Self::Updated(id) => Some(*id),
            Self::Unchanged => None,
        }
    }
}

/// Insert or update the item at `new`'s key.
///
/// An existing live row has its needed quantities replaced only when they
/// differ from the stored values. `(xmax = 0)` distinguishes a fresh insert
/// from a conflict update.
pub async fn upsert_grocery_list_item(
    conn: &mut PgConnection,
    new: &NewGroceryListItem,
) -> Result<UpsertOutcome> {
    let row: Option<(Uuid, bool)> = sqlx::query_as(
        "INSERT INTO grocery_list_items \
         (belongs_to_meal_plan, valid_ingredient, valid_measurement_unit, \
          minimum_quantity_needed, maximum_quantity_needed) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (belongs_to_meal_plan, valid_ingredient, valid_measurement_unit) \
         WHERE archived_at IS NULL \
         DO UPDATE SET \
             minimum_quantity_needed = EXCLUDED.minimum_quantity_needed, \
             maximum_quantity_needed = EXCLUDED.maximum_quantity_needed, \
             last_updated_at = now() \
         WHERE grocery_list_items.minimum_quantity_needed IS DISTINCT FROM EXCLUDED.minimum_quantity_needed \
            OR grocery_list_items.maximum_quantity_needed IS DISTINCT FROM EXCLUDED.maximum_quantity_needed \
         RETURNING id, (xmax = 0) AS inserted",
    )
    .bind(new.meal_plan_id)
    .bind(new.valid_ingredient)
    .bind(new.valid_measurement_unit)
    .bind(new.minimum_quantity_needed)
    .bind(new.maximum_quantity_needed)
    .fetch_optional(conn)
    .await
    .with_context(|| {
        format!(
            "failed to upsert grocery list item ({}, {}) for meal plan {}",
            new.valid_ingredient, new.valid_measurement_unit, new.meal_plan_id
        )
    })?;

    Ok(match row {
        Some((id, true)) => UpsertOutcome::Inserted(id),
        Some((id, false)) => UpsertOutcome::Updated(id),
        None => UpsertOutcome::Unchanged,
    })
}

/// Live items left behind by a regeneration whose key is no longer produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleItems {
    /// Untouched by the shopper; soft-deleted.
    pub archived: Vec<Uuid>,
    /// Carry purchase data; kept with their needed quantities set to zero.
    pub zeroed: Vec<Uuid>,
}

/// Retire every live item of `meal_plan_id` whose `(ingredient, unit)` key
/// is not in `keep`.
///
/// Items still `needs_purchase` with no purchase fields set are archived.
/// The rest keep their purchase data and have their needed quantities
/// zeroed; items already at zero are not rewritten.
pub async fn retire_stale_grocery_list_items(
    conn: &mut PgConnection,
    meal_plan_id: Uuid,
    keep: &[(Uuid, Uuid)],
) -> Result<StaleItems> {
    let (ingredients, units): (Vec<Uuid>, Vec<Uuid>) = keep.iter().copied().unzip();
    const STALE: &str = "belongs_to_meal_plan = $1 \
         AND archived_at IS NULL \
         AND NOT EXISTS ( \
             SELECT 1 FROM unnest($2::uuid[], $3::uuid[]) AS k(ingredient, unit) \
             WHERE k.ingredient = valid_ingredient AND k.unit = valid_measurement_unit)";
    const UNTOUCHED: &str = "status = 'needs_purchase' \
         AND quantity_purchased IS NULL \
         AND purchased_measurement_unit IS NULL \
         AND purchased_upc IS NULL \
         AND purchase_price IS NULL";

    let archived: Vec<Uuid> = sqlx::query_scalar(&format!(
        "UPDATE grocery_list_items SET archived_at = now(), last_updated_at = now() \
         WHERE {STALE} AND {UNTOUCHED} \
         RETURNING id"
    ))
    .bind(meal_plan_id)
    .bind(&ingredients)
    .bind(&units)
    .fetch_all(&mut *conn)
    .await
    .with_context(|| format!("failed to archive stale grocery list items for meal plan {meal_plan_id}"))?;

    let zeroed: Vec<Uuid> = sqlx::query_scalar(&format!(
        "UPDATE grocery_list_items \
         SET minimum_quantity_needed = 0, \
             maximum_quantity_needed = CASE WHEN maximum_quantity_needed IS NULL THEN NULL ELSE 0 END, \
             last_updated_at = now() \
         WHERE {STALE} \
           AND (minimum_quantity_needed <> 0 OR maximum_quantity_needed <> 0) \
         RETURNING id"
    ))
    .bind(meal_plan_id)
    .bind(&ingredients)
    .bind(&units)
    .fetch_all(&mut *conn)
    .await
    .with_context(|| format!("failed to zero stale grocery list items for meal plan {meal_plan_id}"))?;

    Ok(StaleItems { archived, zeroed })
}

/// List a plan's live grocery list items in key order.
pub async fn list_grocery_list_items_for_meal_plan<'e>(
    executor: impl PgExecutor<'e>,
    meal_plan_id: Uuid,
) -> Result<Vec<GroceryListItem>> {
    let items = sqlx::query_as::<_, GroceryListItem>(
        "SELECT * FROM grocery_list_items \
         WHERE belongs_to_meal_plan = $1 AND archived_at IS NULL \
         ORDER BY valid_ingredient ASC, valid_measurement_unit ASC",
    )
    .bind(meal_plan_id)
    .fetch_all(executor)
    .await
    .with_context(|| format!("failed to list grocery list items for meal plan {meal_plan_id}"))?;

    Ok(items)
}

/// Purchase details recorded by the shopper.
#[derive(Debug, Clone, Default)]
pub struct PurchaseUpdate {
    pub status: GroceryListItemStatus,
    pub quantity_purchased: Option<f64>,
    pub purchased_measurement_unit: Option<Uuid>,
    pub purchased_upc: Option<String>,
    pub purchase_price: Option<f64>,
}

/// Record purchase details on an item. Needed quantities are not touched.
///
/// Returns `None` if the item does not exist or is archived.
pub async fn record_purchase<'e>(
    executor: impl PgExecutor<'e>,
    item_id: Uuid,
    update: &PurchaseUpdate,
) -> Result<Option<GroceryListItem>> {
    let item = sqlx::query_as::<_, GroceryListItem>(
        "UPDATE grocery_list_items \
         SET status = $2, \
             quantity_purchased = $3, \
             purchased_measurement_unit = $4, \
             purchased_upc = $5, \
             purchase_price = $6, \
             last_updated_at = now() \
         WHERE id = $1 AND archived_at IS NULL \
         RETURNING *",
    )
    .bind(item_id)
    .bind(update.status)
    .bind(update.quantity_purchased)
    .bind(update.purchased_measurement_unit)
    .bind(update.purchased_upc.as_deref())
    .bind(update.purchase_price)
    .fetch_optional(executor)
    .await
    .with_context(|| format!("failed to record purchase on grocery list item {item_id}"))?;

    Ok(item)
}

/// Soft-delete a grocery list item.
pub async fn archive_grocery_list_item<'e>(
    executor: impl PgExecutor<'e>,
    item_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE grocery_list_items SET archived_at = now() \
         WHERE id = $1 AND archived_at IS NULL",
    )
    .bind(item_id)
    .execute(executor)
    .await
    .with_context(|| format!("failed to archive grocery list item {item_id}"))?;

    Ok(result.rows_affected())
}
