//! Grocery list generation for finalized meal plans.
//!
//! Expands the chosen options into scaled ingredient requirements,
//! aggregates them per `(ingredient, unit)` and upserts one grocery list
//! item per key. Re-running over unchanged data writes nothing.

pub mod aggregate;
pub mod conversion;

use anyhow::{Context, Result};
use sqlx::PgConnection;
use uuid::Uuid;

use potluck_db::queries::grocery_list_items::{
    self, NewGroceryListItem, StaleItems, UpsertOutcome,
};
use potluck_db::queries::{conversions, recipes};

pub use aggregate::{AggregatedItem, Requirement, SkippedLine};
pub use conversion::ConversionTable;

/// One aggregated line and what the upsert did with it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroceryLine {
    pub item: AggregatedItem,
    pub outcome: UpsertOutcome,
}

/// Summary of one generation run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroceryReport {
    pub lines: Vec<GroceryLine>,
    /// Recipe lines left out because they had no measurement unit.
    pub skipped: Vec<SkippedLine>,
    /// Earlier items whose key this run no longer produced.
    pub stale: StaleItems,
}

impl GroceryReport {
    /// IDs of live items that were inserted or changed, including stale
    /// items whose needed quantities were zeroed.
    pub fn written_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.lines
            .iter()
            .filter_map(|l| l.outcome.written_id())
            .chain(self.stale.zeroed.iter().copied())
    }

    /// IDs of stale items that were archived.
    pub fn archived_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.stale.archived.iter().copied()
    }

    pub fn inserted(&self) -> usize {
        self.count(|o| matches!(o, UpsertOutcome::Inserted(_)))
    }

    pub fn updated(&self) -> usize {
        self.count(|o| matches!(o, UpsertOutcome::Updated(_)))
    }

    pub fn unchanged(&self) -> usize {
        self.count(|o| matches!(o, UpsertOutcome::Unchanged))
    }

    fn count(&self, pred: impl Fn(&UpsertOutcome) -> bool) -> usize {
        self.lines.iter().filter(|l| pred(&l.outcome)).count()
    }
}

pub struct GroceryListGenerator;

impl GroceryListGenerator {
    /// Generate the grocery list for `meal_plan_id` from its chosen options.
    ///
    /// Runs on the caller's connection so it can share the finalization
    /// transaction. Existing live items keep their purchase fields; only
    /// needed quantities are written. Live items whose key no longer appears
    /// are archived, or zeroed when the shopper has already recorded a
    /// purchase on them.
    pub async fn generate(
        conn: &mut PgConnection,
        meal_plan_id: Uuid,
        chosen_option_ids: &[Uuid],
    ) -> Result<GroceryReport> {
        let rows = recipes::list_requirements_for_options(&mut *conn, chosen_option_ids)
            .await
            .with_context(|| format!("failed to expand chosen options of meal plan {meal_plan_id}"))?;
        let table = ConversionTable::new(
            &conversions::list_unit_conversions(&mut *conn)
                .await
                .context("failed to load unit conversions")?,
        );

        let (requirements, skipped) = aggregate::expand(&rows);
        for line in &skipped {
            tracing::warn!(
                meal_plan_id = %meal_plan_id,
                option_id = %line.meal_plan_option_id,
                recipe_ingredient_id = %line.recipe_ingredient_id,
                ingredient_id = %line.ingredient,
                "recipe ingredient has no measurement unit, leaving it off the grocery list"
            );
        }

        let items = aggregate::aggregate(&requirements, &table);
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let outcome = grocery_list_items::upsert_grocery_list_item(
                conn,
                &NewGroceryListItem {
                    meal_plan_id,
                    valid_ingredient: item.ingredient,
                    valid_measurement_unit: item.unit,
                    minimum_quantity_needed: item.minimum,
                    maximum_quantity_needed: item.maximum,
                },
            )
            .await?;
            lines.push(GroceryLine { item, outcome });
        }

        let keep: Vec<(Uuid, Uuid)> = lines
            .iter()
            .map(|l| (l.item.ingredient, l.item.unit))
            .collect();
        let stale =
            grocery_list_items::retire_stale_grocery_list_items(conn, meal_plan_id, &keep).await?;
        if !stale.archived.is_empty() || !stale.zeroed.is_empty() {
            tracing::info!(
                meal_plan_id = %meal_plan_id,
                archived = stale.archived.len(),
                zeroed = stale.zeroed.len(),
                "retired grocery list items no longer needed"
            );
        }

        let report = GroceryReport {
            lines,
            skipped,
            stale,
        };
        tracing::debug!(
            meal_plan_id = %meal_plan_id,
            inserted = report.inserted(),
            updated = report.updated(),
            unchanged = report.unchanged(),
            skipped = report.skipped.len(),
            "grocery list generated"
        );
        Ok(report)
    }
}
