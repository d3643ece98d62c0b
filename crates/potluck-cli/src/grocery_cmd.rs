//! `potluck grocery-list` command: show or regenerate a plan's grocery list.

use anyhow::{Context, Result};
use uuid::Uuid;

use potluck_core::worker::FinalizationWorker;
use potluck_db::queries::grocery_list_items;

/// Print the live grocery list items of a plan, regenerating them first
/// when `regenerate` is set.
pub async fn run_grocery_list(
    worker: &FinalizationWorker,
    plan_id_str: &str,
    regenerate: bool,
) -> Result<()> {
    let plan_id =
        Uuid::parse_str(plan_id_str).with_context(|| format!("invalid plan ID: {plan_id_str}"))?;

    if regenerate {
        let report = worker.regenerate_grocery_list(plan_id).await?;
        println!(
            "Regenerated: {} inserted, {} updated, {} unchanged",
            report.inserted(),
            report.updated(),
            report.unchanged(),
        );
        for skipped in &report.skipped {
            println!(
                "  skipped recipe ingredient {} (ingredient {} has no unit)",
                skipped.recipe_ingredient_id, skipped.ingredient
            );
        }
    }

    let items =
        grocery_list_items::list_grocery_list_items_for_meal_plan(worker.pool(), plan_id).await?;
    if items.is_empty() {
        println!("No grocery list items for meal plan {plan_id}.");
        return Ok(());
    }

    println!(
        "{:<38} {:<38} {:>10} {:>10}  STATUS",
        "INGREDIENT", "UNIT", "MIN", "MAX"
    );
    for item in &items {
        let max = item
            .maximum_quantity_needed
            .map(|m| format!("{m:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<38} {:>10.2} {:>10}  {}",
            item.valid_ingredient,
            item.valid_measurement_unit,
            item.minimum_quantity_needed,
            max,
            item.status,
        );
    }

    Ok(())
}
