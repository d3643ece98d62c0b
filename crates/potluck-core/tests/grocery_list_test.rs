//! Integration tests for grocery list generation through the worker.

use std::sync::Arc;

use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use potluck_core::publish::ChannelPublisher;
use potluck_core::worker::{FinalizationOutcome, FinalizationWorker, WorkerConfig};
use potluck_db::models::{GroceryListItem, GroceryListItemStatus, MealName};
use potluck_db::queries::conversions::{self, NewUnitConversion};
use potluck_db::queries::grocery_list_items::{self, PurchaseUpdate};
use potluck_db::queries::recipes::{self, NewRecipeIngredient};
use potluck_test_utils::fixtures::{self, Line};
use potluck_test_utils::{create_test_db, drop_test_db};

fn worker(pool: &PgPool) -> FinalizationWorker {
    // Messages are checked in finalization_test; with the receiver gone,
    // publishing only logs an error.
    let (publisher, _) = ChannelPublisher::new(1);
    FinalizationWorker::new(pool.clone(), Arc::new(publisher), WorkerConfig::default())
}

async fn items(pool: &PgPool, plan_id: Uuid) -> Vec<GroceryListItem> {
    grocery_list_items::list_grocery_list_items_for_meal_plan(pool, plan_id)
        .await
        .expect("list items")
}

fn find(items: &[GroceryListItem], ingredient: Uuid, unit: Uuid) -> &GroceryListItem {
    items
        .iter()
        .find(|i| i.valid_ingredient == ingredient && i.valid_measurement_unit == unit)
        .unwrap_or_else(|| panic!("no item for ({ingredient}, {unit})"))
}

/// A plan past its deadline with two events, each with a single option, so
/// finalization is fully determined.
struct TwoMeals {
    plan_id: Uuid,
    flour: Uuid,
    eggs: Uuid,
    butter: Uuid,
    gram: Uuid,
    each: Uuid,
}

async fn two_meals(pool: &PgPool) -> TwoMeals {
    let flour = fixtures::ingredient(pool, "flour").await;
    let eggs = fixtures::ingredient(pool, "egg").await;
    let butter = fixtures::ingredient(pool, "butter").await;
    let gram = fixtures::unit(pool, "gram").await;
    let each = fixtures::unit(pool, "each").await;

    let pancakes = fixtures::meal(
        pool,
        "pancakes",
        &[
            Line::new(flour, gram, 200.0).up_to(250.0),
            Line::new(eggs, each, 2.0).up_to(3.0),
        ],
    )
    .await;
    let pasta = fixtures::meal_with_scale(
        pool,
        "fresh pasta",
        2.0,
        &[
            Line::new(flour, gram, 100.0).up_to(125.0),
            Line::new(eggs, each, 1.0),
            Line::new(butter, gram, 25.0),
        ],
    )
    .await;

    let (household, _) = fixtures::household(pool, 0).await;
    let plan = fixtures::plan(pool, household, Duration::seconds(-1)).await;
    let breakfast = fixtures::event(pool, plan.id, MealName::Breakfast).await;
    let dinner = fixtures::event(pool, plan.id, MealName::Dinner).await;
    fixtures::option_scaled(pool, breakfast.id, pancakes, 1.5).await;
    fixtures::option(pool, dinner.id, pasta).await;

    TwoMeals {
        plan_id: plan.id,
        flour,
        eggs,
        butter,
        gram,
        each,
    }
}

#[tokio::test]
async fn quantities_are_scaled_and_summed() {
    let (pool, db_name) = create_test_db().await;
    let m = two_meals(&pool).await;

    let outcome = worker(&pool).finalize_plan(m.plan_id).await.expect("finalize");
    let FinalizationOutcome::Finalized(finalized) = outcome else {
        panic!("expected finalized, got {outcome:?}");
    };
    assert_eq!(finalized.grocery.inserted(), 3);

    let listed = items(&pool, m.plan_id).await;
    assert_eq!(listed.len(), 3);

    // 200 * 1.5 + 100 * 2.0
    let flour = find(&listed, m.flour, m.gram);
    assert_eq!(flour.minimum_quantity_needed, 500.0);
    assert_eq!(flour.maximum_quantity_needed, Some(625.0));

    // 2 * 1.5 + 1 * 2.0; the pasta line has no maximum.
    let eggs = find(&listed, m.eggs, m.each);
    assert_eq!(eggs.minimum_quantity_needed, 5.0);
    assert_eq!(eggs.maximum_quantity_needed, None);

    let butter = find(&listed, m.butter, m.gram);
    assert_eq!(butter.minimum_quantity_needed, 50.0);
    assert!(listed.iter().all(|i| i.status == GroceryListItemStatus::NeedsPurchase));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn regeneration_is_stable() {
    let (pool, db_name) = create_test_db().await;
    let m = two_meals(&pool).await;
    let worker = worker(&pool);
    worker.finalize_plan(m.plan_id).await.expect("finalize");
    let before = items(&pool, m.plan_id).await;

    let report = worker
        .regenerate_grocery_list(m.plan_id)
        .await
        .expect("regenerate");
    assert_eq!(report.inserted(), 0);
    assert_eq!(report.updated(), 0);
    assert_eq!(report.unchanged(), 3);
    assert_eq!(report.written_ids().count(), 0);

    let after = items(&pool, m.plan_id).await;
    assert_eq!(after.len(), before.len());
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.minimum_quantity_needed, b.minimum_quantity_needed);
        assert_eq!(a.maximum_quantity_needed, b.maximum_quantity_needed);
    }

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn regeneration_updates_quantities_and_keeps_purchases() {
    let (pool, db_name) = create_test_db().await;
    let m = two_meals(&pool).await;
    let worker = worker(&pool);
    worker.finalize_plan(m.plan_id).await.expect("finalize");

    let butter_id = find(&items(&pool, m.plan_id).await, m.butter, m.gram).id;
    grocery_list_items::record_purchase(
        &pool,
        butter_id,
        &PurchaseUpdate {
            status: GroceryListItemStatus::Purchased,
            quantity_purchased: Some(250.0),
            purchased_measurement_unit: Some(m.gram),
            purchased_upc: None,
            purchase_price: Some(3.25),
        },
    )
    .await
    .expect("record purchase")
    .expect("item exists");

    // The pasta recipe gains more butter.
    let extra = recipes::insert_recipe(&pool, "brown butter").await.expect("recipe");
    recipes::insert_recipe_ingredient(&pool, &NewRecipeIngredient::new(extra.id, m.butter, m.gram, 10.0))
        .await
        .expect("ingredient");
    let pasta_meal: Uuid = sqlx::query_scalar("SELECT id FROM meals WHERE name = 'fresh pasta'")
        .fetch_one(&pool)
        .await
        .expect("meal");
    recipes::insert_meal_component(&pool, pasta_meal, extra.id, 1.0)
        .await
        .expect("component");

    let report = worker
        .regenerate_grocery_list(m.plan_id)
        .await
        .expect("regenerate");
    assert_eq!(report.updated(), 1);
    assert_eq!(report.written_ids().collect::<Vec<_>>(), vec![butter_id]);

    let listed = items(&pool, m.plan_id).await;
    let butter = find(&listed, m.butter, m.gram);
    assert_eq!(butter.id, butter_id);
    assert_eq!(butter.minimum_quantity_needed, 60.0);
    assert_eq!(butter.status, GroceryListItemStatus::Purchased);
    assert_eq!(butter.quantity_purchased, Some(250.0));
    assert_eq!(butter.purchase_price, Some(3.25));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn regeneration_retires_items_whose_unit_changed() {
    let (pool, db_name) = create_test_db().await;
    let flour = fixtures::ingredient(&pool, "flour").await;
    let eggs = fixtures::ingredient(&pool, "egg").await;
    let gram = fixtures::unit(&pool, "gram").await;
    let kilogram = fixtures::unit(&pool, "kilogram").await;
    let each = fixtures::unit(&pool, "each").await;
    let dozen = fixtures::unit(&pool, "dozen").await;

    let bread = fixtures::meal(
        &pool,
        "bread",
        &[Line::new(flour, gram, 200.0), Line::new(eggs, each, 2.0)],
    )
    .await;
    let (household, _) = fixtures::household(&pool, 0).await;
    let plan = fixtures::plan(&pool, household, Duration::seconds(-1)).await;
    let event = fixtures::event(&pool, plan.id, MealName::Lunch).await;
    fixtures::option(&pool, event.id, bread).await;

    let worker = worker(&pool);
    worker.finalize_plan(plan.id).await.expect("finalize");
    let before = items(&pool, plan.id).await;
    let flour_gram = find(&before, flour, gram).id;
    let eggs_each = find(&before, eggs, each).id;
    grocery_list_items::record_purchase(
        &pool,
        eggs_each,
        &PurchaseUpdate {
            status: GroceryListItemStatus::Purchased,
            quantity_purchased: Some(2.0),
            ..PurchaseUpdate::default()
        },
    )
    .await
    .expect("record purchase")
    .expect("item exists");

    // Both recipe lines move to units with no conversion back.
    for (ingredient, unit, quantity) in [(flour, kilogram, 0.2), (eggs, dozen, 0.5)] {
        sqlx::query(
            "UPDATE recipe_ingredients SET measurement_unit = $1, minimum_quantity = $2 \
             WHERE valid_ingredient = $3",
        )
        .bind(unit)
        .bind(quantity)
        .bind(ingredient)
        .execute(&pool)
        .await
        .expect("update recipe line");
    }

    let report = worker
        .regenerate_grocery_list(plan.id)
        .await
        .expect("regenerate");
    assert_eq!(report.inserted(), 2);
    assert_eq!(report.archived_ids().collect::<Vec<_>>(), vec![flour_gram]);
    assert_eq!(report.stale.zeroed, vec![eggs_each]);

    let after = items(&pool, plan.id).await;
    assert_eq!(after.len(), 3);
    assert!(after.iter().all(|i| i.id != flour_gram));
    assert_eq!(find(&after, flour, kilogram).minimum_quantity_needed, 0.2);
    assert_eq!(find(&after, eggs, dozen).minimum_quantity_needed, 0.5);
    let kept = find(&after, eggs, each);
    assert_eq!(kept.minimum_quantity_needed, 0.0);
    assert_eq!(kept.status, GroceryListItemStatus::Purchased);
    assert_eq!(kept.quantity_purchased, Some(2.0));

    let again = worker
        .regenerate_grocery_list(plan.id)
        .await
        .expect("regenerate again");
    assert_eq!(again.unchanged(), 2);
    assert_eq!(again.written_ids().count(), 0);
    assert_eq!(again.archived_ids().count(), 0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn regeneration_requires_a_finalized_plan() {
    let (pool, db_name) = create_test_db().await;
    let (household, _) = fixtures::household(&pool, 0).await;
    let plan = fixtures::plan(&pool, household, Duration::hours(1)).await;
    let worker = worker(&pool);

    let err = worker
        .regenerate_grocery_list(plan.id)
        .await
        .expect_err("plan is still awaiting votes");
    assert!(format!("{err:#}").contains("only generated for finalized plans"));
    assert!(worker.regenerate_grocery_list(Uuid::new_v4()).await.is_err());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn convertible_units_share_one_line() {
    let (pool, db_name) = create_test_db().await;
    let sugar = fixtures::ingredient(&pool, "sugar").await;
    let gram = fixtures::unit(&pool, "gram").await;
    let kilogram = fixtures::unit(&pool, "kilogram").await;
    let cup = fixtures::unit(&pool, "cup").await;
    conversions::insert_unit_conversion(
        &pool,
        &NewUnitConversion {
            from_unit: kilogram,
            to_unit: gram,
            only_for_ingredient: None,
            modifier: 1000.0,
        },
    )
    .await
    .expect("conversion");

    let cake = fixtures::meal(
        &pool,
        "cake",
        &[
            Line::new(sugar, gram, 150.0),
            Line::new(sugar, gram, 50.0),
            Line::new(sugar, kilogram, 0.25),
            Line::new(sugar, cup, 1.0),
        ],
    )
    .await;
    let (household, _) = fixtures::household(&pool, 0).await;
    let plan = fixtures::plan(&pool, household, Duration::seconds(-1)).await;
    let event = fixtures::event(&pool, plan.id, MealName::Supper).await;
    fixtures::option(&pool, event.id, cake).await;

    worker(&pool).finalize_plan(plan.id).await.expect("finalize");

    let listed = items(&pool, plan.id).await;
    assert_eq!(listed.len(), 2);
    assert_eq!(find(&listed, sugar, gram).minimum_quantity_needed, 450.0);
    assert_eq!(find(&listed, sugar, cup).minimum_quantity_needed, 1.0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn unusable_recipe_lines_are_skipped() {
    let (pool, db_name) = create_test_db().await;
    let oil = fixtures::ingredient(&pool, "oil").await;
    let basil = fixtures::ingredient(&pool, "basil").await;
    let pepper = fixtures::ingredient(&pool, "pepper").await;
    let ml = fixtures::unit(&pool, "millilitre").await;

    let recipe = recipes::insert_recipe(&pool, "pesto").await.expect("recipe");
    recipes::insert_recipe_ingredient(&pool, &NewRecipeIngredient::new(recipe.id, oil, ml, 60.0))
        .await
        .expect("oil");
    recipes::insert_recipe_ingredient(
        &pool,
        &NewRecipeIngredient::new(recipe.id, pepper, ml, 1.0).optional(),
    )
    .await
    .expect("pepper");
    recipes::insert_recipe_ingredient(
        &pool,
        &NewRecipeIngredient {
            measurement_unit: None,
            ..NewRecipeIngredient::new(recipe.id, basil, ml, 1.0)
        },
    )
    .await
    .expect("basil");
    recipes::insert_recipe_ingredient(
        &pool,
        &NewRecipeIngredient {
            valid_ingredient: None,
            ..NewRecipeIngredient::new(recipe.id, oil, ml, 5.0)
        },
    )
    .await
    .expect("product line");
    let meal = recipes::insert_meal(&pool, "pesto pasta", "").await.expect("meal");
    recipes::insert_meal_component(&pool, meal.id, recipe.id, 1.0)
        .await
        .expect("component");

    let (household, _) = fixtures::household(&pool, 0).await;
    let plan = fixtures::plan(&pool, household, Duration::seconds(-1)).await;
    let event = fixtures::event(&pool, plan.id, MealName::Lunch).await;
    fixtures::option(&pool, event.id, meal.id).await;

    let outcome = worker(&pool).finalize_plan(plan.id).await.expect("finalize");
    let FinalizationOutcome::Finalized(finalized) = outcome else {
        panic!("expected finalized, got {outcome:?}");
    };
    assert_eq!(finalized.grocery.skipped.len(), 1);
    assert_eq!(finalized.grocery.skipped[0].ingredient, basil);

    let listed = items(&pool, plan.id).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(find(&listed, oil, ml).minimum_quantity_needed, 60.0);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn only_chosen_options_reach_the_list() {
    let (pool, db_name) = create_test_db().await;
    let rice = fixtures::ingredient(&pool, "rice").await;
    let noodles = fixtures::ingredient(&pool, "noodles").await;
    let gram = fixtures::unit(&pool, "gram").await;
    let risotto = fixtures::meal(&pool, "risotto", &[Line::new(rice, gram, 300.0)]).await;
    let ramen = fixtures::meal(&pool, "ramen", &[Line::new(noodles, gram, 200.0)]).await;

    let (household, members) = fixtures::household(&pool, 1).await;
    let plan = fixtures::plan(&pool, household, Duration::hours(1)).await;
    let event = fixtures::event(&pool, plan.id, MealName::Dinner).await;
    let a = fixtures::option(&pool, event.id, risotto).await;
    let b = fixtures::option(&pool, event.id, ramen).await;
    fixtures::ballot(&pool, members[0], &[b.id, a.id]).await;

    worker(&pool).finalize_plan(plan.id).await.expect("finalize");

    let listed = items(&pool, plan.id).await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].valid_ingredient, noodles);
    assert_eq!(listed[0].minimum_quantity_needed, 200.0);

    pool.close().await;
    drop_test_db(&db_name).await;
}
