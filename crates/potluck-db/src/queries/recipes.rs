//! Database query functions for recipe reference data: `valid_ingredients`,
//! `valid_measurement_units`, `recipes`, `recipe_ingredients`, `meals` and
//! `meal_components`.
//!
//! Only the shape the grocery list generator reads is modelled here; recipe
//! authoring lives in the CRUD service.

use anyhow::{Context, Result};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::models::{
    Meal, MealComponent, Recipe, RecipeIngredient, ValidIngredient, ValidMeasurementUnit,
};

/// Insert a valid ingredient.
pub async fn insert_valid_ingredient<'e>(
    executor: impl PgExecutor<'e>,
    name: &str,
) -> Result<ValidIngredient> {
    let ingredient = sqlx::query_as::<_, ValidIngredient>(
        "INSERT INTO valid_ingredients (name) VALUES ($1) RETURNING *",
    )
    .bind(name)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert valid ingredient {name:?}"))?;

    Ok(ingredient)
}

/// Insert a valid measurement unit.
pub async fn insert_valid_measurement_unit<'e>(
    executor: impl PgExecutor<'e>,
    name: &str,
) -> Result<ValidMeasurementUnit> {
    let unit = sqlx::query_as::<_, ValidMeasurementUnit>(
        "INSERT INTO valid_measurement_units (name) VALUES ($1) RETURNING *",
    )
    .bind(name)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert valid measurement unit {name:?}"))?;

    Ok(unit)
}

/// Insert a recipe.
pub async fn insert_recipe<'e>(executor: impl PgExecutor<'e>, name: &str) -> Result<Recipe> {
    let recipe = sqlx::query_as::<_, Recipe>("INSERT INTO recipes (name) VALUES ($1) RETURNING *")
        .bind(name)
        .fetch_one(executor)
        .await
        .with_context(|| format!("failed to insert recipe {name:?}"))?;

    Ok(recipe)
}

/// Parameters for inserting a recipe ingredient row.
#[derive(Debug, Clone)]
pub struct NewRecipeIngredient {
    pub recipe_id: Uuid,
    pub valid_ingredient: Option<Uuid>,
    pub measurement_unit: Option<Uuid>,
    pub minimum_quantity: f64,
    pub maximum_quantity: Option<f64>,
    pub optional: bool,
}

impl NewRecipeIngredient {
    /// A required ingredient with a minimum quantity only.
    pub fn new(recipe_id: Uuid, ingredient_id: Uuid, unit_id: Uuid, minimum_quantity: f64) -> Self {
        Self {
            recipe_id,
            valid_ingredient: Some(ingredient_id),
            measurement_unit: Some(unit_id),
            minimum_quantity,
            maximum_quantity: None,
            optional: false,
        }
    }

    /// Set the upper bound.
    pub fn maximum(mut self, maximum_quantity: f64) -> Self {
        self.maximum_quantity = Some(maximum_quantity);
        self
    }

    /// Mark the ingredient as optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Insert a recipe ingredient row.
pub async fn insert_recipe_ingredient<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewRecipeIngredient,
) -> Result<RecipeIngredient> {
    let ingredient = sqlx::query_as::<_, RecipeIngredient>(
        "INSERT INTO recipe_ingredients \
         (belongs_to_recipe, valid_ingredient, measurement_unit, minimum_quantity, maximum_quantity, optional) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING *",
    )
    .bind(new.recipe_id)
    .bind(new.valid_ingredient)
    .bind(new.measurement_unit)
    .bind(new.minimum_quantity)
    .bind(new.maximum_quantity)
    .bind(new.optional)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert ingredient for recipe {}", new.recipe_id))?;

    Ok(ingredient)
}

/// Insert a meal.
pub async fn insert_meal<'e>(
    executor: impl PgExecutor<'e>,
    name: &str,
    description: &str,
) -> Result<Meal> {
    let meal = sqlx::query_as::<_, Meal>(
        "INSERT INTO meals (name, description) VALUES ($1, $2) RETURNING *",
    )
    .bind(name)
    .bind(description)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert meal {name:?}"))?;

    Ok(meal)
}

/// Attach a recipe to a meal with a per-component scale.
pub async fn insert_meal_component<'e>(
    executor: impl PgExecutor<'e>,
    meal_id: Uuid,
    recipe_id: Uuid,
    recipe_scale: f64,
) -> Result<MealComponent> {
    let component = sqlx::query_as::<_, MealComponent>(
        "INSERT INTO meal_components (belongs_to_meal, recipe_id, recipe_scale) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(meal_id)
    .bind(recipe_id)
    .bind(recipe_scale)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to attach recipe {recipe_id} to meal {meal_id}"))?;

    Ok(component)
}

/// One recipe ingredient line reached from a meal plan option, with the
/// scales that apply to it.
#[derive(Debug, Clone, FromRow)]
pub struct OptionIngredientRequirement {
    pub meal_plan_option_id: Uuid,
    pub meal_scale: f64,
    pub recipe_id: Uuid,
    pub recipe_scale: f64,
    pub recipe_ingredient_id: Uuid,
    pub valid_ingredient: Option<Uuid>,
    pub measurement_unit: Option<Uuid>,
    pub minimum_quantity: f64,
    pub maximum_quantity: Option<f64>,
    pub optional: bool,
}

/// Expand a set of meal plan options into their recipe ingredient lines
/// (option -> meal -> components -> recipes -> ingredients).
///
/// Archived components, recipes and ingredients are skipped. Rows are
/// returned in a stable order so downstream sums are reproducible.
pub async fn list_requirements_for_options<'e>(
    executor: impl PgExecutor<'e>,
    option_ids: &[Uuid],
) -> Result<Vec<OptionIngredientRequirement>> {
    let rows = sqlx::query_as::<_, OptionIngredientRequirement>(
        "SELECT o.id AS meal_plan_option_id, \
                o.meal_scale, \
                r.id AS recipe_id, \
                mc.recipe_scale, \
                ri.id AS recipe_ingredient_id, \
                ri.valid_ingredient, \
                ri.measurement_unit, \
                ri.minimum_quantity, \
                ri.maximum_quantity, \
                ri.optional \
         FROM meal_plan_options o \
         JOIN meal_components mc ON mc.belongs_to_meal = o.meal_id AND mc.archived_at IS NULL \
         JOIN recipes r ON r.id = mc.recipe_id AND r.archived_at IS NULL \
         JOIN recipe_ingredients ri ON ri.belongs_to_recipe = r.id AND ri.archived_at IS NULL \
         WHERE o.id = ANY($1) \
         ORDER BY o.id ASC, mc.id ASC, ri.id ASC",
    )
    .bind(option_ids)
    .fetch_all(executor)
    .await
    .context("failed to list ingredient requirements for meal plan options")?;

    Ok(rows)
}
