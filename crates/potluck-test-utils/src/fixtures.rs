//! Row builders for integration tests. Every helper panics on failure.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use potluck_db::models::{MealName, MealPlan, MealPlanEvent, MealPlanOption};
use potluck_db::queries::{events, households, meal_plans, options, recipes, votes};

/// One ingredient line of a fixture recipe.
#[derive(Debug, Clone, Copy)]
pub struct Line {
    pub ingredient: Uuid,
    pub unit: Uuid,
    pub minimum: f64,
    pub maximum: Option<f64>,
}

impl Line {
    pub fn new(ingredient: Uuid, unit: Uuid, minimum: f64) -> Self {
        Self {
            ingredient,
            unit,
            minimum,
            maximum: None,
        }
    }

    pub fn up_to(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }
}

/// A new household with `members` freshly-generated user IDs.
pub async fn household(pool: &PgPool, members: usize) -> (Uuid, Vec<Uuid>) {
    let household_id = Uuid::new_v4();
    let mut users = Vec::with_capacity(members);
    for _ in 0..members {
        let user = Uuid::new_v4();
        households::add_household_member(pool, household_id, user)
            .await
            .expect("add household member");
        users.push(user);
    }
    (household_id, users)
}

pub async fn ingredient(pool: &PgPool, name: &str) -> Uuid {
    recipes::insert_valid_ingredient(pool, name)
        .await
        .expect("insert ingredient")
        .id
}

pub async fn unit(pool: &PgPool, name: &str) -> Uuid {
    recipes::insert_valid_measurement_unit(pool, name)
        .await
        .expect("insert unit")
        .id
}

/// A meal made of one recipe (scale 1.0) holding `lines`.
pub async fn meal(pool: &PgPool, name: &str, lines: &[Line]) -> Uuid {
    meal_with_scale(pool, name, 1.0, lines).await
}

/// A meal made of one recipe at `recipe_scale` holding `lines`.
pub async fn meal_with_scale(pool: &PgPool, name: &str, recipe_scale: f64, lines: &[Line]) -> Uuid {
    let recipe = recipes::insert_recipe(pool, &format!("{name} recipe"))
        .await
        .expect("insert recipe");
    for line in lines {
        let mut new =
            recipes::NewRecipeIngredient::new(recipe.id, line.ingredient, line.unit, line.minimum);
        if let Some(max) = line.maximum {
            new = new.maximum(max);
        }
        recipes::insert_recipe_ingredient(pool, &new)
            .await
            .expect("insert recipe ingredient");
    }
    let meal = recipes::insert_meal(pool, name, "")
        .await
        .expect("insert meal");
    recipes::insert_meal_component(pool, meal.id, recipe.id, recipe_scale)
        .await
        .expect("insert meal component");
    meal.id
}

/// A plan awaiting votes with its deadline `deadline_in` from now.
pub async fn plan(pool: &PgPool, household_id: Uuid, deadline_in: Duration) -> MealPlan {
    plan_due_at(pool, household_id, Utc::now() + deadline_in).await
}

pub async fn plan_due_at(pool: &PgPool, household_id: Uuid, deadline: DateTime<Utc>) -> MealPlan {
    meal_plans::insert_meal_plan(pool, household_id, deadline, "")
        .await
        .expect("insert meal plan")
}

/// An event tomorrow.
pub async fn event(pool: &PgPool, meal_plan_id: Uuid, meal_name: MealName) -> MealPlanEvent {
    let starts_at = Utc::now() + Duration::days(1);
    events::insert_meal_plan_event(
        pool,
        &events::NewMealPlanEvent {
            meal_plan_id,
            meal_name,
            starts_at,
            ends_at: starts_at + Duration::hours(1),
            notes: "",
        },
    )
    .await
    .expect("insert meal plan event")
}

/// An option at meal scale 1.0.
pub async fn option(pool: &PgPool, event_id: Uuid, meal_id: Uuid) -> MealPlanOption {
    option_scaled(pool, event_id, meal_id, 1.0).await
}

pub async fn option_scaled(
    pool: &PgPool,
    event_id: Uuid,
    meal_id: Uuid,
    meal_scale: f64,
) -> MealPlanOption {
    options::insert_meal_plan_option(pool, event_id, meal_id, meal_scale, "")
        .await
        .expect("insert meal plan option")
}

/// Record a full ballot: `ranked[i]` gets rank `i`.
pub async fn ballot(pool: &PgPool, user: Uuid, ranked: &[Uuid]) {
    for (rank, option_id) in ranked.iter().enumerate() {
        let rank = i32::try_from(rank).expect("rank fits in i32");
        votes::insert_vote(pool, &votes::NewMealPlanOptionVote::ranked(*option_id, user, rank))
            .await
            .expect("insert vote");
    }
}

/// Record an abstention on every listed option.
pub async fn abstain(pool: &PgPool, user: Uuid, option_ids: &[Uuid]) {
    for option_id in option_ids {
        votes::insert_vote(pool, &votes::NewMealPlanOptionVote::abstain(*option_id, user))
            .await
            .expect("insert abstention");
    }
}
