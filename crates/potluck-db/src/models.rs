use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Status of a meal plan. Moves forward only: `awaiting_votes -> finalized`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealPlanStatus {
    AwaitingVotes,
    Finalized,
}

impl MealPlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingVotes => "awaiting_votes",
            Self::Finalized => "finalized",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized)
    }
}

impl fmt::Display for MealPlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealPlanStatus {
    type Err = MealPlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_votes" => Ok(Self::AwaitingVotes),
            "finalized" => Ok(Self::Finalized),
            other => Err(MealPlanStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealPlanStatus`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid meal plan status: {0:?}")]
pub struct MealPlanStatusParseError(pub String);

// ---------------------------------------------------------------------------

/// The named meal a plan event is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MealName {
    Breakfast,
    SecondBreakfast,
    Brunch,
    Lunch,
    Supper,
    Dinner,
}

impl MealName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::SecondBreakfast => "second_breakfast",
            Self::Brunch => "brunch",
            Self::Lunch => "lunch",
            Self::Supper => "supper",
            Self::Dinner => "dinner",
        }
    }
}

impl fmt::Display for MealName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MealName {
    type Err = MealNameParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "breakfast" => Ok(Self::Breakfast),
            "second_breakfast" => Ok(Self::SecondBreakfast),
            "brunch" => Ok(Self::Brunch),
            "lunch" => Ok(Self::Lunch),
            "supper" => Ok(Self::Supper),
            "dinner" => Ok(Self::Dinner),
            other => Err(MealNameParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`MealName`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid meal name: {0:?}")]
pub struct MealNameParseError(pub String);

// ---------------------------------------------------------------------------

/// Purchase state of a grocery list item. The generator only ever creates
/// items as `needs_purchase`; the other states are set by the household.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GroceryListItemStatus {
    #[default]
    NeedsPurchase,
    AlreadyOwned,
    Purchased,
}

impl GroceryListItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NeedsPurchase => "needs_purchase",
            Self::AlreadyOwned => "already_owned",
            Self::Purchased => "purchased",
        }
    }
}

impl fmt::Display for GroceryListItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroceryListItemStatus {
    type Err = GroceryListItemStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs_purchase" => Ok(Self::NeedsPurchase),
            "already_owned" => Ok(Self::AlreadyOwned),
            "purchased" => Ok(Self::Purchased),
            other => Err(GroceryListItemStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`GroceryListItemStatus`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid grocery list item status: {0:?}")]
pub struct GroceryListItemStatusParseError(pub String);

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// A row in the `meal_plans` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlan {
    pub id: Uuid,
    pub notes: String,
    pub status: MealPlanStatus,
    pub voting_deadline: DateTime<Utc>,
    pub belongs_to_household: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `meal_plan_events` table: one meal slot of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanEvent {
    pub id: Uuid,
    pub belongs_to_meal_plan: Uuid,
    pub meal_name: MealName,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `meal_plan_options` table: one candidate meal for an event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanOption {
    pub id: Uuid,
    pub belongs_to_meal_plan_event: Uuid,
    pub meal_id: Uuid,
    /// Serving-scale multiplier applied to every recipe of the meal.
    pub meal_scale: f64,
    pub chosen: bool,
    pub tiebroken: bool,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `meal_plan_option_votes` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealPlanOptionVote {
    pub id: Uuid,
    pub belongs_to_meal_plan_option: Uuid,
    pub by_user: Uuid,
    /// 0 is most preferred. Meaningless when `abstain` is set.
    pub rank: i32,
    pub abstain: bool,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `household_user_memberships` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HouseholdUserMembership {
    pub id: Uuid,
    pub belongs_to_household: Uuid,
    pub belongs_to_user: Uuid,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `meals` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Meal {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `meal_components` table: one recipe of a meal.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealComponent {
    pub id: Uuid,
    pub belongs_to_meal: Uuid,
    pub recipe_id: Uuid,
    pub recipe_scale: f64,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `recipes` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `recipe_ingredients` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RecipeIngredient {
    pub id: Uuid,
    pub belongs_to_recipe: Uuid,
    /// `None` for intermediate products of an earlier recipe step.
    pub valid_ingredient: Option<Uuid>,
    pub measurement_unit: Option<Uuid>,
    pub minimum_quantity: f64,
    pub maximum_quantity: Option<f64>,
    pub optional: bool,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `valid_ingredients` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValidIngredient {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `valid_measurement_units` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValidMeasurementUnit {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `valid_measurement_unit_conversions` table.
///
/// `quantity_in_to_unit = quantity_in_from_unit * modifier`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ValidMeasurementUnitConversion {
    pub id: Uuid,
    pub from_unit: Uuid,
    pub to_unit: Uuid,
    pub only_for_ingredient: Option<Uuid>,
    pub modifier: f64,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

/// A row in the `grocery_list_items` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GroceryListItem {
    pub id: Uuid,
    pub belongs_to_meal_plan: Uuid,
    pub valid_ingredient: Uuid,
    pub valid_measurement_unit: Uuid,
    pub minimum_quantity_needed: f64,
    pub maximum_quantity_needed: Option<f64>,
    pub quantity_purchased: Option<f64>,
    pub purchased_measurement_unit: Option<Uuid>,
    pub purchased_upc: Option<String>,
    pub purchase_price: Option<f64>,
    pub status: GroceryListItemStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub archived_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meal_plan_status_display_roundtrip() {
        for v in [MealPlanStatus::AwaitingVotes, MealPlanStatus::Finalized] {
            let parsed: MealPlanStatus = v.to_string().parse().expect("should parse");
            assert_eq!(v, parsed);
        }
    }

    #[test]
    fn meal_plan_status_invalid() {
        let err = "voting".parse::<MealPlanStatus>().unwrap_err();
        assert_eq!(err.to_string(), "invalid meal plan status: \"voting\"");
    }

    #[test]
    fn only_finalized_is_terminal() {
        assert!(MealPlanStatus::Finalized.is_terminal());
        assert!(!MealPlanStatus::AwaitingVotes.is_terminal());
    }

    #[test]
    fn meal_name_accepts_snake_case_only() {
        assert_eq!(
            "second_breakfast".parse::<MealName>().unwrap(),
            MealName::SecondBreakfast
        );
        assert!("SecondBreakfast".parse::<MealName>().is_err());
        assert!("elevenses".parse::<MealName>().is_err());
    }

    #[test]
    fn grocery_status_defaults_to_needs_purchase() {
        assert_eq!(
            GroceryListItemStatus::default(),
            GroceryListItemStatus::NeedsPurchase
        );
        assert_eq!(
            "already_owned".parse::<GroceryListItemStatus>().unwrap(),
            GroceryListItemStatus::AlreadyOwned
        );
        assert!("unknown".parse::<GroceryListItemStatus>().is_err());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        let json = serde_json::to_string(&MealPlanStatus::AwaitingVotes).unwrap();
        assert_eq!(json, "\"awaiting_votes\"");
    }
}
