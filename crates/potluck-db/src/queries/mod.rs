pub mod conversions;
pub mod events;
pub mod grocery_list_items;
pub mod households;
pub mod meal_plans;
pub mod options;
pub mod recipes;
pub mod votes;
