//! Storage layer for potluck: connection config, pool and migrations, row
//! models with their closed status enums, and typed query functions.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
