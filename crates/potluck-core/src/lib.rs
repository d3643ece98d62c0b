//! Meal plan finalization and grocery list generation.
//!
//! The pure pieces ([`tally`], [`finalize`], [`grocery::aggregate`],
//! [`grocery::conversion`]) take persisted rows and return decisions without
//! touching storage. [`worker`] runs them against PostgreSQL, and
//! [`publish`] / [`trigger`] carry messages in and out.

pub mod finalize;
pub mod grocery;
pub mod publish;
pub mod tally;
pub mod trigger;
pub mod worker;
