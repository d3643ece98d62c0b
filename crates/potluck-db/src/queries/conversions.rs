//! Database query functions for the `valid_measurement_unit_conversions`
//! table.

use anyhow::{Context, Result};
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::ValidMeasurementUnitConversion;

/// Parameters for inserting a unit conversion.
#[derive(Debug, Clone)]
pub struct NewUnitConversion {
    pub from_unit: Uuid,
    pub to_unit: Uuid,
    pub only_for_ingredient: Option<Uuid>,
    pub modifier: f64,
}

/// Insert a unit conversion.
pub async fn insert_unit_conversion<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewUnitConversion,
) -> Result<ValidMeasurementUnitConversion> {
    let conversion = sqlx::query_as::<_, ValidMeasurementUnitConversion>(
        "INSERT INTO valid_measurement_unit_conversions \
         (from_unit, to_unit, only_for_ingredient, modifier) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(new.from_unit)
    .bind(new.to_unit)
    .bind(new.only_for_ingredient)
    .bind(new.modifier)
    .fetch_one(executor)
    .await
    .with_context(|| {
        format!(
            "failed to insert conversion {} -> {}",
            new.from_unit, new.to_unit
        )
    })?;

    Ok(conversion)
}

/// List every live conversion, generic and ingredient-specific.
pub async fn list_unit_conversions<'e>(
    executor: impl PgExecutor<'e>,
) -> Result<Vec<ValidMeasurementUnitConversion>> {
    let conversions = sqlx::query_as::<_, ValidMeasurementUnitConversion>(
        "SELECT * FROM valid_measurement_unit_conversions \
         WHERE archived_at IS NULL \
         ORDER BY id ASC",
    )
    .fetch_all(executor)
    .await
    .context("failed to list unit conversions")?;

    Ok(conversions)
}
