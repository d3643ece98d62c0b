//! Measurement unit conversion lookups.
//!
//! A conversion row states `quantity_in_to = quantity_in_from * modifier`.
//! Lookups are single-hop: a pair of units is convertible when a row links
//! them in either direction.

use std::collections::BTreeMap;

use uuid::Uuid;

use potluck_db::models::ValidMeasurementUnitConversion;

#[derive(Debug, Clone, Default)]
pub struct ConversionTable {
    /// `(from, to)` -> modifier, usable for every ingredient.
    generic: BTreeMap<(Uuid, Uuid), f64>,
    /// `(ingredient, from, to)` -> modifier.
    specific: BTreeMap<(Uuid, Uuid, Uuid), f64>,
}

impl ConversionTable {
    /// Build a table from conversion rows. Rows with a non-positive or
    /// non-finite modifier are ignored; on duplicate keys the first row
    /// (in slice order) wins.
    pub fn new(conversions: &[ValidMeasurementUnitConversion]) -> Self {
        let mut table = Self::default();
        for c in conversions {
            if !(c.modifier.is_finite() && c.modifier > 0.0) {
                tracing::warn!(
                    conversion_id = %c.id,
                    modifier = c.modifier,
                    "ignoring unit conversion with unusable modifier"
                );
                continue;
            }
            match c.only_for_ingredient {
                Some(ingredient) => {
                    table
                        .specific
                        .entry((ingredient, c.from_unit, c.to_unit))
                        .or_insert(c.modifier);
                }
                None => {
                    table
                        .generic
                        .entry((c.from_unit, c.to_unit))
                        .or_insert(c.modifier);
                }
            }
        }
        table
    }

    /// Factor that turns a quantity of `ingredient` in `from` into `to`.
    ///
    /// Ingredient-specific rows are consulted before generic ones; the
    /// reverse direction of a row uses `1 / modifier`.
    pub fn factor(&self, ingredient: Uuid, from: Uuid, to: Uuid) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        if let Some(m) = self.specific.get(&(ingredient, from, to)) {
            return Some(*m);
        }
        if let Some(m) = self.specific.get(&(ingredient, to, from)) {
            return Some(1.0 / m);
        }
        if let Some(m) = self.generic.get(&(from, to)) {
            return Some(*m);
        }
        self.generic.get(&(to, from)).map(|m| 1.0 / m)
    }
}
