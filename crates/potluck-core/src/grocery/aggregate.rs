//! Turning chosen options' recipe lines into grocery quantities.

use std::collections::BTreeMap;

use uuid::Uuid;

use potluck_db::queries::recipes::OptionIngredientRequirement;

use super::conversion::ConversionTable;

/// One scaled ingredient requirement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Requirement {
    pub ingredient: Uuid,
    pub unit: Uuid,
    pub minimum: f64,
    pub maximum: Option<f64>,
}

/// A recipe line that could not become a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedLine {
    pub meal_plan_option_id: Uuid,
    pub recipe_ingredient_id: Uuid,
    pub ingredient: Uuid,
}

/// Scale every usable line by `recipe_scale * meal_scale`.
///
/// Optional lines and lines without a valid ingredient are dropped quietly.
/// Lines with an ingredient but no measurement unit are returned as
/// skipped so the caller can report them.
pub fn expand(rows: &[OptionIngredientRequirement]) -> (Vec<Requirement>, Vec<SkippedLine>) {
    let mut requirements = Vec::with_capacity(rows.len());
    let mut skipped = Vec::new();

    for row in rows {
        if row.optional {
            continue;
        }
        let Some(ingredient) = row.valid_ingredient else {
            continue;
        };
        let Some(unit) = row.measurement_unit else {
            skipped.push(SkippedLine {
                meal_plan_option_id: row.meal_plan_option_id,
                recipe_ingredient_id: row.recipe_ingredient_id,
                ingredient,
            });
            continue;
        };

        let scale = row.recipe_scale * row.meal_scale;
        requirements.push(Requirement {
            ingredient,
            unit,
            minimum: row.minimum_quantity * scale,
            maximum: row.maximum_quantity.map(|max| max * scale),
        });
    }

    (requirements, skipped)
}

/// One grocery line after grouping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregatedItem {
    pub ingredient: Uuid,
    pub unit: Uuid,
    pub minimum: f64,
    /// Set only when every contributing requirement had a maximum.
    pub maximum: Option<f64>,
    pub contributions: usize,
}

#[derive(Debug, Default)]
struct Accumulator {
    minimum: f64,
    maximum: f64,
    bounded: bool,
    contributions: usize,
}

/// Group requirements by `(ingredient, unit)`, converting units where
/// `conversions` knows a path.
///
/// For each ingredient, units are visited by number of contributions
/// (most first), then by ID. A unit folds into the first canonical unit it
/// converts to; otherwise it becomes a canonical unit of its own, so
/// unconvertible units stay as separate lines. Output is ordered by
/// `(ingredient, unit)`.
pub fn aggregate(requirements: &[Requirement], conversions: &ConversionTable) -> Vec<AggregatedItem> {
    let mut unit_counts: BTreeMap<Uuid, BTreeMap<Uuid, usize>> = BTreeMap::new();
    for r in requirements {
        *unit_counts
            .entry(r.ingredient)
            .or_default()
            .entry(r.unit)
            .or_default() += 1;
    }

    let mut target: BTreeMap<(Uuid, Uuid), (Uuid, f64)> = BTreeMap::new();
    for (ingredient, counts) in &unit_counts {
        let mut units: Vec<(Uuid, usize)> = counts.iter().map(|(u, n)| (*u, *n)).collect();
        units.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut canonical: Vec<Uuid> = Vec::new();
        for (unit, _) in units {
            let folded = canonical.iter().find_map(|c| {
                conversions
                    .factor(*ingredient, unit, *c)
                    .map(|factor| (*c, factor))
            });
            match folded {
                Some(found) => {
                    target.insert((*ingredient, unit), found);
                }
                None => {
                    canonical.push(unit);
                    target.insert((*ingredient, unit), (unit, 1.0));
                }
            }
        }
    }

    let mut groups: BTreeMap<(Uuid, Uuid), Accumulator> = BTreeMap::new();
    for r in requirements {
        let (unit, factor) = target
            .get(&(r.ingredient, r.unit))
            .copied()
            .unwrap_or((r.unit, 1.0));
        let acc = groups.entry((r.ingredient, unit)).or_insert_with(|| Accumulator {
            bounded: true,
            ..Accumulator::default()
        });
        acc.minimum += r.minimum * factor;
        match r.maximum {
            Some(max) => acc.maximum += max * factor,
            None => acc.bounded = false,
        }
        acc.contributions += 1;
    }

    groups
        .into_iter()
        .map(|((ingredient, unit), acc)| AggregatedItem {
            ingredient,
            unit,
            minimum: acc.minimum,
            maximum: acc.bounded.then_some(acc.maximum),
            contributions: acc.contributions,
        })
        .collect()
}
