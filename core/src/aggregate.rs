use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use serde::Serialize;

use crate::error::{LarderError, Result};
use crate::models::IngredientRecord;
use crate::units::{self, Category};

/// Total need for one ingredient across every recipe in a build.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedIngredient {
    pub total_amount: f64,
    pub category: Category,
    pub display_name: String,
}

impl AggregatedIngredient {
    #[must_use]
    pub const fn base_unit(&self) -> &'static str {
        self.category.base_unit()
    }
}

/// Fold ingredient records from any number of recipes into one total per
/// ingredient id.
///
/// The result does not depend on record order: totals are sums, a unit
/// conflict is detected whichever record arrives second, and when recipes
/// disagree on a display name the alphabetically smallest one is kept.
pub fn aggregate<'a, I>(records: I) -> Result<BTreeMap<i64, AggregatedIngredient>>
where
    I: IntoIterator<Item = &'a IngredientRecord>,
{
    let mut totals: BTreeMap<i64, AggregatedIngredient> = BTreeMap::new();

    for record in records {
        let normalized = units::convert(record.raw_amount, &record.raw_unit)?;

        match totals.entry(record.external_id) {
            Entry::Vacant(slot) => {
                slot.insert(AggregatedIngredient {
                    total_amount: normalized.amount,
                    category: normalized.category,
                    display_name: record.display_name.clone(),
                });
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.category != normalized.category {
                    return Err(LarderError::ConflictingUnits {
                        ingredient_id: record.external_id,
                        existing: existing.base_unit().to_string(),
                        incoming: normalized.base_unit().to_string(),
                    });
                }
                existing.total_amount += normalized.amount;
                if record.display_name < existing.display_name {
                    existing.display_name.clone_from(&record.display_name);
                }
            }
        }
    }

    Ok(totals)
}
