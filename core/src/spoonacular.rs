use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::IngredientRecord;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<RecipeSummary>,
    #[serde(default)]
    pub total_results: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeInformation {
    pub id: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub extended_ingredients: Vec<ExtendedIngredient>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedIngredient {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub amount: Option<f64>,
    pub unit: Option<String>,
    pub unit_long: Option<String>,
}

/// Map a provider ingredient to an aggregation record.
///
/// The long unit name is preferred, falling back to the short one. Lines
/// without an ingredient id cannot be joined across recipes and are dropped.
#[must_use]
pub fn ingredient_to_record(i: ExtendedIngredient) -> Option<IngredientRecord> {
    let external_id = i.id.filter(|id| *id > 0)?;
    let name = i.name.filter(|n| !n.trim().is_empty())?;
    let unit = i
        .unit_long
        .filter(|u| !u.trim().is_empty())
        .or(i.unit)
        .unwrap_or_default();

    Some(IngredientRecord {
        external_id,
        display_name: name,
        raw_amount: i.amount.unwrap_or(0.0),
        raw_unit: unit,
    })
}

/// All usable ingredient records of a recipe.
#[must_use]
pub fn recipe_to_records(recipe: RecipeInformation) -> Vec<IngredientRecord> {
    let recipe_id = recipe.id;
    recipe
        .extended_ingredients
        .into_iter()
        .filter_map(|i| {
            let record = ingredient_to_record(i);
            if record.is_none() {
                warn!(recipe_id, "skipping ingredient without id or name");
            }
            record
        })
        .collect()
}
