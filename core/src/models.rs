use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LarderError;

/// One ingredient line of one recipe, as the recipe provider reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRecord {
    pub external_id: i64,
    pub display_name: String,
    pub raw_amount: f64,
    pub raw_unit: String,
}

impl IngredientRecord {
    #[must_use]
    pub fn new(
        external_id: i64,
        display_name: impl Into<String>,
        raw_amount: f64,
        raw_unit: impl Into<String>,
    ) -> Self {
        Self {
            external_id,
            display_name: display_name.into(),
            raw_amount,
            raw_unit: raw_unit.into(),
        }
    }
}

/// Where a selected recipe sits in the cooking cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeStatus {
    Selected,
    NeedsIngredients,
    Cooked,
}

impl RecipeStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RecipeStatus::Selected => "selected",
            RecipeStatus::NeedsIngredients => "need_ingredients",
            RecipeStatus::Cooked => "cooked",
        }
    }

    const fn rank(self) -> u8 {
        match self {
            RecipeStatus::Selected => 0,
            RecipeStatus::NeedsIngredients => 1,
            RecipeStatus::Cooked => 2,
        }
    }

    /// Only forward moves are allowed; skipping a stage is fine.
    #[must_use]
    pub const fn can_transition_to(self, next: RecipeStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for RecipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecipeStatus {
    type Err = LarderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "selected" => Ok(RecipeStatus::Selected),
            "need_ingredients" | "needs_ingredients" => Ok(RecipeStatus::NeedsIngredients),
            "cooked" => Ok(RecipeStatus::Cooked),
            _ => Err(LarderError::UnknownStatus(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRecipe {
    pub user_id: i64,
    pub recipe_id: i64,
    pub status: RecipeStatus,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub base_unit: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingList {
    pub id: i64,
    pub user_id: i64,
    pub has_shopped: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shopped_at: Option<String>,
}

/// A display-ready shopping list row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShoppingListLine {
    pub ingredient_id: i64,
    pub quantity: f64,
    pub unit: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuiltShoppingList {
    pub list: ShoppingList,
    pub lines: Vec<ShoppingListLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryItem {
    pub user_id: i64,
    pub ingredient_id: i64,
    pub name: String,
    pub base_unit: String,
    pub quantity: f64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileSummary {
    pub list_id: i64,
    pub user_id: i64,
    pub items_created: usize,
    pub items_updated: usize,
}
