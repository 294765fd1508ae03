use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LarderError>;

/// Entities that can be reported missing by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    ShoppingList,
    UserRecipe,
    Ingredient,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::ShoppingList => "shopping list",
            Entity::UserRecipe => "user recipe",
            Entity::Ingredient => "ingredient",
        })
    }
}

/// Every failure the core surfaces to its caller.
///
/// Each variant carries enough detail (unit, ingredient id, list id) for a
/// presentation layer to build a message without re-deriving anything.
#[derive(Debug, Error)]
pub enum LarderError {
    #[error("unrecognized unit '{0}'")]
    UnrecognizedUnit(String),

    #[error("invalid quantity {0}: must be a finite, non-negative number")]
    InvalidQuantity(f64),

    #[error("ingredient {ingredient_id} is measured in '{existing}' but a recipe uses '{incoming}'")]
    ConflictingUnits {
        ingredient_id: i64,
        existing: String,
        incoming: String,
    },

    #[error("failed to fetch ingredients for recipe {recipe_id}")]
    ExternalLookupFailure {
        recipe_id: i64,
        #[source]
        source: anyhow::Error,
    },

    #[error("shopping list {0} has already been reconciled")]
    DuplicateReconciliation(i64),

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    #[error("cannot move recipe from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("unknown recipe status '{0}'")]
    UnknownStatus(String),

    #[error("database error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl LarderError {
    #[must_use]
    pub fn not_found(entity: Entity, id: i64) -> Self {
        Self::NotFound { entity, id }
    }
}
