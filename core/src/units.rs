use serde::Serialize;

use crate::error::{LarderError, Result};

/// Measurement categories. Every quantity in a category normalizes into that
/// category's base unit before it is summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Volume,
    Mass,
    Count,
}

impl Category {
    #[must_use]
    pub const fn base_unit(self) -> &'static str {
        match self {
            Category::Volume => VOLUME_BASE,
            Category::Mass => MASS_BASE,
            Category::Count => COUNT_BASE,
        }
    }
}

pub const VOLUME_BASE: &str = "cup";
pub const MASS_BASE: &str = "g";
pub const COUNT_BASE: &str = "each";

const ML_PER_CUP: f64 = 236.588_236_5;

/// A quantity expressed in its category's base unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Normalized {
    pub amount: f64,
    pub category: Category,
}

impl Normalized {
    #[must_use]
    pub const fn base_unit(&self) -> &'static str {
        self.category.base_unit()
    }
}

/// Look up the category and multiplicative factor for a unit name.
///
/// Names are matched case-insensitively after trimming. An empty name is a
/// bare count ("2 eggs").
#[must_use]
pub fn lookup_unit(unit: &str) -> Option<(Category, f64)> {
    let lower = unit.trim().to_lowercase();
    let entry = match lower.as_str() {
        "cup" | "cups" => (Category::Volume, 1.0),
        "tablespoon" | "tablespoons" | "tbsp" | "tbsps" | "tbs" => {
            (Category::Volume, 1.0 / 16.0)
        }
        "teaspoon" | "teaspoons" | "tsp" | "tsps" => (Category::Volume, 1.0 / 48.0),
        "fluid ounce" | "fluid ounces" | "fl oz" | "fl. oz" | "fl. oz." => {
            (Category::Volume, 1.0 / 8.0)
        }
        "pint" | "pints" | "pt" => (Category::Volume, 2.0),
        "quart" | "quarts" | "qt" => (Category::Volume, 4.0),
        "gallon" | "gallons" | "gal" => (Category::Volume, 16.0),
        "milliliter" | "milliliters" | "millilitre" | "millilitres" | "ml" => {
            (Category::Volume, 1.0 / ML_PER_CUP)
        }
        "liter" | "liters" | "litre" | "litres" | "l" => (Category::Volume, 1000.0 / ML_PER_CUP),
        "pinch" | "pinches" => (Category::Volume, 1.0 / 768.0),
        "dash" | "dashes" => (Category::Volume, 1.0 / 384.0),

        "gram" | "grams" | "g" => (Category::Mass, 1.0),
        "kilogram" | "kilograms" | "kg" => (Category::Mass, 1000.0),
        "milligram" | "milligrams" | "mg" => (Category::Mass, 0.001),
        "ounce" | "ounces" | "oz" => (Category::Mass, 28.349_523_125),
        "pound" | "pounds" | "lb" | "lbs" => (Category::Mass, 453.592_37),

        "" | "each" | "ea" | "piece" | "pieces" | "serving" | "servings" | "whole" | "small"
        | "smalls" | "medium" | "mediums" | "large" | "larges" | "clove" | "cloves" | "slice"
        | "slices" | "can" | "cans" | "package" | "packages" | "pkg" | "bunch" | "bunches"
        | "head" | "heads" | "stalk" | "stalks" | "sprig" | "sprigs" | "leaf" | "leaves"
        | "handful" | "handfuls" | "stick" | "sticks" | "inch" | "inches" | "jar" | "jars"
        | "container" | "containers" | "bottle" | "bottles" | "strip" | "strips" | "fillet" | "fillets" | "box" | "boxes"
        | "bag" | "bags" | "drop" | "drops" | "ear" | "ears" | "packet" | "packets" | "pkt" => {
            (Category::Count, 1.0)
        }
        _ => return None,
    };
    Some(entry)
}

/// Normalize `amount` of `unit` into its category's base unit.
pub fn convert(amount: f64, unit: &str) -> Result<Normalized> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(LarderError::InvalidQuantity(amount));
    }
    let (category, factor) =
        lookup_unit(unit).ok_or_else(|| LarderError::UnrecognizedUnit(unit.to_string()))?;
    Ok(Normalized {
        amount: amount * factor,
        category,
    })
}
