use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use larder_core::models::{InventoryItem, ShoppingListLine, UserRecipe};

/// Parse `"<ingredient_id>=<quantity>"` pairs into a purchase map. Repeated
/// ids are summed.
pub(crate) fn parse_purchases(items: &[String]) -> Result<BTreeMap<i64, f64>> {
    let mut purchases = BTreeMap::new();
    for item in items {
        let (id, qty) = item
            .split_once('=')
            .with_context(|| format!("Invalid purchase '{item}'. Use <ingredient_id>=<quantity>"))?;
        let id: i64 = id
            .trim()
            .parse()
            .with_context(|| format!("Invalid ingredient id in '{item}'"))?;
        let qty: f64 = qty
            .trim()
            .parse()
            .with_context(|| format!("Invalid quantity in '{item}'"))?;
        if !qty.is_finite() || qty < 0.0 {
            bail!("Quantity must be zero or more in '{item}'");
        }
        *purchases.entry(id).or_insert(0.0) += qty;
    }
    Ok(purchases)
}

/// Trim trailing zeros so `3.0` prints as `3` and `0.3333333` as `0.33`.
pub(crate) fn format_quantity(q: f64) -> String {
    let s = format!("{q:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

pub(crate) fn print_lines_table(lines: &[ShoppingListLine]) {
    #[derive(Tabled)]
    struct LineRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Ingredient")]
        name: String,
    }

    let rows: Vec<LineRow> = lines
        .iter()
        .map(|l| LineRow {
            id: l.ingredient_id,
            quantity: format_quantity(l.quantity),
            unit: l.unit.clone(),
            name: truncate(&l.name, 40),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_inventory_table(items: &[InventoryItem]) {
    #[derive(Tabled)]
    struct InventoryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "On hand")]
        quantity: String,
        #[tabled(rename = "Unit")]
        unit: String,
        #[tabled(rename = "Updated")]
        updated: String,
    }

    let rows: Vec<InventoryRow> = items
        .iter()
        .map(|i| InventoryRow {
            id: i.ingredient_id,
            name: truncate(&i.name, 40),
            quantity: format_quantity(i.quantity),
            unit: i.base_unit.clone(),
            updated: i.updated_at.chars().take(10).collect(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_recipes_table(recipes: &[UserRecipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "Recipe")]
        id: i64,
        #[tabled(rename = "Status")]
        status: String,
        #[tabled(rename = "Updated")]
        updated: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.recipe_id,
            status: r.status.to_string(),
            updated: r.updated_at.chars().take(10).collect(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{truncated}…")
    }
}

pub(crate) fn json_error(msg: &str) -> String {
    serde_json::json!({ "error": msg }).to_string()
}
