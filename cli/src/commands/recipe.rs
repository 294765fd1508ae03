use anyhow::Result;

use larder_core::models::RecipeStatus;
use larder_core::service::LarderService;

use super::helpers::print_recipes_table;

pub(crate) async fn cmd_recipe_select(
    svc: &LarderService,
    user_id: i64,
    recipe_ids: &[i64],
    json: bool,
) -> Result<()> {
    let pending = svc.select_recipes(user_id, recipe_ids).await?;

    if json {
        println!("{}", serde_json::json!({ "id": pending }));
    } else {
        let count = recipe_ids.len();
        println!("Selected {count} recipe(s). Shopping for {} recipe(s):", pending.len());
        for id in &pending {
            println!("  {id}");
        }
        println!("Build a shopping list with: larder list build");
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_status(
    svc: &LarderService,
    user_id: i64,
    recipe_id: i64,
    status: &str,
    json: bool,
) -> Result<()> {
    let status: RecipeStatus = status.parse()?;
    let recipe = svc.set_recipe_status(user_id, recipe_id, status).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        println!("Recipe {recipe_id} is now {}", recipe.status);
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_list(svc: &LarderService, user_id: i64, json: bool) -> Result<()> {
    let recipes = svc.list_user_recipes(user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
    } else if recipes.is_empty() {
        eprintln!("No recipes selected. Use `larder search` and `larder recipe select`.");
    } else {
        print_recipes_table(&recipes);
    }
    Ok(())
}
