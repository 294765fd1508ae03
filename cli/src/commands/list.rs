use anyhow::Result;

use larder_core::service::{LarderService, RecipeSource};

use super::helpers::print_lines_table;

pub(crate) async fn cmd_list_build(
    svc: &LarderService,
    source: &dyn RecipeSource,
    user_id: i64,
    json: bool,
) -> Result<()> {
    let built = svc.build_shopping_list(source, user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&built)?);
    } else {
        let id = built.list.id;
        if built.lines.is_empty() {
            println!("Shopping list {id} is empty: no recipes need ingredients.");
        } else {
            println!("Shopping list {id}:");
            print_lines_table(&built.lines);
            println!("After shopping: larder reconcile {id} <ingredient_id>=<quantity>...");
        }
    }
    Ok(())
}

pub(crate) async fn cmd_list_show(svc: &LarderService, list_id: i64, json: bool) -> Result<()> {
    let list = svc.get_shopping_list(list_id).await?;
    let lines = svc.shopping_list_lines(list_id).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "list": list, "lines": lines }))?
        );
    } else {
        let state = if list.has_shopped { "shopped" } else { "open" };
        println!("Shopping list {list_id} ({state}, created {})", &list.created_at);
        if lines.is_empty() {
            println!("  (empty)");
        } else {
            print_lines_table(&lines);
        }
    }
    Ok(())
}

pub(crate) async fn cmd_list_open(svc: &LarderService, user_id: i64, json: bool) -> Result<()> {
    let lists = svc.open_shopping_lists(user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&lists)?);
    } else if lists.is_empty() {
        eprintln!("No open shopping lists.");
    } else {
        for list in &lists {
            println!("{}  created {}", list.id, list.created_at);
        }
    }
    Ok(())
}
