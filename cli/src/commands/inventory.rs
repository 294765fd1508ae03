use anyhow::Result;

use larder_core::LarderError;
use larder_core::service::LarderService;

use super::helpers::{json_error, parse_purchases, print_inventory_table};

pub(crate) async fn cmd_reconcile(
    svc: &LarderService,
    list_id: i64,
    items: &[String],
    json: bool,
) -> Result<()> {
    let purchases = parse_purchases(items)?;

    match svc.reconcile_purchases(list_id, &purchases).await {
        Ok(summary) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Shopping list {list_id} reconciled: {} new, {} updated pantry item(s)",
                    summary.items_created, summary.items_updated
                );
            }
            Ok(())
        }
        Err(LarderError::DuplicateReconciliation(id)) if json => {
            println!(
                "{}",
                json_error(&format!("Shopping list {id} has already been reconciled"))
            );
            std::process::exit(3);
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn cmd_inventory(svc: &LarderService, user_id: i64, json: bool) -> Result<()> {
    let items = svc.inventory(user_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else if items.is_empty() {
        eprintln!("Pantry is empty. Reconcile a shopping list to stock it.");
    } else {
        print_inventory_table(&items);
    }
    Ok(())
}
