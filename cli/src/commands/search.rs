use anyhow::Result;
use std::process;
use tabled::{Table, Tabled, settings::Style};

use crate::spoonacular::SpoonacularClient;

use super::helpers::truncate;

pub(crate) async fn cmd_search(
    client: &SpoonacularClient,
    query: &str,
    diet: Option<&str>,
    intolerances: &[String],
    json: bool,
) -> Result<()> {
    let results = client.search_async(query, diet, intolerances).await?;

    if results.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found for '{query}'");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        #[derive(Tabled)]
        struct RecipeRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Title")]
            title: String,
        }

        let rows: Vec<RecipeRow> = results
            .iter()
            .map(|r| RecipeRow {
                id: r.id,
                title: truncate(&r.title, 60),
            })
            .collect();
        println!("{}", Table::new(&rows).with(Style::rounded()));
        println!("Select recipes with: larder recipe select <id>...");
    }

    Ok(())
}
