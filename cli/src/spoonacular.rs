use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use larder_core::models::IngredientRecord;
use larder_core::service::RecipeSource;
use larder_core::spoonacular::{
    RecipeInformation, RecipeSummary, SearchResponse, recipe_to_records,
};

const API_BASE: &str = "https://api.spoonacular.com";

pub struct SpoonacularClient {
    client: reqwest::Client,
    api_key: String,
}

impl SpoonacularClient {
    pub fn new(api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "larder-cli/{} (meal planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
        })
    }

    pub async fn search_async(
        &self,
        query: &str,
        diet: Option<&str>,
        intolerances: &[String],
    ) -> Result<Vec<RecipeSummary>> {
        let intolerances = intolerances.join(",");
        let mut params = vec![("query", query), ("number", "10")];
        if let Some(diet) = diet {
            params.push(("diet", diet));
        }
        if !intolerances.is_empty() {
            params.push(("intolerances", intolerances.as_str()));
        }

        let resp = self
            .client
            .get(format!("{API_BASE}/recipes/complexSearch"))
            .query(&[("apiKey", self.api_key.as_str())])
            .query(&params)
            .send()
            .await
            .context("Failed to reach Spoonacular API")?
            .error_for_status()
            .context("Spoonacular rejected the search request")?;

        let data: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse Spoonacular search response")?;

        Ok(data.results)
    }

    pub async fn recipe_information(&self, recipe_id: i64) -> Result<RecipeInformation> {
        let resp = self
            .client
            .get(format!("{API_BASE}/recipes/{recipe_id}/information"))
            .query(&[("apiKey", self.api_key.as_str()), ("includeNutrition", "false")])
            .send()
            .await
            .with_context(|| format!("Failed to reach Spoonacular API for recipe {recipe_id}"))?
            .error_for_status()
            .with_context(|| format!("Spoonacular rejected the lookup of recipe {recipe_id}"))?;

        resp.json()
            .await
            .with_context(|| format!("Failed to parse Spoonacular recipe {recipe_id}"))
    }
}

#[async_trait]
impl RecipeSource for SpoonacularClient {
    async fn get_ingredients(&self, recipe_id: i64) -> Result<Vec<IngredientRecord>> {
        let recipe = self.recipe_information(recipe_id).await?;
        let records = recipe_to_records(recipe);
        debug!(recipe_id, ingredients = records.len(), "fetched recipe");
        Ok(records)
    }
}
