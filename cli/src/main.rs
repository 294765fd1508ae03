mod commands;
mod config;
mod spoonacular;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_inventory, cmd_list_build, cmd_list_open, cmd_list_show, cmd_recipe_list,
    cmd_recipe_select, cmd_recipe_status, cmd_reconcile, cmd_search,
};
use crate::config::Config;
use crate::spoonacular::SpoonacularClient;
use larder_core::service::LarderService;

#[derive(Parser)]
#[command(
    name = "larder",
    version,
    about = "Turn planned recipes into a shopping list and keep the pantry in sync"
)]
struct Cli {
    /// Path to the database file (default: platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// User to act as
    #[arg(short, long, global = true, default_value_t = 1)]
    user: i64,
    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search Spoonacular for recipes
    Search {
        /// Search query
        query: String,
        /// Diet filter (e.g. "vegetarian", "ketogenic")
        #[arg(long)]
        diet: Option<String>,
        /// Intolerances to exclude (repeatable, e.g. --intolerance dairy)
        #[arg(long = "intolerance")]
        intolerances: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the recipes you are cooking
    Recipe {
        #[command(subcommand)]
        action: RecipeAction,
    },
    /// Build and inspect shopping lists
    List {
        #[command(subcommand)]
        action: ListAction,
    },
    /// Record what was bought on a shopping list and stock the pantry
    Reconcile {
        /// Shopping list ID
        list_id: i64,
        /// Purchases as <ingredient_id>=<quantity>, in the list's units
        items: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the pantry
    Inventory {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeAction {
    /// Mark recipes as needing ingredients
    Select {
        /// Spoonacular recipe IDs
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move a recipe forward: selected, need_ingredients, cooked
    Status {
        /// Spoonacular recipe ID
        recipe_id: i64,
        /// New status
        status: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List selected recipes and their status
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ListAction {
    /// Build a shopping list from every recipe that needs ingredients
    Build {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a shopping list
    Show {
        /// Shopping list ID
        list_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List shopping lists that have not been reconciled
    Open {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let user = cli.user;
    tracing::debug!(db = %config.db_path.display(), user, "opening database");

    let svc = LarderService::new(&config.db_path, config.service_options())?;

    match cli.command {
        Commands::Search {
            query,
            diet,
            intolerances,
            json,
        } => {
            let client = SpoonacularClient::new(config.api_key()?)?;
            cmd_search(&client, &query, diet.as_deref(), &intolerances, json).await
        }
        Commands::Recipe { action } => match action {
            RecipeAction::Select { ids, json } => cmd_recipe_select(&svc, user, &ids, json).await,
            RecipeAction::Status {
                recipe_id,
                status,
                json,
            } => cmd_recipe_status(&svc, user, recipe_id, &status, json).await,
            RecipeAction::List { json } => cmd_recipe_list(&svc, user, json).await,
        },
        Commands::List { action } => match action {
            ListAction::Build { json } => {
                let client = SpoonacularClient::new(config.api_key()?)?;
                cmd_list_build(&svc, &client, user, json).await
            }
            ListAction::Show { list_id, json } => cmd_list_show(&svc, list_id, json).await,
            ListAction::Open { json } => cmd_list_open(&svc, user, json).await,
        },
        Commands::Reconcile {
            list_id,
            items,
            json,
        } => cmd_reconcile(&svc, list_id, &items, json).await,
        Commands::Inventory { json } => cmd_inventory(&svc, user, json).await,
    }
}
