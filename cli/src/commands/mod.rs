mod helpers;
mod inventory;
mod list;
mod recipe;
mod search;

pub(crate) use inventory::{cmd_inventory, cmd_reconcile};
pub(crate) use list::{cmd_list_build, cmd_list_open, cmd_list_show};
pub(crate) use recipe::{cmd_recipe_list, cmd_recipe_select, cmd_recipe_status};
pub(crate) use search::cmd_search;
