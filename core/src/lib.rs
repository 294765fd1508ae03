//! Ingredient normalization, shopping-list aggregation, and pantry
//! reconciliation for the larder meal planner.

pub mod aggregate;
pub mod db;
pub mod error;
pub mod models;
pub mod service;
pub mod spoonacular;
pub mod units;

pub use error::{LarderError, Result};
