use std::collections::BTreeMap;
use std::path::Path;

use chrono::Local;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};

use crate::aggregate::AggregatedIngredient;
use crate::error::{Entity, LarderError, Result};
use crate::models::{
    Ingredient, InventoryItem, RecipeStatus, ReconcileSummary, ShoppingList, ShoppingListLine,
    UserRecipe,
};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    base_unit TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_recipes (
                    user_id INTEGER NOT NULL,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id),
                    status TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, recipe_id)
                );

                CREATE TABLE IF NOT EXISTS shopping_lists (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    has_shopped INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    shopped_at TEXT
                );

                CREATE TABLE IF NOT EXISTS list_ingredients (
                    list_id INTEGER NOT NULL REFERENCES shopping_lists(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    aggregate_quantity REAL NOT NULL CHECK (aggregate_quantity >= 0),
                    PRIMARY KEY (list_id, ingredient_id)
                );

                CREATE TABLE IF NOT EXISTS inventory (
                    user_id INTEGER NOT NULL,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    quantity REAL NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, ingredient_id)
                );

                CREATE INDEX IF NOT EXISTS idx_user_recipes_status ON user_recipes(user_id, status);
                CREATE INDEX IF NOT EXISTS idx_shopping_lists_user ON shopping_lists(user_id, has_shopped);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn shopping_list_from_row(row: &rusqlite::Row) -> rusqlite::Result<ShoppingList> {
        Ok(ShoppingList {
            id: row.get(0)?,
            user_id: row.get(1)?,
            has_shopped: row.get(2)?,
            created_at: row.get(3)?,
            shopped_at: row.get(4)?,
        })
    }

    fn user_recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<(i64, i64, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
    }

    fn to_user_recipe(
        (user_id, recipe_id, status, updated_at): (i64, i64, String, String),
    ) -> Result<UserRecipe> {
        Ok(UserRecipe {
            user_id,
            recipe_id,
            status: status.parse()?,
            updated_at,
        })
    }

    // --- Recipes ---

    /// Record recipe selections for a user. Unknown recipes are created on the
    /// fly, and re-selecting a recipe starts its cycle over at `status`.
    pub fn select_recipes(
        &self,
        user_id: i64,
        recipe_ids: &[i64],
        status: RecipeStatus,
    ) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        for recipe_id in recipe_ids {
            tx.execute(
                "INSERT OR IGNORE INTO recipes (id, created_at) VALUES (?1, ?2)",
                params![recipe_id, now],
            )?;
            tx.execute(
                "INSERT INTO user_recipes (user_id, recipe_id, status, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, recipe_id) DO UPDATE SET
                    status = excluded.status, updated_at = excluded.updated_at",
                params![user_id, recipe_id, status.as_str(), now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_user_recipe(&self, user_id: i64, recipe_id: i64) -> Result<Option<UserRecipe>> {
        self.conn
            .query_row(
                "SELECT user_id, recipe_id, status, updated_at FROM user_recipes
                 WHERE user_id = ?1 AND recipe_id = ?2",
                params![user_id, recipe_id],
                Self::user_recipe_from_row,
            )
            .optional()?
            .map(Self::to_user_recipe)
            .transpose()
    }

    /// Move a user's recipe to `status`, provided its current status is still
    /// `expected`. Returns false when another writer got there first.
    pub fn update_user_recipe_status(
        &self,
        user_id: i64,
        recipe_id: i64,
        expected: RecipeStatus,
        status: RecipeStatus,
    ) -> Result<bool> {
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "UPDATE user_recipes SET status = ?1, updated_at = ?2
             WHERE user_id = ?3 AND recipe_id = ?4 AND status = ?5",
            params![status.as_str(), now, user_id, recipe_id, expected.as_str()],
        )?;
        Ok(rows > 0)
    }

    pub fn list_user_recipes(&self, user_id: i64) -> Result<Vec<UserRecipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, recipe_id, status, updated_at FROM user_recipes
             WHERE user_id = ?1 ORDER BY recipe_id",
        )?;
        let rows = stmt
            .query_map(params![user_id], Self::user_recipe_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Self::to_user_recipe).collect()
    }

    /// Recipe ids the user still needs to shop for.
    pub fn pending_recipe_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            "SELECT recipe_id FROM user_recipes
             WHERE user_id = ?1 AND status = ?2 ORDER BY recipe_id",
        )?;
        let ids = stmt
            .query_map(
                params![user_id, RecipeStatus::NeedsIngredients.as_str()],
                |row| row.get(0),
            )?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    // --- Ingredients ---

    pub fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, name, base_unit FROM ingredients WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Ingredient {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        base_unit: row.get(2)?,
                    })
                },
            )
            .optional()?)
    }

    // --- Shopping lists ---

    /// Create a shopping list with one line per aggregated ingredient, adding
    /// missing ingredient master rows on the way. All of it commits together
    /// or not at all.
    ///
    /// An ingredient that already exists keeps its name and base unit; if the
    /// aggregated unit differs from the stored one the whole list is rejected.
    pub fn create_shopping_list(
        &self,
        user_id: i64,
        items: &BTreeMap<i64, AggregatedIngredient>,
    ) -> Result<ShoppingList> {
        let now = Local::now().to_rfc3339();
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO shopping_lists (user_id, has_shopped, created_at) VALUES (?1, 0, ?2)",
            params![user_id, now],
        )?;
        let list_id = tx.last_insert_rowid();

        for (ingredient_id, item) in items {
            tx.execute(
                "INSERT OR IGNORE INTO ingredients (id, name, base_unit) VALUES (?1, ?2, ?3)",
                params![ingredient_id, item.display_name, item.base_unit()],
            )?;
            let stored_unit: String = tx.query_row(
                "SELECT base_unit FROM ingredients WHERE id = ?1",
                params![ingredient_id],
                |row| row.get(0),
            )?;
            if stored_unit != item.base_unit() {
                return Err(LarderError::ConflictingUnits {
                    ingredient_id: *ingredient_id,
                    existing: stored_unit,
                    incoming: item.base_unit().to_string(),
                });
            }
            tx.execute(
                "INSERT INTO list_ingredients (list_id, ingredient_id, aggregate_quantity)
                 VALUES (?1, ?2, ?3)",
                params![list_id, ingredient_id, item.total_amount],
            )?;
        }

        tx.commit()?;

        Ok(ShoppingList {
            id: list_id,
            user_id,
            has_shopped: false,
            created_at: now,
            shopped_at: None,
        })
    }

    pub fn get_shopping_list(&self, list_id: i64) -> Result<Option<ShoppingList>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, user_id, has_shopped, created_at, shopped_at
                 FROM shopping_lists WHERE id = ?1",
                params![list_id],
                Self::shopping_list_from_row,
            )
            .optional()?)
    }

    /// Lists the user has not shopped for yet, newest first.
    pub fn open_shopping_lists(&self, user_id: i64) -> Result<Vec<ShoppingList>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, has_shopped, created_at, shopped_at
             FROM shopping_lists
             WHERE user_id = ?1 AND has_shopped = 0
             ORDER BY id DESC",
        )?;
        let lists = stmt
            .query_map(params![user_id], Self::shopping_list_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lists)
    }

    /// Lines of a list, ordered by ingredient name ignoring case.
    pub fn shopping_list_lines(&self, list_id: i64) -> Result<Vec<ShoppingListLine>> {
        let mut stmt = self.conn.prepare(
            "SELECT li.ingredient_id, li.aggregate_quantity, i.base_unit, i.name
             FROM list_ingredients li
             JOIN ingredients i ON li.ingredient_id = i.id
             WHERE li.list_id = ?1",
        )?;
        let mut lines = stmt
            .query_map(params![list_id], |row| {
                Ok(ShoppingListLine {
                    ingredient_id: row.get(0)?,
                    quantity: row.get(1)?,
                    unit: row.get(2)?,
                    name: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        lines.sort_by_cached_key(|l| (l.name.to_lowercase(), l.ingredient_id));
        Ok(lines)
    }

    // --- Inventory ---

    fn inventory_from_row(row: &rusqlite::Row) -> rusqlite::Result<InventoryItem> {
        Ok(InventoryItem {
            user_id: row.get(0)?,
            ingredient_id: row.get(1)?,
            name: row.get(2)?,
            base_unit: row.get(3)?,
            quantity: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    pub fn get_inventory_item(
        &self,
        user_id: i64,
        ingredient_id: i64,
    ) -> Result<Option<InventoryItem>> {
        Ok(self
            .conn
            .query_row(
                "SELECT inv.user_id, inv.ingredient_id, i.name, i.base_unit, inv.quantity, inv.updated_at
                 FROM inventory inv JOIN ingredients i ON inv.ingredient_id = i.id
                 WHERE inv.user_id = ?1 AND inv.ingredient_id = ?2",
                params![user_id, ingredient_id],
                Self::inventory_from_row,
            )
            .optional()?)
    }

    pub fn list_inventory(&self, user_id: i64) -> Result<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT inv.user_id, inv.ingredient_id, i.name, i.base_unit, inv.quantity, inv.updated_at
             FROM inventory inv JOIN ingredients i ON inv.ingredient_id = i.id
             WHERE inv.user_id = ?1",
        )?;
        let mut items = stmt
            .query_map(params![user_id], Self::inventory_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        items.sort_by_cached_key(|i| (i.name.to_lowercase(), i.ingredient_id));
        Ok(items)
    }

    /// Mark a list as shopped and add the purchased quantities to the owner's
    /// inventory, in one transaction.
    ///
    /// The open-to-shopped flip is a conditional update taken under an
    /// immediate (write) lock, so of two concurrent calls for the same list
    /// exactly one succeeds and the other sees `DuplicateReconciliation`.
    pub fn reconcile_purchases(
        &self,
        list_id: i64,
        purchases: &BTreeMap<i64, f64>,
    ) -> Result<ReconcileSummary> {
        let now = Local::now().to_rfc3339();
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let flipped = tx.execute(
            "UPDATE shopping_lists SET has_shopped = 1, shopped_at = ?1
             WHERE id = ?2 AND has_shopped = 0",
            params![now, list_id],
        )?;
        if flipped == 0 {
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM shopping_lists WHERE id = ?1)",
                params![list_id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                LarderError::DuplicateReconciliation(list_id)
            } else {
                LarderError::not_found(Entity::ShoppingList, list_id)
            });
        }

        let user_id: i64 = tx.query_row(
            "SELECT user_id FROM shopping_lists WHERE id = ?1",
            params![list_id],
            |row| row.get(0),
        )?;

        let mut items_created = 0;
        let mut items_updated = 0;
        for (ingredient_id, quantity) in purchases {
            let known: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM ingredients WHERE id = ?1)",
                params![ingredient_id],
                |row| row.get(0),
            )?;
            if !known {
                return Err(LarderError::not_found(Entity::Ingredient, *ingredient_id));
            }

            let current: Option<f64> = tx
                .query_row(
                    "SELECT quantity FROM inventory WHERE user_id = ?1 AND ingredient_id = ?2",
                    params![user_id, ingredient_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(current) = current {
                tx.execute(
                    "UPDATE inventory SET quantity = ?1, updated_at = ?2
                     WHERE user_id = ?3 AND ingredient_id = ?4",
                    params![current + quantity, now, user_id, ingredient_id],
                )?;
                items_updated += 1;
            } else {
                tx.execute(
                    "INSERT INTO inventory (user_id, ingredient_id, quantity, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, ingredient_id, quantity, now],
                )?;
                items_created += 1;
            }
        }

        tx.commit()?;

        Ok(ReconcileSummary {
            list_id,
            user_id,
            items_created,
            items_updated,
        })
    }
}
