use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::aggregate::aggregate;
use crate::db::Database;
use crate::error::{Entity, LarderError, Result};
use crate::models::{
    BuiltShoppingList, IngredientRecord, InventoryItem, RecipeStatus, ReconcileSummary,
    ShoppingList, ShoppingListLine, UserRecipe,
};

/// Recipe ingredient provider.
///
/// The CLI implements this against the Spoonacular API; tests use in-memory
/// mocks. Implementations own their timeouts: a lookup that takes too long
/// must come back as an error.
#[async_trait]
pub trait RecipeSource: Send + Sync {
    async fn get_ingredients(&self, recipe_id: i64) -> anyhow::Result<Vec<IngredientRecord>>;
}

pub const DEFAULT_LOOKUP_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions {
    /// Maximum recipe lookups in flight for one build.
    pub lookup_concurrency: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            lookup_concurrency: DEFAULT_LOOKUP_CONCURRENCY,
        }
    }
}

pub struct LarderService {
    db: Mutex<Database>,
    build_locks: BuildLocks,
    options: ServiceOptions,
}

impl LarderService {
    pub fn new(db_path: &Path, options: ServiceOptions) -> Result<Self> {
        Ok(Self::with_database(Database::open(db_path)?, options))
    }

    pub fn new_in_memory() -> Result<Self> {
        Ok(Self::with_database(
            Database::open_in_memory()?,
            ServiceOptions::default(),
        ))
    }

    #[must_use]
    pub fn with_database(db: Database, options: ServiceOptions) -> Self {
        Self {
            db: Mutex::new(db),
            build_locks: BuildLocks::default(),
            options,
        }
    }

    // --- Recipe selection ---

    /// Mark recipes as needing ingredients for `user_id` and return every
    /// recipe id the user is currently shopping for.
    pub async fn select_recipes(&self, user_id: i64, recipe_ids: &[i64]) -> Result<Vec<i64>> {
        let db = self.db.lock().await;
        db.select_recipes(user_id, recipe_ids, RecipeStatus::NeedsIngredients)?;
        db.pending_recipe_ids(user_id)
    }

    /// Move a selected recipe forward in its lifecycle.
    pub async fn set_recipe_status(
        &self,
        user_id: i64,
        recipe_id: i64,
        status: RecipeStatus,
    ) -> Result<UserRecipe> {
        let db = self.db.lock().await;
        let current = db
            .get_user_recipe(user_id, recipe_id)?
            .ok_or_else(|| LarderError::not_found(Entity::UserRecipe, recipe_id))?;

        if !current.status.can_transition_to(status) {
            return Err(LarderError::InvalidTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }
        if !db.update_user_recipe_status(user_id, recipe_id, current.status, status)? {
            // Another process sharing the database file moved it first.
            return Err(LarderError::InvalidTransition {
                from: current.status.to_string(),
                to: status.to_string(),
            });
        }

        db.get_user_recipe(user_id, recipe_id)?
            .ok_or_else(|| LarderError::not_found(Entity::UserRecipe, recipe_id))
    }

    pub async fn list_user_recipes(&self, user_id: i64) -> Result<Vec<UserRecipe>> {
        self.db.lock().await.list_user_recipes(user_id)
    }

    // --- Shopping lists ---

    /// Aggregate the ingredients of every recipe the user needs ingredients
    /// for into a new shopping list.
    ///
    /// Builds for the same user run one at a time. Nothing is written unless
    /// every lookup and the aggregation succeed.
    #[tracing::instrument(skip(self, source))]
    pub async fn build_shopping_list(
        &self,
        source: &dyn RecipeSource,
        user_id: i64,
    ) -> Result<BuiltShoppingList> {
        let slot = self.build_locks.acquire(user_id);
        let _guard = slot.lock.lock().await;
        self.build_locked(source, user_id).await
    }

    async fn build_locked(
        &self,
        source: &dyn RecipeSource,
        user_id: i64,
    ) -> Result<BuiltShoppingList> {
        let recipe_ids = self.db.lock().await.pending_recipe_ids(user_id)?;
        debug!(recipes = recipe_ids.len(), "collecting recipe ingredients");

        let records = fetch_ingredients(source, &recipe_ids, self.options.lookup_concurrency).await?;

        let aggregated = aggregate(&records).inspect_err(|e| {
            warn!(error = %e, "aggregation failed");
        })?;

        let db = self.db.lock().await;
        let list = db.create_shopping_list(user_id, &aggregated)?;
        let lines = db.shopping_list_lines(list.id)?;

        info!(
            list_id = list.id,
            recipes = recipe_ids.len(),
            ingredients = lines.len(),
            "built shopping list"
        );
        Ok(BuiltShoppingList { list, lines })
    }

    pub async fn get_shopping_list(&self, list_id: i64) -> Result<ShoppingList> {
        self.db
            .lock()
            .await
            .get_shopping_list(list_id)?
            .ok_or_else(|| LarderError::not_found(Entity::ShoppingList, list_id))
    }

    pub async fn open_shopping_lists(&self, user_id: i64) -> Result<Vec<ShoppingList>> {
        self.db.lock().await.open_shopping_lists(user_id)
    }

    /// Lines of an existing list, ordered by ingredient name.
    pub async fn shopping_list_lines(&self, list_id: i64) -> Result<Vec<ShoppingListLine>> {
        let db = self.db.lock().await;
        if db.get_shopping_list(list_id)?.is_none() {
            return Err(LarderError::not_found(Entity::ShoppingList, list_id));
        }
        db.shopping_list_lines(list_id)
    }

    // --- Inventory ---

    /// Fold purchases (already in each ingredient's base unit) into the list
    /// owner's inventory and close the list. Succeeds at most once per list.
    #[tracing::instrument(skip(self, purchases), fields(items = purchases.len()))]
    pub async fn reconcile_purchases(
        &self,
        list_id: i64,
        purchases: &BTreeMap<i64, f64>,
    ) -> Result<ReconcileSummary> {
        if let Some(bad) = purchases.values().find(|q| !q.is_finite() || **q < 0.0) {
            return Err(LarderError::InvalidQuantity(*bad));
        }

        let result = self.db.lock().await.reconcile_purchases(list_id, purchases);
        match &result {
            Ok(summary) => info!(
                user_id = summary.user_id,
                created = summary.items_created,
                updated = summary.items_updated,
                "reconciled purchases"
            ),
            Err(LarderError::DuplicateReconciliation(_)) => {
                warn!("shopping list was already reconciled");
            }
            Err(_) => {}
        }
        result
    }

    pub async fn inventory(&self, user_id: i64) -> Result<Vec<InventoryItem>> {
        self.db.lock().await.list_inventory(user_id)
    }

    pub async fn inventory_item(
        &self,
        user_id: i64,
        ingredient_id: i64,
    ) -> Result<Option<InventoryItem>> {
        self.db
            .lock()
            .await
            .get_inventory_item(user_id, ingredient_id)
    }
}

/// Per-user build locks. An entry lives only while some build for that user
/// holds or waits on its lock.
type BuildLockMap = std::sync::Mutex<HashMap<i64, BuildLockEntry>>;

#[derive(Default)]
struct BuildLockEntry {
    lock: Arc<Mutex<()>>,
    users: usize,
}

#[derive(Default)]
struct BuildLocks {
    map: BuildLockMap,
}

impl BuildLocks {
    fn acquire(&self, user_id: i64) -> BuildSlot<'_> {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = map.entry(user_id).or_default();
        entry.users += 1;
        BuildSlot {
            map: &self.map,
            user_id,
            lock: Arc::clone(&entry.lock),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A registered interest in one user's build lock. Dropping it, including
/// when the build future is cancelled, releases the map entry.
struct BuildSlot<'a> {
    map: &'a BuildLockMap,
    user_id: i64,
    lock: Arc<Mutex<()>>,
}

impl Drop for BuildSlot<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = map.get_mut(&self.user_id) {
            entry.users -= 1;
            if entry.users == 0 {
                map.remove(&self.user_id);
            }
        }
    }
}

/// Fetch every recipe's ingredients with at most `concurrency` lookups in
/// flight. The first failure cancels the rest.
async fn fetch_ingredients(
    source: &dyn RecipeSource,
    recipe_ids: &[i64],
    concurrency: usize,
) -> Result<Vec<IngredientRecord>> {
    let per_recipe: Vec<Vec<IngredientRecord>> = stream::iter(recipe_ids.iter().copied())
        .map(|recipe_id| async move {
            debug!(recipe_id, "fetching recipe");
            source
                .get_ingredients(recipe_id)
                .await
                .map_err(|err| {
                    warn!(recipe_id, error = %err, "recipe lookup failed");
                    LarderError::ExternalLookupFailure {
                        recipe_id,
                        source: err,
                    }
                })
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    Ok(per_recipe.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const FLOUR: i64 = 20081;
    const SUGAR: i64 = 19335;
    const R1: i64 = 101;
    const R2: i64 = 102;

    struct MockSource {
        recipes: HashMap<i64, Vec<IngredientRecord>>,
        failing: HashSet<i64>,
    }

    impl MockSource {
        fn new(recipes: Vec<(i64, Vec<IngredientRecord>)>) -> Self {
            Self {
                recipes: recipes.into_iter().collect(),
                failing: HashSet::new(),
            }
        }

        fn failing_on(mut self, recipe_id: i64) -> Self {
            self.failing.insert(recipe_id);
            self
        }
    }

    #[async_trait]
    impl RecipeSource for MockSource {
        async fn get_ingredients(&self, recipe_id: i64) -> anyhow::Result<Vec<IngredientRecord>> {
            if self.failing.contains(&recipe_id) {
                anyhow::bail!("provider unavailable");
            }
            self.recipes
                .get(&recipe_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no recipe {recipe_id}"))
        }
    }

    /// Sleeps on every lookup and records the peak number in flight.
    struct SlowSource {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SlowSource {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RecipeSource for SlowSource {
        async fn get_ingredients(&self, recipe_id: i64) -> anyhow::Result<Vec<IngredientRecord>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![IngredientRecord::new(recipe_id, "thing", 1.0, "")])
        }
    }

    fn baking_source() -> MockSource {
        MockSource::new(vec![
            (R1, vec![IngredientRecord::new(FLOUR, "flour", 2.0, "cup")]),
            (
                R2,
                vec![
                    IngredientRecord::new(FLOUR, "flour", 1.0, "cup"),
                    IngredientRecord::new(SUGAR, "sugar", 200.0, "g"),
                ],
            ),
        ])
    }

    async fn service_with_pending(user_id: i64, recipes: &[i64]) -> LarderService {
        let svc = LarderService::new_in_memory().unwrap();
        svc.select_recipes(user_id, recipes).await.unwrap();
        svc
    }

    #[tokio::test]
    async fn test_build_end_to_end() {
        let svc = service_with_pending(1, &[R1, R2]).await;
        let built = svc.build_shopping_list(&baking_source(), 1).await.unwrap();

        assert!(!built.list.has_shopped);
        assert_eq!(built.lines.len(), 2);

        assert_eq!(built.lines[0].name, "flour");
        assert_eq!(built.lines[0].unit, "cup");
        assert!((built.lines[0].quantity - 3.0).abs() < 1e-9);

        assert_eq!(built.lines[1].name, "sugar");
        assert_eq!(built.lines[1].unit, "g");
        assert!((built.lines[1].quantity - 200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_build_orders_names_case_insensitively() {
        let source = MockSource::new(vec![(
            R1,
            vec![
                IngredientRecord::new(3, "zucchini", 1.0, ""),
                IngredientRecord::new(1, "Basil", 1.0, "bunch"),
                IngredientRecord::new(2, "apples", 2.0, ""),
            ],
        )]);
        let svc = service_with_pending(1, &[R1]).await;
        let built = svc.build_shopping_list(&source, 1).await.unwrap();
        let names: Vec<&str> = built.lines.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["apples", "Basil", "zucchini"]);
    }

    #[tokio::test]
    async fn test_build_ignores_recipes_not_needing_ingredients() {
        let svc = service_with_pending(1, &[R1, R2]).await;
        svc.set_recipe_status(1, R2, RecipeStatus::Cooked)
            .await
            .unwrap();

        let built = svc.build_shopping_list(&baking_source(), 1).await.unwrap();
        assert_eq!(built.lines.len(), 1);
        assert!((built.lines[0].quantity - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_build_with_no_pending_recipes() {
        let svc = LarderService::new_in_memory().unwrap();
        let built = svc.build_shopping_list(&baking_source(), 1).await.unwrap();
        assert!(built.lines.is_empty());
        assert_eq!(svc.open_shopping_lists(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_persists_nothing() {
        let svc = service_with_pending(1, &[R1, R2]).await;
        let source = baking_source().failing_on(R2);

        let err = svc.build_shopping_list(&source, 1).await.unwrap_err();
        assert!(matches!(
            err,
            LarderError::ExternalLookupFailure { recipe_id: R2, .. }
        ));
        assert!(svc.open_shopping_lists(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_conflicting_units_persist_nothing() {
        let source = MockSource::new(vec![
            (R1, vec![IngredientRecord::new(FLOUR, "flour", 2.0, "cup")]),
            (R2, vec![IngredientRecord::new(FLOUR, "flour", 500.0, "g")]),
        ]);
        let svc = service_with_pending(1, &[R1, R2]).await;

        let err = svc.build_shopping_list(&source, 1).await.unwrap_err();
        assert!(matches!(
            err,
            LarderError::ConflictingUnits { ingredient_id: FLOUR, .. }
        ));
        assert!(svc.open_shopping_lists(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unrecognized_unit_fails_build() {
        let source = MockSource::new(vec![(
            R1,
            vec![IngredientRecord::new(FLOUR, "flour", 1.0, "heaping scoop")],
        )]);
        let svc = service_with_pending(1, &[R1]).await;
        let err = svc.build_shopping_list(&source, 1).await.unwrap_err();
        assert!(matches!(err, LarderError::UnrecognizedUnit(u) if u == "heaping scoop"));
        assert!(svc.open_shopping_lists(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lookups_respect_concurrency_limit() {
        let db = Database::open_in_memory().unwrap();
        let svc = LarderService::with_database(
            db,
            ServiceOptions {
                lookup_concurrency: 2,
            },
        );
        let recipes: Vec<i64> = (1..=6).collect();
        svc.select_recipes(1, &recipes).await.unwrap();

        let source = SlowSource::new();
        let built = svc.build_shopping_list(&source, 1).await.unwrap();
        assert_eq!(built.lines.len(), 6);
        assert_eq!(source.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_builds_for_same_user_are_serialized() {
        let db = Database::open_in_memory().unwrap();
        let svc = LarderService::with_database(
            db,
            ServiceOptions {
                lookup_concurrency: 1,
            },
        );
        svc.select_recipes(1, &[1, 2, 3]).await.unwrap();

        let source = SlowSource::new();
        let (a, b) = tokio::join!(
            svc.build_shopping_list(&source, 1),
            svc.build_shopping_list(&source, 1)
        );
        a.unwrap();
        b.unwrap();

        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
        assert_eq!(svc.open_shopping_lists(1).await.unwrap().len(), 2);
        assert_eq!(svc.build_locks.len(), 0);
    }

    /// Never answers, so the build can only end by being dropped.
    struct HangingSource;

    #[async_trait]
    impl RecipeSource for HangingSource {
        async fn get_ingredients(&self, _recipe_id: i64) -> anyhow::Result<Vec<IngredientRecord>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_cancelled_build_releases_user_lock() {
        let svc = service_with_pending(1, &[R1]).await;

        let timed_out = tokio::time::timeout(
            Duration::from_millis(20),
            svc.build_shopping_list(&HangingSource, 1),
        )
        .await;
        assert!(timed_out.is_err());
        assert_eq!(svc.build_locks.len(), 0);
        assert!(svc.open_shopping_lists(1).await.unwrap().is_empty());

        // The user can build again afterwards
        svc.build_shopping_list(&baking_source(), 1).await.unwrap();
        assert_eq!(svc.build_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_waiting_build_keeps_entry_until_done() {
        let svc = service_with_pending(1, &[R1]).await;
        let held = svc.build_locks.acquire(1);
        let guard = held.lock.lock().await;

        let source = baking_source();
        let waiter = svc.build_shopping_list(&source, 1);
        tokio::pin!(waiter);
        assert!(
            tokio::time::timeout(Duration::from_millis(10), &mut waiter)
                .await
                .is_err()
        );
        assert_eq!(svc.build_locks.len(), 1);

        drop(guard);
        drop(held);
        // The waiter is still registered, so its entry survives the first release
        assert_eq!(svc.build_locks.len(), 1);
        waiter.await.unwrap();
        assert_eq!(svc.build_locks.len(), 0);
    }

    #[tokio::test]
    async fn test_builds_for_different_users_overlap() {
        let db = Database::open_in_memory().unwrap();
        let svc = LarderService::with_database(
            db,
            ServiceOptions {
                lookup_concurrency: 1,
            },
        );
        svc.select_recipes(1, &[1, 2]).await.unwrap();
        svc.select_recipes(2, &[3, 4]).await.unwrap();

        let source = SlowSource::new();
        let (a, b) = tokio::join!(
            svc.build_shopping_list(&source, 1),
            svc.build_shopping_list(&source, 2)
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(source.peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reconcile_twice_only_counts_once() {
        let svc = service_with_pending(1, &[R1, R2]).await;
        let built = svc.build_shopping_list(&baking_source(), 1).await.unwrap();
        let purchases = BTreeMap::from([(FLOUR, 3.0), (SUGAR, 200.0)]);

        svc.reconcile_purchases(built.list.id, &purchases)
            .await
            .unwrap();
        let err = svc
            .reconcile_purchases(built.list.id, &purchases)
            .await
            .unwrap_err();
        assert!(matches!(err, LarderError::DuplicateReconciliation(id) if id == built.list.id));

        let sugar = svc.inventory_item(1, SUGAR).await.unwrap().unwrap();
        assert!((sugar.quantity - 200.0).abs() < 1e-9);
        assert!(svc.get_shopping_list(built.list.id).await.unwrap().has_shopped);
    }

    #[tokio::test]
    async fn test_concurrent_reconcile_applies_once() {
        let svc = service_with_pending(1, &[R1, R2]).await;
        let built = svc.build_shopping_list(&baking_source(), 1).await.unwrap();
        let purchases = BTreeMap::from([(SUGAR, 200.0)]);

        let (a, b) = tokio::join!(
            svc.reconcile_purchases(built.list.id, &purchases),
            svc.reconcile_purchases(built.list.id, &purchases)
        );
        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);

        let sugar = svc.inventory_item(1, SUGAR).await.unwrap().unwrap();
        assert!((sugar.quantity - 200.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_inventory_merge_is_additive() {
        let svc = service_with_pending(1, &[R2]).await;
        let first = svc.build_shopping_list(&baking_source(), 1).await.unwrap();
        svc.reconcile_purchases(first.list.id, &BTreeMap::from([(SUGAR, 100.0)]))
            .await
            .unwrap();

        let second = svc.build_shopping_list(&baking_source(), 1).await.unwrap();
        svc.reconcile_purchases(second.list.id, &BTreeMap::from([(SUGAR, 200.0)]))
            .await
            .unwrap();

        let items = svc.inventory(1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "sugar");
        assert_eq!(items[0].base_unit, "g");
        assert!((items[0].quantity - 300.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reconcile_unknown_list() {
        let svc = LarderService::new_in_memory().unwrap();
        let err = svc
            .reconcile_purchases(404, &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LarderError::NotFound {
                entity: Entity::ShoppingList,
                id: 404
            }
        ));
    }

    #[tokio::test]
    async fn test_reconcile_rejects_negative_quantity() {
        let svc = service_with_pending(1, &[R2]).await;
        let built = svc.build_shopping_list(&baking_source(), 1).await.unwrap();
        let err = svc
            .reconcile_purchases(built.list.id, &BTreeMap::from([(SUGAR, -5.0)]))
            .await
            .unwrap_err();
        assert!(matches!(err, LarderError::InvalidQuantity(_)));
        assert!(!svc.get_shopping_list(built.list.id).await.unwrap().has_shopped);
    }

    #[tokio::test]
    async fn test_recipe_status_transitions() {
        let svc = service_with_pending(1, &[R1]).await;

        let cooked = svc
            .set_recipe_status(1, R1, RecipeStatus::Cooked)
            .await
            .unwrap();
        assert_eq!(cooked.status, RecipeStatus::Cooked);

        let err = svc
            .set_recipe_status(1, R1, RecipeStatus::NeedsIngredients)
            .await
            .unwrap_err();
        assert!(matches!(err, LarderError::InvalidTransition { .. }));

        let err = svc
            .set_recipe_status(1, 999, RecipeStatus::Cooked)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LarderError::NotFound {
                entity: Entity::UserRecipe,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_shopping_list_lines_for_missing_list() {
        let svc = LarderService::new_in_memory().unwrap();
        assert!(matches!(
            svc.shopping_list_lines(3).await,
            Err(LarderError::NotFound { .. })
        ));
    }
}
