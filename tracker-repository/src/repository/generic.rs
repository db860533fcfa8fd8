//! Generic repository over any [`Entity`] and [`Store`]

use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;

use serde_json::Value;

use super::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use super::options::{QueryOption, QueryOptions, DEFAULT_PAGE_SIZE};
use super::pagination::{FilterCondition, PaginatedResult};
use crate::config::RepositoryConfig;
use crate::context::QueryContext;
use crate::entity::Entity;
use crate::store::{preload, Row, Selection, Store, StoreTransaction, Table, DELETED_AT, ID};

/// CRUD, listing and transactions for one entity type
///
/// Holds no entity state between calls. Every read excludes soft-deleted rows
/// unless [`QueryOption::with_deleted`] is passed.
///
/// ```rust,ignore
/// let repo: Repository<Exercise, _> = Repository::new(MemoryStore::new());
/// let ctx = QueryContext::background();
///
/// let mut squat = Exercise::new("Squat");
/// repo.create(&ctx, &mut squat).await?;
/// let page = repo
///     .get_all_paginated(&ctx, 1, 10, &[QueryOption::order_by_asc("name")])
///     .await?;
/// ```
pub struct Repository<T, S> {
    store: S,
    date_field: Option<Cow<'static, str>>,
    _entity: PhantomData<fn() -> T>,
}

impl<T, S: Clone> Clone for Repository<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            date_field: self.date_field.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T, S> std::fmt::Debug for Repository<T, S>
where
    T: Entity,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("collection", &T::COLLECTION)
            .field("date_field", &self.date_field)
            .finish_non_exhaustive()
    }
}

impl<T: Entity, S: Store> Repository<T, S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            date_field: None,
            _entity: PhantomData,
        }
    }

    /// Use `field` as the date column instead of [`Entity::DATE_FIELD`]
    #[must_use]
    pub fn with_date_field(mut self, field: impl Into<Cow<'static, str>>) -> Self {
        self.date_field = Some(field.into());
        self
    }

    /// Apply per-collection settings such as date column overrides
    #[must_use]
    pub fn with_config(self, config: &RepositoryConfig) -> Self {
        match config.date_fields.get(T::COLLECTION) {
            Some(field) => self.with_date_field(field.clone()),
            None => self,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Repository for another entity type sharing this store
    ///
    /// Inside [`transaction`](Self::transaction) this is how the callback
    /// reaches other tables within the same unit of work.
    pub fn scoped<U: Entity>(&self) -> Repository<U, S> {
        Repository::new(self.store.clone())
    }

    /// Column used for date bounds, if the entity has one
    pub fn date_field(&self) -> Option<&str> {
        self.date_field.as_deref().or(T::DATE_FIELD)
    }

    pub(crate) fn table() -> Table {
        Table::of::<T>()
    }

    /// Filters, exclusions, date bounds and visibility; shared by data and count queries
    fn predicate_selection(&self, options: &QueryOptions) -> RepositoryResult<Selection> {
        let mut selection = Selection::new(Self::table());
        selection.conditions = options.conditions(self.date_field())?;
        selection.include_deleted = options.include_deleted;
        Ok(selection)
    }

    fn data_selection(&self, options: &QueryOptions) -> RepositoryResult<Selection> {
        let mut selection = self.predicate_selection(options)?;
        selection.order_by = options.order_by.clone();
        selection.limit = options.limit;
        selection.offset = options.offset;
        Ok(selection)
    }

    /// Fetch, preload and decode
    async fn load(&self, selection: &Selection, options: &QueryOptions) -> RepositoryResult<Vec<T>> {
        let mut rows = self.store.fetch(selection).await?;
        let paths = options.resolve_preloads(T::PRELOADS);
        preload::preload(&self.store, T::relations(), &mut rows, &paths).await?;
        rows.into_iter().map(decode::<T>).collect()
    }

    /// Fetch an entity by identifier
    ///
    /// Filters, exclusions and date bounds in `opts` still apply; zero
    /// matching rows is [`NotFound`](super::RepositoryErrorKind::NotFound).
    pub async fn get_by_id(
        &self,
        ctx: &QueryContext,
        id: u64,
        opts: &[QueryOption],
    ) -> RepositoryResult<T> {
        let op = RepositoryOperation::GetById;
        tracing::debug!(collection = T::COLLECTION, id, "get_by_id");
        let options = QueryOptions::apply(opts);
        let result = ctx
            .run(op, async {
                let mut selection = self
                    .predicate_selection(&options)?
                    .with_condition(FilterCondition::in_ids(ID, vec![id]));
                selection.limit = Some(1);
                self.load(&selection, &options).await
            })
            .await;
        match result {
            Ok(mut found) if !found.is_empty() => Ok(found.swap_remove(0)),
            Ok(_) => Err(RepositoryError::not_found(T::COLLECTION, id)),
            Err(err) => Err(context(err, op, T::COLLECTION)),
        }
    }

    /// All entities matching `opts`; empty when nothing matches
    pub async fn get_all(&self, ctx: &QueryContext, opts: &[QueryOption]) -> RepositoryResult<Vec<T>> {
        let op = RepositoryOperation::GetAll;
        tracing::debug!(collection = T::COLLECTION, "get_all");
        let options = QueryOptions::apply(opts);
        self.get_all_with(ctx, op, &options).await
    }

    async fn get_all_with(
        &self,
        ctx: &QueryContext,
        op: RepositoryOperation,
        options: &QueryOptions,
    ) -> RepositoryResult<Vec<T>> {
        ctx.run(op, async {
            let selection = self.data_selection(options)?;
            self.load(&selection, options).await
        })
        .await
        .map_err(|err| context(err, op, T::COLLECTION))
    }

    /// One page of entities plus navigation metadata
    ///
    /// The total is counted over the same predicates as the page itself. A page
    /// below 1 becomes 1 and a page size below 1 becomes 10; both are capped
    /// at `u32::MAX` so the reported page is the one that was read.
    pub async fn get_all_paginated(
        &self,
        ctx: &QueryContext,
        page: i64,
        page_size: i64,
        opts: &[QueryOption],
    ) -> RepositoryResult<PaginatedResult<T>> {
        let op = RepositoryOperation::GetAllPaginated;
        let max = i64::from(u32::MAX);
        let page = page.clamp(1, max);
        let page_size = if page_size < 1 {
            i64::from(DEFAULT_PAGE_SIZE)
        } else {
            page_size.min(max)
        };
        tracing::debug!(collection = T::COLLECTION, page, page_size, "get_all_paginated");

        let mut options = QueryOptions::apply(opts);
        let total = self.count_with(ctx, op, &options).await?;

        QueryOption::paginate(page, page_size).apply_to(&mut options);
        let data = self.get_all_with(ctx, op, &options).await?;

        Ok(PaginatedResult::new(
            data,
            total,
            u32::try_from(page).unwrap_or(u32::MAX),
            u32::try_from(page_size).unwrap_or(u32::MAX),
        ))
    }

    /// Number of entities matching the filters, exclusions and date bounds in `opts`
    pub async fn count(&self, ctx: &QueryContext, opts: &[QueryOption]) -> RepositoryResult<u64> {
        let op = RepositoryOperation::Count;
        tracing::debug!(collection = T::COLLECTION, "count");
        let options = QueryOptions::apply(opts);
        self.count_with(ctx, op, &options).await
    }

    async fn count_with(
        &self,
        ctx: &QueryContext,
        op: RepositoryOperation,
        options: &QueryOptions,
    ) -> RepositoryResult<u64> {
        ctx.run(op, async {
            let selection = self.predicate_selection(options)?;
            self.store.count(&selection).await
        })
        .await
        .map_err(|err| context(err, op, T::COLLECTION))
    }

    /// First entity matching `opts`
    ///
    /// Without an ordering option the choice among several matches is up to the store.
    pub async fn find_one(&self, ctx: &QueryContext, opts: &[QueryOption]) -> RepositoryResult<T> {
        let op = RepositoryOperation::FindOne;
        tracing::debug!(collection = T::COLLECTION, "find_one");
        let mut options = QueryOptions::apply(opts);
        options.limit = Some(1);
        self.first(ctx, op, &options).await
    }

    pub(crate) async fn first(
        &self,
        ctx: &QueryContext,
        op: RepositoryOperation,
        options: &QueryOptions,
    ) -> RepositoryResult<T> {
        let mut found = self.get_all_with(ctx, op, options).await?;
        if found.is_empty() {
            return Err(RepositoryError::no_match(op, T::COLLECTION));
        }
        Ok(found.swap_remove(0))
    }

    /// Whether a visible entity with this identifier exists, without preloading
    pub async fn exists(&self, ctx: &QueryContext, id: u64) -> RepositoryResult<bool> {
        let op = RepositoryOperation::Exists;
        tracing::debug!(collection = T::COLLECTION, id, "exists");
        ctx.run(op, async {
            let selection =
                Selection::new(Self::table()).with_condition(FilterCondition::in_ids(ID, vec![id]));
            Ok(self.store.count(&selection).await? > 0)
        })
        .await
        .map_err(|err| context(err, op, T::COLLECTION))
    }

    /// Insert the entity and write the assigned identifier back onto it
    pub async fn create(&self, ctx: &QueryContext, entity: &mut T) -> RepositoryResult<()> {
        let op = RepositoryOperation::Create;
        tracing::debug!(collection = T::COLLECTION, "create");
        let id = ctx
            .run(op, async {
                let row = encode(entity)?;
                let ids = self.store.insert(&Self::table(), vec![row]).await?;
                ids.first()
                    .copied()
                    .ok_or_else(|| RepositoryError::store("insert returned no identifier"))
            })
            .await
            .map_err(|err| context(err, op, T::COLLECTION))?;
        entity.set_id(id);
        Ok(())
    }

    /// Replace every stored field of the entity
    ///
    /// An entity that was never persisted (identifier 0) is inserted instead.
    /// A missing or soft-deleted row is [`NotFound`](super::RepositoryErrorKind::NotFound).
    pub async fn update(&self, ctx: &QueryContext, entity: &mut T) -> RepositoryResult<()> {
        let id = entity.id();
        if id == 0 {
            return self
                .create(ctx, entity)
                .await
                .map_err(|err| err.with_operation(RepositoryOperation::Update));
        }

        let op = RepositoryOperation::Update;
        tracing::debug!(collection = T::COLLECTION, id, "update");
        let affected = ctx
            .run(op, async {
                let row = encode(entity)?;
                self.store.update(&Self::table(), id, row).await
            })
            .await
            .map_err(|err| context(err, op, T::COLLECTION))?;
        if affected == 0 {
            return Err(RepositoryError::not_found(T::COLLECTION, id).with_operation(op));
        }
        Ok(())
    }

    /// Soft delete when the collection has a deleted marker, otherwise remove
    ///
    /// Deleting an identifier that does not exist is not an error.
    pub async fn delete(&self, ctx: &QueryContext, id: u64) -> RepositoryResult<()> {
        let op = RepositoryOperation::Delete;
        tracing::debug!(collection = T::COLLECTION, id, soft = T::SOFT_DELETE, "delete");
        ctx.run(op, self.remove(&[id]))
            .await
            .map(drop)
            .map_err(|err| context(err, op, T::COLLECTION))
    }

    pub(crate) async fn remove(&self, ids: &[u64]) -> RepositoryResult<u64> {
        if T::SOFT_DELETE {
            self.store.soft_delete(&Self::table(), ids).await
        } else {
            self.store.delete(&Self::table(), ids).await
        }
    }

    /// Remove the row permanently, ignoring any deleted marker
    pub async fn delete_hard(&self, ctx: &QueryContext, id: u64) -> RepositoryResult<()> {
        let op = RepositoryOperation::DeleteHard;
        tracing::debug!(collection = T::COLLECTION, id, "delete_hard");
        ctx.run(op, self.store.delete(&Self::table(), &[id]))
            .await
            .map(drop)
            .map_err(|err| context(err, op, T::COLLECTION))
    }

    /// Clear the deleted marker of a soft-deleted entity
    pub async fn restore(&self, ctx: &QueryContext, id: u64) -> RepositoryResult<()> {
        let op = RepositoryOperation::Restore;
        if !T::SOFT_DELETE {
            return Err(RepositoryError::validation_failed(format!(
                "{} has no deleted marker",
                T::COLLECTION
            ))
            .with_operation(op));
        }
        tracing::debug!(collection = T::COLLECTION, id, "restore");
        let affected = ctx
            .run(op, self.store.restore(&Self::table(), id))
            .await
            .map_err(|err| context(err, op, T::COLLECTION))?;
        if affected == 0 {
            return Err(RepositoryError::not_found(T::COLLECTION, id).with_operation(op));
        }
        Ok(())
    }

    /// Run `f` inside one unit of work
    ///
    /// `f` receives a repository bound to the transaction. Its writes commit
    /// together when it returns `Ok` and are rolled back when it returns an
    /// error or the context is cancelled. Nested transactions are rejected.
    pub async fn transaction<F, Fut, R, E>(&self, ctx: &QueryContext, f: F) -> Result<R, E>
    where
        F: FnOnce(Repository<T, S::Tx>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: From<RepositoryError>,
    {
        let op = RepositoryOperation::Transaction;
        tracing::debug!(collection = T::COLLECTION, "transaction begin");
        let tx = ctx
            .run(op, self.store.begin())
            .await
            .map_err(|err| context(err, op, T::COLLECTION))?;

        let scoped = Repository::<T, S::Tx> {
            store: tx.clone(),
            date_field: self.date_field.clone(),
            _entity: PhantomData,
        };

        let outcome = tokio::select! {
            biased;
            error = ctx.done(op) => Err(E::from(error)),
            result = f(scoped) => result,
        };

        match outcome {
            Ok(value) => {
                tx.commit()
                    .await
                    .map_err(|err| context(err, op, T::COLLECTION))?;
                tracing::debug!(collection = T::COLLECTION, "transaction committed");
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(
                        collection = T::COLLECTION,
                        error = %rollback,
                        "transaction rollback failed"
                    );
                } else {
                    tracing::debug!(collection = T::COLLECTION, "transaction rolled back");
                }
                Err(err)
            }
        }
    }
}

/// Attach operation and collection to an error coming from the store
pub(crate) fn context(
    err: RepositoryError,
    op: RepositoryOperation,
    collection: &str,
) -> RepositoryError {
    err.with_operation(op).with_collection(collection)
}

/// Entity to row, without the identifier, deleted marker or preloaded relations
pub(crate) fn encode<T: Entity>(entity: &T) -> RepositoryResult<Row> {
    let mut row = match serde_json::to_value(entity)? {
        Value::Object(row) => row,
        _ => {
            return Err(RepositoryError::serialization(
                RepositoryOperation::Create,
                format!("{} does not serialize to an object", T::COLLECTION),
            ))
        }
    };
    row.remove(ID);
    row.remove(DELETED_AT);
    for relation in T::relations() {
        row.remove(relation.name);
    }
    Ok(row)
}

pub(crate) fn decode<T: Entity>(row: Row) -> RepositoryResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::store::MemoryStore;
    use crate::testing::{seed_exercises, Exercise, Food, Meal, MealItem, WorkoutPlan};

    fn repo() -> Repository<Exercise, MemoryStore> {
        Repository::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_create_then_get_by_id() {
        let repo = repo();
        let ctx = QueryContext::background();
        let mut squat = Exercise::new("Squat", "legs");
        repo.create(&ctx, &mut squat).await.unwrap();
        assert_eq!(squat.id, 1);

        let fetched = repo.get_by_id(&ctx, squat.id, &[]).await.unwrap();
        assert_eq!(fetched, squat);
    }

    #[tokio::test]
    async fn test_get_by_id_missing() {
        let err = repo()
            .get_by_id(&QueryContext::background(), 99, &[])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.entity_id.as_deref(), Some("99"));
    }

    #[tokio::test]
    async fn test_get_by_id_respects_filters() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 3).await;
        let err = repo
            .get_by_id(&ctx, 1, &[QueryOption::exclude_ids([1])])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_paginated_listing() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 25).await;

        let first = repo.get_all_paginated(&ctx, 1, 10, &[]).await.unwrap();
        assert_eq!(first.data.len(), 10);
        assert_eq!(first.total, 25);
        assert_eq!(first.total_pages, 3);
        assert!(first.has_next);
        assert!(!first.has_prev);

        let last = repo.get_all_paginated(&ctx, 3, 10, &[]).await.unwrap();
        assert_eq!(last.data.len(), 5);
        assert!(!last.has_next);
        assert!(last.has_prev);
    }

    #[tokio::test]
    async fn test_paginated_clamps_arguments() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 12).await;

        let page = repo.get_all_paginated(&ctx, 0, 0, &[]).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 10);
        assert_eq!(page.data.len(), 10);
        assert_eq!(page.total_pages, 2);
    }

    #[tokio::test]
    async fn test_paginated_caps_huge_page() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 3).await;

        let page = repo.get_all_paginated(&ctx, i64::MAX, i64::MAX, &[]).await.unwrap();
        assert_eq!(page.page, u32::MAX);
        assert_eq!(page.page_size, u32::MAX);
        assert!(page.data.is_empty());
        assert_eq!(page.total, 3);
        assert!(!page.has_next);
    }

    #[tokio::test]
    async fn test_unknown_field_is_store_error() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 3).await;

        let err = repo
            .get_all(&ctx, &[QueryOption::filter("no_such_column", "x")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Store);
        assert_eq!(err.operation, RepositoryOperation::GetAll);

        let err = repo
            .get_all(&ctx, &[QueryOption::order_by_asc("no_such_column")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Store);

        let err = repo
            .get_all_paginated(&ctx, 1, 10, &[QueryOption::filter("no_such_column", "x")])
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Store);
    }

    #[tokio::test]
    async fn test_pages_concatenate_to_full_listing() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 23).await;
        let opts = [
            QueryOption::filter("muscle_group", "legs"),
            QueryOption::order_by_desc("name"),
        ];

        let all = repo.get_all(&ctx, &opts).await.unwrap();
        let mut paged = Vec::new();
        let mut page = 1;
        loop {
            let result = repo.get_all_paginated(&ctx, page, 4, &opts).await.unwrap();
            paged.extend(result.data);
            if !result.has_next {
                break;
            }
            page += 1;
        }
        assert!(!all.is_empty());
        assert_eq!(paged, all);
    }

    #[tokio::test]
    async fn test_count_matches_get_all() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 17).await;

        let option_sets = vec![
            vec![],
            vec![QueryOption::filter("muscle_group", "arms")],
            vec![QueryOption::exclude_ids([1, 2, 3])],
            vec![
                QueryOption::filter("muscle_group", "legs"),
                QueryOption::exclude_ids([2]),
                QueryOption::limit(2),
                QueryOption::offset(1),
            ],
        ];
        for opts in option_sets {
            let count = repo.count(&ctx, &opts).await.unwrap();
            let mut unpaginated = opts.clone();
            unpaginated.push(QueryOption::limit(0));
            unpaginated.push(QueryOption::offset(0));
            let all = repo.get_all(&ctx, &unpaginated).await.unwrap();
            assert_eq!(count, all.len() as u64);
        }
    }

    #[tokio::test]
    async fn test_exclude_ids_disjoint() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 10).await;
        let excluded = [2, 4, 6, 8];
        let all = repo
            .get_all(&ctx, &[QueryOption::exclude_ids(excluded)])
            .await
            .unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|e| !excluded.contains(&e.id)));
    }

    #[tokio::test]
    async fn test_find_one_by_filter() {
        let repo = repo();
        let ctx = QueryContext::background();
        for name in ["Squat", "Lunge", "Bench Press"] {
            repo.create(&ctx, &mut Exercise::new(name, "legs")).await.unwrap();
        }

        let squat = repo
            .find_one(&ctx, &[QueryOption::filter("name", "Squat")])
            .await
            .unwrap();
        assert_eq!(squat.name, "Squat");

        let err = repo
            .find_one(&ctx, &[QueryOption::filter("name", "Nonexistent")])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.operation, RepositoryOperation::FindOne);
    }

    #[tokio::test]
    async fn test_update_replaces_fields() {
        let repo = repo();
        let ctx = QueryContext::background();
        let mut squat = Exercise::new("Squat", "legs");
        repo.create(&ctx, &mut squat).await.unwrap();

        squat.name = "Front Squat".to_string();
        repo.update(&ctx, &mut squat).await.unwrap();
        let fetched = repo.get_by_id(&ctx, squat.id, &[]).await.unwrap();
        assert_eq!(fetched.name, "Front Squat");
    }

    #[tokio::test]
    async fn test_update_unknown_id_is_not_found() {
        let repo = repo();
        let mut ghost = Exercise::new("Ghost", "core");
        ghost.id = 42;
        let err = repo
            .update(&QueryContext::background(), &mut ghost)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.operation, RepositoryOperation::Update);
    }

    #[tokio::test]
    async fn test_update_without_id_inserts() {
        let repo = repo();
        let ctx = QueryContext::background();
        let mut fresh = Exercise::new("Plank", "core");
        repo.update(&ctx, &mut fresh).await.unwrap();
        assert_ne!(fresh.id, 0);
        assert_eq!(repo.count(&ctx, &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_entity() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 5).await;

        repo.delete(&ctx, 3).await.unwrap();
        assert!(repo.get_by_id(&ctx, 3, &[]).await.unwrap_err().is_not_found());
        assert!(!repo.exists(&ctx, 3).await.unwrap());

        let page = repo.get_all_paginated(&ctx, 1, 10, &[]).await.unwrap();
        assert_eq!(page.total, 4);
        assert!(page.data.iter().all(|e| e.id != 3));

        let with_deleted = repo
            .get_by_id(&ctx, 3, &[QueryOption::with_deleted()])
            .await
            .unwrap();
        assert_eq!(with_deleted.id, 3);
        assert_eq!(repo.count(&ctx, &[QueryOption::with_deleted()]).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 1).await;
        repo.delete(&ctx, 1).await.unwrap();
        repo.delete(&ctx, 1).await.unwrap();
        repo.delete(&ctx, 77).await.unwrap();
    }

    #[tokio::test]
    async fn test_restore() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 2).await;
        repo.delete(&ctx, 2).await.unwrap();
        repo.restore(&ctx, 2).await.unwrap();
        assert!(repo.exists(&ctx, 2).await.unwrap());

        let err = repo.restore(&ctx, 2).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.operation, RepositoryOperation::Restore);
    }

    #[tokio::test]
    async fn test_delete_hard_removes_row() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 2).await;
        repo.delete_hard(&ctx, 1).await.unwrap();
        assert_eq!(repo.count(&ctx, &[QueryOption::with_deleted()]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hard_delete_for_collections_without_marker() {
        let store = MemoryStore::new();
        let foods: Repository<Food, _> = Repository::new(store);
        let ctx = QueryContext::background();
        let mut oats = Food::new("Oats", 389);
        foods.create(&ctx, &mut oats).await.unwrap();
        foods.delete(&ctx, oats.id).await.unwrap();
        assert_eq!(foods.count(&ctx, &[QueryOption::with_deleted()]).await.unwrap(), 0);

        let err = foods.restore(&ctx, oats.id).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_unique_violation_surfaces_as_already_exists() {
        let repo: Repository<Exercise, _> =
            Repository::new(MemoryStore::new().with_unique("exercises", "name"));
        let ctx = QueryContext::background();
        repo.create(&ctx, &mut Exercise::new("Squat", "legs")).await.unwrap();
        let err = repo
            .create(&ctx, &mut Exercise::new("Squat", "legs"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::AlreadyExists);
        assert_eq!(err.entity_type.as_deref(), Some("exercises"));
    }

    #[tokio::test]
    async fn test_transaction_rollback_leaves_count_unchanged() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 3).await;
        let before = repo.count(&ctx, &[]).await.unwrap();

        let result: Result<(), RepositoryError> = repo
            .transaction(&ctx, |tx| async move {
                tx.create(&QueryContext::background(), &mut Exercise::new("Burpee", "core"))
                    .await?;
                Err(RepositoryError::validation_failed("abort"))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(repo.count(&ctx, &[]).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_transaction_commit_spans_entity_types() {
        let store = MemoryStore::new();
        let exercises: Repository<Exercise, _> = Repository::new(store.clone());
        let foods: Repository<Food, _> = Repository::new(store);
        let ctx = QueryContext::background();

        let id = exercises
            .transaction(&ctx, |tx| async move {
                let inner = QueryContext::background();
                let mut squat = Exercise::new("Squat", "legs");
                tx.create(&inner, &mut squat).await?;
                tx.scoped::<Food>()
                    .create(&inner, &mut Food::new("Rice", 130))
                    .await?;
                Ok::<_, RepositoryError>(squat.id)
            })
            .await
            .unwrap();

        assert!(exercises.exists(&ctx, id).await.unwrap());
        assert_eq!(foods.count(&ctx, &[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_outer_repository_usable_inside_transaction() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 2).await;
        let outer = repo.clone();

        let transaction = repo.transaction(&ctx, |tx| async move {
            let inner = QueryContext::background();
            tx.create(&inner, &mut Exercise::new("Lunge", "legs")).await?;
            let outside = outer.count(&inner, &[]).await?;
            outer
                .create(&inner, &mut Exercise::new("Plank", "core"))
                .await?;
            let inside = tx.count(&inner, &[]).await?;
            Ok::<_, RepositoryError>((outside, inside))
        });
        let seen = tokio::time::timeout(std::time::Duration::from_secs(2), transaction)
            .await
            .expect("transaction blocked the outer repository")
            .unwrap();

        assert_eq!(seen, (2, 3));
        assert_eq!(repo.count(&ctx, &[]).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_nested_transaction_rejected() {
        let repo = repo();
        let ctx = QueryContext::background();
        let result: Result<(), RepositoryError> = repo
            .transaction(&ctx, |tx| async move {
                tx.transaction(&QueryContext::background(), |_inner| async { Ok(()) })
                    .await
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Store);
        assert_eq!(err.operation, RepositoryOperation::Transaction);
    }

    #[tokio::test]
    async fn test_cancelled_context_aborts_and_rolls_back() {
        let repo = repo();
        let ctx = QueryContext::background();
        let cancel = ctx.clone();

        let result: Result<(), RepositoryError> = repo
            .transaction(&ctx, |tx| async move {
                tx.create(&QueryContext::background(), &mut Exercise::new("Row", "back"))
                    .await?;
                cancel.cancel();
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_cancellation());
        assert_eq!(repo.count(&QueryContext::background(), &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_context_rejects_reads() {
        let repo = repo();
        let ctx = QueryContext::background();
        ctx.cancel();
        let err = repo.get_all(&ctx, &[]).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Cancelled);
        assert_eq!(err.entity_type.as_deref(), Some("exercises"));
    }

    #[tokio::test]
    async fn test_date_bounds_without_date_field() {
        let err = repo()
            .get_all(
                &QueryContext::background(),
                &[QueryOption::date_from(chrono::Utc::now())],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::ValidationFailed);
    }

    #[tokio::test]
    async fn test_preloads_nested_paths() {
        let store = MemoryStore::new();
        let ctx = QueryContext::background();
        let foods: Repository<Food, _> = Repository::new(store.clone());
        let meals: Repository<Meal, _> = Repository::new(store.clone());
        let items: Repository<MealItem, _> = Repository::new(store);

        let mut oats = Food::new("Oats", 389);
        let mut milk = Food::new("Milk", 42);
        foods.create(&ctx, &mut oats).await.unwrap();
        foods.create(&ctx, &mut milk).await.unwrap();

        let mut breakfast = Meal::new("Breakfast");
        meals.create(&ctx, &mut breakfast).await.unwrap();
        items
            .create(&ctx, &mut MealItem::new(breakfast.id, oats.id, 80.0))
            .await
            .unwrap();
        items
            .create(&ctx, &mut MealItem::new(breakfast.id, milk.id, 200.0))
            .await
            .unwrap();

        let loaded = meals.get_by_id(&ctx, breakfast.id, &[]).await.unwrap();
        assert_eq!(loaded.items.len(), 2);
        assert_eq!(
            loaded.items[0].food.as_ref().map(|f| f.name.as_str()),
            Some("Oats")
        );

        let shallow = meals
            .get_by_id(&ctx, breakfast.id, &[QueryOption::preload(["items"])])
            .await
            .unwrap();
        assert_eq!(shallow.items.len(), 2);
        assert!(shallow.items[0].food.is_none());

        let bare = meals
            .get_by_id(&ctx, breakfast.id, &[QueryOption::no_preloads()])
            .await
            .unwrap();
        assert!(bare.items.is_empty());
    }

    #[tokio::test]
    async fn test_preload_skips_soft_deleted_children() {
        let store = MemoryStore::new();
        let ctx = QueryContext::background();
        let meals: Repository<Meal, _> = Repository::new(store.clone());
        let items: Repository<MealItem, _> = Repository::new(store);

        let mut lunch = Meal::new("Lunch");
        meals.create(&ctx, &mut lunch).await.unwrap();
        let mut first = MealItem::new(lunch.id, 1, 100.0);
        let mut second = MealItem::new(lunch.id, 2, 50.0);
        items.create(&ctx, &mut first).await.unwrap();
        items.create(&ctx, &mut second).await.unwrap();
        items.delete(&ctx, first.id).await.unwrap();

        let loaded = meals
            .get_by_id(&ctx, lunch.id, &[QueryOption::preload(["items"])])
            .await
            .unwrap();
        assert_eq!(loaded.items.len(), 1);
        assert_eq!(loaded.items[0].id, second.id);
    }

    #[tokio::test]
    async fn test_preload_many_to_many() {
        let store = MemoryStore::new();
        let ctx = QueryContext::background();
        let exercises: Repository<Exercise, _> = Repository::new(store.clone());
        let plans: Repository<WorkoutPlan, _> = Repository::new(store.clone());
        seed_exercises(&exercises, 4).await;

        let mut plan = WorkoutPlan::new("Leg day");
        plans.create(&ctx, &mut plan).await.unwrap();
        crate::testing::link_plan_exercises(&store, plan.id, &[3, 1]).await;

        let loaded = plans
            .get_by_id(&ctx, plan.id, &[QueryOption::preload(["exercises"])])
            .await
            .unwrap();
        let ids: Vec<u64> = loaded.exercises.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_unknown_preload_is_store_error() {
        let repo = repo();
        let ctx = QueryContext::background();
        seed_exercises(&repo, 1).await;
        let err = repo
            .get_all(&ctx, &[QueryOption::preload(["muscles"])])
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Store);
        assert_eq!(err.operation, RepositoryOperation::GetAll);
    }

    #[test]
    fn test_encode_strips_managed_fields() {
        let mut meal = Meal::new("Dinner");
        meal.id = 9;
        meal.items.push(MealItem::new(9, 1, 10.0));
        let row = encode(&meal).unwrap();
        assert!(!row.contains_key("id"));
        assert!(!row.contains_key("items"));
        assert_eq!(row["name"], serde_json::json!("Dinner"));
    }

    #[test]
    fn test_with_config_overrides_date_field() {
        let mut config = RepositoryConfig::default();
        config
            .date_fields
            .insert("exercises".to_string(), "performed_on".to_string());
        let repo = repo().with_config(&config);
        assert_eq!(repo.date_field(), Some("performed_on"));
    }
}
