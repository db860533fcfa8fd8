//! Batch create, update and delete

use super::error::{RepositoryError, RepositoryOperation, RepositoryResult};
use super::generic::{context, encode, Repository};
use crate::context::QueryContext;
use crate::entity::Entity;
use crate::store::Store;

impl<T: Entity, S: Store> Repository<T, S> {
    /// Insert every entity or none, writing the assigned identifiers back
    pub async fn create_batch(&self, ctx: &QueryContext, entities: &mut [T]) -> RepositoryResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let op = RepositoryOperation::CreateBatch;
        tracing::debug!(collection = T::COLLECTION, count = entities.len(), "create_batch");

        let rows = entities.iter().map(encode::<T>).collect::<RepositoryResult<Vec<_>>>();
        let ids = ctx
            .run(op, async { self.store().insert(&Self::table(), rows?).await })
            .await
            .map_err(|err| context(err, op, T::COLLECTION))?;

        if ids.len() != entities.len() {
            return Err(RepositoryError::store(format!(
                "insert returned {} identifiers for {} rows",
                ids.len(),
                entities.len()
            ))
            .with_operation(op));
        }
        for (entity, id) in entities.iter_mut().zip(ids) {
            entity.set_id(id);
        }
        Ok(())
    }

    /// Update every entity inside one transaction; any failure rolls all back
    pub async fn update_batch(&self, ctx: &QueryContext, entities: &mut [T]) -> RepositoryResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let op = RepositoryOperation::UpdateBatch;
        tracing::debug!(collection = T::COLLECTION, count = entities.len(), "update_batch");

        let inner = ctx.child();
        self.transaction(ctx, |tx| async move {
            for entity in entities.iter_mut() {
                tx.update(&inner, entity).await?;
            }
            Ok(())
        })
        .await
        .map_err(|err: RepositoryError| err.with_operation(op))
    }

    /// Delete by identifiers, soft when the collection supports it
    pub async fn delete_batch(&self, ctx: &QueryContext, ids: &[u64]) -> RepositoryResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let op = RepositoryOperation::DeleteBatch;
        tracing::debug!(collection = T::COLLECTION, count = ids.len(), "delete_batch");
        ctx.run(op, self.remove(ids))
            .await
            .map(drop)
            .map_err(|err| context(err, op, T::COLLECTION))
    }
}

#[cfg(test)]
mod tests {
    use crate::context::QueryContext;
    use crate::repository::{QueryOption, Repository, RepositoryErrorKind, RepositoryOperation};
    use crate::store::MemoryStore;
    use crate::testing::{seed_exercises, Exercise};

    #[tokio::test]
    async fn test_empty_batches_are_noops() {
        let repo: Repository<Exercise, _> = Repository::new(MemoryStore::new());
        let ctx = QueryContext::background();
        repo.create_batch(&ctx, &mut []).await.unwrap();
        repo.update_batch(&ctx, &mut []).await.unwrap();
        repo.delete_batch(&ctx, &[]).await.unwrap();
        assert_eq!(repo.count(&ctx, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_create_batch_assigns_ids() {
        let repo: Repository<Exercise, _> = Repository::new(MemoryStore::new());
        let ctx = QueryContext::background();
        let mut batch = vec![
            Exercise::new("Squat", "legs"),
            Exercise::new("Row", "back"),
            Exercise::new("Curl", "arms"),
        ];
        repo.create_batch(&ctx, &mut batch).await.unwrap();
        let ids: Vec<u64> = batch.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_create_batch_is_atomic() {
        let repo: Repository<Exercise, _> =
            Repository::new(MemoryStore::new().with_unique("exercises", "name"));
        let ctx = QueryContext::background();
        let mut batch = vec![Exercise::new("Squat", "legs"), Exercise::new("Squat", "legs")];
        let err = repo.create_batch(&ctx, &mut batch).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::AlreadyExists);
        assert_eq!(err.operation, RepositoryOperation::CreateBatch);
        assert_eq!(repo.count(&ctx, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_batch_all_or_nothing() {
        let repo: Repository<Exercise, _> = Repository::new(MemoryStore::new());
        let ctx = QueryContext::background();
        let mut existing = seed_exercises(&repo, 2).await;
        for exercise in &mut existing {
            exercise.name = format!("{} (edited)", exercise.name);
        }
        let mut ghost = Exercise::new("Ghost", "core");
        ghost.id = 99;
        existing.push(ghost);

        let err = repo.update_batch(&ctx, &mut existing).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.operation, RepositoryOperation::UpdateBatch);

        let names: Vec<String> = repo
            .get_all(&ctx, &[])
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert!(names.iter().all(|n| !n.ends_with("(edited)")));

        existing.pop();
        repo.update_batch(&ctx, &mut existing).await.unwrap();
        let edited = repo
            .count(&ctx, &[QueryOption::filter("name", existing[0].name.clone())])
            .await
            .unwrap();
        assert_eq!(edited, 1);
    }

    #[tokio::test]
    async fn test_delete_batch() {
        let repo: Repository<Exercise, _> = Repository::new(MemoryStore::new());
        let ctx = QueryContext::background();
        seed_exercises(&repo, 5).await;
        repo.delete_batch(&ctx, &[1, 3, 5]).await.unwrap();
        let left: Vec<u64> = repo
            .get_all(&ctx, &[])
            .await
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(left, vec![2, 4]);
    }
}
