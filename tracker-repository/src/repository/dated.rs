//! Date queries for [`Dateable`] entities

use chrono::{DateTime, Utc};

use super::error::{RepositoryOperation, RepositoryResult};
use super::generic::Repository;
use super::options::{QueryOption, QueryOptions};
use super::pagination::PaginatedResult;
use crate::context::QueryContext;
use crate::entity::Dateable;
use crate::store::{Store, ID};

/// Date column used when neither the entity nor the repository names one
const DEFAULT_DATE_FIELD: &str = "date";

impl<T: Dateable, S: Store> Repository<T, S> {
    fn dated_field(&self) -> &str {
        self.date_field().unwrap_or(DEFAULT_DATE_FIELD)
    }

    /// Default ascending date order, then the caller's options, then the range
    fn range_options(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        opts: &[QueryOption],
    ) -> Vec<QueryOption> {
        let mut combined = Vec::with_capacity(opts.len() + 2);
        combined.push(QueryOption::order_by_asc(self.dated_field()));
        combined.extend_from_slice(opts);
        combined.push(QueryOption::date_range(start, end));
        combined
    }

    /// The entity whose date equals `date` exactly
    pub async fn get_by_date(
        &self,
        ctx: &QueryContext,
        date: DateTime<Utc>,
        opts: &[QueryOption],
    ) -> RepositoryResult<T> {
        let op = RepositoryOperation::GetByDate;
        tracing::debug!(collection = T::COLLECTION, %date, "get_by_date");
        let mut combined = Vec::with_capacity(opts.len() + 2);
        combined.push(QueryOption::order_by_asc(ID));
        combined.extend_from_slice(opts);
        combined.push(QueryOption::filter(self.dated_field().to_string(), date));

        let mut options = QueryOptions::apply(&combined);
        options.limit = Some(1);
        self.with_date_column().first(ctx, op, &options).await
    }

    /// Entities with `start <= date <= end`, ascending by date unless `opts` orders otherwise
    pub async fn get_by_date_range(
        &self,
        ctx: &QueryContext,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        opts: &[QueryOption],
    ) -> RepositoryResult<Vec<T>> {
        tracing::debug!(collection = T::COLLECTION, %start, %end, "get_by_date_range");
        self.with_date_column()
            .get_all(ctx, &self.range_options(start, end, opts))
            .await
            .map_err(|err| err.with_operation(RepositoryOperation::GetByDateRange))
    }

    /// One page of [`get_by_date_range`](Self::get_by_date_range)
    pub async fn get_by_date_range_paginated(
        &self,
        ctx: &QueryContext,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: i64,
        page_size: i64,
        opts: &[QueryOption],
    ) -> RepositoryResult<PaginatedResult<T>> {
        self.with_date_column()
            .get_all_paginated(ctx, page, page_size, &self.range_options(start, end, opts))
            .await
            .map_err(|err| err.with_operation(RepositoryOperation::GetByDateRange))
    }

    /// This repository with the date column pinned, falling back to `date`
    fn with_date_column(&self) -> Self {
        self.clone().with_date_field(self.dated_field().to_string())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::context::QueryContext;
    use crate::repository::{QueryOption, Repository, RepositoryErrorKind, RepositoryOperation};
    use crate::store::MemoryStore;
    use crate::testing::WorkoutLog;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, d, 0, 0, 0).unwrap()
    }

    async fn seeded() -> Repository<WorkoutLog, MemoryStore> {
        let repo = Repository::new(MemoryStore::new());
        let ctx = QueryContext::background();
        for d in [20, 10, 15] {
            repo.create(&ctx, &mut WorkoutLog::new(day(d), 45)).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn test_range_is_inclusive_and_exact() {
        let repo = seeded().await;
        let ctx = QueryContext::background();

        let middle = repo
            .get_by_date_range(&ctx, day(12), day(18), &[])
            .await
            .unwrap();
        assert_eq!(middle.len(), 1);
        assert_eq!(middle[0].date, day(15));

        let edges = repo
            .get_by_date_range(&ctx, day(10), day(20), &[])
            .await
            .unwrap();
        let dates: Vec<_> = edges.iter().map(|log| log.date).collect();
        assert_eq!(dates, vec![day(10), day(15), day(20)]);
    }

    #[tokio::test]
    async fn test_range_order_can_be_overridden() {
        let repo = seeded().await;
        let ctx = QueryContext::background();
        let newest_first = repo
            .get_by_date_range(&ctx, day(1), day(31), &[QueryOption::order_by_desc("date")])
            .await
            .unwrap();
        assert_eq!(newest_first[0].date, day(20));
    }

    #[tokio::test]
    async fn test_range_paginated() {
        let repo = seeded().await;
        let ctx = QueryContext::background();
        let page = repo
            .get_by_date_range_paginated(&ctx, day(1), day(31), 2, 2, &[])
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].date, day(20));
        assert!(page.has_prev);
    }

    #[tokio::test]
    async fn test_get_by_date() {
        let repo = seeded().await;
        let ctx = QueryContext::background();
        let log = repo.get_by_date(&ctx, day(15), &[]).await.unwrap();
        assert_eq!(log.date, day(15));

        let err = repo.get_by_date(&ctx, day(16), &[]).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::NotFound);
        assert_eq!(err.operation, RepositoryOperation::GetByDate);
    }

    #[tokio::test]
    async fn test_date_options_on_plain_listing() {
        let repo = seeded().await;
        let ctx = QueryContext::background();
        let count = repo
            .count(&ctx, &[QueryOption::date_from(day(15))])
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
