//! CRUD operations for one resource, independent of HTTP

use std::sync::Arc;

use super::config::CrudConfig;
use super::error::{ApiError, ApiErrorKind, ApiOperation};
use super::query::ListParams;
use crate::context::QueryContext;
use crate::entity::Entity;
use crate::repository::{PageMeta, QueryOption, Repository, RepositoryError};
use crate::store::Store;

/// Entities of one list request, with page metadata when paginated
#[derive(Debug, Clone, PartialEq)]
pub struct ListOutcome<T> {
    pub items: Vec<T>,
    pub pagination: Option<PageMeta>,
}

/// A repository plus the configuration of its routes
///
/// Each operation builds its own [`QueryContext`], bounded by the configured
/// request timeout.
pub struct CrudResource<T, S> {
    repository: Repository<T, S>,
    config: Arc<CrudConfig<T>>,
}

impl<T, S: Clone> Clone for CrudResource<T, S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T: Entity, S> std::fmt::Debug for CrudResource<T, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudResource")
            .field("repository", &self.repository)
            .field("config", &self.config)
            .finish()
    }
}

impl<T: Entity, S: Store> CrudResource<T, S> {
    pub fn new(repository: Repository<T, S>, config: CrudConfig<T>) -> Self {
        Self {
            repository,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &CrudConfig<T> {
        &self.config
    }

    pub fn repository(&self) -> &Repository<T, S> {
        &self.repository
    }

    /// Fresh context for one request
    pub fn context(&self) -> QueryContext {
        match self.config.request_timeout {
            Some(timeout) => QueryContext::background().with_timeout(timeout),
            None => QueryContext::background(),
        }
    }

    fn not_found(&self, id: u64, operation: ApiOperation) -> ApiError {
        ApiError::not_found(self.config.resource_name.clone(), id.to_string()).with_operation(operation)
    }

    /// Repository errors, with not-found rendered as `"<resource> not found"`
    fn map_error(&self, err: RepositoryError, operation: ApiOperation, id: Option<u64>) -> ApiError {
        match id {
            Some(id) if err.is_not_found() => self.not_found(id, operation),
            _ => ApiError::from(err).with_operation(operation),
        }
    }

    /// List with explicit pagination, the default page size, or everything
    pub async fn list(&self, ctx: &QueryContext, params: &ListParams) -> Result<ListOutcome<T>, ApiError> {
        let opts = match &self.config.query_builder {
            Some(builder) => builder(params),
            None => params.to_options(
                self.config.default_order.as_ref(),
                self.config.use_default_preloads,
            ),
        };

        let paging = params.pagination().or_else(|| {
            (self.config.default_page_size > 0).then(|| (1, i64::from(self.config.default_page_size)))
        });

        match paging {
            Some((page, page_size)) => {
                let result = self
                    .repository
                    .get_all_paginated(ctx, page, page_size, &opts)
                    .await
                    .map_err(|err| self.map_error(err, ApiOperation::List, None))?;
                let meta = result.meta();
                Ok(ListOutcome {
                    items: result.data,
                    pagination: Some(meta),
                })
            }
            None => {
                let items = self
                    .repository
                    .get_all(ctx, &opts)
                    .await
                    .map_err(|err| self.map_error(err, ApiOperation::List, None))?;
                Ok(ListOutcome {
                    items,
                    pagination: None,
                })
            }
        }
    }

    pub async fn get(&self, ctx: &QueryContext, id: u64) -> Result<T, ApiError> {
        let preloads = if self.config.use_default_preloads {
            QueryOption::default_preloads()
        } else {
            QueryOption::no_preloads()
        };
        self.repository
            .get_by_id(ctx, id, &[preloads])
            .await
            .map_err(|err| self.map_error(err, ApiOperation::Get, Some(id)))
    }

    /// Insert, running the create hooks around it
    pub async fn create(&self, ctx: &QueryContext, entity: T) -> Result<T, ApiError> {
        let mut entity = match &self.config.hooks.before_create {
            Some(hook) => hook(ctx.clone(), entity)
                .await
                .map_err(|msg| vetoed(ApiOperation::Create, msg))?,
            None => entity,
        };

        self.repository
            .create(ctx, &mut entity)
            .await
            .map_err(|err| self.map_error(err, ApiOperation::Create, None))?;
        tracing::debug!(resource = %self.config.resource_name, id = entity.id(), "created");

        match &self.config.hooks.after_create {
            Some(hook) => hook(ctx.clone(), entity)
                .await
                .map_err(|msg| hook_failed(ApiOperation::Create, msg)),
            None => Ok(entity),
        }
    }

    /// Replace the entity stored under `id`
    ///
    /// A non-zero identifier in `entity` must equal `id`; `id` is written onto
    /// the entity before the update.
    pub async fn update(&self, ctx: &QueryContext, id: u64, mut entity: T) -> Result<T, ApiError> {
        reconcile_id(&mut entity, id)?;

        let mut entity = match &self.config.hooks.before_update {
            Some(hook) => hook(ctx.clone(), entity)
                .await
                .map_err(|msg| vetoed(ApiOperation::Update, msg))?,
            None => entity,
        };

        self.repository
            .update(ctx, &mut entity)
            .await
            .map_err(|err| self.map_error(err, ApiOperation::Update, Some(id)))?;

        match &self.config.hooks.after_update {
            Some(hook) => hook(ctx.clone(), entity)
                .await
                .map_err(|msg| hook_failed(ApiOperation::Update, msg)),
            None => Ok(entity),
        }
    }

    pub async fn delete(&self, ctx: &QueryContext, id: u64) -> Result<(), ApiError> {
        if let Some(hook) = &self.config.hooks.before_delete {
            hook(ctx.clone(), id)
                .await
                .map_err(|msg| vetoed(ApiOperation::Delete, msg))?;
        }

        self.repository
            .delete(ctx, id)
            .await
            .map_err(|err| self.map_error(err, ApiOperation::Delete, Some(id)))?;

        if let Some(hook) = &self.config.hooks.after_delete {
            hook(ctx.clone(), id)
                .await
                .map_err(|msg| hook_failed(ApiOperation::Delete, msg))?;
        }
        Ok(())
    }
}

/// Make `id` authoritative, rejecting a different non-zero body identifier
fn reconcile_id<T: Entity>(entity: &mut T, id: u64) -> Result<(), ApiError> {
    let body_id = entity.id();
    if body_id != 0 && body_id != id {
        return Err(ApiError::bad_request("ID in body does not match URL parameter")
            .with_operation(ApiOperation::Update));
    }
    entity.set_id(id);
    Ok(())
}

fn vetoed(operation: ApiOperation, message: String) -> ApiError {
    ApiError::new(operation, ApiErrorKind::BadRequest, message)
}

fn hook_failed(operation: ApiOperation, message: String) -> ApiError {
    ApiError::new(operation, ApiErrorKind::InternalError, message)
}
