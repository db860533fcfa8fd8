//! Declarative configuration of one CRUD resource

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use super::query::ListParams;
use crate::context::QueryContext;
use crate::entity::Entity;
use crate::repository::QueryOption;

/// Default page size for list requests without pagination parameters
pub const DEFAULT_LIST_PAGE_SIZE: u32 = 20;

/// Outcome of a hook; an error message vetoes (before) or fails (after) the request
pub type HookResult<T> = Result<T, String>;

pub(crate) type EntityHook<T> =
    Arc<dyn Fn(QueryContext, T) -> BoxFuture<'static, HookResult<T>> + Send + Sync>;
pub(crate) type IdHook = Arc<dyn Fn(QueryContext, u64) -> BoxFuture<'static, HookResult<()>> + Send + Sync>;
pub(crate) type QueryBuilderFn = Arc<dyn Fn(&ListParams) -> Vec<QueryOption> + Send + Sync>;

pub(crate) struct Hooks<T> {
    pub(crate) before_create: Option<EntityHook<T>>,
    pub(crate) after_create: Option<EntityHook<T>>,
    pub(crate) before_update: Option<EntityHook<T>>,
    pub(crate) after_update: Option<EntityHook<T>>,
    pub(crate) before_delete: Option<IdHook>,
    pub(crate) after_delete: Option<IdHook>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            before_create: None,
            after_create: None,
            before_update: None,
            after_update: None,
            before_delete: None,
            after_delete: None,
        }
    }
}

/// Routes, defaults and hooks for one entity type
///
/// Every route is enabled by default, lists are paged by
/// [`DEFAULT_LIST_PAGE_SIZE`] and ordered by `id` descending, and the
/// entity's default preloads are applied.
///
/// ```rust,ignore
/// let config = CrudConfig::<Exercise>::new("/exercises", "exercise")
///     .disable_delete()
///     .default_page_size(50)
///     .before_create(|_ctx, exercise| async move {
///         if exercise.name.is_empty() {
///             return Err("name is required".to_string());
///         }
///         Ok(exercise)
///     });
/// ```
pub struct CrudConfig<T> {
    pub(crate) base_path: String,
    pub(crate) resource_name: String,
    pub(crate) enable_list: bool,
    pub(crate) enable_get: bool,
    pub(crate) enable_create: bool,
    pub(crate) enable_update: bool,
    pub(crate) enable_delete: bool,
    pub(crate) default_page_size: u32,
    pub(crate) default_order: Option<(String, bool)>,
    pub(crate) use_default_preloads: bool,
    pub(crate) request_timeout: Option<Duration>,
    pub(crate) query_builder: Option<QueryBuilderFn>,
    pub(crate) hooks: Hooks<T>,
}

impl<T> Clone for CrudConfig<T> {
    fn clone(&self) -> Self {
        Self {
            base_path: self.base_path.clone(),
            resource_name: self.resource_name.clone(),
            enable_list: self.enable_list,
            enable_get: self.enable_get,
            enable_create: self.enable_create,
            enable_update: self.enable_update,
            enable_delete: self.enable_delete,
            default_page_size: self.default_page_size,
            default_order: self.default_order.clone(),
            use_default_preloads: self.use_default_preloads,
            request_timeout: self.request_timeout,
            query_builder: self.query_builder.clone(),
            hooks: Hooks {
                before_create: self.hooks.before_create.clone(),
                after_create: self.hooks.after_create.clone(),
                before_update: self.hooks.before_update.clone(),
                after_update: self.hooks.after_update.clone(),
                before_delete: self.hooks.before_delete.clone(),
                after_delete: self.hooks.after_delete.clone(),
            },
        }
    }
}

impl<T> fmt::Debug for CrudConfig<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrudConfig")
            .field("base_path", &self.base_path)
            .field("resource_name", &self.resource_name)
            .field("enable_list", &self.enable_list)
            .field("enable_get", &self.enable_get)
            .field("enable_create", &self.enable_create)
            .field("enable_update", &self.enable_update)
            .field("enable_delete", &self.enable_delete)
            .field("default_page_size", &self.default_page_size)
            .field("default_order", &self.default_order)
            .field("use_default_preloads", &self.use_default_preloads)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl<T: Entity> CrudConfig<T> {
    /// `base_path` prefixes every route; `resource_name` keys the response bodies
    pub fn new(base_path: impl Into<String>, resource_name: impl Into<String>) -> Self {
        Self {
            base_path: normalize_base_path(&base_path.into()),
            resource_name: resource_name.into(),
            enable_list: true,
            enable_get: true,
            enable_create: true,
            enable_update: true,
            enable_delete: true,
            default_page_size: DEFAULT_LIST_PAGE_SIZE,
            default_order: Some(("id".to_string(), true)),
            use_default_preloads: true,
            request_timeout: None,
            query_builder: None,
            hooks: Hooks::default(),
        }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    /// Key of the list in list responses, e.g. `exercises`
    pub fn collection_key(&self) -> String {
        format!("{}s", self.resource_name)
    }

    #[must_use]
    pub fn disable_list(mut self) -> Self {
        self.enable_list = false;
        self
    }

    #[must_use]
    pub fn disable_get(mut self) -> Self {
        self.enable_get = false;
        self
    }

    #[must_use]
    pub fn disable_create(mut self) -> Self {
        self.enable_create = false;
        self
    }

    #[must_use]
    pub fn disable_update(mut self) -> Self {
        self.enable_update = false;
        self
    }

    #[must_use]
    pub fn disable_delete(mut self) -> Self {
        self.enable_delete = false;
        self
    }

    /// Page size for lists without pagination parameters; 0 returns everything
    #[must_use]
    pub fn default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size;
        self
    }

    /// Ordering for lists without an `orderBy` parameter
    #[must_use]
    pub fn default_order(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.default_order = Some((field.into(), descending));
        self
    }

    /// Leave list ordering to the store when no `orderBy` is given
    #[must_use]
    pub fn no_default_order(mut self) -> Self {
        self.default_order = None;
        self
    }

    #[must_use]
    pub fn use_default_preloads(mut self, enabled: bool) -> Self {
        self.use_default_preloads = enabled;
        self
    }

    /// Deadline applied to the repository calls of each request
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Replace the query parameter mapping for list requests
    ///
    /// Pagination parameters are still honoured; everything else is up to `builder`.
    #[must_use]
    pub fn query_builder<F>(mut self, builder: F) -> Self
    where
        F: Fn(&ListParams) -> Vec<QueryOption> + Send + Sync + 'static,
    {
        self.query_builder = Some(Arc::new(builder));
        self
    }

    /// Runs before insert; may rewrite the entity or veto with a 400
    #[must_use]
    pub fn before_create<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(QueryContext, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult<T>> + Send + 'static,
    {
        self.hooks.before_create = Some(entity_hook(hook));
        self
    }

    /// Runs after insert; an error answers 500 although the row is stored
    #[must_use]
    pub fn after_create<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(QueryContext, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult<T>> + Send + 'static,
    {
        self.hooks.after_create = Some(entity_hook(hook));
        self
    }

    #[must_use]
    pub fn before_update<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(QueryContext, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult<T>> + Send + 'static,
    {
        self.hooks.before_update = Some(entity_hook(hook));
        self
    }

    #[must_use]
    pub fn after_update<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(QueryContext, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult<T>> + Send + 'static,
    {
        self.hooks.after_update = Some(entity_hook(hook));
        self
    }

    #[must_use]
    pub fn before_delete<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(QueryContext, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult<()>> + Send + 'static,
    {
        self.hooks.before_delete = Some(id_hook(hook));
        self
    }

    #[must_use]
    pub fn after_delete<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(QueryContext, u64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult<()>> + Send + 'static,
    {
        self.hooks.after_delete = Some(id_hook(hook));
        self
    }
}

fn entity_hook<T, F, Fut>(hook: F) -> EntityHook<T>
where
    F: Fn(QueryContext, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult<T>> + Send + 'static,
{
    Arc::new(move |ctx: QueryContext, entity: T| -> BoxFuture<'static, HookResult<T>> {
        Box::pin(hook(ctx, entity))
    })
}

fn id_hook<F, Fut>(hook: F) -> IdHook
where
    F: Fn(QueryContext, u64) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult<()>> + Send + 'static,
{
    Arc::new(move |ctx: QueryContext, id: u64| -> BoxFuture<'static, HookResult<()>> {
        Box::pin(hook(ctx, id))
    })
}

/// Leading slash, no trailing slash; the root becomes the empty string
fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}
