//! Axum routes for a [`CrudResource`]
//!
//! | Method   | Path          | Body                                   |
//! |----------|---------------|----------------------------------------|
//! | `GET`    | `{base}/all`  | `{"<resource>s": [...], "pagination"}` |
//! | `GET`    | `{base}/{id}` | `{"<resource>": {...}}`                |
//! | `POST`   | `{base}`      | `{"<resource>": {...}}`, 201           |
//! | `PUT`    | `{base}/{id}` | `{"<resource>": {...}}`                |
//! | `DELETE` | `{base}/{id}` | `{"success": true}`                    |

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, MethodRouter},
    Json, Router,
};
use serde_json::{json, Map, Value};

use super::error::{ApiError, ApiOperation};
use super::query::ListParams;
use super::resource::CrudResource;
use crate::entity::Entity;
use crate::store::Store;

impl<T: Entity, S: Store> CrudResource<T, S> {
    /// Router with the enabled routes, ready to merge or nest into an app
    pub fn into_router<AppState>(self) -> Router<AppState>
    where
        AppState: Clone + Send + Sync + 'static,
    {
        let config = self.config();
        let base = config.base_path().to_string();
        let collection_path = if base.is_empty() { "/".to_string() } else { base.clone() };
        let item_path = format!("{base}/{{id}}");

        let mut router = Router::new();
        if config.enable_list {
            router = router.route(&format!("{base}/all"), get(list::<T, S>));
        }
        if config.enable_create {
            router = router.route(&collection_path, axum::routing::post(create::<T, S>));
        }

        let mut item = MethodRouter::new();
        let mut has_item_route = false;
        if config.enable_get {
            item = item.get(get_one::<T, S>);
            has_item_route = true;
        }
        if config.enable_update {
            item = item.put(update::<T, S>);
            has_item_route = true;
        }
        if config.enable_delete {
            item = item.delete(delete::<T, S>);
            has_item_route = true;
        }
        if has_item_route {
            router = router.route(&item_path, item);
        }

        tracing::debug!(
            resource = %config.resource_name(),
            base = %collection_path,
            "registered CRUD routes"
        );
        router.with_state(self)
    }
}

fn parse_id(path: Result<Path<u64>, PathRejection>, operation: ApiOperation) -> Result<u64, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|_| ApiError::bad_request("Invalid ID").with_operation(operation))
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>, operation: ApiOperation) -> Result<T, ApiError> {
    body.map(|Json(entity)| entity)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()).with_operation(operation))
}

fn to_value<V: serde::Serialize>(value: &V, operation: ApiOperation) -> Result<Value, ApiError> {
    serde_json::to_value(value)
        .map_err(|err| ApiError::internal(err.to_string()).with_operation(operation))
}

/// `{"<resource>": entity}`
fn single<T: Entity, S: Store>(
    resource: &CrudResource<T, S>,
    entity: &T,
    operation: ApiOperation,
) -> Result<Json<Value>, ApiError> {
    let mut body = Map::new();
    body.insert(
        resource.config().resource_name().to_string(),
        to_value(entity, operation)?,
    );
    Ok(Json(Value::Object(body)))
}

async fn list<T: Entity, S: Store>(
    State(resource): State<CrudResource<T, S>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> Result<Json<Value>, ApiError> {
    let Query(pairs) = query.map_err(|rejection| {
        ApiError::bad_request(rejection.body_text()).with_operation(ApiOperation::List)
    })?;
    let params = ListParams::from_pairs(pairs);
    let ctx = resource.context();
    let outcome = resource.list(&ctx, &params).await?;

    let mut body = Map::new();
    body.insert(
        resource.config().collection_key(),
        to_value(&outcome.items, ApiOperation::List)?,
    );
    if let Some(meta) = outcome.pagination {
        body.insert("pagination".to_string(), to_value(&meta, ApiOperation::List)?);
    }
    Ok(Json(Value::Object(body)))
}

async fn get_one<T: Entity, S: Store>(
    State(resource): State<CrudResource<T, S>>,
    path: Result<Path<u64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(path, ApiOperation::Get)?;
    let ctx = resource.context();
    let entity = resource.get(&ctx, id).await?;
    single(&resource, &entity, ApiOperation::Get)
}

async fn create<T: Entity, S: Store>(
    State(resource): State<CrudResource<T, S>>,
    body: Result<Json<T>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let entity = parse_body(body, ApiOperation::Create)?;
    let ctx = resource.context();
    let created = resource.create(&ctx, entity).await?;
    Ok((StatusCode::CREATED, single(&resource, &created, ApiOperation::Create)?))
}

async fn update<T: Entity, S: Store>(
    State(resource): State<CrudResource<T, S>>,
    path: Result<Path<u64>, PathRejection>,
    body: Result<Json<T>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(path, ApiOperation::Update)?;
    let entity = parse_body(body, ApiOperation::Update)?;
    let ctx = resource.context();
    let updated = resource.update(&ctx, id, entity).await?;
    single(&resource, &updated, ApiOperation::Update)
}

async fn delete<T: Entity, S: Store>(
    State(resource): State<CrudResource<T, S>>,
    path: Result<Path<u64>, PathRejection>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(path, ApiOperation::Delete)?;
    let ctx = resource.context();
    resource.delete(&ctx, id).await?;
    Ok(Json(json!({ "success": true })))
}
