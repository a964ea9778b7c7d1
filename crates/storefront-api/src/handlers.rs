//! Route handlers

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use storefront_common::{Store, StoreId, StoreStatus};
use storefront_driver::Release;
use storefront_provisioner::StoreView;

use crate::error::ApiError;
use crate::AppState;

/// `POST /api/stores` body
#[derive(Debug, Default, Deserialize)]
pub struct CreateStoreRequest {
    /// Display name; required, surrounding whitespace ignored
    #[serde(default)]
    pub name: Option<String>,
}

/// Liveness response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    message: &'static str,
}

/// Create response
#[derive(Debug, Serialize)]
pub struct CreateStoreResponse {
    message: &'static str,
    store: CreatedStore,
}

/// The record as just registered, before any reconciliation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedStore {
    id: StoreId,
    name: String,
    namespace: String,
    status: StoreStatus,
    created_at: DateTime<Utc>,
}

impl From<Store> for CreatedStore {
    fn from(store: Store) -> Self {
        Self {
            id: store.id,
            name: store.name,
            namespace: store.namespace,
            status: store.status,
            created_at: store.created_at,
        }
    }
}

/// List response
#[derive(Debug, Serialize)]
pub struct StoreList {
    stores: Vec<StoreView>,
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteStoreResponse {
    message: &'static str,
    id: StoreId,
}

/// Release listing response
#[derive(Debug, Serialize)]
pub struct ReleaseList {
    releases: Vec<Release>,
}

pub(crate) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "API is running",
    })
}

pub(crate) async fn create_store(
    State(state): State<AppState>,
    body: Result<Json<CreateStoreRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateStoreResponse>), ApiError> {
    // A missing or malformed body is the same client mistake as a blank name
    let name = body
        .ok()
        .and_then(|Json(req)| req.name)
        .unwrap_or_default();

    let created = state
        .provisioner
        .create(&name)
        .await
        .map_err(ApiError::during("create store"))?;

    Ok((
        StatusCode::CREATED,
        Json(CreateStoreResponse {
            message: "Store creation initiated",
            store: created.store.into(),
        }),
    ))
}

pub(crate) async fn list_stores(
    State(state): State<AppState>,
) -> Result<Json<StoreList>, ApiError> {
    let stores = state
        .reconciler
        .list()
        .await
        .map_err(ApiError::during("list stores"))?;
    Ok(Json(StoreList { stores }))
}

pub(crate) async fn get_store(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StoreView>, ApiError> {
    let view = state
        .reconciler
        .get(&StoreId::from(id))
        .await
        .map_err(ApiError::during("get store"))?;
    Ok(Json(view))
}

pub(crate) async fn delete_store(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteStoreResponse>, ApiError> {
    let deleted = state
        .provisioner
        .delete(&StoreId::from(id))
        .await
        .map_err(ApiError::during("delete store"))?;
    Ok(Json(DeleteStoreResponse {
        message: "Store deleted successfully",
        id: deleted.id,
    }))
}

pub(crate) async fn list_releases(State(state): State<AppState>) -> Json<ReleaseList> {
    Json(ReleaseList {
        releases: state.provisioner.releases().await,
    })
}

/// Fallback for unknown routes
pub(crate) async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
