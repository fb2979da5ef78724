//! Handlers for permission queries.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/permissions` | The seeded catalog |
//! | `GET` | `/permissions/check` | The core predicate, `{"granted": bool}` |
//! | `GET` | `/permissions/effective` | All codes an entity holds on a vehicle |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use mobistory_core::{permission::Permission, store::LedgerStore};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /permissions`
pub async fn catalog<S: LedgerStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<Permission>>, ApiError> {
  let permissions = store
    .list_permissions()
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(permissions))
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
  pub entity_id:  Uuid,
  pub vehicle_id: Uuid,
  pub code:       String,
}

/// `GET /permissions/check?entity_id=&vehicle_id=&code=`
pub async fn check<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<CheckParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
  let granted = store
    .has_permission(params.entity_id, params.vehicle_id, &params.code)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(json!({ "granted": granted })))
}

#[derive(Debug, Deserialize)]
pub struct EffectiveParams {
  pub entity_id:  Uuid,
  pub vehicle_id: Uuid,
}

/// `GET /permissions/effective?entity_id=&vehicle_id=`
pub async fn effective<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<EffectiveParams>,
) -> Result<Json<Vec<String>>, ApiError> {
  let codes = store
    .permissions_for(params.entity_id, params.vehicle_id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(codes))
}
