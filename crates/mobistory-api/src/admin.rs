//! Handlers for partition administration.
//!
//! Partition creation is deliberately out-of-band: inserts never create a
//! missing partition, they fail with 422 until an operator (or a scheduled
//! job hitting these endpoints) registers the range.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/admin/partitions` | Registered ranges |
//! | `POST`   | `/admin/partitions` | Body: `{"year":2026,"quarter":3}` |
//! | `DELETE` | `/admin/partitions/:year/:quarter` | Prunes the quarter's events |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use mobistory_core::{event::Partition, store::LedgerStore};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;

/// `GET /admin/partitions`
pub async fn list<S: LedgerStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<Partition>>, ApiError> {
  let partitions = store
    .list_partitions()
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(partitions))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub year:    i32,
  pub quarter: u8,
}

/// `POST /admin/partitions`
pub async fn create<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let partition = store
    .create_partition(body.year, body.quarter)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(partition)))
}

/// `DELETE /admin/partitions/:year/:quarter`
pub async fn drop<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path((year, quarter)): Path<(i32, u8)>,
) -> Result<Json<serde_json::Value>, ApiError> {
  let pruned = store
    .drop_partition(year, quarter)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(json!({ "pruned_events": pruned })))
}
