//! Handlers for `/vehicles` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/vehicles` | Body: [`CreateBody`] |
//! | `GET`  | `/vehicles/:id` | Materialised profile; 404 if not found |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use mobistory_core::{
  store::LedgerStore,
  vehicle::{NewVehicle, VehicleProfile},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub vin:                Option<String>,
  pub renavam:            Option<String>,
  pub brand_id:           Option<Uuid>,
  pub model_id:           Option<Uuid>,
  pub version_id:         Option<Uuid>,
  pub manufacturing_year: Option<i32>,
  pub model_year:         Option<i32>,
}

/// `POST /vehicles` — returns 201 + the stored vehicle.
pub async fn create<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let vehicle = store
    .create_vehicle(NewVehicle {
      vin:                body.vin,
      renavam:            body.renavam,
      brand_id:           body.brand_id,
      model_id:           body.model_id,
      version_id:         body.version_id,
      manufacturing_year: body.manufacturing_year,
      model_year:         body.model_year,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(vehicle)))
}

/// `GET /vehicles/:id` — current plate/colour/km resolved from history.
pub async fn get_one<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<VehicleProfile>, ApiError> {
  let profile = store
    .materialize_vehicle(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("vehicle {id} not found")))?;
  Ok(Json(profile))
}
