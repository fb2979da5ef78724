//! Handlers for the source-record writes the event log is derived from.
//!
//! Each `POST` commits the source row and its projected timeline event in
//! one store transaction; a missing partition rejects the whole write.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/vehicles/:id/refuels` | usage / `refuel` |
//! | `POST` | `/vehicles/:id/mileage` | usage / `mileage_update` |
//! | `POST` | `/vehicles/:id/claims` | alert, severity mapped from damage |
//! | `POST` | `/vehicles/:id/plates` | modification, active plates only |
//! | `POST` | `/vehicles/:id/odometers` | maintenance |
//! | `POST` | `/vehicles/:id/colors` / `covers` | primary rows only |
//! | `POST` | `/vehicles/:id/actions` | no event until completion |
//! | `POST` | `/plates/:id/status`, `/odometers/:id/remove`, `/actions/:id/complete` | updates |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, NaiveDate, Utc};
use mobistory_core::{
  source::{
    Action, ClaimSeverity, NewAction, NewClaim, NewMileageRecord,
    NewOdometer, NewPlate, NewRefuel, NewVehicleColor, NewVehicleCover,
    Odometer, Plate, PlateStatus,
  },
  store::LedgerStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Refuels ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RefuelBody {
  pub registered_by: Option<Uuid>,
  pub quantity:      f64,
  pub unit_price:    Option<f64>,
  pub total_price:   Option<f64>,
  pub refuel_km:     Option<i64>,
  #[serde(default)]
  pub full_tank:     bool,
  pub observations:  Option<String>,
  pub refuel_date:   DateTime<Utc>,
}

/// `POST /vehicles/:id/refuels`
pub async fn refuel<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(vehicle_id): Path<Uuid>,
  Json(body): Json<RefuelBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = store
    .record_refuel(NewRefuel {
      vehicle_id,
      registered_by: body.registered_by,
      quantity: body.quantity,
      unit_price: body.unit_price,
      total_price: body.total_price,
      refuel_km: body.refuel_km,
      full_tank: body.full_tank,
      observations: body.observations,
      refuel_date: body.refuel_date,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── Mileage ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MileageBody {
  pub odometer_id: Option<Uuid>,
  pub mileage:     i64,
  pub recorded_at: DateTime<Utc>,
}

/// `POST /vehicles/:id/mileage`
pub async fn mileage<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(vehicle_id): Path<Uuid>,
  Json(body): Json<MileageBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = store
    .record_mileage(NewMileageRecord {
      vehicle_id,
      odometer_id: body.odometer_id,
      mileage: body.mileage,
      recorded_at: body.recorded_at,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── Claims ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
  pub link_id:           Option<Uuid>,
  pub claim_type:        Option<String>,
  pub severity:          Option<ClaimSeverity>,
  pub claim_date:        DateTime<Utc>,
  pub claim_km:          Option<i64>,
  pub location_lat:      Option<f64>,
  pub location_lng:      Option<f64>,
  pub address:           Option<String>,
  pub police_report:     Option<String>,
  pub insurance_status:  Option<String>,
  pub total_repair_cost: Option<f64>,
  pub description:       Option<String>,
}

/// `POST /vehicles/:id/claims`
pub async fn claim<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(vehicle_id): Path<Uuid>,
  Json(body): Json<ClaimBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = store
    .report_claim(NewClaim {
      vehicle_id,
      link_id: body.link_id,
      claim_type: body.claim_type,
      severity: body.severity,
      claim_date: body.claim_date,
      claim_km: body.claim_km,
      location_lat: body.location_lat,
      location_lng: body.location_lng,
      address: body.address,
      police_report: body.police_report,
      insurance_status: body.insurance_status,
      total_repair_cost: body.total_repair_cost,
      description: body.description,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── Plates ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PlateBody {
  pub plate_number:         String,
  pub state:                Option<String>,
  pub city:                 Option<String>,
  pub licensing_start_date: Option<NaiveDate>,
  pub licensing_end_date:   Option<NaiveDate>,
  pub status:               PlateStatus,
  pub created_by:           Option<Uuid>,
}

/// `POST /vehicles/:id/plates`
pub async fn plate<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(vehicle_id): Path<Uuid>,
  Json(body): Json<PlateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = store
    .add_plate(NewPlate {
      vehicle_id,
      plate_number: body.plate_number,
      state: body.state,
      city: body.city,
      licensing_start_date: body.licensing_start_date,
      licensing_end_date: body.licensing_end_date,
      status: body.status,
      created_by: body.created_by,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct PlateStatusBody {
  pub status: PlateStatus,
}

/// `POST /plates/:id/status`
pub async fn plate_status<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(plate_id): Path<Uuid>,
  Json(body): Json<PlateStatusBody>,
) -> Result<Json<Plate>, ApiError> {
  let record = store
    .change_plate_status(plate_id, body.status)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(record))
}

// ─── Odometers ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OdometerBody {
  pub brand:             Option<String>,
  pub model:             Option<String>,
  pub part_number:       Option<String>,
  pub installation_date: Option<NaiveDate>,
  pub cost:              Option<f64>,
  pub warranty_months:   Option<i32>,
  pub reason_for_change: Option<String>,
  pub damage_type:       Option<String>,
}

/// `POST /vehicles/:id/odometers`
pub async fn odometer<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(vehicle_id): Path<Uuid>,
  Json(body): Json<OdometerBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = store
    .install_odometer(NewOdometer {
      vehicle_id,
      brand: body.brand,
      model: body.model,
      part_number: body.part_number,
      installation_date: body.installation_date,
      cost: body.cost,
      warranty_months: body.warranty_months,
      reason_for_change: body.reason_for_change,
      damage_type: body.damage_type,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct OdometerRemoveBody {
  pub removal_date: NaiveDate,
}

/// `POST /odometers/:id/remove`
pub async fn odometer_remove<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(odometer_id): Path<Uuid>,
  Json(body): Json<OdometerRemoveBody>,
) -> Result<Json<Odometer>, ApiError> {
  let record = store
    .remove_odometer(odometer_id, body.removal_date)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(record))
}

// ─── Colors & covers ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ColorBody {
  pub color_name: String,
  #[serde(default)]
  pub is_primary: bool,
}

/// `POST /vehicles/:id/colors`
pub async fn color<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(vehicle_id): Path<Uuid>,
  Json(body): Json<ColorBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = store
    .set_color(NewVehicleColor {
      vehicle_id,
      color_name: body.color_name,
      is_primary: body.is_primary,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct CoverBody {
  /// Reference into the external blob store.
  pub file_id:       Uuid,
  pub file_url:      Option<String>,
  #[serde(default)]
  pub is_primary:    bool,
  #[serde(default)]
  pub display_order: i32,
}

/// `POST /vehicles/:id/covers`
pub async fn cover<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(vehicle_id): Path<Uuid>,
  Json(body): Json<CoverBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = store
    .set_cover(NewVehicleCover {
      vehicle_id,
      file_id: body.file_id,
      file_url: body.file_url,
      is_primary: body.is_primary,
      display_order: body.display_order,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── Actions ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ActionBody {
  pub action_type:   Option<String>,
  pub title:         String,
  pub description:   Option<String>,
  pub priority:      Option<String>,
  pub scheduled_for: Option<DateTime<Utc>>,
}

/// `POST /vehicles/:id/actions`
pub async fn action<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(vehicle_id): Path<Uuid>,
  Json(body): Json<ActionBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = store
    .create_action(NewAction {
      vehicle_id,
      action_type: body.action_type,
      title: body.title,
      description: body.description,
      priority: body.priority,
      scheduled_for: body.scheduled_for,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

#[derive(Debug, Deserialize)]
pub struct ActionCompleteBody {
  pub executed_by: Option<Uuid>,
}

/// `POST /actions/:id/complete` — the only action update that reaches the
/// timeline.
pub async fn action_complete<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(action_id): Path<Uuid>,
  Json(body): Json<ActionCompleteBody>,
) -> Result<Json<Action>, ApiError> {
  let record = store
    .complete_action(action_id, body.executed_by)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(record))
}
