//! Vehicle — the aggregate every link and event hangs off.
//!
//! Current plate, colour, and mileage are not columns on the vehicle row:
//! they are derived from the newest rows of the respective history tables
//! and exposed only on the materialised [`VehicleProfile`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The vehicle row. Brand/model/version are optional catalog references so
/// custom or unlisted vehicles remain representable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
  pub vehicle_id:         Uuid,
  /// Unique when present.
  pub vin:                Option<String>,
  /// Brazilian registry number; unique when present.
  pub renavam:            Option<String>,
  pub brand_id:           Option<Uuid>,
  pub model_id:           Option<Uuid>,
  pub version_id:         Option<Uuid>,
  pub manufacturing_year: Option<i32>,
  pub model_year:         Option<i32>,
  pub created_at:         DateTime<Utc>,
}

/// Input to [`crate::store::LedgerStore::create_vehicle`].
#[derive(Debug, Clone, Default)]
pub struct NewVehicle {
  pub vin:                Option<String>,
  pub renavam:            Option<String>,
  pub brand_id:           Option<Uuid>,
  pub model_id:           Option<Uuid>,
  pub version_id:         Option<Uuid>,
  pub manufacturing_year: Option<i32>,
  pub model_year:         Option<i32>,
}

/// The computed read model: the row plus the current plate, colour, and
/// odometer reading resolved from history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleProfile {
  pub vehicle:       Vehicle,
  pub current_plate: Option<String>,
  pub current_color: Option<String>,
  pub current_km:    Option<i64>,
}
