//! Source-of-truth records the event log is derived from.
//!
//! Each write to one of these tables is projected into at most one
//! [`crate::event::VehicleEvent`] by [`crate::projector`], inside the same
//! transaction as the source write. Links are the ninth source and live in
//! [`crate::link`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Refuels ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refuel {
  pub refuel_id:     Uuid,
  pub vehicle_id:    Uuid,
  pub registered_by: Option<Uuid>,
  pub quantity:      f64,
  pub unit_price:    Option<f64>,
  pub total_price:   Option<f64>,
  /// Odometer reading at the pump.
  pub refuel_km:     Option<i64>,
  pub full_tank:     bool,
  pub observations:  Option<String>,
  pub refuel_date:   DateTime<Utc>,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRefuel {
  pub vehicle_id:    Uuid,
  pub registered_by: Option<Uuid>,
  pub quantity:      f64,
  pub unit_price:    Option<f64>,
  pub total_price:   Option<f64>,
  pub refuel_km:     Option<i64>,
  pub full_tank:     bool,
  pub observations:  Option<String>,
  pub refuel_date:   DateTime<Utc>,
}

// ─── Mileage ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MileageRecord {
  pub record_id:   Uuid,
  pub vehicle_id:  Uuid,
  pub odometer_id: Option<Uuid>,
  pub mileage:     i64,
  pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMileageRecord {
  pub vehicle_id:  Uuid,
  pub odometer_id: Option<Uuid>,
  pub mileage:     i64,
  pub recorded_at: DateTime<Utc>,
}

// ─── Claims ──────────────────────────────────────────────────────────────────

/// Damage grade reported with a claim. Unreported severity is projected as a
/// warning-level alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSeverity {
  Minor,
  Moderate,
  Severe,
  TotalLoss,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
  pub claim_id:          Uuid,
  pub vehicle_id:        Uuid,
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
  pub status:            String,
  pub description:       Option<String>,
  pub created_at:        DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewClaim {
  pub vehicle_id:        Uuid,
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

// ─── Plates ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlateStatus {
  Active,
  Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plate {
  pub plate_id:             Uuid,
  pub vehicle_id:           Uuid,
  pub plate_number:         String,
  pub state:                Option<String>,
  pub city:                 Option<String>,
  pub licensing_start_date: Option<NaiveDate>,
  pub licensing_end_date:   Option<NaiveDate>,
  pub status:               PlateStatus,
  pub created_by:           Option<Uuid>,
  pub created_at:           DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPlate {
  pub vehicle_id:           Uuid,
  pub plate_number:         String,
  pub state:                Option<String>,
  pub city:                 Option<String>,
  pub licensing_start_date: Option<NaiveDate>,
  pub licensing_end_date:   Option<NaiveDate>,
  pub status:               PlateStatus,
  pub created_by:           Option<Uuid>,
}

// ─── Odometers ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Odometer {
  pub odometer_id:       Uuid,
  pub vehicle_id:        Uuid,
  pub brand:             Option<String>,
  pub model:             Option<String>,
  pub part_number:       Option<String>,
  pub installation_date: Option<NaiveDate>,
  pub removal_date:      Option<NaiveDate>,
  pub cost:              Option<f64>,
  pub warranty_months:   Option<i32>,
  pub reason_for_change: Option<String>,
  /// Set when the unit replaced a damaged one; drives a warning-level event.
  pub damage_type:       Option<String>,
  pub created_at:        DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOdometer {
  pub vehicle_id:        Uuid,
  pub brand:             Option<String>,
  pub model:             Option<String>,
  pub part_number:       Option<String>,
  pub installation_date: Option<NaiveDate>,
  pub cost:              Option<f64>,
  pub warranty_months:   Option<i32>,
  pub reason_for_change: Option<String>,
  pub damage_type:       Option<String>,
}

// ─── Colors & covers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleColor {
  pub color_id:    Uuid,
  pub vehicle_id:  Uuid,
  pub color_name:  String,
  pub is_primary:  bool,
  pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVehicleColor {
  pub vehicle_id: Uuid,
  pub color_name: String,
  pub is_primary: bool,
}

/// A vehicle photo reference. The binary lives in the external blob store;
/// only the file id and resolved URL are kept here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleCover {
  pub cover_id:      Uuid,
  pub vehicle_id:    Uuid,
  pub file_id:       Uuid,
  pub file_url:      Option<String>,
  pub is_primary:    bool,
  pub display_order: i32,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVehicleCover {
  pub vehicle_id:    Uuid,
  pub file_id:       Uuid,
  pub file_url:      Option<String>,
  pub is_primary:    bool,
  pub display_order: i32,
}

// ─── Actions ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
  Pending,
  InProgress,
  Completed,
  Cancelled,
}

/// A scheduled or executed task on a vehicle. Only the transition into
/// `Completed` reaches the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
  pub action_id:     Uuid,
  pub vehicle_id:    Uuid,
  pub action_type:   Option<String>,
  pub title:         String,
  pub description:   Option<String>,
  pub status:        ActionStatus,
  pub priority:      Option<String>,
  pub scheduled_for: Option<DateTime<Utc>>,
  pub executed_at:   Option<DateTime<Utc>>,
  pub executed_by:   Option<Uuid>,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAction {
  pub vehicle_id:    Uuid,
  pub action_type:   Option<String>,
  pub title:         String,
  pub description:   Option<String>,
  pub priority:      Option<String>,
  pub scheduled_for: Option<DateTime<Utc>>,
}
