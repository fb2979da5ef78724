//! The event projector: per-source dispatch from a committed write to the
//! derived timeline event.
//!
//! These are pure functions. A store implementation calls the one matching
//! the table it just wrote, inside the same transaction, and records the
//! returned event (if any) through its idempotent ingestion path. The
//! `(source_table, source_record_id)` key makes replays harmless, so a
//! later UPDATE to a row whose INSERT already produced an event yields no
//! second event.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
  event::{
    EventCategory, EventSeverity, EventVisibility, NewVehicleEvent, SourceRef,
    SourceTable,
  },
  link::{Link, LinkStatus},
  source::{
    Action, ActionStatus, Claim, ClaimSeverity, MileageRecord, Odometer,
    Plate, PlateStatus, Refuel, VehicleColor, VehicleCover,
  },
};

fn event(
  vehicle_id: Uuid,
  entity_id: Option<Uuid>,
  category: EventCategory,
  event_type: &str,
  event_timestamp: DateTime<Utc>,
  severity: Option<EventSeverity>,
  title: String,
  description: Option<String>,
  event_data: serde_json::Value,
  source: SourceRef,
  tags: Vec<String>,
) -> NewVehicleEvent {
  NewVehicleEvent {
    vehicle_id,
    entity_id,
    category,
    event_type: event_type.to_owned(),
    event_timestamp,
    severity,
    title,
    description,
    event_data,
    source,
    tags,
    visibility: EventVisibility::default(),
  }
}

fn date_to_utc(d: NaiveDate) -> DateTime<Utc> {
  Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).expect("midnight"))
}

fn tags(items: &[&str]) -> Vec<String> {
  items.iter().map(|s| (*s).to_owned()).collect()
}

// ─── Refuels ─────────────────────────────────────────────────────────────────

pub fn refuel_recorded(refuel: &Refuel) -> NewVehicleEvent {
  event(
    refuel.vehicle_id,
    refuel.registered_by,
    EventCategory::Usage,
    "refuel",
    refuel.refuel_date,
    None,
    format!("Refuel: {}L", refuel.quantity),
    Some("Refuel recorded".into()),
    json!({
      "liters": refuel.quantity,
      "price_per_liter": refuel.unit_price,
      "total_price": refuel.total_price,
      "odometer_reading": refuel.refuel_km,
      "full_tank": refuel.full_tank,
      "observations": refuel.observations,
    }),
    SourceRef { table: SourceTable::Refuels, record_id: refuel.refuel_id },
    tags(&["refuel", "fuel"]),
  )
}

// ─── Mileage ─────────────────────────────────────────────────────────────────

/// `previous` is the newest earlier reading for the vehicle, when one
/// exists.
pub fn mileage_recorded(
  record: &MileageRecord,
  previous: Option<i64>,
) -> NewVehicleEvent {
  event(
    record.vehicle_id,
    None,
    EventCategory::Usage,
    "mileage_update",
    record.recorded_at,
    None,
    format!("Mileage updated: {} km", record.mileage),
    Some("Mileage reading recorded".into()),
    json!({
      "mileage": record.mileage,
      "odometer_id": record.odometer_id,
      "previous_mileage": previous,
      "difference": record.mileage - previous.unwrap_or(0),
    }),
    SourceRef {
      table:     SourceTable::MileageRecords,
      record_id: record.record_id,
    },
    tags(&["mileage", "odometer"]),
  )
}

// ─── Claims ──────────────────────────────────────────────────────────────────

/// Alert severity derived from the reported damage grade. Unreported grades
/// default to a warning.
pub fn claim_alert_severity(severity: Option<ClaimSeverity>) -> EventSeverity {
  match severity {
    Some(ClaimSeverity::Minor) => EventSeverity::Warning,
    Some(ClaimSeverity::Moderate) => EventSeverity::Error,
    Some(ClaimSeverity::Severe) | Some(ClaimSeverity::TotalLoss) => {
      EventSeverity::Critical
    },
    None => EventSeverity::Warning,
  }
}

pub fn claim_reported(claim: &Claim) -> NewVehicleEvent {
  let mut claim_tags = tags(&["claim", "accident"]);
  if let Some(kind) = &claim.claim_type {
    claim_tags.push(kind.clone());
  }
  event(
    claim.vehicle_id,
    None,
    EventCategory::Alert,
    "claim_reported",
    claim.claim_date,
    Some(claim_alert_severity(claim.severity)),
    format!(
      "Claim: {}",
      claim.claim_type.as_deref().unwrap_or("unspecified")
    ),
    claim.description.clone().or_else(|| Some("Claim reported".into())),
    json!({
      "claim_type": claim.claim_type,
      "severity": claim.severity,
      "claim_km": claim.claim_km,
      "location": {
        "lat": claim.location_lat,
        "lng": claim.location_lng,
        "address": claim.address,
      },
      "police_report": claim.police_report,
      "insurance_status": claim.insurance_status,
      "total_repair_cost": claim.total_repair_cost,
      "status": claim.status,
      "description": claim.description,
    }),
    SourceRef { table: SourceTable::Claims, record_id: claim.claim_id },
    claim_tags,
  )
}

// ─── Plates ──────────────────────────────────────────────────────────────────

/// What just happened to the plate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateChange {
  Inserted,
  StatusChanged { from: PlateStatus },
}

/// Inserts only matter when the plate arrives active; updates only when the
/// status actually moved.
pub fn plate_written(
  plate: &Plate,
  change: PlateChange,
) -> Option<NewVehicleEvent> {
  let (event_type, title) = match change {
    PlateChange::Inserted => {
      if plate.status != PlateStatus::Active {
        return None;
      }
      ("plate_added", format!("Plate added: {}", plate.plate_number))
    },
    PlateChange::StatusChanged { from } => {
      if from == plate.status {
        return None;
      }
      ("plate_changed", format!("Plate changed: {}", plate.plate_number))
    },
  };

  let timestamp = plate
    .licensing_start_date
    .map(date_to_utc)
    .unwrap_or(plate.created_at);

  Some(event(
    plate.vehicle_id,
    plate.created_by,
    EventCategory::Modification,
    event_type,
    timestamp,
    None,
    title,
    Some("Vehicle plate updated".into()),
    json!({
      "plate_number": plate.plate_number,
      "state": plate.state,
      "city": plate.city,
      "licensing_start_date": plate.licensing_start_date,
      "licensing_end_date": plate.licensing_end_date,
      "status": plate.status,
    }),
    SourceRef { table: SourceTable::Plates, record_id: plate.plate_id },
    tags(&["plate", "documentation"]),
  ))
}

// ─── Links ───────────────────────────────────────────────────────────────────

/// What just happened to the link row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkChange {
  Created,
  StatusChanged { from: LinkStatus },
  /// An update that set `end_date` without moving the status.
  EndDateSet,
}

pub fn link_written(link: &Link, change: LinkChange) -> Option<NewVehicleEvent> {
  let (event_type, title, severity, previous) = match change {
    LinkChange::Created => (
      "link_created",
      "Link created".to_owned(),
      EventSeverity::Info,
      None,
    ),
    LinkChange::StatusChanged { from } => {
      if from == link.status {
        return None;
      }
      let severity = match link.status {
        LinkStatus::Terminated | LinkStatus::Revoked => EventSeverity::Error,
        LinkStatus::Rejected => EventSeverity::Warning,
        _ => EventSeverity::Info,
      };
      (
        "link_status_changed",
        format!("Link status changed: {from:?} to {:?}", link.status),
        severity,
        Some(from),
      )
    },
    LinkChange::EndDateSet => (
      "link_terminated",
      "Link closed".to_owned(),
      EventSeverity::Warning,
      None,
    ),
  };

  Some(event(
    link.vehicle_id,
    Some(link.entity_id),
    EventCategory::Modification,
    event_type,
    link.updated_at,
    Some(severity),
    title,
    Some("Entity link updated".into()),
    json!({
      "link_code": link.link_code,
      "entity_id": link.entity_id,
      "link_type_id": link.link_type_id,
      "status": link.status,
      "previous_status": previous,
      "start_date": link.start_date,
      "end_date": link.end_date,
    }),
    SourceRef { table: SourceTable::Links, record_id: link.link_id },
    tags(&["link", "access"]),
  ))
}

// ─── Odometers ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OdometerChange {
  Installed,
  Removed,
}

pub fn odometer_written(
  odometer: &Odometer,
  change: OdometerChange,
) -> NewVehicleEvent {
  let (event_type, title, severity, fallback_date) = match change {
    OdometerChange::Installed => (
      "odometer_installed",
      format!(
        "Odometer installed: {} {}",
        odometer.brand.as_deref().unwrap_or_default(),
        odometer.model.as_deref().unwrap_or_default()
      )
      .trim_end()
      .to_owned(),
      odometer.damage_type.as_ref().map(|_| EventSeverity::Warning),
      odometer.installation_date,
    ),
    OdometerChange::Removed => (
      "odometer_removed",
      "Odometer removed".to_owned(),
      Some(EventSeverity::Info),
      odometer.removal_date,
    ),
  };

  let timestamp =
    fallback_date.map(date_to_utc).unwrap_or(odometer.created_at);

  event(
    odometer.vehicle_id,
    None,
    EventCategory::Maintenance,
    event_type,
    timestamp,
    severity,
    title,
    odometer
      .reason_for_change
      .clone()
      .or_else(|| Some("Odometer maintenance".into())),
    json!({
      "brand": odometer.brand,
      "model": odometer.model,
      "part_number": odometer.part_number,
      "installation_date": odometer.installation_date,
      "removal_date": odometer.removal_date,
      "cost": odometer.cost,
      "warranty_months": odometer.warranty_months,
      "reason_for_change": odometer.reason_for_change,
      "damage_type": odometer.damage_type,
    }),
    SourceRef {
      table:     SourceTable::Odometers,
      record_id: odometer.odometer_id,
    },
    tags(&["odometer", "maintenance"]),
  )
}

// ─── Colors & covers ─────────────────────────────────────────────────────────

/// Only primary-color writes reach the timeline.
pub fn color_written(color: &VehicleColor) -> Option<NewVehicleEvent> {
  if !color.is_primary {
    return None;
  }
  Some(event(
    color.vehicle_id,
    None,
    EventCategory::Modification,
    "color_change",
    color.recorded_at,
    None,
    format!("Color changed to {}", color.color_name),
    Some("Vehicle color updated".into()),
    json!({
      "color_id": color.color_id,
      "color_name": color.color_name,
      "is_primary": color.is_primary,
    }),
    SourceRef {
      table:     SourceTable::VehicleColors,
      record_id: color.color_id,
    },
    tags(&["color", "customization"]),
  ))
}

/// Only primary-cover writes reach the timeline.
pub fn cover_written(cover: &VehicleCover) -> Option<NewVehicleEvent> {
  if !cover.is_primary {
    return None;
  }
  Some(event(
    cover.vehicle_id,
    None,
    EventCategory::Modification,
    "cover_changed",
    cover.created_at,
    None,
    "Cover photo updated".to_owned(),
    Some("Vehicle cover image changed".into()),
    json!({
      "file_id": cover.file_id,
      "file_url": cover.file_url,
      "is_primary": cover.is_primary,
      "display_order": cover.display_order,
    }),
    SourceRef {
      table:     SourceTable::VehicleCovers,
      record_id: cover.cover_id,
    },
    tags(&["photo", "cover"]),
  ))
}

// ─── Actions ─────────────────────────────────────────────────────────────────

/// Only the transition into `Completed` is event-worthy.
pub fn action_updated(
  action: &Action,
  previous: ActionStatus,
) -> Option<NewVehicleEvent> {
  if action.status != ActionStatus::Completed
    || previous == ActionStatus::Completed
  {
    return None;
  }
  Some(event(
    action.vehicle_id,
    action.executed_by,
    EventCategory::Documentation,
    "action_executed",
    action.executed_at.unwrap_or(action.created_at),
    None,
    format!("Action executed: {}", action.title),
    action.description.clone().or_else(|| Some("Action completed".into())),
    json!({
      "action_type": action.action_type,
      "title": action.title,
      "description": action.description,
      "status": action.status,
      "priority": action.priority,
      "scheduled_for": action.scheduled_for,
      "executed_at": action.executed_at,
      "executed_by_entity_id": action.executed_by,
    }),
    SourceRef { table: SourceTable::Actions, record_id: action.action_id },
    tags(&["action", "task"]),
  ))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn ts() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 10, 14, 30, 0).unwrap()
  }

  fn refuel() -> Refuel {
    Refuel {
      refuel_id:     Uuid::new_v4(),
      vehicle_id:    Uuid::new_v4(),
      registered_by: Some(Uuid::new_v4()),
      quantity:      40.0,
      unit_price:    Some(5.89),
      total_price:   Some(235.60),
      refuel_km:     Some(42_000),
      full_tank:     true,
      observations:  None,
      refuel_date:   ts(),
      created_at:    ts(),
    }
  }

  #[test]
  fn refuel_projects_usage_event_with_liters() {
    let ev = refuel_recorded(&refuel());
    assert_eq!(ev.category, EventCategory::Usage);
    assert_eq!(ev.event_type, "refuel");
    assert_eq!(ev.event_data["liters"], 40.0);
    assert_eq!(ev.title, "Refuel: 40L");
    assert_eq!(ev.event_timestamp, ts());
  }

  #[test]
  fn claim_severity_mapping() {
    assert_eq!(
      claim_alert_severity(Some(ClaimSeverity::Minor)),
      EventSeverity::Warning
    );
    assert_eq!(
      claim_alert_severity(Some(ClaimSeverity::Moderate)),
      EventSeverity::Error
    );
    assert_eq!(
      claim_alert_severity(Some(ClaimSeverity::Severe)),
      EventSeverity::Critical
    );
    assert_eq!(
      claim_alert_severity(Some(ClaimSeverity::TotalLoss)),
      EventSeverity::Critical
    );
    assert_eq!(claim_alert_severity(None), EventSeverity::Warning);
  }

  #[test]
  fn inactive_plate_insert_is_silent() {
    let plate = Plate {
      plate_id:             Uuid::new_v4(),
      vehicle_id:           Uuid::new_v4(),
      plate_number:         "ABC1D23".into(),
      state:                Some("SP".into()),
      city:                 None,
      licensing_start_date: None,
      licensing_end_date:   None,
      status:               PlateStatus::Inactive,
      created_by:           None,
      created_at:           ts(),
    };
    assert!(plate_written(&plate, PlateChange::Inserted).is_none());

    let active = Plate { status: PlateStatus::Active, ..plate };
    let ev = plate_written(&active, PlateChange::Inserted).unwrap();
    assert_eq!(ev.event_type, "plate_added");
  }

  #[test]
  fn mileage_difference_uses_previous_reading() {
    let record = MileageRecord {
      record_id:   Uuid::new_v4(),
      vehicle_id:  Uuid::new_v4(),
      odometer_id: None,
      mileage:     50_000,
      recorded_at: ts(),
    };
    let ev = mileage_recorded(&record, Some(48_500));
    assert_eq!(ev.event_data["difference"], 1_500);
    assert_eq!(ev.event_data["previous_mileage"], 48_500);
  }

  #[test]
  fn non_primary_color_is_silent() {
    let color = VehicleColor {
      color_id:    Uuid::new_v4(),
      vehicle_id:  Uuid::new_v4(),
      color_name:  "Midnight Blue".into(),
      is_primary:  false,
      recorded_at: ts(),
    };
    assert!(color_written(&color).is_none());
  }

  #[test]
  fn action_only_fires_on_completion_transition() {
    let action = Action {
      action_id:     Uuid::new_v4(),
      vehicle_id:    Uuid::new_v4(),
      action_type:   Some("inspection".into()),
      title:         "Annual inspection".into(),
      description:   None,
      status:        ActionStatus::Completed,
      priority:      None,
      scheduled_for: None,
      executed_at:   Some(ts()),
      executed_by:   Some(Uuid::new_v4()),
      created_at:    ts(),
    };
    assert!(action_updated(&action, ActionStatus::Pending).is_some());
    assert!(action_updated(&action, ActionStatus::Completed).is_none());

    let still_open = Action { status: ActionStatus::InProgress, ..action };
    assert!(action_updated(&still_open, ActionStatus::Pending).is_none());
  }

  #[test]
  fn damaged_odometer_install_warns() {
    let odometer = Odometer {
      odometer_id:       Uuid::new_v4(),
      vehicle_id:        Uuid::new_v4(),
      brand:             Some("VDO".into()),
      model:             Some("X10".into()),
      part_number:       None,
      installation_date: None,
      removal_date:      None,
      cost:              None,
      warranty_months:   Some(12),
      reason_for_change: None,
      damage_type:       Some("water".into()),
      created_at:        ts(),
    };
    let ev = odometer_written(&odometer, OdometerChange::Installed);
    assert_eq!(ev.severity, Some(EventSeverity::Warning));
    assert_eq!(ev.title, "Odometer installed: VDO X10");
  }

  #[test]
  fn link_termination_projects_error_severity() {
    let link = Link {
      link_id:        Uuid::new_v4(),
      link_code:      "LNK-1".into(),
      entity_id:      Uuid::new_v4(),
      vehicle_id:     Uuid::new_v4(),
      link_type_id:   Uuid::new_v4(),
      status:         LinkStatus::Terminated,
      start_date:     ts().date_naive(),
      end_date:       Some(ts().date_naive()),
      document_proof: None,
      validated_at:   None,
      validated_by:   None,
      observations:   None,
      created_at:     ts(),
      updated_at:     ts(),
    };
    let ev = link_written(
      &link,
      LinkChange::StatusChanged { from: LinkStatus::Active },
    )
    .unwrap();
    assert_eq!(ev.severity, Some(EventSeverity::Error));
    assert_eq!(ev.event_type, "link_status_changed");
  }
}
