//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, `+00:00` offset) so lexicographic comparison in SQL matches
//! chronological order — the timeline keyset relies on this. Dates are
//! `YYYY-MM-DD`. UUIDs are hyphenated lowercase. Enums are their serde
//! snake_case tags. Tags and event payloads are compact JSON.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use mobistory_core::{
  entity::{ContactType, Entity, EntityContact, EntityName, EntityKind, NameType},
  event::{
    EventCategory, EventSeverity, EventVisibility, Partition, SourceRef,
    SourceTable, VehicleEvent,
  },
  link::{Link, LinkRole, LinkStatus, LinkStatusChange},
  permission::{Permission, PermissionCategory},
  source::{
    Action, ActionStatus, Claim, ClaimSeverity, MileageRecord, Odometer,
    Plate, PlateStatus, Refuel, VehicleColor, VehicleCover,
  },
  vehicle::Vehicle,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, false)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_tags(tags: &[String]) -> Result<String> {
  Ok(serde_json::to_string(tags)?)
}

pub fn decode_tags(s: &str) -> Result<Vec<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Enum tokens ─────────────────────────────────────────────────────────────

macro_rules! token_codec {
  ($encode:ident, $decode:ident, $ty:ty, $what:literal,
   { $($variant:path => $token:literal),+ $(,)? }) => {
    pub fn $encode(v: $ty) -> &'static str {
      match v { $($variant => $token,)+ }
    }

    pub fn $decode(s: &str) -> Result<$ty> {
      match s {
        $($token => Ok($variant),)+
        other => Err(Error::UnknownToken { what: $what, value: other.into() }),
      }
    }
  };
}

token_codec!(encode_entity_kind, decode_entity_kind, EntityKind, "entity kind", {
  EntityKind::Person => "person",
  EntityKind::Company => "company",
  EntityKind::Device => "device",
});

token_codec!(encode_name_type, decode_name_type, NameType, "name type", {
  NameType::LegalName => "legal_name",
  NameType::DisplayName => "display_name",
  NameType::Nickname => "nickname",
  NameType::Alias => "alias",
  NameType::TradeName => "trade_name",
});

token_codec!(encode_contact_type, decode_contact_type, ContactType, "contact type", {
  ContactType::Email => "email",
  ContactType::Phone => "phone",
  ContactType::Whatsapp => "whatsapp",
  ContactType::ApiEndpoint => "api_endpoint",
  ContactType::MqttTopic => "mqtt_topic",
});

token_codec!(encode_link_status, decode_link_status, LinkStatus, "link status", {
  LinkStatus::PendingRequest => "pending_request",
  LinkStatus::PendingValidation => "pending_validation",
  LinkStatus::Active => "active",
  LinkStatus::Rejected => "rejected",
  LinkStatus::Terminated => "terminated",
  LinkStatus::Revoked => "revoked",
});

token_codec!(encode_plate_status, decode_plate_status, PlateStatus, "plate status", {
  PlateStatus::Active => "active",
  PlateStatus::Inactive => "inactive",
});

token_codec!(encode_action_status, decode_action_status, ActionStatus, "action status", {
  ActionStatus::Pending => "pending",
  ActionStatus::InProgress => "in_progress",
  ActionStatus::Completed => "completed",
  ActionStatus::Cancelled => "cancelled",
});

token_codec!(encode_claim_severity, decode_claim_severity, ClaimSeverity, "claim severity", {
  ClaimSeverity::Minor => "minor",
  ClaimSeverity::Moderate => "moderate",
  ClaimSeverity::Severe => "severe",
  ClaimSeverity::TotalLoss => "total_loss",
});

token_codec!(encode_category, decode_category, EventCategory, "event category", {
  EventCategory::Usage => "usage",
  EventCategory::Maintenance => "maintenance",
  EventCategory::Modification => "modification",
  EventCategory::Alert => "alert",
  EventCategory::Financial => "financial",
  EventCategory::Documentation => "documentation",
});

token_codec!(encode_severity, decode_severity, EventSeverity, "event severity", {
  EventSeverity::Info => "info",
  EventSeverity::Warning => "warning",
  EventSeverity::Error => "error",
  EventSeverity::Critical => "critical",
});

token_codec!(encode_visibility, decode_visibility, EventVisibility, "event visibility", {
  EventVisibility::OwnerOnly => "owner_only",
  EventVisibility::LinkedEntities => "linked_entities",
  EventVisibility::Public => "public",
});

token_codec!(encode_permission_category, decode_permission_category, PermissionCategory, "permission category", {
  PermissionCategory::Operation => "operation",
  PermissionCategory::Management => "management",
  PermissionCategory::Administration => "administration",
});

pub fn decode_source_table(s: &str) -> Result<SourceTable> {
  for table in [
    SourceTable::Refuels,
    SourceTable::MileageRecords,
    SourceTable::Claims,
    SourceTable::Plates,
    SourceTable::Links,
    SourceTable::Odometers,
    SourceTable::VehicleColors,
    SourceTable::VehicleCovers,
    SourceTable::Actions,
  ] {
    if table.as_str() == s {
      return Ok(table);
    }
  }
  Err(Error::UnknownToken { what: "source table", value: s.into() })
}

// ─── Row mapping ─────────────────────────────────────────────────────────────
//
// Each `*_from_row` decodes the columns of the matching `*_COLS` select
// list, in order. Decode failures are reported through rusqlite's
// conversion error so they surface through the normal query path.

fn conv(e: Error) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(
    0,
    rusqlite::types::Type::Text,
    Box::new(e),
  )
}

fn get_uuid(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Uuid> {
  let s: String = row.get(idx)?;
  decode_uuid(&s).map_err(conv)
}

fn get_uuid_opt(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<Uuid>> {
  let s: Option<String> = row.get(idx)?;
  s.as_deref().map(decode_uuid).transpose().map_err(conv)
}

fn get_dt(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
  let s: String = row.get(idx)?;
  decode_dt(&s).map_err(conv)
}

fn get_dt_opt(
  row: &rusqlite::Row,
  idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
  let s: Option<String> = row.get(idx)?;
  s.as_deref().map(decode_dt).transpose().map_err(conv)
}

fn get_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
  let s: String = row.get(idx)?;
  decode_date(&s).map_err(conv)
}

fn get_date_opt(
  row: &rusqlite::Row,
  idx: usize,
) -> rusqlite::Result<Option<NaiveDate>> {
  let s: Option<String> = row.get(idx)?;
  s.as_deref().map(decode_date).transpose().map_err(conv)
}

// ── Entities ──────────────────────────────────────────────────────────────

pub const ENTITY_COLS: &str = "entity_id, entity_code, kind, legal_id, \
   active, verified, is_anonymous, device_fingerprint, primary_name_id, \
   primary_email_id, primary_phone_id, created_at";

pub fn entity_from_row(row: &rusqlite::Row) -> rusqlite::Result<Entity> {
  let kind: String = row.get(2)?;
  Ok(Entity {
    entity_id:          get_uuid(row, 0)?,
    entity_code:        row.get(1)?,
    kind:               decode_entity_kind(&kind).map_err(conv)?,
    legal_id:           row.get(3)?,
    active:             row.get(4)?,
    verified:           row.get(5)?,
    is_anonymous:       row.get(6)?,
    device_fingerprint: row.get(7)?,
    primary_name_id:    get_uuid_opt(row, 8)?,
    primary_email_id:   get_uuid_opt(row, 9)?,
    primary_phone_id:   get_uuid_opt(row, 10)?,
    created_at:         get_dt(row, 11)?,
  })
}

pub const NAME_COLS: &str = "name_id, entity_id, name_type, value, \
   is_current, start_date, end_date, reason, changed_by";

pub fn name_from_row(row: &rusqlite::Row) -> rusqlite::Result<EntityName> {
  let name_type: String = row.get(2)?;
  Ok(EntityName {
    name_id:    get_uuid(row, 0)?,
    entity_id:  get_uuid(row, 1)?,
    name_type:  decode_name_type(&name_type).map_err(conv)?,
    value:      row.get(3)?,
    is_current: row.get(4)?,
    start_date: get_date(row, 5)?,
    end_date:   get_date_opt(row, 6)?,
    reason:     row.get(7)?,
    changed_by: get_uuid_opt(row, 8)?,
  })
}

pub const CONTACT_COLS: &str = "contact_id, entity_id, contact_type, value, \
   is_current, is_verified, verified_at, label, start_date, end_date";

pub fn contact_from_row(row: &rusqlite::Row) -> rusqlite::Result<EntityContact> {
  let contact_type: String = row.get(2)?;
  Ok(EntityContact {
    contact_id:   get_uuid(row, 0)?,
    entity_id:    get_uuid(row, 1)?,
    contact_type: decode_contact_type(&contact_type).map_err(conv)?,
    value:        row.get(3)?,
    is_current:   row.get(4)?,
    is_verified:  row.get(5)?,
    verified_at:  get_dt_opt(row, 6)?,
    label:        row.get(7)?,
    start_date:   get_date(row, 8)?,
    end_date:     get_date_opt(row, 9)?,
  })
}

// ── Vehicles ──────────────────────────────────────────────────────────────

pub const VEHICLE_COLS: &str = "vehicle_id, vin, renavam, brand_id, \
   model_id, version_id, manufacturing_year, model_year, created_at";

pub fn vehicle_from_row(row: &rusqlite::Row) -> rusqlite::Result<Vehicle> {
  Ok(Vehicle {
    vehicle_id:         get_uuid(row, 0)?,
    vin:                row.get(1)?,
    renavam:            row.get(2)?,
    brand_id:           get_uuid_opt(row, 3)?,
    model_id:           get_uuid_opt(row, 4)?,
    version_id:         get_uuid_opt(row, 5)?,
    manufacturing_year: row.get(6)?,
    model_year:         row.get(7)?,
    created_at:         get_dt(row, 8)?,
  })
}

// ── Links ─────────────────────────────────────────────────────────────────

pub const LINK_COLS: &str = "link_id, link_code, entity_id, vehicle_id, \
   link_type_id, status, start_date, end_date, document_proof, \
   validated_at, validated_by, observations, created_at, updated_at";

pub fn link_from_row(row: &rusqlite::Row) -> rusqlite::Result<Link> {
  let status: String = row.get(5)?;
  Ok(Link {
    link_id:        get_uuid(row, 0)?,
    link_code:      row.get(1)?,
    entity_id:      get_uuid(row, 2)?,
    vehicle_id:     get_uuid(row, 3)?,
    link_type_id:   get_uuid(row, 4)?,
    status:         decode_link_status(&status).map_err(conv)?,
    start_date:     get_date(row, 6)?,
    end_date:       get_date_opt(row, 7)?,
    document_proof: row.get(8)?,
    validated_at:   get_dt_opt(row, 9)?,
    validated_by:   get_uuid_opt(row, 10)?,
    observations:   row.get(11)?,
    created_at:     get_dt(row, 12)?,
    updated_at:     get_dt(row, 13)?,
  })
}

pub const CHANGE_COLS: &str = "change_id, link_id, from_status, to_status, \
   changed_by, reason, recorded_at";

pub fn change_from_row(
  row: &rusqlite::Row,
) -> rusqlite::Result<LinkStatusChange> {
  let from: Option<String> = row.get(2)?;
  let to: String = row.get(3)?;
  Ok(LinkStatusChange {
    change_id:   get_uuid(row, 0)?,
    link_id:     get_uuid(row, 1)?,
    from_status: from
      .as_deref()
      .map(decode_link_status)
      .transpose()
      .map_err(conv)?,
    to_status:   decode_link_status(&to).map_err(conv)?,
    changed_by:  get_uuid_opt(row, 4)?,
    reason:      row.get(5)?,
    recorded_at: get_dt(row, 6)?,
  })
}

pub const ROLE_COLS: &str = "link_type_id, code, name, description, active";

pub fn role_from_row(row: &rusqlite::Row) -> rusqlite::Result<LinkRole> {
  Ok(LinkRole {
    link_type_id: get_uuid(row, 0)?,
    code:         row.get(1)?,
    name:         row.get(2)?,
    description:  row.get(3)?,
    active:       row.get(4)?,
  })
}

pub const PERMISSION_COLS: &str = "permission_id, code, name, description, \
   category, active, created_at";

pub fn permission_from_row(row: &rusqlite::Row) -> rusqlite::Result<Permission> {
  let category: String = row.get(4)?;
  Ok(Permission {
    permission_id: get_uuid(row, 0)?,
    code:          row.get(1)?,
    name:          row.get(2)?,
    description:   row.get(3)?,
    category:      decode_permission_category(&category).map_err(conv)?,
    active:        row.get(5)?,
    created_at:    get_dt(row, 6)?,
  })
}

// ── Events & partitions ───────────────────────────────────────────────────

pub const EVENT_COLS: &str = "event_id, vehicle_id, entity_id, \
   event_category, event_type, event_timestamp, severity, title, \
   description, event_data, source_table, source_record_id, tags, \
   visibility, recorded_at";

pub fn event_from_row(row: &rusqlite::Row) -> rusqlite::Result<VehicleEvent> {
  let category: String = row.get(3)?;
  let severity: Option<String> = row.get(6)?;
  let data: String = row.get(9)?;
  let source_table: String = row.get(10)?;
  let tags: String = row.get(12)?;
  let visibility: String = row.get(13)?;
  Ok(VehicleEvent {
    event_id:        get_uuid(row, 0)?,
    vehicle_id:      get_uuid(row, 1)?,
    entity_id:       get_uuid_opt(row, 2)?,
    category:        decode_category(&category).map_err(conv)?,
    event_type:      row.get(4)?,
    event_timestamp: get_dt(row, 5)?,
    severity:        severity
      .as_deref()
      .map(decode_severity)
      .transpose()
      .map_err(conv)?,
    title:           row.get(7)?,
    description:     row.get(8)?,
    event_data:      serde_json::from_str(&data)
      .map_err(|e| conv(Error::Json(e)))?,
    source:          SourceRef {
      table:     decode_source_table(&source_table).map_err(conv)?,
      record_id: get_uuid(row, 11)?,
    },
    tags:            decode_tags(&tags).map_err(conv)?,
    visibility:      decode_visibility(&visibility).map_err(conv)?,
    recorded_at:     get_dt(row, 14)?,
  })
}

pub const PARTITION_COLS: &str = "name, year, quarter, start_ts, end_ts";

pub fn partition_from_row(row: &rusqlite::Row) -> rusqlite::Result<Partition> {
  Ok(Partition {
    name:    row.get(0)?,
    year:    row.get(1)?,
    quarter: row.get(2)?,
    start:   get_dt(row, 3)?,
    end:     get_dt(row, 4)?,
  })
}

// ── Source records ────────────────────────────────────────────────────────

pub const REFUEL_COLS: &str = "refuel_id, vehicle_id, registered_by, \
   quantity, unit_price, total_price, refuel_km, full_tank, observations, \
   refuel_date, created_at";

pub fn refuel_from_row(row: &rusqlite::Row) -> rusqlite::Result<Refuel> {
  Ok(Refuel {
    refuel_id:     get_uuid(row, 0)?,
    vehicle_id:    get_uuid(row, 1)?,
    registered_by: get_uuid_opt(row, 2)?,
    quantity:      row.get(3)?,
    unit_price:    row.get(4)?,
    total_price:   row.get(5)?,
    refuel_km:     row.get(6)?,
    full_tank:     row.get(7)?,
    observations:  row.get(8)?,
    refuel_date:   get_dt(row, 9)?,
    created_at:    get_dt(row, 10)?,
  })
}

pub const MILEAGE_COLS: &str =
  "record_id, vehicle_id, odometer_id, mileage, recorded_at";

pub fn mileage_from_row(row: &rusqlite::Row) -> rusqlite::Result<MileageRecord> {
  Ok(MileageRecord {
    record_id:   get_uuid(row, 0)?,
    vehicle_id:  get_uuid(row, 1)?,
    odometer_id: get_uuid_opt(row, 2)?,
    mileage:     row.get(3)?,
    recorded_at: get_dt(row, 4)?,
  })
}

pub const CLAIM_COLS: &str = "claim_id, vehicle_id, link_id, claim_type, \
   severity, claim_date, claim_km, location_lat, location_lng, address, \
   police_report, insurance_status, total_repair_cost, status, description, \
   created_at";

pub fn claim_from_row(row: &rusqlite::Row) -> rusqlite::Result<Claim> {
  let severity: Option<String> = row.get(4)?;
  Ok(Claim {
    claim_id:          get_uuid(row, 0)?,
    vehicle_id:        get_uuid(row, 1)?,
    link_id:           get_uuid_opt(row, 2)?,
    claim_type:        row.get(3)?,
    severity:          severity
      .as_deref()
      .map(decode_claim_severity)
      .transpose()
      .map_err(conv)?,
    claim_date:        get_dt(row, 5)?,
    claim_km:          row.get(6)?,
    location_lat:      row.get(7)?,
    location_lng:      row.get(8)?,
    address:           row.get(9)?,
    police_report:     row.get(10)?,
    insurance_status:  row.get(11)?,
    total_repair_cost: row.get(12)?,
    status:            row.get(13)?,
    description:       row.get(14)?,
    created_at:        get_dt(row, 15)?,
  })
}

pub const PLATE_COLS: &str = "plate_id, vehicle_id, plate_number, state, \
   city, licensing_start_date, licensing_end_date, status, created_by, \
   created_at";

pub fn plate_from_row(row: &rusqlite::Row) -> rusqlite::Result<Plate> {
  let status: String = row.get(7)?;
  Ok(Plate {
    plate_id:             get_uuid(row, 0)?,
    vehicle_id:           get_uuid(row, 1)?,
    plate_number:         row.get(2)?,
    state:                row.get(3)?,
    city:                 row.get(4)?,
    licensing_start_date: get_date_opt(row, 5)?,
    licensing_end_date:   get_date_opt(row, 6)?,
    status:               decode_plate_status(&status).map_err(conv)?,
    created_by:           get_uuid_opt(row, 8)?,
    created_at:           get_dt(row, 9)?,
  })
}

pub const ODOMETER_COLS: &str = "odometer_id, vehicle_id, brand, model, \
   part_number, installation_date, removal_date, cost, warranty_months, \
   reason_for_change, damage_type, created_at";

pub fn odometer_from_row(row: &rusqlite::Row) -> rusqlite::Result<Odometer> {
  Ok(Odometer {
    odometer_id:       get_uuid(row, 0)?,
    vehicle_id:        get_uuid(row, 1)?,
    brand:             row.get(2)?,
    model:             row.get(3)?,
    part_number:       row.get(4)?,
    installation_date: get_date_opt(row, 5)?,
    removal_date:      get_date_opt(row, 6)?,
    cost:              row.get(7)?,
    warranty_months:   row.get(8)?,
    reason_for_change: row.get(9)?,
    damage_type:       row.get(10)?,
    created_at:        get_dt(row, 11)?,
  })
}

pub const COLOR_COLS: &str =
  "color_id, vehicle_id, color_name, is_primary, recorded_at";

pub fn color_from_row(row: &rusqlite::Row) -> rusqlite::Result<VehicleColor> {
  Ok(VehicleColor {
    color_id:    get_uuid(row, 0)?,
    vehicle_id:  get_uuid(row, 1)?,
    color_name:  row.get(2)?,
    is_primary:  row.get(3)?,
    recorded_at: get_dt(row, 4)?,
  })
}

pub const COVER_COLS: &str = "cover_id, vehicle_id, file_id, file_url, \
   is_primary, display_order, created_at";

pub fn cover_from_row(row: &rusqlite::Row) -> rusqlite::Result<VehicleCover> {
  Ok(VehicleCover {
    cover_id:      get_uuid(row, 0)?,
    vehicle_id:    get_uuid(row, 1)?,
    file_id:       get_uuid(row, 2)?,
    file_url:      row.get(3)?,
    is_primary:    row.get(4)?,
    display_order: row.get(5)?,
    created_at:    get_dt(row, 6)?,
  })
}

pub const ACTION_COLS: &str = "action_id, vehicle_id, action_type, title, \
   description, status, priority, scheduled_for, executed_at, executed_by, \
   created_at";

pub fn action_from_row(row: &rusqlite::Row) -> rusqlite::Result<Action> {
  let status: String = row.get(5)?;
  Ok(Action {
    action_id:     get_uuid(row, 0)?,
    vehicle_id:    get_uuid(row, 1)?,
    action_type:   row.get(2)?,
    title:         row.get(3)?,
    description:   row.get(4)?,
    status:        decode_action_status(&status).map_err(conv)?,
    priority:      row.get(6)?,
    scheduled_for: get_dt_opt(row, 7)?,
    executed_at:   get_dt_opt(row, 8)?,
    executed_by:   get_uuid_opt(row, 9)?,
    created_at:    get_dt(row, 10)?,
  })
}
