//! [`SqliteStore`] — the SQLite implementation of [`LedgerStore`].
//!
//! Every multi-row invariant runs inside one transaction in a single
//! `conn.call` closure: a link write commits together with its history row
//! and its projected event, a source-record write with its event, a name
//! update with the pointer repoint. Domain failures roll the whole group
//! back.

use std::path::Path;

use chrono::{NaiveDate, Utc};
use rusqlite::{OptionalExtension as _, params, params_from_iter};
use uuid::Uuid;

use mobistory_core::{
  Error as CoreError,
  entity::{
    ContactType, Entity, EntityContact, EntityName, EntityProfile, NameType,
    NewEntity, VerifiedUpgrade,
  },
  event::{
    EventCategory, NewVehicleEvent, Partition, TimelineQuery, VehicleEvent,
  },
  link::{
    ClaimLink, GrantLink, Link, LinkFilter, LinkRole, LinkStatus,
    LinkStatusChange, RequestLink, role,
  },
  permission::{self, Permission},
  projector,
  source::{
    Action, ActionStatus, Claim, MileageRecord, NewAction, NewClaim,
    NewMileageRecord, NewOdometer, NewPlate, NewRefuel, NewVehicleColor,
    NewVehicleCover, Odometer, Plate, PlateStatus, Refuel, VehicleColor,
    VehicleCover,
  },
  store::LedgerStore,
  vehicle::{NewVehicle, Vehicle, VehicleProfile},
};

use crate::{
  Error, Result,
  encode::{
    ACTION_COLS, CHANGE_COLS, CLAIM_COLS, COLOR_COLS, CONTACT_COLS,
    COVER_COLS, ENTITY_COLS, EVENT_COLS, LINK_COLS, MILEAGE_COLS, NAME_COLS,
    ODOMETER_COLS, PARTITION_COLS, PERMISSION_COLS, PLATE_COLS, REFUEL_COLS,
    ROLE_COLS, VEHICLE_COLS, action_from_row, change_from_row,
    claim_from_row, color_from_row, contact_from_row, cover_from_row,
    decode_uuid, encode_action_status, encode_category, encode_claim_severity,
    encode_contact_type, encode_date, encode_dt, encode_entity_kind,
    encode_link_status, encode_name_type, encode_plate_status,
    encode_permission_category, encode_severity, encode_tags,
    encode_uuid, encode_visibility, entity_from_row, event_from_row,
    link_from_row, mileage_from_row, name_from_row, odometer_from_row,
    partition_from_row, permission_from_row, plate_from_row, refuel_from_row,
    role_from_row, vehicle_from_row,
  },
  schema::SCHEMA,
};

/// Result of the domain layer, carried through the `conn.call` boundary so
/// lifecycle errors abort the transaction without being conflated with
/// database faults.
type Domain<T> = std::result::Result<T, CoreError>;

/// Unwrap a [`Domain`] value inside a `conn.call` closure, returning the
/// domain error to the caller (and rolling back the open transaction).
macro_rules! try_domain {
  ($expr:expr) => {
    match $expr {
      Ok(v) => v,
      Err(e) => return Ok(Err(e.into())),
    }
  };
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Mobistory ledger backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path`, run schema initialisation, and
  /// seed the role/permission catalogs and the initial partition range.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        seed_catalogs(conn)?;
        seed_partitions(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread and collapse its two error layers:
  /// database faults via `?`, domain errors via [`Error::Core`].
  async fn call_domain<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<Domain<T>>
      + Send
      + 'static,
  {
    self.conn.call(f).await?.map_err(Error::Core)
  }
}

// ─── Seeding ─────────────────────────────────────────────────────────────────

/// Insert the six link roles, six permissions, and the default role →
/// permission mapping. Idempotent: existing codes are left untouched, so
/// catalog edits survive restarts.
fn seed_catalogs(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  let now = encode_dt(Utc::now());

  for (code, name, description) in permission::seed_roles() {
    conn.execute(
      "INSERT OR IGNORE INTO link_types (link_type_id, code, name, description, active)
       VALUES (?1, ?2, ?3, ?4, 1)",
      params![encode_uuid(Uuid::new_v4()), code, name, description],
    )?;
  }

  for (code, name, category) in permission::seed_permissions() {
    conn.execute(
      "INSERT OR IGNORE INTO permissions (permission_id, code, name, category, active, created_at)
       VALUES (?1, ?2, ?3, ?4, 1, ?5)",
      params![
        encode_uuid(Uuid::new_v4()),
        code,
        name,
        encode_permission_category(category),
        now,
      ],
    )?;
  }

  for (role_code, permission_codes) in permission::seed_role_permissions() {
    for permission_code in permission_codes {
      conn.execute(
        "INSERT OR IGNORE INTO link_type_permissions (link_type_id, permission_id, created_at)
         SELECT lt.link_type_id, p.permission_id, ?3
         FROM link_types lt, permissions p
         WHERE lt.code = ?1 AND p.code = ?2",
        params![role_code, permission_code, now],
      )?;
    }
  }

  Ok(())
}

/// Register quarterly partitions from 2025 Q1 through the quarter after the
/// current one. Later quarters are added by the explicit admin call.
fn seed_partitions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  let now = Utc::now();
  let (mut year, mut quarter) = (2025, 1u8);
  loop {
    let partition =
      Partition::new(year, quarter).expect("quarter is always 1..=4");
    insert_partition(conn, &partition)?;
    if partition.start > now {
      break;
    }
    (year, quarter) = next_quarter(year, quarter);
  }
  Ok(())
}

fn next_quarter(year: i32, quarter: u8) -> (i32, u8) {
  if quarter == 4 { (year + 1, 1) } else { (year, quarter + 1) }
}

fn insert_partition(
  conn: &rusqlite::Connection,
  partition: &Partition,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO event_partitions (name, year, quarter, start_ts, end_ts)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      partition.name,
      partition.year,
      partition.quarter,
      encode_dt(partition.start),
      encode_dt(partition.end),
    ],
  )?;
  Ok(())
}

// ─── Row loaders ─────────────────────────────────────────────────────────────

fn load_entity(
  conn: &rusqlite::Connection,
  entity_id: Uuid,
) -> rusqlite::Result<Option<Entity>> {
  conn
    .query_row(
      &format!("SELECT {ENTITY_COLS} FROM entities WHERE entity_id = ?1"),
      params![encode_uuid(entity_id)],
      entity_from_row,
    )
    .optional()
}

fn load_vehicle(
  conn: &rusqlite::Connection,
  vehicle_id: Uuid,
) -> rusqlite::Result<Option<Vehicle>> {
  conn
    .query_row(
      &format!("SELECT {VEHICLE_COLS} FROM vehicles WHERE vehicle_id = ?1"),
      params![encode_uuid(vehicle_id)],
      vehicle_from_row,
    )
    .optional()
}

fn load_link(
  conn: &rusqlite::Connection,
  link_id: Uuid,
) -> rusqlite::Result<Option<Link>> {
  conn
    .query_row(
      &format!("SELECT {LINK_COLS} FROM links WHERE link_id = ?1"),
      params![encode_uuid(link_id)],
      link_from_row,
    )
    .optional()
}

fn load_role_by_code(
  conn: &rusqlite::Connection,
  code: &str,
) -> rusqlite::Result<Option<LinkRole>> {
  conn
    .query_row(
      &format!("SELECT {ROLE_COLS} FROM link_types WHERE code = ?1"),
      params![code],
      role_from_row,
    )
    .optional()
}

fn load_role_by_id(
  conn: &rusqlite::Connection,
  link_type_id: Uuid,
) -> rusqlite::Result<Option<LinkRole>> {
  conn
    .query_row(
      &format!("SELECT {ROLE_COLS} FROM link_types WHERE link_type_id = ?1"),
      params![encode_uuid(link_type_id)],
      role_from_row,
    )
    .optional()
}

// ─── Permission & ownership checks ───────────────────────────────────────────

fn check_permission(
  conn: &rusqlite::Connection,
  entity_id: Uuid,
  vehicle_id: Uuid,
  code: &str,
  today: NaiveDate,
) -> rusqlite::Result<bool> {
  conn.query_row(
    "SELECT EXISTS (
       SELECT 1
       FROM links l
       JOIN link_type_permissions ltp ON ltp.link_type_id = l.link_type_id
       JOIN permissions p ON p.permission_id = ltp.permission_id
       WHERE l.entity_id = ?1
         AND l.vehicle_id = ?2
         AND l.status = 'active'
         AND l.start_date <= ?3
         AND (l.end_date IS NULL OR l.end_date >= ?3)
         AND p.code = ?4
         AND p.active = 1
     )",
    params![
      encode_uuid(entity_id),
      encode_uuid(vehicle_id),
      encode_date(today),
      code,
    ],
    |row| row.get(0),
  )
}

/// The currently-valid active `owner` link on the vehicle, if any, ignoring
/// `exclude` (the link being transitioned).
fn active_owner_link(
  conn: &rusqlite::Connection,
  vehicle_id: Uuid,
  today: NaiveDate,
  exclude: Uuid,
) -> rusqlite::Result<Option<Uuid>> {
  let found: Option<String> = conn
    .query_row(
      "SELECT link_id FROM links
       WHERE vehicle_id = ?1
         AND status = 'active'
         AND start_date <= ?2
         AND (end_date IS NULL OR end_date >= ?2)
         AND link_type_id IN
             (SELECT link_type_id FROM link_types WHERE code = 'owner')
         AND link_id != ?3
       LIMIT 1",
      params![encode_uuid(vehicle_id), encode_date(today), encode_uuid(exclude)],
      |row| row.get(0),
    )
    .optional()?;
  // Seeded ids are well-formed; a parse failure here means a corrupt row.
  Ok(found.and_then(|s| Uuid::parse_str(&s).ok()))
}

// ─── Event ingestion ─────────────────────────────────────────────────────────

/// Idempotent insert: the UNIQUE `(source_table, source_record_id)` index
/// plus `INSERT OR IGNORE` make replays return the surviving row's id.
fn insert_event(
  conn: &rusqlite::Connection,
  input: &NewVehicleEvent,
) -> rusqlite::Result<Domain<Uuid>> {
  if input.category == EventCategory::Alert && input.severity.is_none() {
    return Ok(Err(CoreError::Validation {
      field:  "severity",
      reason: "required for alert events".into(),
    }));
  }

  let ts = encode_dt(input.event_timestamp);
  let covered: bool = conn.query_row(
    "SELECT EXISTS (
       SELECT 1 FROM event_partitions WHERE start_ts <= ?1 AND ?1 < end_ts
     )",
    params![ts],
    |row| row.get(0),
  )?;
  if !covered {
    return Ok(Err(CoreError::PartitionMissing {
      timestamp: input.event_timestamp,
    }));
  }

  let data = try_domain!(serde_json::to_string(&input.event_data));
  let tags = try_domain!(encode_tags(&input.tags));

  conn.execute(
    "INSERT OR IGNORE INTO vehicle_events (
       event_id, vehicle_id, entity_id, event_category, event_type,
       event_timestamp, severity, title, description, event_data,
       source_table, source_record_id, tags, visibility, recorded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    params![
      encode_uuid(Uuid::new_v4()),
      encode_uuid(input.vehicle_id),
      input.entity_id.map(encode_uuid),
      encode_category(input.category),
      input.event_type,
      ts,
      input.severity.map(encode_severity),
      input.title,
      input.description,
      data,
      input.source.table.as_str(),
      encode_uuid(input.source.record_id),
      tags,
      encode_visibility(input.visibility),
      encode_dt(Utc::now()),
    ],
  )?;

  let id: String = conn.query_row(
    "SELECT event_id FROM vehicle_events
     WHERE source_table = ?1 AND source_record_id = ?2",
    params![input.source.table.as_str(), encode_uuid(input.source.record_id)],
    |row| row.get(0),
  )?;
  Ok(decode_uuid(&id).map_err(Into::into))
}

/// Project and record the event for a link write, if the change is
/// event-worthy.
fn insert_link_event(
  conn: &rusqlite::Connection,
  link: &Link,
  change: projector::LinkChange,
) -> rusqlite::Result<Domain<()>> {
  if let Some(event) = projector::link_written(link, change) {
    try_domain!(insert_event(conn, &event)?);
  }
  Ok(Ok(()))
}

// ─── Link helpers ────────────────────────────────────────────────────────────

fn short_code(prefix: &str) -> String {
  let hex = Uuid::new_v4().simple().to_string();
  format!("{prefix}-{}", hex[..12].to_uppercase())
}

/// Check vehicle, entity, and role references for a link creation.
fn validate_link_refs(
  conn: &rusqlite::Connection,
  vehicle_id: Uuid,
  entity_id: Uuid,
  role_code: &str,
) -> rusqlite::Result<Domain<LinkRole>> {
  if load_vehicle(conn, vehicle_id)?.is_none() {
    return Ok(Err(CoreError::VehicleNotFound(vehicle_id)));
  }
  if load_entity(conn, entity_id)?.is_none() {
    return Ok(Err(CoreError::EntityNotFound(entity_id)));
  }
  match load_role_by_code(conn, role_code)? {
    Some(role) if role.active => Ok(Ok(role)),
    _ => Ok(Err(CoreError::LinkRoleNotFound(role_code.to_owned()))),
  }
}

fn insert_status_change(
  conn: &rusqlite::Connection,
  link_id: Uuid,
  from: Option<LinkStatus>,
  to: LinkStatus,
  changed_by: Option<Uuid>,
  reason: Option<&str>,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO link_status_changes
       (change_id, link_id, from_status, to_status, changed_by, reason, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![
      encode_uuid(Uuid::new_v4()),
      encode_uuid(link_id),
      from.map(encode_link_status),
      encode_link_status(to),
      changed_by.map(encode_uuid),
      reason,
      encode_dt(Utc::now()),
    ],
  )?;
  Ok(())
}

struct NewLinkRow {
  vehicle_id:     Uuid,
  entity_id:      Uuid,
  link_type_id:   Uuid,
  status:         LinkStatus,
  start_date:     NaiveDate,
  end_date:       Option<NaiveDate>,
  document_proof: Option<String>,
  observations:   Option<String>,
  changed_by:     Uuid,
}

/// Insert a fresh link with its creation history row and projected event.
fn insert_link(
  conn: &rusqlite::Connection,
  row: NewLinkRow,
) -> rusqlite::Result<Domain<Link>> {
  let now = Utc::now();
  let link = Link {
    link_id:        Uuid::new_v4(),
    link_code:      short_code("LNK"),
    entity_id:      row.entity_id,
    vehicle_id:     row.vehicle_id,
    link_type_id:   row.link_type_id,
    status:         row.status,
    start_date:     row.start_date,
    end_date:       row.end_date,
    document_proof: row.document_proof,
    validated_at:   None,
    validated_by:   None,
    observations:   row.observations,
    created_at:     now,
    updated_at:     now,
  };

  conn.execute(
    &format!(
      "INSERT INTO links ({LINK_COLS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
    ),
    params![
      encode_uuid(link.link_id),
      link.link_code,
      encode_uuid(link.entity_id),
      encode_uuid(link.vehicle_id),
      encode_uuid(link.link_type_id),
      encode_link_status(link.status),
      encode_date(link.start_date),
      link.end_date.map(encode_date),
      link.document_proof,
      Option::<String>::None, // validated_at
      Option::<String>::None, // validated_by
      link.observations,
      encode_dt(link.created_at),
      encode_dt(link.updated_at),
    ],
  )?;

  insert_status_change(
    conn,
    link.link_id,
    None,
    link.status,
    Some(row.changed_by),
    None,
  )?;
  try_domain!(insert_link_event(conn, &link, projector::LinkChange::Created)?);

  Ok(Ok(link))
}

struct TransitionSpec {
  to:           LinkStatus,
  /// The state the link must be in; transitions from any other state are
  /// invalid even when the machine has an edge to `to`.
  expect:       LinkStatus,
  changed_by:   Uuid,
  reason:       Option<String>,
  set_end_date: bool,
  /// Record `validated_at`/`validated_by` (the claim-validation path).
  set_validated: bool,
}

/// Conditional status transition: validates the edge, guards the
/// single-owner rule, then compare-and-swaps on the expected status. Zero
/// updated rows after a successful pre-check is a concurrency conflict.
fn transition_link(
  conn: &rusqlite::Connection,
  link_id: Uuid,
  spec: TransitionSpec,
) -> rusqlite::Result<Domain<Link>> {
  let Some(link) = load_link(conn, link_id)? else {
    return Ok(Err(CoreError::LinkNotFound(link_id)));
  };

  let from = link.status;
  if from != spec.expect || !from.can_transition(spec.to) {
    return Ok(Err(CoreError::InvalidState {
      link: link_id,
      from,
      attempted: spec.to,
    }));
  }

  let now = Utc::now();
  let today = now.date_naive();

  if spec.to == LinkStatus::Active {
    let role = load_role_by_id(conn, link.link_type_id)?;
    if role.is_some_and(|r| r.code == role::OWNER)
      && let Some(existing) = active_owner_link(conn, link.vehicle_id, today, link_id)?
    {
      return Ok(Err(CoreError::DuplicateOwner {
        vehicle:       link.vehicle_id,
        existing_link: existing,
      }));
    }
  }

  let end_date = if spec.set_end_date { Some(today) } else { link.end_date };
  let (validated_at, validated_by) = if spec.set_validated {
    (Some(now), Some(spec.changed_by))
  } else {
    (link.validated_at, link.validated_by)
  };

  let updated_rows = conn.execute(
    "UPDATE links
     SET status = ?1, end_date = ?2, validated_at = ?3, validated_by = ?4,
         updated_at = ?5
     WHERE link_id = ?6 AND status = ?7",
    params![
      encode_link_status(spec.to),
      end_date.map(encode_date),
      validated_at.map(encode_dt),
      validated_by.map(encode_uuid),
      encode_dt(now),
      encode_uuid(link_id),
      encode_link_status(from),
    ],
  )?;
  if updated_rows == 0 {
    return Ok(Err(CoreError::Conflict { link: link_id, expected: from }));
  }

  insert_status_change(
    conn,
    link_id,
    Some(from),
    spec.to,
    Some(spec.changed_by),
    spec.reason.as_deref(),
  )?;

  let updated = Link {
    status: spec.to,
    end_date,
    validated_at,
    validated_by,
    updated_at: now,
    ..link
  };
  try_domain!(insert_link_event(
    conn,
    &updated,
    projector::LinkChange::StatusChanged { from },
  )?);

  Ok(Ok(updated))
}

// ─── Identity-history helpers ────────────────────────────────────────────────

/// Close the current row for the slot and insert the new current one.
/// Returns the inserted row. Prior rows are never deleted.
fn rotate_name(
  conn: &rusqlite::Connection,
  entity_id: Uuid,
  name_type: NameType,
  value: String,
  reason: Option<String>,
  changed_by: Option<Uuid>,
) -> rusqlite::Result<EntityName> {
  let today = Utc::now().date_naive();
  conn.execute(
    "UPDATE entity_names SET is_current = 0, end_date = ?1
     WHERE entity_id = ?2 AND name_type = ?3 AND is_current = 1",
    params![
      encode_date(today),
      encode_uuid(entity_id),
      encode_name_type(name_type),
    ],
  )?;

  let record = EntityName {
    name_id: Uuid::new_v4(),
    entity_id,
    name_type,
    value,
    is_current: true,
    start_date: today,
    end_date: None,
    reason,
    changed_by,
  };
  conn.execute(
    &format!("INSERT INTO entity_names ({NAME_COLS}) VALUES (?1, ?2, ?3, ?4, 1, ?5, NULL, ?6, ?7)"),
    params![
      encode_uuid(record.name_id),
      encode_uuid(record.entity_id),
      encode_name_type(record.name_type),
      record.value,
      encode_date(record.start_date),
      record.reason,
      record.changed_by.map(encode_uuid),
    ],
  )?;

  if name_type == NameType::DisplayName {
    conn.execute(
      "UPDATE entities SET primary_name_id = ?1 WHERE entity_id = ?2",
      params![encode_uuid(record.name_id), encode_uuid(entity_id)],
    )?;
  }
  Ok(record)
}

fn rotate_contact(
  conn: &rusqlite::Connection,
  entity_id: Uuid,
  contact_type: ContactType,
  value: String,
  label: Option<String>,
) -> rusqlite::Result<EntityContact> {
  let today = Utc::now().date_naive();
  conn.execute(
    "UPDATE entity_contacts SET is_current = 0, end_date = ?1
     WHERE entity_id = ?2 AND contact_type = ?3 AND is_current = 1",
    params![
      encode_date(today),
      encode_uuid(entity_id),
      encode_contact_type(contact_type),
    ],
  )?;

  let record = EntityContact {
    contact_id: Uuid::new_v4(),
    entity_id,
    contact_type,
    value,
    is_current: true,
    is_verified: false,
    verified_at: None,
    label,
    start_date: today,
    end_date: None,
  };
  conn.execute(
    &format!("INSERT INTO entity_contacts ({CONTACT_COLS}) VALUES (?1, ?2, ?3, ?4, 1, 0, NULL, ?5, ?6, NULL)"),
    params![
      encode_uuid(record.contact_id),
      encode_uuid(record.entity_id),
      encode_contact_type(record.contact_type),
      record.value,
      record.label,
      encode_date(record.start_date),
    ],
  )?;

  let pointer_column = match contact_type {
    ContactType::Email => Some("primary_email_id"),
    ContactType::Phone => Some("primary_phone_id"),
    _ => None,
  };
  if let Some(column) = pointer_column {
    conn.execute(
      &format!("UPDATE entities SET {column} = ?1 WHERE entity_id = ?2"),
      params![encode_uuid(record.contact_id), encode_uuid(entity_id)],
    )?;
  }
  Ok(record)
}

// ─── LedgerStore impl ────────────────────────────────────────────────────────

impl LedgerStore for SqliteStore {
  type Error = Error;

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn create_entity(&self, input: NewEntity) -> Result<Entity> {
    input
      .kind
      .check_legal_id(input.legal_id.as_deref())
      .map_err(Error::Core)?;

    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;

        if let Some(legal_id) = &input.legal_id {
          let taken: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM entities WHERE legal_id = ?1)",
            params![legal_id],
            |row| row.get(0),
          )?;
          if taken {
            return Ok(Err(CoreError::Validation {
              field:  "legal_id",
              reason: "already registered".into(),
            }));
          }
        }

        let entity_id = Uuid::new_v4();
        tx.execute(
          &format!(
            "INSERT INTO entities ({ENTITY_COLS})
             VALUES (?1, ?2, ?3, ?4, 1, 0, 0, NULL, NULL, NULL, NULL, ?5)"
          ),
          params![
            encode_uuid(entity_id),
            short_code("ENT"),
            encode_entity_kind(input.kind),
            input.legal_id,
            encode_dt(Utc::now()),
          ],
        )?;

        rotate_name(&tx, entity_id, NameType::DisplayName, input.name, None, None)?;
        if let Some(email) = input.email {
          rotate_contact(&tx, entity_id, ContactType::Email, email, None)?;
        }
        if let Some(phone) = input.phone {
          rotate_contact(&tx, entity_id, ContactType::Phone, phone, None)?;
        }

        let entity = load_entity(&tx, entity_id)?
          .expect("entity row just inserted");
        tx.commit()?;
        Ok(Ok(entity))
      })
      .await
  }

  async fn create_anonymous_entity(
    &self,
    fingerprint: String,
    display_name: Option<String>,
  ) -> Result<Entity> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;

        let entity_id = Uuid::new_v4();
        tx.execute(
          &format!(
            "INSERT INTO entities ({ENTITY_COLS})
             VALUES (?1, ?2, 'device', NULL, 1, 0, 1, ?3, NULL, NULL, NULL, ?4)"
          ),
          params![
            encode_uuid(entity_id),
            short_code("ANON"),
            fingerprint,
            encode_dt(Utc::now()),
          ],
        )?;
        if let Some(name) = display_name {
          rotate_name(&tx, entity_id, NameType::DisplayName, name, None, None)?;
        }

        let entity = load_entity(&tx, entity_id)?
          .expect("entity row just inserted");
        tx.commit()?;
        Ok(Ok(entity))
      })
      .await
  }

  async fn convert_anonymous_to_verified(
    &self,
    entity_id: Uuid,
    upgrade: VerifiedUpgrade,
  ) -> Result<Entity> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;

        let Some(entity) = load_entity(&tx, entity_id)? else {
          return Ok(Err(CoreError::EntityNotFound(entity_id)));
        };
        // Already verified: nothing to do.
        if !entity.is_anonymous {
          return Ok(Ok(entity));
        }

        if let Some(name) = upgrade.name.clone() {
          rotate_name(&tx, entity_id, NameType::DisplayName, name, None, None)?;
        }
        if let Some(email) = upgrade.email.clone() {
          rotate_contact(&tx, entity_id, ContactType::Email, email, None)?;
        }
        if let Some(phone) = upgrade.phone.clone() {
          rotate_contact(&tx, entity_id, ContactType::Phone, phone, None)?;
        }
        if let Some(legal_id) = upgrade.legal_id.clone() {
          let taken: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM entities WHERE legal_id = ?1 AND entity_id != ?2)",
            params![legal_id, encode_uuid(entity_id)],
            |row| row.get(0),
          )?;
          if taken {
            return Ok(Err(CoreError::Validation {
              field:  "legal_id",
              reason: "already registered".into(),
            }));
          }
          tx.execute(
            "UPDATE entities SET legal_id = ?1 WHERE entity_id = ?2",
            params![legal_id, encode_uuid(entity_id)],
          )?;
        }

        if upgrade.has_credential() {
          tx.execute(
            "UPDATE entities SET is_anonymous = 0, verified = 1 WHERE entity_id = ?1",
            params![encode_uuid(entity_id)],
          )?;
        }

        let entity = load_entity(&tx, entity_id)?
          .expect("entity row exists");
        tx.commit()?;
        Ok(Ok(entity))
      })
      .await
  }

  async fn get_entity(&self, entity_id: Uuid) -> Result<Option<Entity>> {
    self
      .call_domain(move |conn| Ok(Ok(load_entity(conn, entity_id)?)))
      .await
  }

  async fn materialize_entity(
    &self,
    entity_id: Uuid,
  ) -> Result<Option<EntityProfile>> {
    self
      .call_domain(move |conn| {
        let Some(entity) = load_entity(conn, entity_id)? else {
          return Ok(Ok(None));
        };

        let lookup_name = |id: Option<Uuid>| -> rusqlite::Result<Option<String>> {
          match id {
            None => Ok(None),
            Some(id) => conn
              .query_row(
                "SELECT value FROM entity_names WHERE name_id = ?1",
                params![encode_uuid(id)],
                |row| row.get(0),
              )
              .optional(),
          }
        };
        let lookup_contact = |id: Option<Uuid>| -> rusqlite::Result<Option<String>> {
          match id {
            None => Ok(None),
            Some(id) => conn
              .query_row(
                "SELECT value FROM entity_contacts WHERE contact_id = ?1",
                params![encode_uuid(id)],
                |row| row.get(0),
              )
              .optional(),
          }
        };

        let display_name = lookup_name(entity.primary_name_id)?;
        let email = lookup_contact(entity.primary_email_id)?;
        let phone = lookup_contact(entity.primary_phone_id)?;

        Ok(Ok(Some(EntityProfile { entity, display_name, email, phone })))
      })
      .await
  }

  async fn list_entities(
    &self,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<Entity>> {
    self
      .call_domain(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTITY_COLS} FROM entities
           WHERE active = 1
           ORDER BY created_at
           LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
          .query_map(params![limit as i64, offset as i64], entity_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Ok(rows))
      })
      .await
  }

  async fn update_name(
    &self,
    entity_id: Uuid,
    name_type: NameType,
    value: String,
    reason: Option<String>,
    changed_by: Option<Uuid>,
  ) -> Result<EntityName> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_entity(&tx, entity_id)?.is_none() {
          return Ok(Err(CoreError::EntityNotFound(entity_id)));
        }
        let record =
          rotate_name(&tx, entity_id, name_type, value, reason, changed_by)?;
        tx.commit()?;
        Ok(Ok(record))
      })
      .await
  }

  async fn update_contact(
    &self,
    entity_id: Uuid,
    contact_type: ContactType,
    value: String,
    label: Option<String>,
  ) -> Result<EntityContact> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_entity(&tx, entity_id)?.is_none() {
          return Ok(Err(CoreError::EntityNotFound(entity_id)));
        }
        let record = rotate_contact(&tx, entity_id, contact_type, value, label)?;
        tx.commit()?;
        Ok(Ok(record))
      })
      .await
  }

  async fn get_name_history(&self, entity_id: Uuid) -> Result<Vec<EntityName>> {
    self
      .call_domain(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {NAME_COLS} FROM entity_names
           WHERE entity_id = ?1
           ORDER BY start_date, rowid"
        ))?;
        let rows = stmt
          .query_map(params![encode_uuid(entity_id)], name_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Ok(rows))
      })
      .await
  }

  async fn get_contact_history(
    &self,
    entity_id: Uuid,
  ) -> Result<Vec<EntityContact>> {
    self
      .call_domain(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CONTACT_COLS} FROM entity_contacts
           WHERE entity_id = ?1
           ORDER BY start_date, rowid"
        ))?;
        let rows = stmt
          .query_map(params![encode_uuid(entity_id)], contact_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Ok(rows))
      })
      .await
  }

  async fn deactivate_entity(&self, entity_id: Uuid) -> Result<()> {
    self
      .call_domain(move |conn| {
        let updated = conn.execute(
          "UPDATE entities SET active = 0 WHERE entity_id = ?1",
          params![encode_uuid(entity_id)],
        )?;
        if updated == 0 {
          return Ok(Err(CoreError::EntityNotFound(entity_id)));
        }
        Ok(Ok(()))
      })
      .await
  }

  // ── Vehicles ──────────────────────────────────────────────────────────────

  async fn create_vehicle(&self, input: NewVehicle) -> Result<Vehicle> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;

        for (field, value) in
          [("vin", &input.vin), ("renavam", &input.renavam)]
        {
          if let Some(value) = value {
            let taken: bool = tx.query_row(
              &format!("SELECT EXISTS (SELECT 1 FROM vehicles WHERE {field} = ?1)"),
              params![value],
              |row| row.get(0),
            )?;
            if taken {
              return Ok(Err(CoreError::Validation {
                field,
                reason: "already registered".into(),
              }));
            }
          }
        }

        let vehicle = Vehicle {
          vehicle_id:         Uuid::new_v4(),
          vin:                input.vin,
          renavam:            input.renavam,
          brand_id:           input.brand_id,
          model_id:           input.model_id,
          version_id:         input.version_id,
          manufacturing_year: input.manufacturing_year,
          model_year:         input.model_year,
          created_at:         Utc::now(),
        };
        tx.execute(
          &format!(
            "INSERT INTO vehicles ({VEHICLE_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
          ),
          params![
            encode_uuid(vehicle.vehicle_id),
            vehicle.vin,
            vehicle.renavam,
            vehicle.brand_id.map(encode_uuid),
            vehicle.model_id.map(encode_uuid),
            vehicle.version_id.map(encode_uuid),
            vehicle.manufacturing_year,
            vehicle.model_year,
            encode_dt(vehicle.created_at),
          ],
        )?;
        tx.commit()?;
        Ok(Ok(vehicle))
      })
      .await
  }

  async fn get_vehicle(&self, vehicle_id: Uuid) -> Result<Option<Vehicle>> {
    self
      .call_domain(move |conn| Ok(Ok(load_vehicle(conn, vehicle_id)?)))
      .await
  }

  async fn materialize_vehicle(
    &self,
    vehicle_id: Uuid,
  ) -> Result<Option<VehicleProfile>> {
    self
      .call_domain(move |conn| {
        let Some(vehicle) = load_vehicle(conn, vehicle_id)? else {
          return Ok(Ok(None));
        };
        let id = encode_uuid(vehicle_id);

        let current_plate: Option<String> = conn
          .query_row(
            "SELECT plate_number FROM plates
             WHERE vehicle_id = ?1 AND status = 'active'
             ORDER BY created_at DESC LIMIT 1",
            params![id],
            |row| row.get(0),
          )
          .optional()?;
        let current_color: Option<String> = conn
          .query_row(
            "SELECT color_name FROM vehicle_colors
             WHERE vehicle_id = ?1 AND is_primary = 1
             ORDER BY recorded_at DESC LIMIT 1",
            params![id],
            |row| row.get(0),
          )
          .optional()?;
        let current_km: Option<i64> = conn
          .query_row(
            "SELECT mileage FROM mileage_records
             WHERE vehicle_id = ?1
             ORDER BY recorded_at DESC LIMIT 1",
            params![id],
            |row| row.get(0),
          )
          .optional()?;

        Ok(Ok(Some(VehicleProfile {
          vehicle,
          current_plate,
          current_color,
          current_km,
        })))
      })
      .await
  }

  // ── Link lifecycle ────────────────────────────────────────────────────────

  async fn grant_link(&self, input: GrantLink) -> Result<Link> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let role = try_domain!(validate_link_refs(
          &tx,
          input.vehicle_id,
          input.entity_id,
          &input.role_code,
        )?);

        let today = Utc::now().date_naive();
        let link_count: i64 = tx.query_row(
          "SELECT COUNT(*) FROM links WHERE vehicle_id = ?1",
          params![encode_uuid(input.vehicle_id)],
          |row| row.get(0),
        )?;

        // A vehicle with no links yet accepts its first owner grant; every
        // other grant needs vehicle.grant_access on the granter.
        let bootstrap = link_count == 0 && role.code == role::OWNER;
        if !bootstrap
          && !check_permission(
            &tx,
            input.granted_by,
            input.vehicle_id,
            permission::code::GRANT_ACCESS,
            today,
          )?
        {
          return Ok(Err(CoreError::PermissionDenied {
            entity:     input.granted_by,
            permission: permission::code::GRANT_ACCESS.to_owned(),
          }));
        }

        if role.code == role::OWNER
          && let Some(existing) =
            active_owner_link(&tx, input.vehicle_id, today, Uuid::nil())?
        {
          return Ok(Err(CoreError::DuplicateOwner {
            vehicle:       input.vehicle_id,
            existing_link: existing,
          }));
        }

        let link = try_domain!(insert_link(&tx, NewLinkRow {
          vehicle_id:     input.vehicle_id,
          entity_id:      input.entity_id,
          link_type_id:   role.link_type_id,
          status:         LinkStatus::Active,
          start_date:     input.start_date.unwrap_or(today),
          end_date:       input.end_date,
          document_proof: None,
          observations:   input.observations,
          changed_by:     input.granted_by,
        })?);
        tx.commit()?;
        Ok(Ok(link))
      })
      .await
  }

  async fn request_link(&self, input: RequestLink) -> Result<Link> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let role = try_domain!(validate_link_refs(
          &tx,
          input.vehicle_id,
          input.entity_id,
          &input.role_code,
        )?);
        let link = try_domain!(insert_link(&tx, NewLinkRow {
          vehicle_id:     input.vehicle_id,
          entity_id:      input.entity_id,
          link_type_id:   role.link_type_id,
          status:         LinkStatus::PendingRequest,
          start_date:     Utc::now().date_naive(),
          end_date:       None,
          document_proof: None,
          observations:   None,
          changed_by:     input.requested_by,
        })?);
        tx.commit()?;
        Ok(Ok(link))
      })
      .await
  }

  async fn claim_link(&self, input: ClaimLink) -> Result<Link> {
    if input.document_proof.trim().is_empty() {
      return Err(Error::Core(CoreError::Validation {
        field:  "document_proof",
        reason: "required for the claim path".into(),
      }));
    }
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let role = try_domain!(validate_link_refs(
          &tx,
          input.vehicle_id,
          input.entity_id,
          &input.role_code,
        )?);
        let claimant = input.entity_id;
        let link = try_domain!(insert_link(&tx, NewLinkRow {
          vehicle_id:     input.vehicle_id,
          entity_id:      input.entity_id,
          link_type_id:   role.link_type_id,
          status:         LinkStatus::PendingValidation,
          start_date:     Utc::now().date_naive(),
          end_date:       None,
          document_proof: Some(input.document_proof),
          observations:   None,
          changed_by:     claimant,
        })?);
        tx.commit()?;
        Ok(Ok(link))
      })
      .await
  }

  async fn approve_link(
    &self,
    link_id: Uuid,
    approved_by: Uuid,
    note: Option<String>,
  ) -> Result<Link> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let link = try_domain!(transition_link(&tx, link_id, TransitionSpec {
          to:            LinkStatus::Active,
          expect:        LinkStatus::PendingRequest,
          changed_by:    approved_by,
          reason:        note,
          set_end_date:  false,
          set_validated: false,
        })?);
        tx.commit()?;
        Ok(Ok(link))
      })
      .await
  }

  async fn reject_link(
    &self,
    link_id: Uuid,
    rejected_by: Uuid,
    note: Option<String>,
  ) -> Result<Link> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let link = try_domain!(transition_link(&tx, link_id, TransitionSpec {
          to:            LinkStatus::Rejected,
          expect:        LinkStatus::PendingRequest,
          changed_by:    rejected_by,
          reason:        note,
          set_end_date:  false,
          set_validated: false,
        })?);
        tx.commit()?;
        Ok(Ok(link))
      })
      .await
  }

  async fn validate_link(
    &self,
    link_id: Uuid,
    approved: bool,
    validated_by: Uuid,
    note: Option<String>,
  ) -> Result<Link> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let to = if approved { LinkStatus::Active } else { LinkStatus::Rejected };
        let link = try_domain!(transition_link(&tx, link_id, TransitionSpec {
          to,
          expect: LinkStatus::PendingValidation,
          changed_by: validated_by,
          reason: note,
          set_end_date: false,
          set_validated: true,
        })?);
        tx.commit()?;
        Ok(Ok(link))
      })
      .await
  }

  async fn terminate_link(
    &self,
    link_id: Uuid,
    actor: Uuid,
    reason: Option<String>,
  ) -> Result<Link> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let link = try_domain!(transition_link(&tx, link_id, TransitionSpec {
          to:            LinkStatus::Terminated,
          expect:        LinkStatus::Active,
          changed_by:    actor,
          reason,
          set_end_date:  true,
          set_validated: false,
        })?);
        tx.commit()?;
        Ok(Ok(link))
      })
      .await
  }

  async fn revoke_link(
    &self,
    link_id: Uuid,
    revoked_by: Uuid,
    reason: Option<String>,
  ) -> Result<Link> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;

        let Some(link) = load_link(&tx, link_id)? else {
          return Ok(Err(CoreError::LinkNotFound(link_id)));
        };
        // Self-removal is a termination, not a revocation.
        if link.entity_id == revoked_by {
          return Ok(Err(CoreError::Validation {
            field:  "revoked_by",
            reason: "revoker must differ from the link's entity".into(),
          }));
        }

        let link = try_domain!(transition_link(&tx, link_id, TransitionSpec {
          to:            LinkStatus::Revoked,
          expect:        LinkStatus::Active,
          changed_by:    revoked_by,
          reason,
          set_end_date:  true,
          set_validated: false,
        })?);
        tx.commit()?;
        Ok(Ok(link))
      })
      .await
  }

  async fn get_link(&self, link_id: Uuid) -> Result<Option<Link>> {
    self
      .call_domain(move |conn| Ok(Ok(load_link(conn, link_id)?)))
      .await
  }

  async fn get_vehicle_links(
    &self,
    vehicle_id: Uuid,
    filter: LinkFilter,
  ) -> Result<Vec<Link>> {
    self
      .call_domain(move |conn| Ok(Ok(query_links(conn, "vehicle_id", vehicle_id, &filter)?)))
      .await
  }

  async fn get_entity_links(
    &self,
    entity_id: Uuid,
    filter: LinkFilter,
  ) -> Result<Vec<Link>> {
    self
      .call_domain(move |conn| Ok(Ok(query_links(conn, "entity_id", entity_id, &filter)?)))
      .await
  }

  async fn count_active_links(&self, vehicle_id: Uuid) -> Result<u64> {
    self
      .call_domain(move |conn| {
        let count: i64 = conn.query_row(
          "SELECT COUNT(*) FROM links WHERE vehicle_id = ?1 AND status = 'active'",
          params![encode_uuid(vehicle_id)],
          |row| row.get(0),
        )?;
        Ok(Ok(count as u64))
      })
      .await
  }

  async fn get_owners(&self, vehicle_id: Uuid) -> Result<Vec<Link>> {
    self
      .call_domain(move |conn| {
        let today = encode_date(Utc::now().date_naive());
        let mut stmt = conn.prepare(&format!(
          "SELECT {LINK_COLS} FROM links
           WHERE vehicle_id = ?1
             AND status = 'active'
             AND start_date <= ?2
             AND (end_date IS NULL OR end_date >= ?2)
             AND link_type_id IN
                 (SELECT link_type_id FROM link_types
                  WHERE code IN ('owner', 'co_owner'))
           ORDER BY created_at"
        ))?;
        let rows = stmt
          .query_map(params![encode_uuid(vehicle_id), today], link_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Ok(rows))
      })
      .await
  }

  async fn get_link_history(
    &self,
    link_id: Uuid,
  ) -> Result<Vec<LinkStatusChange>> {
    self
      .call_domain(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {CHANGE_COLS} FROM link_status_changes
           WHERE link_id = ?1
           ORDER BY recorded_at, rowid"
        ))?;
        let rows = stmt
          .query_map(params![encode_uuid(link_id)], change_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Ok(rows))
      })
      .await
  }

  async fn get_link_role(&self, code: &str) -> Result<Option<LinkRole>> {
    let code = code.to_owned();
    self
      .call_domain(move |conn| Ok(Ok(load_role_by_code(conn, &code)?)))
      .await
  }

  // ── Permissions ───────────────────────────────────────────────────────────

  async fn has_permission(
    &self,
    entity_id: Uuid,
    vehicle_id: Uuid,
    code: &str,
  ) -> Result<bool> {
    let code = code.to_owned();
    self
      .call_domain(move |conn| {
        let today = Utc::now().date_naive();
        Ok(Ok(check_permission(conn, entity_id, vehicle_id, &code, today)?))
      })
      .await
  }

  async fn permissions_for(
    &self,
    entity_id: Uuid,
    vehicle_id: Uuid,
  ) -> Result<Vec<String>> {
    self
      .call_domain(move |conn| {
        let today = encode_date(Utc::now().date_naive());
        let mut stmt = conn.prepare(
          "SELECT DISTINCT p.code
           FROM links l
           JOIN link_type_permissions ltp ON ltp.link_type_id = l.link_type_id
           JOIN permissions p ON p.permission_id = ltp.permission_id
           WHERE l.entity_id = ?1
             AND l.vehicle_id = ?2
             AND l.status = 'active'
             AND l.start_date <= ?3
             AND (l.end_date IS NULL OR l.end_date >= ?3)
             AND p.active = 1
           ORDER BY p.code",
        )?;
        let rows = stmt
          .query_map(
            params![encode_uuid(entity_id), encode_uuid(vehicle_id), today],
            |row| row.get(0),
          )?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(Ok(rows))
      })
      .await
  }

  async fn list_permissions(&self) -> Result<Vec<Permission>> {
    self
      .call_domain(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PERMISSION_COLS} FROM permissions ORDER BY code"
        ))?;
        let rows = stmt
          .query_map([], permission_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Ok(rows))
      })
      .await
  }

  // ── Event log ─────────────────────────────────────────────────────────────

  async fn record_event(&self, input: NewVehicleEvent) -> Result<Uuid> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let event_id = try_domain!(insert_event(&tx, &input)?);
        tx.commit()?;
        Ok(Ok(event_id))
      })
      .await
  }

  async fn timeline(
    &self,
    vehicle_id: Uuid,
    query: TimelineQuery,
    caller: Option<Uuid>,
  ) -> Result<Vec<VehicleEvent>> {
    self
      .call_domain(move |conn| Ok(Ok(query_timeline(conn, vehicle_id, &query, caller)?)))
      .await
  }

  async fn create_partition(&self, year: i32, quarter: u8) -> Result<Partition> {
    let partition = Partition::new(year, quarter).map_err(Error::Core)?;
    self
      .call_domain(move |conn| {
        insert_partition(conn, &partition)?;
        Ok(Ok(partition))
      })
      .await
  }

  async fn drop_partition(&self, year: i32, quarter: u8) -> Result<u64> {
    let partition = Partition::new(year, quarter).map_err(Error::Core)?;
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let unregistered = tx.execute(
          "DELETE FROM event_partitions WHERE name = ?1",
          params![partition.name],
        )?;
        if unregistered == 0 {
          return Ok(Err(CoreError::Validation {
            field:  "partition",
            reason: format!("{} is not registered", partition.name),
          }));
        }
        let pruned = tx.execute(
          "DELETE FROM vehicle_events
           WHERE event_timestamp >= ?1 AND event_timestamp < ?2",
          params![encode_dt(partition.start), encode_dt(partition.end)],
        )?;
        tx.commit()?;
        Ok(Ok(pruned as u64))
      })
      .await
  }

  async fn list_partitions(&self) -> Result<Vec<Partition>> {
    self
      .call_domain(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PARTITION_COLS} FROM event_partitions ORDER BY start_ts"
        ))?;
        let rows = stmt
          .query_map([], partition_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Ok(rows))
      })
      .await
  }

  // ── Source records ────────────────────────────────────────────────────────

  async fn record_refuel(&self, input: NewRefuel) -> Result<Refuel> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_vehicle(&tx, input.vehicle_id)?.is_none() {
          return Ok(Err(CoreError::VehicleNotFound(input.vehicle_id)));
        }

        let refuel = Refuel {
          refuel_id:     Uuid::new_v4(),
          vehicle_id:    input.vehicle_id,
          registered_by: input.registered_by,
          quantity:      input.quantity,
          unit_price:    input.unit_price,
          total_price:   input.total_price,
          refuel_km:     input.refuel_km,
          full_tank:     input.full_tank,
          observations:  input.observations,
          refuel_date:   input.refuel_date,
          created_at:    Utc::now(),
        };
        tx.execute(
          &format!(
            "INSERT INTO refuels ({REFUEL_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
          ),
          params![
            encode_uuid(refuel.refuel_id),
            encode_uuid(refuel.vehicle_id),
            refuel.registered_by.map(encode_uuid),
            refuel.quantity,
            refuel.unit_price,
            refuel.total_price,
            refuel.refuel_km,
            refuel.full_tank,
            refuel.observations,
            encode_dt(refuel.refuel_date),
            encode_dt(refuel.created_at),
          ],
        )?;

        try_domain!(insert_event(&tx, &projector::refuel_recorded(&refuel))?);
        tx.commit()?;
        Ok(Ok(refuel))
      })
      .await
  }

  async fn record_mileage(
    &self,
    input: NewMileageRecord,
  ) -> Result<MileageRecord> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_vehicle(&tx, input.vehicle_id)?.is_none() {
          return Ok(Err(CoreError::VehicleNotFound(input.vehicle_id)));
        }

        let previous: Option<i64> = tx
          .query_row(
            "SELECT mileage FROM mileage_records
             WHERE vehicle_id = ?1
             ORDER BY recorded_at DESC LIMIT 1",
            params![encode_uuid(input.vehicle_id)],
            |row| row.get(0),
          )
          .optional()?;

        let record = MileageRecord {
          record_id:   Uuid::new_v4(),
          vehicle_id:  input.vehicle_id,
          odometer_id: input.odometer_id,
          mileage:     input.mileage,
          recorded_at: input.recorded_at,
        };
        tx.execute(
          &format!(
            "INSERT INTO mileage_records ({MILEAGE_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5)"
          ),
          params![
            encode_uuid(record.record_id),
            encode_uuid(record.vehicle_id),
            record.odometer_id.map(encode_uuid),
            record.mileage,
            encode_dt(record.recorded_at),
          ],
        )?;

        try_domain!(insert_event(
          &tx,
          &projector::mileage_recorded(&record, previous),
        )?);
        tx.commit()?;
        Ok(Ok(record))
      })
      .await
  }

  async fn report_claim(&self, input: NewClaim) -> Result<Claim> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_vehicle(&tx, input.vehicle_id)?.is_none() {
          return Ok(Err(CoreError::VehicleNotFound(input.vehicle_id)));
        }

        let claim = Claim {
          claim_id:          Uuid::new_v4(),
          vehicle_id:        input.vehicle_id,
          link_id:           input.link_id,
          claim_type:        input.claim_type,
          severity:          input.severity,
          claim_date:        input.claim_date,
          claim_km:          input.claim_km,
          location_lat:      input.location_lat,
          location_lng:      input.location_lng,
          address:           input.address,
          police_report:     input.police_report,
          insurance_status:  input.insurance_status,
          total_repair_cost: input.total_repair_cost,
          status:            "pending".into(),
          description:       input.description,
          created_at:        Utc::now(),
        };
        tx.execute(
          &format!(
            "INSERT INTO claims ({CLAIM_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
          ),
          params![
            encode_uuid(claim.claim_id),
            encode_uuid(claim.vehicle_id),
            claim.link_id.map(encode_uuid),
            claim.claim_type,
            claim.severity.map(encode_claim_severity),
            encode_dt(claim.claim_date),
            claim.claim_km,
            claim.location_lat,
            claim.location_lng,
            claim.address,
            claim.police_report,
            claim.insurance_status,
            claim.total_repair_cost,
            claim.status,
            claim.description,
            encode_dt(claim.created_at),
          ],
        )?;

        try_domain!(insert_event(&tx, &projector::claim_reported(&claim))?);
        tx.commit()?;
        Ok(Ok(claim))
      })
      .await
  }

  async fn add_plate(&self, input: NewPlate) -> Result<Plate> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_vehicle(&tx, input.vehicle_id)?.is_none() {
          return Ok(Err(CoreError::VehicleNotFound(input.vehicle_id)));
        }

        let plate = Plate {
          plate_id:             Uuid::new_v4(),
          vehicle_id:           input.vehicle_id,
          plate_number:         input.plate_number,
          state:                input.state,
          city:                 input.city,
          licensing_start_date: input.licensing_start_date,
          licensing_end_date:   input.licensing_end_date,
          status:               input.status,
          created_by:           input.created_by,
          created_at:           Utc::now(),
        };
        tx.execute(
          &format!(
            "INSERT INTO plates ({PLATE_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
          ),
          params![
            encode_uuid(plate.plate_id),
            encode_uuid(plate.vehicle_id),
            plate.plate_number,
            plate.state,
            plate.city,
            plate.licensing_start_date.map(encode_date),
            plate.licensing_end_date.map(encode_date),
            encode_plate_status(plate.status),
            plate.created_by.map(encode_uuid),
            encode_dt(plate.created_at),
          ],
        )?;

        if let Some(event) =
          projector::plate_written(&plate, projector::PlateChange::Inserted)
        {
          try_domain!(insert_event(&tx, &event)?);
        }
        tx.commit()?;
        Ok(Ok(plate))
      })
      .await
  }

  async fn change_plate_status(
    &self,
    plate_id: Uuid,
    status: PlateStatus,
  ) -> Result<Plate> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let loaded: Option<Plate> = tx
          .query_row(
            &format!("SELECT {PLATE_COLS} FROM plates WHERE plate_id = ?1"),
            params![encode_uuid(plate_id)],
            plate_from_row,
          )
          .optional()?;
        let Some(plate) = loaded else {
          return Ok(Err(CoreError::RecordNotFound {
            table: "plates",
            id:    plate_id,
          }));
        };

        let from = plate.status;
        tx.execute(
          "UPDATE plates SET status = ?1 WHERE plate_id = ?2",
          params![encode_plate_status(status), encode_uuid(plate_id)],
        )?;

        let updated = Plate { status, ..plate };
        if let Some(event) = projector::plate_written(
          &updated,
          projector::PlateChange::StatusChanged { from },
        ) {
          try_domain!(insert_event(&tx, &event)?);
        }
        tx.commit()?;
        Ok(Ok(updated))
      })
      .await
  }

  async fn install_odometer(&self, input: NewOdometer) -> Result<Odometer> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_vehicle(&tx, input.vehicle_id)?.is_none() {
          return Ok(Err(CoreError::VehicleNotFound(input.vehicle_id)));
        }

        let odometer = Odometer {
          odometer_id:       Uuid::new_v4(),
          vehicle_id:        input.vehicle_id,
          brand:             input.brand,
          model:             input.model,
          part_number:       input.part_number,
          installation_date: input.installation_date,
          removal_date:      None,
          cost:              input.cost,
          warranty_months:   input.warranty_months,
          reason_for_change: input.reason_for_change,
          damage_type:       input.damage_type,
          created_at:        Utc::now(),
        };
        tx.execute(
          &format!(
            "INSERT INTO odometers ({ODOMETER_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8, ?9, ?10, ?11)"
          ),
          params![
            encode_uuid(odometer.odometer_id),
            encode_uuid(odometer.vehicle_id),
            odometer.brand,
            odometer.model,
            odometer.part_number,
            odometer.installation_date.map(encode_date),
            odometer.cost,
            odometer.warranty_months,
            odometer.reason_for_change,
            odometer.damage_type,
            encode_dt(odometer.created_at),
          ],
        )?;

        try_domain!(insert_event(
          &tx,
          &projector::odometer_written(
            &odometer,
            projector::OdometerChange::Installed,
          ),
        )?);
        tx.commit()?;
        Ok(Ok(odometer))
      })
      .await
  }

  async fn remove_odometer(
    &self,
    odometer_id: Uuid,
    removal_date: NaiveDate,
  ) -> Result<Odometer> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let loaded: Option<Odometer> = tx
          .query_row(
            &format!("SELECT {ODOMETER_COLS} FROM odometers WHERE odometer_id = ?1"),
            params![encode_uuid(odometer_id)],
            odometer_from_row,
          )
          .optional()?;
        let Some(odometer) = loaded else {
          return Ok(Err(CoreError::RecordNotFound {
            table: "odometers",
            id:    odometer_id,
          }));
        };
        if odometer.removal_date.is_some() {
          return Ok(Err(CoreError::Validation {
            field:  "removal_date",
            reason: "odometer is already removed".into(),
          }));
        }

        tx.execute(
          "UPDATE odometers SET removal_date = ?1 WHERE odometer_id = ?2",
          params![encode_date(removal_date), encode_uuid(odometer_id)],
        )?;

        let updated = Odometer { removal_date: Some(removal_date), ..odometer };
        try_domain!(insert_event(
          &tx,
          &projector::odometer_written(
            &updated,
            projector::OdometerChange::Removed,
          ),
        )?);
        tx.commit()?;
        Ok(Ok(updated))
      })
      .await
  }

  async fn set_color(&self, input: NewVehicleColor) -> Result<VehicleColor> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_vehicle(&tx, input.vehicle_id)?.is_none() {
          return Ok(Err(CoreError::VehicleNotFound(input.vehicle_id)));
        }

        // A new primary demotes the previous one.
        if input.is_primary {
          tx.execute(
            "UPDATE vehicle_colors SET is_primary = 0 WHERE vehicle_id = ?1",
            params![encode_uuid(input.vehicle_id)],
          )?;
        }

        let color = VehicleColor {
          color_id:    Uuid::new_v4(),
          vehicle_id:  input.vehicle_id,
          color_name:  input.color_name,
          is_primary:  input.is_primary,
          recorded_at: Utc::now(),
        };
        tx.execute(
          &format!(
            "INSERT INTO vehicle_colors ({COLOR_COLS}) VALUES (?1, ?2, ?3, ?4, ?5)"
          ),
          params![
            encode_uuid(color.color_id),
            encode_uuid(color.vehicle_id),
            color.color_name,
            color.is_primary,
            encode_dt(color.recorded_at),
          ],
        )?;

        if let Some(event) = projector::color_written(&color) {
          try_domain!(insert_event(&tx, &event)?);
        }
        tx.commit()?;
        Ok(Ok(color))
      })
      .await
  }

  async fn set_cover(&self, input: NewVehicleCover) -> Result<VehicleCover> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_vehicle(&tx, input.vehicle_id)?.is_none() {
          return Ok(Err(CoreError::VehicleNotFound(input.vehicle_id)));
        }

        if input.is_primary {
          tx.execute(
            "UPDATE vehicle_covers SET is_primary = 0 WHERE vehicle_id = ?1",
            params![encode_uuid(input.vehicle_id)],
          )?;
        }

        let cover = VehicleCover {
          cover_id:      Uuid::new_v4(),
          vehicle_id:    input.vehicle_id,
          file_id:       input.file_id,
          file_url:      input.file_url,
          is_primary:    input.is_primary,
          display_order: input.display_order,
          created_at:    Utc::now(),
        };
        tx.execute(
          &format!(
            "INSERT INTO vehicle_covers ({COVER_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
          ),
          params![
            encode_uuid(cover.cover_id),
            encode_uuid(cover.vehicle_id),
            encode_uuid(cover.file_id),
            cover.file_url,
            cover.is_primary,
            cover.display_order,
            encode_dt(cover.created_at),
          ],
        )?;

        if let Some(event) = projector::cover_written(&cover) {
          try_domain!(insert_event(&tx, &event)?);
        }
        tx.commit()?;
        Ok(Ok(cover))
      })
      .await
  }

  async fn create_action(&self, input: NewAction) -> Result<Action> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        if load_vehicle(&tx, input.vehicle_id)?.is_none() {
          return Ok(Err(CoreError::VehicleNotFound(input.vehicle_id)));
        }

        let action = Action {
          action_id:     Uuid::new_v4(),
          vehicle_id:    input.vehicle_id,
          action_type:   input.action_type,
          title:         input.title,
          description:   input.description,
          status:        ActionStatus::Pending,
          priority:      input.priority,
          scheduled_for: input.scheduled_for,
          executed_at:   None,
          executed_by:   None,
          created_at:    Utc::now(),
        };
        tx.execute(
          &format!(
            "INSERT INTO actions ({ACTION_COLS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, NULL, ?9)"
          ),
          params![
            encode_uuid(action.action_id),
            encode_uuid(action.vehicle_id),
            action.action_type,
            action.title,
            action.description,
            encode_action_status(action.status),
            action.priority,
            action.scheduled_for.map(encode_dt),
            encode_dt(action.created_at),
          ],
        )?;
        tx.commit()?;
        Ok(Ok(action))
      })
      .await
  }

  async fn complete_action(
    &self,
    action_id: Uuid,
    executed_by: Option<Uuid>,
  ) -> Result<Action> {
    self
      .call_domain(move |conn| {
        let tx = conn.transaction()?;
        let loaded: Option<Action> = tx
          .query_row(
            &format!("SELECT {ACTION_COLS} FROM actions WHERE action_id = ?1"),
            params![encode_uuid(action_id)],
            action_from_row,
          )
          .optional()?;
        let Some(action) = loaded else {
          return Ok(Err(CoreError::RecordNotFound {
            table: "actions",
            id:    action_id,
          }));
        };

        let previous = action.status;
        let now = Utc::now();
        tx.execute(
          "UPDATE actions
           SET status = 'completed', executed_at = ?1, executed_by = ?2
           WHERE action_id = ?3",
          params![
            encode_dt(now),
            executed_by.map(encode_uuid),
            encode_uuid(action_id),
          ],
        )?;

        let updated = Action {
          status: ActionStatus::Completed,
          executed_at: Some(now),
          executed_by,
          ..action
        };
        if let Some(event) = projector::action_updated(&updated, previous) {
          try_domain!(insert_event(&tx, &event)?);
        }
        tx.commit()?;
        Ok(Ok(updated))
      })
      .await
  }
}

// ─── Query builders ──────────────────────────────────────────────────────────

fn query_links(
  conn: &rusqlite::Connection,
  key_column: &str,
  key: Uuid,
  filter: &LinkFilter,
) -> rusqlite::Result<Vec<Link>> {
  let mut conds = vec![format!("{key_column} = ?")];
  let mut values: Vec<rusqlite::types::Value> =
    vec![encode_uuid(key).into()];

  if let Some(status) = filter.status {
    conds.push("status = ?".into());
    values.push(encode_link_status(status).to_owned().into());
  }
  if let Some(role_code) = &filter.role_code {
    conds.push(
      "link_type_id IN (SELECT link_type_id FROM link_types WHERE code = ?)"
        .into(),
    );
    values.push(role_code.clone().into());
  }
  if !filter.include_closed {
    conds.push("status NOT IN ('rejected', 'terminated', 'revoked')".into());
  }

  let sql = format!(
    "SELECT {LINK_COLS} FROM links WHERE {} ORDER BY created_at",
    conds.join(" AND "),
  );
  let mut stmt = conn.prepare(&sql)?;
  stmt
    .query_map(params_from_iter(values), link_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()
}

/// How the caller relates to the vehicle, for visibility filtering.
enum CallerRelation {
  Owner,
  Linked,
  Anonymous,
}

fn caller_relation(
  conn: &rusqlite::Connection,
  vehicle_id: Uuid,
  caller: Option<Uuid>,
  today: NaiveDate,
) -> rusqlite::Result<CallerRelation> {
  let Some(caller) = caller else {
    return Ok(CallerRelation::Anonymous);
  };

  let base = "SELECT 1 FROM links
     WHERE entity_id = ?1 AND vehicle_id = ?2
       AND status = 'active'
       AND start_date <= ?3
       AND (end_date IS NULL OR end_date >= ?3)";
  let caller_str = encode_uuid(caller);
  let vehicle_str = encode_uuid(vehicle_id);
  let today_str = encode_date(today);

  let owns: bool = conn.query_row(
    &format!(
      "SELECT EXISTS ({base}
         AND link_type_id IN (SELECT link_type_id FROM link_types
                              WHERE code IN ('owner', 'co_owner')))"
    ),
    params![caller_str, vehicle_str, today_str],
    |row| row.get(0),
  )?;
  if owns {
    return Ok(CallerRelation::Owner);
  }

  let linked: bool = conn.query_row(
    &format!("SELECT EXISTS ({base})"),
    params![caller_str, vehicle_str, today_str],
    |row| row.get(0),
  )?;
  Ok(if linked { CallerRelation::Linked } else { CallerRelation::Anonymous })
}

fn query_timeline(
  conn: &rusqlite::Connection,
  vehicle_id: Uuid,
  query: &TimelineQuery,
  caller: Option<Uuid>,
) -> rusqlite::Result<Vec<VehicleEvent>> {
  let today = Utc::now().date_naive();
  let relation = caller_relation(conn, vehicle_id, caller, today)?;

  let mut conds = vec!["vehicle_id = ?".to_owned()];
  let mut values: Vec<rusqlite::types::Value> =
    vec![encode_uuid(vehicle_id).into()];

  match relation {
    CallerRelation::Owner => {},
    CallerRelation::Linked => {
      conds.push("visibility IN ('public', 'linked_entities')".into());
    },
    CallerRelation::Anonymous => {
      conds.push("visibility = 'public'".into());
    },
  }

  if let Some(category) = query.category {
    conds.push("event_category = ?".into());
    values.push(encode_category(category).to_owned().into());
  }
  if let Some(event_type) = &query.event_type {
    conds.push("event_type = ?".into());
    values.push(event_type.clone().into());
  }
  if let Some(severity) = query.severity {
    conds.push("severity = ?".into());
    values.push(encode_severity(severity).to_owned().into());
  }
  if let Some(tag) = &query.tag {
    // Tags are a JSON array of strings; match the quoted element.
    conds.push("tags LIKE ?".into());
    values.push(format!("%\"{tag}\"%").into());
  }
  if let Some(since) = query.since {
    conds.push("event_timestamp >= ?".into());
    values.push(encode_dt(since).into());
  }
  if let Some(until) = query.until {
    conds.push("event_timestamp <= ?".into());
    values.push(encode_dt(until).into());
  }
  if let Some(cursor) = query.before {
    conds.push(
      "(event_timestamp < ? OR (event_timestamp = ? AND event_id < ?))".into(),
    );
    let ts = encode_dt(cursor.timestamp);
    values.push(ts.clone().into());
    values.push(ts.into());
    values.push(encode_uuid(cursor.event_id).into());
  }

  let limit = query.limit.unwrap_or(100);
  let sql = format!(
    "SELECT {EVENT_COLS} FROM vehicle_events
     WHERE {}
     ORDER BY event_timestamp DESC, event_id DESC
     LIMIT {limit}",
    conds.join(" AND "),
  );
  let mut stmt = conn.prepare(&sql)?;
  stmt
    .query_map(params_from_iter(values), event_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()
}
