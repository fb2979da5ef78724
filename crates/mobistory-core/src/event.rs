//! Vehicle event log types — the immutable, deduplicated timeline.
//!
//! Events are derived rows: every one points back at the source record that
//! caused it, and at most one event exists per `(source_table,
//! source_record_id)`. Storage is range-partitioned by `event_timestamp`
//! into quarterly buckets that must be created explicitly before events
//! landing in them are written.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Classification ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
  Usage,
  Maintenance,
  Modification,
  Alert,
  Financial,
  Documentation,
}

/// Required whenever the category is [`EventCategory::Alert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
  Info,
  Warning,
  Error,
  Critical,
}

/// Who may see an event on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventVisibility {
  OwnerOnly,
  LinkedEntities,
  Public,
}

impl Default for EventVisibility {
  fn default() -> Self { Self::OwnerOnly }
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// The source tables change-data capture watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTable {
  Refuels,
  MileageRecords,
  Claims,
  Plates,
  Links,
  Odometers,
  VehicleColors,
  VehicleCovers,
  Actions,
}

impl SourceTable {
  /// The table name stored in the `source_table` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Refuels => "refuels",
      Self::MileageRecords => "mileage_records",
      Self::Claims => "claims",
      Self::Plates => "plates",
      Self::Links => "links",
      Self::Odometers => "odometers",
      Self::VehicleColors => "vehicle_colors",
      Self::VehicleCovers => "vehicle_covers",
      Self::Actions => "actions",
    }
  }
}

/// Pointer back to the row that caused an event; doubles as the idempotency
/// key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
  pub table:     SourceTable,
  pub record_id: Uuid,
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// One immutable entry in a vehicle's timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleEvent {
  pub event_id:        Uuid,
  pub vehicle_id:      Uuid,
  /// The acting entity, when one is attributable.
  pub entity_id:       Option<Uuid>,
  pub category:        EventCategory,
  /// Fine-grained type, e.g. `refuel`, `plate_changed`.
  pub event_type:      String,
  /// When it happened — not when it was recorded.
  pub event_timestamp: DateTime<Utc>,
  pub severity:        Option<EventSeverity>,
  pub title:           String,
  pub description:     Option<String>,
  /// Type-specific payload.
  pub event_data:      serde_json::Value,
  pub source:          SourceRef,
  pub tags:            Vec<String>,
  pub visibility:      EventVisibility,
  pub recorded_at:     DateTime<Utc>,
}

/// Input to [`crate::store::LedgerStore::record_event`].
#[derive(Debug, Clone)]
pub struct NewVehicleEvent {
  pub vehicle_id:      Uuid,
  pub entity_id:       Option<Uuid>,
  pub category:        EventCategory,
  pub event_type:      String,
  pub event_timestamp: DateTime<Utc>,
  pub severity:        Option<EventSeverity>,
  pub title:           String,
  pub description:     Option<String>,
  pub event_data:      serde_json::Value,
  pub source:          SourceRef,
  pub tags:            Vec<String>,
  pub visibility:      EventVisibility,
}

// ─── Timeline queries ────────────────────────────────────────────────────────

/// Keyset cursor: the last `(event_timestamp, event_id)` seen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimelineCursor {
  pub timestamp: DateTime<Utc>,
  pub event_id:  Uuid,
}

/// Filters for [`crate::store::LedgerStore::timeline`].
#[derive(Debug, Clone, Default)]
pub struct TimelineQuery {
  pub category:   Option<EventCategory>,
  pub event_type: Option<String>,
  pub severity:   Option<EventSeverity>,
  /// Matches events carrying this tag.
  pub tag:        Option<String>,
  pub since:      Option<DateTime<Utc>>,
  pub until:      Option<DateTime<Utc>>,
  /// Resume after this cursor (exclusive), newest-first.
  pub before:     Option<TimelineCursor>,
  pub limit:      Option<usize>,
}

// ─── Partitions ──────────────────────────────────────────────────────────────

/// A registered quarterly range of the event log. Creation and removal are
/// explicit administrative operations; an insert outside every registered
/// range fails with [`Error::PartitionMissing`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
  /// `vehicle_events_<year>_q<quarter>` by convention.
  pub name:    String,
  pub year:    i32,
  pub quarter: u8,
  /// Inclusive lower bound.
  pub start:   DateTime<Utc>,
  /// Exclusive upper bound.
  pub end:     DateTime<Utc>,
}

impl Partition {
  /// Build the partition covering `year`/`quarter` (1–4).
  pub fn new(year: i32, quarter: u8) -> Result<Self> {
    if !(1..=4).contains(&quarter) {
      return Err(Error::Validation {
        field:  "quarter",
        reason: format!("must be 1..=4, got {quarter}"),
      });
    }
    let start_month = (u32::from(quarter) - 1) * 3 + 1;
    let (end_year, end_month) = if quarter == 4 {
      (year + 1, 1)
    } else {
      (year, start_month + 3)
    };
    let start = quarter_boundary(year, start_month)?;
    let end = quarter_boundary(end_year, end_month)?;
    Ok(Self {
      name: format!("vehicle_events_{year}_q{quarter}"),
      year,
      quarter,
      start,
      end,
    })
  }

  /// The `(year, quarter)` a timestamp falls into.
  pub fn quarter_of(ts: DateTime<Utc>) -> (i32, u8) {
    use chrono::Datelike as _;
    let date = ts.date_naive();
    (date.year(), (date.month0() / 3 + 1) as u8)
  }

  pub fn contains(&self, ts: DateTime<Utc>) -> bool {
    self.start <= ts && ts < self.end
  }
}

fn quarter_boundary(year: i32, month: u32) -> Result<DateTime<Utc>> {
  let date = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
    Error::Validation {
      field:  "year",
      reason: format!("invalid partition boundary {year}-{month:02}"),
    }
  })?;
  Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight")))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partition_name_follows_convention() {
    let p = Partition::new(2025, 3).unwrap();
    assert_eq!(p.name, "vehicle_events_2025_q3");
  }

  #[test]
  fn q4_end_wraps_into_next_year() {
    let p = Partition::new(2025, 4).unwrap();
    assert_eq!(p.start.to_rfc3339(), "2025-10-01T00:00:00+00:00");
    assert_eq!(p.end.to_rfc3339(), "2026-01-01T00:00:00+00:00");
  }

  #[test]
  fn contains_is_half_open() {
    let p = Partition::new(2025, 1).unwrap();
    assert!(p.contains(p.start));
    assert!(!p.contains(p.end));
  }

  #[test]
  fn quarter_of_maps_months() {
    let ts = Utc.with_ymd_and_hms(2025, 8, 15, 12, 0, 0).unwrap();
    assert_eq!(Partition::quarter_of(ts), (2025, 3));
    let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    assert_eq!(Partition::quarter_of(ts), (2026, 1));
  }

  #[test]
  fn quarter_out_of_range_rejected() {
    assert!(Partition::new(2025, 0).is_err());
    assert!(Partition::new(2025, 5).is_err());
  }
}
