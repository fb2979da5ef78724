//! Handler for `GET /vehicles/:id/timeline`.
//!
//! Events come back newest first, visibility-filtered against the caller's
//! relationship to the vehicle. `caller_id` is the verified identity the
//! outer auth layer resolved; omitting it means an anonymous caller, who
//! only sees public events.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use mobistory_core::{
  event::{
    EventCategory, EventSeverity, TimelineCursor, TimelineQuery, VehicleEvent,
  },
  store::LedgerStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct TimelineParams {
  pub caller_id:  Option<Uuid>,
  pub category:   Option<EventCategory>,
  pub event_type: Option<String>,
  pub severity:   Option<EventSeverity>,
  pub tag:        Option<String>,
  pub since:      Option<DateTime<Utc>>,
  pub until:      Option<DateTime<Utc>>,
  /// Keyset cursor: both halves of the last `(timestamp, event_id)` seen.
  pub before_timestamp: Option<DateTime<Utc>>,
  pub before_event_id:  Option<Uuid>,
  pub limit:      Option<usize>,
}

/// `GET /vehicles/:id/timeline`
pub async fn handler<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(vehicle_id): Path<Uuid>,
  Query(params): Query<TimelineParams>,
) -> Result<Json<Vec<VehicleEvent>>, ApiError> {
  let before = match (params.before_timestamp, params.before_event_id) {
    (None, None) => None,
    (Some(timestamp), Some(event_id)) => {
      Some(TimelineCursor { timestamp, event_id })
    },
    _ => {
      return Err(ApiError::BadRequest(
        "before_timestamp and before_event_id must be supplied together"
          .into(),
      ));
    },
  };

  let events = store
    .timeline(
      vehicle_id,
      TimelineQuery {
        category:   params.category,
        event_type: params.event_type,
        severity:   params.severity,
        tag:        params.tag,
        since:      params.since,
        until:      params.until,
        before,
        limit:      params.limit,
      },
      params.caller_id,
    )
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(events))
}
