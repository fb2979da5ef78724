//! Error types for `mobistory-core`.
//!
//! Every operation in the store trait fails with one of these variants, so
//! callers (the API binding in particular) can map failures to an outcome
//! without inspecting message strings.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::link::LinkStatus;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or missing required input.
  #[error("invalid {field}: {reason}")]
  Validation { field: &'static str, reason: String },

  #[error("entity not found: {0}")]
  EntityNotFound(Uuid),

  #[error("vehicle not found: {0}")]
  VehicleNotFound(Uuid),

  #[error("link not found: {0}")]
  LinkNotFound(Uuid),

  #[error("unknown link role: {0:?}")]
  LinkRoleNotFound(String),

  #[error("record not found in {table}: {id}")]
  RecordNotFound { table: &'static str, id: Uuid },

  /// The requested transition is not in the link state machine.
  #[error("link {link} cannot move from {from:?} to {attempted:?}")]
  InvalidState {
    link:      Uuid,
    from:      LinkStatus,
    attempted: LinkStatus,
  },

  /// A concurrent writer changed the link between our read and our
  /// conditional update.
  #[error("link {link} was modified concurrently; status is no longer {expected:?}")]
  Conflict { link: Uuid, expected: LinkStatus },

  #[error("vehicle {vehicle} already has an active owner (link {existing_link})")]
  DuplicateOwner { vehicle: Uuid, existing_link: Uuid },

  #[error("entity {entity} lacks permission {permission:?}")]
  PermissionDenied { entity: Uuid, permission: String },

  /// No registered event partition covers the event timestamp. Partitions
  /// are created by an explicit administrative call, never on first insert.
  #[error("no event partition covers {timestamp}")]
  PartitionMissing { timestamp: DateTime<Utc> },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// Backend failure (I/O, corrupt row, …) surfaced by a store
  /// implementation.
  #[error("storage error: {0}")]
  Storage(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
