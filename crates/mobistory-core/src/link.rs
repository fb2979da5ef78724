//! Link types — the time-bounded relationship between an entity and a
//! vehicle, and the state machine its status moves through.
//!
//! A link is the unit permission checks are evaluated against. Every status
//! transition appends a [`LinkStatusChange`] row in the same transaction as
//! the link write; the history is never edited.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Role catalog ────────────────────────────────────────────────────────────

/// Well-known role codes seeded into the `link_types` catalog. The catalog
/// stays data-driven: these constants only name the seed rows, the store
/// resolves codes against the table.
pub mod role {
  pub const OWNER: &str = "owner";
  pub const CO_OWNER: &str = "co_owner";
  pub const RENTER: &str = "renter";
  pub const AUTHORIZED_DRIVER: &str = "authorized_driver";
  pub const MANAGER: &str = "manager";
  pub const MECHANIC: &str = "mechanic";
}

/// A catalog row describing one relationship kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRole {
  pub link_type_id: Uuid,
  pub code:         String,
  pub name:         String,
  pub description:  Option<String>,
  pub active:       bool,
}

// ─── Status state machine ────────────────────────────────────────────────────

/// Link lifecycle states. The initial state depends on the creation path:
/// `grant` → `Active`, `request` → `PendingRequest`, `claim` →
/// `PendingValidation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
  PendingRequest,
  PendingValidation,
  Active,
  Rejected,
  Terminated,
  Revoked,
}

impl LinkStatus {
  /// True for states no transition leaves.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Rejected | Self::Terminated | Self::Revoked)
  }

  /// Whether `self -> to` is a legal edge of the state machine.
  ///
  /// Expiry (`end_date` in the past) is deliberately absent: an expired link
  /// keeps its status and merely stops qualifying for permissions.
  pub fn can_transition(self, to: LinkStatus) -> bool {
    matches!(
      (self, to),
      (Self::PendingRequest, Self::Active)
        | (Self::PendingRequest, Self::Rejected)
        | (Self::PendingValidation, Self::Active)
        | (Self::PendingValidation, Self::Rejected)
        | (Self::Active, Self::Terminated)
        | (Self::Active, Self::Revoked)
    )
  }
}

// ─── Link ────────────────────────────────────────────────────────────────────

/// The relationship record connecting one entity to one vehicle via one
/// role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
  pub link_id:        Uuid,
  /// Human-opaque unique code, `LNK-…`.
  pub link_code:      String,
  pub entity_id:      Uuid,
  pub vehicle_id:     Uuid,
  pub link_type_id:   Uuid,
  pub status:         LinkStatus,
  pub start_date:     NaiveDate,
  pub end_date:       Option<NaiveDate>,
  /// Evidentiary attachment reference supplied on the claim path.
  pub document_proof: Option<String>,
  pub validated_at:   Option<DateTime<Utc>>,
  pub validated_by:   Option<Uuid>,
  pub observations:   Option<String>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
}

impl Link {
  /// Whether the link grants permissions on `today`: `Active` status and
  /// `start_date <= today <= end_date` (open-ended when `end_date` is
  /// `None`).
  pub fn is_valid_on(&self, today: NaiveDate) -> bool {
    self.status == LinkStatus::Active
      && self.start_date <= today
      && self.end_date.is_none_or(|end| end >= today)
  }
}

/// One row of a link's append-only status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStatusChange {
  pub change_id:   Uuid,
  pub link_id:     Uuid,
  /// `None` for the row recording the link's creation.
  pub from_status: Option<LinkStatus>,
  pub to_status:   LinkStatus,
  pub changed_by:  Option<Uuid>,
  pub reason:      Option<String>,
  pub recorded_at: DateTime<Utc>,
}

// ─── Creation inputs ─────────────────────────────────────────────────────────

/// Input to [`crate::store::LedgerStore::grant_link`]: an authorized entity
/// hands a role to another entity, effective immediately.
#[derive(Debug, Clone)]
pub struct GrantLink {
  pub vehicle_id:   Uuid,
  pub entity_id:    Uuid,
  pub role_code:    String,
  pub granted_by:   Uuid,
  pub start_date:   Option<NaiveDate>,
  pub end_date:     Option<NaiveDate>,
  pub observations: Option<String>,
}

/// Input to [`crate::store::LedgerStore::request_link`]: the link waits in
/// `PendingRequest` for approval by the requested entity or an admin.
#[derive(Debug, Clone)]
pub struct RequestLink {
  pub vehicle_id:   Uuid,
  pub entity_id:    Uuid,
  pub role_code:    String,
  pub requested_by: Uuid,
}

/// Input to [`crate::store::LedgerStore::claim_link`]: the claimant asserts
/// a role with documentary proof and waits in `PendingValidation` for an
/// administrative validator.
#[derive(Debug, Clone)]
pub struct ClaimLink {
  pub vehicle_id:     Uuid,
  pub entity_id:      Uuid,
  pub role_code:      String,
  pub document_proof: String,
}

/// Filters for link list queries.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
  pub status:    Option<LinkStatus>,
  pub role_code: Option<String>,
  /// When `false` (default), terminal-status links are omitted.
  pub include_closed: bool,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pending_paths_resolve_to_active_or_rejected() {
    use LinkStatus::*;
    assert!(PendingRequest.can_transition(Active));
    assert!(PendingRequest.can_transition(Rejected));
    assert!(PendingValidation.can_transition(Active));
    assert!(PendingValidation.can_transition(Rejected));
  }

  #[test]
  fn active_only_leaves_via_terminate_or_revoke() {
    use LinkStatus::*;
    assert!(Active.can_transition(Terminated));
    assert!(Active.can_transition(Revoked));
    assert!(!Active.can_transition(Rejected));
    assert!(!Active.can_transition(PendingRequest));
  }

  #[test]
  fn terminal_states_have_no_exits() {
    use LinkStatus::*;
    for from in [Rejected, Terminated, Revoked] {
      assert!(from.is_terminal());
      for to in [PendingRequest, PendingValidation, Active, Rejected, Terminated, Revoked] {
        assert!(!from.can_transition(to));
      }
    }
  }

  #[test]
  fn expired_link_is_not_valid() {
    let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    let link = Link {
      link_id:        Uuid::new_v4(),
      link_code:      "LNK-TEST".into(),
      entity_id:      Uuid::new_v4(),
      vehicle_id:     Uuid::new_v4(),
      link_type_id:   Uuid::new_v4(),
      status:         LinkStatus::Active,
      start_date:     NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
      end_date:       Some(NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()),
      document_proof: None,
      validated_at:   None,
      validated_by:   None,
      observations:   None,
      created_at:     Utc::now(),
      updated_at:     Utc::now(),
    };
    assert!(!link.is_valid_on(today));
    // Status itself is untouched by expiry.
    assert_eq!(link.status, LinkStatus::Active);
  }
}
