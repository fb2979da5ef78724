//! Entity types — the people, companies, and devices that hold vehicle links.
//!
//! An entity's display name and contact points are never stored as mutable
//! columns. Each lives in an append-only history table; the entity row keeps
//! a pointer to the current history record, repointed on every change. This
//! preserves a full, queryable identity history ("who was this entity when
//! the claim was filed").

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// What sort of actor an entity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Person,
  Company,
  /// An automated agent identified by a device fingerprint.
  Device,
}

impl EntityKind {
  /// Number of digits the kind's legal id must have (CPF for people,
  /// CNPJ for companies). Devices carry no legal id.
  pub fn legal_id_digits(self) -> Option<usize> {
    match self {
      Self::Person => Some(11),
      Self::Company => Some(14),
      Self::Device => None,
    }
  }

  /// Validate a legal id against the kind's required format. `None` is an
  /// error for kinds that require one.
  pub fn check_legal_id(self, legal_id: Option<&str>) -> Result<()> {
    let Some(expected) = self.legal_id_digits() else {
      return Ok(());
    };
    match legal_id {
      None => Err(Error::Validation {
        field:  "legal_id",
        reason: format!("required for {self:?} entities"),
      }),
      Some(id) => {
        let digits = id.chars().filter(char::is_ascii_digit).count();
        if digits != expected || !id.chars().all(|c| c.is_ascii_digit()) {
          return Err(Error::Validation {
            field:  "legal_id",
            reason: format!("expected {expected} digits, got {id:?}"),
          });
        }
        Ok(())
      },
    }
  }
}

// ─── Name & contact history ──────────────────────────────────────────────────

/// The role a name record plays for its entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameType {
  LegalName,
  DisplayName,
  Nickname,
  Alias,
  TradeName,
}

/// One row of an entity's append-only name history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityName {
  pub name_id:    Uuid,
  pub entity_id:  Uuid,
  pub name_type:  NameType,
  pub value:      String,
  /// Exactly one current row exists per `(entity, name_type)`.
  pub is_current: bool,
  pub start_date: NaiveDate,
  pub end_date:   Option<NaiveDate>,
  /// Free-text motive, e.g. "marriage", "correction".
  pub reason:     Option<String>,
  pub changed_by: Option<Uuid>,
}

/// The channel a contact record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
  Email,
  Phone,
  Whatsapp,
  ApiEndpoint,
  MqttTopic,
}

/// One row of an entity's append-only contact history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityContact {
  pub contact_id:   Uuid,
  pub entity_id:    Uuid,
  pub contact_type: ContactType,
  pub value:        String,
  /// Exactly one current row exists per `(entity, contact_type)`.
  pub is_current:   bool,
  pub is_verified:  bool,
  pub verified_at:  Option<DateTime<Utc>>,
  /// Display label, e.g. "work".
  pub label:        Option<String>,
  pub start_date:   NaiveDate,
  pub end_date:     Option<NaiveDate>,
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// The entity row itself. Name/email/phone are pointers into the history
/// tables, resolved on read — never denormalised copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id:          Uuid,
  /// Human-opaque unique code, `ENT-…` (or `ANON-…` for anonymous entities).
  pub entity_code:        String,
  pub kind:               EntityKind,
  /// CPF/CNPJ; unique when present.
  pub legal_id:           Option<String>,
  pub active:             bool,
  pub verified:           bool,
  /// Created without credentials (device fingerprint only); upgradable via
  /// [`crate::store::LedgerStore::convert_anonymous_to_verified`].
  pub is_anonymous:       bool,
  pub device_fingerprint: Option<String>,
  pub primary_name_id:    Option<Uuid>,
  pub primary_email_id:   Option<Uuid>,
  pub primary_phone_id:   Option<Uuid>,
  pub created_at:         DateTime<Utc>,
}

/// Input to [`crate::store::LedgerStore::create_entity`].
#[derive(Debug, Clone)]
pub struct NewEntity {
  pub kind:     EntityKind,
  pub name:     String,
  pub email:    Option<String>,
  pub phone:    Option<String>,
  pub legal_id: Option<String>,
}

/// Attributes supplied when upgrading an anonymous entity. At least one of
/// `email` / `phone` / `legal_id` must be present for the upgrade to count.
#[derive(Debug, Clone, Default)]
pub struct VerifiedUpgrade {
  pub name:     Option<String>,
  pub email:    Option<String>,
  pub phone:    Option<String>,
  pub legal_id: Option<String>,
}

impl VerifiedUpgrade {
  pub fn has_credential(&self) -> bool {
    self.email.is_some() || self.phone.is_some() || self.legal_id.is_some()
  }
}

/// The materialised read model for an entity: the row plus its resolved
/// current name and contact values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityProfile {
  pub entity:       Entity,
  pub display_name: Option<String>,
  pub email:        Option<String>,
  pub phone:        Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn person_requires_cpf() {
    let err = EntityKind::Person.check_legal_id(None).unwrap_err();
    assert!(matches!(err, Error::Validation { field: "legal_id", .. }));
  }

  #[test]
  fn person_accepts_eleven_digits() {
    assert!(EntityKind::Person.check_legal_id(Some("12345678901")).is_ok());
  }

  #[test]
  fn company_rejects_cpf_length() {
    let err = EntityKind::Company
      .check_legal_id(Some("12345678901"))
      .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
  }

  #[test]
  fn device_needs_no_legal_id() {
    assert!(EntityKind::Device.check_legal_id(None).is_ok());
  }

  #[test]
  fn non_digit_characters_rejected() {
    let err = EntityKind::Person
      .check_legal_id(Some("123.456.789-01"))
      .unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
  }
}
