//! Permission catalog types and the seed mapping from roles to permissions.
//!
//! The role → permission mapping is data, not logic: it is seeded into the
//! catalog tables at schema init and stays queryable and editable there.
//! Nothing in the engine hardcodes which role grants what.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::link::role;

// ─── Codes ───────────────────────────────────────────────────────────────────

/// Well-known permission codes seeded into the catalog.
pub mod code {
  pub const VIEW: &str = "vehicle.view";
  pub const EDIT: &str = "vehicle.edit";
  pub const DELETE: &str = "vehicle.delete";
  pub const GRANT_ACCESS: &str = "vehicle.grant_access";
  pub const VIEW_HISTORY: &str = "vehicle.view_history";
  pub const MANAGE_DOCUMENTS: &str = "vehicle.manage_documents";
}

// ─── Catalog rows ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionCategory {
  Operation,
  Management,
  Administration,
}

/// One atomic capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
  pub permission_id: Uuid,
  pub code:          String,
  pub name:          String,
  pub description:   Option<String>,
  pub category:      PermissionCategory,
  pub active:        bool,
  pub created_at:    DateTime<Utc>,
}

/// The many-to-many join giving a link role its default permission set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRolePermission {
  pub link_type_id:  Uuid,
  pub permission_id: Uuid,
  pub created_at:    DateTime<Utc>,
}

// ─── Seed data ───────────────────────────────────────────────────────────────

/// `(code, name, description)` for the six seeded link roles.
pub fn seed_roles() -> [(&'static str, &'static str, &'static str); 6] {
  [
    (role::OWNER, "Owner", "Primary holder of the vehicle"),
    (role::CO_OWNER, "Co-owner", "Shares ownership of the vehicle"),
    (role::RENTER, "Renter", "Holds the vehicle under a rental agreement"),
    (
      role::AUTHORIZED_DRIVER,
      "Authorized driver",
      "May drive the vehicle",
    ),
    (role::MANAGER, "Manager", "Administers the vehicle on behalf of owners"),
    (role::MECHANIC, "Mechanic", "Services the vehicle"),
  ]
}

/// `(code, name, category)` for the six seeded permissions.
pub fn seed_permissions()
-> [(&'static str, &'static str, PermissionCategory); 6] {
  use PermissionCategory::*;
  [
    (code::VIEW, "View vehicle", Operation),
    (code::EDIT, "Edit vehicle", Management),
    (code::DELETE, "Delete vehicle", Administration),
    (code::GRANT_ACCESS, "Grant access", Management),
    (code::VIEW_HISTORY, "View history", Operation),
    (code::MANAGE_DOCUMENTS, "Manage documents", Management),
  ]
}

/// Default permission set per role: owner gets everything, co-owner and
/// manager everything but delete, the rest view + view_history.
pub fn seed_role_permissions()
-> [(&'static str, &'static [&'static str]); 6] {
  const ALL: &[&str] = &[
    code::VIEW,
    code::EDIT,
    code::DELETE,
    code::GRANT_ACCESS,
    code::VIEW_HISTORY,
    code::MANAGE_DOCUMENTS,
  ];
  const MANAGE: &[&str] = &[
    code::VIEW,
    code::EDIT,
    code::GRANT_ACCESS,
    code::VIEW_HISTORY,
    code::MANAGE_DOCUMENTS,
  ];
  const VIEW_ONLY: &[&str] = &[code::VIEW, code::VIEW_HISTORY];

  [
    (role::OWNER, ALL),
    (role::CO_OWNER, MANAGE),
    (role::MANAGER, MANAGE),
    (role::AUTHORIZED_DRIVER, VIEW_ONLY),
    (role::RENTER, VIEW_ONLY),
    (role::MECHANIC, VIEW_ONLY),
  ]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_owner_may_delete() {
    for (role_code, perms) in seed_role_permissions() {
      let has_delete = perms.contains(&code::DELETE);
      assert_eq!(has_delete, role_code == role::OWNER, "{role_code}");
    }
  }

  #[test]
  fn every_role_may_view() {
    for (role_code, perms) in seed_role_permissions() {
      assert!(perms.contains(&code::VIEW), "{role_code}");
    }
  }
}
