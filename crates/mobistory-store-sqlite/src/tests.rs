//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Datelike as _, Duration, TimeZone as _, Utc};
use mobistory_core::{
  Error as CoreError,
  entity::{ContactType, EntityKind, NameType, NewEntity, VerifiedUpgrade},
  event::{
    EventCategory, EventSeverity, EventVisibility, NewVehicleEvent,
    SourceRef, SourceTable, TimelineCursor, TimelineQuery,
  },
  link::{ClaimLink, GrantLink, LinkFilter, LinkStatus, RequestLink, role},
  permission::code,
  source::{
    ClaimSeverity, NewClaim, NewMileageRecord, NewOdometer, NewPlate,
    NewRefuel, NewVehicleColor, PlateStatus,
  },
  store::LedgerStore,
  vehicle::NewVehicle,
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn person(name: &str, cpf: &str) -> NewEntity {
  NewEntity {
    kind:     EntityKind::Person,
    name:     name.into(),
    email:    Some(format!("{}@example.com", name.to_lowercase())),
    phone:    None,
    legal_id: Some(cpf.into()),
  }
}

async fn vehicle(s: &SqliteStore) -> Uuid {
  s.create_vehicle(NewVehicle::default())
    .await
    .expect("vehicle")
    .vehicle_id
}

/// Bootstrap grant: the first owner on a fresh vehicle.
async fn owner(s: &SqliteStore, vehicle_id: Uuid, entity_id: Uuid) -> Uuid {
  s.grant_link(GrantLink {
    vehicle_id,
    entity_id,
    role_code: role::OWNER.into(),
    granted_by: entity_id,
    start_date: None,
    end_date: None,
    observations: None,
  })
  .await
  .expect("owner grant")
  .link_id
}

fn refuel(vehicle_id: Uuid, liters: f64, day: u32) -> NewRefuel {
  NewRefuel {
    vehicle_id,
    registered_by: None,
    quantity: liters,
    unit_price: Some(5.89),
    total_price: None,
    refuel_km: None,
    full_tank: false,
    observations: None,
    refuel_date: Utc.with_ymd_and_hms(2025, 6, day, 12, 0, 0).unwrap(),
  }
}

fn assert_core<T: std::fmt::Debug>(
  result: Result<T, Error>,
  check: impl FnOnce(&CoreError) -> bool,
) {
  match result.unwrap_err() {
    Error::Core(e) if check(&e) => {},
    other => panic!("unexpected error: {other:?}"),
  }
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_entity_resolves_current_name_and_email() {
  let s = store().await;
  let entity = s.create_entity(person("Alice", "12345678901")).await.unwrap();

  assert!(entity.entity_code.starts_with("ENT-"));
  assert_eq!(entity.kind, EntityKind::Person);
  assert!(entity.primary_name_id.is_some());

  let profile = s
    .materialize_entity(entity.entity_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(profile.display_name.as_deref(), Some("Alice"));
  assert_eq!(profile.email.as_deref(), Some("alice@example.com"));
  assert!(profile.phone.is_none());
}

#[tokio::test]
async fn person_without_legal_id_is_rejected() {
  let s = store().await;
  let result = s
    .create_entity(NewEntity {
      kind:     EntityKind::Person,
      name:     "Ghost".into(),
      email:    None,
      phone:    None,
      legal_id: None,
    })
    .await;
  assert_core(result, |e| matches!(e, CoreError::Validation { field: "legal_id", .. }));
}

#[tokio::test]
async fn duplicate_legal_id_is_rejected() {
  let s = store().await;
  s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let result = s.create_entity(person("Alina", "12345678901")).await;
  assert_core(result, |e| matches!(e, CoreError::Validation { field: "legal_id", .. }));
}

#[tokio::test]
async fn update_name_appends_and_keeps_one_current() {
  let s = store().await;
  let entity = s.create_entity(person("Alice", "12345678901")).await.unwrap();

  s.update_name(
    entity.entity_id,
    NameType::DisplayName,
    "Alice Liddell".into(),
    Some("marriage".into()),
    None,
  )
  .await
  .unwrap();

  let history = s.get_name_history(entity.entity_id).await.unwrap();
  assert_eq!(history.len(), 2);
  let current: Vec<_> = history.iter().filter(|n| n.is_current).collect();
  assert_eq!(current.len(), 1);
  assert_eq!(current[0].value, "Alice Liddell");

  // The replaced row is closed, not deleted.
  let closed = history.iter().find(|n| !n.is_current).unwrap();
  assert_eq!(closed.value, "Alice");
  assert!(closed.end_date.is_some());

  // The profile follows the repointed primary reference.
  let profile = s
    .materialize_entity(entity.entity_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(profile.display_name.as_deref(), Some("Alice Liddell"));
}

#[tokio::test]
async fn update_contact_rotates_per_type() {
  let s = store().await;
  let entity = s.create_entity(person("Alice", "12345678901")).await.unwrap();

  s.update_contact(
    entity.entity_id,
    ContactType::Email,
    "new@example.com".into(),
    None,
  )
  .await
  .unwrap();
  s.update_contact(entity.entity_id, ContactType::Phone, "+5511999990000".into(), None)
    .await
    .unwrap();

  let history = s.get_contact_history(entity.entity_id).await.unwrap();
  // original email + replacement + phone
  assert_eq!(history.len(), 3);
  let current_emails: Vec<_> = history
    .iter()
    .filter(|c| c.contact_type == ContactType::Email && c.is_current)
    .collect();
  assert_eq!(current_emails.len(), 1);
  assert_eq!(current_emails[0].value, "new@example.com");

  let profile = s
    .materialize_entity(entity.entity_id)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(profile.email.as_deref(), Some("new@example.com"));
  assert_eq!(profile.phone.as_deref(), Some("+5511999990000"));
}

#[tokio::test]
async fn anonymous_entity_upgrade_flow() {
  let s = store().await;
  let anon = s
    .create_anonymous_entity("fp-1234".into(), Some("Visitor".into()))
    .await
    .unwrap();
  assert!(anon.is_anonymous);
  assert!(!anon.verified);
  assert!(anon.entity_code.starts_with("ANON-"));

  let upgraded = s
    .convert_anonymous_to_verified(anon.entity_id, VerifiedUpgrade {
      email: Some("me@example.com".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(!upgraded.is_anonymous);
  assert!(upgraded.verified);

  // A second conversion is a no-op.
  let again = s
    .convert_anonymous_to_verified(anon.entity_id, VerifiedUpgrade {
      email: Some("other@example.com".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert!(again.verified);
  let profile = s.materialize_entity(anon.entity_id).await.unwrap().unwrap();
  assert_eq!(profile.email.as_deref(), Some("me@example.com"));
}

#[tokio::test]
async fn deactivate_is_soft() {
  let s = store().await;
  let entity = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  s.deactivate_entity(entity.entity_id).await.unwrap();

  // Gone from the active listing, still loadable by id.
  let listed = s.list_entities(100, 0).await.unwrap();
  assert!(listed.is_empty());
  let loaded = s.get_entity(entity.entity_id).await.unwrap().unwrap();
  assert!(!loaded.active);
}

// ─── Vehicles ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_vin_is_rejected() {
  let s = store().await;
  s.create_vehicle(NewVehicle {
    vin: Some("9BWZZZ377VT004251".into()),
    ..Default::default()
  })
  .await
  .unwrap();
  let result = s
    .create_vehicle(NewVehicle {
      vin: Some("9BWZZZ377VT004251".into()),
      ..Default::default()
    })
    .await;
  assert_core(result, |e| matches!(e, CoreError::Validation { field: "vin", .. }));
}

#[tokio::test]
async fn materialize_vehicle_resolves_history_heads() {
  let s = store().await;
  let v = vehicle(&s).await;

  s.add_plate(NewPlate {
    vehicle_id:           v,
    plate_number:         "ABC1D23".into(),
    state:                Some("SP".into()),
    city:                 None,
    licensing_start_date: None,
    licensing_end_date:   None,
    status:               PlateStatus::Active,
    created_by:           None,
  })
  .await
  .unwrap();
  s.set_color(NewVehicleColor {
    vehicle_id: v,
    color_name: "Silver".into(),
    is_primary: true,
  })
  .await
  .unwrap();
  s.record_mileage(NewMileageRecord {
    vehicle_id:  v,
    odometer_id: None,
    mileage:     42_000,
    recorded_at: Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
  })
  .await
  .unwrap();

  let profile = s.materialize_vehicle(v).await.unwrap().unwrap();
  assert_eq!(profile.current_plate.as_deref(), Some("ABC1D23"));
  assert_eq!(profile.current_color.as_deref(), Some("Silver"));
  assert_eq!(profile.current_km, Some(42_000));
}

// ─── Link lifecycle ──────────────────────────────────────────────────────────

#[tokio::test]
async fn bootstrap_owner_grant_goes_active() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;

  let link_id = owner(&s, v, alice.entity_id).await;
  let link = s.get_link(link_id).await.unwrap().unwrap();
  assert_eq!(link.status, LinkStatus::Active);
  assert!(link.link_code.starts_with("LNK-"));

  let history = s.get_link_history(link_id).await.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].from_status, None);
  assert_eq!(history[0].to_status, LinkStatus::Active);
}

#[tokio::test]
async fn grant_requires_grant_access() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let bob = s.create_entity(person("Bob", "22345678901")).await.unwrap();
  let carol = s.create_entity(person("Carol", "32345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  // Bob holds nothing on the vehicle.
  let denied = s
    .grant_link(GrantLink {
      vehicle_id:   v,
      entity_id:    carol.entity_id,
      role_code:    role::AUTHORIZED_DRIVER.into(),
      granted_by:   bob.entity_id,
      start_date:   None,
      end_date:     None,
      observations: None,
    })
    .await;
  assert_core(denied, |e| matches!(e, CoreError::PermissionDenied { .. }));

  // The owner can.
  let granted = s
    .grant_link(GrantLink {
      vehicle_id:   v,
      entity_id:    carol.entity_id,
      role_code:    role::AUTHORIZED_DRIVER.into(),
      granted_by:   alice.entity_id,
      start_date:   None,
      end_date:     None,
      observations: None,
    })
    .await
    .unwrap();
  assert_eq!(granted.status, LinkStatus::Active);
}

#[tokio::test]
async fn second_active_owner_is_rejected() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let bob = s.create_entity(person("Bob", "22345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let result = s
    .grant_link(GrantLink {
      vehicle_id:   v,
      entity_id:    bob.entity_id,
      role_code:    role::OWNER.into(),
      granted_by:   alice.entity_id,
      start_date:   None,
      end_date:     None,
      observations: None,
    })
    .await;
  assert_core(result, |e| matches!(e, CoreError::DuplicateOwner { .. }));
}

#[tokio::test]
async fn request_then_approve() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let bob = s.create_entity(person("Bob", "22345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let link = s
    .request_link(RequestLink {
      vehicle_id:   v,
      entity_id:    bob.entity_id,
      role_code:    role::AUTHORIZED_DRIVER.into(),
      requested_by: bob.entity_id,
    })
    .await
    .unwrap();
  assert_eq!(link.status, LinkStatus::PendingRequest);

  let approved = s
    .approve_link(link.link_id, alice.entity_id, Some("fine by me".into()))
    .await
    .unwrap();
  assert_eq!(approved.status, LinkStatus::Active);

  let history = s.get_link_history(link.link_id).await.unwrap();
  assert_eq!(history.len(), 2);
  assert_eq!(history[1].from_status, Some(LinkStatus::PendingRequest));
  assert_eq!(history[1].to_status, LinkStatus::Active);
  assert_eq!(history[1].changed_by, Some(alice.entity_id));
  assert_eq!(history[1].reason.as_deref(), Some("fine by me"));
}

#[tokio::test]
async fn request_then_reject() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let bob = s.create_entity(person("Bob", "22345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let link = s
    .request_link(RequestLink {
      vehicle_id:   v,
      entity_id:    bob.entity_id,
      role_code:    role::RENTER.into(),
      requested_by: bob.entity_id,
    })
    .await
    .unwrap();
  let rejected = s
    .reject_link(link.link_id, alice.entity_id, None)
    .await
    .unwrap();
  assert_eq!(rejected.status, LinkStatus::Rejected);

  // A rejected link is closed for further transitions.
  let again = s.approve_link(link.link_id, alice.entity_id, None).await;
  assert_core(again, |e| matches!(e, CoreError::InvalidState { .. }));
}

#[tokio::test]
async fn claim_requires_document_proof() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;

  let result = s
    .claim_link(ClaimLink {
      vehicle_id:     v,
      entity_id:      alice.entity_id,
      role_code:      role::OWNER.into(),
      document_proof: "  ".into(),
    })
    .await;
  assert_core(result, |e| {
    matches!(e, CoreError::Validation { field: "document_proof", .. })
  });
}

#[tokio::test]
async fn claim_validated_approved_sets_validator() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let admin = s.create_entity(person("Root", "99345678901")).await.unwrap();
  let v = vehicle(&s).await;

  let link = s
    .claim_link(ClaimLink {
      vehicle_id:     v,
      entity_id:      alice.entity_id,
      role_code:      role::OWNER.into(),
      document_proof: "file://proof-of-purchase.pdf".into(),
    })
    .await
    .unwrap();
  assert_eq!(link.status, LinkStatus::PendingValidation);

  let validated = s
    .validate_link(link.link_id, true, admin.entity_id, None)
    .await
    .unwrap();
  assert_eq!(validated.status, LinkStatus::Active);
  assert!(validated.validated_at.is_some());
  assert_eq!(validated.validated_by, Some(admin.entity_id));
}

#[tokio::test]
async fn claim_validated_rejected() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let admin = s.create_entity(person("Root", "99345678901")).await.unwrap();
  let v = vehicle(&s).await;

  let link = s
    .claim_link(ClaimLink {
      vehicle_id:     v,
      entity_id:      alice.entity_id,
      role_code:      role::OWNER.into(),
      document_proof: "file://forged.pdf".into(),
    })
    .await
    .unwrap();
  let rejected = s
    .validate_link(link.link_id, false, admin.entity_id, Some("illegible".into()))
    .await
    .unwrap();
  assert_eq!(rejected.status, LinkStatus::Rejected);
}

#[tokio::test]
async fn approve_is_not_valid_for_claims() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;

  let link = s
    .claim_link(ClaimLink {
      vehicle_id:     v,
      entity_id:      alice.entity_id,
      role_code:      role::OWNER.into(),
      document_proof: "file://proof.pdf".into(),
    })
    .await
    .unwrap();
  // The request-approval path must not bypass validation.
  let result = s.approve_link(link.link_id, alice.entity_id, None).await;
  assert_core(result, |e| matches!(e, CoreError::InvalidState { .. }));
}

#[tokio::test]
async fn terminate_twice_fails_and_leaves_row_unchanged() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  let link_id = owner(&s, v, alice.entity_id).await;

  let terminated = s
    .terminate_link(link_id, alice.entity_id, Some("sold".into()))
    .await
    .unwrap();
  assert_eq!(terminated.status, LinkStatus::Terminated);
  assert_eq!(terminated.end_date, Some(Utc::now().date_naive()));

  let result = s.terminate_link(link_id, alice.entity_id, None).await;
  assert_core(result, |e| {
    matches!(e, CoreError::InvalidState { from: LinkStatus::Terminated, .. })
  });

  let unchanged = s.get_link(link_id).await.unwrap().unwrap();
  assert_eq!(unchanged.status, LinkStatus::Terminated);
  assert_eq!(unchanged.end_date, terminated.end_date);
}

#[tokio::test]
async fn revoke_records_revoker_and_forbids_self() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let bob = s.create_entity(person("Bob", "22345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let link = s
    .grant_link(GrantLink {
      vehicle_id:   v,
      entity_id:    bob.entity_id,
      role_code:    role::AUTHORIZED_DRIVER.into(),
      granted_by:   alice.entity_id,
      start_date:   None,
      end_date:     None,
      observations: None,
    })
    .await
    .unwrap();

  let selfish = s
    .revoke_link(link.link_id, bob.entity_id, None)
    .await;
  assert_core(selfish, |e| matches!(e, CoreError::Validation { field: "revoked_by", .. }));

  let revoked = s
    .revoke_link(link.link_id, alice.entity_id, Some("car sold".into()))
    .await
    .unwrap();
  assert_eq!(revoked.status, LinkStatus::Revoked);

  let history = s.get_link_history(link.link_id).await.unwrap();
  let last = history.last().unwrap();
  assert_eq!(last.to_status, LinkStatus::Revoked);
  assert_eq!(last.changed_by, Some(alice.entity_id));
  assert_eq!(last.reason.as_deref(), Some("car sold"));
}

#[tokio::test]
async fn link_filters_and_owner_queries() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let bob = s.create_entity(person("Bob", "22345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let driver = s
    .grant_link(GrantLink {
      vehicle_id:   v,
      entity_id:    bob.entity_id,
      role_code:    role::AUTHORIZED_DRIVER.into(),
      granted_by:   alice.entity_id,
      start_date:   None,
      end_date:     None,
      observations: None,
    })
    .await
    .unwrap();

  assert_eq!(s.count_active_links(v).await.unwrap(), 2);

  let owners = s.get_owners(v).await.unwrap();
  assert_eq!(owners.len(), 1);
  assert_eq!(owners[0].entity_id, alice.entity_id);

  let drivers = s
    .get_vehicle_links(v, LinkFilter {
      role_code: Some(role::AUTHORIZED_DRIVER.into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(drivers.len(), 1);
  assert_eq!(drivers[0].link_id, driver.link_id);

  // Terminated links disappear from the default listing.
  s.terminate_link(driver.link_id, bob.entity_id, None)
    .await
    .unwrap();
  let open = s.get_entity_links(bob.entity_id, LinkFilter::default()).await.unwrap();
  assert!(open.is_empty());
  let all = s
    .get_entity_links(bob.entity_id, LinkFilter {
      include_closed: true,
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(all.len(), 1);
}

// ─── Permissions ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn owner_may_delete_driver_may_only_view() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let bob = s.create_entity(person("Bob", "22345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;
  s.grant_link(GrantLink {
    vehicle_id:   v,
    entity_id:    bob.entity_id,
    role_code:    role::AUTHORIZED_DRIVER.into(),
    granted_by:   alice.entity_id,
    start_date:   None,
    end_date:     None,
    observations: None,
  })
  .await
  .unwrap();

  assert!(s.has_permission(alice.entity_id, v, code::DELETE).await.unwrap());
  assert!(!s.has_permission(bob.entity_id, v, code::DELETE).await.unwrap());
  assert!(s.has_permission(bob.entity_id, v, code::VIEW).await.unwrap());

  let bob_perms = s.permissions_for(bob.entity_id, v).await.unwrap();
  assert_eq!(bob_perms, vec![code::VIEW, code::VIEW_HISTORY]);
}

#[tokio::test]
async fn revocation_flips_permission_off() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let bob = s.create_entity(person("Bob", "22345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;
  let link = s
    .grant_link(GrantLink {
      vehicle_id:   v,
      entity_id:    bob.entity_id,
      role_code:    role::MANAGER.into(),
      granted_by:   alice.entity_id,
      start_date:   None,
      end_date:     None,
      observations: None,
    })
    .await
    .unwrap();

  assert!(s.has_permission(bob.entity_id, v, code::EDIT).await.unwrap());
  s.revoke_link(link.link_id, alice.entity_id, None).await.unwrap();
  assert!(!s.has_permission(bob.entity_id, v, code::EDIT).await.unwrap());
}

#[tokio::test]
async fn expired_link_grants_nothing_but_keeps_status() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;

  let yesterday = (Utc::now() - Duration::days(1)).date_naive();
  let link = s
    .grant_link(GrantLink {
      vehicle_id:   v,
      entity_id:    alice.entity_id,
      role_code:    role::OWNER.into(),
      granted_by:   alice.entity_id,
      start_date:   Some(yesterday - Duration::days(30)),
      end_date:     Some(yesterday),
      observations: None,
    })
    .await
    .unwrap();

  assert!(!s.has_permission(alice.entity_id, v, code::VIEW).await.unwrap());
  let loaded = s.get_link(link.link_id).await.unwrap().unwrap();
  assert_eq!(loaded.status, LinkStatus::Active);
}

// ─── Event log ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn refuel_projects_one_event_per_record() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  s.record_refuel(refuel(v, 40.0, 10)).await.unwrap();
  s.record_refuel(refuel(v, 35.5, 11)).await.unwrap();

  let events = s
    .timeline(
      v,
      TimelineQuery {
        event_type: Some("refuel".into()),
        ..Default::default()
      },
      Some(alice.entity_id),
    )
    .await
    .unwrap();
  assert_eq!(events.len(), 2);
  assert_eq!(events[0].category, EventCategory::Usage);
  // Newest first.
  assert_eq!(events[0].event_data["liters"], 35.5);
  assert_eq!(events[1].event_data["liters"], 40.0);
  assert_eq!(events[1].source.table, SourceTable::Refuels);
}

#[tokio::test]
async fn record_event_is_idempotent() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let source = SourceRef {
    table:     SourceTable::Actions,
    record_id: Uuid::new_v4(),
  };
  let input = NewVehicleEvent {
    vehicle_id:      v,
    entity_id:       None,
    category:        EventCategory::Documentation,
    event_type:      "action_executed".into(),
    event_timestamp: Utc.with_ymd_and_hms(2025, 5, 2, 8, 0, 0).unwrap(),
    severity:        None,
    title:           "Inspection done".into(),
    description:     None,
    event_data:      serde_json::json!({"ok": true}),
    source,
    tags:            vec![],
    visibility:      EventVisibility::OwnerOnly,
  };

  let first = s.record_event(input.clone()).await.unwrap();
  let second = s.record_event(input).await.unwrap();
  assert_eq!(first, second);

  let events = s
    .timeline(
      v,
      TimelineQuery {
        event_type: Some("action_executed".into()),
        ..Default::default()
      },
      Some(alice.entity_id),
    )
    .await
    .unwrap();
  assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn severe_claim_becomes_critical_alert() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  s.report_claim(NewClaim {
    vehicle_id:        v,
    link_id:           None,
    claim_type:        Some("collision".into()),
    severity:          Some(ClaimSeverity::Severe),
    claim_date:        Utc.with_ymd_and_hms(2025, 7, 4, 18, 30, 0).unwrap(),
    claim_km:          Some(43_000),
    location_lat:      None,
    location_lng:      None,
    address:           None,
    police_report:     None,
    insurance_status:  None,
    total_repair_cost: None,
    description:       Some("rear-ended at a junction".into()),
  })
  .await
  .unwrap();

  let events = s
    .timeline(
      v,
      TimelineQuery {
        category: Some(EventCategory::Alert),
        ..Default::default()
      },
      Some(alice.entity_id),
    )
    .await
    .unwrap();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].severity, Some(EventSeverity::Critical));
  assert_eq!(events[0].event_type, "claim_reported");
}

#[tokio::test]
async fn insert_outside_partitions_fails_and_rolls_back() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let result = s
    .record_mileage(NewMileageRecord {
      vehicle_id:  v,
      odometer_id: None,
      mileage:     10_000,
      recorded_at: Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).unwrap(),
    })
    .await;
  assert_core(result, |e| matches!(e, CoreError::PartitionMissing { .. }));

  // The source write rolled back with the event.
  let profile = s.materialize_vehicle(v).await.unwrap().unwrap();
  assert_eq!(profile.current_km, None);
}

#[tokio::test]
async fn admin_partition_creation_opens_the_range() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let old_reading = NewMileageRecord {
    vehicle_id:  v,
    odometer_id: None,
    mileage:     5_000,
    recorded_at: Utc.with_ymd_and_hms(2024, 2, 15, 10, 0, 0).unwrap(),
  };
  assert!(s.record_mileage(old_reading.clone()).await.is_err());

  let partition = s.create_partition(2024, 1).await.unwrap();
  assert_eq!(partition.name, "vehicle_events_2024_q1");
  s.record_mileage(old_reading).await.unwrap();
}

#[tokio::test]
async fn dropping_a_partition_prunes_its_events() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  s.record_refuel(refuel(v, 40.0, 10)).await.unwrap();
  let pruned = s.drop_partition(2025, 2).await.unwrap();
  assert_eq!(pruned, 1);

  let events = s
    .timeline(
      v,
      TimelineQuery {
        event_type: Some("refuel".into()),
        ..Default::default()
      },
      Some(alice.entity_id),
    )
    .await
    .unwrap();
  assert!(events.is_empty());

  // Dropping a quarter that was never registered is loud.
  let missing = s.drop_partition(2019, 1).await;
  assert_core(missing, |e| matches!(e, CoreError::Validation { field: "partition", .. }));
}

#[tokio::test]
async fn timeline_visibility_follows_caller_relation() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let bob = s.create_entity(person("Bob", "22345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;
  s.grant_link(GrantLink {
    vehicle_id:   v,
    entity_id:    bob.entity_id,
    role_code:    role::MECHANIC.into(),
    granted_by:   alice.entity_id,
    start_date:   None,
    end_date:     None,
    observations: None,
  })
  .await
  .unwrap();

  // owner_only (default via the refuel projector), linked_entities, public.
  s.record_refuel(refuel(v, 40.0, 10)).await.unwrap();
  for (event_type, visibility) in [
    ("shared_note", EventVisibility::LinkedEntities),
    ("recall_notice", EventVisibility::Public),
  ] {
    s.record_event(NewVehicleEvent {
      vehicle_id:      v,
      entity_id:       None,
      category:        EventCategory::Documentation,
      event_type:      event_type.into(),
      event_timestamp: Utc.with_ymd_and_hms(2025, 6, 20, 9, 0, 0).unwrap(),
      severity:        None,
      title:           event_type.into(),
      description:     None,
      event_data:      serde_json::json!({}),
      source:          SourceRef {
        table:     SourceTable::Actions,
        record_id: Uuid::new_v4(),
      },
      tags:            vec![],
      visibility,
    })
    .await
    .unwrap();
  }

  let for_owner = s
    .timeline(v, TimelineQuery::default(), Some(alice.entity_id))
    .await
    .unwrap();
  // refuel + note + recall + the two link_created events
  assert!(for_owner.iter().any(|e| e.event_type == "refuel"));
  assert!(for_owner.iter().any(|e| e.event_type == "shared_note"));

  let for_mechanic = s
    .timeline(v, TimelineQuery::default(), Some(bob.entity_id))
    .await
    .unwrap();
  assert!(!for_mechanic.iter().any(|e| e.event_type == "refuel"));
  assert!(for_mechanic.iter().any(|e| e.event_type == "shared_note"));
  assert!(for_mechanic.iter().any(|e| e.event_type == "recall_notice"));

  let for_stranger = s.timeline(v, TimelineQuery::default(), None).await.unwrap();
  assert_eq!(for_stranger.len(), 1);
  assert_eq!(for_stranger[0].event_type, "recall_notice");
}

#[tokio::test]
async fn timeline_keyset_pagination_is_disjoint_and_ordered() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  for day in 1..=5 {
    s.record_refuel(refuel(v, f64::from(day), day)).await.unwrap();
  }

  let query = |before: Option<TimelineCursor>| TimelineQuery {
    event_type: Some("refuel".into()),
    limit: Some(2),
    before,
    ..Default::default()
  };

  let page1 = s.timeline(v, query(None), Some(alice.entity_id)).await.unwrap();
  assert_eq!(page1.len(), 2);
  let cursor = TimelineCursor {
    timestamp: page1[1].event_timestamp,
    event_id:  page1[1].event_id,
  };
  let page2 = s
    .timeline(v, query(Some(cursor)), Some(alice.entity_id))
    .await
    .unwrap();
  assert_eq!(page2.len(), 2);

  let mut seen: Vec<_> = page1.iter().chain(&page2).map(|e| e.event_id).collect();
  seen.dedup();
  assert_eq!(seen.len(), 4);

  let timestamps: Vec<_> = page1
    .iter()
    .chain(&page2)
    .map(|e| e.event_timestamp)
    .collect();
  assert!(timestamps.windows(2).all(|w| w[0] > w[1]));
}

#[tokio::test]
async fn plate_updates_deduplicate_against_insert_event() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let plate = s
    .add_plate(NewPlate {
      vehicle_id:           v,
      plate_number:         "ABC1D23".into(),
      state:                Some("SP".into()),
      city:                 None,
      licensing_start_date: Some(
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap().date_naive(),
      ),
      licensing_end_date:   None,
      status:               PlateStatus::Active,
      created_by:           Some(alice.entity_id),
    })
    .await
    .unwrap();

  // The later status flip maps to the same source record; the idempotency
  // key swallows the second event.
  s.change_plate_status(plate.plate_id, PlateStatus::Inactive)
    .await
    .unwrap();

  let events = s
    .timeline(
      v,
      TimelineQuery {
        category: Some(EventCategory::Modification),
        ..Default::default()
      },
      Some(alice.entity_id),
    )
    .await
    .unwrap();
  let plate_events: Vec<_> = events
    .iter()
    .filter(|e| e.source.table == SourceTable::Plates)
    .collect();
  assert_eq!(plate_events.len(), 1);
  assert_eq!(plate_events[0].event_type, "plate_added");
}

#[tokio::test]
async fn odometer_removal_is_single_shot() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  owner(&s, v, alice.entity_id).await;

  let odometer = s
    .install_odometer(NewOdometer {
      vehicle_id:        v,
      brand:             Some("VDO".into()),
      model:             None,
      part_number:       None,
      installation_date: Some(
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap().date_naive(),
      ),
      cost:              None,
      warranty_months:   None,
      reason_for_change: None,
      damage_type:       None,
    })
    .await
    .unwrap();

  let removal_day = Utc
    .with_ymd_and_hms(2025, 6, 20, 0, 0, 0)
    .unwrap()
    .date_naive();
  s.remove_odometer(odometer.odometer_id, removal_day).await.unwrap();
  let again = s.remove_odometer(odometer.odometer_id, removal_day).await;
  assert_core(again, |e| {
    matches!(e, CoreError::Validation { field: "removal_date", .. })
  });
}

#[tokio::test]
async fn link_lifecycle_reaches_the_timeline() {
  let s = store().await;
  let alice = s.create_entity(person("Alice", "12345678901")).await.unwrap();
  let v = vehicle(&s).await;
  let link_id = owner(&s, v, alice.entity_id).await;

  let events = s
    .timeline(v, TimelineQuery::default(), Some(alice.entity_id))
    .await
    .unwrap();
  let created: Vec<_> = events
    .iter()
    .filter(|e| e.event_type == "link_created")
    .collect();
  assert_eq!(created.len(), 1);
  assert_eq!(created[0].source, SourceRef {
    table:     SourceTable::Links,
    record_id: link_id,
  });
  assert_eq!(
    created[0].event_timestamp.year(),
    Utc::now().year(),
  );
}
