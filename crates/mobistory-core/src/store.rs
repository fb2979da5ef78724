//! The `LedgerStore` trait — the storage abstraction the whole system is
//! written against.
//!
//! The trait is implemented by storage backends (e.g.
//! `mobistory-store-sqlite`). Higher layers (`mobistory-api`) depend on this
//! abstraction, not on any concrete backend.
//!
//! Write operations that span several rows (a link transition plus its
//! history row plus its projected event, a name update plus the pointer
//! repoint) are atomic: either every row of the group is committed or none
//! is.
//!
//! All methods return `Send` futures so the trait can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`).

use std::future::Future;

use uuid::Uuid;

use crate::{
  entity::{
    ContactType, Entity, EntityContact, EntityName, EntityProfile, NameType,
    NewEntity, VerifiedUpgrade,
  },
  event::{NewVehicleEvent, Partition, TimelineQuery, VehicleEvent},
  link::{
    ClaimLink, GrantLink, Link, LinkFilter, LinkRole, LinkStatusChange,
    RequestLink,
  },
  permission::Permission,
  source::{
    Action, Claim, MileageRecord, NewAction, NewClaim, NewMileageRecord,
    NewOdometer, NewPlate, NewRefuel, NewVehicleColor, NewVehicleCover,
    Odometer, Plate, PlateStatus, Refuel, VehicleColor, VehicleCover,
  },
  vehicle::{NewVehicle, Vehicle, VehicleProfile},
};

/// Abstraction over a Mobistory ledger backend.
pub trait LedgerStore: Send + Sync {
  type Error: std::error::Error
    + Into<crate::Error>
    + Send
    + Sync
    + 'static;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Create an entity with its initial current name and contact rows.
  /// Fails with a validation error when the kind requires a legal id
  /// (CPF/CNPJ) that is absent or malformed.
  fn create_entity(
    &self,
    input: NewEntity,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  /// Create a credential-less entity from a device fingerprint. The entity
  /// starts unverified with an `ANON-` code.
  fn create_anonymous_entity(
    &self,
    fingerprint: String,
    display_name: Option<String>,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  /// Upgrade an anonymous entity once it supplies at least one credential.
  /// No-op when the entity is already verified.
  fn convert_anonymous_to_verified(
    &self,
    entity_id: Uuid,
    upgrade: VerifiedUpgrade,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  fn get_entity(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  /// The entity with its current name/contact values resolved through the
  /// primary pointers. Returns `None` for unknown entities.
  fn materialize_entity(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<EntityProfile>, Self::Error>>
  + Send
  + '_;

  /// Active entities, paginated.
  fn list_entities(
    &self,
    limit: usize,
    offset: usize,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  /// Close the current name row for `(entity, name_type)`, insert the new
  /// current row, and repoint the entity's primary name when applicable.
  /// Prior rows are never deleted.
  fn update_name(
    &self,
    entity_id: Uuid,
    name_type: NameType,
    value: String,
    reason: Option<String>,
    changed_by: Option<Uuid>,
  ) -> impl Future<Output = Result<EntityName, Self::Error>> + Send + '_;

  /// Contact counterpart of [`LedgerStore::update_name`].
  fn update_contact(
    &self,
    entity_id: Uuid,
    contact_type: ContactType,
    value: String,
    label: Option<String>,
  ) -> impl Future<Output = Result<EntityContact, Self::Error>> + Send + '_;

  fn get_name_history(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Vec<EntityName>, Self::Error>> + Send + '_;

  fn get_contact_history(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Vec<EntityContact>, Self::Error>> + Send + '_;

  /// Soft delete: flips `active` off. History and links stay intact.
  fn deactivate_entity(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Vehicles ──────────────────────────────────────────────────────────

  fn create_vehicle(
    &self,
    input: NewVehicle,
  ) -> impl Future<Output = Result<Vehicle, Self::Error>> + Send + '_;

  fn get_vehicle(
    &self,
    vehicle_id: Uuid,
  ) -> impl Future<Output = Result<Option<Vehicle>, Self::Error>> + Send + '_;

  /// The vehicle with current plate/colour/km resolved from history.
  fn materialize_vehicle(
    &self,
    vehicle_id: Uuid,
  ) -> impl Future<Output = Result<Option<VehicleProfile>, Self::Error>>
  + Send
  + '_;

  // ── Link lifecycle ────────────────────────────────────────────────────

  /// Direct grant: the link starts `Active`. The granter must hold
  /// `vehicle.grant_access` on the vehicle, except for the first owner
  /// grant on a vehicle with no links yet (bootstrap).
  fn grant_link(
    &self,
    input: GrantLink,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// Request path: the link starts `PendingRequest`.
  fn request_link(
    &self,
    input: RequestLink,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// Claim path: the link starts `PendingValidation` and carries the
  /// submitted documentary proof.
  fn claim_link(
    &self,
    input: ClaimLink,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// `PendingRequest` → `Active`.
  fn approve_link(
    &self,
    link_id: Uuid,
    approved_by: Uuid,
    note: Option<String>,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// `PendingRequest` → `Rejected`.
  fn reject_link(
    &self,
    link_id: Uuid,
    rejected_by: Uuid,
    note: Option<String>,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// `PendingValidation` → `Active` (approved) or `Rejected`, recording
  /// the validator and `validated_at`.
  fn validate_link(
    &self,
    link_id: Uuid,
    approved: bool,
    validated_by: Uuid,
    note: Option<String>,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// Self-initiated removal: `Active` → `Terminated`, `end_date = today`.
  fn terminate_link(
    &self,
    link_id: Uuid,
    actor: Uuid,
    reason: Option<String>,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// Third-party removal: `Active` → `Revoked`, recording who revoked and
  /// why. The revoker must differ from the link's entity.
  fn revoke_link(
    &self,
    link_id: Uuid,
    revoked_by: Uuid,
    reason: Option<String>,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  fn get_link(
    &self,
    link_id: Uuid,
  ) -> impl Future<Output = Result<Option<Link>, Self::Error>> + Send + '_;

  fn get_vehicle_links(
    &self,
    vehicle_id: Uuid,
    filter: LinkFilter,
  ) -> impl Future<Output = Result<Vec<Link>, Self::Error>> + Send + '_;

  fn get_entity_links(
    &self,
    entity_id: Uuid,
    filter: LinkFilter,
  ) -> impl Future<Output = Result<Vec<Link>, Self::Error>> + Send + '_;

  fn count_active_links(
    &self,
    vehicle_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Currently-valid owner and co-owner links for the vehicle.
  fn get_owners(
    &self,
    vehicle_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Link>, Self::Error>> + Send + '_;

  /// The append-only status history for a link, oldest first.
  fn get_link_history(
    &self,
    link_id: Uuid,
  ) -> impl Future<Output = Result<Vec<LinkStatusChange>, Self::Error>>
  + Send
  + '_;

  fn get_link_role<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<LinkRole>, Self::Error>> + Send + 'a;

  // ── Permissions ───────────────────────────────────────────────────────

  /// The permission predicate: true iff a currently-valid `Active` link
  /// exists whose role maps, through an active catalog row, to an active
  /// permission with `code`. Pure read; re-queries on every call.
  fn has_permission<'a>(
    &'a self,
    entity_id: Uuid,
    vehicle_id: Uuid,
    code: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Distinct active permission codes the entity holds on the vehicle
  /// across all qualifying links.
  fn permissions_for(
    &self,
    entity_id: Uuid,
    vehicle_id: Uuid,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;

  fn list_permissions(
    &self,
  ) -> impl Future<Output = Result<Vec<Permission>, Self::Error>> + Send + '_;

  // ── Event log ─────────────────────────────────────────────────────────

  /// Idempotent ingestion: when an event already exists for the input's
  /// `(source_table, source_record_id)`, its id is returned and no row is
  /// written. Fails when no partition covers the event timestamp.
  fn record_event(
    &self,
    input: NewVehicleEvent,
  ) -> impl Future<Output = Result<Uuid, Self::Error>> + Send + '_;

  /// The vehicle timeline, newest first, visibility-filtered for `caller`
  /// (`None` = anonymous, public events only). Keyset-paginated via
  /// [`TimelineQuery::before`].
  fn timeline(
    &self,
    vehicle_id: Uuid,
    query: TimelineQuery,
    caller: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<VehicleEvent>, Self::Error>> + Send + '_;

  /// Register the quarterly partition. Administrative; idempotent.
  fn create_partition(
    &self,
    year: i32,
    quarter: u8,
  ) -> impl Future<Output = Result<Partition, Self::Error>> + Send + '_;

  /// Unregister a partition and prune its events. Returns the number of
  /// events removed.
  fn drop_partition(
    &self,
    year: i32,
    quarter: u8,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn list_partitions(
    &self,
  ) -> impl Future<Output = Result<Vec<Partition>, Self::Error>> + Send + '_;

  // ── Source records ────────────────────────────────────────────────────
  //
  // Each write commits the source row and its projected event in one
  // transaction.

  fn record_refuel(
    &self,
    input: NewRefuel,
  ) -> impl Future<Output = Result<Refuel, Self::Error>> + Send + '_;

  fn record_mileage(
    &self,
    input: NewMileageRecord,
  ) -> impl Future<Output = Result<MileageRecord, Self::Error>> + Send + '_;

  fn report_claim(
    &self,
    input: NewClaim,
  ) -> impl Future<Output = Result<Claim, Self::Error>> + Send + '_;

  fn add_plate(
    &self,
    input: NewPlate,
  ) -> impl Future<Output = Result<Plate, Self::Error>> + Send + '_;

  fn change_plate_status(
    &self,
    plate_id: Uuid,
    status: PlateStatus,
  ) -> impl Future<Output = Result<Plate, Self::Error>> + Send + '_;

  fn install_odometer(
    &self,
    input: NewOdometer,
  ) -> impl Future<Output = Result<Odometer, Self::Error>> + Send + '_;

  fn remove_odometer(
    &self,
    odometer_id: Uuid,
    removal_date: chrono::NaiveDate,
  ) -> impl Future<Output = Result<Odometer, Self::Error>> + Send + '_;

  fn set_color(
    &self,
    input: NewVehicleColor,
  ) -> impl Future<Output = Result<VehicleColor, Self::Error>> + Send + '_;

  fn set_cover(
    &self,
    input: NewVehicleCover,
  ) -> impl Future<Output = Result<VehicleCover, Self::Error>> + Send + '_;

  fn create_action(
    &self,
    input: NewAction,
  ) -> impl Future<Output = Result<Action, Self::Error>> + Send + '_;

  /// Move an action into `Completed`, projecting its documentation event.
  fn complete_action(
    &self,
    action_id: Uuid,
    executed_by: Option<Uuid>,
  ) -> impl Future<Output = Result<Action, Self::Error>> + Send + '_;
}
