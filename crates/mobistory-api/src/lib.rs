//! JSON REST API for the Mobistory ledger.
//!
//! Exposes an axum [`Router`] backed by any
//! [`mobistory_core::store::LedgerStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility: handlers receive an already-verified
//! caller identity where one is needed.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", mobistory_api::api_router(store.clone()))
//! ```

pub mod admin;
pub mod entities;
pub mod error;
pub mod links;
pub mod permissions;
pub mod records;
pub mod timeline;
pub mod vehicles;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use mobistory_core::store::LedgerStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: LedgerStore + 'static,
{
  Router::new()
    // Entities
    .route(
      "/entities",
      get(entities::list::<S>).post(entities::create::<S>),
    )
    .route("/entities/anonymous", post(entities::create_anonymous::<S>))
    .route(
      "/entities/{id}",
      get(entities::get_one::<S>).delete(entities::deactivate::<S>),
    )
    .route("/entities/{id}/verify", post(entities::verify::<S>))
    .route("/entities/{id}/name", post(entities::update_name::<S>))
    .route("/entities/{id}/contact", post(entities::update_contact::<S>))
    .route("/entities/{id}/links", get(links::for_entity::<S>))
    // Vehicles
    .route("/vehicles", post(vehicles::create::<S>))
    .route("/vehicles/{id}", get(vehicles::get_one::<S>))
    .route("/vehicles/{id}/links", get(links::for_vehicle::<S>))
    .route("/vehicles/{id}/owners", get(links::owners::<S>))
    .route("/vehicles/{id}/timeline", get(timeline::handler::<S>))
    // Link lifecycle
    .route("/links/grant", post(links::grant::<S>))
    .route("/links/request", post(links::request::<S>))
    .route("/links/claim", post(links::claim::<S>))
    .route("/links/{id}", get(links::get_one::<S>))
    .route("/links/{id}/history", get(links::history::<S>))
    .route("/links/{id}/approve", post(links::approve::<S>))
    .route("/links/{id}/reject", post(links::reject::<S>))
    .route("/links/{id}/validate", post(links::validate::<S>))
    .route("/links/{id}/terminate", post(links::terminate::<S>))
    .route("/links/{id}/revoke", post(links::revoke::<S>))
    // Permissions
    .route("/permissions", get(permissions::catalog::<S>))
    .route("/permissions/check", get(permissions::check::<S>))
    .route("/permissions/effective", get(permissions::effective::<S>))
    // Source records
    .route("/vehicles/{id}/refuels", post(records::refuel::<S>))
    .route("/vehicles/{id}/mileage", post(records::mileage::<S>))
    .route("/vehicles/{id}/claims", post(records::claim::<S>))
    .route("/vehicles/{id}/plates", post(records::plate::<S>))
    .route("/vehicles/{id}/odometers", post(records::odometer::<S>))
    .route("/vehicles/{id}/colors", post(records::color::<S>))
    .route("/vehicles/{id}/covers", post(records::cover::<S>))
    .route("/vehicles/{id}/actions", post(records::action::<S>))
    .route("/plates/{id}/status", post(records::plate_status::<S>))
    .route("/odometers/{id}/remove", post(records::odometer_remove::<S>))
    .route("/actions/{id}/complete", post(records::action_complete::<S>))
    // Partition administration
    .route(
      "/admin/partitions",
      get(admin::list::<S>).post(admin::create::<S>),
    )
    .route(
      "/admin/partitions/{year}/{quarter}",
      delete(admin::drop::<S>),
    )
    .with_state(store)
}
