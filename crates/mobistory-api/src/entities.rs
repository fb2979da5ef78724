//! Handlers for `/entities` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/entities` | Optional `?limit=&offset=` |
//! | `POST`   | `/entities` | Body: [`CreateBody`] |
//! | `POST`   | `/entities/anonymous` | Body: [`AnonymousBody`] |
//! | `GET`    | `/entities/:id` | Materialised profile; 404 if not found |
//! | `DELETE` | `/entities/:id` | Soft delete |
//! | `POST`   | `/entities/:id/verify` | Upgrade an anonymous entity |
//! | `POST`   | `/entities/:id/name` | Append a name-history row |
//! | `POST`   | `/entities/:id/contact` | Append a contact-history row |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use mobistory_core::{
  entity::{
    ContactType, Entity, EntityKind, EntityName, EntityProfile, NameType,
    NewEntity, VerifiedUpgrade,
  },
  store::LedgerStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// `GET /entities[?limit=&offset=]`
pub async fn list<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Entity>>, ApiError> {
  let entities = store
    .list_entities(params.limit.unwrap_or(100), params.offset.unwrap_or(0))
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(entities))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub kind:     EntityKind,
  pub name:     String,
  pub email:    Option<String>,
  pub phone:    Option<String>,
  pub legal_id: Option<String>,
}

/// `POST /entities` — returns 201 + the stored entity.
pub async fn create<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let entity = store
    .create_entity(NewEntity {
      kind:     body.kind,
      name:     body.name,
      email:    body.email,
      phone:    body.phone,
      legal_id: body.legal_id,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(entity)))
}

#[derive(Debug, Deserialize)]
pub struct AnonymousBody {
  pub device_fingerprint: String,
  pub name:               Option<String>,
}

/// `POST /entities/anonymous` — credential-less entity from a device
/// fingerprint.
pub async fn create_anonymous<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<AnonymousBody>,
) -> Result<impl IntoResponse, ApiError> {
  let entity = store
    .create_anonymous_entity(body.device_fingerprint, body.name)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(entity)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /entities/:id`
pub async fn get_one<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<EntityProfile>, ApiError> {
  let profile = store
    .materialize_entity(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} not found")))?;
  Ok(Json(profile))
}

// ─── Verify ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
  pub name:     Option<String>,
  pub email:    Option<String>,
  pub phone:    Option<String>,
  pub legal_id: Option<String>,
}

/// `POST /entities/:id/verify`
pub async fn verify<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<VerifyBody>,
) -> Result<Json<Entity>, ApiError> {
  let entity = store
    .convert_anonymous_to_verified(id, VerifiedUpgrade {
      name:     body.name,
      email:    body.email,
      phone:    body.phone,
      legal_id: body.legal_id,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(entity))
}

// ─── Identity history ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NameBody {
  pub name_type:  NameType,
  pub value:      String,
  pub reason:     Option<String>,
  pub changed_by: Option<Uuid>,
}

/// `POST /entities/:id/name`
pub async fn update_name<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NameBody>,
) -> Result<Json<EntityName>, ApiError> {
  let record = store
    .update_name(id, body.name_type, body.value, body.reason, body.changed_by)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(record))
}

#[derive(Debug, Deserialize)]
pub struct ContactBody {
  pub contact_type: ContactType,
  pub value:        String,
  pub label:        Option<String>,
}

/// `POST /entities/:id/contact`
pub async fn update_contact<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ContactBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = store
    .update_contact(id, body.contact_type, body.value, body.label)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(record))
}

// ─── Deactivate ───────────────────────────────────────────────────────────────

/// `DELETE /entities/:id` — soft delete; history stays.
pub async fn deactivate<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  store
    .deactivate_entity(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(StatusCode::NO_CONTENT)
}
