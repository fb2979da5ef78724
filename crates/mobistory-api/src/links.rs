//! Handlers for the link lifecycle.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/links/grant` | Direct grant; link starts active |
//! | `POST` | `/links/request` | Starts `pending_request` |
//! | `POST` | `/links/claim` | Starts `pending_validation`, needs proof |
//! | `GET`  | `/links/:id` | 404 if not found |
//! | `GET`  | `/links/:id/history` | Append-only status trail |
//! | `POST` | `/links/:id/approve` / `reject` / `validate` | Pending resolution |
//! | `POST` | `/links/:id/terminate` / `revoke` | Terminal transitions |
//! | `GET`  | `/vehicles/:id/links`, `/entities/:id/links`, `/vehicles/:id/owners` | Queries |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::NaiveDate;
use mobistory_core::{
  link::{
    ClaimLink, GrantLink, Link, LinkFilter, LinkStatus, LinkStatusChange,
    RequestLink,
  },
  store::LedgerStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

// ─── Creation paths ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct GrantBody {
  pub vehicle_id:   Uuid,
  pub entity_id:    Uuid,
  pub role_code:    String,
  pub granted_by:   Uuid,
  pub start_date:   Option<NaiveDate>,
  pub end_date:     Option<NaiveDate>,
  pub observations: Option<String>,
}

/// `POST /links/grant`
pub async fn grant<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<GrantBody>,
) -> Result<impl IntoResponse, ApiError> {
  let link = store
    .grant_link(GrantLink {
      vehicle_id:   body.vehicle_id,
      entity_id:    body.entity_id,
      role_code:    body.role_code,
      granted_by:   body.granted_by,
      start_date:   body.start_date,
      end_date:     body.end_date,
      observations: body.observations,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(link)))
}

#[derive(Debug, Deserialize)]
pub struct RequestBody {
  pub vehicle_id:   Uuid,
  pub entity_id:    Uuid,
  pub role_code:    String,
  pub requested_by: Uuid,
}

/// `POST /links/request`
pub async fn request<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<RequestBody>,
) -> Result<impl IntoResponse, ApiError> {
  let link = store
    .request_link(RequestLink {
      vehicle_id:   body.vehicle_id,
      entity_id:    body.entity_id,
      role_code:    body.role_code,
      requested_by: body.requested_by,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(link)))
}

#[derive(Debug, Deserialize)]
pub struct ClaimBody {
  pub vehicle_id:     Uuid,
  pub entity_id:      Uuid,
  pub role_code:      String,
  pub document_proof: String,
}

/// `POST /links/claim`
pub async fn claim<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Json(body): Json<ClaimBody>,
) -> Result<impl IntoResponse, ApiError> {
  let link = store
    .claim_link(ClaimLink {
      vehicle_id:     body.vehicle_id,
      entity_id:      body.entity_id,
      role_code:      body.role_code,
      document_proof: body.document_proof,
    })
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(link)))
}

// ─── Transitions ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResolutionBody {
  /// The entity acting on the pending link.
  pub actor: Uuid,
  pub note:  Option<String>,
}

/// `POST /links/:id/approve`
pub async fn approve<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ResolutionBody>,
) -> Result<Json<Link>, ApiError> {
  let link = store
    .approve_link(id, body.actor, body.note)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(link))
}

/// `POST /links/:id/reject`
pub async fn reject<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ResolutionBody>,
) -> Result<Json<Link>, ApiError> {
  let link = store
    .reject_link(id, body.actor, body.note)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(link))
}

#[derive(Debug, Deserialize)]
pub struct ValidateBody {
  pub approved:     bool,
  pub validated_by: Uuid,
  pub note:         Option<String>,
}

/// `POST /links/:id/validate` — resolves a claim.
pub async fn validate<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ValidateBody>,
) -> Result<Json<Link>, ApiError> {
  let link = store
    .validate_link(id, body.approved, body.validated_by, body.note)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(link))
}

#[derive(Debug, Deserialize)]
pub struct TerminateBody {
  pub actor:  Uuid,
  pub reason: Option<String>,
}

/// `POST /links/:id/terminate` — self-initiated removal.
pub async fn terminate<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<TerminateBody>,
) -> Result<Json<Link>, ApiError> {
  let link = store
    .terminate_link(id, body.actor, body.reason)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(link))
}

#[derive(Debug, Deserialize)]
pub struct RevokeBody {
  pub revoked_by: Uuid,
  pub reason:     Option<String>,
}

/// `POST /links/:id/revoke` — third-party removal; records who and why.
pub async fn revoke<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<RevokeBody>,
) -> Result<Json<Link>, ApiError> {
  let link = store
    .revoke_link(id, body.revoked_by, body.reason)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(link))
}

// ─── Queries ──────────────────────────────────────────────────────────────────

/// `GET /links/:id`
pub async fn get_one<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Link>, ApiError> {
  let link = store
    .get_link(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("link {id} not found")))?;
  Ok(Json(link))
}

/// `GET /links/:id/history`
pub async fn history<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<LinkStatusChange>>, ApiError> {
  let changes = store
    .get_link_history(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(changes))
}

#[derive(Debug, Deserialize)]
pub struct FilterParams {
  pub status:    Option<LinkStatus>,
  pub role_code: Option<String>,
  #[serde(default)]
  pub include_closed: bool,
}

impl From<FilterParams> for LinkFilter {
  fn from(p: FilterParams) -> Self {
    LinkFilter {
      status:         p.status,
      role_code:      p.role_code,
      include_closed: p.include_closed,
    }
  }
}

/// `GET /vehicles/:id/links[?status=&role_code=&include_closed=true]`
pub async fn for_vehicle<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<FilterParams>,
) -> Result<Json<Vec<Link>>, ApiError> {
  let links = store
    .get_vehicle_links(id, params.into())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(links))
}

/// `GET /entities/:id/links[?status=&role_code=&include_closed=true]`
pub async fn for_entity<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<FilterParams>,
) -> Result<Json<Vec<Link>>, ApiError> {
  let links = store
    .get_entity_links(id, params.into())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(links))
}

/// `GET /vehicles/:id/owners` — currently-valid owner/co-owner links.
pub async fn owners<S: LedgerStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<Link>>, ApiError> {
  let links = store.get_owners(id).await.map_err(ApiError::from_store)?;
  Ok(Json(links))
}
