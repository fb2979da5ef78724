//! Error type for `mobistory-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A domain error surfaced by validation or lifecycle rules.
  #[error("core error: {0}")]
  Core(#[from] mobistory_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a token no enum variant matches (corrupt row or schema
  /// drift).
  #[error("unknown {what}: {value:?}")]
  UnknownToken { what: &'static str, value: String },
}

/// Collapse into the core taxonomy so the API layer can map every failure
/// to an outcome. Anything that is not already a domain error is a storage
/// fault.
impl From<Error> for mobistory_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(inner) => inner,
      other => mobistory_core::Error::Storage(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
