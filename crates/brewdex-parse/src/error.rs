//! Error types for the brewdex response parsers.

use thiserror::Error;

/// A response that cannot be parsed at all. Individual malformed
/// sub-documents are never an `Error`; they become [`crate::Rejection`]s.
#[derive(Debug, Error)]
pub enum Error {
  #[error("response is not valid JSON: {0}")]
  Json(#[from] serde_json::Error),

  #[error("malformed response: {0}")]
  Malformed(String),

  #[error("remote reported failure: {0}")]
  RemoteFailure(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
