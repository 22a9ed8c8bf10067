//! Error types for `brewdex-sync`.

use brewdex_core::record::RecordKey;
use thiserror::Error;

use crate::session::QueryId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("creation queue is closed")]
  QueueClosed,

  #[error(transparent)]
  Commit(#[from] CommitError),

  #[error("live query {id} failed: {detail}")]
  Query { id: QueryId, detail: String },

  #[error("record not found: {0}")]
  NotFound(RecordKey),

  #[error("unsupported operation: {0}")]
  Unsupported(String),

  #[error("core error: {0}")]
  Core(#[from] brewdex_core::Error),
}

/// The store rejected a batch on every permitted attempt. Every submitter
/// waiting on that batch receives a copy.
#[derive(Debug, Clone, Error)]
#[error("commit failed after {attempts} attempt(s): {detail}")]
pub struct CommitError {
  pub attempts: u32,
  pub detail:   String,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
