//! Error types for `brewdex-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("record kind mismatch: expected {expected}, got {actual}")]
  KindMismatch {
    expected: crate::record::RecordKind,
    actual:   crate::record::RecordKind,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
