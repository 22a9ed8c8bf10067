//! Error type for `brewdex-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row could not be mapped back to a record.
  #[error("corrupt row in {table}: {detail}")]
  CorruptRow { table: &'static str, detail: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
