//! The `CatalogStore` trait and its batch types.
//!
//! The trait is implemented by storage backends (e.g. `brewdex-store-sqlite`).
//! The sync engine depends on this abstraction, not on any concrete backend.
//! Only the creation queue calls the write methods.

use std::{collections::BTreeMap, future::Future};

use crate::{
  query::RecordQuery,
  record::{Record, RecordKind},
};

// ─── Batch ───────────────────────────────────────────────────────────────────

/// A set of fully merged records to write in one transaction. Every record
/// replaces the stored row with the same `(kind, id)`, or is inserted.
#[derive(Debug, Clone, Default)]
pub struct Batch {
  pub records: Vec<Record>,
}

impl Batch {
  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  pub fn len(&self) -> usize { self.records.len() }

  /// The distinct kinds touched by this batch.
  pub fn kinds(&self) -> Vec<RecordKind> {
    let mut kinds: Vec<_> = self.records.iter().map(Record::kind).collect();
    kinds.sort();
    kinds.dedup();
    kinds
  }
}

/// Rows removed per kind by [`CatalogStore::delete_all`].
pub type DeletedCounts = BTreeMap<RecordKind, usize>;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a catalog store backend.
///
/// `commit` and `delete_all` must be atomic: either every row changes or none
/// does, and concurrent readers observe only the state before or after.
///
/// All methods return `Send` futures so the trait can be used from spawned
/// tokio tasks.
pub trait CatalogStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Upsert every record of `batch` in a single transaction.
  fn commit<'a>(
    &'a self,
    batch: &'a Batch,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Remove every beer, brewery, and style in a single transaction.
  fn delete_all(
    &self,
  ) -> impl Future<Output = Result<DeletedCounts, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Fetch one record with its derived back-references filled in.
  fn get<'a>(
    &'a self,
    kind: RecordKind,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<Record>, Self::Error>> + Send + 'a;

  /// Evaluate a filtered, sorted query against the current snapshot.
  fn query<'a>(
    &'a self,
    query: &'a RecordQuery,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + 'a;

  /// Number of stored records of `kind`.
  fn count(
    &self,
    kind: RecordKind,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}
