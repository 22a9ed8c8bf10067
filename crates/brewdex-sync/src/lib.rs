//! The brewdex sync engine.
//!
//! Turns remote responses into stored records and keeps views over those
//! records current:
//!
//! - [`ingest`] parses a response and hands designed records to the
//!   [`CreationQueue`], the single writer in front of the store.
//! - [`LiveQuery`] re-evaluates a filtered, sorted view after each commit.
//! - [`Session`] carries notifications, the user's selection, and the busy
//!   flag between them.
//! - [`MapStrategy`] derives map annotations from a live query.
//!
//! Storage is pluggable through [`brewdex_core::store::CatalogStore`].

pub mod catalog;
pub mod change;
pub mod designer;
pub mod error;
pub mod ingest;
pub mod live;
pub mod map;
pub mod queue;
pub mod session;

#[cfg(test)]
mod tests;

pub use catalog::Catalog;
pub use change::{ResultChange, RowEdit};
pub use error::{CommitError, Error, Result};
pub use ingest::{IngestReport, ingest};
pub use live::LiveQuery;
pub use map::{GeoAnnotation, MapConfig, MapStrategy, MapTarget, spawn_renderer};
pub use queue::{CreationQueue, DeleteAllReport, QueueConfig};
pub use session::{Message, Notification, Observer, QueryId, Selection, Session, Source};
