//! A running catalog: store, session, and creation queue wired together.

use std::sync::Arc;

use brewdex_core::{query::Filter, record::RecordKind, store::CatalogStore};
use brewdex_parse::ResponseKind;
use tokio::task::JoinHandle;

use crate::{
  Result,
  ingest::{IngestReport, ingest},
  live::LiveQuery,
  map::{MapConfig, MapStrategy},
  queue::{CreationQueue, QueueConfig},
  session::Session,
};

pub struct Catalog<S> {
  store:   Arc<S>,
  session: Session,
  queue:   CreationQueue,
  worker:  JoinHandle<()>,
}

impl<S: CatalogStore + 'static> Catalog<S> {
  /// Start the creation queue over `store`.
  pub fn start(store: S, config: QueueConfig) -> Self {
    let store = Arc::new(store);
    let session = Session::default();
    let (queue, worker) = CreationQueue::spawn(store.clone(), session.clone(), config);
    Self { store, session, queue, worker }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn session(&self) -> &Session { &self.session }

  pub fn queue(&self) -> &CreationQueue { &self.queue }

  pub async fn live(&self, kind: RecordKind, filter: Filter) -> Result<LiveQuery<S>> {
    LiveQuery::open_with(self.store.clone(), self.session.clone(), kind, filter, Default::default())
      .await
  }

  pub async fn map(&self, config: &MapConfig) -> Result<MapStrategy<S>> {
    MapStrategy::for_selection(self.store.clone(), self.session.clone(), config).await
  }

  /// Parse a response and queue its records.
  pub async fn ingest(&self, input: &str, kind: &ResponseKind) -> Result<IngestReport> {
    ingest(&self.queue, &self.session, input, kind).await
  }

  /// Commit everything still pending and stop the worker.
  pub async fn shutdown(self) -> Result<()> {
    self.queue.flush().await?;
    drop(self.queue);
    if let Err(err) = self.worker.await {
      tracing::error!(error = %err, "creation queue worker did not stop cleanly");
    }
    Ok(())
  }
}
