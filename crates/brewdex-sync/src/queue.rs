//! The creation queue: the single writer in front of the catalog store.
//!
//! Every mutation travels through one bounded channel to one worker task, so
//! at most one store write is in flight at a time. The worker folds incoming
//! records into a pending batch keyed by identity, merging with whatever is
//! already stored, and commits the batch when the channel runs dry or the
//! batch is full.

use std::{
  collections::{BTreeMap, btree_map::Entry},
  future::Future,
  sync::Arc,
  time::Duration,
};

use brewdex_core::{
  merge::merge,
  record::{Record, RecordKey, RecordKind},
  store::{Batch, CatalogStore, DeletedCounts},
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tokio::{
  sync::{mpsc, oneshot},
  task::JoinHandle,
};

use crate::{
  CommitError, Error, Result,
  session::{Message, Session, Source},
};

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// Commands the admission channel holds before submitters wait.
  pub capacity:            usize,
  /// Pending records that force a commit without waiting for the channel to
  /// drain.
  pub batch_size:          usize,
  /// Attempts per store write, including the first.
  pub max_commit_attempts: u32,
  pub retry_backoff_ms:    u64,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      capacity:            256,
      batch_size:          64,
      max_commit_attempts: 3,
      retry_backoff_ms:    50,
    }
  }
}

impl QueueConfig {
  pub fn retry_backoff(&self) -> Duration { Duration::from_millis(self.retry_backoff_ms) }
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// Per-kind outcome of [`CreationQueue::delete_all`]. The deletion is one
/// transaction, so either every kind succeeded or every kind carries the same
/// failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteAllReport {
  pub outcomes: BTreeMap<RecordKind, Result<usize, String>>,
}

impl DeleteAllReport {
  fn succeeded(counts: &DeletedCounts) -> Self {
    let outcomes = RecordKind::iter()
      .map(|kind| (kind, Ok(counts.get(&kind).copied().unwrap_or(0))))
      .collect();
    Self { outcomes }
  }

  fn failed(err: &CommitError) -> Self {
    let outcomes = RecordKind::iter()
      .map(|kind| (kind, Err(err.to_string())))
      .collect();
    Self { outcomes }
  }

  pub fn is_success(&self) -> bool { self.outcomes.values().all(Result::is_ok) }

  /// Total rows removed; zero on failure.
  pub fn removed(&self) -> usize { self.outcomes.values().filter_map(|r| r.as_ref().ok()).sum() }
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// Resolved with the commit sequence number that made a change visible.
type Done = oneshot::Sender<Result<u64>>;

#[derive(Debug)]
enum Edit {
  Favorite(bool),
  TastingNotes(String),
  AssociateStyle(String),
}

enum Command {
  Submit { record: Record, done: Option<Done> },
  Edit { key: RecordKey, edit: Edit, done: Done },
  Flush { done: Done },
  DeleteAll { done: oneshot::Sender<DeleteAllReport> },
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Submission handle. Clone freely; the worker stops once every handle is
/// dropped and the channel is drained.
#[derive(Clone)]
pub struct CreationQueue {
  tx: mpsc::Sender<Command>,
}

impl CreationQueue {
  /// Start the worker on the current runtime.
  pub fn spawn<S>(store: Arc<S>, session: Session, config: QueueConfig) -> (Self, JoinHandle<()>)
  where
    S: CatalogStore + 'static,
  {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let worker = Worker {
      store,
      session,
      config,
      rx,
      pending: BTreeMap::new(),
      waiters: Vec::new(),
    };
    (Self { tx }, tokio::spawn(worker.run()))
  }

  async fn send(&self, command: Command) -> Result<()> {
    self.tx.send(command).await.map_err(|_| Error::QueueClosed)
  }

  async fn request(&self, command: impl FnOnce(Done) -> Command) -> Result<u64> {
    let (done, rx) = oneshot::channel();
    self.send(command(done)).await?;
    rx.await.map_err(|_| Error::QueueClosed)?
  }

  /// Admit `record` without waiting for it to commit. Only fails if the
  /// worker is gone; a record the worker cannot admit is reported to session
  /// observers as a writer error.
  pub async fn submit(&self, record: Record) -> Result<()> {
    self.send(Command::Submit { record, done: None }).await
  }

  /// Admit `record` and wait for the batch holding it to commit.
  pub async fn submit_and_wait(&self, record: Record) -> Result<u64> {
    self.request(|done| Command::Submit { record, done: Some(done) }).await
  }

  /// Turn the favorite flag on or off. Styles have no favorite flag.
  pub async fn set_favorite(&self, kind: RecordKind, id: &str, favorite: bool) -> Result<u64> {
    if kind == RecordKind::Style {
      return Err(Error::Unsupported("styles cannot be marked favorite".into()));
    }
    let key = RecordKey::new(kind, id);
    self.request(|done| Command::Edit { key, edit: Edit::Favorite(favorite), done }).await
  }

  /// Replace a beer's tasting notes. An empty string clears them.
  pub async fn set_tasting_notes(&self, beer_id: &str, notes: impl Into<String>) -> Result<u64> {
    let key = RecordKey::new(RecordKind::Beer, beer_id);
    let edit = Edit::TastingNotes(notes.into());
    self.request(|done| Command::Edit { key, edit, done }).await
  }

  /// Record that a brewery exhibits a style.
  pub async fn associate_style(&self, brewery_id: &str, style_id: &str) -> Result<u64> {
    let key = RecordKey::new(RecordKind::Brewery, brewery_id);
    let edit = Edit::AssociateStyle(style_id.to_string());
    self.request(|done| Command::Edit { key, edit, done }).await
  }

  /// Commit whatever is pending and return the latest commit sequence.
  pub async fn flush(&self) -> Result<u64> { self.request(|done| Command::Flush { done }).await }

  /// Commit what is pending, then clear every beer, brewery, and style.
  pub async fn delete_all(&self) -> Result<DeleteAllReport> {
    let (done, rx) = oneshot::channel();
    self.send(Command::DeleteAll { done }).await?;
    rx.await.map_err(|_| Error::QueueClosed)
  }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

struct Worker<S> {
  store:   Arc<S>,
  session: Session,
  config:  QueueConfig,
  rx:      mpsc::Receiver<Command>,
  pending: BTreeMap<RecordKey, Record>,
  waiters: Vec<Done>,
}

impl<S: CatalogStore + 'static> Worker<S> {
  async fn run(mut self) {
    tracing::debug!("creation queue started");
    while let Some(command) = self.rx.recv().await {
      let _busy = self.session.busy();
      self.handle(command).await;
      while let Ok(command) = self.rx.try_recv() {
        self.handle(command).await;
      }
      self.commit().await;
    }
    tracing::debug!("creation queue stopped");
  }

  async fn handle(&mut self, command: Command) {
    match command {
      Command::Submit { record, done } => {
        let key = record.key();
        match (self.admit(record).await, done) {
          (Ok(()), done) => self.waiters.extend(done),
          (Err(err), Some(done)) => {
            let _ = done.send(Err(err));
          }
          // Nobody is waiting on a fire-and-forget submission, so observers
          // hear about it instead.
          (Err(err), None) => {
            tracing::error!(%key, error = %err, "submission dropped");
            self.session.notify(Source::Writer, Message::Error(err.to_string()));
          }
        }
      }
      Command::Edit { key, edit, done } => match self.apply(&key, edit).await {
        Ok(()) => self.waiters.push(done),
        Err(err) => {
          let _ = done.send(Err(err));
        }
      },
      Command::Flush { done } => {
        self.waiters.push(done);
        self.commit().await;
      }
      Command::DeleteAll { done } => {
        self.commit().await;
        let _ = done.send(self.delete_all().await);
      }
    }

    if self.pending.len() >= self.config.batch_size.max(1) {
      self.commit().await;
    }
  }

  /// Fold `record` into the pending batch, merging with the pending or stored
  /// record of the same identity.
  async fn admit(&mut self, record: Record) -> Result<()> {
    let key = record.key();
    match self.pending.entry(key) {
      Entry::Occupied(mut slot) => merge(slot.get_mut(), record)?,
      Entry::Vacant(slot) => {
        let stored = load(&*self.store, &self.config, slot.key()).await?;
        match stored {
          Some(mut stored) => {
            tracing::debug!(key = %slot.key(), "merging into stored record");
            merge(&mut stored, record)?;
            slot.insert(stored);
          }
          None => {
            slot.insert(record);
          }
        }
      }
    }
    Ok(())
  }

  async fn apply(&mut self, key: &RecordKey, edit: Edit) -> Result<()> {
    let record = match self.pending.entry(key.clone()) {
      Entry::Occupied(slot) => slot.into_mut(),
      Entry::Vacant(slot) => {
        let stored = load(&*self.store, &self.config, key)
          .await?
          .ok_or_else(|| Error::NotFound(key.clone()))?;
        slot.insert(stored)
      }
    };

    match (record, edit) {
      (Record::Beer(beer), Edit::Favorite(on)) => beer.favorite = on,
      (Record::Brewery(brewery), Edit::Favorite(on)) => brewery.favorite = on,
      (Record::Beer(beer), Edit::TastingNotes(notes)) => beer.tasting_notes = notes,
      (Record::Brewery(brewery), Edit::AssociateStyle(style_id)) => {
        brewery.style_ids.insert(style_id);
      }
      (record, edit) => {
        return Err(Error::Unsupported(format!("{edit:?} on {}", record.key())));
      }
    }
    Ok(())
  }

  /// Write the pending batch and resolve everyone waiting on it.
  async fn commit(&mut self) {
    let waiters = std::mem::take(&mut self.waiters);
    if self.pending.is_empty() {
      let seq = self.session.commit_seq();
      for done in waiters {
        let _ = done.send(Ok(seq));
      }
      return;
    }

    let batch = Batch {
      records: std::mem::take(&mut self.pending).into_values().collect(),
    };
    let store = &*self.store;
    let batch_ref = &batch;
    let outcome = retry(&self.config, "commit", move || store.commit(batch_ref)).await;

    match outcome {
      Ok(()) => {
        let kinds = batch.kinds();
        let seq = self.session.publish_commit(kinds.clone());
        tracing::info!(seq, records = batch.len(), ?kinds, "committed batch");
        for done in waiters {
          let _ = done.send(Ok(seq));
        }
      }
      Err(err) => {
        tracing::error!(records = batch.len(), attempts = err.attempts, error = %err.detail, "batch dropped");
        self.session.notify(Source::Writer, Message::Error(err.to_string()));
        for done in waiters {
          let _ = done.send(Err(Error::Commit(err.clone())));
        }
      }
    }
  }

  async fn delete_all(&mut self) -> DeleteAllReport {
    let store = &*self.store;
    match retry(&self.config, "delete-all", move || store.delete_all()).await {
      Ok(counts) => {
        let seq = self.session.publish_clear();
        tracing::info!(seq, ?counts, "cleared catalog");
        DeleteAllReport::succeeded(&counts)
      }
      Err(err) => {
        tracing::error!(attempts = err.attempts, error = %err.detail, "delete-all failed; catalog untouched");
        self.session.notify(Source::Writer, Message::Error(err.to_string()));
        DeleteAllReport::failed(&err)
      }
    }
  }
}

async fn load<S: CatalogStore>(
  store: &S,
  config: &QueueConfig,
  key: &RecordKey,
) -> Result<Option<Record>> {
  let (kind, id) = (key.kind, key.id.as_str());
  Ok(retry(config, "lookup", move || store.get(kind, id)).await?)
}

/// Run `op` up to `max_commit_attempts` times, sleeping between attempts.
async fn retry<T, E, F, Fut>(config: &QueueConfig, what: &str, mut op: F) -> Result<T, CommitError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, E>>,
  E: std::fmt::Display,
{
  let attempts = config.max_commit_attempts.max(1);
  let mut attempt = 1;
  loop {
    match op().await {
      Ok(value) => return Ok(value),
      Err(err) if attempt < attempts => {
        tracing::warn!(attempt, attempts, error = %err, "{what} failed; retrying");
        tokio::time::sleep(config.retry_backoff()).await;
        attempt += 1;
      }
      Err(err) => {
        return Err(CommitError { attempts: attempt, detail: err.to_string() });
      }
    }
  }
}
