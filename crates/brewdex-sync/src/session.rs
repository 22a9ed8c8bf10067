//! Shared session state: the notification bus and the mediator.
//!
//! A [`Session`] is cloned into every component that needs to coordinate.
//! It carries two broadcast topics (store events from the writer to live
//! queries, notifications from queries and the writer to UI consumers), the
//! user's selection context, the commit sequence number, and a busy counter.
//! The selection and busy state use `watch` channels: one writer, any number
//! of readers, last write wins.

use std::sync::Arc;

use brewdex_core::record::{Brewery, RecordKind, Style};
use tokio::sync::{
  broadcast::{self, error::RecvError},
  watch,
};
use uuid::Uuid;

// ─── Identity ────────────────────────────────────────────────────────────────

/// Sender token identifying one live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(Uuid);

impl QueryId {
  pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for QueryId {
  fn default() -> Self { Self::new() }
}

impl std::fmt::Display for QueryId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

/// Who sent a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
  Query(QueryId),
  /// The creation queue. Writer failures concern every consumer.
  Writer,
  /// The ingest pipeline, reporting on a whole response.
  Ingest,
}

// ─── Messages ────────────────────────────────────────────────────────────────

/// The closed set of messages UI consumers react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
  /// Results changed; redraw.
  Reload,
  /// A response could not be read; offer to fetch again.
  Retry,
  /// Something failed; show the detail.
  Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub from:    Source,
  pub message: Message,
}

/// Published by the creation queue after every successful store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
  /// A batch committed, touching `kinds`.
  Committed { seq: u64, kinds: Vec<RecordKind> },
  /// Every table was emptied.
  Cleared { seq: u64 },
}

impl StoreEvent {
  pub fn seq(&self) -> u64 {
    match self {
      Self::Committed { seq, .. } | Self::Cleared { seq } => *seq,
    }
  }

  pub fn touches(&self, kind: RecordKind) -> bool {
    match self {
      Self::Committed { kinds, .. } => kinds.contains(&kind),
      Self::Cleared { .. } => true,
    }
  }
}

// ─── Selection ───────────────────────────────────────────────────────────────

/// The record the user chose last.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Selection {
  #[default]
  None,
  Brewery(Brewery),
  Style(Style),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionContext {
  pub selection:    Selection,
  /// Global filter applied by every live query over beers and breweries.
  pub organic_only: bool,
}

// ─── Session ─────────────────────────────────────────────────────────────────

struct Inner {
  store_events:  broadcast::Sender<StoreEvent>,
  notifications: broadcast::Sender<Notification>,
  selection:     watch::Sender<SelectionContext>,
  busy:          watch::Sender<usize>,
  commit_seq:    watch::Sender<u64>,
}

/// Process-wide coordination point. Cloning is cheap.
#[derive(Clone)]
pub struct Session {
  inner: Arc<Inner>,
}

impl Default for Session {
  fn default() -> Self { Self::new(1024) }
}

impl Session {
  /// `capacity` bounds how far a slow subscriber may fall behind on either
  /// broadcast topic before it observes a lag.
  pub fn new(capacity: usize) -> Self {
    let (store_events, _) = broadcast::channel(capacity);
    let (notifications, _) = broadcast::channel(capacity);
    Self {
      inner: Arc::new(Inner {
        store_events,
        notifications,
        selection: watch::Sender::new(SelectionContext::default()),
        busy: watch::Sender::new(0),
        commit_seq: watch::Sender::new(0),
      }),
    }
  }

  // ── Store events (writer → live queries) ──────────────────────────────

  pub fn subscribe_store(&self) -> broadcast::Receiver<StoreEvent> {
    self.inner.store_events.subscribe()
  }

  /// Sequence number of the last successful store mutation.
  pub fn commit_seq(&self) -> u64 { *self.inner.commit_seq.borrow() }

  /// Advance the sequence and broadcast a commit touching `kinds`.
  pub(crate) fn publish_commit(&self, kinds: Vec<RecordKind>) -> u64 {
    let seq = self.advance_seq();
    let _ = self.inner.store_events.send(StoreEvent::Committed { seq, kinds });
    seq
  }

  /// Advance the sequence and broadcast that every table was cleared.
  pub(crate) fn publish_clear(&self) -> u64 {
    let seq = self.advance_seq();
    let _ = self.inner.store_events.send(StoreEvent::Cleared { seq });
    seq
  }

  fn advance_seq(&self) -> u64 {
    let mut seq = 0;
    self.inner.commit_seq.send_modify(|s| {
      *s += 1;
      seq = *s;
    });
    seq
  }

  // ── Notifications (queries/writer → UI consumers) ─────────────────────

  /// Broadcast `message` on behalf of `from`. Nobody listening is fine.
  pub fn notify(&self, from: Source, message: Message) {
    let _ = self.inner.notifications.send(Notification { from, message });
  }

  /// Register a new consumer. It starts unbound: it hears writer and ingest
  /// notifications but no query's until [`Observer::bind`] is called.
  pub fn register(&self) -> Observer {
    Observer {
      rx:    self.inner.notifications.subscribe(),
      bound: None,
    }
  }

  // ── Selection ─────────────────────────────────────────────────────────

  /// Record the user's choice, replacing the previous one.
  pub fn select(&self, selection: Selection) {
    tracing::debug!(?selection, "selection changed");
    self.inner.selection.send_modify(|ctx| ctx.selection = selection);
  }

  pub fn set_organic_only(&self, organic_only: bool) {
    self.inner.selection.send_if_modified(|ctx| {
      let changed = ctx.organic_only != organic_only;
      ctx.organic_only = organic_only;
      changed
    });
  }

  pub fn selection(&self) -> SelectionContext { self.inner.selection.borrow().clone() }

  pub fn organic_only(&self) -> bool { self.inner.selection.borrow().organic_only }

  /// A receiver that wakes whenever the selection context changes; fetchers
  /// use this to start loading records related to the new selection.
  pub fn watch_selection(&self) -> watch::Receiver<SelectionContext> {
    self.inner.selection.subscribe()
  }

  // ── Busy state ────────────────────────────────────────────────────────

  /// Mark the session busy until the returned guard is dropped. Guards
  /// nest; the session is idle once all of them are gone.
  pub fn busy(&self) -> BusyGuard {
    self.inner.busy.send_modify(|n| *n += 1);
    BusyGuard { session: self.clone() }
  }

  pub fn is_busy(&self) -> bool { *self.inner.busy.borrow() > 0 }

  pub fn busy_observer(&self) -> BusyObserver {
    let rx = self.inner.busy.subscribe();
    let busy = *rx.borrow() > 0;
    BusyObserver { rx, busy }
  }
}

// ─── Busy state ──────────────────────────────────────────────────────────────

pub struct BusyGuard {
  session: Session,
}

impl Drop for BusyGuard {
  fn drop(&mut self) {
    self.session.inner.busy.send_modify(|n| *n = n.saturating_sub(1));
  }
}

/// Start/stop indicator feed.
pub struct BusyObserver {
  rx:   watch::Receiver<usize>,
  busy: bool,
}

impl BusyObserver {
  pub fn is_busy(&self) -> bool { *self.rx.borrow() > 0 }

  /// Wait until the session flips between busy and idle, returning the new
  /// state. Returns `None` once the session is gone.
  pub async fn changed(&mut self) -> Option<bool> {
    loop {
      self.rx.changed().await.ok()?;
      let busy = *self.rx.borrow_and_update() > 0;
      if busy != self.busy {
        self.busy = busy;
        return Some(busy);
      }
    }
  }
}

// ─── Observer ────────────────────────────────────────────────────────────────

/// A UI-side consumer of notifications.
///
/// Many live queries share a session but only one is on screen at a time, so
/// an observer drops notifications from any query other than the one it is
/// bound to.
pub struct Observer {
  rx:    broadcast::Receiver<Notification>,
  bound: Option<QueryId>,
}

impl Observer {
  /// Follow `id` from now on, ignoring every other query.
  pub fn bind(&mut self, id: QueryId) { self.bound = Some(id); }

  pub fn unbind(&mut self) { self.bound = None; }

  pub fn bound(&self) -> Option<QueryId> { self.bound }

  pub fn accepts(&self, notification: &Notification) -> bool {
    match notification.from {
      Source::Query(id) => self.bound == Some(id),
      Source::Writer | Source::Ingest => true,
    }
  }

  /// Wait for the next notification this observer accepts. Returns `None`
  /// once the session is gone.
  pub async fn recv(&mut self) -> Option<Notification> {
    loop {
      match self.rx.recv().await {
        Ok(n) if self.accepts(&n) => return Some(n),
        Ok(_) => continue,
        Err(RecvError::Lagged(skipped)) => {
          tracing::warn!(skipped, "observer lagged behind the notification bus");
          if let Some(id) = self.bound {
            return Some(Notification {
              from:    Source::Query(id),
              message: Message::Reload,
            });
          }
        }
        Err(RecvError::Closed) => return None,
      }
    }
  }

  /// Non-blocking variant of [`Observer::recv`].
  pub fn try_recv(&mut self) -> Option<Notification> {
    while let Ok(n) = self.rx.try_recv() {
      if self.accepts(&n) {
        return Some(n);
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn observer_ignores_other_queries() {
    let session = Session::default();
    let mut observer = session.register();
    let active = QueryId::new();
    let other = QueryId::new();
    observer.bind(active);

    session.notify(Source::Query(other), Message::Reload);
    session.notify(Source::Query(active), Message::Reload);
    session.notify(Source::Writer, Message::Error("disk full".into()));

    assert_eq!(
      observer.try_recv(),
      Some(Notification { from: Source::Query(active), message: Message::Reload })
    );
    assert_eq!(
      observer.try_recv().map(|n| n.message),
      Some(Message::Error("disk full".into()))
    );
    assert_eq!(observer.try_recv(), None);
  }

  #[test]
  fn unbound_observer_hears_only_writer_and_ingest() {
    let session = Session::default();
    let mut observer = session.register();

    session.notify(Source::Query(QueryId::new()), Message::Reload);
    session.notify(Source::Ingest, Message::Retry);

    assert_eq!(observer.try_recv().map(|n| n.from), Some(Source::Ingest));
    assert_eq!(observer.try_recv(), None);
  }

  #[test]
  fn selection_is_last_write_wins() {
    let session = Session::default();
    let rx = session.watch_selection();
    session.set_organic_only(true);
    session.select(Selection::None);

    assert!(rx.has_changed().unwrap());
    let ctx = session.selection();
    assert_eq!(ctx.selection, Selection::None);
    assert!(ctx.organic_only);
  }

  #[test]
  fn commit_sequence_advances() {
    let session = Session::default();
    let mut rx = session.subscribe_store();
    assert_eq!(session.publish_commit(vec![RecordKind::Beer]), 1);
    assert_eq!(session.publish_clear(), 2);
    assert_eq!(session.commit_seq(), 2);

    let first = rx.try_recv().unwrap();
    assert!(first.touches(RecordKind::Beer));
    assert!(!first.touches(RecordKind::Style));
    assert!(rx.try_recv().unwrap().touches(RecordKind::Style));
  }

  #[tokio::test]
  async fn busy_guards_nest() {
    let session = Session::default();
    let mut observer = session.busy_observer();
    assert!(!observer.is_busy());

    let outer = session.busy();
    assert_eq!(observer.changed().await, Some(true));
    let inner = session.busy();
    drop(outer);
    assert!(session.is_busy());
    drop(inner);
    assert_eq!(observer.changed().await, Some(false));
    assert!(!session.is_busy());
  }
}
