//! Live queries: continuously re-evaluated, filtered and sorted views.
//!
//! A [`LiveQuery`] owns a background listener that follows the session's
//! store events. Each relevant commit re-runs the query against the store and
//! hands the classified difference to callbacks, to [`LiveQuery::updates`]
//! subscribers, and to observers bound to the query as [`Message::Reload`].

use std::sync::{
  Arc, Mutex, PoisonError, RwLock,
  atomic::{AtomicBool, AtomicU64, Ordering},
};

use brewdex_core::{
  query::{Filter, RecordQuery, SortOrder},
  record::{Record, RecordKind},
  store::CatalogStore,
};
use tokio::{
  sync::{
    broadcast::{self, error::RecvError},
    watch,
  },
  task::JoinHandle,
};

use crate::{
  Error, Result,
  change::{ResultChange, classify},
  session::{Message, QueryId, SelectionContext, Session, Source, StoreEvent},
};

/// Record kinds whose commits can alter the results of a query over `kind`.
///
/// Breweries carry `beer_ids` and match style filters through their beers;
/// styles carry `brewery_ids` derived from both other tables.
pub fn depends_on(kind: RecordKind) -> &'static [RecordKind] {
  match kind {
    RecordKind::Beer => &[RecordKind::Beer],
    RecordKind::Brewery => &[RecordKind::Brewery, RecordKind::Beer],
    RecordKind::Style => &[RecordKind::Style, RecordKind::Beer, RecordKind::Brewery],
  }
}

pub type ChangeCallback = Arc<dyn Fn(&ResultChange) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
  /// First evaluation; nobody is listening yet.
  Initial,
  /// A commit or an explicit refresh; classify the difference.
  Commit,
  /// Store cleared or events were missed.
  Reset,
  /// Filter, sort or organic flag changed.
  Reconfigured,
}

// ─── State ───────────────────────────────────────────────────────────────────

struct Settings {
  filter: Filter,
  sort:   SortOrder,
}

#[derive(Default)]
struct Snapshot {
  results: Vec<Record>,
  search:  String,
  visible: Vec<Record>,
}

impl Snapshot {
  fn recompute_visible(&mut self) {
    let needle = self.search.trim().to_lowercase();
    self.visible = if needle.is_empty() {
      self.results.clone()
    } else {
      self
        .results
        .iter()
        .filter(|r| r.display_name().to_lowercase().contains(&needle))
        .cloned()
        .collect()
    };
  }
}

struct Inner<S> {
  id:            QueryId,
  kind:          RecordKind,
  store:         Arc<S>,
  session:       Session,
  settings:      Mutex<Settings>,
  snapshot:      RwLock<Snapshot>,
  callbacks:     Mutex<Vec<(CallbackId, ChangeCallback)>>,
  next_callback: AtomicU64,
  changes:       broadcast::Sender<ResultChange>,
  /// Serializes evaluations so results are replaced in commit order.
  evaluating:    tokio::sync::Mutex<()>,
  /// Highest commit sequence this query has processed.
  seen:          watch::Sender<u64>,
  /// Organic-only flag the current results were evaluated under.
  organic:       AtomicBool,
}

impl<S: CatalogStore + 'static> Inner<S> {
  fn query(&self, organic: bool) -> RecordQuery {
    let settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
    RecordQuery {
      kind:         self.kind,
      filter:       settings.filter.clone(),
      sort:         settings.sort,
      organic_only: self.kind != RecordKind::Style && organic,
      limit:        None,
    }
  }

  /// True when the session's organic-only flag differs from the one the
  /// current results were evaluated under.
  fn organic_stale(&self) -> bool {
    self.kind != RecordKind::Style
      && self.session.organic_only() != self.organic.load(Ordering::SeqCst)
  }

  async fn evaluate(&self, trigger: Trigger) -> Result<()> {
    let _turn = self.evaluating.lock().await;
    let organic = self.session.organic_only();
    let query = self.query(organic);

    let rows = match self.store.query(&query).await {
      Ok(rows) => rows,
      Err(err) => {
        let detail = err.to_string();
        tracing::warn!(query = %self.id, kind = %self.kind, error = %detail, "live query evaluation failed");
        self.session.notify(Source::Query(self.id), Message::Error(detail.clone()));
        return Err(Error::Query { id: self.id, detail });
      }
    };

    self.organic.store(organic, Ordering::SeqCst);
    let change = self.replace_results(rows, trigger);
    if let Some(change) = change {
      tracing::debug!(query = %self.id, ?trigger, "live query results changed");
      self.session.notify(Source::Query(self.id), Message::Reload);
      self.emit(change);
    }
    Ok(())
  }

  fn replace_results(&self, rows: Vec<Record>, trigger: Trigger) -> Option<ResultChange> {
    let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
    let change = match trigger {
      Trigger::Initial => None,
      Trigger::Commit => classify(&snapshot.results, &rows),
      Trigger::Reset | Trigger::Reconfigured => Some(ResultChange::Reload),
    };
    snapshot.results = rows;
    snapshot.recompute_visible();
    change
  }

  fn emit(&self, change: ResultChange) {
    let callbacks: Vec<ChangeCallback> = self
      .callbacks
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .map(|(_, cb)| cb.clone())
      .collect();
    for callback in callbacks {
      callback(&change);
    }
    let _ = self.changes.send(change);
  }

  fn mark_seen(&self, seq: u64) {
    self.seen.send_if_modified(|seen| {
      let advanced = seq > *seen;
      *seen = (*seen).max(seq);
      advanced
    });
  }
}

// ─── LiveQuery ───────────────────────────────────────────────────────────────

/// Aborts the listener once the last handle to a query is dropped.
struct Listener(JoinHandle<()>);

impl Drop for Listener {
  fn drop(&mut self) { self.0.abort(); }
}

/// A filtered, sorted view over one record kind that follows store commits.
///
/// Handles are cheap to clone and share one listener. Dropping the last
/// handle tears down the subscription without affecting other queries.
pub struct LiveQuery<S> {
  inner:     Arc<Inner<S>>,
  _listener: Arc<Listener>,
}

impl<S> Clone for LiveQuery<S> {
  fn clone(&self) -> Self {
    Self {
      inner:     self.inner.clone(),
      _listener: self._listener.clone(),
    }
  }
}

impl<S: CatalogStore + 'static> LiveQuery<S> {
  /// Everything of `kind`, sorted by name.
  pub async fn open(store: Arc<S>, session: Session, kind: RecordKind) -> Result<Self> {
    Self::open_with(store, session, kind, Filter::All, SortOrder::default()).await
  }

  pub async fn open_with(
    store: Arc<S>,
    session: Session,
    kind: RecordKind,
    filter: Filter,
    sort: SortOrder,
  ) -> Result<Self> {
    // Subscribe before the first read so no commit falls in between.
    let events = session.subscribe_store();
    let selection = session.watch_selection();
    let seq = session.commit_seq();

    let (changes, _) = broadcast::channel(64);
    let inner = Arc::new(Inner {
      id: QueryId::new(),
      kind,
      store,
      session,
      settings: Mutex::new(Settings { filter, sort }),
      snapshot: RwLock::new(Snapshot::default()),
      callbacks: Mutex::new(Vec::new()),
      next_callback: AtomicU64::new(0),
      changes,
      evaluating: tokio::sync::Mutex::new(()),
      seen: watch::Sender::new(seq),
      organic: AtomicBool::new(false),
    });

    inner.evaluate(Trigger::Initial).await?;
    tracing::debug!(query = %inner.id, %kind, "live query opened");

    let listener = tokio::spawn(listen(inner.clone(), events, selection));
    Ok(Self { inner, _listener: Arc::new(Listener(listener)) })
  }

  /// The sender token this query uses on the notification bus.
  pub fn id(&self) -> QueryId { self.inner.id }

  pub fn kind(&self) -> RecordKind { self.inner.kind }

  pub fn filter(&self) -> Filter {
    let settings = self.inner.settings.lock().unwrap_or_else(PoisonError::into_inner);
    settings.filter.clone()
  }

  /// Replace the filter and sort order and re-evaluate immediately.
  pub async fn configure(&self, filter: Filter, sort: SortOrder) -> Result<()> {
    {
      let mut settings = self.inner.settings.lock().unwrap_or_else(PoisonError::into_inner);
      settings.filter = filter;
      settings.sort = sort;
    }
    self.inner.evaluate(Trigger::Reconfigured).await
  }

  /// Re-run the query now, classifying any difference.
  pub async fn refresh(&self) -> Result<()> { self.inner.evaluate(Trigger::Commit).await }

  /// The last successfully evaluated result, in sort order.
  pub fn results(&self) -> Vec<Record> {
    let snapshot = self.inner.snapshot.read().unwrap_or_else(PoisonError::into_inner);
    snapshot.results.clone()
  }

  /// [`LiveQuery::results`] narrowed by the search text.
  pub fn visible(&self) -> Vec<Record> {
    let snapshot = self.inner.snapshot.read().unwrap_or_else(PoisonError::into_inner);
    snapshot.visible.clone()
  }

  /// Narrow [`LiveQuery::visible`] to records whose display name contains
  /// `text`, ignoring case. No store round-trip.
  pub fn set_search_text(&self, text: impl Into<String>) {
    let changed = {
      let mut snapshot = self.inner.snapshot.write().unwrap_or_else(PoisonError::into_inner);
      snapshot.search = text.into();
      let previous = std::mem::take(&mut snapshot.visible);
      snapshot.recompute_visible();
      previous != snapshot.visible
    };
    if changed {
      self.inner.emit(ResultChange::Reload);
    }
  }

  pub fn search_text(&self) -> String {
    let snapshot = self.inner.snapshot.read().unwrap_or_else(PoisonError::into_inner);
    snapshot.search.clone()
  }

  /// Call `callback` with every future change. Callbacks run on whichever
  /// task performed the evaluation and must not block.
  pub fn on_change(&self, callback: impl Fn(&ResultChange) + Send + Sync + 'static) -> CallbackId {
    let id = CallbackId(self.inner.next_callback.fetch_add(1, Ordering::Relaxed));
    self
      .inner
      .callbacks
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push((id, Arc::new(callback)));
    id
  }

  /// Returns `false` if no callback had that ID.
  pub fn remove_callback(&self, id: CallbackId) -> bool {
    let mut callbacks = self.inner.callbacks.lock().unwrap_or_else(PoisonError::into_inner);
    let before = callbacks.len();
    callbacks.retain(|(cb_id, _)| *cb_id != id);
    callbacks.len() != before
  }

  /// A feed of changes for tasks that prefer channels to callbacks.
  pub fn updates(&self) -> broadcast::Receiver<ResultChange> { self.inner.changes.subscribe() }

  /// Highest commit sequence this query has processed.
  pub fn seen(&self) -> u64 { *self.inner.seen.borrow() }

  /// Wait until this query has processed the commit numbered `seq`.
  pub async fn caught_up(&self, seq: u64) {
    let mut seen = self.inner.seen.subscribe();
    // The sender lives in `inner`, which `self` keeps alive.
    let _ = seen.wait_for(|s| *s >= seq).await;
  }
}

async fn listen<S: CatalogStore + 'static>(
  inner: Arc<Inner<S>>,
  mut events: broadcast::Receiver<StoreEvent>,
  mut selection: watch::Receiver<SelectionContext>,
) {
  let relevant = depends_on(inner.kind);

  loop {
    tokio::select! {
      event = events.recv() => match event {
        Ok(event) => {
          if relevant.iter().any(|kind| event.touches(*kind)) {
            let trigger = match event {
              StoreEvent::Committed { .. } => Trigger::Commit,
              StoreEvent::Cleared { .. } => Trigger::Reset,
            };
            let _ = inner.evaluate(trigger).await;
          }
          inner.mark_seen(event.seq());
        }
        Err(RecvError::Lagged(skipped)) => {
          tracing::warn!(query = %inner.id, skipped, "live query missed store events; reloading");
          let seq = inner.session.commit_seq();
          let _ = inner.evaluate(Trigger::Reset).await;
          inner.mark_seen(seq);
        }
        Err(RecvError::Closed) => break,
      },
      changed = selection.changed() => {
        if changed.is_err() {
          break;
        }
        let _ = selection.borrow_and_update();
        // Compare with the flag the results were evaluated under; it may have
        // flipped before this task first ran.
        if inner.organic_stale() {
          let _ = inner.evaluate(Trigger::Reconfigured).await;
        }
      }
    }
  }
}
