//! End-to-end tests of the sync engine over an in-memory SQLite store.

use std::{
  sync::{
    Arc, Mutex,
    atomic::{AtomicU32, Ordering},
  },
  time::Duration,
};

use brewdex_core::{
  draft::{BeerDraft, BreweryDraft, Draft},
  query::{Filter, RecordQuery},
  record::{Coordinates, Record, RecordKind},
  store::{Batch, CatalogStore, DeletedCounts},
};
use brewdex_parse::ResponseKind;
use brewdex_store_sqlite::SqliteStore;

use crate::{
  CreationQueue, Error, GeoAnnotation, LiveQuery, MapStrategy, MapTarget, Message, QueueConfig,
  ResultChange, RowEdit, Selection, Session, Source,
  designer::design,
  ingest::ingest,
  map::spawn_renderer,
};

// ─── Failure-injecting store ─────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
enum FlakyError {
  #[error("injected {0} failure")]
  Injected(&'static str),
  #[error(transparent)]
  Sqlite(#[from] brewdex_store_sqlite::Error),
}

/// Wraps a real store and fails the next N calls of selected operations.
struct FlakyStore {
  inner:           SqliteStore,
  failing_commits: AtomicU32,
  failing_deletes: AtomicU32,
  failing_queries: AtomicU32,
  failing_gets:    AtomicU32,
  commit_calls:    AtomicU32,
}

fn trip(counter: &AtomicU32) -> bool {
  counter
    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
    .is_ok()
}

impl CatalogStore for FlakyStore {
  type Error = FlakyError;

  async fn commit(&self, batch: &Batch) -> Result<(), FlakyError> {
    self.commit_calls.fetch_add(1, Ordering::SeqCst);
    if trip(&self.failing_commits) {
      return Err(FlakyError::Injected("commit"));
    }
    Ok(self.inner.commit(batch).await?)
  }

  async fn delete_all(&self) -> Result<DeletedCounts, FlakyError> {
    if trip(&self.failing_deletes) {
      return Err(FlakyError::Injected("delete"));
    }
    Ok(self.inner.delete_all().await?)
  }

  async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, FlakyError> {
    if trip(&self.failing_gets) {
      return Err(FlakyError::Injected("get"));
    }
    Ok(self.inner.get(kind, id).await?)
  }

  async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>, FlakyError> {
    if trip(&self.failing_queries) {
      return Err(FlakyError::Injected("query"));
    }
    Ok(self.inner.query(query).await?)
  }

  async fn count(&self, kind: RecordKind) -> Result<usize, FlakyError> {
    Ok(self.inner.count(kind).await?)
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

struct Harness {
  store:   Arc<FlakyStore>,
  session: Session,
  queue:   CreationQueue,
}

async fn harness() -> Harness {
  let store = Arc::new(FlakyStore {
    inner:           SqliteStore::open_in_memory().await.expect("in-memory store"),
    failing_commits: AtomicU32::new(0),
    failing_deletes: AtomicU32::new(0),
    failing_queries: AtomicU32::new(0),
    failing_gets:    AtomicU32::new(0),
    commit_calls:    AtomicU32::new(0),
  });
  let session = Session::default();
  let config = QueueConfig { retry_backoff_ms: 1, ..Default::default() };
  let (queue, _worker) = CreationQueue::spawn(store.clone(), session.clone(), config);
  Harness { store, session, queue }
}

impl Harness {
  async fn live(&self, kind: RecordKind) -> LiveQuery<FlakyStore> {
    LiveQuery::open(self.store.clone(), self.session.clone(), kind)
      .await
      .unwrap()
  }

  async fn count(&self, kind: RecordKind) -> usize { self.store.count(kind).await.unwrap() }

  async fn seed(&self, records: Vec<Record>) -> u64 {
    for record in records {
      self.queue.submit(record).await.unwrap();
    }
    self.queue.flush().await.unwrap()
  }
}

fn beer(id: &str, name: &str, brewery_id: &str) -> Record {
  design(
    Draft::Beer(BeerDraft {
      id: id.into(),
      name: name.into(),
      style_id: "30".into(),
      brewery_id: Some(brewery_id.into()),
      ..Default::default()
    }),
    None,
  )
}

fn brewery(id: &str, style_id: Option<&str>) -> Record {
  design(
    Draft::Brewery(BreweryDraft {
      id: id.into(),
      name: format!("Brewery {id}"),
      website: Some(format!("https://{id}.example")),
      coordinates: Some(Coordinates { latitude: 45.0, longitude: -122.0 }),
      style_id: style_id.map(str::to_string),
      ..Default::default()
    }),
    None,
  )
}

fn style(id: &str, name: &str) -> Record {
  design(
    Draft::Style(brewdex_core::draft::StyleDraft {
      id: id.into(),
      name: name.into(),
      ..Default::default()
    }),
    None,
  )
}

#[derive(Clone, Default)]
struct RecordingTarget(Arc<Mutex<Vec<usize>>>);

impl RecordingTarget {
  fn last(&self) -> Option<usize> { self.0.lock().unwrap().last().copied() }
}

impl MapTarget for RecordingTarget {
  fn draw(&mut self, annotations: &[GeoAnnotation]) {
    self.0.lock().unwrap().push(annotations.len());
  }
}

// ─── Creation queue ──────────────────────────────────────────────────────────

#[tokio::test]
async fn same_record_twice_is_stored_once() {
  let h = harness().await;
  h.queue.submit_and_wait(beer("b1", "Pils", "br1")).await.unwrap();
  h.queue.submit_and_wait(beer("b1", "Pils", "br1")).await.unwrap();

  assert_eq!(h.count(RecordKind::Beer).await, 1);
  let stored = h.store.get(RecordKind::Beer, "b1").await.unwrap().unwrap();
  assert_eq!(stored.id(), "b1");
}

#[tokio::test]
async fn concurrent_submitters_do_not_duplicate() {
  let h = harness().await;
  let mut tasks = Vec::new();
  for _ in 0..8 {
    let queue = h.queue.clone();
    tasks.push(tokio::spawn(async move {
      queue.submit_and_wait(beer("b1", "Pils", "br1")).await
    }));
  }
  for task in tasks {
    task.await.unwrap().unwrap();
  }
  assert_eq!(h.count(RecordKind::Beer).await, 1);
}

#[tokio::test]
async fn favorite_only_submission_preserves_stored_fields() {
  let h = harness().await;
  let Record::Beer(mut full) = beer("b1", "Pils", "br1") else { unreachable!() };
  full.description = "Crisp and bready".into();
  full.abv = "5.2".into();
  full.tasting_notes = "Great with pretzels".into();
  h.queue.submit_and_wait(Record::Beer(full)).await.unwrap();

  // A sparse record: placeholders everywhere except the favorite flag.
  let Record::Beer(mut sparse) = beer("b1", "Pils", "") else { unreachable!() };
  sparse.favorite = true;
  h.queue.submit_and_wait(Record::Beer(sparse)).await.unwrap();

  let Some(Record::Beer(stored)) = h.store.get(RecordKind::Beer, "b1").await.unwrap() else {
    panic!("beer missing");
  };
  assert!(stored.favorite);
  assert_eq!(stored.description, "Crisp and bready");
  assert_eq!(stored.abv, "5.2");
  assert_eq!(stored.brewery_id, "br1");
  assert_eq!(stored.tasting_notes, "Great with pretzels");
}

#[tokio::test]
async fn explicit_edits_go_through_the_queue() {
  let h = harness().await;
  h.seed(vec![beer("b1", "Pils", "br1"), brewery("br1", None)]).await;

  h.queue.set_favorite(RecordKind::Brewery, "br1", true).await.unwrap();
  h.queue.set_tasting_notes("b1", "Grassy").await.unwrap();
  h.queue.associate_style("br1", "30").await.unwrap();
  h.queue.set_favorite(RecordKind::Brewery, "br1", false).await.unwrap();

  let brewery = h.store.get(RecordKind::Brewery, "br1").await.unwrap().unwrap();
  let brewery = brewery.as_brewery().unwrap();
  assert!(!brewery.favorite);
  assert!(brewery.style_ids.contains("30"));

  let Some(Record::Beer(beer)) = h.store.get(RecordKind::Beer, "b1").await.unwrap() else {
    panic!("beer missing");
  };
  assert_eq!(beer.tasting_notes, "Grassy");
}

#[tokio::test]
async fn edits_on_missing_or_unsupported_records_fail() {
  let h = harness().await;
  h.seed(vec![style("30", "IPA")]).await;

  assert!(matches!(
    h.queue.set_tasting_notes("nope", "x").await,
    Err(Error::NotFound(_))
  ));
  assert!(matches!(
    h.queue.set_favorite(RecordKind::Style, "30", true).await,
    Err(Error::Unsupported(_))
  ));
}

#[tokio::test]
async fn transient_commit_failures_are_retried() {
  let h = harness().await;
  h.store.failing_commits.store(2, Ordering::SeqCst);

  h.queue.submit_and_wait(beer("b1", "Pils", "br1")).await.unwrap();
  assert_eq!(h.store.commit_calls.load(Ordering::SeqCst), 3);
  assert_eq!(h.count(RecordKind::Beer).await, 1);
}

#[tokio::test]
async fn exhausted_commit_is_surfaced_to_submitters_and_observers() {
  let h = harness().await;
  let mut observer = h.session.register();
  h.store.failing_commits.store(3, Ordering::SeqCst);

  let err = h.queue.submit_and_wait(beer("b1", "Pils", "br1")).await.unwrap_err();
  let Error::Commit(commit) = err else { panic!("expected a commit error") };
  assert_eq!(commit.attempts, 3);
  assert_eq!(h.count(RecordKind::Beer).await, 0);

  let notification = observer.try_recv().unwrap();
  assert_eq!(notification.from, Source::Writer);
  assert!(matches!(notification.message, Message::Error(_)));

  // The queue keeps working afterwards.
  h.queue.submit_and_wait(beer("b2", "Bock", "br1")).await.unwrap();
  assert_eq!(h.count(RecordKind::Beer).await, 1);
}

#[tokio::test]
async fn unadmittable_fire_and_forget_submission_reaches_observers() {
  let h = harness().await;
  let mut observer = h.session.register();
  h.store.failing_gets.store(3, Ordering::SeqCst);

  h.queue.submit(beer("b1", "Pils", "br1")).await.unwrap();
  h.queue.flush().await.unwrap();
  assert_eq!(h.count(RecordKind::Beer).await, 0);

  let notification = observer.try_recv().unwrap();
  assert_eq!(notification.from, Source::Writer);
  let Message::Error(detail) = notification.message else { panic!("expected an error message") };
  assert!(detail.contains("injected get failure"), "{detail}");

  h.queue.submit(beer("b2", "Bock", "br1")).await.unwrap();
  h.queue.flush().await.unwrap();
  assert_eq!(h.count(RecordKind::Beer).await, 1);
}

// ─── Delete all ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_all_clears_every_kind_and_resets_queries() {
  let h = harness().await;
  h.seed(vec![beer("b1", "Pils", "br1"), brewery("br1", None), style("30", "IPA")]).await;
  let query = h.live(RecordKind::Beer).await;
  let mut updates = query.updates();

  let report = h.queue.delete_all().await.unwrap();
  assert!(report.is_success());
  assert_eq!(report.removed(), 3);
  for kind in [RecordKind::Beer, RecordKind::Brewery, RecordKind::Style] {
    assert_eq!(h.count(kind).await, 0);
  }

  assert_eq!(updates.recv().await.unwrap(), ResultChange::Reload);
  assert!(query.results().is_empty());
}

#[tokio::test]
async fn failed_delete_all_leaves_every_kind_untouched() {
  let h = harness().await;
  h.seed(vec![beer("b1", "Pils", "br1"), brewery("br1", None), style("30", "IPA")]).await;
  h.store.failing_deletes.store(3, Ordering::SeqCst);

  let report = h.queue.delete_all().await.unwrap();
  assert!(!report.is_success());
  assert_eq!(report.outcomes.len(), 3);
  assert!(report.outcomes.values().all(Result::is_err));
  for kind in [RecordKind::Beer, RecordKind::Brewery, RecordKind::Style] {
    assert_eq!(h.count(kind).await, 1, "{kind} changed");
  }
}

#[tokio::test]
async fn delete_all_commits_pending_submissions_first() {
  let h = harness().await;
  h.queue.submit(beer("b1", "Pils", "br1")).await.unwrap();
  let report = h.queue.delete_all().await.unwrap();
  assert!(report.is_success());
  assert_eq!(h.count(RecordKind::Beer).await, 0);
}

// ─── Live query ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn caught_up_query_matches_the_store() {
  let h = harness().await;
  let query = h.live(RecordKind::Beer).await;

  h.queue.submit(beer("b2", "Zwickel", "br1")).await.unwrap();
  h.queue.submit(beer("b1", "Altbier", "br1")).await.unwrap();
  let seq = h.queue.flush().await.unwrap();
  query.caught_up(seq).await;

  let expected = h.store.query(&RecordQuery::all(RecordKind::Beer)).await.unwrap();
  assert_eq!(query.results(), expected);
  let names: Vec<_> = query.results().iter().map(|r| r.display_name().to_string()).collect();
  assert_eq!(names, ["Altbier", "Zwickel"]);
}

#[tokio::test]
async fn callbacks_receive_classified_edits() {
  let h = harness().await;
  h.seed(vec![beer("b1", "Altbier", "br1"), beer("b3", "Zwickel", "br1")]).await;
  let query = h.live(RecordKind::Beer).await;

  let seen = Arc::new(Mutex::new(Vec::new()));
  let sink = seen.clone();
  let id = query.on_change(move |change| sink.lock().unwrap().push(change.clone()));

  let seq = h.queue.submit_and_wait(beer("b2", "Märzen", "br1")).await.unwrap();
  query.caught_up(seq).await;
  assert_eq!(
    seen.lock().unwrap().as_slice(),
    [ResultChange::Edits(vec![RowEdit::Insert { new_index: 1 }])]
  );

  assert!(query.remove_callback(id));
  let seq = h.queue.submit_and_wait(beer("b4", "Weizen", "br1")).await.unwrap();
  query.caught_up(seq).await;
  assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unrelated_commits_do_not_touch_beer_queries() {
  let h = harness().await;
  let query = h.live(RecordKind::Beer).await;
  let mut updates = query.updates();

  let seq = h.seed(vec![style("30", "IPA")]).await;
  query.caught_up(seq).await;
  assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn bound_observer_hears_only_its_query() {
  let h = harness().await;
  let beers = h.live(RecordKind::Beer).await;
  let breweries = h.live(RecordKind::Brewery).await;
  let mut observer = h.session.register();
  observer.bind(beers.id());

  let seq = h.seed(vec![beer("b1", "Pils", "br1"), brewery("br1", None)]).await;
  beers.caught_up(seq).await;
  breweries.caught_up(seq).await;

  let notification = observer.try_recv().unwrap();
  assert_eq!(notification.from, Source::Query(beers.id()));
  assert_eq!(notification.message, Message::Reload);
  assert!(observer.try_recv().is_none());
}

#[tokio::test]
async fn failed_evaluation_keeps_last_results() {
  let h = harness().await;
  h.seed(vec![beer("b1", "Pils", "br1")]).await;
  let query = h.live(RecordKind::Beer).await;
  let mut observer = h.session.register();
  observer.bind(query.id());

  h.store.failing_queries.store(1, Ordering::SeqCst);
  let seq = h.queue.submit_and_wait(beer("b2", "Bock", "br1")).await.unwrap();
  query.caught_up(seq).await;

  assert_eq!(query.results().len(), 1);
  let notification = observer.try_recv().unwrap();
  assert!(matches!(notification.message, Message::Error(_)));

  query.refresh().await.unwrap();
  assert_eq!(query.results().len(), 2);
}

#[tokio::test]
async fn configure_and_search_narrow_results() {
  let h = harness().await;
  h.seed(vec![
    beer("b1", "Hazy IPA", "br1"),
    beer("b2", "West Coast IPA", "br2"),
    beer("b3", "Dry Stout", "br1"),
  ])
  .await;
  let query = h.live(RecordKind::Beer).await;

  query.set_search_text("ipa");
  assert_eq!(query.results().len(), 3);
  assert_eq!(query.visible().len(), 2);

  query
    .configure(Filter::BreweryId("br1".into()), Default::default())
    .await
    .unwrap();
  let visible: Vec<_> = query.visible().iter().map(|r| r.id().to_string()).collect();
  assert_eq!(visible, ["b1"]);
}

#[tokio::test]
async fn organic_flag_reevaluates_queries() {
  let h = harness().await;
  let Record::Beer(mut organic) = beer("b1", "Green Ale", "br1") else { unreachable!() };
  organic.is_organic = true;
  h.seed(vec![Record::Beer(organic), beer("b2", "Lager", "br1")]).await;
  let query = h.live(RecordKind::Beer).await;
  let mut updates = query.updates();

  h.session.set_organic_only(true);
  let change = tokio::time::timeout(Duration::from_secs(5), updates.recv())
    .await
    .expect("no reload after toggling organic-only")
    .unwrap();
  assert_eq!(change, ResultChange::Reload);
  assert_eq!(query.results().len(), 1);
  assert_eq!(query.results()[0].id(), "b1");
}

#[tokio::test]
async fn organic_flag_set_before_listener_runs_is_applied() {
  let h = harness().await;
  let Record::Beer(mut organic) = beer("b1", "Green Ale", "br1") else { unreachable!() };
  organic.is_organic = true;
  h.seed(vec![Record::Beer(organic), beer("b2", "Lager", "br1")]).await;

  // No await between opening and toggling, so the listener task has not
  // been polled yet on the current-thread runtime.
  let query = h.live(RecordKind::Beer).await;
  assert_eq!(query.results().len(), 2);
  h.session.set_organic_only(true);

  tokio::time::timeout(Duration::from_secs(5), async {
    while query.results().len() != 1 {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .expect("organic-only toggle was never applied");
  assert_eq!(query.results()[0].id(), "b1");

  h.session.set_organic_only(false);
  tokio::time::timeout(Duration::from_secs(5), async {
    while query.results().len() != 2 {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .expect("organic-only toggle back was never applied");
}

// ─── Map strategies ──────────────────────────────────────────────────────────

#[tokio::test]
async fn by_style_map_grows_with_new_associations() {
  let h = harness().await;
  h.seed(vec![
    brewery("br1", Some("ipa")),
    brewery("br2", Some("ipa")),
    brewery("br3", None),
    brewery("br4", None),
  ])
  .await;

  let strategy = MapStrategy::by_style(h.store.clone(), h.session.clone(), "ipa")
    .await
    .unwrap();
  assert_eq!(strategy.annotations().len(), 2);
  let query = strategy.query().unwrap().clone();

  let target = RecordingTarget::default();
  let renderer = spawn_renderer(strategy, target.clone());

  h.queue.associate_style("br3", "ipa").await.unwrap();
  let seq = h.queue.associate_style("br4", "ipa").await.unwrap();
  query.caught_up(seq).await;

  let by_style = MapStrategy::<FlakyStore>::to_annotations(
    &query
      .results()
      .into_iter()
      .filter_map(Record::into_brewery)
      .collect::<Vec<_>>(),
  );
  assert_eq!(by_style.len(), 4);

  tokio::time::timeout(Duration::from_secs(5), async {
    while target.last() != Some(4) {
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
  })
  .await
  .expect("renderer never drew four annotations");
  renderer.abort();
}

#[tokio::test]
async fn all_breweries_map_respects_its_cap() {
  let h = harness().await;
  h.seed((1..=5).map(|i| brewery(&format!("br{i}"), None)).collect()).await;

  let strategy = MapStrategy::all(h.store.clone(), h.session.clone(), 3).await.unwrap();
  assert_eq!(strategy.records().len(), 3);
  assert_eq!(strategy.annotations().len(), 3);
}

#[tokio::test]
async fn breweries_without_coordinates_are_not_mapped() {
  let h = harness().await;
  let Record::Brewery(mut hidden) = brewery("br1", None) else { unreachable!() };
  hidden.coordinates = None;
  h.seed(vec![Record::Brewery(hidden), brewery("br2", None)]).await;

  let strategy = MapStrategy::all(h.store.clone(), h.session.clone(), 100).await.unwrap();
  let ids: Vec<_> = strategy.records().into_iter().map(|b| b.id).collect();
  assert_eq!(ids, ["br2"]);
}

#[tokio::test]
async fn single_brewery_map_never_changes() {
  let h = harness().await;
  let Some(fixed) = brewery("br1", None).into_brewery() else { unreachable!() };
  let strategy = MapStrategy::<FlakyStore>::single(fixed);
  let before = strategy.annotations();
  assert_eq!(before.len(), 1);
  assert!(strategy.updates().is_none());

  h.seed(vec![brewery("br2", None), beer("b1", "Pils", "br1")]).await;
  assert_eq!(strategy.annotations(), before);
}

#[tokio::test]
async fn selection_picks_the_map_strategy() {
  let h = harness().await;
  h.seed(vec![style("30", "IPA")]).await;
  let Some(Record::Style(ipa)) = h.store.get(RecordKind::Style, "30").await.unwrap() else {
    panic!("style missing");
  };

  h.session.select(Selection::Style(ipa));
  let strategy = MapStrategy::for_selection(h.store.clone(), h.session.clone(), &Default::default())
    .await
    .unwrap();
  assert!(matches!(strategy, MapStrategy::ByStyle { ref style_id, .. } if style_id == "30"));

  h.session.select(Selection::None);
  let strategy = MapStrategy::for_selection(h.store.clone(), h.session.clone(), &Default::default())
    .await
    .unwrap();
  assert!(matches!(strategy, MapStrategy::All { max_points: 100, .. }));
}

// ─── Ingest ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_skips_invalid_beers_and_submits_the_rest() {
  let h = harness().await;
  let body = r#"{"status":"success","data":[
    {"id":"b1","name":"Pils","styleId":98},
    {"id":"b2","name":"Mystery"}
  ]}"#;

  let report = ingest(
    &h.queue,
    &h.session,
    body,
    &ResponseKind::BeersForBrewery("br9".into()),
  )
  .await
  .unwrap();
  assert!(report.ok);
  assert_eq!((report.submitted, report.rejected), (1, 1));

  h.queue.flush().await.unwrap();
  let Some(Record::Beer(beer)) = h.store.get(RecordKind::Beer, "b1").await.unwrap() else {
    panic!("beer missing");
  };
  assert_eq!(beer.brewery_id, "br9");
  assert_eq!(beer.style_id, "98");
}

#[tokio::test]
async fn unreadable_response_asks_for_a_retry() {
  let h = harness().await;
  let mut observer = h.session.register();

  let report = ingest(&h.queue, &h.session, "<html>", &ResponseKind::Styles)
    .await
    .unwrap();
  assert!(!report.ok);
  assert_eq!(
    observer.try_recv().map(|n| (n.from, n.message)),
    Some((Source::Ingest, Message::Retry))
  );
}
