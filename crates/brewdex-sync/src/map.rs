//! Map annotation strategies.
//!
//! A [`MapStrategy`] decides which breweries go on the map. Variants that
//! follow a live query re-derive their annotations from the query's current
//! results every time they are asked; nothing is cached here.

use std::sync::Arc;

use brewdex_core::{
  merge::is_informative,
  query::{Filter, SortOrder},
  record::{Brewery, Coordinates, Record, RecordKind},
  store::CatalogStore,
};
use serde::{Deserialize, Serialize};
use tokio::{
  sync::broadcast::{self, error::RecvError},
  task::JoinHandle,
};

use crate::{
  Result,
  change::ResultChange,
  live::LiveQuery,
  session::{Selection, Session},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoAnnotation {
  pub brewery_id:  String,
  pub title:       String,
  pub subtitle:    Option<String>,
  pub coordinates: Coordinates,
}

/// Where annotations end up: a map view, a file, a test recorder.
pub trait MapTarget {
  /// Replace everything currently drawn with `annotations`.
  fn draw(&mut self, annotations: &[GeoAnnotation]);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
  /// Cap on annotations drawn by the all-breweries map.
  pub max_points: usize,
}

impl Default for MapConfig {
  fn default() -> Self { Self { max_points: 100 } }
}

pub enum MapStrategy<S> {
  /// One brewery, fixed at construction.
  Single(Brewery),
  /// Every brewery, truncated to `max_points`.
  All { query: LiveQuery<S>, max_points: usize },
  /// Breweries associated with one style.
  ByStyle { query: LiveQuery<S>, style_id: String },
}

impl<S: CatalogStore + 'static> MapStrategy<S> {
  pub fn single(brewery: Brewery) -> Self { Self::Single(brewery) }

  pub async fn all(store: Arc<S>, session: Session, max_points: usize) -> Result<Self> {
    let query = LiveQuery::open(store, session, RecordKind::Brewery).await?;
    Ok(Self::All { query, max_points })
  }

  pub async fn by_style(store: Arc<S>, session: Session, style_id: impl Into<String>) -> Result<Self> {
    let style_id = style_id.into();
    let query = LiveQuery::open_with(
      store,
      session,
      RecordKind::Brewery,
      Filter::BreweriesWithStyle(style_id.clone()),
      SortOrder::default(),
    )
    .await?;
    Ok(Self::ByStyle { query, style_id })
  }

  /// Pick the strategy matching what the user selected last.
  pub async fn for_selection(store: Arc<S>, session: Session, config: &MapConfig) -> Result<Self> {
    match session.selection().selection {
      Selection::Brewery(brewery) => Ok(Self::single(brewery)),
      Selection::Style(style) => Self::by_style(store, session, style.id).await,
      Selection::None => Self::all(store, session, config.max_points).await,
    }
  }

  /// The breweries to place, in query order. Only breweries with
  /// coordinates are included.
  pub fn records(&self) -> Vec<Brewery> {
    match self {
      Self::Single(brewery) => brewery.is_mappable().then(|| brewery.clone()).into_iter().collect(),
      Self::All { query, max_points } => mappable(query.results()).take(*max_points).collect(),
      Self::ByStyle { query, .. } => mappable(query.results()).collect(),
    }
  }

  pub fn to_annotations(records: &[Brewery]) -> Vec<GeoAnnotation> {
    records
      .iter()
      .filter_map(|brewery| {
        Some(GeoAnnotation {
          brewery_id:  brewery.id.clone(),
          title:       brewery.name.clone(),
          subtitle:    is_informative(&brewery.website).then(|| brewery.website.clone()),
          coordinates: brewery.coordinates?,
        })
      })
      .collect()
  }

  pub fn annotations(&self) -> Vec<GeoAnnotation> { Self::to_annotations(&self.records()) }

  /// Draw the current annotations on `target`, returning how many there were.
  pub fn render(&self, target: &mut impl MapTarget) -> usize {
    let annotations = self.annotations();
    target.draw(&annotations);
    annotations.len()
  }

  /// Change feed of the underlying query. A single-brewery map never changes.
  pub fn updates(&self) -> Option<broadcast::Receiver<ResultChange>> {
    self.query().map(LiveQuery::updates)
  }

  pub fn query(&self) -> Option<&LiveQuery<S>> {
    match self {
      Self::Single(_) => None,
      Self::All { query, .. } | Self::ByStyle { query, .. } => Some(query),
    }
  }
}

fn mappable(records: Vec<Record>) -> impl Iterator<Item = Brewery> {
  records
    .into_iter()
    .filter_map(Record::into_brewery)
    .filter(Brewery::is_mappable)
}

/// Render `strategy` on `target` now and again after every change its query
/// reports. All drawing happens on the spawned task.
pub fn spawn_renderer<S, T>(strategy: MapStrategy<S>, mut target: T) -> JoinHandle<()>
where
  S: CatalogStore + 'static,
  T: MapTarget + Send + 'static,
{
  tokio::spawn(async move {
    let updates = strategy.updates();
    let drawn = strategy.render(&mut target);
    tracing::debug!(drawn, "map rendered");

    let Some(mut updates) = updates else {
      return;
    };
    loop {
      match updates.recv().await {
        Ok(_) | Err(RecvError::Lagged(_)) => {
          let drawn = strategy.render(&mut target);
          tracing::debug!(drawn, "map re-rendered");
        }
        Err(RecvError::Closed) => break,
      }
    }
  })
}
