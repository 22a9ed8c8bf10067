//! Structural query types evaluated by store backends.

use serde::{Deserialize, Serialize};

use crate::record::RecordKind;

/// The predicate half of a live query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Filter {
  /// Every record of the kind.
  #[default]
  All,
  /// Beers whose `brewery_id` equals the value.
  BreweryId(String),
  /// Beers whose `style_id` equals the value.
  StyleId(String),
  /// Breweries associated with the style, either through one of their beers
  /// or through `Brewery::style_ids`.
  BreweriesWithStyle(String),
  /// Case-insensitive substring match on the name column.
  NameContains(String),
  /// `favorite == true`. Styles carry no favorite flag and never match.
  Favorites,
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
  #[default]
  Name,
  Id,
  UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
  pub key:       SortKey,
  pub ascending: bool,
}

impl Default for SortOrder {
  fn default() -> Self { Self { key: SortKey::Name, ascending: true } }
}

/// Parameters for [`crate::store::CatalogStore::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
  pub kind:         RecordKind,
  pub filter:       Filter,
  pub sort:         SortOrder,
  /// Restrict to organic beers/breweries. Ignored for styles.
  pub organic_only: bool,
  pub limit:        Option<usize>,
}

impl RecordQuery {
  /// Everything of `kind`, sorted by name.
  pub fn all(kind: RecordKind) -> Self {
    Self {
      kind,
      filter: Filter::All,
      sort: SortOrder::default(),
      organic_only: false,
      limit: None,
    }
  }

  pub fn with_filter(mut self, filter: Filter) -> Self {
    self.filter = filter;
    self
  }
}
