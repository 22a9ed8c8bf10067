//! Encoding and decoding helpers between domain records and SQLite rows.
//!
//! Timestamps are stored as RFC 3339 strings, booleans as integers, and the
//! brewery style associations as a compact JSON array.

use std::collections::{BTreeSet, HashMap};

use brewdex_core::record::{Beer, Brewery, Coordinates, Record, RecordKind, Style};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── Tables ──────────────────────────────────────────────────────────────────

pub fn table_name(kind: RecordKind) -> &'static str {
  match kind {
    RecordKind::Beer => "beers",
    RecordKind::Brewery => "breweries",
    RecordKind::Style => "styles",
  }
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Style associations ──────────────────────────────────────────────────────

pub fn encode_style_ids(ids: &BTreeSet<String>) -> Result<String> {
  Ok(serde_json::to_string(ids)?)
}

pub fn decode_style_ids(s: &str) -> Result<BTreeSet<String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Back-references ─────────────────────────────────────────────────────────

/// Derived reverse links, recomputed from forward keys for every read.
#[derive(Default)]
pub struct BackRefs {
  /// brewery id → ids of beers whose `brewery_id` matches.
  pub beers_by_brewery:   HashMap<String, BTreeSet<String>>,
  /// style id → ids of breweries brewing a beer of that style or carrying
  /// the style in `style_ids`.
  pub breweries_by_style: HashMap<String, BTreeSet<String>>,
}

impl BackRefs {
  /// Build from `(brewery_id, beer_id)` and `(style_id, brewery_id)` pairs.
  pub fn from_pairs(
    beer_pairs: Vec<(String, String)>,
    style_pairs: Vec<(String, String)>,
  ) -> Self {
    let mut refs = Self::default();
    for (brewery_id, beer_id) in beer_pairs {
      refs.beers_by_brewery.entry(brewery_id).or_default().insert(beer_id);
    }
    for (style_id, brewery_id) in style_pairs {
      refs
        .breweries_by_style
        .entry(style_id)
        .or_default()
        .insert(brewery_id);
    }
    refs
  }

  fn beers_of(&self, brewery_id: &str) -> BTreeSet<String> {
    self.beers_by_brewery.get(brewery_id).cloned().unwrap_or_default()
  }

  fn breweries_of(&self, style_id: &str) -> BTreeSet<String> {
    self.breweries_by_style.get(style_id).cloned().unwrap_or_default()
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `beers` row.
pub struct RawBeer {
  pub id:            String,
  pub name:          String,
  pub description:   String,
  pub abv:           String,
  pub ibu:           String,
  pub brewery_id:    String,
  pub style_id:      String,
  pub image_url:     Option<String>,
  pub is_organic:    bool,
  pub favorite:      bool,
  pub tasting_notes: String,
  pub updated_at:    String,
}

impl RawBeer {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      name:          row.get(1)?,
      description:   row.get(2)?,
      abv:           row.get(3)?,
      ibu:           row.get(4)?,
      brewery_id:    row.get(5)?,
      style_id:      row.get(6)?,
      image_url:     row.get(7)?,
      is_organic:    row.get(8)?,
      favorite:      row.get(9)?,
      tasting_notes: row.get(10)?,
      updated_at:    row.get(11)?,
    })
  }

  pub fn into_beer(self) -> Result<Beer> {
    Ok(Beer {
      updated_at:    decode_dt(&self.updated_at)?,
      id:            self.id,
      name:          self.name,
      description:   self.description,
      abv:           self.abv,
      ibu:           self.ibu,
      brewery_id:    self.brewery_id,
      style_id:      self.style_id,
      image_url:     self.image_url,
      is_organic:    self.is_organic,
      favorite:      self.favorite,
      tasting_notes: self.tasting_notes,
    })
  }
}

/// Raw values read directly from a `breweries` row.
pub struct RawBrewery {
  pub id:             String,
  pub name:           String,
  pub description:    String,
  pub website:        String,
  pub image_url:      Option<String>,
  pub is_organic:     bool,
  pub open_to_public: bool,
  pub favorite:       bool,
  pub latitude:       Option<f64>,
  pub longitude:      Option<f64>,
  pub style_ids:      String,
  pub updated_at:     String,
}

impl RawBrewery {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:             row.get(0)?,
      name:           row.get(1)?,
      description:    row.get(2)?,
      website:        row.get(3)?,
      image_url:      row.get(4)?,
      is_organic:     row.get(5)?,
      open_to_public: row.get(6)?,
      favorite:       row.get(7)?,
      latitude:       row.get(8)?,
      longitude:      row.get(9)?,
      style_ids:      row.get(10)?,
      updated_at:     row.get(11)?,
    })
  }

  pub fn into_brewery(self, refs: &BackRefs) -> Result<Brewery> {
    if self.latitude.is_some() != self.longitude.is_some() {
      return Err(Error::CorruptRow {
        table:  "breweries",
        detail: format!("brewery {} has only one coordinate", self.id),
      });
    }
    Ok(Brewery {
      beer_ids:       refs.beers_of(&self.id),
      style_ids:      decode_style_ids(&self.style_ids)?,
      updated_at:     decode_dt(&self.updated_at)?,
      coordinates:    Coordinates::from_parts(self.latitude, self.longitude),
      id:             self.id,
      name:           self.name,
      description:    self.description,
      website:        self.website,
      image_url:      self.image_url,
      is_organic:     self.is_organic,
      open_to_public: self.open_to_public,
      favorite:       self.favorite,
    })
  }
}

/// Raw values read directly from a `styles` row.
pub struct RawStyle {
  pub id:          String,
  pub name:        String,
  pub short_name:  String,
  pub category:    String,
  pub description: String,
  pub updated_at:  String,
}

impl RawStyle {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(0)?,
      name:        row.get(1)?,
      short_name:  row.get(2)?,
      category:    row.get(3)?,
      description: row.get(4)?,
      updated_at:  row.get(5)?,
    })
  }

  pub fn into_style(self, refs: &BackRefs) -> Result<Style> {
    Ok(Style {
      brewery_ids: refs.breweries_of(&self.id),
      updated_at:  decode_dt(&self.updated_at)?,
      id:          self.id,
      name:        self.name,
      short_name:  self.short_name,
      category:    self.category,
      description: self.description,
    })
  }
}

/// Rows of one table, still undecoded, plus the back-reference pairs read in
/// the same connection call.
pub enum RawRows {
  Beers(Vec<RawBeer>),
  Breweries(Vec<RawBrewery>, BackRefs),
  Styles(Vec<RawStyle>, BackRefs),
}

impl RawRows {
  pub fn into_records(self) -> Result<Vec<Record>> {
    match self {
      Self::Beers(rows) => rows
        .into_iter()
        .map(|r| r.into_beer().map(Record::Beer))
        .collect(),
      Self::Breweries(rows, refs) => rows
        .into_iter()
        .map(|r| r.into_brewery(&refs).map(Record::Brewery))
        .collect(),
      Self::Styles(rows, refs) => rows
        .into_iter()
        .map(|r| r.into_style(&refs).map(Record::Style))
        .collect(),
    }
  }
}
