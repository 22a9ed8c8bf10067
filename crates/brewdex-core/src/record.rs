//! Record types — the three entities mirrored from the remote directory.
//!
//! Every record carries a stable external string identity. That identity is
//! never regenerated locally; the creation queue uses it to decide between
//! insert and update-in-place.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// Placeholder written by designers for missing descriptive text.
pub const NO_INFORMATION: &str = "No Information Provided";

/// Placeholder written by designers for missing numeric-as-string fields.
pub const NOT_AVAILABLE: &str = "N/A";

// ─── Kind ────────────────────────────────────────────────────────────────────

/// Discriminant for the three record tables.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
  Beer,
  Brewery,
  Style,
}

// ─── Geography ───────────────────────────────────────────────────────────────

/// A latitude/longitude pair. Both halves exist or neither does, so a brewery
/// holds `Option<Coordinates>` rather than two independent options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
  pub latitude:  f64,
  pub longitude: f64,
}

impl Coordinates {
  /// Build a pair only when both halves are present.
  pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
    match (latitude, longitude) {
      (Some(latitude), Some(longitude)) => Some(Self { latitude, longitude }),
      _ => None,
    }
  }
}

// ─── Beer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beer {
  pub id:            String,
  pub name:          String,
  pub description:   String,
  /// Alcohol by volume, kept as the remote string (e.g. `"5.5"` or `"N/A"`).
  pub abv:           String,
  pub ibu:           String,
  /// Soft foreign key into the brewery table.
  pub brewery_id:    String,
  /// Soft foreign key into the style table.
  pub style_id:      String,
  pub image_url:     Option<String>,
  pub is_organic:    bool,
  pub favorite:      bool,
  pub tasting_notes: String,
  pub updated_at:    DateTime<Utc>,
}

// ─── Brewery ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brewery {
  pub id:             String,
  pub name:           String,
  pub description:    String,
  pub website:        String,
  pub image_url:      Option<String>,
  pub is_organic:     bool,
  pub open_to_public: bool,
  pub favorite:       bool,
  pub coordinates:    Option<Coordinates>,
  /// Styles this brewery was discovered under. Persisted forward key.
  pub style_ids:      BTreeSet<String>,
  /// Beers whose `brewery_id` points here. Derived on read, never stored.
  pub beer_ids:       BTreeSet<String>,
  pub updated_at:     DateTime<Utc>,
}

impl Brewery {
  /// Only breweries with coordinates can be placed on a map.
  pub fn is_mappable(&self) -> bool { self.coordinates.is_some() }
}

// ─── Style ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
  pub id:          String,
  pub name:        String,
  pub short_name:  String,
  pub category:    String,
  pub description: String,
  /// Breweries exhibiting this style. Derived on read from beers and from
  /// `Brewery::style_ids`; never stored.
  pub brewery_ids: BTreeSet<String>,
  pub updated_at:  DateTime<Utc>,
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// Any one of the three stored entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Record {
  Beer(Beer),
  Brewery(Brewery),
  Style(Style),
}

impl Record {
  pub fn kind(&self) -> RecordKind {
    match self {
      Self::Beer(_) => RecordKind::Beer,
      Self::Brewery(_) => RecordKind::Brewery,
      Self::Style(_) => RecordKind::Style,
    }
  }

  pub fn id(&self) -> &str {
    match self {
      Self::Beer(b) => &b.id,
      Self::Brewery(b) => &b.id,
      Self::Style(s) => &s.id,
    }
  }

  /// The name shown in lists; the field the in-memory search runs over.
  pub fn display_name(&self) -> &str {
    match self {
      Self::Beer(b) => &b.name,
      Self::Brewery(b) => &b.name,
      Self::Style(s) => &s.name,
    }
  }

  /// `(kind, id)` — the dedup key used by the creation queue.
  pub fn key(&self) -> RecordKey { RecordKey::new(self.kind(), self.id()) }

  pub fn as_brewery(&self) -> Option<&Brewery> {
    match self {
      Self::Brewery(b) => Some(b),
      _ => None,
    }
  }

  pub fn into_brewery(self) -> Option<Brewery> {
    match self {
      Self::Brewery(b) => Some(b),
      _ => None,
    }
  }
}

/// Identity of a record across all three tables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
  pub kind: RecordKind,
  pub id:   String,
}

impl RecordKey {
  pub fn new(kind: RecordKind, id: impl Into<String>) -> Self {
    Self { kind, id: id.into() }
  }
}

impl std::fmt::Display for RecordKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{}", self.kind, self.id)
  }
}
