//! Drafts — validated but not yet normalised records.
//!
//! Parsers emit drafts once the required fields of a sub-document are known to
//! be present. Optional fields stay `None` until a designer fills in defaults.

use serde::{Deserialize, Serialize};

use crate::record::{Coordinates, RecordKind};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeerDraft {
  pub id:          String,
  pub name:        String,
  pub style_id:    String,
  /// Present when the payload names the brewery; otherwise the designer uses
  /// the query-specific brewery ID.
  pub brewery_id:  Option<String>,
  pub description: Option<String>,
  pub abv:         Option<String>,
  pub ibu:         Option<String>,
  pub image_url:   Option<String>,
  pub is_organic:  Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BreweryDraft {
  pub id:             String,
  pub name:           String,
  pub description:    Option<String>,
  pub website:        Option<String>,
  pub image_url:      Option<String>,
  pub is_organic:     Option<bool>,
  pub open_to_public: Option<bool>,
  pub coordinates:    Option<Coordinates>,
  /// Style the brewery was fetched under, if the response was style-scoped.
  pub style_id:       Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleDraft {
  pub id:          String,
  pub name:        String,
  pub short_name:  Option<String>,
  pub category:    Option<String>,
  pub description: Option<String>,
}

/// The output unit of a response parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "draft", rename_all = "snake_case")]
pub enum Draft {
  Beer(BeerDraft),
  Brewery(BreweryDraft),
  Style(StyleDraft),
}

impl Draft {
  pub fn kind(&self) -> RecordKind {
    match self {
      Self::Beer(_) => RecordKind::Beer,
      Self::Brewery(_) => RecordKind::Brewery,
      Self::Style(_) => RecordKind::Style,
    }
  }

  pub fn id(&self) -> &str {
    match self {
      Self::Beer(d) => &d.id,
      Self::Brewery(d) => &d.id,
      Self::Style(d) => &d.id,
    }
  }
}
