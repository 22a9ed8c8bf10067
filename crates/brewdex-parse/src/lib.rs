//! Response parsers for BreweryDB-shaped JSON documents.
//!
//! Converts untyped response bodies into [`brewdex_core::draft::Draft`]s. Pure
//! synchronous; no runtime or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use brewdex_parse::parse_styles;
//!
//! let body = r#"{"status":"success","data":[{"id":30,"name":"American-Style IPA"}]}"#;
//! let parsed = parse_styles(body).unwrap();
//! println!("{} drafts, {} rejected", parsed.drafts.len(), parsed.rejected.len());
//! ```

pub mod error;
mod fields;
mod parse;

use brewdex_core::{draft::Draft, record::RecordKind};
use serde::{Deserialize, Serialize};

pub use error::{Error, Result};

// ─── Public types
// ─────────────────────────────────────────────────────────────

/// A sub-document skipped because a required field was missing or invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
  /// Position of the sub-document within the response's `data` array.
  pub index:  usize,
  pub kind:   RecordKind,
  /// The sub-document's `id`, when it had one.
  pub id:     Option<String>,
  pub reason: String,
}

/// The result of parsing one well-formed response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parsed {
  pub drafts:   Vec<Draft>,
  pub rejected: Vec<Rejection>,
}

/// The response shapes the catalog knows how to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ResponseKind {
  /// Beer search results carrying their breweries.
  BeersWithBreweries,
  /// Beers brewed by the given brewery.
  BeersForBrewery(String),
  /// Beers-with-breweries fetched for the given style.
  BreweriesForStyle(String),
  /// The style catalogue.
  Styles,
}

// ─── Public API
// ───────────────────────────────────────────────────────────────

/// Parse a combined beer + brewery payload.
///
/// Each beer must name a style and carry a `breweries` list. Exactly one
/// brewery is kept per beer: the first one owning a location that is both
/// primary and open to the public and has coordinates.
pub fn parse_beers_with_breweries(input: &str) -> Result<Parsed> {
  parse::beers_with_breweries(input)
}

/// Parse the beers of one brewery; `brewery_id` is the query-specific ID the
/// response was fetched for.
pub fn parse_beers_for_brewery(input: &str, brewery_id: &str) -> Result<Parsed> {
  parse::beers_for_brewery(input, brewery_id)
}

/// Parse a beers-with-breweries payload fetched for one style. Every kept
/// brewery is associated with `style_id`.
pub fn parse_breweries_for_style(input: &str, style_id: &str) -> Result<Parsed> {
  parse::breweries_for_style(input, style_id)
}

/// Parse the style catalogue.
pub fn parse_styles(input: &str) -> Result<Parsed> { parse::styles(input) }

/// Dispatch on `kind`.
pub fn parse(input: &str, kind: &ResponseKind) -> Result<Parsed> {
  match kind {
    ResponseKind::BeersWithBreweries => parse_beers_with_breweries(input),
    ResponseKind::BeersForBrewery(id) => parse_beers_for_brewery(input, id),
    ResponseKind::BreweriesForStyle(id) => parse_breweries_for_style(input, id),
    ResponseKind::Styles => parse_styles(input),
  }
}
