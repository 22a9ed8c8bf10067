//! Sub-document validation and draft extraction.
//!
//! Pipeline:
//!   raw &str
//!     └─ envelope()              → Vec<Value>  (top-level failure is fatal)
//!          └─ per sub-document   → Result<Vec<Draft>, reason>
//!               ├─ Ok  → drafts appended
//!               └─ Err → Rejection recorded, next sub-document

use brewdex_core::{
  draft::{BeerDraft, BreweryDraft, Draft, StyleDraft},
  record::{Coordinates, RecordKind},
};
use serde_json::Value;

use crate::{
  Parsed, Rejection, Result,
  fields::{Object, array, envelope, flag, image, number, object, required, text},
};

type Reason = String;

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Run `extract` over every sub-document, collecting drafts and rejections.
fn each_document<F>(input: &str, kind: RecordKind, mut extract: F) -> Result<Parsed>
where
  F: FnMut(&Object) -> std::result::Result<Vec<Draft>, Reason>,
{
  let mut parsed = Parsed::default();

  for (index, doc) in envelope(input)?.iter().enumerate() {
    let Value::Object(obj) = doc else {
      parsed.rejected.push(Rejection {
        index,
        kind,
        id: None,
        reason: "sub-document is not an object".into(),
      });
      continue;
    };

    match extract(obj) {
      Ok(drafts) => parsed.drafts.extend(drafts),
      Err(reason) => parsed.rejected.push(Rejection {
        index,
        kind,
        id: text(obj, "id"),
        reason,
      }),
    }
  }

  Ok(parsed)
}

// ─── Parsers ─────────────────────────────────────────────────────────────────

pub(crate) fn beers_with_breweries(input: &str) -> Result<Parsed> {
  each_document(input, RecordKind::Beer, |doc| {
    let mut beer = beer_draft(doc)?;
    let brewery = primary_brewery(doc)?;
    beer.brewery_id = Some(brewery.id.clone());

    let mut drafts = vec![Draft::Beer(beer), Draft::Brewery(brewery)];
    drafts.extend(embedded_style(doc).map(Draft::Style));
    Ok(drafts)
  })
}

pub(crate) fn beers_for_brewery(input: &str, brewery_id: &str) -> Result<Parsed> {
  each_document(input, RecordKind::Beer, |doc| {
    let mut beer = beer_draft(doc)?;
    beer.brewery_id = Some(brewery_id.to_string());

    let mut drafts = vec![Draft::Beer(beer)];
    drafts.extend(embedded_style(doc).map(Draft::Style));
    Ok(drafts)
  })
}

pub(crate) fn breweries_for_style(input: &str, style_id: &str) -> Result<Parsed> {
  each_document(input, RecordKind::Brewery, |doc| {
    let mut beer = beer_draft(doc)?;
    let mut brewery = primary_brewery(doc)?;
    brewery.style_id = Some(style_id.to_string());
    beer.brewery_id = Some(brewery.id.clone());
    Ok(vec![Draft::Brewery(brewery), Draft::Beer(beer)])
  })
}

pub(crate) fn styles(input: &str) -> Result<Parsed> {
  each_document(input, RecordKind::Style, |doc| {
    Ok(vec![Draft::Style(style_draft(doc)?)])
  })
}

// ─── Sub-document extraction ─────────────────────────────────────────────────

fn beer_draft(doc: &Object) -> std::result::Result<BeerDraft, Reason> {
  Ok(BeerDraft {
    id:          required(doc, "id")?,
    name:        required(doc, "name")?,
    style_id:    required(doc, "styleId")?,
    brewery_id:  None,
    description: text(doc, "description"),
    abv:         text(doc, "abv"),
    ibu:         text(doc, "ibu"),
    image_url:   image(doc, "labels"),
    is_organic:  flag(doc, "isOrganic"),
  })
}

fn style_draft(doc: &Object) -> std::result::Result<StyleDraft, Reason> {
  Ok(StyleDraft {
    id:          required(doc, "id")?,
    name:        required(doc, "name")?,
    short_name:  text(doc, "shortName"),
    category:    object(doc, "category").and_then(|c| text(c, "name")),
    description: text(doc, "description"),
  })
}

/// The beer's embedded `style` object, when it is complete enough to store.
/// An incomplete embedded style never rejects the beer itself.
fn embedded_style(doc: &Object) -> Option<StyleDraft> {
  object(doc, "style").and_then(|s| style_draft(s).ok())
}

/// Pick the single brewery kept for a beer.
///
/// Breweries are scanned in payload order; the first one that has a
/// non-empty id and name and a location flagged primary and open to the
/// public, with both coordinates, wins. Later candidates are discarded.
fn primary_brewery(doc: &Object) -> std::result::Result<BreweryDraft, Reason> {
  let breweries = array(doc, "breweries")
    .ok_or_else(|| "beer carries no `breweries` list".to_string())?;

  breweries
    .iter()
    .filter_map(Value::as_object)
    .find_map(|brewery| {
      let id = text(brewery, "id")?;
      let name = text(brewery, "name")?;
      let location = array(brewery, "locations")?
        .iter()
        .filter_map(Value::as_object)
        .find(|loc| {
          flag(loc, "isPrimary") == Some(true)
            && flag(loc, "openToPublic") == Some(true)
            && coordinates(loc).is_some()
        })?;

      Some(BreweryDraft {
        id,
        name,
        description: text(brewery, "description"),
        website: text(brewery, "website").or_else(|| text(location, "website")),
        image_url: image(brewery, "images"),
        is_organic: flag(brewery, "isOrganic"),
        open_to_public: Some(true),
        coordinates: coordinates(location),
        style_id: None,
      })
    })
    .ok_or_else(|| {
      "no brewery with a named, primary, open-to-public location with coordinates"
        .to_string()
    })
}

fn coordinates(location: &Object) -> Option<Coordinates> {
  Coordinates::from_parts(number(location, "latitude"), number(location, "longitude"))
}
