//! Record designers: drafts in, complete records out.
//!
//! Designing is pure and total. Missing text becomes
//! [`NO_INFORMATION`], missing numeric strings become [`NOT_AVAILABLE`],
//! missing flags become `false`. The result goes to a [`RecordSink`]; designers
//! never see the store.

use std::{collections::BTreeSet, future::Future};

use brewdex_core::{
  draft::{BeerDraft, BreweryDraft, Draft, StyleDraft},
  record::{Beer, Brewery, NO_INFORMATION, NOT_AVAILABLE, Record, Style},
};
use chrono::{DateTime, Utc};

use crate::{CreationQueue, Result};

/// Anything that accepts designed records. The creation queue is the
/// production sink.
pub trait RecordSink: Send + Sync {
  fn submit(&self, record: Record) -> impl Future<Output = Result<()>> + Send + '_;
}

impl RecordSink for CreationQueue {
  async fn submit(&self, record: Record) -> Result<()> { CreationQueue::submit(self, record).await }
}

/// Design `draft` stamped with the current time.
///
/// `context_id` is the query-specific identifier the response was fetched
/// for: the brewery of a beer, or the style a brewery was discovered under.
/// Identifiers already on the draft take precedence.
pub fn design(draft: Draft, context_id: Option<&str>) -> Record {
  design_at(draft, context_id, Utc::now())
}

pub fn design_at(draft: Draft, context_id: Option<&str>, now: DateTime<Utc>) -> Record {
  match draft {
    Draft::Beer(d) => Record::Beer(beer(d, context_id, now)),
    Draft::Brewery(d) => Record::Brewery(brewery(d, context_id, now)),
    Draft::Style(d) => Record::Style(style(d, now)),
  }
}

/// Design `draft` and hand it to `sink`.
pub async fn design_and_submit<K: RecordSink>(
  sink: &K,
  draft: Draft,
  context_id: Option<&str>,
) -> Result<()> {
  sink.submit(design(draft, context_id)).await
}

fn or_no_information(value: Option<String>) -> String {
  value.unwrap_or_else(|| NO_INFORMATION.to_string())
}

fn or_not_available(value: Option<String>) -> String {
  value.unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn beer(d: BeerDraft, context_id: Option<&str>, now: DateTime<Utc>) -> Beer {
  Beer {
    brewery_id:    d
      .brewery_id
      .or_else(|| context_id.map(str::to_string))
      .unwrap_or_default(),
    id:            d.id,
    name:          d.name,
    description:   or_no_information(d.description),
    abv:           or_not_available(d.abv),
    ibu:           or_not_available(d.ibu),
    style_id:      d.style_id,
    image_url:     d.image_url,
    is_organic:    d.is_organic.unwrap_or(false),
    favorite:      false,
    tasting_notes: String::new(),
    updated_at:    now,
  }
}

fn brewery(d: BreweryDraft, context_id: Option<&str>, now: DateTime<Utc>) -> Brewery {
  let style_ids: BTreeSet<String> = d
    .style_id
    .into_iter()
    .chain(context_id.map(str::to_string))
    .collect();

  Brewery {
    id: d.id,
    name: d.name,
    description: or_no_information(d.description),
    website: or_no_information(d.website),
    image_url: d.image_url,
    is_organic: d.is_organic.unwrap_or(false),
    open_to_public: d.open_to_public.unwrap_or(false),
    favorite: false,
    coordinates: d.coordinates,
    style_ids,
    beer_ids: BTreeSet::new(),
    updated_at: now,
  }
}

fn style(d: StyleDraft, now: DateTime<Utc>) -> Style {
  Style {
    short_name:  d.short_name.unwrap_or_else(|| d.name.clone()),
    id:          d.id,
    name:        d.name,
    category:    or_no_information(d.category),
    description: or_no_information(d.description),
    brewery_ids: BTreeSet::new(),
    updated_at:  now,
  }
}
