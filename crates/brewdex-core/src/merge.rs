//! Update-in-place merge rule applied by the creation queue.
//!
//! Incoming fields that carry information overwrite the stored value; empty,
//! absent, or placeholder fields leave the stored value alone. Booleans only
//! ever turn on through a merge; turning a flag off is an explicit edit.

use crate::{
  Error, Result,
  record::{Beer, Brewery, NO_INFORMATION, NOT_AVAILABLE, Record, Style},
};

/// Merge `incoming` into `existing`. Both must be the same kind.
pub fn merge(existing: &mut Record, incoming: Record) -> Result<()> {
  match (existing, incoming) {
    (Record::Beer(old), Record::Beer(new)) => merge_beer(old, new),
    (Record::Brewery(old), Record::Brewery(new)) => merge_brewery(old, new),
    (Record::Style(old), Record::Style(new)) => merge_style(old, new),
    (existing, incoming) => {
      return Err(Error::KindMismatch {
        expected: existing.kind(),
        actual:   incoming.kind(),
      });
    }
  }
  Ok(())
}

/// True when `value` says something beyond a designer default.
pub fn is_informative(value: &str) -> bool {
  let trimmed = value.trim();
  !trimmed.is_empty() && trimmed != NO_INFORMATION && trimmed != NOT_AVAILABLE
}

fn text(old: &mut String, new: String) {
  if is_informative(&new) {
    *old = new;
  }
}

fn opt_text(old: &mut Option<String>, new: Option<String>) {
  if let Some(new) = new
    && is_informative(&new)
  {
    *old = Some(new);
  }
}

fn flag(old: &mut bool, new: bool) { *old |= new; }

fn merge_beer(old: &mut Beer, new: Beer) {
  text(&mut old.name, new.name);
  text(&mut old.description, new.description);
  text(&mut old.abv, new.abv);
  text(&mut old.ibu, new.ibu);
  text(&mut old.brewery_id, new.brewery_id);
  text(&mut old.style_id, new.style_id);
  opt_text(&mut old.image_url, new.image_url);
  flag(&mut old.is_organic, new.is_organic);
  flag(&mut old.favorite, new.favorite);
  text(&mut old.tasting_notes, new.tasting_notes);
  old.updated_at = old.updated_at.max(new.updated_at);
}

fn merge_brewery(old: &mut Brewery, new: Brewery) {
  text(&mut old.name, new.name);
  text(&mut old.description, new.description);
  text(&mut old.website, new.website);
  opt_text(&mut old.image_url, new.image_url);
  flag(&mut old.is_organic, new.is_organic);
  flag(&mut old.open_to_public, new.open_to_public);
  flag(&mut old.favorite, new.favorite);
  if new.coordinates.is_some() {
    old.coordinates = new.coordinates;
  }
  old.style_ids.extend(new.style_ids);
  old.updated_at = old.updated_at.max(new.updated_at);
}

fn merge_style(old: &mut Style, new: Style) {
  text(&mut old.name, new.name);
  text(&mut old.short_name, new.short_name);
  text(&mut old.category, new.category);
  text(&mut old.description, new.description);
  old.updated_at = old.updated_at.max(new.updated_at);
}
