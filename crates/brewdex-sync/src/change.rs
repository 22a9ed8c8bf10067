//! Change classification between two evaluations of a live query.
//!
//! Positions follow batch-update conventions: deletions and updates name the
//! row's index in the old result, insertions the index in the new one.

use std::collections::HashMap;

use brewdex_core::record::{Record, RecordKey};

/// What a live query tells its callbacks after re-evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultChange {
  /// The change could not be expressed as row edits; redraw everything.
  Reload,
  Edits(Vec<RowEdit>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowEdit {
  Delete { old_index: usize },
  Insert { new_index: usize },
  /// Same identity at both positions, different contents.
  Update { old_index: usize, new_index: usize },
}

/// Compare two ordered result sets.
///
/// Returns `None` when nothing changed. Rows that survive must keep their
/// relative order for an edit list to be produced; a reordering yields
/// [`ResultChange::Reload`].
pub fn classify(old: &[Record], new: &[Record]) -> Option<ResultChange> {
  if old == new {
    return None;
  }

  let old_index: HashMap<RecordKey, usize> =
    old.iter().enumerate().map(|(i, r)| (r.key(), i)).collect();
  let new_index: HashMap<RecordKey, usize> =
    new.iter().enumerate().map(|(i, r)| (r.key(), i)).collect();

  let mut edits = Vec::new();

  for (i, record) in old.iter().enumerate() {
    if !new_index.contains_key(&record.key()) {
      edits.push(RowEdit::Delete { old_index: i });
    }
  }

  // Survivors in new order must appear at increasing old positions.
  let mut last_old = None;
  for (j, record) in new.iter().enumerate() {
    match old_index.get(&record.key()) {
      None => edits.push(RowEdit::Insert { new_index: j }),
      Some(&i) => {
        if last_old.is_some_and(|last| i < last) {
          return Some(ResultChange::Reload);
        }
        last_old = Some(i);
        if old[i] != *record {
          edits.push(RowEdit::Update { old_index: i, new_index: j });
        }
      }
    }
  }

  Some(ResultChange::Edits(edits))
}

#[cfg(test)]
mod tests {
  use brewdex_core::record::{Record, Style};
  use chrono::{TimeZone, Utc};

  use super::*;

  fn style(id: &str, name: &str) -> Record {
    Record::Style(Style {
      id:          id.into(),
      name:        name.into(),
      short_name:  name.into(),
      category:    String::new(),
      description: String::new(),
      brewery_ids: Default::default(),
      updated_at:  Utc.timestamp_opt(0, 0).unwrap(),
    })
  }

  #[test]
  fn identical_results_are_not_a_change() {
    let rows = vec![style("1", "Ale"), style("2", "Bock")];
    assert_eq!(classify(&rows, &rows.clone()), None);
  }

  #[test]
  fn insert_delete_and_update_positions() {
    let old = vec![style("1", "Ale"), style("2", "Bock"), style("3", "Cider")];
    let new = vec![style("1", "Ale"), style("4", "Dunkel"), style("3", "Cyser")];

    assert_eq!(
      classify(&old, &new),
      Some(ResultChange::Edits(vec![
        RowEdit::Delete { old_index: 1 },
        RowEdit::Insert { new_index: 1 },
        RowEdit::Update { old_index: 2, new_index: 2 },
      ]))
    );
  }

  #[test]
  fn reordering_falls_back_to_reload() {
    let old = vec![style("1", "Ale"), style("2", "Bock")];
    let new = vec![style("2", "Bock"), style("1", "Ale")];
    assert_eq!(classify(&old, &new), Some(ResultChange::Reload));
  }

  #[test]
  fn clearing_everything_is_a_run_of_deletes() {
    let old = vec![style("1", "Ale"), style("2", "Bock")];
    assert_eq!(
      classify(&old, &[]),
      Some(ResultChange::Edits(vec![
        RowEdit::Delete { old_index: 0 },
        RowEdit::Delete { old_index: 1 },
      ]))
    );
  }
}
