//! [`SqliteStore`] — the SQLite implementation of [`CatalogStore`].

use std::path::Path;

use brewdex_core::{
  query::{Filter, RecordQuery, SortKey},
  record::{Record, RecordKind},
  store::{Batch, CatalogStore, DeletedCounts},
};
use rusqlite::{functions::FunctionFlags, types::Value};

use crate::{
  Result,
  encode::{
    BackRefs, RawBeer, RawBrewery, RawRows, RawStyle, encode_dt, encode_style_ids,
    table_name,
  },
  schema::{BEER_COLUMNS, BREWERY_COLUMNS, SCHEMA, STYLE_COLUMNS},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A brewdex catalog backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. All calls
/// are serialised on the connection's thread, so a reader never observes a
/// half-applied transaction.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        register_functions(conn)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run arbitrary SQL against the connection. Tests use this to install
  /// triggers that make a transaction fail halfway.
  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a `SELECT` over one table and read the back-reference pairs the
  /// decoded records need, all inside one connection call.
  async fn select(
    &self,
    kind: RecordKind,
    sql: String,
    params: Vec<Value>,
  ) -> Result<Vec<Record>> {
    let raw: RawRows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let params = rusqlite::params_from_iter(params);
        let rows = match kind {
          RecordKind::Beer => RawRows::Beers(
            stmt
              .query_map(params, RawBeer::from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?,
          ),
          RecordKind::Brewery => {
            let rows = stmt
              .query_map(params, RawBrewery::from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
            let beer_pairs = pairs(
              conn,
              "SELECT brewery_id, id FROM beers WHERE brewery_id IN ({keys})",
              &ids,
            )?;
            RawRows::Breweries(rows, BackRefs::from_pairs(beer_pairs, vec![]))
          }
          RecordKind::Style => {
            let rows = stmt
              .query_map(params, RawStyle::from_row)?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
            let style_pairs = pairs(
              conn,
              "SELECT style_id, brewery_id FROM beers WHERE style_id IN ({keys})
               UNION
               SELECT j.value, b.id FROM breweries b, json_each(b.style_ids) j
               WHERE j.value IN ({keys})",
              &ids,
            )?;
            RawRows::Styles(rows, BackRefs::from_pairs(vec![], style_pairs))
          }
        };
        Ok(rows)
      })
      .await?;

    raw.into_records()
  }
}

/// Keys bound per back-reference lookup, well under SQLite's variable limit.
const KEYS_PER_LOOKUP: usize = 500;

/// Read `(key, value)` pairs for `keys` only. Every `{keys}` in `sql` becomes
/// the same numbered placeholder list, so `keys` is bound once per chunk.
fn pairs(
  conn: &rusqlite::Connection,
  sql: &str,
  keys: &[&str],
) -> rusqlite::Result<Vec<(String, String)>> {
  let mut out = Vec::new();
  for chunk in keys.chunks(KEYS_PER_LOOKUP) {
    let placeholders = (1..=chunk.len())
      .map(|i| format!("?{i}"))
      .collect::<Vec<_>>()
      .join(", ");
    let mut stmt = conn.prepare(&sql.replace("{keys}", &placeholders))?;
    let rows = stmt.query_map(rusqlite::params_from_iter(chunk), |row| {
      Ok((row.get(0)?, row.get(1)?))
    })?;
    for row in rows {
      out.push(row?);
    }
  }
  Ok(out)
}

/// `fold_case(text)`: Unicode lowercase, matching how live queries compare
/// names in memory. SQLite's own `lower()` and `LIKE` only fold ASCII.
fn register_functions(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
  conn.create_scalar_function(
    "fold_case",
    1,
    FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
    |ctx| {
      let text: Option<String> = ctx.get(0)?;
      Ok(text.map(|t| t.to_lowercase()))
    },
  )
}

// ─── Statement building ──────────────────────────────────────────────────────

fn columns(kind: RecordKind) -> &'static str {
  match kind {
    RecordKind::Beer => BEER_COLUMNS,
    RecordKind::Brewery => BREWERY_COLUMNS,
    RecordKind::Style => STYLE_COLUMNS,
  }
}

/// `INSERT OR REPLACE` statement plus bound values for one record.
fn upsert(record: &Record) -> Result<(String, Vec<Value>)> {
  let kind = record.kind();
  let values: Vec<Value> = match record {
    Record::Beer(b) => vec![
      b.id.clone().into(),
      b.name.clone().into(),
      b.description.clone().into(),
      b.abv.clone().into(),
      b.ibu.clone().into(),
      b.brewery_id.clone().into(),
      b.style_id.clone().into(),
      b.image_url.clone().into(),
      b.is_organic.into(),
      b.favorite.into(),
      b.tasting_notes.clone().into(),
      encode_dt(b.updated_at).into(),
    ],
    Record::Brewery(b) => vec![
      b.id.clone().into(),
      b.name.clone().into(),
      b.description.clone().into(),
      b.website.clone().into(),
      b.image_url.clone().into(),
      b.is_organic.into(),
      b.open_to_public.into(),
      b.favorite.into(),
      b.coordinates.map(|c| c.latitude).into(),
      b.coordinates.map(|c| c.longitude).into(),
      encode_style_ids(&b.style_ids)?.into(),
      encode_dt(b.updated_at).into(),
    ],
    Record::Style(s) => vec![
      s.id.clone().into(),
      s.name.clone().into(),
      s.short_name.clone().into(),
      s.category.clone().into(),
      s.description.clone().into(),
      encode_dt(s.updated_at).into(),
    ],
  };

  let placeholders = vec!["?"; values.len()].join(", ");
  let sql = format!(
    "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders})",
    table_name(kind),
    columns(kind),
  );
  Ok((sql, values))
}

/// Translate a [`RecordQuery`] into a `SELECT` and its bound values.
fn select_sql(query: &RecordQuery) -> (String, Vec<Value>) {
  let kind = query.kind;
  let table = table_name(kind);
  let mut conds: Vec<String> = vec![];
  let mut params: Vec<Value> = vec![];

  // A filter that cannot apply to this kind matches nothing.
  match (&query.filter, kind) {
    (Filter::All, _) => {}
    (Filter::BreweryId(id), RecordKind::Beer) => {
      conds.push("brewery_id = ?".into());
      params.push(id.clone().into());
    }
    (Filter::BreweryId(id), RecordKind::Brewery)
    | (Filter::StyleId(id), RecordKind::Style) => {
      conds.push("id = ?".into());
      params.push(id.clone().into());
    }
    (Filter::StyleId(id), RecordKind::Beer) => {
      conds.push("style_id = ?".into());
      params.push(id.clone().into());
    }
    (Filter::BreweriesWithStyle(style), RecordKind::Brewery) => {
      conds.push(
        "(id IN (SELECT brewery_id FROM beers WHERE style_id = ?)
          OR EXISTS (SELECT 1 FROM json_each(breweries.style_ids) j WHERE j.value = ?))"
          .into(),
      );
      params.push(style.clone().into());
      params.push(style.clone().into());
    }
    (Filter::NameContains(text), _) => {
      conds.push("fold_case(name) LIKE ? ESCAPE '\\'".into());
      params.push(like_pattern(&text.to_lowercase()).into());
    }
    (Filter::Favorites, RecordKind::Beer | RecordKind::Brewery) => {
      conds.push("favorite = 1".into());
    }
    _ => conds.push("0".into()),
  }

  if query.organic_only && kind != RecordKind::Style {
    conds.push("is_organic = 1".into());
  }

  let where_clause = if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  };

  let direction = if query.sort.ascending { "ASC" } else { "DESC" };
  let order = match query.sort.key {
    SortKey::Name => format!("name COLLATE NOCASE {direction}, id {direction}"),
    SortKey::Id => format!("id {direction}"),
    SortKey::UpdatedAt => format!("updated_at {direction}, id {direction}"),
  };

  let mut sql = format!(
    "SELECT {} FROM {table} {where_clause} ORDER BY {order}",
    columns(kind)
  );
  if let Some(limit) = query.limit {
    sql.push_str(" LIMIT ?");
    params.push((limit as i64).into());
  }
  (sql, params)
}

/// `%text%` with LIKE wildcards in `text` escaped.
fn like_pattern(text: &str) -> String {
  let mut escaped = String::with_capacity(text.len() + 2);
  escaped.push('%');
  for c in text.chars() {
    if matches!(c, '%' | '_' | '\\') {
      escaped.push('\\');
    }
    escaped.push(c);
  }
  escaped.push('%');
  escaped
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  type Error = crate::Error;

  async fn commit(&self, batch: &Batch) -> Result<()> {
    let statements = batch
      .records
      .iter()
      .map(upsert)
      .collect::<Result<Vec<_>>>()?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (sql, values) in statements {
          tx.execute(&sql, rusqlite::params_from_iter(values))?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn delete_all(&self) -> Result<DeletedCounts> {
    let counts = self
      .conn
      .call(|conn| {
        let tx = conn.transaction()?;
        let mut counts = DeletedCounts::new();
        for kind in [RecordKind::Beer, RecordKind::Brewery, RecordKind::Style] {
          let removed =
            tx.execute(&format!("DELETE FROM {}", table_name(kind)), [])?;
          counts.insert(kind, removed);
        }
        tx.commit()?;
        Ok(counts)
      })
      .await?;
    Ok(counts)
  }

  async fn get(&self, kind: RecordKind, id: &str) -> Result<Option<Record>> {
    let sql = format!(
      "SELECT {} FROM {} WHERE id = ?",
      columns(kind),
      table_name(kind)
    );
    let mut records = self.select(kind, sql, vec![id.to_owned().into()]).await?;
    Ok(records.pop())
  }

  async fn query(&self, query: &RecordQuery) -> Result<Vec<Record>> {
    let (sql, params) = select_sql(query);
    self.select(query.kind, sql, params).await
  }

  async fn count(&self, kind: RecordKind) -> Result<usize> {
    let sql = format!("SELECT COUNT(*) FROM {}", table_name(kind));
    let count: i64 = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get(0))?))
      .await?;
    Ok(count as usize)
  }
}
