//! `brewdex` — command-line front end for the brewery catalog.
//!
//! Imports saved BreweryDB-style responses into a local SQLite catalog, lists
//! and edits records, and prints map annotations.
//!
//! # Usage
//!
//! ```
//! brewdex import beers beers.json
//! brewdex import breweries-for-style ipa.json --context 30
//! brewdex list brewery --style 30
//! brewdex map --style 30
//! ```

mod config;

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use brewdex_core::{
  query::Filter,
  record::{Record, RecordKind},
  store::CatalogStore,
};
use brewdex_parse::ResponseKind;
use brewdex_store_sqlite::SqliteStore;
use brewdex_sync::{Catalog, GeoAnnotation, MapConfig, MapTarget, Selection};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "brewdex", author, version, about = "Local brewery catalog")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "brewdex.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Parse a saved response and store its records.
  Import {
    shape:   Shape,
    file:    PathBuf,
    /// Brewery or style ID the response was fetched for.
    #[arg(long)]
    context: Option<String>,
  },
  /// List stored records.
  List {
    kind:      Kind,
    #[arg(long)]
    favorites: bool,
    #[arg(long, conflicts_with = "style")]
    brewery:   Option<String>,
    #[arg(long)]
    style:     Option<String>,
    /// Case-insensitive substring of the name.
    #[arg(long)]
    search:    Option<String>,
    #[arg(long)]
    organic:   bool,
  },
  /// Mark a beer or brewery as favorite.
  Favorite {
    kind: Kind,
    id:   String,
    /// Clear the flag instead.
    #[arg(long)]
    off:  bool,
  },
  /// Replace a beer's tasting notes.
  Notes { beer_id: String, text: String },
  /// Print map annotations as JSON lines.
  Map {
    #[arg(long, conflicts_with = "style")]
    brewery: Option<String>,
    #[arg(long)]
    style:   Option<String>,
    #[arg(long)]
    max:     Option<usize>,
  },
  /// Print the number of stored records per kind.
  Counts,
  /// Delete every record.
  Reset,
}

/// Response shapes accepted by `import`.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Shape {
  Beers,
  BeersForBrewery,
  BreweriesForStyle,
  Styles,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Kind {
  Beer,
  Brewery,
  Style,
}

impl From<Kind> for RecordKind {
  fn from(kind: Kind) -> Self {
    match kind {
      Kind::Beer => RecordKind::Beer,
      Kind::Brewery => RecordKind::Brewery,
      Kind::Style => RecordKind::Style,
    }
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = AppConfig::load(&cli.config)?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  let catalog = Catalog::start(store, cfg.queue.clone());

  let outcome = run(&catalog, &cfg, cli.command).await;
  catalog.shutdown().await.context("failed to flush pending records")?;
  outcome
}

async fn run(catalog: &Catalog<SqliteStore>, cfg: &AppConfig, command: Command) -> anyhow::Result<()> {
  match command {
    Command::Import { shape, file, context } => import(catalog, shape, &file, context).await,
    Command::List { kind, favorites, brewery, style, search, organic } => {
      let filter = match (favorites, brewery, style) {
        (true, _, _) => Filter::Favorites,
        (false, Some(id), _) => Filter::BreweryId(id),
        (false, None, Some(id)) if matches!(kind, Kind::Brewery) => Filter::BreweriesWithStyle(id),
        (false, None, Some(id)) => Filter::StyleId(id),
        (false, None, None) => Filter::All,
      };
      catalog.session().set_organic_only(organic);
      let query = catalog.live(kind.into(), filter).await?;
      if let Some(text) = search {
        query.set_search_text(text);
      }
      for record in query.visible() {
        println!("{}", line(&record));
      }
      Ok(())
    }
    Command::Favorite { kind, id, off } => {
      catalog.queue().set_favorite(kind.into(), &id, !off).await?;
      Ok(())
    }
    Command::Notes { beer_id, text } => {
      catalog.queue().set_tasting_notes(&beer_id, text).await?;
      Ok(())
    }
    Command::Map { brewery, style, max } => {
      let store = catalog.store();
      if let Some(id) = brewery {
        let Some(Record::Brewery(b)) = store.get(RecordKind::Brewery, &id).await? else {
          bail!("no brewery with id {id}");
        };
        catalog.session().select(Selection::Brewery(b));
      } else if let Some(id) = style {
        let Some(Record::Style(s)) = store.get(RecordKind::Style, &id).await? else {
          bail!("no style with id {id}");
        };
        catalog.session().select(Selection::Style(s));
      }
      let map_cfg = MapConfig { max_points: max.unwrap_or(cfg.map.max_points) };
      let strategy = catalog.map(&map_cfg).await?;
      strategy.render(&mut JsonLines);
      Ok(())
    }
    Command::Counts => {
      for kind in [RecordKind::Beer, RecordKind::Brewery, RecordKind::Style] {
        println!("{kind}\t{}", catalog.store().count(kind).await?);
      }
      Ok(())
    }
    Command::Reset => {
      let report = catalog.queue().delete_all().await?;
      for (kind, outcome) in &report.outcomes {
        match outcome {
          Ok(n) => println!("{kind}\tremoved {n}"),
          Err(e) => println!("{kind}\tfailed: {e}"),
        }
      }
      if !report.is_success() {
        bail!("delete-all failed; catalog left untouched");
      }
      Ok(())
    }
  }
}

async fn import(
  catalog: &Catalog<SqliteStore>,
  shape: Shape,
  file: &std::path::Path,
  context: Option<String>,
) -> anyhow::Result<()> {
  let kind = match (shape, context) {
    (Shape::Beers, _) => ResponseKind::BeersWithBreweries,
    (Shape::Styles, _) => ResponseKind::Styles,
    (Shape::BeersForBrewery, Some(id)) => ResponseKind::BeersForBrewery(id),
    (Shape::BreweriesForStyle, Some(id)) => ResponseKind::BreweriesForStyle(id),
    (shape, None) => bail!("{shape:?} responses need --context"),
  };

  let body = std::fs::read_to_string(file)
    .with_context(|| format!("reading response file {}", file.display()))?;
  let report = catalog.ingest(&body, &kind).await?;
  if !report.ok {
    bail!("{}: {}", file.display(), report.message);
  }

  catalog.queue().flush().await?;
  tracing::info!(file = %file.display(), "{}", report.message);
  Ok(())
}

fn line(record: &Record) -> String {
  match record {
    Record::Beer(b) => {
      let star = if b.favorite { "*" } else { " " };
      format!("{star} {}\t{}\tabv {}\tbrewery {}", b.id, b.name, b.abv, b.brewery_id)
    }
    Record::Brewery(b) => {
      let star = if b.favorite { "*" } else { " " };
      format!("{star} {}\t{}\t{} beer(s)", b.id, b.name, b.beer_ids.len())
    }
    Record::Style(s) => format!("  {}\t{}\t{} brewery(ies)", s.id, s.name, s.brewery_ids.len()),
  }
}

/// Writes one JSON object per annotation to stdout.
struct JsonLines;

impl MapTarget for JsonLines {
  fn draw(&mut self, annotations: &[GeoAnnotation]) {
    for annotation in annotations {
      match serde_json::to_string(annotation) {
        Ok(json) => println!("{json}"),
        Err(err) => tracing::warn!(brewery = %annotation.brewery_id, error = %err, "annotation not printable"),
      }
    }
  }
}
