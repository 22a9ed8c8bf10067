//! SQL schema for the brewdex SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Back-references (brewery -> beers, style -> breweries) are not stored;
-- they are recomputed from the forward keys below on every read.
CREATE TABLE IF NOT EXISTS beers (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    description   TEXT NOT NULL,
    abv           TEXT NOT NULL,
    ibu           TEXT NOT NULL,
    brewery_id    TEXT NOT NULL,   -- soft key, not enforced
    style_id      TEXT NOT NULL,   -- soft key, not enforced
    image_url     TEXT,
    is_organic    INTEGER NOT NULL DEFAULT 0,
    favorite      INTEGER NOT NULL DEFAULT 0,
    tasting_notes TEXT NOT NULL DEFAULT '',
    updated_at    TEXT NOT NULL    -- ISO 8601 UTC
);

CREATE TABLE IF NOT EXISTS breweries (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    description    TEXT NOT NULL,
    website        TEXT NOT NULL,
    image_url      TEXT,
    is_organic     INTEGER NOT NULL DEFAULT 0,
    open_to_public INTEGER NOT NULL DEFAULT 0,
    favorite       INTEGER NOT NULL DEFAULT 0,
    latitude       REAL,
    longitude      REAL,
    style_ids      TEXT NOT NULL DEFAULT '[]',   -- JSON array of style ids
    updated_at     TEXT NOT NULL,
    CHECK ((latitude IS NULL) = (longitude IS NULL))
);

CREATE TABLE IF NOT EXISTS styles (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    short_name  TEXT NOT NULL,
    category    TEXT NOT NULL,
    description TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS beers_brewery_idx ON beers(brewery_id);
CREATE INDEX IF NOT EXISTS beers_style_idx   ON beers(style_id);

PRAGMA user_version = 1;
";

pub const BEER_COLUMNS: &str = "id, name, description, abv, ibu, brewery_id, style_id, \
                                image_url, is_organic, favorite, tasting_notes, updated_at";

pub const BREWERY_COLUMNS: &str = "id, name, description, website, image_url, is_organic, \
                                   open_to_public, favorite, latitude, longitude, style_ids, \
                                   updated_at";

pub const STYLE_COLUMNS: &str = "id, name, short_name, category, description, updated_at";
