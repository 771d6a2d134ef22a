//! SQLite-backed store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deals_core::{
    AppId, CacheEntry, CacheStore, EntityType, FetchError, GameMetadata, Payload, PriceSnapshot,
    ProviderKind, Result, Retention,
};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

/// SQLite-backed store for game metadata and price rows.
///
/// The store persists across runs. A single `Mutex<Connection>` guards all
/// access; the engine's batch writer is the only concurrent-era caller of the
/// write path, so the store itself never sees concurrent writers.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation
    /// fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| FetchError::Store(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| FetchError::Store(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FetchError::Store(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS game_metadata (
                app_id TEXT PRIMARY KEY,
                name TEXT NOT NULL CHECK (name <> ''),
                app_type TEXT NOT NULL,
                is_free INTEGER NOT NULL,
                is_dlc INTEGER NOT NULL,
                categories_json TEXT NOT NULL,
                price_json TEXT,
                source TEXT NOT NULL,
                lookup_method TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT,
                permanent INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| FetchError::Store(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS price_history (
                app_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                lowest_amount REAL NOT NULL CHECK (lowest_amount >= 0.0),
                formatted TEXT NOT NULL,
                shop TEXT NOT NULL,
                currency TEXT NOT NULL,
                lookup_method TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT,
                permanent INTEGER NOT NULL,
                PRIMARY KEY (app_id, provider)
            )",
            [],
        )
        .map_err(|e| FetchError::Store(e.to_string()))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_price_history_app
             ON price_history(app_id)",
            [],
        )
        .map_err(|e| FetchError::Store(e.to_string()))?;

        debug!("SQLite store schema initialized");
        Ok(())
    }

    /// Upsert one entry using the given connection (plain or transactional).
    fn upsert_in(conn: &Connection, entry: &CacheEntry) -> Result<()> {
        let app_id = entry.app_id.as_str();
        let cached_at = entry.cached_at.to_rfc3339();
        let expires_at = entry.expires_at.map(|t| t.to_rfc3339());
        let permanent = entry.retention == Retention::Permanent;

        match &entry.payload {
            Payload::Metadata(meta) => {
                let categories_json = serde_json::to_string(&meta.categories)
                    .map_err(|e| FetchError::Parse(e.to_string()))?;
                let price_json = meta
                    .price
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| FetchError::Parse(e.to_string()))?;

                conn.execute(
                    "INSERT OR REPLACE INTO game_metadata
                     (app_id, name, app_type, is_free, is_dlc, categories_json, price_json,
                      source, lookup_method, cached_at, expires_at, permanent)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        app_id,
                        meta.name,
                        meta.app_type,
                        meta.is_free,
                        meta.is_dlc,
                        categories_json,
                        price_json,
                        entry.source.as_str(),
                        entry.method.as_str(),
                        cached_at,
                        expires_at,
                        permanent
                    ],
                )
                .map_err(|e| FetchError::Store(e.to_string()))?;
            }
            Payload::Price(price) => {
                conn.execute(
                    "INSERT OR REPLACE INTO price_history
                     (app_id, provider, lowest_amount, formatted, shop, currency,
                      lookup_method, cached_at, expires_at, permanent)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    params![
                        app_id,
                        entry.source.as_str(),
                        price.amount,
                        price.formatted,
                        price.shop,
                        price.currency,
                        entry.method.as_str(),
                        cached_at,
                        expires_at,
                        permanent
                    ],
                )
                .map_err(|e| FetchError::Store(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| FetchError::Parse(format!("bad timestamp {s}: {e}")))
    }

    fn parse_retention(permanent: bool) -> Retention {
        if permanent {
            Retention::Permanent
        } else {
            Retention::Ttl
        }
    }
}

/// Raw metadata row before conversion into a [`CacheEntry`].
struct MetadataRow {
    name: String,
    app_type: String,
    is_free: bool,
    is_dlc: bool,
    categories_json: String,
    price_json: Option<String>,
    source: String,
    lookup_method: String,
    cached_at: String,
    expires_at: Option<String>,
    permanent: bool,
}

/// Raw price row before conversion into a [`CacheEntry`].
struct PriceRow {
    lowest_amount: f64,
    formatted: String,
    shop: String,
    currency: String,
    lookup_method: String,
    cached_at: String,
    expires_at: Option<String>,
    permanent: bool,
}

#[async_trait]
impl CacheStore for SqliteStore {
    #[instrument(skip(self), fields(app_id = %app_id))]
    async fn get_metadata(&self, app_id: &AppId) -> Result<Option<CacheEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FetchError::Store(e.to_string()))?;

        let row = conn
            .query_row(
                "SELECT name, app_type, is_free, is_dlc, categories_json, price_json,
                        source, lookup_method, cached_at, expires_at, permanent
                 FROM game_metadata WHERE app_id = ?1",
                params![app_id.as_str()],
                |row| {
                    Ok(MetadataRow {
                        name: row.get(0)?,
                        app_type: row.get(1)?,
                        is_free: row.get(2)?,
                        is_dlc: row.get(3)?,
                        categories_json: row.get(4)?,
                        price_json: row.get(5)?,
                        source: row.get(6)?,
                        lookup_method: row.get(7)?,
                        cached_at: row.get(8)?,
                        expires_at: row.get(9)?,
                        permanent: row.get(10)?,
                    })
                },
            )
            .optional()
            .map_err(|e| FetchError::Store(e.to_string()))?;

        let Some(row) = row else {
            debug!("No cached metadata found");
            return Ok(None);
        };

        let categories: Vec<String> = serde_json::from_str(&row.categories_json)
            .map_err(|e| FetchError::Parse(e.to_string()))?;
        let price: Option<PriceSnapshot> = row
            .price_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        Ok(Some(CacheEntry {
            app_id: app_id.clone(),
            payload: Payload::Metadata(GameMetadata {
                name: row.name,
                app_type: row.app_type,
                is_free: row.is_free,
                is_dlc: row.is_dlc,
                categories,
                price,
            }),
            source: row.source.parse()?,
            method: row.lookup_method.parse()?,
            cached_at: Self::parse_timestamp(&row.cached_at)?,
            expires_at: row
                .expires_at
                .as_deref()
                .map(Self::parse_timestamp)
                .transpose()?,
            retention: Self::parse_retention(row.permanent),
        }))
    }

    #[instrument(skip(self), fields(app_id = %app_id, provider = %provider))]
    async fn get_price(
        &self,
        app_id: &AppId,
        provider: ProviderKind,
    ) -> Result<Option<CacheEntry>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FetchError::Store(e.to_string()))?;

        let row = conn
            .query_row(
                "SELECT lowest_amount, formatted, shop, currency, lookup_method,
                        cached_at, expires_at, permanent
                 FROM price_history WHERE app_id = ?1 AND provider = ?2",
                params![app_id.as_str(), provider.as_str()],
                |row| {
                    Ok(PriceRow {
                        lowest_amount: row.get(0)?,
                        formatted: row.get(1)?,
                        shop: row.get(2)?,
                        currency: row.get(3)?,
                        lookup_method: row.get(4)?,
                        cached_at: row.get(5)?,
                        expires_at: row.get(6)?,
                        permanent: row.get(7)?,
                    })
                },
            )
            .optional()
            .map_err(|e| FetchError::Store(e.to_string()))?;

        let Some(row) = row else {
            debug!("No cached price found");
            return Ok(None);
        };

        Ok(Some(CacheEntry {
            app_id: app_id.clone(),
            payload: Payload::Price(PriceSnapshot {
                amount: row.lowest_amount,
                formatted: row.formatted,
                shop: row.shop,
                currency: row.currency,
            }),
            source: provider,
            method: row.lookup_method.parse()?,
            cached_at: Self::parse_timestamp(&row.cached_at)?,
            expires_at: row
                .expires_at
                .as_deref()
                .map(Self::parse_timestamp)
                .transpose()?,
            retention: Self::parse_retention(row.permanent),
        }))
    }

    #[instrument(skip(self), fields(app_id = %app_id, entity = %entity))]
    async fn is_fresh(
        &self,
        app_id: &AppId,
        entity: EntityType,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FetchError::Store(e.to_string()))?;

        let sql = match entity {
            EntityType::Metadata => {
                "SELECT EXISTS (
                     SELECT 1 FROM game_metadata
                     WHERE app_id = ?1 AND (permanent = 1 OR expires_at > ?2)
                 )"
            }
            EntityType::Price => {
                "SELECT EXISTS (
                     SELECT 1 FROM price_history
                     WHERE app_id = ?1 AND (permanent = 1 OR expires_at > ?2)
                 )"
            }
        };

        conn.query_row(sql, params![app_id.as_str(), now.to_rfc3339()], |row| {
            row.get::<_, bool>(0)
        })
        .map_err(|e| FetchError::Store(e.to_string()))
    }

    #[instrument(skip(self, entries), fields(count = entries.len()))]
    async fn upsert_batch(&self, entries: &[CacheEntry]) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FetchError::Store(e.to_string()))?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| FetchError::Store(e.to_string()))?;

        for entry in entries {
            // Any failure drops the transaction, rolling back the whole batch.
            Self::upsert_in(&tx, entry)?;
        }

        tx.commit().map_err(|e| FetchError::Store(e.to_string()))?;
        debug!("Committed batch of {} entries", entries.len());
        Ok(entries.len())
    }

    #[instrument(skip(self, entry), fields(app_id = %entry.app_id))]
    async fn upsert_one(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FetchError::Store(e.to_string()))?;
        Self::upsert_in(&conn, entry)
    }

    #[instrument(skip(self))]
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now.to_rfc3339();
        let conn = self
            .conn
            .lock()
            .map_err(|e| FetchError::Store(e.to_string()))?;

        let mut total = 0usize;
        total += conn
            .execute(
                "DELETE FROM game_metadata
                 WHERE permanent = 0 AND expires_at IS NOT NULL AND expires_at <= ?1",
                params![cutoff],
            )
            .map_err(|e| FetchError::Store(e.to_string()))?;
        total += conn
            .execute(
                "DELETE FROM price_history
                 WHERE permanent = 0 AND expires_at IS NOT NULL AND expires_at <= ?1",
                params![cutoff],
            )
            .map_err(|e| FetchError::Store(e.to_string()))?;

        if total > 0 {
            debug!("Purged {} expired entries", total);
        }
        Ok(total)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FetchError::Store(e.to_string()))?;

        conn.execute("DELETE FROM game_metadata", [])
            .map_err(|e| FetchError::Store(e.to_string()))?;
        conn.execute("DELETE FROM price_history", [])
            .map_err(|e| FetchError::Store(e.to_string()))?;

        debug!("Cleared all store entries");
        Ok(())
    }
}
