//! Durable lookup cache on SQLite (WAL mode) with migration support.
//!
//! Writes come in two flavours:
//! - `create_*` is a plain INSERT used on a cache miss. When a concurrent
//!   writer got there first the uniqueness violation is swallowed and the
//!   winner's row is returned instead.
//! - `put_*` is a single upsert used on refresh. It only overwrites a row
//!   whose `last_verified` is not newer than the incoming one, so a late
//!   response cannot clobber a fresher entry.

use crate::cache::schema;
use crate::types::{AirportLocation, DataPath, GeocodeResult, GeocodedAddress, RouteDistance};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A cached value plus its bookkeeping columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub served_via: DataPath,
    pub last_verified: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub hits: u64,
}

impl<T> Cached<T> {
    /// Fresh while `now - last_verified < ttl`.
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.last_verified < ttl
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_verified
    }
}

/// Outcome of a first-time insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Created<T> {
    Inserted,
    /// Another writer created the row first; this is what it wrote.
    Existing(Cached<T>),
}

/// Bookkeeping for one write.
#[derive(Debug, Clone, Copy)]
pub struct WriteStamp {
    pub served_via: DataPath,
    pub verified_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl WriteStamp {
    pub fn new(served_via: DataPath, verified_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            served_via,
            verified_at,
            ttl,
        }
    }

    fn last_verified(&self) -> String {
        to_sql_time(&self.verified_at)
    }

    fn expires_at(&self) -> String {
        to_sql_time(&(self.verified_at + self.ttl))
    }
}

macro_rules! airport_params {
    ($loc:expr, $stamp:expr) => {
        params![
            $loc.airport_code,
            $loc.airport_name,
            $loc.city,
            $loc.country,
            $loc.latitude,
            $loc.longitude,
            $loc.formatted_address,
            $loc.place_id,
            $loc.timezone_id,
            $loc.timezone_name,
            $loc.utc_offset_seconds,
            $loc.elevation_meters,
            $stamp.served_via.to_string(),
            $stamp.last_verified(),
            $stamp.expires_at(),
        ]
    };
}

macro_rules! route_params {
    ($route:expr, $stamp:expr) => {
        params![
            $route.origin,
            $route.destination,
            $route.distance_meters,
            $route.great_circle_km,
            $route.estimated_flight_duration_minutes,
            $stamp.served_via.to_string(),
            $stamp.last_verified(),
            $stamp.expires_at(),
        ]
    };
}

const AIRPORT_COLUMNS: &str = "airport_code, airport_name, city, country, latitude, longitude,
     formatted_address, place_id, timezone_id, timezone_name, utc_offset_seconds,
     elevation_meters, served_via, last_verified, expires_at, cache_hits";

const ROUTE_COLUMNS: &str = "origin_airport, destination_airport, distance_meters, great_circle_km,
     estimated_duration_minutes, served_via, last_verified, expires_at, cache_hits";

const GEOCODE_COLUMNS: &str = "latitude, longitude, formatted_address, place_id, location_type,
     served_via, last_verified, expires_at, cache_hits";

/// The persistent lookup cache.
pub struct CacheStore {
    conn: Connection,
}

impl CacheStore {
    /// Open (or create) the cache at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // WAL lets readers proceed while another connection writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;

        let mut store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory cache (for testing).
    pub fn open_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        let mut store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&mut self) -> Result<(), CacheError> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating cache schema v{}", schema::SCHEMA_VERSION);
            self.conn.execute_batch(schema::CREATE_SCHEMA)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        } else {
            if version < 2 {
                info!("Migrating cache database v1 -> v2");
                self.conn.execute_batch(schema::MIGRATE_V1_TO_V2)?;
            }
            if version < 3 {
                info!("Migrating cache database v2 -> v3");
                self.conn.execute_batch(schema::MIGRATE_V2_TO_V3)?;
            }
            if version < schema::SCHEMA_VERSION {
                self.conn.execute(
                    "UPDATE schema_version SET version = ?1",
                    params![schema::SCHEMA_VERSION],
                )?;
            }
        }

        Ok(())
    }

    /// Current schema version (0 if uninitialized).
    pub fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Airport locations
    // -----------------------------------------------------------------------

    pub fn get_airport(&self, code: &str) -> Result<Option<Cached<AirportLocation>>, CacheError> {
        let sql =
            format!("SELECT {AIRPORT_COLUMNS} FROM airport_locations WHERE airport_code = ?1");
        let cached = self
            .conn
            .query_row(&sql, params![code], airport_from_row)
            .optional()?;
        Ok(cached)
    }

    pub fn create_airport(
        &self,
        location: &AirportLocation,
        stamp: WriteStamp,
    ) -> Result<Created<AirportLocation>, CacheError> {
        let sql = format!(
            "INSERT INTO airport_locations ({AIRPORT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0)"
        );
        let result = self.conn.execute(&sql, airport_params!(location, stamp));
        match result {
            Ok(_) => Ok(Created::Inserted),
            Err(e) if is_unique_violation(&e) => {
                debug!("airport {} created concurrently, re-reading", location.airport_code);
                self.reread(self.get_airport(&location.airport_code)?, e)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Insert or refresh. Returns `false` when a fresher row was kept.
    pub fn put_airport(
        &self,
        location: &AirportLocation,
        stamp: WriteStamp,
    ) -> Result<bool, CacheError> {
        let sql = format!(
            "INSERT INTO airport_locations ({AIRPORT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0)
             ON CONFLICT(airport_code) DO UPDATE SET
                airport_name = excluded.airport_name,
                city = excluded.city,
                country = excluded.country,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                formatted_address = excluded.formatted_address,
                place_id = excluded.place_id,
                timezone_id = excluded.timezone_id,
                timezone_name = excluded.timezone_name,
                utc_offset_seconds = excluded.utc_offset_seconds,
                elevation_meters = excluded.elevation_meters,
                served_via = excluded.served_via,
                last_verified = excluded.last_verified,
                expires_at = excluded.expires_at
             WHERE excluded.last_verified >= airport_locations.last_verified"
        );
        let changed = self.conn.execute(&sql, airport_params!(location, stamp))?;
        Ok(changed > 0)
    }

    pub fn record_airport_hit(&self, code: &str) -> Result<(), CacheError> {
        self.conn.execute(
            "UPDATE airport_locations SET cache_hits = cache_hits + 1 WHERE airport_code = ?1",
            params![code],
        )?;
        Ok(())
    }

    /// Every cached airport, fresh or not.
    pub fn all_airports(&self) -> Result<Vec<Cached<AirportLocation>>, CacheError> {
        let sql = format!("SELECT {AIRPORT_COLUMNS} FROM airport_locations ORDER BY airport_code");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], airport_from_row)?;

        let mut airports = Vec::new();
        for row in rows {
            airports.push(row?);
        }
        Ok(airports)
    }

    pub fn invalidate_airport(&self, code: &str) -> Result<bool, CacheError> {
        let n = self
            .conn
            .execute("DELETE FROM airport_locations WHERE airport_code = ?1", params![code])?;
        Ok(n > 0)
    }

    // -----------------------------------------------------------------------
    // Route distances
    // -----------------------------------------------------------------------

    pub fn get_route(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<Option<Cached<RouteDistance>>, CacheError> {
        let sql = format!(
            "SELECT {ROUTE_COLUMNS} FROM route_distances
             WHERE origin_airport = ?1 AND destination_airport = ?2"
        );
        let cached = self
            .conn
            .query_row(&sql, params![origin, destination], route_from_row)
            .optional()?;
        Ok(cached)
    }

    pub fn create_route(
        &self,
        route: &RouteDistance,
        stamp: WriteStamp,
    ) -> Result<Created<RouteDistance>, CacheError> {
        let sql = format!(
            "INSERT INTO route_distances ({ROUTE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)"
        );
        let result = self.conn.execute(&sql, route_params!(route, stamp));
        match result {
            Ok(_) => Ok(Created::Inserted),
            Err(e) if is_unique_violation(&e) => {
                debug!(
                    "route {}->{} created concurrently, re-reading",
                    route.origin, route.destination
                );
                self.reread(self.get_route(&route.origin, &route.destination)?, e)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn put_route(&self, route: &RouteDistance, stamp: WriteStamp) -> Result<bool, CacheError> {
        let sql = format!(
            "INSERT INTO route_distances ({ROUTE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
             ON CONFLICT(origin_airport, destination_airport) DO UPDATE SET
                distance_meters = excluded.distance_meters,
                great_circle_km = excluded.great_circle_km,
                estimated_duration_minutes = excluded.estimated_duration_minutes,
                served_via = excluded.served_via,
                last_verified = excluded.last_verified,
                expires_at = excluded.expires_at
             WHERE excluded.last_verified >= route_distances.last_verified"
        );
        let changed = self.conn.execute(&sql, route_params!(route, stamp))?;
        Ok(changed > 0)
    }

    pub fn record_route_hit(&self, origin: &str, destination: &str) -> Result<(), CacheError> {
        self.conn.execute(
            "UPDATE route_distances SET cache_hits = cache_hits + 1
             WHERE origin_airport = ?1 AND destination_airport = ?2",
            params![origin, destination],
        )?;
        Ok(())
    }

    pub fn invalidate_route(&self, origin: &str, destination: &str) -> Result<bool, CacheError> {
        let n = self.conn.execute(
            "DELETE FROM route_distances WHERE origin_airport = ?1 AND destination_airport = ?2",
            params![origin, destination],
        )?;
        Ok(n > 0)
    }

    pub fn route_count(&self) -> Result<u64, CacheError> {
        let count: u64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM route_distances", [], |row| row.get(0))?;
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Free-text geocoding
    // -----------------------------------------------------------------------

    pub fn get_geocode(
        &self,
        query_hash: &str,
    ) -> Result<Option<Cached<GeocodedAddress>>, CacheError> {
        let sql =
            format!("SELECT {GEOCODE_COLUMNS} FROM geocoding_cache WHERE search_query_hash = ?1");
        let cached = self
            .conn
            .query_row(&sql, params![query_hash], geocode_from_row)
            .optional()?;
        Ok(cached)
    }

    pub fn create_geocode(
        &self,
        query_hash: &str,
        query: &str,
        result: &GeocodeResult,
        stamp: WriteStamp,
    ) -> Result<Created<GeocodedAddress>, CacheError> {
        let components = serde_json::to_string(&result.address_components)?;
        let viewport = result.viewport.as_ref().map(serde_json::to_string).transpose()?;
        // Queries longer than this are still keyed by their full hash.
        let stored_query: String = query.chars().take(1000).collect();

        let outcome = self.conn.execute(
            "INSERT INTO geocoding_cache (search_query, search_query_hash, latitude, longitude,
                formatted_address, place_id, location_type, address_components_json, viewport_json,
                served_via, last_verified, expires_at, cache_hits)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)",
            params![
                stored_query,
                query_hash,
                result.latitude,
                result.longitude,
                result.formatted_address,
                result.place_id,
                result.location_type,
                components,
                viewport,
                stamp.served_via.to_string(),
                stamp.last_verified(),
                stamp.expires_at(),
            ],
        );
        match outcome {
            Ok(_) => Ok(Created::Inserted),
            Err(e) if is_unique_violation(&e) => {
                debug!("geocode {} created concurrently, re-reading", query_hash);
                self.reread(self.get_geocode(query_hash)?, e)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Refresh an expired free-text entry in place.
    pub fn put_geocode(
        &self,
        query_hash: &str,
        query: &str,
        result: &GeocodeResult,
        stamp: WriteStamp,
    ) -> Result<bool, CacheError> {
        let components = serde_json::to_string(&result.address_components)?;
        let viewport = result.viewport.as_ref().map(serde_json::to_string).transpose()?;
        let stored_query: String = query.chars().take(1000).collect();

        let changed = self.conn.execute(
            "INSERT INTO geocoding_cache (search_query, search_query_hash, latitude, longitude,
                formatted_address, place_id, location_type, address_components_json, viewport_json,
                served_via, last_verified, expires_at, cache_hits)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 0)
             ON CONFLICT(search_query_hash) DO UPDATE SET
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                formatted_address = excluded.formatted_address,
                place_id = excluded.place_id,
                location_type = excluded.location_type,
                address_components_json = excluded.address_components_json,
                viewport_json = excluded.viewport_json,
                served_via = excluded.served_via,
                last_verified = excluded.last_verified,
                expires_at = excluded.expires_at
             WHERE excluded.last_verified >= geocoding_cache.last_verified",
            params![
                stored_query,
                query_hash,
                result.latitude,
                result.longitude,
                result.formatted_address,
                result.place_id,
                result.location_type,
                components,
                viewport,
                stamp.served_via.to_string(),
                stamp.last_verified(),
                stamp.expires_at(),
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn record_geocode_hit(&self, query_hash: &str) -> Result<(), CacheError> {
        self.conn.execute(
            "UPDATE geocoding_cache SET cache_hits = cache_hits + 1 WHERE search_query_hash = ?1",
            params![query_hash],
        )?;
        Ok(())
    }

    pub fn invalidate_geocode(&self, query_hash: &str) -> Result<bool, CacheError> {
        let n = self.conn.execute(
            "DELETE FROM geocoding_cache WHERE search_query_hash = ?1",
            params![query_hash],
        )?;
        Ok(n > 0)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Delete every entry whose `expires_at` has passed. Returns rows removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheError> {
        let now = to_sql_time(&now);
        let mut removed = 0;
        for table in ["airport_locations", "route_distances", "geocoding_cache"] {
            removed += self.conn.execute(
                &format!("DELETE FROM {table} WHERE expires_at <= ?1"),
                params![now],
            )?;
        }
        if removed > 0 {
            info!("Purged {} expired cache entries", removed);
        }
        Ok(removed)
    }

    fn reread<T>(
        &self,
        existing: Option<Cached<T>>,
        original: rusqlite::Error,
    ) -> Result<Created<T>, CacheError> {
        match existing {
            Some(row) => Ok(Created::Existing(row)),
            // The conflicting row vanished between the insert and the read.
            None => Err(original.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Timestamps are stored as fixed-width UTC RFC 3339 so text comparison
/// orders them chronologically.
pub fn to_sql_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn time_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn path_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DataPath> {
    let raw: String = row.get(idx)?;
    raw.parse::<DataPath>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn airport_from_row(row: &Row<'_>) -> rusqlite::Result<Cached<AirportLocation>> {
    Ok(Cached {
        value: AirportLocation {
            airport_code: row.get(0)?,
            airport_name: row.get(1)?,
            city: row.get(2)?,
            country: row.get(3)?,
            latitude: row.get(4)?,
            longitude: row.get(5)?,
            formatted_address: row.get(6)?,
            place_id: row.get(7)?,
            timezone_id: row.get(8)?,
            timezone_name: row.get(9)?,
            utc_offset_seconds: row.get(10)?,
            elevation_meters: row.get(11)?,
        },
        served_via: path_at(row, 12)?,
        last_verified: time_at(row, 13)?,
        expires_at: time_at(row, 14)?,
        hits: row.get(15)?,
    })
}

fn route_from_row(row: &Row<'_>) -> rusqlite::Result<Cached<RouteDistance>> {
    let origin: String = row.get(0)?;
    let destination: String = row.get(1)?;
    Ok(Cached {
        value: RouteDistance::new(&origin, &destination, row.get(2)?, row.get(3)?, row.get(4)?),
        served_via: path_at(row, 5)?,
        last_verified: time_at(row, 6)?,
        expires_at: time_at(row, 7)?,
        hits: row.get(8)?,
    })
}

fn geocode_from_row(row: &Row<'_>) -> rusqlite::Result<Cached<GeocodedAddress>> {
    Ok(Cached {
        value: GeocodedAddress {
            latitude: row.get(0)?,
            longitude: row.get(1)?,
            formatted_address: row.get(2)?,
            place_id: row.get(3)?,
            location_type: row.get(4)?,
        },
        served_via: path_at(row, 5)?,
        last_verified: time_at(row, 6)?,
        expires_at: time_at(row, 7)?,
        hits: row.get(8)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        }
        _ => false,
    }
}
