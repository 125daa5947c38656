//! Cache database schema definitions and migrations.

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 3;

/// Full DDL for the persistent lookup cache.
pub const CREATE_SCHEMA: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Airport locations (geocode + timezone), keyed by airport code
CREATE TABLE IF NOT EXISTS airport_locations (
    airport_code       TEXT PRIMARY KEY
                       CHECK (length(airport_code) = 3 OR length(airport_code) = 4),
    airport_name       TEXT NOT NULL,
    city               TEXT,
    country            TEXT,
    latitude           REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
    longitude          REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
    formatted_address  TEXT,
    place_id           TEXT,
    timezone_id        TEXT,
    timezone_name      TEXT,
    utc_offset_seconds INTEGER,
    elevation_meters   INTEGER,
    served_via         TEXT NOT NULL DEFAULT 'DIRECT',
    last_verified      TEXT NOT NULL,
    expires_at         TEXT NOT NULL,
    cache_hits         INTEGER NOT NULL DEFAULT 0,
    created_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Airport-to-airport distances, keyed by (origin, destination)
CREATE TABLE IF NOT EXISTS route_distances (
    id                         INTEGER PRIMARY KEY AUTOINCREMENT,
    origin_airport             TEXT NOT NULL,
    destination_airport        TEXT NOT NULL,
    distance_meters            INTEGER NOT NULL CHECK (distance_meters >= 0),
    great_circle_km            REAL NOT NULL,
    estimated_duration_minutes INTEGER NOT NULL,
    served_via                 TEXT NOT NULL DEFAULT 'DIRECT',
    last_verified              TEXT NOT NULL,
    expires_at                 TEXT NOT NULL,
    cache_hits                 INTEGER NOT NULL DEFAULT 0,
    created_at                 TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CHECK (origin_airport != destination_airport),
    UNIQUE (origin_airport, destination_airport)
);

-- Free-text geocoding, keyed by SHA-256 of the normalised query
CREATE TABLE IF NOT EXISTS geocoding_cache (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    search_query            TEXT NOT NULL,
    search_query_hash       TEXT NOT NULL UNIQUE,
    latitude                REAL NOT NULL CHECK (latitude BETWEEN -90 AND 90),
    longitude               REAL NOT NULL CHECK (longitude BETWEEN -180 AND 180),
    formatted_address       TEXT NOT NULL,
    place_id                TEXT,
    location_type           TEXT,
    address_components_json TEXT,
    viewport_json           TEXT,
    served_via              TEXT NOT NULL DEFAULT 'DIRECT',
    last_verified           TEXT NOT NULL,
    expires_at              TEXT NOT NULL,
    cache_hits              INTEGER NOT NULL DEFAULT 0,
    created_at              TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_airport_location_coords ON airport_locations(latitude, longitude);
CREATE INDEX IF NOT EXISTS idx_airport_location_country ON airport_locations(country);
CREATE INDEX IF NOT EXISTS idx_route_origin ON route_distances(origin_airport);
CREATE INDEX IF NOT EXISTS idx_route_destination ON route_distances(destination_airport);
CREATE INDEX IF NOT EXISTS idx_geocoding_expiry ON geocoding_cache(expires_at);
"#;

/// Migration from version 1 to version 2: hit counters and serving path on
/// the airport and route tables.
pub const MIGRATE_V1_TO_V2: &str = r#"
ALTER TABLE airport_locations ADD COLUMN cache_hits INTEGER NOT NULL DEFAULT 0;
ALTER TABLE airport_locations ADD COLUMN served_via TEXT NOT NULL DEFAULT 'DIRECT';
ALTER TABLE route_distances ADD COLUMN cache_hits INTEGER NOT NULL DEFAULT 0;
ALTER TABLE route_distances ADD COLUMN served_via TEXT NOT NULL DEFAULT 'DIRECT';
"#;

/// Migration from version 2 to version 3: routes between coincident
/// airports may have zero distance. SQLite cannot alter a CHECK, so the
/// table is rebuilt.
pub const MIGRATE_V2_TO_V3: &str = r#"
CREATE TABLE route_distances_v3 (
    id                         INTEGER PRIMARY KEY AUTOINCREMENT,
    origin_airport             TEXT NOT NULL,
    destination_airport        TEXT NOT NULL,
    distance_meters            INTEGER NOT NULL CHECK (distance_meters >= 0),
    great_circle_km            REAL NOT NULL,
    estimated_duration_minutes INTEGER NOT NULL,
    served_via                 TEXT NOT NULL DEFAULT 'DIRECT',
    last_verified              TEXT NOT NULL,
    expires_at                 TEXT NOT NULL,
    cache_hits                 INTEGER NOT NULL DEFAULT 0,
    created_at                 TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    CHECK (origin_airport != destination_airport),
    UNIQUE (origin_airport, destination_airport)
);
INSERT INTO route_distances_v3
    SELECT id, origin_airport, destination_airport, distance_meters, great_circle_km,
           estimated_duration_minutes, served_via, last_verified, expires_at, cache_hits,
           created_at
    FROM route_distances;
DROP TABLE route_distances;
ALTER TABLE route_distances_v3 RENAME TO route_distances;
CREATE INDEX IF NOT EXISTS idx_route_origin ON route_distances(origin_airport);
CREATE INDEX IF NOT EXISTS idx_route_destination ON route_distances(destination_airport);
"#;
