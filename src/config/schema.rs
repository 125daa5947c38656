//! Configuration schema for preflight.toml.

use crate::ratelimit::RateBudget;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    pub weather: WeatherConfig,
    pub flights: FlightsConfig,
    pub geocoding: GeocodingConfig,
    pub timeouts: TimeoutConfig,

    /// Path to the persistent lookup cache (SQLite).
    pub cache_db_path: String,

    /// Log level (debug, info, warn, error).
    pub log_level: String,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            weather: WeatherConfig::default(),
            flights: FlightsConfig::default(),
            geocoding: GeocodingConfig::default(),
            timeouts: TimeoutConfig::default(),
            cache_db_path: "~/.preflight/cache.db".into(),
            log_level: "info".into(),
        }
    }
}

/// A `max_calls` per `window_seconds` budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_calls: u32,
    pub window_seconds: u64,
}

impl RateLimitConfig {
    pub fn per_minute(max_calls: u32) -> Self {
        Self {
            max_calls,
            window_seconds: 60,
        }
    }

    pub fn budget(&self) -> RateBudget {
        RateBudget::new(self.max_calls, self.window_seconds)
    }
}

/// Open-Meteo weather domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub tool_server_url: String,
    pub upstream_url: String,
    pub rate_limit: RateLimitConfig,
    /// Lifetime of in-process memoized readings.
    pub memo_ttl_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            tool_server_url: "http://localhost:3000".into(),
            upstream_url: "https://api.open-meteo.com".into(),
            rate_limit: RateLimitConfig::per_minute(600),
            memo_ttl_seconds: 300,
        }
    }
}

/// AviationStack flight-tracking domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightsConfig {
    pub tool_server_url: String,
    pub upstream_url: String,
    /// Needed by the tool server, and by the client's direct fallback.
    pub api_key: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub memo_ttl_seconds: u64,
}

impl Default for FlightsConfig {
    fn default() -> Self {
        Self {
            tool_server_url: "http://localhost:3001".into(),
            upstream_url: "https://api.aviationstack.com".into(),
            api_key: None,
            rate_limit: RateLimitConfig::per_minute(100),
            memo_ttl_seconds: 600,
        }
    }
}

/// Google Maps geocoding domain (optional).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodingConfig {
    pub tool_server_url: String,
    pub upstream_url: String,
    pub api_key: Option<String>,
    pub rate_limit: RateLimitConfig,
    /// Freshness of cached airport locations and route distances.
    pub airport_ttl_days: i64,
    /// Freshness of cached free-text geocodes.
    pub address_ttl_days: i64,
    pub reverse_memo_ttl_seconds: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            tool_server_url: "http://localhost:3002".into(),
            upstream_url: "https://maps.googleapis.com".into(),
            api_key: None,
            rate_limit: RateLimitConfig::per_minute(50),
            airport_ttl_days: 90,
            address_ttl_days: 30,
            reverse_memo_ttl_seconds: 86_400,
        }
    }
}

/// Per-call network timeouts, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub health_seconds: u64,
    pub tool_seconds: u64,
    pub direct_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            health_seconds: 5,
            tool_seconds: 15,
            direct_seconds: 15,
        }
    }
}

impl TimeoutConfig {
    pub fn health(&self) -> Duration {
        Duration::from_secs(self.health_seconds)
    }

    pub fn tool(&self) -> Duration {
        Duration::from_secs(self.tool_seconds)
    }

    pub fn direct(&self) -> Duration {
        Duration::from_secs(self.direct_seconds)
    }
}

impl PreflightConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Resolved cache database path.
    pub fn resolved_cache_path(&self) -> String {
        self.resolve_path(&self.cache_db_path)
    }
}
