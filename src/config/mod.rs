pub mod schema;

pub use schema::{
    FlightsConfig, GeocodingConfig, PreflightConfig, RateLimitConfig, TimeoutConfig, WeatherConfig,
};

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default preflight home directory (~/.preflight).
pub fn default_home_dir() -> PathBuf {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".preflight"))
        .unwrap_or_else(|| PathBuf::from(".preflight"))
}

pub fn default_config_path() -> PathBuf {
    default_home_dir().join("preflight.toml")
}

/// Load config from the given path (or defaults), apply environment
/// overrides, and validate.
pub fn load_config(path: &Path) -> Result<PreflightConfig> {
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate(&config)?;
    Ok(config)
}

/// Parse the TOML file, or return defaults when it does not exist.
pub fn read_config_file(path: &Path) -> Result<PreflightConfig> {
    if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read preflight config file")?;
        let config: PreflightConfig =
            toml::from_str(&contents).context("Failed to parse preflight config (TOML)")?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    } else {
        Ok(PreflightConfig::default())
    }
}

/// Save config to the given path (TOML format).
pub fn save_config(config: &PreflightConfig, path: &Path) -> Result<()> {
    let contents = toml::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents).context("Failed to write config file")?;
    Ok(())
}

/// Override file values from the environment. `lookup` is `std::env::var`
/// outside tests.
pub fn apply_env_overrides<F>(config: &mut PreflightConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let number = |name: &str| -> Result<Option<u64>> {
        get(name)
            .map(|v| {
                v.parse::<u64>()
                    .with_context(|| format!("{name} must be a whole number, got '{v}'"))
            })
            .transpose()
    };

    if let Some(url) = get("OPENMETEO_MCP_SERVER_URL") {
        config.weather.tool_server_url = url;
    }
    if let Some(url) = get("AVIATIONSTACK_MCP_SERVER_URL") {
        config.flights.tool_server_url = url;
    }
    if let Some(url) = get("GOOGLEMAPS_MCP_SERVER_URL") {
        config.geocoding.tool_server_url = url;
    }
    if let Some(key) = get("AVIATIONSTACK_API_KEY") {
        config.flights.api_key = Some(key);
    }
    if let Some(key) = get("GOOGLE_MAPS_API_KEY") {
        config.geocoding.api_key = Some(key);
    }
    if let Some(per_minute) = number("GOOGLE_MAPS_RATE_LIMIT_PER_MINUTE")? {
        config.geocoding.rate_limit = RateLimitConfig::per_minute(per_minute as u32);
    }
    if let Some(seconds) = number("MCP_CONNECTION_TIMEOUT")? {
        config.timeouts.health_seconds = seconds;
    }
    if let Some(seconds) = number("MCP_REQUEST_TIMEOUT")? {
        config.timeouts.tool_seconds = seconds;
    }
    if let Some(path) = get("PREFLIGHT_CACHE_DB") {
        config.cache_db_path = path;
    }
    Ok(())
}

/// Reject settings that would make every call fail or hang.
pub fn validate(config: &PreflightConfig) -> Result<()> {
    let t = &config.timeouts;
    if !(1..=30).contains(&t.health_seconds) {
        bail!("health probe timeout must be 1-30 seconds, got {}", t.health_seconds);
    }
    if !(1..=300).contains(&t.tool_seconds) {
        bail!("tool call timeout must be 1-300 seconds, got {}", t.tool_seconds);
    }
    if !(1..=300).contains(&t.direct_seconds) {
        bail!("direct call timeout must be 1-300 seconds, got {}", t.direct_seconds);
    }

    for (domain, limit) in [
        ("weather", config.weather.rate_limit),
        ("flights", config.flights.rate_limit),
        ("geocoding", config.geocoding.rate_limit),
    ] {
        if limit.max_calls == 0 || limit.window_seconds == 0 {
            bail!("{domain} rate limit must allow at least one call per non-zero window");
        }
    }

    if config.geocoding.airport_ttl_days <= 0 || config.geocoding.address_ttl_days <= 0 {
        bail!("geocoding cache TTLs must be positive");
    }
    Ok(())
}

/// "set" / "not set" for printing secrets.
pub fn describe_secret(secret: &Option<String>) -> &'static str {
    match secret {
        Some(s) if !s.is_empty() => "set",
        _ => "not set",
    }
}
