//! Preflight: flight-delay data access layer.
//!
//! Usage:
//!   preflight serve weather          Run the weather tool server
//!   preflight status                 Probe tool servers and show config
//!   preflight briefing DXB           Aviation weather briefing
//!   preflight route DXB LHR          Cached route distance
//!   preflight cache purge            Drop expired cache rows

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use preflight::cache::{self, CacheStore, SharedCache};
use preflight::client::{FlightClient, GeocodingClient, WeatherClient};
use preflight::config::{self, PreflightConfig};
use preflight::ratelimit::{services, RateLimiterRegistry, SlidingWindowLimiter};
use preflight::server::{self, FlightTools, GeocodingTools, WeatherTools};
use preflight::tools::ToolProvider;
use preflight::types::{HealthStatus, Served};
use preflight::upstream::aviationstack::FlightQuery;
use preflight::upstream::OpenMeteoApi;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "preflight")]
#[command(version)]
#[command(about = "Weather, flight and geocoding data for delay prediction")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the config file.
    #[arg(long, default_value = "~/.preflight/preflight.toml")]
    config: String,

    /// Log level (debug, info, warn, error). Overrides the config file.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one tool server until Ctrl+C.
    Serve {
        #[arg(value_enum)]
        domain: Domain,

        /// Listen address; defaults to the port of the configured server URL.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Probe every tool server and show the effective configuration.
    Status,

    /// Current conditions at an airport.
    Weather { airport: String },

    /// Hourly forecast for the next N hours.
    Forecast {
        airport: String,
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },

    /// Forecast hour nearest a target time (RFC 3339).
    WeatherAt { airport: String, target: DateTime<Utc> },

    /// Current conditions plus a 24-hour risk summary.
    Briefing { airport: String },

    /// Real-time flights matching the filters.
    Flights {
        #[arg(long)]
        dep: Option<String>,
        #[arg(long)]
        arr: Option<String>,
        #[arg(long)]
        flight: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /// Flights on a route over recent days, with delay statistics.
    History {
        dep: String,
        arr: String,
        #[arg(long, default_value_t = 7)]
        days: u32,
    },

    /// Airport location and timezone.
    Airport {
        code: String,
        #[arg(long)]
        refresh: bool,
    },

    /// Distance between two airports.
    Route {
        origin: String,
        destination: String,
        #[arg(long)]
        refresh: bool,
    },

    /// Geocode a free-text address.
    Geocode { address: String },

    /// Cached airports near a point.
    Nearby {
        latitude: f64,
        longitude: f64,
        #[arg(long, default_value_t = 100.0)]
        radius_km: f64,
    },

    /// Cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Delete every expired row.
    Purge,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Domain {
    Weather,
    Flights,
    Geocoding,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = PathBuf::from(shellexpand::tilde(&cli.config).into_owned());
    let cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let level = cli.log_level.clone().unwrap_or_else(|| cfg.log_level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let limiters = RateLimiterRegistry::new();

    match cli.command {
        Commands::Serve { domain, bind } => cmd_serve(&cfg, domain, bind).await,
        Commands::Status => cmd_status(&cfg, &limiters).await,
        Commands::Weather { airport } => {
            let client = WeatherClient::connect(&cfg.weather, &cfg.timeouts, &limiters).await;
            print_served(&client.get_current_weather(&airport).await?)
        }
        Commands::Forecast { airport, hours } => {
            let client = WeatherClient::connect(&cfg.weather, &cfg.timeouts, &limiters).await;
            print_served(&client.get_hourly_forecast(&airport, hours).await?)
        }
        Commands::WeatherAt { airport, target } => {
            let client = WeatherClient::connect(&cfg.weather, &cfg.timeouts, &limiters).await;
            print_served(&client.get_weather_at_time(&airport, target).await?)
        }
        Commands::Briefing { airport } => {
            let client = WeatherClient::connect(&cfg.weather, &cfg.timeouts, &limiters).await;
            print_served(&client.get_aviation_weather_briefing(&airport).await?)
        }
        Commands::Flights { dep, arr, flight, limit } => {
            let client = FlightClient::connect(&cfg.flights, &cfg.timeouts, &limiters).await;
            let query = FlightQuery {
                flight_iata: flight,
                dep_iata: dep,
                arr_iata: arr,
            };
            print_served(&client.get_real_time_flights(&query, limit).await?)
        }
        Commands::History { dep, arr, days } => {
            cmd_history(&cfg, &limiters, &dep, &arr, days).await
        }
        Commands::Airport { code, refresh } => {
            let client = geocoding_client(&cfg, &limiters).await?;
            print_served(&client.get_airport_location(&code, refresh).await?)
        }
        Commands::Route {
            origin,
            destination,
            refresh,
        } => {
            let client = geocoding_client(&cfg, &limiters).await?;
            print_served(&client.get_route_distance(&origin, &destination, refresh).await?)
        }
        Commands::Geocode { address } => {
            let client = geocoding_client(&cfg, &limiters).await?;
            print_served(&client.geocode_address(&address).await?)
        }
        Commands::Nearby {
            latitude,
            longitude,
            radius_km,
        } => {
            let client = geocoding_client(&cfg, &limiters).await?;
            let nearby = client.get_nearby_airports(latitude, longitude, radius_km).await?;
            println!("{}", serde_json::to_string_pretty(&nearby)?);
            Ok(())
        }
        Commands::Cache {
            action: CacheAction::Purge,
        } => {
            let store = open_cache(&cfg)?;
            let removed = store.lock().await.purge_expired(Utc::now())?;
            println!("{} Removed {} expired entries", ">>>".green().bold(), removed);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_serve(cfg: &PreflightConfig, domain: Domain, bind: Option<String>) -> Result<()> {
    let direct = cfg.timeouts.direct();
    let (provider, server_url): (Arc<dyn ToolProvider>, &str) = match domain {
        Domain::Weather => {
            let limiter =
                SlidingWindowLimiter::new(services::OPEN_METEO, cfg.weather.rate_limit.budget());
            let api = OpenMeteoApi::new(&cfg.weather.upstream_url, direct);
            let tools: Arc<dyn ToolProvider> = Arc::new(WeatherTools::from_limiter(api, limiter));
            (tools, cfg.weather.tool_server_url.as_str())
        }
        Domain::Flights => {
            let limiter =
                SlidingWindowLimiter::new(services::AVIATIONSTACK, cfg.flights.rate_limit.budget());
            let tools = FlightTools::new(
                &cfg.flights.upstream_url,
                cfg.flights.api_key.as_deref(),
                direct,
                Arc::new(limiter),
            )?;
            let tools: Arc<dyn ToolProvider> = Arc::new(tools);
            (tools, cfg.flights.tool_server_url.as_str())
        }
        Domain::Geocoding => {
            let limiter =
                SlidingWindowLimiter::new(services::GOOGLE_MAPS, cfg.geocoding.rate_limit.budget());
            let tools = GeocodingTools::new(
                &cfg.geocoding.upstream_url,
                cfg.geocoding.api_key.as_deref(),
                direct,
                Arc::new(limiter),
            )?;
            let tools: Arc<dyn ToolProvider> = Arc::new(tools);
            (tools, cfg.geocoding.tool_server_url.as_str())
        }
    };

    let addr = match bind {
        Some(addr) => addr,
        None => default_bind(server_url)?,
    };
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    println!("{} Starting {} on {}", ">>>".green().bold(), provider.service(), addr);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => println!("\n{} Shutting down gracefully...", "<<<".red().bold()),
            Err(e) => warn!("Failed to listen for Ctrl+C: {}", e),
        }
        signal_cancel.cancel();
    });

    server::serve(listener, provider, cancel).await
}

async fn cmd_status(cfg: &PreflightConfig, limiters: &RateLimiterRegistry) -> Result<()> {
    let cache = open_cache(cfg)?;
    let (weather, flights, geocoding) = tokio::join!(
        WeatherClient::connect(&cfg.weather, &cfg.timeouts, limiters),
        FlightClient::connect(&cfg.flights, &cfg.timeouts, limiters),
        GeocodingClient::connect(&cfg.geocoding, &cfg.timeouts, limiters, cache.clone()),
    );

    println!();
    println!("{}", "=== Preflight Status ===".bold());
    println!();
    println!("  {}:", "Tool servers".bold());
    println!(
        "    Weather:    {} {}",
        colorize_health(weather.health()),
        cfg.weather.tool_server_url
    );
    println!(
        "    Flights:    {} {}",
        colorize_health(flights.health()),
        cfg.flights.tool_server_url
    );
    println!(
        "    Geocoding:  {} {}",
        colorize_health(geocoding.health()),
        cfg.geocoding.tool_server_url
    );
    println!();
    println!("  {}:", "Direct API keys".bold());
    println!("    AviationStack: {}", config::describe_secret(&cfg.flights.api_key));
    println!("    Google Maps:   {}", config::describe_secret(&cfg.geocoding.api_key));
    println!(
        "    Geocoding:     {}",
        if geocoding.is_enabled() {
            "enabled".green()
        } else {
            "disabled".red()
        }
    );
    println!();
    println!("  {}:", "Cache".bold());
    println!("    Database: {}", cfg.resolved_cache_path());
    println!("    Routes:   {}", cache.lock().await.route_count()?);
    println!();

    Ok(())
}

async fn cmd_history(
    cfg: &PreflightConfig,
    limiters: &RateLimiterRegistry,
    dep: &str,
    arr: &str,
    days: u32,
) -> Result<()> {
    let client = FlightClient::connect(&cfg.flights, &cfg.timeouts, limiters).await;
    let history = client.get_flight_route_history(dep, arr, days).await?;
    print_served(&history)?;

    match FlightClient::calculate_route_statistics(&history.data) {
        Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
        None => println!("{} No flights found on this route", "!!!".yellow().bold()),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_cache(cfg: &PreflightConfig) -> Result<SharedCache> {
    let path = PathBuf::from(cfg.resolved_cache_path());
    let store = CacheStore::open(&path)
        .with_context(|| format!("Failed to open cache database at {}", path.display()))?;
    info!("Cache database at {}", path.display());
    Ok(cache::shared(store))
}

async fn geocoding_client(
    cfg: &PreflightConfig,
    limiters: &RateLimiterRegistry,
) -> Result<GeocodingClient> {
    let cache = open_cache(cfg)?;
    Ok(GeocodingClient::connect(&cfg.geocoding, &cfg.timeouts, limiters, cache).await)
}

/// `0.0.0.0:<port>` taken from a configured server URL.
fn default_bind(server_url: &str) -> Result<String> {
    let url = reqwest::Url::parse(server_url)
        .with_context(|| format!("Invalid tool server URL: {server_url}"))?;
    let port = url
        .port_or_known_default()
        .with_context(|| format!("No port in tool server URL: {server_url}"))?;
    Ok(format!("0.0.0.0:{port}"))
}

fn print_served<T: Serialize>(served: &Served<T>) -> Result<()> {
    let source = if served.from_cache {
        format!("{} (cached)", served.path)
    } else {
        served.path.to_string()
    };
    println!("{} via {}", ">>>".green().bold(), source.cyan());
    println!("{}", serde_json::to_string_pretty(&served.data)?);
    Ok(())
}

fn colorize_health(status: HealthStatus) -> String {
    if status.healthy {
        "healthy".green().to_string()
    } else {
        "unavailable".red().to_string()
    }
}
