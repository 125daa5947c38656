//! Geocoding client (Google Maps) backed by the persistent cache.
//!
//! The domain is optional: with no API key and no healthy tool server the
//! client is disabled and every network-backed call answers
//! [`GeocodingError::NotAvailable`].
//!
//! Stale policy: airport locations and route distances past their TTL are
//! still served when a refresh fails. Free-text geocodes are not; once
//! `expires_at` passes they are treated as absent.

use super::{serve_with_fallback, ServerLink};
use crate::cache::{query_hash, CacheError, Cached, Created, MemoCache, SharedCache, WriteStamp};
use crate::clock::{system_clock, SharedClock};
use crate::config::{GeocodingConfig, TimeoutConfig};
use crate::ratelimit::{services, RateLimiter, RateLimiterRegistry};
use crate::tools::args::{DistanceMatrixArgs, GeocodeArgs, ReverseGeocodeArgs, TimezoneArgs};
use crate::tools::ToolArgs;
use crate::types::{
    AirportLocation, DataPath, GeocodedAddress, HealthStatus, NearbyAirport, ReverseGeocodeResult,
    RouteDistance, Served, TimezoneInfo,
};
use crate::upstream::{GoogleMapsApi, UpstreamError};
use crate::validate::{AirportCode, Coordinates, ValidationError};
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Average cruise speed used for flight-time estimates.
const CRUISE_SPEED_KMH: f64 = 800.0;

#[derive(Debug, Error)]
pub enum GeocodingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("geocoding service not available: GOOGLE_MAPS_API_KEY not set and tool server unreachable")]
    NotAvailable,

    #[error("google-maps rate limit exceeded, retry later")]
    RateLimited,

    #[error("{0}")]
    NotFound(String),

    #[error("geocoding lookup failed: {0}")]
    Upstream(UpstreamError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl From<UpstreamError> for GeocodingError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound { message, .. } => Self::NotFound(message),
            UpstreamError::RateLimited(_) => Self::RateLimited,
            other => Self::Upstream(other),
        }
    }
}

impl GeocodingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Cache(_) => true,
            Self::Upstream(e) => e.is_retryable(),
            Self::Validation(_) | Self::NotAvailable | Self::NotFound(_) => false,
        }
    }
}

pub struct GeocodingClient {
    link: ServerLink,
    api: Option<GoogleMapsApi>,
    limiter: Arc<dyn RateLimiter>,
    clock: SharedClock,
    cache: SharedCache,
    airport_ttl: ChronoDuration,
    address_ttl: ChronoDuration,
    reverse: MemoCache<Served<ReverseGeocodeResult>>,
}

impl GeocodingClient {
    pub async fn connect(
        config: &GeocodingConfig,
        timeouts: &TimeoutConfig,
        limiters: &RateLimiterRegistry,
        cache: SharedCache,
    ) -> Self {
        Self::connect_with_clock(config, timeouts, limiters, cache, system_clock()).await
    }

    pub async fn connect_with_clock(
        config: &GeocodingConfig,
        timeouts: &TimeoutConfig,
        limiters: &RateLimiterRegistry,
        cache: SharedCache,
        clock: SharedClock,
    ) -> Self {
        let link = ServerLink::connect_with_clock(
            &config.tool_server_url,
            timeouts.health(),
            timeouts.tool(),
            clock.clone(),
        )
        .await;
        let api = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|key| GoogleMapsApi::new(&config.upstream_url, key, timeouts.direct()));

        let client = Self {
            link,
            api,
            limiter: limiters.limiter_for(services::GOOGLE_MAPS, config.rate_limit.budget()),
            clock,
            cache,
            airport_ttl: ChronoDuration::days(config.airport_ttl_days),
            address_ttl: ChronoDuration::days(config.address_ttl_days),
            reverse: MemoCache::new(Duration::from_secs(config.reverse_memo_ttl_seconds), 1_000),
        };
        if !client.is_enabled() {
            warn!("Geocoding disabled: no GOOGLE_MAPS_API_KEY and tool server unavailable");
        }
        client
    }

    /// Usable when either path can serve.
    pub fn is_enabled(&self) -> bool {
        self.api.is_some() || self.link.is_healthy()
    }

    pub fn health(&self) -> HealthStatus {
        self.link.health()
    }

    fn ensure_enabled(&self) -> Result<(), GeocodingError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(GeocodingError::NotAvailable)
        }
    }

    fn direct(&self) -> Result<&GoogleMapsApi, GeocodingError> {
        let api = self.api.as_ref().ok_or(GeocodingError::NotAvailable)?;
        if !self.limiter.admit() {
            return Err(GeocodingError::RateLimited);
        }
        Ok(api)
    }

    // -- Airport locations -----------------------------------------------------

    /// Location and timezone of an airport, cached for the airport TTL.
    pub async fn get_airport_location(
        &self,
        airport_code: &str,
        force_refresh: bool,
    ) -> Result<Served<AirportLocation>, GeocodingError> {
        let code = AirportCode::parse(airport_code)?;
        self.ensure_enabled()?;

        let cached = self.cache.lock().await.get_airport(code.as_str())?;
        if let Some(entry) = &cached {
            if !force_refresh && entry.is_fresh(self.clock.utc(), self.airport_ttl) {
                debug!("Airport {} cache hit", code);
                self.cache.lock().await.record_airport_hit(code.as_str())?;
                return Ok(Served::cached(entry.value.clone(), entry.served_via));
            }
        }

        match self.fetch_airport_location(&code).await {
            Ok(fetched) => self.store_airport(fetched, cached.is_some()).await,
            Err(e) => match cached {
                Some(stale) if !matches!(e, GeocodingError::Validation(_)) => {
                    warn!(
                        "Refreshing airport {} failed ({}), serving entry verified {} days ago",
                        code,
                        e,
                        stale.age(self.clock.utc()).num_days()
                    );
                    Ok(Served::cached(stale.value, stale.served_via))
                }
                _ => Err(e),
            },
        }
    }

    async fn fetch_airport_location(
        &self,
        code: &AirportCode,
    ) -> Result<Served<AirportLocation>, GeocodingError> {
        let args = GeocodeArgs {
            address: format!("{code} airport"),
        };
        let address = args.address.as_str();
        let place = serve_with_fallback("geocoding", &self.link, &args, || async move {
            Ok::<_, GeocodingError>(self.direct()?.geocode(address).await?)
        })
        .await
        .map_err(|e| match e {
            GeocodingError::NotFound(_) => {
                GeocodingError::NotFound(format!("Airport {code} not found"))
            }
            other => other,
        })?;

        let coords = Coordinates::new(place.data.latitude, place.data.longitude)?;
        let timezone = match self.timezone(coords).await {
            Ok(tz) => Some(tz),
            Err(e) => {
                warn!("Timezone lookup for {} failed: {}", code, e);
                None
            }
        };

        let (city, country) = place.data.city_country();
        let path = place.path;
        let place = place.data;
        let location = AirportLocation {
            airport_code: code.to_string(),
            airport_name: format!("{code} Airport"),
            city,
            country,
            latitude: place.latitude,
            longitude: place.longitude,
            formatted_address: Some(place.formatted_address),
            place_id: place.place_id,
            timezone_id: timezone.as_ref().map(|tz| tz.timezone_id.clone()),
            timezone_name: timezone.as_ref().map(|tz| tz.timezone_name.clone()),
            utc_offset_seconds: timezone.as_ref().map(TimezoneInfo::utc_offset_seconds),
            elevation_meters: None,
        };
        Ok(Served::fresh(location, path))
    }

    async fn timezone(&self, coords: Coordinates) -> Result<TimezoneInfo, GeocodingError> {
        let timestamp = self.clock.utc().timestamp();
        let args = TimezoneArgs {
            latitude: coords.latitude,
            longitude: coords.longitude,
            timestamp: Some(timestamp),
        };
        let served = serve_with_fallback("geocoding", &self.link, &args, || async move {
            Ok::<_, GeocodingError>(self.direct()?.timezone(coords, Some(timestamp)).await?)
        })
        .await?;
        Ok(served.data)
    }

    async fn store_airport(
        &self,
        fetched: Served<AirportLocation>,
        refresh: bool,
    ) -> Result<Served<AirportLocation>, GeocodingError> {
        let stamp = WriteStamp::new(fetched.path, self.clock.utc(), self.airport_ttl);
        let store = self.cache.lock().await;
        if refresh {
            if store.put_airport(&fetched.data, stamp)? {
                return Ok(fetched);
            }
            debug!("Kept fresher cached row for {}", fetched.data.airport_code);
            return Ok(match store.get_airport(&fetched.data.airport_code)? {
                Some(kept) => Served::cached(kept.value, kept.served_via),
                None => fetched,
            });
        }
        match store.create_airport(&fetched.data, stamp)? {
            Created::Inserted => {
                info!("Cached location for {} via {}", fetched.data.airport_code, fetched.path);
                Ok(fetched)
            }
            Created::Existing(winner) => Ok(Served::cached(winner.value, winner.served_via)),
        }
    }

    // -- Route distances -------------------------------------------------------

    /// Distance between two airports: driving distance where a road route
    /// exists, great-circle otherwise.
    pub async fn get_route_distance(
        &self,
        origin: &str,
        destination: &str,
        force_refresh: bool,
    ) -> Result<Served<RouteDistance>, GeocodingError> {
        let origin = AirportCode::parse_field(origin, "origin")?;
        let destination = AirportCode::parse_field(destination, "destination")?;
        if origin == destination {
            return Err(ValidationError::new(
                "destination",
                "origin and destination must be different",
            )
            .into());
        }
        self.ensure_enabled()?;

        let cached = self
            .cache
            .lock()
            .await
            .get_route(origin.as_str(), destination.as_str())?;
        if let Some(entry) = &cached {
            if !force_refresh && entry.is_fresh(self.clock.utc(), self.airport_ttl) {
                debug!("Route {} → {} cache hit", origin, destination);
                self.cache
                    .lock()
                    .await
                    .record_route_hit(origin.as_str(), destination.as_str())?;
                return Ok(Served::cached(entry.value.clone(), entry.served_via));
            }
        }

        match self.compute_route(&origin, &destination).await {
            Ok(route) => self.store_route(route, cached.is_some()).await,
            Err(e) => match cached {
                Some(stale) => {
                    warn!(
                        "Refreshing route {} → {} failed ({}), serving stale entry",
                        origin, destination, e
                    );
                    Ok(Served::cached(stale.value, stale.served_via))
                }
                None => Err(e),
            },
        }
    }

    async fn compute_route(
        &self,
        origin: &AirportCode,
        destination: &AirportCode,
    ) -> Result<Served<RouteDistance>, GeocodingError> {
        let from = self.get_airport_location(origin.as_str(), false).await?;
        let to = self.get_airport_location(destination.as_str(), false).await?;
        let a = Coordinates::new(from.data.latitude, from.data.longitude)?;
        let b = Coordinates::new(to.data.latitude, to.data.longitude)?;
        let great_circle_km = a.haversine_km(&b);
        let great_circle_meters = (great_circle_km * 1000.0) as i64;

        let args = DistanceMatrixArgs {
            origins: vec![a.to_query()],
            destinations: vec![b.to_query()],
            mode: Some("driving".into()),
        };
        let (origins, destinations) = (&args.origins, &args.destinations);
        let matrix = serve_with_fallback("geocoding", &self.link, &args, || async move {
            Ok::<_, GeocodingError>(
                self.direct()?
                    .distance_matrix(origins, destinations, "driving")
                    .await?,
            )
        })
        .await;

        let (distance_meters, path) = match matrix {
            Ok(served) => match served.data.first_distance_meters() {
                Some(meters) => (meters, served.path),
                None => {
                    debug!(
                        "No driving route {} → {}, using great-circle distance",
                        origin, destination
                    );
                    (great_circle_meters, served.path)
                }
            },
            Err(e) => {
                warn!(
                    "Distance matrix {} → {} failed ({}), using great-circle distance",
                    origin, destination, e
                );
                (great_circle_meters, from.path)
            }
        };

        let minutes = (great_circle_km / CRUISE_SPEED_KMH * 60.0) as i64;
        let route = RouteDistance::new(
            origin.as_str(),
            destination.as_str(),
            distance_meters,
            great_circle_km,
            minutes,
        );
        Ok(Served::fresh(route, path))
    }

    async fn store_route(
        &self,
        route: Served<RouteDistance>,
        refresh: bool,
    ) -> Result<Served<RouteDistance>, GeocodingError> {
        let stamp = WriteStamp::new(route.path, self.clock.utc(), self.airport_ttl);
        let store = self.cache.lock().await;
        if refresh {
            if store.put_route(&route.data, stamp)? {
                return Ok(route);
            }
            debug!(
                "Kept fresher cached route {} → {}",
                route.data.origin, route.data.destination
            );
            return Ok(match store.get_route(&route.data.origin, &route.data.destination)? {
                Some(kept) => Served::cached(kept.value, kept.served_via),
                None => route,
            });
        }
        match store.create_route(&route.data, stamp)? {
            Created::Inserted => Ok(route),
            Created::Existing(winner) => Ok(Served::cached(winner.value, winner.served_via)),
        }
    }

    // -- Free-text geocoding ---------------------------------------------------

    /// Geocode an address, cached by the hash of its normalised text.
    pub async fn geocode_address(
        &self,
        address: &str,
    ) -> Result<Served<GeocodedAddress>, GeocodingError> {
        let args = GeocodeArgs {
            address: address.to_string(),
        }
        .checked()?;
        self.ensure_enabled()?;

        let hash = query_hash(&args.address);
        let now = self.clock.utc();
        let cached = self.cache.lock().await.get_geocode(&hash)?;
        if let Some(entry) = &cached {
            if now < entry.expires_at {
                self.cache.lock().await.record_geocode_hit(&hash)?;
                return Ok(Served::cached(entry.value.clone(), entry.served_via));
            }
        }

        let query = args.address.as_str();
        let served = serve_with_fallback("geocoding", &self.link, &args, || async move {
            Ok::<_, GeocodingError>(self.direct()?.geocode(query).await?)
        })
        .await?;

        let stamp = WriteStamp::new(served.path, self.clock.utc(), self.address_ttl);
        let store = self.cache.lock().await;
        if cached.is_some() {
            store.put_geocode(&hash, query, &served.data, stamp)?;
        } else if let Created::Existing(winner) =
            store.create_geocode(&hash, query, &served.data, stamp)?
        {
            return Ok(Served::cached(winner.value, winner.served_via));
        }

        let path = served.path;
        let place = served.data;
        Ok(Served::fresh(
            GeocodedAddress {
                latitude: place.latitude,
                longitude: place.longitude,
                formatted_address: place.formatted_address,
                place_id: place.place_id,
                location_type: place.location_type,
            },
            path,
        ))
    }

    /// Nearest address to a point, memoized in process.
    pub async fn reverse_geocode(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Served<ReverseGeocodeResult>, GeocodingError> {
        let coords = Coordinates::new(latitude, longitude)?;
        self.ensure_enabled()?;

        let point = coords.to_query();
        let key = MemoCache::<Served<ReverseGeocodeResult>>::key("reverse", &[point.as_str()]);
        if let Some(hit) = self.reverse.get(&key) {
            return Ok(Served::cached(hit.data, hit.path));
        }

        let args = ReverseGeocodeArgs { latitude, longitude };
        let served = serve_with_fallback("geocoding", &self.link, &args, || async move {
            Ok::<_, GeocodingError>(self.direct()?.reverse_geocode(coords).await?)
        })
        .await?;
        self.reverse.insert(key, served.clone());
        Ok(served)
    }

    // -- Queries over cached airports -----------------------------------------

    /// Cached airports within `radius_km` of a point, nearest first.
    pub async fn get_nearby_airports(
        &self,
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    ) -> Result<Vec<NearbyAirport>, GeocodingError> {
        let center = Coordinates::new(latitude, longitude)?;
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(ValidationError::new(
                "radius_km",
                format!("{radius_km} must be a positive number"),
            )
            .into());
        }

        let airports: Vec<Cached<AirportLocation>> = self.cache.lock().await.all_airports()?;
        let mut nearby: Vec<NearbyAirport> = airports
            .into_iter()
            .filter_map(|entry| {
                let point = Coordinates {
                    latitude: entry.value.latitude,
                    longitude: entry.value.longitude,
                };
                let distance = center.haversine_km(&point);
                (distance <= radius_km).then(|| NearbyAirport {
                    location: entry.value,
                    distance_km: (distance * 100.0).round() / 100.0,
                })
            })
            .collect();
        nearby.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        Ok(nearby)
    }

    /// Whether a point lies within `tolerance_km` of the airport. An airport
    /// the provider cannot find never validates.
    pub async fn validate_airport_coordinates(
        &self,
        airport_code: &str,
        latitude: f64,
        longitude: f64,
        tolerance_km: f64,
    ) -> Result<bool, GeocodingError> {
        let point = Coordinates::new(latitude, longitude)?;
        if !tolerance_km.is_finite() || tolerance_km < 0.0 {
            return Err(ValidationError::new("tolerance_km", "must not be negative").into());
        }
        let location = match self.get_airport_location(airport_code, false).await {
            Ok(served) => served.data,
            Err(GeocodingError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        let airport = Coordinates {
            latitude: location.latitude,
            longitude: location.longitude,
        };
        Ok(point.haversine_km(&airport) <= tolerance_km)
    }

    /// Served path of the most recent cached airport row, for status output.
    pub async fn cached_airport_path(
        &self,
        airport_code: &str,
    ) -> Result<Option<DataPath>, GeocodingError> {
        let code = AirportCode::parse(airport_code)?;
        Ok(self
            .cache
            .lock()
            .await
            .get_airport(code.as_str())?
            .map(|c| c.served_via))
    }
}
