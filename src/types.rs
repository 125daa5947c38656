//! Shared types used across the tool servers and protocol clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Serving path
// ---------------------------------------------------------------------------

/// Which route produced a result: the paired tool server or the provider's
/// own REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataPath {
    Mcp,
    Direct,
}

impl fmt::Display for DataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mcp => write!(f, "MCP"),
            Self::Direct => write!(f, "DIRECT"),
        }
    }
}

impl std::str::FromStr for DataPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MCP" => Ok(Self::Mcp),
            "DIRECT" => Ok(Self::Direct),
            other => Err(format!("unknown data path '{other}'")),
        }
    }
}

/// A client result tagged with the path that served it.
///
/// `from_cache` is set when the value came out of a cache tier; `path` then
/// names the route that originally fetched it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Served<T> {
    pub data: T,
    pub path: DataPath,
    pub from_cache: bool,
}

impl<T> Served<T> {
    pub fn fresh(data: T, path: DataPath) -> Self {
        Self {
            data,
            path,
            from_cache: false,
        }
    }

    pub fn cached(data: T, path: DataPath) -> Self {
        Self {
            data,
            path,
            from_cache: true,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Served<U> {
        Served {
            data: f(self.data),
            path: self.path,
            from_cache: self.from_cache,
        }
    }
}

/// Liveness of a paired tool server as of the last probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub checked_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

/// Precipitation class derived from amount and temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrecipitationType {
    None,
    Snow,
    Sleet,
    LightRain,
    ModerateRain,
    HeavyRain,
}

impl PrecipitationType {
    pub fn classify(precipitation_mm: f64, temperature_c: f64) -> Self {
        if precipitation_mm < 0.1 {
            Self::None
        } else if temperature_c < 0.0 {
            Self::Snow
        } else if temperature_c < 2.0 {
            Self::Sleet
        } else if precipitation_mm < 2.5 {
            Self::LightRain
        } else if precipitation_mm < 7.5 {
            Self::ModerateRain
        } else {
            Self::HeavyRain
        }
    }
}

/// Visibility estimate in km from a WMO weather code.
pub fn visibility_from_weather_code(code: i64) -> f64 {
    match code {
        0 => 10.0,
        1 | 2 => 8.0,
        3 => 7.0,
        45 | 48 => 1.0,
        51 | 53 | 55 | 56 | 57 => 5.0,
        61 | 63 | 65 | 66 | 67 => 3.0,
        71 | 73 | 75 | 77 => 2.0,
        80..=82 => 4.0,
        85 | 86 => 2.0,
        95 | 96 | 99 => 2.0,
        _ => 6.0,
    }
}

/// Current conditions at an airport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub airport_code: String,
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub wind_speed_kts: f64,
    pub wind_direction_deg: f64,
    pub wind_gust_kts: f64,
    pub visibility_km: f64,
    pub cloud_coverage_percent: f64,
    pub precipitation_type: PrecipitationType,
    pub precipitation_mm: f64,
    pub pressure_mb: f64,
    pub humidity_percent: f64,
}

/// One hour of forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyWeather {
    pub airport_code: String,
    pub time: String,
    pub temperature_c: f64,
    pub wind_speed_kts: f64,
    pub wind_direction_deg: f64,
    pub visibility_km: f64,
    pub cloud_coverage_percent: f64,
    pub precipitation_type: PrecipitationType,
    pub precipitation_mm: f64,
    pub humidity_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_concern_count(count: usize) -> Self {
        match count {
            0 => Self::Low,
            1 | 2 => Self::Moderate,
            3 => Self::High,
            _ => Self::Critical,
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            Self::Low => "Normal operations expected",
            Self::Moderate => "Monitor conditions, minor delays possible",
            Self::High => "Expect delays, consider alternate airports",
            Self::Critical => "Severe disruptions expected, divert if possible",
        }
    }
}

/// Worst values over the next 24 hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub max_wind_speed_kts: f64,
    pub min_visibility_km: f64,
    pub max_precipitation_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherBriefing {
    pub airport_code: String,
    pub briefing_time: DateTime<Utc>,
    pub current_conditions: WeatherReading,
    pub forecast_24h_summary: ForecastSummary,
    pub operational_concerns: Vec<String>,
    pub risk_level: RiskLevel,
    pub recommendation: String,
}

// ---------------------------------------------------------------------------
// Flights
// ---------------------------------------------------------------------------

/// A flight as reported by the tracking provider, flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub flight_number: String,
    pub airline: String,
    pub departure_airport: String,
    pub arrival_airport: String,
    pub scheduled_departure: Option<String>,
    pub actual_departure: Option<String>,
    pub scheduled_arrival: Option<String>,
    pub actual_arrival: Option<String>,
    pub flight_status: String,
    pub delay_minutes: Option<i64>,
    pub terminal: Option<String>,
    pub gate: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStatistics {
    pub route: String,
    pub total_flights: usize,
    pub avg_delay_minutes: f64,
    pub max_delay_minutes: i64,
    pub on_time_percentage: f64,
    pub delay_percentage: f64,
    pub total_delayed: usize,
    pub total_on_time: usize,
}

/// Airport reference data from the flight-tracking provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportInfo {
    pub airport_name: String,
    pub iata_code: String,
    pub icao_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    pub gmt: Option<String>,
    pub country_name: Option<String>,
    pub country_iso2: Option<String>,
    pub city_iata_code: Option<String>,
}

// ---------------------------------------------------------------------------
// Geocoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressComponent {
    pub long_name: String,
    #[serde(default)]
    pub short_name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// First result of a forward geocode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: String,
    pub place_id: Option<String>,
    pub location_type: Option<String>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
    pub viewport: Option<serde_json::Value>,
}

impl GeocodeResult {
    /// City and country from the address components. A locality wins over a
    /// first-level administrative area.
    pub fn city_country(&self) -> (Option<String>, Option<String>) {
        let mut city = None;
        let mut country = None;
        for component in &self.address_components {
            let has = |t: &str| component.types.iter().any(|x| x == t);
            if has("locality") {
                city = Some(component.long_name.clone());
            } else if has("administrative_area_level_1") && city.is_none() {
                city = Some(component.long_name.clone());
            }
            if has("country") {
                country = Some(component.long_name.clone());
            }
        }
        (city, country)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseGeocodeResult {
    pub formatted_address: String,
    pub place_id: Option<String>,
    pub location_type: Option<String>,
    #[serde(default)]
    pub address_components: Vec<AddressComponent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimezoneInfo {
    pub timezone_id: String,
    pub timezone_name: String,
    pub raw_offset: i64,
    pub dst_offset: i64,
}

impl TimezoneInfo {
    pub fn utc_offset_seconds(&self) -> i64 {
        self.raw_offset + self.dst_offset
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceElement {
    pub status: String,
    pub distance_meters: Option<i64>,
    pub distance_text: Option<String>,
    pub duration_seconds: Option<i64>,
    pub duration_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrix {
    pub origin_addresses: Vec<String>,
    pub destination_addresses: Vec<String>,
    pub rows: Vec<Vec<DistanceElement>>,
}

impl DistanceMatrix {
    /// Driving distance of the first element, if a route was found.
    pub fn first_distance_meters(&self) -> Option<i64> {
        self.rows
            .first()
            .and_then(|row| row.first())
            .filter(|e| e.status == "OK")
            .and_then(|e| e.distance_meters)
    }
}

/// Cached airport location with timezone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportLocation {
    pub airport_code: String,
    pub airport_name: String,
    pub city: Option<String>,
    pub country: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: Option<String>,
    pub place_id: Option<String>,
    pub timezone_id: Option<String>,
    pub timezone_name: Option<String>,
    pub utc_offset_seconds: Option<i64>,
    pub elevation_meters: Option<i64>,
}

/// Cached distance between two airports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDistance {
    pub origin: String,
    pub destination: String,
    pub distance_meters: i64,
    pub distance_km: f64,
    pub distance_nm: f64,
    pub great_circle_km: f64,
    pub estimated_flight_duration_minutes: i64,
}

impl RouteDistance {
    pub fn new(
        origin: &str,
        destination: &str,
        distance_meters: i64,
        great_circle_km: f64,
        estimated_flight_duration_minutes: i64,
    ) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            distance_meters,
            distance_km: distance_meters as f64 / 1000.0,
            distance_nm: distance_meters as f64 / 1852.0,
            great_circle_km,
            estimated_flight_duration_minutes,
        }
    }
}

/// Result of a cached free-text geocode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedAddress {
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: String,
    pub place_id: Option<String>,
    pub location_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyAirport {
    #[serde(flatten)]
    pub location: AirportLocation,
    pub distance_km: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_path_renders_uppercase() {
        assert_eq!(DataPath::Mcp.to_string(), "MCP");
        assert_eq!(serde_json::to_string(&DataPath::Direct).unwrap(), "\"DIRECT\"");
        assert_eq!("MCP".parse::<DataPath>().unwrap(), DataPath::Mcp);
    }

    #[test]
    fn precipitation_classification() {
        assert_eq!(PrecipitationType::classify(0.0, 20.0), PrecipitationType::None);
        assert_eq!(PrecipitationType::classify(1.0, -3.0), PrecipitationType::Snow);
        assert_eq!(PrecipitationType::classify(1.0, 1.0), PrecipitationType::Sleet);
        assert_eq!(PrecipitationType::classify(1.0, 15.0), PrecipitationType::LightRain);
        assert_eq!(PrecipitationType::classify(5.0, 15.0), PrecipitationType::ModerateRain);
        assert_eq!(PrecipitationType::classify(9.0, 15.0), PrecipitationType::HeavyRain);
    }

    #[test]
    fn visibility_by_weather_code() {
        assert_eq!(visibility_from_weather_code(0), 10.0);
        assert_eq!(visibility_from_weather_code(45), 1.0);
        assert_eq!(visibility_from_weather_code(81), 4.0);
        assert_eq!(visibility_from_weather_code(42), 6.0);
    }

    #[test]
    fn risk_level_scale() {
        assert_eq!(RiskLevel::from_concern_count(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_concern_count(2), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_concern_count(3), RiskLevel::High);
        assert_eq!(RiskLevel::from_concern_count(5), RiskLevel::Critical);
    }

    #[test]
    fn city_country_prefers_locality() {
        let result = GeocodeResult {
            latitude: 25.25,
            longitude: 55.36,
            formatted_address: "Dubai - United Arab Emirates".into(),
            place_id: None,
            location_type: None,
            address_components: vec![
                AddressComponent {
                    long_name: "Dubai Emirate".into(),
                    short_name: "DU".into(),
                    types: vec!["administrative_area_level_1".into()],
                },
                AddressComponent {
                    long_name: "Dubai".into(),
                    short_name: "Dubai".into(),
                    types: vec!["locality".into(), "political".into()],
                },
                AddressComponent {
                    long_name: "United Arab Emirates".into(),
                    short_name: "AE".into(),
                    types: vec!["country".into()],
                },
            ],
            viewport: None,
        };
        assert_eq!(
            result.city_country(),
            (Some("Dubai".into()), Some("United Arab Emirates".into()))
        );
    }

    #[test]
    fn route_distance_units() {
        let route = RouteDistance::new("DXB", "LHR", 5_556_000, 5497.4, 412);
        assert_eq!(route.distance_km, 5556.0);
        assert!((route.distance_nm - 3000.0).abs() < 1e-9);
    }
}
