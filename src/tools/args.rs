//! Typed input for every tool, shared by the servers (which parse and check
//! it) and the clients (which build it), so both sides agree on names,
//! types and limits.

use super::traits::{ToolDescriptor, ToolError};
use crate::types::{AirportInfo, DistanceMatrix, GeocodeResult, ReverseGeocodeResult, TimezoneInfo};
use crate::upstream::aviationstack::{FlightPage, FlightQuery};
use crate::upstream::googlemaps::TRAVEL_MODES;
use crate::upstream::openmeteo::{CurrentConditions, HourlyForecast};
use crate::validate::{
    in_range, non_empty_text, AirportCode, Coordinates, FlightDate, ValidationError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const MAX_FLIGHT_LIMIT: u32 = 100;
pub const MAX_FORECAST_DAYS: u32 = 16;
pub const MAX_MATRIX_POINTS: usize = 25;

/// Arguments for one tool, bound to the tool's name and result type.
pub trait ToolArgs: Serialize + DeserializeOwned + Send + Sync {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    /// What a successful call returns inside `{result}`.
    type Output: Serialize + DeserializeOwned + Send;

    fn input_schema() -> Value;

    /// Check limits and normalise (codes uppercased, text trimmed).
    fn checked(self) -> Result<Self, ValidationError>;

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: Self::NAME.to_string(),
            description: Self::DESCRIPTION.to_string(),
            input_schema: Self::input_schema(),
        }
    }

    /// Decode an argument map and check it.
    fn parse(arguments: Value) -> Result<Self, ToolError> {
        let args: Self = serde_json::from_value(arguments)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        Ok(args.checked()?)
    }
}

fn coordinate_schema() -> Value {
    json!({
        "latitude": {"type": "number", "description": "Latitude in degrees (-90 to 90)"},
        "longitude": {"type": "number", "description": "Longitude in degrees (-180 to 180)"}
    })
}

fn object_schema(mut properties: Value, extra: Value, required: &[&str]) -> Value {
    if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            props.insert(k.clone(), v.clone());
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn flight_filter_schema() -> Value {
    json!({
        "flight_iata": {"type": "string", "description": "Flight IATA code, e.g. EK230"},
        "dep_iata": {"type": "string", "description": "Departure airport IATA code"},
        "arr_iata": {"type": "string", "description": "Arrival airport IATA code"},
        "limit": {"type": "integer", "description": "Maximum results (1-100, default 100)"}
    })
}

fn checked_query(query: FlightQuery) -> Result<FlightQuery, ValidationError> {
    let code =
        |raw: Option<String>, field: &'static str| -> Result<Option<String>, ValidationError> {
            raw.filter(|v| !v.trim().is_empty())
                .map(|v| AirportCode::parse_field(&v, field).map(String::from))
                .transpose()
        };
    let flight_iata = match query.flight_iata.filter(|v| !v.trim().is_empty()) {
        Some(v) => {
            let v = non_empty_text("flight_iata", &v, 2)?.to_uppercase();
            if !v.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(ValidationError::new(
                    "flight_iata",
                    format!("'{v}' must be alphanumeric"),
                ));
            }
            Some(v)
        }
        None => None,
    };
    Ok(FlightQuery {
        flight_iata,
        dep_iata: code(query.dep_iata, "dep_iata")?,
        arr_iata: code(query.arr_iata, "arr_iata")?,
    })
}

fn checked_limit(limit: Option<u32>) -> Result<Option<u32>, ValidationError> {
    limit
        .map(|l| in_range("limit", l, 1, MAX_FLIGHT_LIMIT))
        .transpose()
}

// ---------------------------------------------------------------------------
// Weather
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeatherArgs {
    pub latitude: f64,
    pub longitude: f64,
}

impl CurrentWeatherArgs {
    pub fn at(coords: Coordinates) -> Self {
        Self {
            latitude: coords.latitude,
            longitude: coords.longitude,
        }
    }

    pub fn coordinates(&self) -> Result<Coordinates, ValidationError> {
        Coordinates::new(self.latitude, self.longitude)
    }
}

impl ToolArgs for CurrentWeatherArgs {
    const NAME: &'static str = "get_current_weather";
    const DESCRIPTION: &'static str = "Current weather conditions at a point (knots, celsius, mm).";
    type Output = CurrentConditions;

    fn input_schema() -> Value {
        object_schema(coordinate_schema(), json!({}), &["latitude", "longitude"])
    }

    fn checked(self) -> Result<Self, ValidationError> {
        self.coordinates()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastArgs {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forecast_days: Option<u32>,
}

impl ForecastArgs {
    pub const DEFAULT_DAYS: u32 = 7;

    pub fn coordinates(&self) -> Result<Coordinates, ValidationError> {
        Coordinates::new(self.latitude, self.longitude)
    }

    pub fn days(&self) -> u32 {
        self.forecast_days.unwrap_or(Self::DEFAULT_DAYS)
    }
}

impl ToolArgs for ForecastArgs {
    const NAME: &'static str = "get_forecast";
    const DESCRIPTION: &'static str = "Hourly weather forecast at a point for up to 16 days.";
    type Output = HourlyForecast;

    fn input_schema() -> Value {
        object_schema(
            coordinate_schema(),
            json!({
                "forecast_days": {
                    "type": "integer",
                    "description": "Days to forecast (1-16, default 7)"
                }
            }),
            &["latitude", "longitude"],
        )
    }

    fn checked(self) -> Result<Self, ValidationError> {
        self.coordinates()?;
        if let Some(days) = self.forecast_days {
            in_range("forecast_days", days, 1, MAX_FORECAST_DAYS)?;
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Flights
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RealTimeFlightsArgs {
    #[serde(flatten)]
    pub query: FlightQuery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl RealTimeFlightsArgs {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(MAX_FLIGHT_LIMIT)
    }
}

impl ToolArgs for RealTimeFlightsArgs {
    const NAME: &'static str = "get_real_time_flights";
    const DESCRIPTION: &'static str =
        "Live flights filtered by flight number and/or departure and arrival airports.";
    type Output = FlightPage;

    fn input_schema() -> Value {
        object_schema(flight_filter_schema(), json!({}), &[])
    }

    fn checked(self) -> Result<Self, ValidationError> {
        Ok(Self {
            query: checked_query(self.query)?,
            limit: checked_limit(self.limit)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalFlightsArgs {
    pub flight_date: FlightDate,
    #[serde(flatten)]
    pub query: FlightQuery,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl HistoricalFlightsArgs {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(MAX_FLIGHT_LIMIT)
    }
}

impl ToolArgs for HistoricalFlightsArgs {
    const NAME: &'static str = "get_historical_flights";
    const DESCRIPTION: &'static str =
        "Flights on a past date, filtered by flight number and/or route.";
    type Output = FlightPage;

    fn input_schema() -> Value {
        object_schema(
            flight_filter_schema(),
            json!({"flight_date": {"type": "string", "description": "Date in YYYY-MM-DD format"}}),
            &["flight_date"],
        )
    }

    fn checked(self) -> Result<Self, ValidationError> {
        Ok(Self {
            flight_date: self.flight_date,
            query: checked_query(self.query)?,
            limit: checked_limit(self.limit)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportInfoArgs {
    pub airport_iata: String,
}

impl ToolArgs for AirportInfoArgs {
    const NAME: &'static str = "get_airport_info";
    const DESCRIPTION: &'static str = "Reference data for one airport by IATA code.";
    type Output = AirportInfo;

    fn input_schema() -> Value {
        object_schema(
            json!({
                "airport_iata": {"type": "string", "description": "Airport IATA code, e.g. DXB"}
            }),
            json!({}),
            &["airport_iata"],
        )
    }

    fn checked(self) -> Result<Self, ValidationError> {
        let code = AirportCode::parse_field(&self.airport_iata, "airport_iata")?;
        Ok(Self {
            airport_iata: code.into(),
        })
    }
}

// ---------------------------------------------------------------------------
// Geocoding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeArgs {
    pub address: String,
}

impl ToolArgs for GeocodeArgs {
    const NAME: &'static str = "geocode";
    const DESCRIPTION: &'static str = "Coordinates and address components for a free-text address.";
    type Output = GeocodeResult;

    fn input_schema() -> Value {
        object_schema(
            json!({
                "address": {
                    "type": "string",
                    "description": "Address or place name (min 3 characters)"
                }
            }),
            json!({}),
            &["address"],
        )
    }

    fn checked(self) -> Result<Self, ValidationError> {
        Ok(Self {
            address: non_empty_text("address", &self.address, 3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseGeocodeArgs {
    pub latitude: f64,
    pub longitude: f64,
}

impl ReverseGeocodeArgs {
    pub fn coordinates(&self) -> Result<Coordinates, ValidationError> {
        Coordinates::new(self.latitude, self.longitude)
    }
}

impl ToolArgs for ReverseGeocodeArgs {
    const NAME: &'static str = "reverse_geocode";
    const DESCRIPTION: &'static str = "Nearest address for a coordinate pair.";
    type Output = ReverseGeocodeResult;

    fn input_schema() -> Value {
        object_schema(coordinate_schema(), json!({}), &["latitude", "longitude"])
    }

    fn checked(self) -> Result<Self, ValidationError> {
        self.coordinates()?;
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimezoneArgs {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl TimezoneArgs {
    pub fn coordinates(&self) -> Result<Coordinates, ValidationError> {
        Coordinates::new(self.latitude, self.longitude)
    }
}

impl ToolArgs for TimezoneArgs {
    const NAME: &'static str = "get_timezone";
    const DESCRIPTION: &'static str = "Timezone id, name and UTC offset at a point.";
    type Output = TimezoneInfo;

    fn input_schema() -> Value {
        object_schema(
            coordinate_schema(),
            json!({"timestamp": {"type": "integer", "description": "Unix seconds (default: now)"}}),
            &["latitude", "longitude"],
        )
    }

    fn checked(self) -> Result<Self, ValidationError> {
        self.coordinates()?;
        if let Some(ts) = self.timestamp {
            if ts < 0 {
                return Err(ValidationError::new("timestamp", "must not be negative"));
            }
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceMatrixArgs {
    pub origins: Vec<String>,
    pub destinations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

impl DistanceMatrixArgs {
    pub fn mode(&self) -> &str {
        self.mode.as_deref().unwrap_or("driving")
    }
}

impl ToolArgs for DistanceMatrixArgs {
    const NAME: &'static str = "distance_matrix";
    const DESCRIPTION: &'static str =
        "Travel distance and time between sets of origins and destinations.";
    type Output = DistanceMatrix;

    fn input_schema() -> Value {
        object_schema(
            json!({
                "origins": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Up to 25 addresses or lat,lng pairs"
                },
                "destinations": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Up to 25 addresses or lat,lng pairs"
                },
                "mode": {
                    "type": "string",
                    "enum": TRAVEL_MODES,
                    "description": "Travel mode (default driving)"
                }
            }),
            json!({}),
            &["origins", "destinations"],
        )
    }

    fn checked(self) -> Result<Self, ValidationError> {
        for (field, points) in [("origins", &self.origins), ("destinations", &self.destinations)] {
            if points.is_empty() || points.iter().any(|p| p.trim().is_empty()) {
                return Err(ValidationError::new(field, "must list at least one non-empty point"));
            }
            if points.len() > MAX_MATRIX_POINTS {
                return Err(ValidationError::new(
                    field,
                    format!("at most {MAX_MATRIX_POINTS} points per request"),
                ));
            }
        }
        if let Some(mode) = &self.mode {
            if !TRAVEL_MODES.contains(&mode.as_str()) {
                return Err(ValidationError::new(
                    "mode",
                    format!("'{mode}' must be one of: {}", TRAVEL_MODES.join(", ")),
                ));
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_field_is_named() {
        let err = GeocodeArgs::parse(json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(err.to_string().contains("address"));

        let err = HistoricalFlightsArgs::parse(json!({"dep_iata": "DXB"})).unwrap_err();
        assert!(err.to_string().contains("flight_date"));
    }

    #[test]
    fn out_of_range_coordinates_rejected() {
        let err =
            CurrentWeatherArgs::parse(json!({"latitude": 999.0, "longitude": 0.0})).unwrap_err();
        match err {
            ToolError::Validation(v) => assert_eq!(v.field, "latitude"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn flight_filters_are_normalised() {
        let args = RealTimeFlightsArgs::parse(json!({
            "flight_iata": "ek230",
            "dep_iata": " dxb",
            "arr_iata": null,
            "limit": 10
        }))
        .unwrap();
        assert_eq!(args.query.flight_iata.as_deref(), Some("EK230"));
        assert_eq!(args.query.dep_iata.as_deref(), Some("DXB"));
        assert_eq!(args.query.arr_iata, None);
        assert_eq!(args.limit(), 10);

        let err = RealTimeFlightsArgs::parse(json!({"limit": 101})).unwrap_err();
        assert!(err.to_string().contains("limit"));
        let err = RealTimeFlightsArgs::parse(json!({"dep_iata": "D"})).unwrap_err();
        assert!(err.to_string().contains("dep_iata"));
    }

    #[test]
    fn historical_date_must_be_strict() {
        assert!(HistoricalFlightsArgs::parse(json!({"flight_date": "2024-3-1"})).is_err());
        let args =
            HistoricalFlightsArgs::parse(json!({"flight_date": "2024-03-01", "arr_iata": "lhr"}))
                .unwrap();
        assert_eq!(args.flight_date.to_string(), "2024-03-01");
        assert_eq!(args.limit(), MAX_FLIGHT_LIMIT);
    }

    #[test]
    fn airport_info_code_checked() {
        let args = AirportInfoArgs::parse(json!({"airport_iata": "jfk"})).unwrap();
        assert_eq!(args.airport_iata, "JFK");
        let err = AirportInfoArgs::parse(json!({"airport_iata": "J"})).unwrap_err();
        assert!(err.to_string().contains("airport_iata"));
    }

    #[test]
    fn distance_matrix_limits() {
        assert!(DistanceMatrixArgs::parse(json!({"origins": [], "destinations": ["a"]})).is_err());
        let flying = json!({"origins": ["a"], "destinations": ["b"], "mode": "flying"});
        assert!(DistanceMatrixArgs::parse(flying).is_err());
        let many: Vec<String> = (0..26).map(|i| format!("p{i}")).collect();
        let too_many = json!({"origins": many, "destinations": ["b"]});
        assert!(DistanceMatrixArgs::parse(too_many).is_err());
        let ok = json!({"origins": ["25.2,55.3"], "destinations": ["51.4,-0.4"]});
        let ok = DistanceMatrixArgs::parse(ok).unwrap();
        assert_eq!(ok.mode(), "driving");
    }

    #[test]
    fn descriptors_list_required_fields() {
        let d = ForecastArgs::descriptor();
        assert_eq!(d.name, "get_forecast");
        assert_eq!(d.input_schema["required"], json!(["latitude", "longitude"]));
        assert!(d.input_schema["properties"]["forecast_days"].is_object());
    }

    #[test]
    fn client_built_args_round_trip_through_parse() {
        let args = RealTimeFlightsArgs {
            query: FlightQuery::route("DXB", "LHR"),
            limit: Some(5),
        };
        let value = serde_json::to_value(&args).unwrap();
        assert_eq!(RealTimeFlightsArgs::parse(value).unwrap(), args);
    }
}
