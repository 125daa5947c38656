//! AviationStack flight-tracking API.

use super::{fetch_json, trim_base, UpstreamError};
use crate::types::{AirportInfo, FlightRecord};
use crate::validate::FlightDate;
use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const PROVIDER: &str = "aviationstack";

/// Optional filters shared by the real-time and historical flight lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlightQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_iata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dep_iata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arr_iata: Option<String>,
}

impl FlightQuery {
    pub fn route(dep_iata: &str, arr_iata: &str) -> Self {
        Self {
            flight_iata: None,
            dep_iata: Some(dep_iata.to_string()),
            arr_iata: Some(arr_iata.to_string()),
        }
    }

    pub fn flight(flight_iata: &str) -> Self {
        Self {
            flight_iata: Some(flight_iata.to_string()),
            ..Self::default()
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(v) = &self.flight_iata {
            params.push(("flight_iata", v.clone()));
        }
        if let Some(v) = &self.dep_iata {
            params.push(("dep_iata", v.clone()));
        }
        if let Some(v) = &self.arr_iata {
            params.push(("arr_iata", v.clone()));
        }
        params
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total: u32,
}

/// One page of normalised flights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightPage {
    pub pagination: Pagination,
    pub data: Vec<FlightRecord>,
}

// -- Raw provider shapes ------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEnvelope<T> {
    #[serde(default)]
    pagination: Option<Pagination>,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEndpoint {
    iata: Option<String>,
    terminal: Option<String>,
    gate: Option<String>,
    scheduled: Option<String>,
    actual: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawNamed {
    name: Option<String>,
    iata: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFlight {
    flight_status: Option<String>,
    departure: Option<RawEndpoint>,
    arrival: Option<RawEndpoint>,
    airline: Option<RawNamed>,
    flight: Option<RawNamed>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAirport {
    airport_name: Option<String>,
    iata_code: Option<String>,
    icao_code: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    latitude: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    longitude: Option<f64>,
    timezone: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    gmt: Option<String>,
    country_name: Option<String>,
    country_iso2: Option<String>,
    city_iata_code: Option<String>,
}

/// The provider sends coordinates as strings on some plans and numbers on others.
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Departure delay in whole minutes, when both times parse.
pub fn delay_minutes(scheduled: Option<&str>, actual: Option<&str>) -> Option<i64> {
    let scheduled = DateTime::parse_from_rfc3339(scheduled?).ok()?;
    let actual = DateTime::parse_from_rfc3339(actual?).ok()?;
    Some((actual - scheduled).num_minutes())
}

impl From<RawFlight> for FlightRecord {
    fn from(raw: RawFlight) -> Self {
        let departure = raw.departure.unwrap_or_default();
        let arrival = raw.arrival.unwrap_or_default();
        let delay = delay_minutes(departure.scheduled.as_deref(), departure.actual.as_deref());
        Self {
            flight_number: raw
                .flight
                .and_then(|f| f.iata)
                .unwrap_or_else(|| "UNKNOWN".into()),
            airline: raw
                .airline
                .and_then(|a| a.name)
                .unwrap_or_else(|| "Unknown".into()),
            departure_airport: departure.iata.unwrap_or_else(|| "UNKNOWN".into()),
            arrival_airport: arrival.iata.unwrap_or_else(|| "UNKNOWN".into()),
            scheduled_departure: departure.scheduled,
            actual_departure: departure.actual,
            scheduled_arrival: arrival.scheduled,
            actual_arrival: arrival.actual,
            flight_status: raw.flight_status.unwrap_or_else(|| "unknown".into()),
            delay_minutes: delay,
            terminal: departure.terminal,
            gate: departure.gate,
        }
    }
}

impl From<RawAirport> for AirportInfo {
    fn from(raw: RawAirport) -> Self {
        Self {
            airport_name: raw.airport_name.unwrap_or_default(),
            iata_code: raw.iata_code.unwrap_or_default(),
            icao_code: raw.icao_code,
            latitude: raw.latitude,
            longitude: raw.longitude,
            timezone: raw.timezone,
            gmt: raw.gmt,
            country_name: raw.country_name,
            country_iso2: raw.country_iso2,
            city_iata_code: raw.city_iata_code,
        }
    }
}

fn check_provider_error<T>(envelope: &RawEnvelope<T>) -> Result<(), UpstreamError> {
    if let Some(err) = &envelope.error {
        if matches!(err.code.as_deref(), Some("usage_limit_reached" | "rate_limit_reached")) {
            return Err(UpstreamError::RateLimited(PROVIDER));
        }
        let message = match (&err.code, &err.message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (None, Some(msg)) => msg.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unspecified provider error".into(),
        };
        return Err(UpstreamError::provider(PROVIDER, message));
    }
    Ok(())
}

/// AviationStack REST adapter.
#[derive(Debug, Clone)]
pub struct AviationStackApi {
    base_url: String,
    api_key: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl AviationStackApi {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            base_url: trim_base(base_url),
            api_key: api_key.to_string(),
            timeout,
            http: reqwest::Client::new(),
        }
    }

    /// Flights matching `query`; historical when `flight_date` is set.
    pub async fn flights(
        &self,
        query: &FlightQuery,
        flight_date: Option<FlightDate>,
        limit: u32,
    ) -> Result<FlightPage, UpstreamError> {
        debug!("AviationStack flights: {:?} date={:?} limit={}", query, flight_date, limit);

        let mut params = query.params();
        params.push(("limit", limit.to_string()));
        if let Some(date) = flight_date {
            params.push(("flight_date", date.to_string()));
        }

        let request = self
            .http
            .get(format!("{}/v1/flights", self.base_url))
            .timeout(self.timeout)
            .query(&[("access_key", self.api_key.as_str())])
            .query(&params);
        let envelope: RawEnvelope<RawFlight> = fetch_json(PROVIDER, request).await?;
        check_provider_error(&envelope)?;

        let data: Vec<FlightRecord> = envelope.data.into_iter().map(FlightRecord::from).collect();
        let pagination = envelope.pagination.unwrap_or(Pagination {
            limit,
            offset: 0,
            count: data.len() as u32,
            total: data.len() as u32,
        });
        Ok(FlightPage { pagination, data })
    }

    /// Airports matching a free-text search.
    pub async fn airports(&self, search: &str) -> Result<Vec<AirportInfo>, UpstreamError> {
        let request = self
            .http
            .get(format!("{}/v1/airports", self.base_url))
            .timeout(self.timeout)
            .query(&[("access_key", self.api_key.as_str()), ("search", search)]);
        let envelope: RawEnvelope<RawAirport> = fetch_json(PROVIDER, request).await?;
        check_provider_error(&envelope)?;
        Ok(envelope.data.into_iter().map(AirportInfo::from).collect())
    }

    /// The airport whose IATA code is `code`, falling back to the first
    /// search hit.
    pub async fn airport(&self, code: &str) -> Result<AirportInfo, UpstreamError> {
        let mut airports = self.airports(code).await?;
        if airports.is_empty() {
            return Err(UpstreamError::not_found(PROVIDER, format!("Airport {code} not found")));
        }
        let exact = airports
            .iter()
            .position(|a| a.iata_code.eq_ignore_ascii_case(code))
            .unwrap_or(0);
        Ok(airports.swap_remove(exact))
    }
}
