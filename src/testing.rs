//! In-process stand-ins for the three upstream providers, bound to
//! `127.0.0.1:0`, with call counters and a failure switch.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

pub const AVIATIONSTACK_KEY: &str = "test-aviationstack-key";
pub const GOOGLE_KEY: &str = "test-google-key";

/// Shared switches for one fake provider.
#[derive(Clone, Default)]
pub struct FakeUpstream {
    calls: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every subsequent request answer HTTP 500.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn hit(&self) -> Option<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Some((StatusCode::INTERNAL_SERVER_ERROR, "provider down").into_response())
        } else {
            None
        }
    }
}

type Params = Query<HashMap<String, String>>;

/// Serve `router` on an ephemeral port and return its base URL.
pub async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// A base URL nothing listens on.
pub async fn dead_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

// ---------------------------------------------------------------------------
// Open-Meteo
// ---------------------------------------------------------------------------

pub fn open_meteo(state: FakeUpstream) -> Router {
    Router::new().route("/v1/forecast", get(open_meteo_forecast)).with_state(state)
}

async fn open_meteo_forecast(State(state): State<FakeUpstream>, Query(params): Params) -> Response {
    if let Some(down) = state.hit() {
        return down;
    }
    if params.get("timezone").map(String::as_str) != Some("GMT") {
        return (StatusCode::BAD_REQUEST, "times must be requested in GMT").into_response();
    }
    let lat: f64 = params.get("latitude").and_then(|v| v.parse().ok()).unwrap_or(0.0);
    let lon: f64 = params.get("longitude").and_then(|v| v.parse().ok()).unwrap_or(0.0);

    if params.contains_key("current") {
        return Json(json!({
            "latitude": lat,
            "longitude": lon,
            "current_units": {
                "temperature_2m": "°C",
                "wind_speed_10m": "kn",
                "precipitation": "mm"
            },
            "current": {
                "time": "2024-06-01T12:00",
                "temperature_2m": 36.4,
                "relative_humidity_2m": 40.0,
                "precipitation": 0.0,
                "weather_code": 0,
                "cloud_cover": 10.0,
                "pressure_msl": 1004.2,
                "wind_speed_10m": 14.0,
                "wind_direction_10m": 320.0,
                "wind_gusts_10m": 22.0
            }
        }))
        .into_response();
    }

    let days: usize = params.get("forecast_days").and_then(|v| v.parse().ok()).unwrap_or(7);
    let hours = days * 24;
    let time: Vec<String> = (0..hours)
        .map(|h| format!("2024-06-{:02}T{:02}:00", 1 + h / 24, h % 24))
        .collect();
    let wind: Vec<f64> = (0..hours).map(|h| 10.0 + (h % 24) as f64).collect();
    Json(json!({
        "latitude": lat,
        "longitude": lon,
        "hourly_units": {"wind_speed_10m": "kn"},
        "hourly": {
            "time": time,
            "temperature_2m": vec![20.0; hours],
            "relative_humidity_2m": vec![55.0; hours],
            "precipitation": vec![0.0; hours],
            "weather_code": vec![3; hours],
            "cloud_cover": vec![60.0; hours],
            "wind_speed_10m": wind,
            "wind_direction_10m": vec![180.0; hours]
        }
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// AviationStack
// ---------------------------------------------------------------------------

pub fn aviationstack(state: FakeUpstream) -> Router {
    Router::new()
        .route("/v1/flights", get(aviationstack_flights))
        .route("/v1/airports", get(aviationstack_airports))
        .with_state(state)
}

fn bad_key(params: &HashMap<String, String>) -> Option<Response> {
    if params.get("access_key").map(String::as_str) != Some(AVIATIONSTACK_KEY) {
        return Some(
            Json(json!({
                "error": {
                    "code": "invalid_access_key",
                    "message": "You have not supplied a valid API Access Key."
                }
            }))
            .into_response(),
        );
    }
    None
}

async fn aviationstack_flights(
    State(state): State<FakeUpstream>,
    Query(params): Params,
) -> Response {
    if let Some(down) = state.hit() {
        return down;
    }
    if let Some(rejected) = bad_key(&params) {
        return rejected;
    }
    let dep = params.get("dep_iata").cloned().unwrap_or_else(|| "DXB".into());
    let arr = params.get("arr_iata").cloned().unwrap_or_else(|| "LHR".into());
    let date = params.get("flight_date").cloned().unwrap_or_else(|| "2024-03-01".into());
    let flight = |number: &str, delay: i64| {
        json!({
            "flight_date": date,
            "flight_status": "landed",
            "departure": {
                "iata": dep,
                "terminal": "3",
                "gate": "A1",
                "scheduled": format!("{date}T10:00:00+00:00"),
                "actual": format!("{date}T10:{delay:02}:00+00:00")
            },
            "arrival": {"iata": arr, "scheduled": format!("{date}T17:00:00+00:00")},
            "airline": {"name": "Emirates", "iata": "EK"},
            "flight": {"number": number, "iata": format!("EK{number}")}
        })
    };
    Json(json!({
        "pagination": {"limit": 100, "offset": 0, "count": 2, "total": 2},
        "data": [flight("1", 5), flight("3", 40)]
    }))
    .into_response()
}

async fn aviationstack_airports(
    State(state): State<FakeUpstream>,
    Query(params): Params,
) -> Response {
    if let Some(down) = state.hit() {
        return down;
    }
    if let Some(rejected) = bad_key(&params) {
        return rejected;
    }
    let search = params.get("search").cloned().unwrap_or_default();
    let data = if search.eq_ignore_ascii_case("DXB") {
        json!([{
            "airport_name": "Dubai",
            "iata_code": "DXB",
            "icao_code": "OMDB",
            "latitude": "25.252778",
            "longitude": "55.364444",
            "timezone": "Asia/Dubai",
            "gmt": "4",
            "country_name": "United Arab Emirates",
            "country_iso2": "AE",
            "city_iata_code": "DXB"
        }])
    } else {
        json!([])
    };
    Json(json!({
        "pagination": {"limit": 100, "offset": 0, "count": 1, "total": 1},
        "data": data
    }))
    .into_response()
}

// ---------------------------------------------------------------------------
// Google Maps
// ---------------------------------------------------------------------------

pub fn google_maps(state: FakeUpstream) -> Router {
    Router::new()
        .route("/maps/api/geocode/json", get(google_geocode))
        .route("/maps/api/timezone/json", get(google_timezone))
        .route("/maps/api/distancematrix/json", get(google_distance_matrix))
        .with_state(state)
}

fn google_denied(params: &HashMap<String, String>) -> Option<Response> {
    if params.get("key").map(String::as_str) != Some(GOOGLE_KEY) {
        return Some(
            Json(json!({
                "status": "REQUEST_DENIED",
                "error_message": "The provided API key is invalid.",
                "results": []
            }))
            .into_response(),
        );
    }
    None
}

fn place(address: &str, lat: f64, lng: f64, city: &str, country: &str) -> Value {
    json!({
        "formatted_address": address,
        "place_id": format!("place-{city}"),
        "address_components": [
            {"long_name": city, "short_name": city, "types": ["locality", "political"]},
            {"long_name": country, "short_name": country, "types": ["country", "political"]}
        ],
        "geometry": {
            "location": {"lat": lat, "lng": lng},
            "location_type": "GEOMETRIC_CENTER",
            "viewport": {"northeast": {"lat": lat + 0.01, "lng": lng + 0.01}}
        }
    })
}

async fn google_geocode(State(state): State<FakeUpstream>, Query(params): Params) -> Response {
    if let Some(down) = state.hit() {
        return down;
    }
    if let Some(denied) = google_denied(&params) {
        return denied;
    }
    if let Some(latlng) = params.get("latlng") {
        return Json(json!({
            "status": "OK",
            "results": [place(&format!("Near {latlng}"), 0.0, 0.0, "Somewhere", "Nowhere")]
        }))
        .into_response();
    }
    let address = params.get("address").cloned().unwrap_or_default().to_uppercase();
    let result = if address.starts_with("DXB") {
        place(
            "Dubai International Airport - Dubai - United Arab Emirates",
            25.2532,
            55.3657,
            "Dubai",
            "United Arab Emirates",
        )
    } else if address.starts_with("LHR") {
        place(
            "Heathrow Airport, Longford, Hounslow, UK",
            51.4700,
            -0.4543,
            "London",
            "United Kingdom",
        )
    } else if address.starts_with("DWC") {
        place(
            "Al Maktoum International Airport - Dubai - United Arab Emirates",
            24.8960,
            55.1614,
            "Dubai",
            "United Arab Emirates",
        )
    } else if address.contains("TOWER") {
        place(
            "Burj Khalifa, Dubai, United Arab Emirates",
            25.1972,
            55.2744,
            "Dubai",
            "United Arab Emirates",
        )
    } else {
        return Json(json!({"status": "ZERO_RESULTS", "results": []})).into_response();
    };
    Json(json!({"status": "OK", "results": [result]})).into_response()
}

async fn google_timezone(State(state): State<FakeUpstream>, Query(params): Params) -> Response {
    if let Some(down) = state.hit() {
        return down;
    }
    if let Some(denied) = google_denied(&params) {
        return denied;
    }
    let lon: f64 = params
        .get("location")
        .and_then(|l| l.split(',').nth(1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.0);
    let body = if lon > 30.0 {
        json!({
            "status": "OK",
            "timeZoneId": "Asia/Dubai",
            "timeZoneName": "Gulf Standard Time",
            "rawOffset": 14400,
            "dstOffset": 0
        })
    } else {
        json!({
            "status": "OK",
            "timeZoneId": "Europe/London",
            "timeZoneName": "British Summer Time",
            "rawOffset": 0,
            "dstOffset": 3600
        })
    };
    Json(body).into_response()
}

async fn google_distance_matrix(
    State(state): State<FakeUpstream>,
    Query(params): Params,
) -> Response {
    if let Some(down) = state.hit() {
        return down;
    }
    if let Some(denied) = google_denied(&params) {
        return denied;
    }
    // Intercontinental pairs have no driving route.
    let origin = params.get("origins").cloned().unwrap_or_default();
    let destination = params.get("destinations").cloned().unwrap_or_default();
    let element = if origin.starts_with("25.") && destination.starts_with("24.") {
        json!({
            "status": "OK",
            "distance": {"text": "62 km", "value": 62_000},
            "duration": {"text": "45 mins", "value": 2700}
        })
    } else {
        json!({"status": "ZERO_RESULTS"})
    };
    Json(json!({
        "status": "OK",
        "origin_addresses": [origin],
        "destination_addresses": [destination],
        "rows": [{"elements": [element]}]
    }))
    .into_response()
}
