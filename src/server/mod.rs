//! Tool servers: one small HTTP service per data domain.
//!
//! Every server speaks the same surface:
//! - `GET /health` answers without touching the upstream.
//! - `GET /tools` lists the static tool descriptors.
//! - `POST /call-tool` dispatches `{name, arguments}` to the provider.

pub mod flights;
pub mod geocoding;
pub mod weather;

pub use flights::FlightTools;
pub use geocoding::GeocodingTools;
pub use weather::WeatherTools;

use crate::ratelimit::RateLimiter;
use crate::tools::{
    CallToolRequest, HealthReport, ToolError, ToolFailure, ToolListing, ToolProvider, ToolSuccess,
};
use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Shared handler state.
#[derive(Clone)]
pub struct ToolServerState {
    provider: Arc<dyn ToolProvider>,
}

impl ToolServerState {
    pub fn new(provider: Arc<dyn ToolProvider>) -> Self {
        Self { provider }
    }
}

/// Router for one provider.
pub fn router(state: ToolServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/call-tool", post(call_tool))
        .with_state(state)
}

/// Serve `provider` on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    provider: Arc<dyn ToolProvider>,
    cancel: CancellationToken,
) -> Result<()> {
    let service = provider.service();
    let addr = listener.local_addr().context("listener has no local address")?;
    info!("{} listening on http://{}", service, addr);

    axum::serve(listener, router(ToolServerState::new(provider)))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
            info!("{} received shutdown signal", service);
        })
        .await
        .context("tool server failed")?;

    info!("{} shutdown complete", service);
    Ok(())
}

async fn health(State(state): State<ToolServerState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "healthy".into(),
        service: state.provider.service().into(),
        version: env!("CARGO_PKG_VERSION").into(),
        timestamp: Utc::now(),
    })
}

async fn list_tools(State(state): State<ToolServerState>) -> Json<ToolListing> {
    Json(ToolListing {
        tools: state.provider.descriptors(),
    })
}

async fn call_tool(
    State(state): State<ToolServerState>,
    body: Result<Json<CallToolRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return failure(
                StatusCode::BAD_REQUEST,
                format!("Malformed request: {}", rejection.body_text()),
                None,
            );
        }
    };

    let call_id = Ulid::new();
    debug!("{} call-tool {} [{}]", state.provider.service(), request.name, call_id);
    match state.provider.call(&request.name, request.arguments).await {
        Ok(result) => (StatusCode::OK, Json(ToolSuccess { result })).into_response(),
        Err(err) => {
            let status = err.status();
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                warn!(
                    "{} tool {} failed [{}]: {}",
                    state.provider.service(),
                    request.name,
                    call_id,
                    err
                );
            } else {
                debug!(
                    "{} tool {} rejected [{}]: {}",
                    state.provider.service(),
                    request.name,
                    call_id,
                    err
                );
            }
            failure(status, err.to_string(), Some(request.name))
        }
    }
}

fn failure(status: StatusCode, error: String, tool: Option<String>) -> Response {
    (status, Json(ToolFailure { error, tool })).into_response()
}

/// Take one unit of the server's upstream budget.
pub(crate) fn admit(limiter: &dyn RateLimiter, provider: &str) -> Result<(), ToolError> {
    if limiter.admit() {
        Ok(())
    } else {
        Err(ToolError::RateLimited(format!(
            "{provider} rate limit exceeded, retry later"
        )))
    }
}

pub(crate) fn to_result<T: Serialize>(value: T) -> Result<Value, ToolError> {
    serde_json::to_value(value)
        .map_err(|e| ToolError::Upstream(format!("failed to encode result: {e}")))
}
