//! Protocol clients: one per data domain.
//!
//! Each client owns a [`ServerLink`] to its paired tool server, probed once
//! at construction. Every lookup tries the tool server first (when it was
//! healthy) and falls back to the provider's REST API on any failure of
//! that one call. Results carry the path that served them.

pub mod flights;
pub mod geocoding;
pub mod weather;

pub use flights::{FlightClient, FlightError};
pub use geocoding::{GeocodingClient, GeocodingError};
pub use weather::{WeatherClient, WeatherError};

use crate::clock::{system_clock, SharedClock};
use crate::tools::{CallToolRequest, ToolArgs, ToolFailure, ToolSuccess};
use crate::types::{DataPath, HealthStatus, Served};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of one `/call-tool` attempt. Never surfaced to callers of the
/// domain clients; it only triggers the direct fallback.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("tool server request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("tool {tool} failed (HTTP {status}): {message}")]
    Failed {
        tool: &'static str,
        status: u16,
        message: String,
    },

    #[error("failed to decode {tool} result: {message}")]
    Decode { tool: &'static str, message: String },

    #[error("failed to encode {tool} arguments: {source}")]
    Encode {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Connection to a paired tool server.
///
/// The health flag is written at construction and by [`ServerLink::reprobe`]
/// only; a failed tool call never clears it.
pub struct ServerLink {
    base_url: String,
    http: reqwest::Client,
    health_timeout: Duration,
    tool_timeout: Duration,
    clock: SharedClock,
    healthy: AtomicBool,
    checked_at: Mutex<chrono::DateTime<chrono::Utc>>,
}

impl ServerLink {
    /// Probe `GET /health` once. Construction never fails: an unreachable
    /// server just leaves the link marked unhealthy.
    pub async fn connect(base_url: &str, health_timeout: Duration, tool_timeout: Duration) -> Self {
        Self::connect_with_clock(base_url, health_timeout, tool_timeout, system_clock()).await
    }

    pub async fn connect_with_clock(
        base_url: &str,
        health_timeout: Duration,
        tool_timeout: Duration,
        clock: SharedClock,
    ) -> Self {
        let link = Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            health_timeout,
            tool_timeout,
            checked_at: Mutex::new(clock.utc()),
            clock,
            healthy: AtomicBool::new(false),
        };
        let status = link.reprobe().await;
        if status.healthy {
            info!("Tool server at {} is healthy", link.base_url);
        } else {
            warn!("Tool server at {} unavailable, using direct API mode", link.base_url);
        }
        link
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: self.is_healthy(),
            checked_at: *self.checked_at.lock(),
        }
    }

    /// Probe the server again and record the outcome.
    pub async fn reprobe(&self) -> HealthStatus {
        let healthy = self.probe().await;
        let checked_at = self.clock.utc();
        self.healthy.store(healthy, Ordering::Release);
        *self.checked_at.lock() = checked_at;
        HealthStatus { healthy, checked_at }
    }

    async fn probe(&self) -> bool {
        let result = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(self.health_timeout)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                debug!("Health probe of {} returned {}", self.base_url, resp.status());
                false
            }
            Err(e) => {
                debug!("Health probe of {} failed: {}", self.base_url, e);
                false
            }
        }
    }

    /// Invoke one tool and decode its typed result.
    pub async fn call_tool<A: ToolArgs>(&self, args: &A) -> Result<A::Output, ToolCallError> {
        let request = CallToolRequest::new(args).map_err(|source| ToolCallError::Encode {
            tool: A::NAME,
            source,
        })?;
        debug!("call-tool {} on {}", A::NAME, self.base_url);

        let resp = self
            .http
            .post(format!("{}/call-tool", self.base_url))
            .timeout(self.tool_timeout)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<ToolFailure>(&body)
                .map(|f| f.error)
                .unwrap_or(body);
            return Err(ToolCallError::Failed {
                tool: A::NAME,
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str::<ToolSuccess<A::Output>>(&body)
            .map(|envelope| envelope.result)
            .map_err(|e| ToolCallError::Decode {
                tool: A::NAME,
                message: e.to_string(),
            })
    }
}

/// The tool-server step: `Ok` tagged MCP, or the reason it did not serve.
async fn attempt_server<A: ToolArgs>(
    link: &ServerLink,
    args: &A,
) -> Result<Served<A::Output>, ToolCallError> {
    let data = link.call_tool(args).await?;
    Ok(Served::fresh(data, DataPath::Mcp))
}

/// Try the tool server (when the link is healthy), then `direct`.
///
/// A tool failure only degrades this one request; the next call tries the
/// server again. Only the direct step's error reaches the caller.
pub(crate) async fn serve_with_fallback<A, E, F, Fut>(
    domain: &str,
    link: &ServerLink,
    args: &A,
    direct: F,
) -> Result<Served<A::Output>, E>
where
    A: ToolArgs,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<A::Output, E>>,
{
    if link.is_healthy() {
        match attempt_server(link, args).await {
            Ok(served) => {
                debug!("{} {} served via MCP", domain, A::NAME);
                return Ok(served);
            }
            Err(e) => warn!(
                "{} tool call {} failed, falling back to direct API: {}",
                domain,
                A::NAME,
                e
            ),
        }
    }
    let data = direct().await?;
    debug!("{} {} served via DIRECT", domain, A::NAME);
    Ok(Served::fresh(data, DataPath::Direct))
}
