//! Provider REST adapters.
//!
//! Each method performs exactly one HTTP call with a fixed timeout and
//! normalises the provider's payload. The tool servers and the clients'
//! direct path both go through these, so the two paths cannot drift.

pub mod aviationstack;
pub mod googlemaps;
pub mod openmeteo;

pub use aviationstack::AviationStackApi;
pub use googlemaps::GoogleMapsApi;
pub use openmeteo::OpenMeteoApi;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Failure of a single upstream call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    #[error("{provider}: {message}")]
    NotFound {
        provider: &'static str,
        message: String,
    },

    #[error("failed to decode {provider} response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    #[error("{0} rate limit exceeded")]
    RateLimited(&'static str),
}

impl UpstreamError {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    pub fn not_found(provider: &'static str, message: impl Into<String>) -> Self {
        Self::NotFound {
            provider,
            message: message.into(),
        }
    }

    pub fn decode(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            provider,
            message: message.into(),
        }
    }

    /// Transient failures a later retry may fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::RateLimited(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Provider { .. } | Self::NotFound { .. } | Self::Decode { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Send a prepared request and decode the JSON body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    provider: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T, UpstreamError> {
    let resp = request
        .send()
        .await
        .map_err(|source| UpstreamError::Transport { provider, source })?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        debug!("{} call failed ({}): {}", provider, status, body);
        return Err(UpstreamError::Status {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    let body = resp
        .text()
        .await
        .map_err(|source| UpstreamError::Transport { provider, source })?;
    serde_json::from_str(&body).map_err(|e| UpstreamError::decode(provider, e.to_string()))
}

pub(crate) fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}
