//! Tool provider trait and the structured tool failure.

use crate::upstream::UpstreamError;
use crate::validate::ValidationError;
use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Static metadata for one tool a server exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A structured tool failure, rendered as `{error, tool}` with a non-2xx status.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool '{name}'. Available tools: {}", available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    Upstream(String),
}

impl ToolError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownTool { .. } | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidArguments(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<UpstreamError> for ToolError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::NotFound { message, .. } => Self::NotFound(message),
            UpstreamError::RateLimited(_) => Self::RateLimited(err.to_string()),
            other => Self::Upstream(other.to_string()),
        }
    }
}

/// A tool server's domain: a fixed set of tools, each forwarding to one
/// upstream endpoint.
#[async_trait]
pub trait ToolProvider: Send + Sync + 'static {
    /// Service name reported by `/health`.
    fn service(&self) -> &'static str;

    /// The tools this provider exposes.
    fn descriptors(&self) -> Vec<ToolDescriptor>;

    /// Run the named tool. Never panics on bad input; every failure is a
    /// [`ToolError`].
    async fn call(&self, name: &str, arguments: Value) -> Result<Value, ToolError>;

    fn tool_names(&self) -> Vec<String> {
        self.descriptors().into_iter().map(|d| d.name).collect()
    }

    fn unknown_tool(&self, name: &str) -> ToolError {
        ToolError::UnknownTool {
            name: name.to_string(),
            available: self.tool_names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        let unknown = ToolError::UnknownTool {
            name: "nope".into(),
            available: vec!["geocode".into(), "get_timezone".into()],
        };
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        assert!(unknown.to_string().contains("geocode, get_timezone"));

        let invalid: ToolError =
            ValidationError::new("latitude", "999 is outside [-90, 90]").into();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);
        assert!(invalid.to_string().contains("latitude"));

        let limited: ToolError = UpstreamError::RateLimited("google-maps").into();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let missing: ToolError =
            UpstreamError::not_found("aviationstack", "Airport ZZZ not found").into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let upstream: ToolError = UpstreamError::provider("aviationstack", "bad key").into();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }
}
