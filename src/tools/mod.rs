//! The tool-invocation protocol: descriptors, typed arguments, and the
//! JSON envelopes exchanged over `/call-tool`.

pub mod args;
pub mod traits;

pub use args::ToolArgs;
pub use traits::{ToolDescriptor, ToolError, ToolProvider};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `POST /call-tool` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallToolRequest {
    pub name: String,
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Default::default())
}

impl CallToolRequest {
    pub fn new<A: ToolArgs>(args: &A) -> Result<Self, serde_json::Error> {
        Ok(Self {
            name: A::NAME.to_string(),
            arguments: serde_json::to_value(args)?,
        })
    }
}

/// Success envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSuccess<T> {
    pub result: T,
}

/// Failure envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

/// `GET /tools` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolListing {
    pub tools: Vec<ToolDescriptor>,
}

/// `GET /health` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
