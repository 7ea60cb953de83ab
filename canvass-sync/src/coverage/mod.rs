//! Coverage service integration
//!
//! The coverage service checks whether an address can be served. Registration
//! returns a correlation id; the result is polled later by id.

pub mod client;
pub mod payload;
pub mod registrar;

pub use client::CoverageClient;
pub use payload::RegistrationPayload;
pub use registrar::CoverageRegistrar;

use crate::error::SyncResult;
use crate::sheets::StatusCells;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coverage service operations
#[async_trait]
pub trait CoverageApi: Send + Sync {
    /// Register a submission; returns the service's correlation id
    async fn register(&self, payload: &RegistrationPayload) -> SyncResult<String>;

    /// Current result of a registered check
    async fn status(&self, correlation_id: &str) -> SyncResult<CoverageStatus>;
}

/// Result of a status query
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CoverageStatus {
    #[serde(default, deserialize_with = "flag")]
    pub is_covered: Option<bool>,
    #[serde(default, deserialize_with = "text")]
    pub homepassed_id: Option<String>,
    #[serde(default, deserialize_with = "text")]
    pub operator_remarks: Option<String>,
}

impl CoverageStatus {
    /// Not covered is final. Covered is final only once a homepassed id exists.
    pub fn is_terminal(&self) -> bool {
        match self.is_covered {
            Some(false) => true,
            Some(true) => self.homepassed_id.is_some(),
            None => false,
        }
    }

    /// Cells written to the status sheet for a terminal result
    pub fn status_cells(&self) -> StatusCells {
        let coverage = match self.is_covered {
            Some(true) => "Covered",
            _ => "Not Covered",
        };
        StatusCells {
            coverage: coverage.to_string(),
            homepassed_id: self.homepassed_id.clone().unwrap_or_default(),
            operator_remarks: self.operator_remarks.clone().unwrap_or_default(),
        }
    }
}

/// Accepts `true`/`false`, `1`/`0` and their string forms
fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

/// Strings and numbers as text; null and blank as `None`
fn text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}
