//! Trace and template data types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// SQLTrace
// =============================================================================

/// One captured query event. Immutable after ingest.
///
/// Serializes to the canonical trace line format, which the parser reads
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlTrace {
    pub query: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<BTreeMap<String, serde_json::Value>>,
    /// Measured latency in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_scanned: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

impl SqlTrace {
    pub fn new(query: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            query: query.into(),
            timestamp,
            parameters: None,
            latency: None,
            rows: None,
            rows_scanned: None,
            db: None,
            user: None,
            client: None,
        }
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, serde_json::Value>) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Bound value for a named placeholder, if the trace carried one
    pub fn binding(&self, name: &str) -> Option<&serde_json::Value> {
        self.parameters.as_ref().and_then(|p| p.get(name))
    }
}

/// Permissive wire form of a trace line
#[derive(Debug, Deserialize)]
pub(crate) struct TraceDto {
    #[serde(alias = "query_text")]
    pub query: Option<String>,
    pub timestamp: Option<serde_json::Value>,
    #[serde(alias = "latency_ms", alias = "duration_ms")]
    pub latency: Option<f64>,
    pub parameters: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(alias = "rows_returned")]
    pub rows: Option<u64>,
    pub rows_scanned: Option<u64>,
    #[serde(alias = "database")]
    pub db: Option<String>,
    pub user: Option<String>,
    pub client: Option<String>,
}

// =============================================================================
// Parse statistics
// =============================================================================

/// Line accounting for one parser pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub lines: u64,
    pub parsed: u64,
    pub blank: u64,
    pub malformed: u64,
    pub bad_timestamp: u64,
    pub oversized: u64,
}

impl ParseStats {
    /// Lines that were skipped with a log entry
    pub fn skipped(&self) -> u64 {
        self.malformed + self.bad_timestamp + self.oversized
    }
}

// =============================================================================
// SQLTemplate
// =============================================================================

/// An equivalence class of traces sharing one redacted form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlTemplate {
    /// SHA-256 over `text`
    pub fingerprint: String,
    /// Canonical redacted text (lowercased, whitespace collapsed)
    pub text: String,
    /// Executable form of the first example: literals replaced by `?`,
    /// original casing kept
    pub sql: String,
    /// First raw query seen for this template
    pub example: String,
    /// Placeholder names in appearance order
    pub placeholders: Vec<String>,
    pub frequency: u64,
    #[serde(default)]
    pub tables: Vec<String>,
    pub first_seen: DateTime<Utc>,
}

impl SqlTemplate {
    pub fn has_parameters(&self) -> bool {
        !self.placeholders.is_empty()
    }
}
