//! Crate-wide error type
//!
//! Every phase reports failures as a [`BenchError`] carrying a kind, the
//! component that raised it, a timestamp and an optional wrapped cause.
//! Module-local error enums convert into it at phase boundaries.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure classes surfaced by the toolkit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    ParseFailed,
    ConversionFailed,
    UnsupportedDialect,
    DatabaseConnection,
    PluginNotFound,
    ExecutionFailed,
    ValidationFailed,
    ReportGeneration,
    Cancelled,
    Io,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::ParseFailed => "parse_failed",
            Self::ConversionFailed => "conversion_failed",
            Self::UnsupportedDialect => "unsupported_dialect",
            Self::DatabaseConnection => "database_connection",
            Self::PluginNotFound => "plugin_not_found",
            Self::ExecutionFailed => "execution_failed",
            Self::ValidationFailed => "validation_failed",
            Self::ReportGeneration => "report_generation",
            Self::Cancelled => "cancelled",
            Self::Io => "io",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
#[error("[{component}] {kind}: {message}")]
pub struct BenchError {
    pub kind: ErrorKind,
    pub component: &'static str,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[source]
    pub source: Option<Cause>,
}

pub type BenchResult<T> = Result<T, BenchError>;

impl BenchError {
    pub fn new(kind: ErrorKind, component: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            component,
            message: message.into(),
            timestamp: Utc::now(),
            source: None,
        }
    }

    /// Attach the underlying cause
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn invalid_input(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, component, message)
    }

    pub fn parse_failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ParseFailed, component, message)
    }

    pub fn conversion_failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConversionFailed, component, message)
    }

    pub fn unsupported_dialect(component: &'static str, dialect: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::UnsupportedDialect,
            component,
            format!("unsupported dialect '{}'", dialect),
        )
    }

    pub fn plugin_not_found(component: &'static str, name: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::PluginNotFound,
            component,
            format!("no plugin registered as '{}'", name),
        )
    }

    pub fn execution_failed(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ExecutionFailed, component, message)
    }

    pub fn report_generation(component: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReportGeneration, component, message)
    }

    pub fn cancelled(component: &'static str) -> Self {
        Self::new(ErrorKind::Cancelled, component, "operation cancelled")
    }

    pub fn io(component: &'static str, context: impl Into<String>, err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, component, context).with_source(err)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_includes_component_and_kind() {
        let err = BenchError::invalid_input("rate", "qps must be greater than 0");
        assert_eq!(
            err.to_string(),
            "[rate] invalid_input: qps must be greater than 0"
        );
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn test_with_source_chains_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = BenchError::io("parser", "failed to read trace file", io);
        assert_eq!(err.kind, ErrorKind::Io);
        assert_eq!(err.source().map(|s| s.to_string()), Some("missing".into()));
    }

    #[test]
    fn test_cancelled() {
        let err = BenchError::cancelled("engine");
        assert!(err.is_cancelled());
        assert!(!BenchError::plugin_not_found("registry", "x").is_cancelled());
    }
}
