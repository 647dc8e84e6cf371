//! Adapter trait implemented by every target-database plugin

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{ArgValue, Capabilities, ErrorCode, ExecuteOutcome};

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("adapter error: {0}")]
    Internal(String),
}

impl AdapterError {
    /// Wire error code for this failure
    pub fn code(&self) -> ErrorCode {
        match self {
            AdapterError::Unsupported(_) => ErrorCode::Unsupported,
            AdapterError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            AdapterError::Query(_) => ErrorCode::QueryFailed,
            AdapterError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// One target database behind the plugin boundary.
///
/// Only `name` and `capabilities` are mandatory. Optional operations default
/// to [`AdapterError::Unsupported`]; an adapter advertises the ones it
/// overrides through [`Capabilities`] so the host never has to guess.
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Self-reported name the host registers the plugin under
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    async fn translate_query(&self, _sql: &str) -> Result<String, AdapterError> {
        Err(AdapterError::Unsupported("translate_query"))
    }

    /// Convert a JSON-encoded list of tables into target DDL
    async fn convert_schema(&self, _schema_json: &str) -> Result<String, AdapterError> {
        Err(AdapterError::Unsupported("convert_schema"))
    }

    async fn execute_query(
        &self,
        _sql: &str,
        _args: &[ArgValue],
    ) -> Result<ExecuteOutcome, AdapterError> {
        Err(AdapterError::Unsupported("execute_query"))
    }
}
