//! Out-of-process target adapters
//!
//! - `client` - host side of the line protocol over any pipe pair
//! - `process` - child process launch, stderr forwarding, kill on drop
//! - `registry` - name-indexed plugin handles, health checks, shutdown

pub mod client;
pub mod process;
pub mod registry;

use async_trait::async_trait;
use sqltracebench_plugin::{ArgValue, ErrorCode, ExecuteOutcome, HandshakeMismatch};
use thiserror::Error;

use crate::core::error::{BenchError, ErrorKind};

pub use client::PluginClient;
pub use process::PluginProcess;
pub use registry::PluginRegistry;

const COMPONENT: &str = "plugin";

/// Plugin failure vocabulary
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("handshake rejected: {0}")]
    HandshakeMismatch(#[from] HandshakeMismatch),

    #[error("no handshake within {0}s")]
    HandshakeTimeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    /// Earlier transport failure; the plugin is not restarted
    #[error("plugin unusable: {0}")]
    Failed(String),

    #[error("{0} is not supported by this plugin")]
    Unsupported(&'static str),

    #[error("{code:?}: {message}")]
    Remote { code: ErrorCode, message: String },

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PluginError {
    /// Whether the channel itself broke, as opposed to one call failing
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Failed(_))
    }
}

impl From<PluginError> for BenchError {
    fn from(e: PluginError) -> Self {
        let kind = match &e {
            PluginError::Spawn { .. }
            | PluginError::Handshake(_)
            | PluginError::HandshakeMismatch(_)
            | PluginError::HandshakeTimeout(_)
            | PluginError::Transport(_)
            | PluginError::Failed(_) => ErrorKind::DatabaseConnection,
            PluginError::Unsupported(_) => ErrorKind::InvalidInput,
            PluginError::Remote { .. }
            | PluginError::UnexpectedReply(_)
            | PluginError::Encode(_) => ErrorKind::ExecutionFailed,
        };
        BenchError::new(kind, COMPONENT, e.to_string()).with_source(e)
    }
}

/// Something that runs one workload query
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Label used in logs and metric labels
    fn name(&self) -> &str;

    async fn execute(&self, sql: &str, args: &[ArgValue]) -> Result<ExecuteOutcome, PluginError>;
}
