//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod error;
pub mod shutdown;
pub mod telemetry;

pub use crate::app::CoreApp;
pub use cli::{CliConfig, Commands};
pub use config::AppConfig;
pub use error::{BenchError, BenchResult, ErrorKind};
pub use shutdown::ShutdownService;
pub use telemetry::Telemetry;
