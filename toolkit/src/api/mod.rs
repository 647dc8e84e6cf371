//! Metrics and health HTTP endpoint

pub mod routes;
mod server;

pub use server::MetricsServer;
