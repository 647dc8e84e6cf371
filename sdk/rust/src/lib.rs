//! # sqltracebench-plugin
//!
//! SDK for writing target-database adapters for `sqltracebench`.
//!
//! An adapter is a standalone binary. The benchmark host spawns it with the
//! magic cookie set, reads a handshake line from its stdout, then sends
//! line-delimited JSON requests on its stdin. Implement [`Adapter`] and hand
//! it to [`serve_stdio`]:
//!
//! ```no_run
//! use async_trait::async_trait;
//! use sqltracebench_plugin::{Adapter, AdapterError, ArgValue, Capabilities, ExecuteOutcome};
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl Adapter for Noop {
//!     fn name(&self) -> &str {
//!         "noop"
//!     }
//!
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities { execute_query: true, ..Default::default() }
//!     }
//!
//!     async fn execute_query(
//!         &self,
//!         _sql: &str,
//!         _args: &[ArgValue],
//!     ) -> Result<ExecuteOutcome, AdapterError> {
//!         Ok(ExecuteOutcome { duration_ns: 0, rows: None })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     if let Err(e) = sqltracebench_plugin::serve_stdio(Noop).await {
//!         eprintln!("{e}");
//!         std::process::exit(1);
//!     }
//! }
//! ```

pub mod adapter;
pub mod protocol;
pub mod serve;

pub use adapter::{Adapter, AdapterError};
pub use protocol::{
    ArgValue, Call, Capabilities, ErrorCode, ExecuteOutcome, Handshake, HandshakeMismatch,
    MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, PROTOCOL_VERSION, Reply, RpcError, RpcRequest,
    RpcResponse, encode_line,
};
pub use serve::{ServeError, serve, serve_stdio};
