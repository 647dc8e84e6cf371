//! Line-delimited JSON wire protocol between the benchmark host and adapters
//!
//! Every message is a single JSON object terminated by `\n`:
//!
//! ```text
//! child  -> parent   {"protocol_version":1,"magic_cookie_key":"SQLTRACEBENCH_PLUGIN",...}
//! parent -> child    {"id":1,"call":{"method":"get_name"}}
//! child  -> parent   {"id":1,"result":{"kind":"name","value":"clickhouse"}}
//! parent -> child    {"id":2,"call":{"method":"execute_query","params":{"sql":"...","args":[...]}}}
//! child  -> parent   {"id":2,"error":{"code":"query_failed","message":"..."}}
//! ```
//!
//! Responses may arrive out of order; the `id` correlates them with requests.

use serde::{Deserialize, Serialize};

/// Protocol version spoken by this SDK
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment variable the host sets on the child before spawning it
pub const MAGIC_COOKIE_KEY: &str = "SQLTRACEBENCH_PLUGIN";

/// Expected value of [`MAGIC_COOKIE_KEY`]
pub const MAGIC_COOKIE_VALUE: &str = "ON_FIRE";

/// Optional operations an adapter implements. `GetName` is always available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    #[serde(default)]
    pub translate_query: bool,
    #[serde(default)]
    pub convert_schema: bool,
    #[serde(default)]
    pub execute_query: bool,
}

impl Capabilities {
    /// All optional operations enabled
    pub fn all() -> Self {
        Self {
            translate_query: true,
            convert_schema: true,
            execute_query: true,
        }
    }

    /// Whether the adapter advertises the given call
    pub fn supports(&self, call: &Call) -> bool {
        match call {
            Call::GetName => true,
            Call::TranslateQuery { .. } => self.translate_query,
            Call::ConvertSchema { .. } => self.convert_schema,
            Call::ExecuteQuery { .. } => self.execute_query,
        }
    }
}

/// First line written by the child after start-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub protocol_version: u32,
    pub magic_cookie_key: String,
    pub magic_cookie_value: String,
    #[serde(default)]
    pub capabilities: Capabilities,
}

impl Handshake {
    /// Handshake for the protocol version compiled into this SDK
    pub fn current(capabilities: Capabilities) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            magic_cookie_key: MAGIC_COOKIE_KEY.to_string(),
            magic_cookie_value: MAGIC_COOKIE_VALUE.to_string(),
            capabilities,
        }
    }

    /// Check cookie and version against what the host expects
    pub fn validate(&self) -> Result<(), HandshakeMismatch> {
        if self.magic_cookie_key != MAGIC_COOKIE_KEY
            || self.magic_cookie_value != MAGIC_COOKIE_VALUE
        {
            return Err(HandshakeMismatch::Cookie {
                key: self.magic_cookie_key.clone(),
                value: self.magic_cookie_value.clone(),
            });
        }
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(HandshakeMismatch::Version {
                expected: PROTOCOL_VERSION,
                actual: self.protocol_version,
            });
        }
        Ok(())
    }
}

/// Reason a handshake was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeMismatch {
    #[error("magic cookie mismatch ({key}={value})")]
    Cookie { key: String, value: String },
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    Version { expected: u32, actual: u32 },
}

/// A positional query argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ArgValue {
    /// Plain JSON rendering, as stored in workload files
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            ArgValue::Null => serde_json::Value::Null,
            ArgValue::Bool(b) => serde_json::Value::Bool(*b),
            ArgValue::Int(i) => serde_json::Value::from(*i),
            ArgValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            ArgValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<&serde_json::Value> for ArgValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ArgValue::Null,
            serde_json::Value::Bool(b) => ArgValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ArgValue::Int(i),
                None => ArgValue::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => ArgValue::Text(s.clone()),
            other => ArgValue::Text(other.to_string()),
        }
    }
}

/// Operation requested by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Call {
    GetName,
    TranslateQuery { sql: String },
    ConvertSchema { schema_json: String },
    ExecuteQuery { sql: String, args: Vec<ArgValue> },
}

impl Call {
    pub fn method(&self) -> &'static str {
        match self {
            Call::GetName => "get_name",
            Call::TranslateQuery { .. } => "translate_query",
            Call::ConvertSchema { .. } => "convert_schema",
            Call::ExecuteQuery { .. } => "execute_query",
        }
    }
}

/// Result of a successful `ExecuteQuery`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteOutcome {
    /// Server-side execution time as measured by the adapter
    pub duration_ns: u64,
    /// Rows returned, when the driver reports them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<u64>,
}

/// Successful reply payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Reply {
    Name(String),
    Query(String),
    Schema(String),
    Executed(ExecuteOutcome),
}

/// Machine-readable failure class carried in [`RpcError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unsupported,
    InvalidRequest,
    QueryFailed,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub id: u64,
    pub call: Call,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Reply>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn ok(id: u64, reply: Reply) -> Self {
        Self {
            id,
            result: Some(reply),
            error: None,
        }
    }

    pub fn err(id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Serialize a message as one protocol line (with trailing newline)
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}
