//! Host side of the adapter line protocol
//!
//! Requests carry a fresh id and are written under a mutex, one line per
//! request. A reader task routes each response line to the waiting caller
//! by id, so calls may be answered out of order. When the pipe breaks every
//! pending and future call fails; the client never reconnects.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sqltracebench_plugin::{
    ArgValue, Call, Capabilities, ExecuteOutcome, Handshake, Reply, RpcRequest, RpcResponse,
    encode_line,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::{PluginError, QueryExecutor};

type Pending = Mutex<HashMap<u64, oneshot::Sender<RpcResponse>>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// State shared with the reader task
struct Shared {
    pending: Pending,
    failure: Mutex<Option<String>>,
}

impl Shared {
    fn fail(&self, reason: impl Into<String>) {
        {
            let mut failure = self.failure.lock();
            if failure.is_none() {
                *failure = Some(reason.into());
            }
        }
        // Dropping the senders wakes every waiter with an error
        self.pending.lock().clear();
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

/// Removes a pending slot when the caller gives up (e.g. cancellation)
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

pub struct PluginClient {
    label: String,
    name: String,
    capabilities: Capabilities,
    writer: tokio::sync::Mutex<Writer>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl std::fmt::Debug for PluginClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginClient")
            .field("label", &self.label)
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("failure", &self.shared.failure())
            .finish()
    }
}

impl PluginClient {
    /// Read and validate the handshake, then start routing responses.
    ///
    /// `label` names the plugin in logs until its self-reported name is
    /// known (see [`PluginClient::identify`]).
    pub async fn connect<R, W>(
        label: impl Into<String>,
        reader: R,
        writer: W,
        handshake_timeout: Duration,
    ) -> Result<Self, PluginError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let label = label.into();
        let mut lines = BufReader::new(reader).lines();

        let line = match tokio::time::timeout(handshake_timeout, lines.next_line()).await {
            Err(_) => return Err(PluginError::HandshakeTimeout(handshake_timeout.as_secs())),
            Ok(Err(e)) => return Err(PluginError::Transport(e.to_string())),
            Ok(Ok(None)) => {
                return Err(PluginError::Handshake(
                    "output closed before handshake".to_string(),
                ));
            }
            Ok(Ok(Some(line))) => line,
        };
        let handshake: Handshake = serde_json::from_str(line.trim())
            .map_err(|e| PluginError::Handshake(format!("malformed handshake line: {}", e)))?;
        handshake.validate()?;

        tracing::debug!(
            plugin = %label,
            version = handshake.protocol_version,
            capabilities = ?handshake.capabilities,
            "Plugin handshake accepted"
        );

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
        });
        let reader = tokio::spawn(route_responses(label.clone(), lines, Arc::clone(&shared)));

        Ok(Self {
            name: label.clone(),
            label,
            capabilities: handshake.capabilities,
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            shared,
            next_id: AtomicU64::new(1),
            reader,
        })
    }

    /// Ask the plugin for its name and adopt it
    pub async fn identify(&mut self) -> Result<&str, PluginError> {
        self.name = self.get_name().await?;
        Ok(&self.name)
    }

    /// Self-reported name once identified, the launch label before
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn is_failed(&self) -> bool {
        self.shared.failure().is_some()
    }

    /// Reason the plugin became unusable
    pub fn failure(&self) -> Option<String> {
        self.shared.failure()
    }

    pub async fn get_name(&self) -> Result<String, PluginError> {
        match self.call(Call::GetName).await? {
            Reply::Name(name) => Ok(name),
            other => Err(unexpected("get_name", &other)),
        }
    }

    pub async fn translate_query(&self, sql: &str) -> Result<String, PluginError> {
        let call = Call::TranslateQuery {
            sql: sql.to_string(),
        };
        match self.call(call).await? {
            Reply::Query(sql) => Ok(sql),
            other => Err(unexpected("translate_query", &other)),
        }
    }

    /// Send a JSON-encoded table list, receive target DDL
    pub async fn convert_schema(&self, schema_json: &str) -> Result<String, PluginError> {
        let call = Call::ConvertSchema {
            schema_json: schema_json.to_string(),
        };
        match self.call(call).await? {
            Reply::Schema(ddl) => Ok(ddl),
            other => Err(unexpected("convert_schema", &other)),
        }
    }

    pub async fn execute_query(
        &self,
        sql: &str,
        args: &[ArgValue],
    ) -> Result<ExecuteOutcome, PluginError> {
        let call = Call::ExecuteQuery {
            sql: sql.to_string(),
            args: args.to_vec(),
        };
        match self.call(call).await? {
            Reply::Executed(outcome) => Ok(outcome),
            other => Err(unexpected("execute_query", &other)),
        }
    }

    async fn call(&self, call: Call) -> Result<Reply, PluginError> {
        if !self.capabilities.supports(&call) {
            return Err(PluginError::Unsupported(call.method()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let method = call.method();
        let line = encode_line(&RpcRequest { id, call })?;

        let (tx, rx) = oneshot::channel();
        {
            // Checked under the pending lock so a concurrent `fail` cannot miss this slot
            let mut pending = self.shared.pending.lock();
            if let Some(reason) = self.shared.failure() {
                return Err(PluginError::Failed(reason));
            }
            pending.insert(id, tx);
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        {
            let mut writer = self.writer.lock().await;
            let written = match writer.write_all(line.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = written {
                let reason = format!("write failed: {}", e);
                tracing::warn!(plugin = %self.name, error = %e, "Plugin pipe broken");
                self.shared.fail(reason.clone());
                return Err(PluginError::Transport(reason));
            }
        }
        tracing::trace!(plugin = %self.name, id, method, "Request sent");

        let response = rx.await.map_err(|_| {
            PluginError::Transport(
                self.shared
                    .failure()
                    .unwrap_or_else(|| "response channel closed".to_string()),
            )
        })?;

        match (response.error, response.result) {
            (Some(err), _) => Err(PluginError::Remote {
                code: err.code,
                message: err.message,
            }),
            (None, Some(reply)) => Ok(reply),
            (None, None) => Err(PluginError::UnexpectedReply(format!(
                "empty response to {}",
                method
            ))),
        }
    }
}

impl Drop for PluginClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl QueryExecutor for PluginClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, sql: &str, args: &[ArgValue]) -> Result<ExecuteOutcome, PluginError> {
        self.execute_query(sql, args).await
    }
}

async fn route_responses<R>(
    label: String,
    mut lines: tokio::io::Lines<BufReader<R>>,
    shared: Arc<Shared>,
) where
    R: AsyncRead + Unpin,
{
    let reason = loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response: RpcResponse = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(plugin = %label, error = %e, "Malformed response line");
                        continue;
                    }
                };
                let waiter = shared.pending.lock().remove(&response.id);
                match waiter {
                    // A dropped receiver means the caller was cancelled
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        tracing::warn!(
                            plugin = %label,
                            id = response.id,
                            error = ?response.error,
                            "Response with no pending request"
                        );
                    }
                }
            }
            Ok(None) => break "plugin closed its output".to_string(),
            Err(e) => break format!("read failed: {}", e),
        }
    };
    tracing::warn!(plugin = %label, reason = %reason, "Plugin transport closed");
    shared.fail(reason);
}

fn unexpected(method: &str, reply: &Reply) -> PluginError {
    PluginError::UnexpectedReply(format!("{} answered with {:?}", method, reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqltracebench_plugin::{Adapter, AdapterError, ErrorCode, serve};
    use tokio::io::duplex;

    struct MemoryAdapter;

    #[async_trait]
    impl Adapter for MemoryAdapter {
        fn name(&self) -> &str {
            "memory"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                translate_query: true,
                convert_schema: false,
                execute_query: true,
            }
        }

        async fn translate_query(&self, sql: &str) -> Result<String, AdapterError> {
            Ok(sql.replace('?', "{p}"))
        }

        async fn execute_query(
            &self,
            sql: &str,
            args: &[ArgValue],
        ) -> Result<ExecuteOutcome, AdapterError> {
            if sql.contains("boom") {
                return Err(AdapterError::Query("table boom does not exist".into()));
            }
            if sql.contains("slow") {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            Ok(ExecuteOutcome {
                duration_ns: 500,
                rows: Some(args.len() as u64),
            })
        }
    }

    async fn connected() -> (PluginClient, JoinHandle<()>) {
        let (host, child) = duplex(64 * 1024);
        let (child_read, child_write) = tokio::io::split(child);
        let server = tokio::spawn(async move {
            let _ = serve(Arc::new(MemoryAdapter), child_read, child_write).await;
        });
        let (host_read, host_write) = tokio::io::split(host);
        let client = PluginClient::connect("mem", host_read, host_write, Duration::from_secs(5))
            .await
            .unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_identify_and_execute() {
        let (mut client, _server) = connected().await;
        assert_eq!(client.name(), "mem");
        assert_eq!(client.identify().await.unwrap(), "memory");
        assert_eq!(client.name(), "memory");

        let outcome = client
            .execute_query("select ?", &[ArgValue::Int(1), ArgValue::Null])
            .await
            .unwrap();
        assert_eq!(outcome.rows, Some(2));
        assert_eq!(
            client.translate_query("a = ?").await.unwrap(),
            "a = {p}"
        );
    }

    #[tokio::test]
    async fn test_unsupported_is_rejected_locally() {
        let (client, _server) = connected().await;
        let err = client.convert_schema("[]").await.unwrap_err();
        assert!(matches!(err, PluginError::Unsupported("convert_schema")));
        assert!(!client.is_failed());
    }

    #[tokio::test]
    async fn test_query_error_is_remote_not_transport() {
        let (client, _server) = connected().await;
        let err = client.execute_query("select * from boom", &[]).await.unwrap_err();
        match &err {
            PluginError::Remote { code, message } => {
                assert_eq!(*code, ErrorCode::QueryFailed);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!err.is_transport());
        assert!(client.execute_query("select 1", &[]).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_correlated() {
        let (client, _server) = connected().await;
        let client = Arc::new(client);
        let mut handles = Vec::new();
        for i in 0..20u64 {
            let client = Arc::clone(&client);
            handles.push(tokio::spawn(async move {
                let sql = if i % 2 == 0 { "slow" } else { "fast" };
                let args = vec![ArgValue::Int(0); i as usize];
                client.execute_query(sql, &args).await.map(|o| (i, o.rows))
            }));
        }
        for handle in handles {
            let (i, rows) = handle.await.unwrap().unwrap();
            assert_eq!(rows, Some(i));
        }
    }

    #[tokio::test]
    async fn test_closed_pipe_marks_failed() {
        let (client, server) = connected().await;
        server.abort();
        let _ = server.await;

        let err = client.execute_query("select 1", &[]).await.unwrap_err();
        assert!(err.is_transport(), "{:?}", err);
        assert!(client.is_failed());
        let err = client.get_name().await.unwrap_err();
        assert!(matches!(err, PluginError::Failed(_)));
    }

    #[tokio::test]
    async fn test_handshake_version_mismatch() {
        let (host, mut child) = duplex(4096);
        let mut handshake = Handshake::current(Capabilities::all());
        handshake.protocol_version = 99;
        child
            .write_all(encode_line(&handshake).unwrap().as_bytes())
            .await
            .unwrap();
        let (r, w) = tokio::io::split(host);
        let err = PluginClient::connect("bad", r, w, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::HandshakeMismatch(_)));
    }

    #[tokio::test]
    async fn test_handshake_garbage_and_timeout() {
        let (host, mut child) = duplex(4096);
        child.write_all(b"hello world\n").await.unwrap();
        let (r, w) = tokio::io::split(host);
        let err = PluginClient::connect("bad", r, w, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Handshake(_)));

        let (host, _child) = duplex(4096);
        let (r, w) = tokio::io::split(host);
        let err = PluginClient::connect("silent", r, w, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::HandshakeTimeout(_)));
    }
}
