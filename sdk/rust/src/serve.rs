//! Child-side serve loop
//!
//! Writes the handshake, then reads one request per line and answers each on
//! its own task so a slow query does not block `get_name` health checks.
//! Responses share the writer through a mutex; every response is written as
//! a single line in one `write_all`, so lines never interleave.

use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::adapter::Adapter;
use crate::protocol::{
    Call, ErrorCode, Handshake, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE, Reply, RpcRequest,
    RpcResponse, encode_line,
};

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("adapter must be launched by sqltracebench ({MAGIC_COOKIE_KEY} not set)")]
    NotLaunchedByHost,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Serve the adapter over stdin/stdout.
///
/// Refuses to run unless the host set the magic cookie, so launching an
/// adapter binary by hand fails fast instead of waiting on a terminal.
pub async fn serve_stdio<A: Adapter>(adapter: A) -> Result<(), ServeError> {
    match std::env::var(MAGIC_COOKIE_KEY) {
        Ok(value) if value == MAGIC_COOKIE_VALUE => {}
        _ => return Err(ServeError::NotLaunchedByHost),
    }
    serve(Arc::new(adapter), tokio::io::stdin(), tokio::io::stdout()).await
}

/// Serve the adapter over an arbitrary pipe pair until the reader closes.
pub async fn serve<A, R, W>(adapter: Arc<A>, reader: R, writer: W) -> Result<(), ServeError>
where
    A: Adapter,
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer = Arc::new(Mutex::new(writer));

    let handshake = Handshake::current(adapter.capabilities());
    write_line(&writer, &encode_line(&handshake)?).await?;
    tracing::debug!(adapter = adapter.name(), "Handshake sent");

    let mut lines = BufReader::new(reader).lines();
    let mut tasks = JoinSet::new();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: RpcRequest = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed request line");
                let response = RpcResponse::err(0, ErrorCode::InvalidRequest, e.to_string());
                write_line(&writer, &encode_line(&response)?).await?;
                continue;
            }
        };

        let adapter = Arc::clone(&adapter);
        let writer = Arc::clone(&writer);
        tasks.spawn(async move {
            let response = dispatch(adapter.as_ref(), request).await;
            let line = encode_line(&response)?;
            write_line(&writer, &line).await
        });

        // Reap finished tasks so the set does not grow with the request count
        while let Some(done) = tasks.try_join_next() {
            log_task_result(done);
        }
    }

    while let Some(done) = tasks.join_next().await {
        log_task_result(done);
    }

    tracing::debug!(adapter = adapter.name(), "Host closed the request pipe");
    Ok(())
}

async fn dispatch<A: Adapter + ?Sized>(adapter: &A, request: RpcRequest) -> RpcResponse {
    let id = request.id;

    if !adapter.capabilities().supports(&request.call) {
        return RpcResponse::err(
            id,
            ErrorCode::Unsupported,
            format!("{} is not implemented by {}", request.call.method(), adapter.name()),
        );
    }

    let result = match request.call {
        Call::GetName => Ok(Reply::Name(adapter.name().to_string())),
        Call::TranslateQuery { sql } => adapter.translate_query(&sql).await.map(Reply::Query),
        Call::ConvertSchema { schema_json } => adapter
            .convert_schema(&schema_json)
            .await
            .map(Reply::Schema),
        Call::ExecuteQuery { sql, args } => adapter
            .execute_query(&sql, &args)
            .await
            .map(Reply::Executed),
    };

    match result {
        Ok(reply) => RpcResponse::ok(id, reply),
        Err(e) => RpcResponse::err(id, e.code(), e.to_string()),
    }
}

async fn write_line<W>(writer: &Mutex<W>, line: &str) -> Result<(), ServeError>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut w = writer.lock().await;
    w.write_all(line.as_bytes()).await?;
    w.flush().await?;
    Ok(())
}

fn log_task_result(done: Result<Result<(), ServeError>, tokio::task::JoinError>) {
    match done {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Failed to write response"),
        Err(e) => tracing::error!(error = %e, "Request task panicked"),
    }
}
