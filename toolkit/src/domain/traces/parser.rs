//! Streaming trace parser
//!
//! Reads JSONL traces line by line and hands each decoded trace to a
//! callback. Blank, malformed and oversized lines are logged and skipped;
//! only a failing reader aborts the stream.

use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

use super::types::{ParseStats, SqlTrace, TraceDto};
use crate::core::constants::DEFAULT_TRACE_BUFFER_SIZE;
use crate::core::error::{BenchError, BenchResult};
use crate::utils::time::{epoch_to_datetime, parse_timestamp};

const COMPONENT: &str = "trace_parser";

#[derive(Debug, Clone)]
pub struct TraceParser {
    buffer_size: usize,
}

impl Default for TraceParser {
    fn default() -> Self {
        Self::new(DEFAULT_TRACE_BUFFER_SIZE)
    }
}

impl TraceParser {
    /// `buffer_size` is both the read buffer and the longest accepted line
    pub fn new(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1024),
        }
    }

    /// Parse a trace file, invoking `on_trace` for each decoded trace
    pub async fn parse_file<F>(&self, path: &Path, on_trace: F) -> BenchResult<ParseStats>
    where
        F: FnMut(SqlTrace),
    {
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            BenchError::io(
                COMPONENT,
                format!("failed to open trace file {}", path.display()),
                e,
            )
        })?;
        tracing::debug!(path = %path.display(), "Parsing trace file");
        self.parse(file, on_trace).await
    }

    /// Parse traces from any reader
    pub async fn parse<R, F>(&self, reader: R, mut on_trace: F) -> BenchResult<ParseStats>
    where
        R: AsyncRead + Unpin,
        F: FnMut(SqlTrace),
    {
        let mut reader = BufReader::with_capacity(self.buffer_size, reader);
        let mut stats = ParseStats::default();
        let mut line = Vec::with_capacity(4096);

        loop {
            line.clear();
            let outcome = read_bounded_line(&mut reader, &mut line, self.buffer_size)
                .await
                .map_err(|e| BenchError::io(COMPONENT, "failed to read trace stream", e))?;
            let Some(oversized) = outcome else {
                break;
            };
            stats.lines += 1;
            let line_no = stats.lines;

            if oversized {
                stats.oversized += 1;
                tracing::warn!(
                    line = line_no,
                    limit = self.buffer_size,
                    "Skipping trace line longer than buffer"
                );
                continue;
            }

            let Ok(text) = std::str::from_utf8(&line) else {
                stats.malformed += 1;
                tracing::warn!(line = line_no, "Skipping trace line with invalid UTF-8");
                continue;
            };
            let text = text.trim();
            if text.is_empty() {
                stats.blank += 1;
                continue;
            }

            match decode_line(text) {
                Ok(trace) => {
                    stats.parsed += 1;
                    on_trace(trace);
                }
                Err(LineError::Malformed(reason)) => {
                    stats.malformed += 1;
                    tracing::warn!(line = line_no, error = %reason, "Skipping malformed trace line");
                }
                Err(LineError::Timestamp(raw)) => {
                    stats.bad_timestamp += 1;
                    tracing::warn!(line = line_no, timestamp = %raw, "Skipping trace with unparseable timestamp");
                }
            }
        }

        tracing::debug!(
            lines = stats.lines,
            parsed = stats.parsed,
            skipped = stats.skipped(),
            "Trace stream finished"
        );
        Ok(stats)
    }

    /// Parse an in-memory buffer, collecting the traces
    pub async fn parse_all(&self, input: &[u8]) -> BenchResult<(Vec<SqlTrace>, ParseStats)> {
        let mut traces = Vec::new();
        let stats = self.parse(input, |t| traces.push(t)).await?;
        Ok((traces, stats))
    }
}

enum LineError {
    Malformed(String),
    Timestamp(String),
}

fn decode_line(text: &str) -> Result<SqlTrace, LineError> {
    let dto: TraceDto =
        serde_json::from_str(text).map_err(|e| LineError::Malformed(e.to_string()))?;

    let query = dto
        .query
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| LineError::Malformed("missing query".to_string()))?;

    let timestamp = match dto.timestamp {
        Some(serde_json::Value::String(s)) => {
            parse_timestamp(&s).ok_or(LineError::Timestamp(s))?
        }
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .and_then(epoch_to_datetime)
            .ok_or_else(|| LineError::Timestamp(n.to_string()))?,
        Some(other) => return Err(LineError::Timestamp(other.to_string())),
        None => return Err(LineError::Malformed("missing timestamp".to_string())),
    };

    Ok(SqlTrace {
        query,
        timestamp,
        parameters: dto.parameters,
        latency: dto.latency,
        rows: dto.rows,
        rows_scanned: dto.rows_scanned,
        db: dto.db,
        user: dto.user,
        client: dto.client,
    })
}

/// Read one `\n`-terminated line into `buf`, keeping at most `limit` bytes.
///
/// Returns `None` at EOF, `Some(true)` when the line exceeded `limit` (the
/// excess is consumed and discarded), `Some(false)` otherwise.
async fn read_bounded_line<R>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    limit: usize,
) -> std::io::Result<Option<bool>>
where
    R: AsyncBufRead + Unpin,
{
    let mut read_any = false;
    let mut oversized = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(read_any.then_some(oversized));
        }
        read_any = true;

        let (chunk, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (&available[..i], i + 1),
            None => (available, available.len()),
        };
        let found_newline = done > chunk.len();

        if !oversized {
            if buf.len() + chunk.len() > limit {
                oversized = true;
                buf.clear();
            } else {
                buf.extend_from_slice(chunk);
            }
        }

        reader.consume(done);
        if found_newline {
            return Ok(Some(oversized));
        }
    }
}
