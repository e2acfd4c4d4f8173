//! Reading chunked HTTP bodies
//!
//! Both NDJSON (Ollama) and SSE (OpenAI) bodies arrive in arbitrary chunks;
//! a line may be split across chunks and a chunk may carry several lines.
//! Splitting happens on raw bytes so multi-byte characters cut by a chunk
//! boundary are reassembled before decoding.
//!
//! A streamed body has no overall deadline: the request timeout bounds the
//! wait for the response head and then each gap between chunks.

use std::time::Duration;

use futures::{Stream, StreamExt};

use super::traits::BackendError;

/// Send a request under its timeout
///
/// Batch requests are bounded end to end. Streaming requests are bounded
/// only until the response head arrives; the body is read with
/// [`next_chunk`].
pub(crate) async fn send_bounded(
    builder: reqwest::RequestBuilder,
    timeout: Duration,
    stream: bool,
) -> Result<reqwest::Response, BackendError> {
    if !stream {
        return Ok(builder.timeout(timeout).send().await?);
    }

    match tokio::time::timeout(timeout, builder.send()).await {
        Ok(response) => Ok(response?),
        Err(_) => Err(BackendError::Timeout),
    }
}

/// Next body chunk, failing if the upstream stays silent for `idle`
///
/// `Ok(None)` means the body ended.
pub(crate) async fn next_chunk<S, B>(body: &mut S, idle: Duration) -> Result<Option<B>, String>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Unpin,
{
    match tokio::time::timeout(idle, body.next()).await {
        Ok(Some(Ok(chunk))) => Ok(Some(chunk)),
        Ok(Some(Err(e))) => Err(e.to_string()),
        Ok(None) => Ok(None),
        Err(_) => Err(format!("no data from backend for {}s", idle.as_secs_f32())),
    }
}

/// Accumulates body chunks and yields complete lines
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed, trimmed, skipping blanks
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever is left after the body ended without a final newline
    pub(crate) fn finish(self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}
