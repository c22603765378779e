//! Helpers for line-oriented streaming responses.
//!
//! Both providers stream text protocols (server-sent events and NDJSON) over
//! HTTP bodies whose byte chunks do not respect line boundaries.

use crate::client::{LlmStream, LlmStreamChunk};
use ark_core::{AppError, AppResult};
use futures::{Stream, StreamExt};

/// Reassembles complete lines from arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and drain every line it completes.
    ///
    /// Lines are returned without their terminator; blank lines are dropped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Return the unterminated remainder, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Turn a streamed HTTP body into parsed chunks, one line at a time.
///
/// `parse` maps each complete line to at most one chunk. When the body
/// ends, an unterminated final line is parsed as well. Transport errors
/// are passed through as [`AppError::Llm`].
pub fn line_stream<S, B, E, F>(body: S, mut parse: F) -> LlmStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: FnMut(&str) -> Option<AppResult<LlmStreamChunk>> + Send + 'static,
{
    let batches = futures::stream::unfold(
        Some((Box::pin(body), LineBuffer::new())),
        |state| async move {
            let Some((mut body, mut lines)) = state else {
                return None;
            };
            match body.next().await {
                Some(Ok(bytes)) => {
                    let batch = Ok(lines.push(bytes.as_ref()));
                    Some((batch, Some((body, lines))))
                }
                Some(Err(e)) => {
                    let batch = Err(AppError::Llm(format!("Stream error: {}", e)));
                    Some((batch, Some((body, lines))))
                }
                // Flush whatever the server left without a newline
                None => Some((Ok(lines.finish().into_iter().collect()), None)),
            }
        },
    );

    let chunks = batches.flat_map(move |batch| {
        let parsed: Vec<AppResult<LlmStreamChunk>> = match batch {
            Ok(lines) => lines.iter().filter_map(|line| parse(line)).collect(),
            Err(e) => vec![Err(e)],
        };
        futures::stream::iter(parsed)
    });

    Box::pin(chunks)
}

/// Aggregate a token stream into the full answer text.
///
/// Stops at the first chunk flagged `done` and propagates the first error.
pub async fn collect_stream(mut stream: LlmStream) -> AppResult<String> {
    let mut answer = String::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        answer.push_str(&chunk.content);
        if chunk.done {
            break;
        }
    }
    Ok(answer)
}
