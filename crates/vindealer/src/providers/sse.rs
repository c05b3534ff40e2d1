//! Server-sent events parser for openai-compatible streaming chat completions.
//!
//! Splits the response body into `data:` lines, parses each payload as a
//! completion chunk, surfaces text deltas immediately and accumulates tool call
//! fragments until the choice finishes.

use anyhow::{anyhow, Result};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use super::base::{DeltaStream, ProviderDelta, Usage};
use super::utils::{openai_error_message, tool_request_from_parts};

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    usage: Option<ChunkUsage>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkUsage {
    prompt_tokens: Option<i64>,
    completion_tokens: Option<i64>,
    total_tokens: Option<i64>,
}

impl From<ChunkUsage> for Usage {
    fn from(usage: ChunkUsage) -> Self {
        let to_i32 = |v: Option<i64>| v.and_then(|v| i32::try_from(v).ok());
        Usage::new(
            to_i32(usage.prompt_tokens),
            to_i32(usage.completion_tokens),
            to_i32(usage.total_tokens),
        )
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    index: usize,
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Accumulates tool call fragments across chunks of one generation
#[derive(Debug, Default)]
struct StreamState {
    pending: Vec<PendingToolCall>,
    finished: bool,
}

impl StreamState {
    /// Process one line of the event stream
    fn process_line(&mut self, line: &str) -> Result<Vec<ProviderDelta>> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(data) = line
            .strip_prefix("data: ")
            .or_else(|| line.strip_prefix("data:"))
        else {
            // Blank separators, comments, `event:` and `id:` lines carry nothing for us
            return Ok(Vec::new());
        };

        let data = data.trim();
        if data.is_empty() {
            return Ok(Vec::new());
        }
        if data == "[DONE]" {
            return Ok(self.finish(None, None));
        }

        let chunk: ChatCompletionChunk = serde_json::from_str(data)
            .map_err(|e| anyhow!("Failed to parse stream chunk: {} (data: {})", e, data))?;
        self.process_chunk(chunk)
    }

    fn process_chunk(&mut self, chunk: ChatCompletionChunk) -> Result<Vec<ProviderDelta>> {
        if let Some(error) = chunk.error {
            return Err(anyhow!("Provider error: {}", openai_error_message(&error)));
        }

        let mut deltas = Vec::new();
        let usage = chunk.usage.map(Usage::from);
        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(deltas);
        };

        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                deltas.push(ProviderDelta::Text(content));
            }
        }

        for (position, fragment) in choice.delta.tool_calls.unwrap_or_default().into_iter().enumerate() {
            self.accumulate(position, fragment);
        }

        if choice.finish_reason.is_some() {
            deltas.extend(self.finish(choice.finish_reason, usage));
        }

        Ok(deltas)
    }

    fn accumulate(&mut self, position: usize, fragment: ToolCallDelta) {
        let index = fragment.index.unwrap_or(position);
        let pending = match self.pending.iter().position(|p| p.index == index) {
            Some(i) => &mut self.pending[i],
            None => {
                self.pending.push(PendingToolCall {
                    index,
                    ..Default::default()
                });
                let last = self.pending.len() - 1;
                &mut self.pending[last]
            }
        };

        if fragment.id.is_some() {
            pending.id = fragment.id;
        }
        if let Some(function) = fragment.function {
            if let Some(name) = function.name {
                pending.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                pending.arguments.push_str(&arguments);
            }
        }
    }

    /// Flush assembled tool calls and mark the generation finished. Idempotent.
    fn finish(&mut self, reason: Option<String>, usage: Option<Usage>) -> Vec<ProviderDelta> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut deltas: Vec<ProviderDelta> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|pending| {
                let id = pending
                    .id
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                ProviderDelta::ToolRequest(tool_request_from_parts(
                    id,
                    &pending.name,
                    &pending.arguments,
                ))
            })
            .collect();
        deltas.push(ProviderDelta::Finish { reason, usage });
        deltas
    }
}

/// Turn a response body into provider deltas.
///
/// The stream always ends with exactly one [`ProviderDelta::Finish`] unless it fails first.
pub fn parse_sse_stream<S, B, E>(body: S) -> DeltaStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Box::pin(try_stream! {
        let mut body = Box::pin(body);
        let mut state = StreamState::default();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| anyhow!("Stream read error: {}", e))?;
            buffer.extend_from_slice(chunk.as_ref());

            // Split on raw bytes so multi-byte characters never straddle a decode
            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                for delta in state.process_line(&String::from_utf8_lossy(&line))? {
                    yield delta;
                }
            }
        }

        if !buffer.is_empty() {
            for delta in state.process_line(&String::from_utf8_lossy(&buffer))? {
                yield delta;
            }
        }

        for delta in state.finish(None, None) {
            yield delta;
        }
    })
}
