use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::{Message, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::providers::base::{DeltaStream, Provider, ProviderDelta};

/// One scripted generation
pub enum MockStep {
    /// Deltas streamed in order; an `Err` ends the stream
    Deltas(Vec<std::result::Result<ProviderDelta, String>>),
    /// The backend refuses to start the generation
    Fail(String),
}

impl MockStep {
    pub fn text(text: &str) -> Self {
        MockStep::Deltas(vec![
            Ok(ProviderDelta::Text(text.to_string())),
            Ok(finish("stop")),
        ])
    }

    pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> Self {
        MockStep::Deltas(vec![
            Ok(ProviderDelta::ToolRequest(ToolRequest {
                id: id.to_string(),
                tool_call: Ok(ToolCall::new(name, arguments)),
            })),
            Ok(finish("tool_calls")),
        ])
    }
}

pub fn finish(reason: &str) -> ProviderDelta {
    ProviderDelta::Finish {
        reason: Some(reason.to_string()),
        usage: None,
    }
}

/// A mock provider that returns pre-configured generations for testing
pub struct MockProvider {
    steps: Arc<Mutex<Vec<MockStep>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of generations
    pub fn new(steps: Vec<MockStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps)),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Number of generations requested so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The history passed to each generation
    pub fn seen(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn model(&self) -> &str {
        "mock"
    }

    async fn stream(
        &self,
        _system: &str,
        messages: &[Message],
        _tools: &[Tool],
    ) -> Result<DeltaStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(messages.to_vec());

        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.is_empty() {
                // Return an empty generation if no more pre-configured responses
                MockStep::Deltas(vec![Ok(finish("stop"))])
            } else {
                steps.remove(0)
            }
        };

        match step {
            MockStep::Fail(reason) => Err(anyhow!(reason)),
            MockStep::Deltas(deltas) => Ok(Box::pin(futures::stream::iter(
                deltas.into_iter().map(|d| d.map_err(|e| anyhow!(e))),
            ))),
        }
    }
}
