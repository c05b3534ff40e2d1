use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::models::message::{Message, ToolRequest};
use crate::models::tool::Tool;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<i32>,
        output_tokens: Option<i32>,
        total_tokens: Option<i32>,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }
}

/// One increment of a model generation
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderDelta {
    /// A fragment of assistant text, in generation order
    Text(String),
    /// A fully assembled tool call. Malformed calls carry their error.
    ToolRequest(ToolRequest),
    /// The backend finished this generation
    Finish {
        reason: Option<String>,
        usage: Option<Usage>,
    },
}

pub type DeltaStream = BoxStream<'static, Result<ProviderDelta>>;

/// Base trait for inference backends reachable through the model gateway
#[async_trait]
pub trait Provider: Send + Sync {
    /// The concrete model identifier sent to the backend
    fn model(&self) -> &str;

    /// Start a generation and return its deltas as they arrive.
    ///
    /// Failures to start (auth, rate limit, network) are returned as `Err`; failures
    /// after the first byte surface as an `Err` item that ends the stream.
    async fn stream(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<DeltaStream>;
}
