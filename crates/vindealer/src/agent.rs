use anyhow::{anyhow, Result};
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::message::{Message, MessageContent, ToolRequest};
use crate::models::tool::{Tool, ToolCall};
use crate::prompt_template::load_prompt_file;
use crate::providers::base::{Provider, ProviderDelta};
use crate::providers::factory::ModelHandle;
use crate::providers::utils::INVALID_TOOL_CALL_NAME;
use crate::systems::System;

/// Upper bound on model generations in one reply
pub const MAX_STEPS: usize = 5;
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Debug, Serialize)]
struct SystemInfo {
    name: String,
    description: String,
    instructions: String,
}

impl SystemInfo {
    fn new(name: &str, description: &str, instructions: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            instructions: instructions.to_string(),
        }
    }
}

/// One increment of a reply, in the order it was produced
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// A fragment of assistant text
    TextDelta(String),
    /// The model requested a tool; it is about to be dispatched
    ToolCallStarted {
        id: String,
        name: String,
        arguments: Value,
    },
    /// The tool call finished, successfully or not
    ToolCallResolved {
        id: String,
        result: AgentResult<Vec<Content>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    GeneratingText,
    AwaitingToolResult,
    Done,
    Failed,
}

fn enter(state: &mut TurnState, next: TurnState, step: usize) {
    if *state != next {
        tracing::debug!(step, from = ?*state, to = ?next, "turn state");
        *state = next;
    }
}

/// Agent integrates a foundational LLM with the systems it needs to pilot
pub struct Agent {
    systems: Vec<Box<dyn System>>,
    provider: ModelHandle,
    max_steps: usize,
    step_timeout: Duration,
}

impl Agent {
    /// Create a new Agent with the specified provider
    pub fn new(provider: ModelHandle) -> Self {
        Self {
            systems: Vec::new(),
            provider,
            max_steps: MAX_STEPS,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Lower the number of model generations in one reply, clamped to `1..=MAX_STEPS`
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.clamp(1, MAX_STEPS);
        self
    }

    /// Bound the wall-clock time of each model generation, tool calls included
    pub fn with_step_timeout(mut self, step_timeout: Duration) -> Self {
        self.step_timeout = step_timeout;
        self
    }

    /// Add a system to the agent
    pub fn add_system(&mut self, system: Box<dyn System>) {
        self.systems.push(system);
    }

    fn get_tools(&self) -> Vec<Tool> {
        self.systems
            .iter()
            .flat_map(|system| system.tools().iter().cloned())
            .collect()
    }

    fn get_system_for_tool(&self, tool_name: &str) -> Option<&dyn System> {
        self.systems
            .iter()
            .find(|system| system.tools().iter().any(|tool| tool.name == tool_name))
            .map(|v| &**v)
    }

    /// Dispatch a single tool call to the system that owns it
    async fn dispatch_tool_call(&self, tool_call: AgentResult<ToolCall>) -> AgentResult<Vec<Content>> {
        let call = tool_call?;
        let system = self
            .get_system_for_tool(&call.name)
            .ok_or_else(|| AgentError::ToolNotFound(call.name.clone()))?;

        system.call(call).await
    }

    fn get_system_prompt(&self) -> AgentResult<String> {
        let systems_info: Vec<SystemInfo> = self
            .systems
            .iter()
            .map(|system| {
                SystemInfo::new(system.name(), system.description(), system.instructions())
            })
            .collect();

        let mut context = HashMap::new();
        context.insert("systems", json!(systems_info));
        context.insert("max_steps", json!(self.max_steps));
        load_prompt_file("system.md", &context).map_err(|e| AgentError::Internal(e.to_string()))
    }

    /// Create a stream that yields each event as it's generated by the agent.
    ///
    /// The caller's history is copied, never modified. The stream ends after a generation
    /// that requested no tools, or once the step cap is reached. Backend failures and step
    /// timeouts end it with an `Err`.
    pub async fn reply(&self, messages: &[Message]) -> Result<BoxStream<'_, Result<AgentEvent>>> {
        let mut messages = messages.to_vec();
        let tools = self.get_tools();
        let system_prompt = self.get_system_prompt()?;

        Ok(Box::pin(async_stream::try_stream! {
            let mut state = TurnState::GeneratingText;
            let mut step = 0;

            loop {
                step += 1;
                enter(&mut state, TurnState::GeneratingText, step);
                let deadline = Instant::now() + self.step_timeout;

                let mut deltas = timeout_at(
                    deadline,
                    self.provider.stream(&system_prompt, &messages, &tools),
                )
                .await
                .map_err(|_| anyhow!("Model step {} timed out after {:?}", step, self.step_timeout))
                .and_then(|started| started)
                .map_err(|e| {
                    enter(&mut state, TurnState::Failed, step);
                    e
                })?;

                let mut text = String::new();
                let mut tool_requests: Vec<ToolRequest> = Vec::new();
                let mut message_tool_response = Message::user();

                loop {
                    let delta = timeout_at(deadline, deltas.next())
                        .await
                        .map_err(|_| anyhow!("Model step {} timed out after {:?}", step, self.step_timeout))
                        .and_then(|next| next.transpose())
                        .map_err(|e| {
                            enter(&mut state, TurnState::Failed, step);
                            e
                        })?;

                    let Some(delta) = delta else {
                        break;
                    };

                    match delta {
                        ProviderDelta::Text(fragment) => {
                            enter(&mut state, TurnState::GeneratingText, step);
                            text.push_str(&fragment);
                            yield AgentEvent::TextDelta(fragment);
                        }
                        ProviderDelta::ToolRequest(request) => {
                            enter(&mut state, TurnState::AwaitingToolResult, step);
                            let (name, arguments) = match &request.tool_call {
                                Ok(call) => (call.name.clone(), call.arguments.clone()),
                                // The request still has to show up so the failure can be resolved against it
                                Err(_) => (INVALID_TOOL_CALL_NAME.to_string(), json!({})),
                            };
                            tracing::info!(step, id = %request.id, tool = %name, "dispatching tool call");
                            yield AgentEvent::ToolCallStarted {
                                id: request.id.clone(),
                                name,
                                arguments,
                            };

                            let result = timeout_at(deadline, self.dispatch_tool_call(request.tool_call.clone()))
                                .await
                                .map_err(|_| anyhow!("Model step {} timed out after {:?}", step, self.step_timeout))
                                .map_err(|e| {
                                    enter(&mut state, TurnState::Failed, step);
                                    e
                                })?;
                            message_tool_response = message_tool_response
                                .with_tool_response(request.id.clone(), result.clone());
                            yield AgentEvent::ToolCallResolved {
                                id: request.id.clone(),
                                result,
                            };
                            tool_requests.push(request);
                        }
                        ProviderDelta::Finish { reason, usage } => {
                            tracing::debug!(step, ?reason, ?usage, "generation finished");
                        }
                    }
                }

                if tool_requests.is_empty() {
                    // No more tool calls, end the reply loop
                    enter(&mut state, TurnState::Done, step);
                    break;
                }

                let mut response = Message::assistant();
                if !text.is_empty() {
                    response = response.with_text(text);
                }
                for request in tool_requests {
                    response = response.with_content(MessageContent::ToolRequest(request));
                }
                messages.push(response);
                messages.push(message_tool_response);

                if step >= self.max_steps {
                    tracing::warn!(step, "step limit reached, ending the reply");
                    enter(&mut state, TurnState::Done, step);
                    break;
                }
            }
        }))
    }
}
