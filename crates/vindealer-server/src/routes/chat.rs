use crate::error::ChatError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use futures::{stream::StreamExt, Stream};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use vindealer::{
    agent::AgentEvent,
    errors::{AgentError, AgentResult},
    models::content::{contents_to_text, Content},
    models::message::Message,
    models::tool::ToolCall,
};

// Types matching the incoming JSON structure
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatRequest {
    messages: Vec<IncomingMessage>,
    #[serde(default)]
    provider_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    role: String,
    #[serde(default)]
    parts: Vec<IncomingPart>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingPart {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    tool_call_id: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    input: Option<Value>,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error_text: Option<String>,
}

impl IncomingMessage {
    /// Text of the message, from its text parts or one of the legacy fields
    fn plain_text(&self) -> String {
        let from_parts: Vec<&str> = self
            .parts
            .iter()
            .filter(|part| part.kind == "text")
            .filter_map(|part| part.text.as_deref())
            .collect();

        if !from_parts.is_empty() {
            return from_parts.join("").trim().to_string();
        }
        self.content
            .as_deref()
            .or(self.text.as_deref())
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

// Custom SSE response type that implements the AI SDK UI message stream protocol
pub struct SseResponse {
    rx: ReceiverStream<String>,
}

impl SseResponse {
    fn new(rx: ReceiverStream<String>) -> Self {
        Self { rx }
    }
}

impl Stream for SseResponse {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx)
            .poll_next(cx)
            .map(|opt| opt.map(|s| Ok(Bytes::from(s))))
    }
}

impl IntoResponse for SseResponse {
    fn into_response(self) -> Response {
        let body = Body::from_stream(self);

        (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            [("x-vercel-ai-ui-message-stream", "v1")],
            body,
        )
            .into_response()
    }
}

fn tool_output(output: Option<Value>) -> Vec<Content> {
    match output {
        Some(Value::String(text)) => vec![Content::text(text)],
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![Content::text(other.to_string())],
    }
}

// Convert incoming messages to our internal Message type
fn convert_messages(incoming: Vec<IncomingMessage>) -> Vec<Message> {
    let mut messages = Vec::new();

    for msg in incoming {
        match msg.role.as_str() {
            "user" => {
                let text = msg.plain_text();
                if text.is_empty() {
                    tracing::warn!("Skipping user message without text");
                    continue;
                }
                messages.push(Message::user().with_text(text));
            }
            "assistant" => {
                if msg.parts.is_empty() {
                    let text = msg.plain_text();
                    if !text.is_empty() {
                        messages.push(Message::assistant().with_text(text));
                    }
                    continue;
                }

                // Text written before a tool call travels with its request
                let mut text = String::new();
                for part in msg.parts {
                    if part.kind == "text" {
                        text.push_str(part.text.as_deref().unwrap_or_default());
                        continue;
                    }

                    let Some(tool_name) = part.kind.strip_prefix("tool-") else {
                        if part.kind != "step-start" {
                            tracing::warn!(kind = %part.kind, "Skipping unsupported message part");
                        }
                        continue;
                    };

                    let Some(tool_call_id) = part.tool_call_id else {
                        tracing::warn!(tool = tool_name, "Skipping tool part without an id");
                        continue;
                    };

                    let result: AgentResult<Vec<Content>> = match part.state.as_deref() {
                        Some("output-available") => Ok(tool_output(part.output)),
                        Some("output-error") => Err(AgentError::ExecutionError(
                            part.error_text.unwrap_or_else(|| "Unknown error".to_string()),
                        )),
                        // Unresolved invocations never reach the model
                        _ => continue,
                    };

                    let tool_call = ToolCall::new(tool_name, part.input.unwrap_or_else(|| json!({})));
                    let mut request = Message::assistant();
                    let pending = text.trim();
                    if !pending.is_empty() {
                        request = request.with_text(pending);
                    }
                    text.clear();

                    messages.push(request.with_tool_request(tool_call_id.clone(), Ok(tool_call)));
                    messages.push(Message::user().with_tool_response(tool_call_id, result));
                }

                let text = text.trim();
                if !text.is_empty() {
                    messages.push(Message::assistant().with_text(text));
                }
            }
            _ => {
                tracing::warn!("Unknown role: {}", msg.role);
            }
        }
    }

    messages
}

// Protocol-specific message formatting
struct ProtocolFormatter;

impl ProtocolFormatter {
    fn frame(event: Value) -> String {
        format!("data: {}\n\n", event)
    }

    fn format_start(message_id: &str) -> String {
        Self::frame(json!({"type": "start", "messageId": message_id}))
    }

    fn format_start_step() -> String {
        Self::frame(json!({"type": "start-step"}))
    }

    fn format_text_start(id: &str) -> String {
        Self::frame(json!({"type": "text-start", "id": id}))
    }

    fn format_text_delta(id: &str, delta: &str) -> String {
        Self::frame(json!({"type": "text-delta", "id": id, "delta": delta}))
    }

    fn format_text_end(id: &str) -> String {
        Self::frame(json!({"type": "text-end", "id": id}))
    }

    fn format_tool_call(id: &str, name: &str, input: &Value) -> String {
        Self::frame(json!({
            "type": "tool-input-available",
            "toolCallId": id,
            "toolName": name,
            "input": input
        }))
    }

    fn format_tool_response(id: &str, result: &AgentResult<Vec<Content>>) -> String {
        match result {
            Ok(contents) => Self::frame(json!({
                "type": "tool-output-available",
                "toolCallId": id,
                "output": contents_to_text(contents)
            })),
            Err(err) => Self::frame(json!({
                "type": "tool-output-error",
                "toolCallId": id,
                "errorText": err.to_string()
            })),
        }
    }

    fn format_finish_step() -> String {
        Self::frame(json!({"type": "finish-step"}))
    }

    fn format_error(error_text: &str) -> String {
        Self::frame(json!({"type": "error", "errorText": error_text}))
    }

    fn format_finish() -> String {
        Self::frame(json!({"type": "finish"}))
    }

    fn format_done() -> String {
        "data: [DONE]\n\n".to_string()
    }
}

type SendResult = Result<(), mpsc::error::SendError<String>>;

/// Writes agent events onto the channel, keeping text parts and steps balanced
struct UiMessageWriter {
    tx: mpsc::Sender<String>,
    text_id: Option<String>,
    tools_resolved: bool,
}

impl UiMessageWriter {
    fn new(tx: mpsc::Sender<String>) -> Self {
        Self {
            tx,
            text_id: None,
            tools_resolved: false,
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&self, frame: String) -> SendResult {
        self.tx.send(frame).await
    }

    async fn open(&self) -> SendResult {
        let message_id = format!("msg_{}", uuid::Uuid::new_v4().simple());
        self.send(ProtocolFormatter::format_start(&message_id)).await?;
        self.send(ProtocolFormatter::format_start_step()).await
    }

    async fn close_text(&mut self) -> SendResult {
        if let Some(id) = self.text_id.take() {
            self.send(ProtocolFormatter::format_text_end(&id)).await?;
        }
        Ok(())
    }

    async fn write(&mut self, event: AgentEvent) -> SendResult {
        match event {
            AgentEvent::TextDelta(delta) => {
                if self.tools_resolved {
                    // The model is generating again after its tool results
                    self.tools_resolved = false;
                    self.send(ProtocolFormatter::format_finish_step()).await?;
                    self.send(ProtocolFormatter::format_start_step()).await?;
                }
                let id = match &self.text_id {
                    Some(id) => id.clone(),
                    None => {
                        let id = format!("text_{}", uuid::Uuid::new_v4().simple());
                        self.send(ProtocolFormatter::format_text_start(&id)).await?;
                        self.text_id = Some(id.clone());
                        id
                    }
                };
                self.send(ProtocolFormatter::format_text_delta(&id, &delta)).await
            }
            AgentEvent::ToolCallStarted {
                id,
                name,
                arguments,
            } => {
                self.close_text().await?;
                self.send(ProtocolFormatter::format_tool_call(&id, &name, &arguments))
                    .await
            }
            AgentEvent::ToolCallResolved { id, result } => {
                self.tools_resolved = true;
                self.send(ProtocolFormatter::format_tool_response(&id, &result))
                    .await
            }
        }
    }

    async fn fail(&mut self, error_text: &str) -> SendResult {
        self.close_text().await?;
        self.send(ProtocolFormatter::format_error(error_text)).await
    }

    async fn finish(&mut self) -> SendResult {
        self.close_text().await?;
        self.send(ProtocolFormatter::format_finish_step()).await?;
        self.send(ProtocolFormatter::format_finish()).await?;
        self.send(ProtocolFormatter::format_done()).await
    }
}

async fn handler(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<SseResponse, ChatError> {
    let Json(request) = payload?;

    let messages = convert_messages(request.messages);
    let (provider_id, agent) = state.agent_for(request.provider_id.as_deref());
    tracing::info!(provider = %provider_id, messages = messages.len(), "chat request");

    // Create channel for streaming
    let (tx, rx) = mpsc::channel(100);
    let stream = ReceiverStream::new(rx);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

    // Spawn task to handle streaming
    tokio::spawn(async move {
        let mut stream = match agent.reply(&messages).await {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(format!("Failed to start reply stream: {}", e)));
                return;
            }
        };

        let mut writer = UiMessageWriter::new(tx);
        if writer.open().await.is_err() {
            return;
        }

        loop {
            match timeout(Duration::from_millis(500), stream.next()).await {
                Ok(Some(Ok(event))) => {
                    if let Err(e) = writer.write(event).await {
                        tracing::error!("Error sending message through channel: {}", e);
                        return;
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("Error processing message: {}", e);
                    if writer.fail(&e.to_string()).await.is_err() {
                        return;
                    }
                    break;
                }
                Ok(None) => {
                    break;
                }
                Err(_) => {
                    // Heartbeat, used to detect disconnected clients and then end running tools.
                    if writer.is_closed() {
                        tracing::info!("client disconnected, abandoning reply");
                        return;
                    }
                    continue;
                }
            }
        }

        let _ = writer.finish().await;
    });

    match ready_rx.await {
        Ok(Ok(())) => Ok(SseResponse::new(stream)),
        Ok(Err(reason)) => Err(ChatError::Internal(reason)),
        Err(_) => Err(ChatError::Internal(
            "Reply task ended before streaming".to_string(),
        )),
    }
}

// Configure routes for this module
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(handler))
        .with_state(state)
}
