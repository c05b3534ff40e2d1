use crate::state::AppState;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vindealer::models::message::{Message, ToolRequest};
use vindealer::models::tool::{Tool, ToolCall};
use vindealer::nhtsa::{NhtsaClient, NhtsaConfig};
use vindealer::providers::base::{DeltaStream, Provider, ProviderDelta};
use vindealer::providers::configs::ProviderId;
use vindealer::providers::factory::{ModelGateway, ModelHandle};
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One scripted generation
pub enum Step {
    Text(Vec<&'static str>),
    ToolCall(&'static str, Value),
    Fail(&'static str),
}

/// A provider that plays back generations in order
pub struct ScriptedProvider {
    steps: Mutex<Vec<Step>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn finish(reason: &str) -> Result<ProviderDelta> {
    Ok(ProviderDelta::Finish {
        reason: Some(reason.to_string()),
        usage: None,
    })
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, _: &str, _: &[Message], _: &[Tool]) -> Result<DeltaStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let step = {
            let mut steps = self.steps.lock().unwrap();
            if steps.is_empty() {
                Step::Text(Vec::new())
            } else {
                steps.remove(0)
            }
        };

        let deltas = match step {
            Step::Fail(reason) => return Err(anyhow!(reason)),
            Step::Text(fragments) => {
                let mut deltas: Vec<Result<ProviderDelta>> = fragments
                    .into_iter()
                    .map(|text| Ok(ProviderDelta::Text(text.to_string())))
                    .collect();
                deltas.push(finish("stop"));
                deltas
            }
            Step::ToolCall(id, arguments) => vec![
                Ok(ProviderDelta::ToolRequest(ToolRequest {
                    id: id.to_string(),
                    tool_call: Ok(ToolCall::new("audit_vehicle_safety", arguments)),
                })),
                finish("tool_calls"),
            ],
        };

        Ok(Box::pin(futures::stream::iter(deltas)))
    }
}

struct ReleaseOnDrop(Arc<AtomicBool>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// A provider that sends one text delta and then never finishes.
///
/// `released` turns true once whoever consumed the stream lets go of it.
pub struct StallingProvider {
    pub released: Arc<AtomicBool>,
}

impl StallingProvider {
    pub fn new() -> Self {
        Self {
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait]
impl Provider for StallingProvider {
    fn model(&self) -> &str {
        "stalling"
    }

    async fn stream(&self, _: &str, _: &[Message], _: &[Tool]) -> Result<DeltaStream> {
        let guard = ReleaseOnDrop(self.released.clone());
        let deltas = futures::stream::iter(vec![Ok(ProviderDelta::Text("Checking".to_string()))])
            .chain(futures::stream::pending::<Result<ProviderDelta>>())
            .map(move |delta| {
                let _held = &guard;
                delta
            });
        Ok(Box::pin(deltas))
    }
}

/// An NHTSA stand-in that decodes every VIN as a 2003 Honda Accord
pub async fn nhtsa_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/vehicles/DecodeVinValues/.+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Results": [{
                "ErrorCode": "0",
                "ModelYear": "2003",
                "Make": "HONDA",
                "Model": "Accord",
                "Trim": "EX-V6"
            }]
        })))
        .mount(&server)
        .await;
    server
}

/// App state routing every provider id to the given handle
pub fn state_with(provider: ModelHandle, nhtsa: &MockServer) -> AppState {
    let providers = HashMap::from([(ProviderId::default(), provider)]);

    AppState {
        gateway: Arc::new(ModelGateway::from_providers(providers).unwrap()),
        nhtsa: Arc::new(
            NhtsaClient::new(NhtsaConfig {
                host: nhtsa.uri(),
                timeout: Duration::from_secs(5),
            })
            .unwrap(),
        ),
        step_timeout: Duration::from_secs(10),
    }
}
