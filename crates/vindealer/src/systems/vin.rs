use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::System;
use crate::errors::{AgentError, AgentResult};
use crate::models::content::Content;
use crate::models::tool::{Tool, ToolCall};
use crate::nhtsa::NhtsaClient;

pub const AUDIT_TOOL_NAME: &str = "audit_vehicle_safety";

const INSTRUCTIONS: &str = "Use audit_vehicle_safety whenever the user provides a VIN. \
    Pass the VIN exactly as the user wrote it. The result is either a JSON vehicle record, \
    a decoder warning, or an error description.";

/// Exposes the NHTSA VIN decoder to the model as the `audit_vehicle_safety` tool
pub struct VinAuditSystem {
    tools: Vec<Tool>,
    client: Arc<NhtsaClient>,
}

impl VinAuditSystem {
    pub fn new(client: Arc<NhtsaClient>) -> Self {
        let audit_tool = Tool::new(
            AUDIT_TOOL_NAME,
            "Audits a US vehicle VIN for specs and active vehicle recalls",
            json!({
                "type": "object",
                "required": ["vin"],
                "properties": {
                    "vin": {
                        "type": "string",
                        "description": "The 17-character VIN of the vehicle"
                    }
                }
            }),
        );

        Self {
            tools: vec![audit_tool],
            client,
        }
    }

    async fn audit(&self, arguments: Value) -> AgentResult<Vec<Content>> {
        let vin = arguments
            .get("vin")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AgentError::InvalidParameters("The 'vin' argument must be a string".into())
            })?;

        // The 17 character rule is left to the model and the decoder
        let report = self.client.lookup(vin).await;
        Ok(vec![Content::text(report)])
    }
}

#[async_trait]
impl System for VinAuditSystem {
    fn name(&self) -> &str {
        "VinAuditSystem"
    }

    fn description(&self) -> &str {
        "Decodes US vehicle identification numbers through the NHTSA vPIC service"
    }

    fn instructions(&self) -> &str {
        INSTRUCTIONS
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> AgentResult<Vec<Content>> {
        match tool_call.name.as_str() {
            AUDIT_TOOL_NAME => self.audit(tool_call.arguments).await,
            _ => Err(AgentError::ToolNotFound(tool_call.name)),
        }
    }
}
