use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;

use crate::models::vehicle::{coerce_string, VehicleSpecs};

pub const NHTSA_HOST: &str = "https://vpic.nhtsa.dot.gov";
pub const NHTSA_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct NhtsaConfig {
    pub host: String,
    pub timeout: Duration,
}

impl Default for NhtsaConfig {
    fn default() -> Self {
        Self {
            host: NHTSA_HOST.to_string(),
            timeout: Duration::from_secs(NHTSA_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DecodeResponse {
    #[serde(rename = "Results", default)]
    results: Vec<Map<String, Value>>,
}

/// Client for the NHTSA vPIC VIN decoder.
///
/// `lookup` never fails: every problem is turned into text the model can relay.
pub struct NhtsaClient {
    client: Client,
    config: NhtsaConfig,
}

impl NhtsaClient {
    pub fn new(config: NhtsaConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn decode_url(&self, vin: &str) -> String {
        format!(
            "{}/api/vehicles/DecodeVinValues/{}?format=json",
            self.config.host.trim_end_matches('/'),
            urlencoding::encode(vin)
        )
    }

    /// Decode a VIN into a pretty-printed [`VehicleSpecs`] record, a decoder warning,
    /// or an error description.
    pub async fn lookup(&self, vin: &str) -> String {
        tracing::info!(vin, "fetching vehicle data");

        match self.decode(vin).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(vin, error = %e, "VIN lookup failed");
                format!("Error decoding VIN: {}", e)
            }
        }
    }

    async fn decode(&self, vin: &str) -> Result<String> {
        let response = self.client.get(self.decode_url(vin)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("NHTSA API error: {}", status));
        }

        let body: DecodeResponse = response.json().await?;
        let raw = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No results from NHTSA API"))?;

        let error_code = coerce_string(raw.get("ErrorCode"));
        if !error_code.is_empty() && error_code != "0" {
            let error_text = coerce_string(raw.get("ErrorText"));
            let error_text = if error_text.is_empty() {
                "Unknown error".to_string()
            } else {
                error_text
            };
            tracing::warn!(vin, %error_code, "VIN decode returned a warning");
            return Ok(format!("VIN decode warning: {}", error_text));
        }

        let specs = VehicleSpecs::from_decode_result(vin, &raw);
        tracing::info!(
            vin,
            year = ?specs.year,
            make = %specs.make,
            model = %specs.model,
            "decoded vehicle"
        );
        Ok(specs.to_pretty_json()?)
    }
}
