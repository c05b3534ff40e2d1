use crate::error::{to_env_var, ConfigError};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use strum::IntoEnumIterator;
use vindealer::agent::DEFAULT_STEP_TIMEOUT;
use vindealer::nhtsa::{NhtsaConfig, NHTSA_HOST, NHTSA_TIMEOUT_SECS};
use vindealer::providers::configs::{ProviderConfig, ProviderId};

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|_| ConfigError::InvalidAddress { addr })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSettings {
    pub host: String,
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
}

impl ProviderSettings {
    pub fn into_config(self) -> ProviderConfig {
        ProviderConfig {
            host: self.host,
            api_key: self.api_key,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProvidersSettings {
    pub gemini: ProviderSettings,
    pub groq: ProviderSettings,
    pub cerebras: ProviderSettings,
    pub mimo: ProviderSettings,
}

impl ProvidersSettings {
    pub fn get(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::Gemini => &self.gemini,
            ProviderId::Groq => &self.groq,
            ProviderId::Cerebras => &self.cerebras,
            ProviderId::Mimo => &self.mimo,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            step_timeout_secs: default_step_timeout_secs(),
        }
    }
}

impl AgentSettings {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

#[derive(Debug, Deserialize)]
pub struct NhtsaSettings {
    #[serde(default = "default_nhtsa_host")]
    pub host: String,
    #[serde(default = "default_nhtsa_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NhtsaSettings {
    fn default() -> Self {
        Self {
            host: default_nhtsa_host(),
            timeout_secs: default_nhtsa_timeout_secs(),
        }
    }
}

impl NhtsaSettings {
    pub fn to_config(&self) -> NhtsaConfig {
        NhtsaConfig {
            host: self.host.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub providers: ProvidersSettings,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub nhtsa: NhtsaSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    /// One backend config per provider, warning about any without a key
    pub fn gateway_configs(&self) -> HashMap<ProviderId, ProviderConfig> {
        ProviderId::iter()
            .map(|id| {
                let settings = self.providers.get(id).clone();
                if settings.api_key.is_empty() {
                    tracing::warn!(
                        provider = %id,
                        "no API key configured, set {} or {}",
                        id.key_env_var(),
                        to_env_var(&format!("providers.{}.api_key", id))
                    );
                }
                (id, settings.into_config())
            })
            .collect()
    }

    fn provider_defaults(
        mut builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        for id in ProviderId::iter() {
            // The plain key variables sit below the prefixed environment
            let api_key = std::env::var(id.key_env_var()).unwrap_or_default();
            builder = builder
                .set_default(format!("providers.{}.host", id), id.default_host())?
                .set_default(format!("providers.{}.model", id), id.default_model())?
                .set_default(format!("providers.{}.api_key", id), api_key)?;
        }
        Ok(builder)
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        // Start with default configuration
        let builder = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Agent defaults
            .set_default("agent.step_timeout_secs", default_step_timeout_secs())?
            // NHTSA defaults
            .set_default("nhtsa.host", default_nhtsa_host())?
            .set_default("nhtsa.timeout_secs", default_nhtsa_timeout_secs())?;

        let config = Self::provider_defaults(builder)?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("VINDEALER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        // Try to deserialize the configuration
        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    // Extract field name from error message "missing field `host`"
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else if let config::ConfigError::NotFound(field) = &err {
                    let env_var = to_env_var(field);
                    Err(ConfigError::MissingEnvVar { env_var })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_step_timeout_secs() -> u64 {
    DEFAULT_STEP_TIMEOUT.as_secs()
}

fn default_nhtsa_host() -> String {
    NHTSA_HOST.to_string()
}

fn default_nhtsa_timeout_secs() -> u64 {
    NHTSA_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("VINDEALER_") {
                env::remove_var(&key);
            }
        }
        for id in ProviderId::iter() {
            env::remove_var(id.key_env_var());
        }
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.agent.step_timeout(), Duration::from_secs(120));
        assert_eq!(settings.nhtsa.host, "https://vpic.nhtsa.dot.gov");
        assert_eq!(settings.nhtsa.timeout_secs, 10);

        let groq = settings.providers.get(ProviderId::Groq);
        assert_eq!(groq.host, "https://api.groq.com/openai/v1");
        assert_eq!(groq.model, "llama-3.1-70b-versatile");
        assert_eq!(groq.api_key, "");
        assert_eq!(groq.temperature, None);
        assert_eq!(groq.max_tokens, None);

        let mimo = settings.providers.get(ProviderId::Mimo);
        assert_eq!(mimo.host, "https://openrouter.ai/api/v1");
        assert_eq!(mimo.model, "xiaomi/mimo-v2-flash");
    }

    #[test]
    #[serial]
    fn test_legacy_key_variables() {
        clean_env();
        env::set_var("GEMINI_API_KEY", "gemini-key");
        env::set_var("CEREBRAS_API_KEY", "cerebras-key");

        let settings = Settings::new().unwrap();
        let configs = settings.gateway_configs();
        assert_eq!(configs[&ProviderId::Gemini].api_key, "gemini-key");
        assert_eq!(configs[&ProviderId::Cerebras].api_key, "cerebras-key");
        assert_eq!(configs[&ProviderId::Groq].api_key, "");
        assert_eq!(configs.len(), 4);

        // Clean up
        env::remove_var("GEMINI_API_KEY");
        env::remove_var("CEREBRAS_API_KEY");
    }

    #[test]
    #[serial]
    fn test_prefixed_environment_wins() {
        clean_env();
        env::set_var("GROQ_API_KEY", "legacy-key");
        env::set_var("VINDEALER_PROVIDERS__GROQ__API_KEY", "prefixed-key");
        env::set_var("VINDEALER_PROVIDERS__GROQ__MODEL", "llama-3.3-70b-versatile");
        env::set_var("VINDEALER_PROVIDERS__GROQ__TEMPERATURE", "0.7");
        env::set_var("VINDEALER_PROVIDERS__GROQ__MAX_TOKENS", "2000");

        let settings = Settings::new().unwrap();
        let groq = settings.providers.get(ProviderId::Groq);
        assert_eq!(groq.api_key, "prefixed-key");
        assert_eq!(groq.model, "llama-3.3-70b-versatile");
        assert_eq!(groq.host, "https://api.groq.com/openai/v1");
        assert_eq!(groq.temperature, Some(0.7));
        assert_eq!(groq.max_tokens, Some(2000));

        // Clean up
        env::remove_var("GROQ_API_KEY");
        env::remove_var("VINDEALER_PROVIDERS__GROQ__API_KEY");
        env::remove_var("VINDEALER_PROVIDERS__GROQ__MODEL");
        env::remove_var("VINDEALER_PROVIDERS__GROQ__TEMPERATURE");
        env::remove_var("VINDEALER_PROVIDERS__GROQ__MAX_TOKENS");
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        env::set_var("VINDEALER_SERVER__PORT", "8080");
        env::set_var("VINDEALER_AGENT__STEP_TIMEOUT_SECS", "30");
        env::set_var("VINDEALER_NHTSA__HOST", "http://localhost:9999");
        env::set_var("VINDEALER_NHTSA__TIMEOUT_SECS", "2");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.agent.step_timeout(), Duration::from_secs(30));

        let nhtsa = settings.nhtsa.to_config();
        assert_eq!(nhtsa.host, "http://localhost:9999");
        assert_eq!(nhtsa.timeout, Duration::from_secs(2));

        // Clean up
        env::remove_var("VINDEALER_SERVER__PORT");
        env::remove_var("VINDEALER_AGENT__STEP_TIMEOUT_SECS");
        env::remove_var("VINDEALER_NHTSA__HOST");
        env::remove_var("VINDEALER_NHTSA__TIMEOUT_SECS");
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");

        let server_settings = ServerSettings {
            host: "not a host".to_string(),
            port: 3000,
        };
        assert!(server_settings.socket_addr().is_err());
    }
}
