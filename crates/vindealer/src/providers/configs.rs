use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// The fixed set of inference backends a conversation can be routed through
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    Display,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderId {
    #[default]
    Gemini,
    Groq,
    Cerebras,
    Mimo,
}

impl ProviderId {
    /// Parse a client supplied identifier, falling back to the default provider
    pub fn resolve(id: Option<&str>) -> Self {
        match id.map(|id| id.trim().to_lowercase().parse::<ProviderId>()) {
            Some(Ok(provider)) => provider,
            Some(Err(_)) => {
                tracing::debug!(?id, "unknown provider id, using default");
                ProviderId::default()
            }
            None => ProviderId::default(),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "Gemini 1.5 Pro",
            ProviderId::Groq => "Groq (Llama 3.1 70B)",
            ProviderId::Cerebras => "Cerebras (GPT-OSS 120B)",
            ProviderId::Mimo => "MiMo (Xiaomi MiMo-V2)",
        }
    }

    pub fn default_host(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            ProviderId::Groq => "https://api.groq.com/openai/v1",
            ProviderId::Cerebras => "https://api.cerebras.ai/v1",
            // MiMo is served through OpenRouter
            ProviderId::Mimo => "https://openrouter.ai/api/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "gemini-1.5-pro",
            ProviderId::Groq => "llama-3.1-70b-versatile",
            ProviderId::Cerebras => "gpt-oss-120b",
            ProviderId::Mimo => "xiaomi/mimo-v2-flash",
        }
    }

    /// The plain environment variable holding this provider's key
    pub fn key_env_var(&self) -> &'static str {
        match self {
            ProviderId::Gemini => "GEMINI_API_KEY",
            ProviderId::Groq => "GROQ_API_KEY",
            ProviderId::Cerebras => "CEREBRAS_API_KEY",
            ProviderId::Mimo => "MIMO_API_KEY",
        }
    }
}

/// Connection settings for one openai-compatible chat completions backend
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base url including the api version, `/chat/completions` is appended
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl ProviderConfig {
    /// Built-in host and model for a provider, with the given key
    pub fn defaults_for(id: ProviderId, api_key: impl Into<String>) -> Self {
        Self {
            host: id.default_host().to_string(),
            api_key: api_key.into(),
            model: id.default_model().to_string(),
            temperature: None,
            max_tokens: None,
        }
    }
}
