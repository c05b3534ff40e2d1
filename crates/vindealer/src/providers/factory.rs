use super::{
    base::Provider,
    configs::{ProviderConfig, ProviderId},
    openai::OpenAiCompatibleProvider,
};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use strum::IntoEnumIterator;

pub type ModelHandle = Arc<dyn Provider>;

/// A provider as shown in the client's provider picker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    pub name: &'static str,
    pub model: String,
}

/// Immutable table from provider id to a ready backend handle, built once at startup
pub struct ModelGateway {
    providers: HashMap<ProviderId, ModelHandle>,
}

impl ModelGateway {
    /// Build a handle for every provider. Every id must have a config.
    pub fn new(configs: HashMap<ProviderId, ProviderConfig>) -> Result<Self> {
        let mut providers: HashMap<ProviderId, ModelHandle> = HashMap::new();
        for id in ProviderId::iter() {
            let config = configs
                .get(&id)
                .cloned()
                .ok_or_else(|| anyhow!("No configuration for provider {}", id))?;
            providers.insert(id, get_provider(config)?);
        }
        Ok(Self { providers })
    }

    /// Build a gateway from ready handles. The default provider must be present.
    pub fn from_providers(providers: HashMap<ProviderId, ModelHandle>) -> Result<Self> {
        if !providers.contains_key(&ProviderId::default()) {
            return Err(anyhow!(
                "The default provider {} must be registered",
                ProviderId::default()
            ));
        }
        Ok(Self { providers })
    }

    /// Look up the handle for a client supplied id, falling back to the default provider
    pub fn resolve(&self, id: Option<&str>) -> (ProviderId, ModelHandle) {
        let requested = ProviderId::resolve(id);
        match self.providers.get(&requested) {
            Some(handle) => (requested, handle.clone()),
            None => {
                let fallback = ProviderId::default();
                (fallback, self.providers[&fallback].clone())
            }
        }
    }

    pub fn descriptors(&self) -> Vec<ProviderDescriptor> {
        ProviderId::iter()
            .filter_map(|id| {
                self.providers.get(&id).map(|handle| ProviderDescriptor {
                    id,
                    name: id.display_name(),
                    model: handle.model().to_string(),
                })
            })
            .collect()
    }
}

pub fn get_provider(config: ProviderConfig) -> Result<ModelHandle> {
    Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
}
