use std::sync::Arc;
use std::time::Duration;
use vindealer::agent::Agent;
use vindealer::nhtsa::NhtsaClient;
use vindealer::providers::configs::ProviderId;
use vindealer::providers::factory::ModelGateway;
use vindealer::systems::VinAuditSystem;

/// Shared application state, built once at startup and never mutated
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ModelGateway>,
    pub nhtsa: Arc<NhtsaClient>,
    pub step_timeout: Duration,
}

impl AppState {
    /// A fresh agent for one request, routed to the requested provider
    pub fn agent_for(&self, provider_id: Option<&str>) -> (ProviderId, Agent) {
        let (id, provider) = self.gateway.resolve(provider_id);

        let mut agent = Agent::new(provider)
            .with_step_timeout(self.step_timeout);
        agent.add_system(Box::new(VinAuditSystem::new(self.nhtsa.clone())));

        (id, agent)
    }
}
