use policy_store::{Effect, Policy, PolicyManager, SqlPolicyManager};
use serde_json::Value;

/// Builder for test policies
pub struct PolicyBuilder {
    policy: Policy,
}

impl PolicyBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            policy: Policy::new(id, Effect::Allow),
        }
    }

    pub fn subject(mut self, template: &str) -> Self {
        self.policy.subjects.push(template.to_string());
        self
    }

    pub fn action(mut self, template: &str) -> Self {
        self.policy.actions.push(template.to_string());
        self
    }

    pub fn resource(mut self, template: &str) -> Self {
        self.policy.resources.push(template.to_string());
        self
    }

    pub fn deny(mut self) -> Self {
        self.policy.effect = Effect::Deny;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.policy.description = description.to_string();
        self
    }

    pub fn conditions(mut self, conditions: Value) -> Self {
        self.policy.conditions = conditions;
        self
    }

    pub fn meta(mut self, meta: &[u8]) -> Self {
        self.policy.meta = meta.to_vec();
        self
    }

    pub fn build(self) -> Policy {
        self.policy
    }

    pub async fn create(self, manager: &SqlPolicyManager) -> Policy {
        manager
            .create(&self.policy)
            .await
            .expect("Failed to create test policy");
        self.policy
    }
}
