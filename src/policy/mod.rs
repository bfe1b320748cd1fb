pub mod dialect;
pub mod identity;
pub mod kind;
pub mod template;

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StoreError;
use kind::EntityKind;

pub const POLICY_ID_MAX_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::Allow => "allow",
            Effect::Deny => "deny",
        }
    }
}

impl FromStr for Effect {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Effect::Allow),
            "deny" => Ok(Effect::Deny),
            other => Err(StoreError::Validation(format!(
                "effect must be `allow` or `deny`, got `{other}`"
            ))),
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored authorization rule.
///
/// `conditions` is evaluated by the decision engine, never by this crate; it
/// only has to be a JSON object (`null` is treated as `{}`). `meta` is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    pub effect: Effect,
    #[serde(default = "empty_conditions")]
    pub conditions: Value,
    #[serde(default)]
    pub meta: Vec<u8>,
}

fn empty_conditions() -> Value {
    Value::Object(Map::new())
}

impl Policy {
    pub fn new(id: impl Into<String>, effect: Effect) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            subjects: Vec::new(),
            actions: Vec::new(),
            resources: Vec::new(),
            effect,
            conditions: empty_conditions(),
            meta: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.id.is_empty() {
            return Err(StoreError::Validation("policy id cannot be empty".into()));
        }
        if self.id.len() > POLICY_ID_MAX_LEN {
            return Err(StoreError::Validation(format!(
                "policy id is {} bytes long, the limit is {POLICY_ID_MAX_LEN}",
                self.id.len()
            )));
        }
        match &self.conditions {
            Value::Object(_) | Value::Null => Ok(()),
            other => Err(StoreError::Validation(format!(
                "conditions must be a JSON object, got `{other}`"
            ))),
        }
    }

    /// Conditions as stored: always a JSON object.
    pub fn conditions_json(&self) -> Result<String, StoreError> {
        match &self.conditions {
            Value::Null => Ok("{}".to_string()),
            value => Ok(serde_json::to_string(value)?),
        }
    }

    pub fn templates(&self, kind: EntityKind) -> &[String] {
        match kind {
            EntityKind::Subject => &self.subjects,
            EntityKind::Action => &self.actions,
            EntityKind::Resource => &self.resources,
        }
    }

    pub fn templates_mut(&mut self, kind: EntityKind) -> &mut Vec<String> {
        match kind {
            EntityKind::Subject => &mut self.subjects,
            EntityKind::Action => &mut self.actions,
            EntityKind::Resource => &mut self.resources,
        }
    }

    /// Same policy with each template list trimmed, sorted and deduplicated;
    /// the shape `get` returns after a round trip through storage.
    pub fn normalized(mut self) -> Self {
        for kind in EntityKind::ALL {
            let list = self.templates_mut(kind);
            let unique: BTreeSet<String> = list
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            *list = unique.into_iter().collect();
        }
        if self.conditions.is_null() {
            self.conditions = empty_conditions();
        }
        self
    }
}

/// A concrete access request to find candidate policies for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub subject: String,
    pub action: String,
    pub resource: String,
}

impl Request {
    pub fn new(
        subject: impl Into<String>,
        action: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            action: action.into(),
            resource: resource.into(),
        }
    }

    pub fn field(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Subject => &self.subject,
            EntityKind::Action => &self.action,
            EntityKind::Resource => &self.resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effect_parse() {
        assert_eq!("allow".parse::<Effect>().unwrap(), Effect::Allow);
        assert_eq!("deny".parse::<Effect>().unwrap(), Effect::Deny);
        assert!(matches!(
            "Allow".parse::<Effect>(),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_id_bounds() {
        let mut policy = Policy::new("", Effect::Allow);
        assert!(matches!(policy.validate(), Err(StoreError::Validation(_))));

        policy.id = "x".repeat(POLICY_ID_MAX_LEN);
        assert!(policy.validate().is_ok());

        policy.id.push('x');
        assert!(matches!(policy.validate(), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_validate_conditions_shape() {
        let mut policy = Policy::new("p1", Effect::Deny);
        policy.conditions = json!({"owner": {"type": "EqualsSubjectCondition", "options": {}}});
        assert!(policy.validate().is_ok());

        policy.conditions = Value::Null;
        assert!(policy.validate().is_ok());
        assert_eq!(policy.conditions_json().unwrap(), "{}");

        policy.conditions = json!(["not", "an", "object"]);
        assert!(matches!(policy.validate(), Err(StoreError::Validation(_))));
    }

    #[test]
    fn test_deserialize_defaults() {
        let policy: Policy = serde_json::from_value(json!({
            "id": "p1",
            "subjects": ["user"],
            "effect": "allow"
        }))
        .unwrap();

        assert_eq!(policy.conditions, json!({}));
        assert!(policy.meta.is_empty());
        assert!(policy.actions.is_empty());
        assert_eq!(policy.description, "");
    }

    #[test]
    fn test_deserialize_rejects_unknown_effect() {
        let result: Result<Policy, _> =
            serde_json::from_value(json!({"id": "p1", "effect": "maybe"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_normalized_collapses_duplicates() {
        let mut policy = Policy::new("p1", Effect::Allow);
        policy.actions = vec!["write".into(), " read".into(), "read".into(), "  ".into()];
        let policy = policy.normalized();
        assert_eq!(policy.actions, vec!["read".to_string(), "write".to_string()]);
    }

    #[test]
    fn test_request_field() {
        let request = Request::new("alice", "read", "doc:1");
        assert_eq!(request.field(EntityKind::Subject), "alice");
        assert_eq!(request.field(EntityKind::Action), "read");
        assert_eq!(request.field(EntityKind::Resource), "doc:1");
    }
}
