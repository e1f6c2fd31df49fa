//! Lifecycle events, actions and handler outcomes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::host::RelationId;
use crate::secrets::SecretId;

/// A relation lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEvent {
    pub relation: RelationId,
    pub relation_name: String,
    pub remote_app: String,
}

/// Events delivered by the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Event {
    Install,
    Start,
    UpdateStatus,
    SecretRotate { secret: SecretId, label: String },
    RelationJoined(RelationEvent),
    RelationChanged(RelationEvent),
    RelationBroken(RelationEvent),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Install => "install",
            Event::Start => "start",
            Event::UpdateStatus => "update-status",
            Event::SecretRotate { .. } => "secret-rotate",
            Event::RelationJoined(_) => "relation-joined",
            Event::RelationChanged(_) => "relation-changed",
            Event::RelationBroken(_) => "relation-broken",
        }
    }

    pub fn relation(&self) -> Option<&RelationEvent> {
        match self {
            Event::RelationJoined(r) | Event::RelationChanged(r) | Event::RelationBroken(r) => {
                Some(r)
            }
            _ => None,
        }
    }
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Handled, or intentionally ignored.
    Done,
    /// A precondition is not met yet; redeliver later.
    Retry,
    /// Handled and failed; not redelivered.
    Failed(String),
}

/// Receives events from the scheduler.
#[async_trait]
pub trait EventHandler: Send {
    async fn handle(&mut self, event: &Event) -> HandlerOutcome;
}

/// Result map returned to the action caller.
pub type ActionResult = serde_json::Map<String, serde_json::Value>;

/// A named action invocation with string parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ActionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), params: BTreeMap::new() }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Required parameter, or the error result to hand back.
    pub fn param(&self, name: &str) -> std::result::Result<&str, ActionResult> {
        match self.params.get(name) {
            Some(v) if !v.is_empty() => Ok(v.as_str()),
            _ => Err(action_error(format!("missing parameter: {}", name))),
        }
    }
}

/// `{"error": message}`
pub fn action_error(message: impl Into<String>) -> ActionResult {
    let mut result = ActionResult::new();
    result.insert("error".to_string(), serde_json::Value::String(message.into()));
    result
}

/// `{key: value}`
pub fn action_result(key: &str, value: impl Into<serde_json::Value>) -> ActionResult {
    let mut result = ActionResult::new();
    result.insert(key.to_string(), value.into());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde_tags() {
        let event = Event::RelationJoined(RelationEvent {
            relation: RelationId::new(3),
            relation_name: "influxdb".into(),
            remote_app: "grafana".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "relation-joined");
        assert_eq!(json["relation"], 3);

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.name(), "relation-joined");

        let install: Event = serde_json::from_value(serde_json::json!({"event": "install"})).unwrap();
        assert_eq!(install, Event::Install);
    }

    #[test]
    fn test_missing_param_result() {
        let req = ActionRequest::new("create-user");
        let err = req.param("username").unwrap_err();
        assert_eq!(err["error"], "missing parameter: username");

        let req = req.with_param("username", "bob");
        assert_eq!(req.param("username").unwrap(), "bob");
    }
}
