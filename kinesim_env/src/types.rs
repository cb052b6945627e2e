//! Common types for the kinesim environment abstraction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a connected front-end session or a scenario run.
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Creates a new random SessionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Scenario lifecycle transitions reported to the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScenarioEventKind {
    Loaded,
    Started,
    Stopped,
    Paused,
    Continued,
    Reset,
}

/// Outbound event delivered to the presentation layer.
///
/// Serialized externally tagged, mirroring the inbound message schema:
/// `{"FocusChanged":{"EntityName":"X"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    /// The operator focused a different entity
    FocusChanged {
        #[serde(rename = "EntityName")]
        entity_name: String,
    },

    /// A scenario changed state
    ScenarioEvent {
        #[serde(rename = "ScenarioName")]
        scenario: Option<String>,
        #[serde(rename = "Event")]
        event: ScenarioEventKind,
        #[serde(rename = "RunId")]
        run_id: SessionId,
    },

    /// An entity was created
    EntityCreated {
        #[serde(rename = "EntityName")]
        entity_name: String,
    },

    /// An entity was removed
    EntityDeleted {
        #[serde(rename = "EntityName")]
        entity_name: String,
    },

    /// An update tick ran longer than its interval
    TickOverrun {
        #[serde(rename = "ProcessingMs")]
        processing_ms: f64,
        #[serde(rename = "IntervalMs")]
        interval_ms: f64,
    },
}

impl Notification {
    /// Short kind label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::FocusChanged { .. } => "focus_changed",
            Notification::ScenarioEvent { .. } => "scenario_event",
            Notification::EntityCreated { .. } => "entity_created",
            Notification::EntityDeleted { .. } => "entity_deleted",
            Notification::TickOverrun { .. } => "tick_overrun",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_json_shape() {
        let n = Notification::FocusChanged { entity_name: "Eagle1".to_string() };
        let json = serde_json::to_string(&n).unwrap();
        assert_eq!(json, r#"{"FocusChanged":{"EntityName":"Eagle1"}}"#);
    }

    #[test]
    fn test_session_id_display_is_short() {
        let id = SessionId::new();
        assert_eq!(id.to_string().len(), 8);
    }
}
