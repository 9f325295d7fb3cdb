//! Lifecycle events published by the orchestrator.
//!
//! Every event carries the run it belongs to plus an RFC 3339 timestamp.
//! Events are fanned out in-process (UI forwarders, logging) and over
//! WebSocket; consumers rely on the exact `type` strings and camelCase
//! field names.

use serde::{Deserialize, Serialize};

use crate::scoring::ShortlistEntry;
use crate::types::{AgentStatus, ProviderAgent};

/// Common fields for all swarm events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseEvent {
    /// Run this event belongs to.
    pub run_id: String,
    /// ISO 8601 timestamp.
    pub timestamp: String,
}

impl BaseEvent {
    /// Create a new base event with the current UTC timestamp.
    #[must_use]
    pub fn now(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Swarm lifecycle event with run context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SwarmEvent {
    /// A run started; carries the full initial agent list.
    #[serde(rename = "run:start")]
    RunStart {
        /// Run id and timestamp.
        #[serde(flatten)]
        base: BaseEvent,
        /// All agents, in registration order, in `searching` state.
        agents: Vec<ProviderAgent>,
    },

    /// One agent changed status.
    #[serde(rename = "run:update")]
    RunUpdate {
        /// Run id and timestamp.
        #[serde(flatten)]
        base: BaseEvent,
        /// Agent this update is about.
        #[serde(rename = "agentId")]
        agent_id: String,
        /// New status.
        status: AgentStatus,
        /// Slot attached to the transition, if any.
        #[serde(rename = "slotTime")]
        slot_time: Option<String>,
        /// Human-readable progress line.
        message: String,
    },

    /// The winning agent was selected.
    #[serde(rename = "agent:booked")]
    AgentBooked {
        /// Run id and timestamp.
        #[serde(flatten)]
        base: BaseEvent,
        /// Winning agent.
        #[serde(rename = "agentId")]
        agent_id: String,
        /// Provider display name.
        #[serde(rename = "providerName")]
        provider_name: String,
        /// Confirmed slot.
        #[serde(rename = "slotTime")]
        slot_time: String,
    },

    /// The run finished; carries the authoritative final agent list.
    #[serde(rename = "run:completed")]
    RunCompleted {
        /// Run id and timestamp.
        #[serde(flatten)]
        base: BaseEvent,
        /// Winner id, or null if no agent produced a bookable slot.
        #[serde(rename = "winnerId")]
        winner_id: Option<String>,
        /// Winner display name.
        #[serde(rename = "winnerName")]
        winner_name: Option<String>,
        /// Winning slot.
        #[serde(rename = "winnerSlot")]
        winner_slot: Option<String>,
        /// Scored ranking of the booked agents, best first.
        #[serde(rename = "rankedShortlist", default)]
        ranked_shortlist: Vec<ShortlistEntry>,
        /// Final state of every agent.
        agents: Vec<ProviderAgent>,
    },
}

impl SwarmEvent {
    /// All event type strings, in lifecycle order.
    pub const EVENT_TYPES: [&'static str; 4] =
        ["run:start", "run:update", "agent:booked", "run:completed"];

    /// Get the base event fields.
    #[must_use]
    pub fn base(&self) -> &BaseEvent {
        match self {
            Self::RunStart { base, .. }
            | Self::RunUpdate { base, .. }
            | Self::AgentBooked { base, .. }
            | Self::RunCompleted { base, .. } => base,
        }
    }

    /// Run this event belongs to.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.base().run_id
    }

    /// Get the event type string (for type discrimination).
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStart { .. } => "run:start",
            Self::RunUpdate { .. } => "run:update",
            Self::AgentBooked { .. } => "agent:booked",
            Self::RunCompleted { .. } => "run:completed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderRecord;

    fn agent(id: &str) -> ProviderAgent {
        ProviderAgent::from_record(&ProviderRecord {
            id: id.to_string(),
            name: format!("Provider {id}"),
            service_type: "dentist".to_string(),
            live_channel_ready: false,
            rating: None,
            distance_miles: None,
        })
    }

    #[test]
    fn base_now_has_rfc3339_timestamp() {
        let base = BaseEvent::now("run_1");
        assert_eq!(base.run_id, "run_1");
        assert!(chrono::DateTime::parse_from_rfc3339(&base.timestamp).is_ok());
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let event = SwarmEvent::RunStart {
            base: BaseEvent::now("run_1"),
            agents: vec![agent("p1")],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], event.event_type());
    }

    #[test]
    fn update_wire_format() {
        let event = SwarmEvent::RunUpdate {
            base: BaseEvent::now("run_1"),
            agent_id: "p1".to_string(),
            status: AgentStatus::Negotiating,
            slot_time: Some("10:00 AM".to_string()),
            message: "Provider p1: Negotiating — offered 10:00 AM".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "run:update");
        assert_eq!(value["runId"], "run_1");
        assert_eq!(value["agentId"], "p1");
        assert_eq!(value["status"], "negotiating");
        assert_eq!(value["slotTime"], "10:00 AM");
    }

    #[test]
    fn completed_with_no_winner_serializes_nulls() {
        let event = SwarmEvent::RunCompleted {
            base: BaseEvent::now("run_1"),
            winner_id: None,
            winner_name: None,
            winner_slot: None,
            ranked_shortlist: vec![],
            agents: vec![],
        };
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["winnerId"].is_null());
        assert!(value["winnerName"].is_null());
        assert!(value["winnerSlot"].is_null());
        assert_eq!(value["rankedShortlist"], serde_json::json!([]));
    }

    #[test]
    fn round_trips_through_json() {
        let event = SwarmEvent::AgentBooked {
            base: BaseEvent::now("run_1"),
            agent_id: "p2".to_string(),
            provider_name: "Provider p2".to_string(),
            slot_time: "9:30 AM".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: SwarmEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn event_types_cover_all_variants() {
        assert_eq!(SwarmEvent::EVENT_TYPES.len(), 4);
        let event = SwarmEvent::RunCompleted {
            base: BaseEvent::now("r"),
            winner_id: None,
            winner_name: None,
            winner_slot: None,
            ranked_shortlist: vec![],
            agents: vec![],
        };
        assert!(SwarmEvent::EVENT_TYPES.contains(&event.event_type()));
    }
}
