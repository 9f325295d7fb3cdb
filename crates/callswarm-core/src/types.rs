//! Agent and provider data model.
//!
//! A [`ProviderAgent`] is one provider-negotiation attempt within a run.
//! Field names serialize in camelCase — the UI and the voice platform
//! rely on the exact wire names.

use serde::{Deserialize, Serialize};

/// Lifecycle status of one calling agent.
///
/// `idle → searching → calling → negotiating → {booked | rejected | cancelled}`.
/// The three right-hand states are terminal; the only post-terminal
/// transition is the `booked → cancelled` demotion during arbitration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Created but not yet dispatched.
    Idle,
    /// Dispatched, looking up the provider.
    Searching,
    /// Dialing the provider.
    Calling,
    /// In conversation, a candidate slot is on the table.
    Negotiating,
    /// Provider accepted a slot.
    Booked,
    /// No acceptable slot (or call failed / went unanswered).
    Rejected,
    /// Abandoned — another agent won, or the result arrived too late.
    Cancelled,
}

impl AgentStatus {
    /// Whether this status ends the agent's participation in the run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Booked | Self::Rejected | Self::Cancelled)
    }

    /// Wire name of the status (the serde snake_case rename).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Searching => "searching",
            Self::Calling => "calling",
            Self::Negotiating => "negotiating",
            Self::Booked => "booked",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One provider-negotiation attempt within a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAgent {
    /// Stable identifier, unique within a run.
    pub id: String,
    /// Human-readable provider name.
    pub name: String,
    /// Current lifecycle status.
    pub status: AgentStatus,
    /// Offered/negotiated slot, may be overwritten until terminal.
    #[serde(rename = "slotTime")]
    pub slot_time: Option<String>,
    /// Whether results for this agent arrive over the live channel
    /// (external webhook) instead of the internal simulator. Set at
    /// registry construction, never mutated during a run.
    #[serde(rename = "liveChannelReady")]
    pub live_channel_ready: bool,
    /// Directory rating (0-5); a shortlist scoring factor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Distance to the provider in miles; a shortlist scoring factor.
    #[serde(rename = "distanceMiles", skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
}

impl ProviderAgent {
    /// Build an agent from a directory record, in `searching` state.
    pub fn from_record(record: &ProviderRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            status: AgentStatus::Searching,
            slot_time: None,
            live_channel_ready: record.live_channel_ready,
            rating: record.rating,
            distance_miles: record.distance_miles,
        }
    }
}

/// Raw provider entry as stored in the directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRecord {
    /// Directory identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Service category ("dentist", "salon", ...).
    #[serde(rename = "serviceType", default = "default_service_type")]
    pub service_type: String,
    /// Whether this provider is reachable over the live voice channel.
    #[serde(rename = "liveChannelReady", default)]
    pub live_channel_ready: bool,
    /// Rating (0-5).
    #[serde(default)]
    pub rating: Option<f64>,
    /// Distance in miles.
    #[serde(rename = "distanceMiles", default)]
    pub distance_miles: Option<f64>,
}

fn default_service_type() -> String {
    "dentist".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> ProviderRecord {
        ProviderRecord {
            id: id.to_string(),
            name: format!("Provider {id}"),
            service_type: "dentist".to_string(),
            live_channel_ready: false,
            rating: Some(4.5),
            distance_miles: Some(2.0),
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(AgentStatus::Booked.is_terminal());
        assert!(AgentStatus::Rejected.is_terminal());
        assert!(AgentStatus::Cancelled.is_terminal());
        assert!(!AgentStatus::Idle.is_terminal());
        assert!(!AgentStatus::Searching.is_terminal());
        assert!(!AgentStatus::Calling.is_terminal());
        assert!(!AgentStatus::Negotiating.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&AgentStatus::Negotiating).unwrap();
        assert_eq!(json, "\"negotiating\"");
        let back: AgentStatus = serde_json::from_str("\"booked\"").unwrap();
        assert_eq!(back, AgentStatus::Booked);
    }

    #[test]
    fn as_str_matches_serde() {
        for status in [
            AgentStatus::Idle,
            AgentStatus::Searching,
            AgentStatus::Calling,
            AgentStatus::Negotiating,
            AgentStatus::Booked,
            AgentStatus::Rejected,
            AgentStatus::Cancelled,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    #[test]
    fn agent_from_record_starts_searching() {
        let agent = ProviderAgent::from_record(&record("p1"));
        assert_eq!(agent.status, AgentStatus::Searching);
        assert_eq!(agent.id, "p1");
        assert!(agent.slot_time.is_none());
        assert!(!agent.live_channel_ready);
    }

    #[test]
    fn agent_wire_format_is_camel_case() {
        let mut agent = ProviderAgent::from_record(&record("p1"));
        agent.slot_time = Some("9:30 AM".to_string());
        let value = serde_json::to_value(&agent).unwrap();
        assert_eq!(value["slotTime"], "9:30 AM");
        assert_eq!(value["liveChannelReady"], false);
        assert_eq!(value["distanceMiles"], 2.0);
    }

    #[test]
    fn record_defaults_apply() {
        let json = r#"{"id": "p9", "name": "Smile Dental"}"#;
        let rec: ProviderRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.service_type, "dentist");
        assert!(!rec.live_channel_ready);
        assert!(rec.rating.is_none());
    }
}
