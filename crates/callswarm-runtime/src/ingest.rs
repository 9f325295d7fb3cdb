//! External result ingestion.
//!
//! Inbound webhook payloads are validated here, fail closed, and then
//! converge on the orchestrator's terminal path. There is no second
//! route into run state: a validated external result and a simulated
//! one produce the identical event stream.

use std::sync::LazyLock;

use callswarm_core::AgentStatus;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::IngestError;
use crate::swarm::{ApplyOutcome, SwarmOrchestrator, TerminalResult};

/// Tool name the voice agent invokes to commit a booking.
pub const BOOKING_TOOL: &str = "book_appointment";

/// Call outcome reported by the voice platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Conversation still running; any slot is a progress report.
    InProgress,
    /// Conversation ended normally.
    Completed,
    /// Call errored out.
    Failed,
    /// Provider never picked up.
    NoAnswer,
}

/// One tool invocation reported in the payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Invoked tool name.
    #[serde(rename = "toolName")]
    pub tool_name: String,
    /// Tool arguments.
    #[serde(default)]
    pub parameters: ToolParameters,
}

/// Arguments of a booking-tool invocation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolParameters {
    /// Provider the agent says it booked.
    #[serde(rename = "providerName", default)]
    pub provider_name: String,
    /// Slot the agent says it booked.
    #[serde(rename = "slotTime", default)]
    pub slot_time: String,
    /// Agent's stated justification.
    #[serde(default)]
    pub reasoning: String,
}

/// Inbound result payload for one agent of one run.
///
/// `runId` is required: results are correlated explicitly rather than
/// through any process-global agent registry, so a stale or foreign
/// result can never attach to the wrong run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundResult {
    /// Run the result belongs to.
    pub run_id: String,
    /// Agent the result is about.
    pub agent_id: String,
    /// Upstream conversation identifier, carried for logging only.
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Provider name as the platform saw it.
    #[serde(default)]
    pub provider_name: Option<String>,
    /// Slot offered during the conversation, possibly embedded in prose.
    #[serde(default)]
    pub offered_slot: Option<String>,
    /// Whether the provider explicitly confirmed the booking.
    #[serde(default)]
    pub booking_confirmed: bool,
    /// Call outcome.
    pub call_status: CallStatus,
    /// Tools the agent invoked during the call.
    #[serde(default)]
    pub tool_invocations: Vec<ToolInvocation>,
}

/// How the boundary disposed of an accepted payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Non-terminal update; `applied` is false when it was dropped
    /// (agent already terminal or winner latched).
    Progress {
        /// Whether the agent actually advanced.
        applied: bool,
    },
    /// Terminal result routed through arbitration.
    Terminal(ApplyOutcome),
}

static SLOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,2}:\d{2}\s*(?:AM|PM))").expect("static pattern is valid")
});

/// Extract a clock time from prose like "Tomorrow at 9:30 AM".
///
/// Returns the matched "H:MM AM/PM" substring uppercased with single
/// spacing, or the trimmed input unchanged when nothing matches (the
/// downstream parser then decides acceptability).
pub fn normalize_slot_time(raw: &str) -> String {
    match SLOT_RE.captures(raw) {
        Some(caps) => {
            let matched = caps.get(1).map_or("", |m| m.as_str());
            let upper = matched.to_ascii_uppercase();
            let mut parts = upper.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(clock), Some(period)) => format!("{clock} {period}"),
                // "9:30AM" with no interior space
                _ => match upper.find(['A', 'P']) {
                    Some(pos) => format!("{} {}", &upper[..pos], &upper[pos..]),
                    None => upper,
                },
            }
        }
        None => raw.trim().to_string(),
    }
}

/// Validate and apply one inbound result.
///
/// Fail-closed: every rejection happens before any state mutation.
/// `failed`/`no_answer` are normal rejection outcomes, not errors.
pub fn ingest_result(
    orchestrator: &SwarmOrchestrator,
    payload: &InboundResult,
) -> Result<IngestOutcome, IngestError> {
    let run_id = payload.run_id.as_str();
    let agent_id = payload.agent_id.as_str();

    match payload.call_status {
        CallStatus::Failed | CallStatus::NoAnswer => {
            let reason = match payload.call_status {
                CallStatus::NoAnswer => "Call went unanswered",
                _ => "Call failed",
            };
            let outcome = orchestrator.apply_terminal(
                run_id,
                agent_id,
                TerminalResult {
                    offered_slot: None,
                    confirmed: false,
                    reason: Some(reason.to_string()),
                },
            )?;
            info!(%run_id, %agent_id, status = ?payload.call_status, "call-level rejection applied");
            Ok(IngestOutcome::Terminal(outcome))
        }

        CallStatus::InProgress => {
            let slot = payload
                .offered_slot
                .as_deref()
                .map(normalize_slot_time)
                .filter(|s| !s.is_empty());
            let message = match slot.as_deref() {
                Some(s) => format!("Negotiating, offered {s}"),
                None => "Negotiating".to_string(),
            };
            let applied = orchestrator.apply_progress(
                run_id,
                agent_id,
                AgentStatus::Negotiating,
                slot,
                message,
            )?;
            debug!(%run_id, %agent_id, applied, "progress update ingested");
            Ok(IngestOutcome::Progress { applied })
        }

        CallStatus::Completed => {
            let invocation = payload
                .tool_invocations
                .iter()
                .find(|t| t.tool_name == BOOKING_TOOL);
            if let Some(stray) = payload
                .tool_invocations
                .iter()
                .find(|t| t.tool_name != BOOKING_TOOL)
            {
                // Unknown tools are a contract violation, not a rejection
                if invocation.is_none() {
                    return Err(IngestError::UnrecognizedTool {
                        name: stray.tool_name.clone(),
                    });
                }
            }

            let Some(invocation) = invocation else {
                // No booking invocation means no slot was committed;
                // any prose-level offer in the payload is not recorded.
                let outcome = orchestrator.apply_terminal(
                    run_id,
                    agent_id,
                    TerminalResult {
                        offered_slot: None,
                        confirmed: false,
                        reason: Some("No slot offered".to_string()),
                    },
                )?;
                return Ok(IngestOutcome::Terminal(outcome));
            };

            let params = &invocation.parameters;
            if params.provider_name.trim().is_empty() {
                return Err(IngestError::MissingToolParam {
                    param: "provider_name",
                });
            }
            if params.slot_time.trim().is_empty() {
                return Err(IngestError::MissingToolParam { param: "slot_time" });
            }
            if params.reasoning.trim().is_empty() {
                return Err(IngestError::MissingToolParam { param: "reasoning" });
            }

            let slot = normalize_slot_time(&params.slot_time);
            if let Err(source) = callswarm_core::parse_time(&slot) {
                return Err(IngestError::MalformedSlot { slot, source });
            }

            let reason = if payload.booking_confirmed {
                None
            } else {
                Some("Booking not confirmed by provider".to_string())
            };
            let outcome = orchestrator.apply_terminal(
                run_id,
                agent_id,
                TerminalResult {
                    offered_slot: Some(slot),
                    confirmed: payload.booking_confirmed,
                    reason,
                },
            )?;
            info!(%run_id, %agent_id, ?outcome, "external result applied");
            Ok(IngestOutcome::Terminal(outcome))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::JsonDirectory;
    use crate::errors::RuntimeError;
    use crate::swarm::{SwarmConfig, SwarmOrchestrator};
    use assert_matches::assert_matches;
    use callswarm_core::{ProviderRecord, SwarmEvent};
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct InertSource;

    impl crate::swarm::ResultSource for InertSource {
        fn dispatch(
            &self,
            _orchestrator: &Arc<SwarmOrchestrator>,
            _run_id: &str,
            _agent: callswarm_core::ProviderAgent,
            _cancel: CancellationToken,
        ) {
        }
    }

    fn record(id: &str) -> ProviderRecord {
        ProviderRecord {
            id: id.to_string(),
            name: format!("Provider {id}"),
            service_type: "dentist".to_string(),
            live_channel_ready: true,
            rating: None,
            distance_miles: None,
        }
    }

    fn orchestrator(ids: &[&str]) -> Arc<SwarmOrchestrator> {
        Arc::new(SwarmOrchestrator::new(
            SwarmConfig::default(),
            Arc::new(JsonDirectory::from_records(
                ids.iter().map(|id| record(id)).collect(),
            )),
            Arc::new(InertSource),
        ))
    }

    fn booking_payload(run_id: &str, agent_id: &str, slot: &str, confirmed: bool) -> InboundResult {
        InboundResult {
            run_id: run_id.to_string(),
            agent_id: agent_id.to_string(),
            conversation_id: Some("conv_1".to_string()),
            provider_name: Some(format!("Provider {agent_id}")),
            offered_slot: Some(slot.to_string()),
            booking_confirmed: confirmed,
            call_status: CallStatus::Completed,
            tool_invocations: vec![ToolInvocation {
                tool_name: BOOKING_TOOL.to_string(),
                parameters: ToolParameters {
                    provider_name: format!("Provider {agent_id}"),
                    slot_time: slot.to_string(),
                    reasoning: "earliest acceptable slot".to_string(),
                },
            }],
        }
    }

    #[test]
    fn normalize_extracts_time_from_prose() {
        assert_eq!(normalize_slot_time("Today at 9:30 AM"), "9:30 AM");
        assert_eq!(normalize_slot_time("Tomorrow at 11:00 am"), "11:00 AM");
        assert_eq!(normalize_slot_time("2:15pm works"), "2:15 PM");
        assert_eq!(normalize_slot_time("10:00  PM"), "10:00 PM");
    }

    #[test]
    fn normalize_passes_through_unmatched_input() {
        assert_eq!(normalize_slot_time("  next week  "), "next week");
        assert_eq!(normalize_slot_time("9:30 AM"), "9:30 AM");
    }

    #[test]
    fn confirmed_booking_round_trips_to_booked() {
        let orch = orchestrator(&["p1"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let payload = booking_payload(&run, "p1", "Today at 10:00 AM", true);
        let outcome = ingest_result(&orch, &payload).unwrap();
        assert_eq!(outcome, IngestOutcome::Terminal(ApplyOutcome::Booked));

        let snapshot = orch.snapshot().unwrap();
        assert_eq!(snapshot.winner.unwrap().slot_time, "10:00 AM");
    }

    #[test]
    fn unconfirmed_booking_is_rejected() {
        let orch = orchestrator(&["p1"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let payload = booking_payload(&run, "p1", "10:00 AM", false);
        let outcome = ingest_result(&orch, &payload).unwrap();
        assert_eq!(outcome, IngestOutcome::Terminal(ApplyOutcome::Rejected));
    }

    #[test]
    fn no_answer_is_a_normal_rejection_without_slot() {
        let orch = orchestrator(&["p1", "p2"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let payload = InboundResult {
            call_status: CallStatus::NoAnswer,
            tool_invocations: vec![],
            offered_slot: None,
            ..booking_payload(&run, "p1", "10:00 AM", false)
        };
        let outcome = ingest_result(&orch, &payload).unwrap();
        assert_eq!(outcome, IngestOutcome::Terminal(ApplyOutcome::Rejected));

        let snapshot = orch.snapshot().unwrap();
        let agent = snapshot.agents.iter().find(|a| a.id == "p1").unwrap();
        assert!(agent.slot_time.is_none());
    }

    #[test]
    fn completed_without_booking_tool_is_rejected_as_no_slot() {
        let orch = orchestrator(&["p1"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let payload = InboundResult {
            tool_invocations: vec![],
            ..booking_payload(&run, "p1", "10:00 AM", true)
        };
        let outcome = ingest_result(&orch, &payload).unwrap();
        assert_eq!(outcome, IngestOutcome::Terminal(ApplyOutcome::Rejected));

        // The payload's prose-level slot is not recorded on the agent
        let snapshot = orch.snapshot().unwrap();
        let agent = snapshot.agents.iter().find(|a| a.id == "p1").unwrap();
        assert_eq!(agent.status, AgentStatus::Rejected);
        assert!(agent.slot_time.is_none());
    }

    #[test]
    fn unknown_tool_is_a_contract_violation() {
        let orch = orchestrator(&["p1"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let mut payload = booking_payload(&run, "p1", "10:00 AM", true);
        payload.tool_invocations[0].tool_name = "cancel_appointment".to_string();
        assert_matches!(
            ingest_result(&orch, &payload),
            Err(IngestError::UnrecognizedTool { name }) if name == "cancel_appointment"
        );
        // No mutation on rejection
        let snapshot = orch.snapshot().unwrap();
        assert!(!snapshot.completed);
    }

    #[test]
    fn empty_tool_params_are_rejected() {
        let orch = orchestrator(&["p1"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let mut payload = booking_payload(&run, "p1", "10:00 AM", true);
        payload.tool_invocations[0].parameters.reasoning = "  ".to_string();
        assert_matches!(
            ingest_result(&orch, &payload),
            Err(IngestError::MissingToolParam { param: "reasoning" })
        );

        let mut payload = booking_payload(&run, "p1", "10:00 AM", true);
        payload.tool_invocations[0].parameters.provider_name = String::new();
        assert_matches!(
            ingest_result(&orch, &payload),
            Err(IngestError::MissingToolParam { param: "provider_name" })
        );
    }

    #[test]
    fn malformed_slot_is_rejected_before_mutation() {
        let orch = orchestrator(&["p1"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let mut payload = booking_payload(&run, "p1", "sometime soon", true);
        payload.tool_invocations[0].parameters.slot_time = "sometime soon".to_string();
        assert_matches!(
            ingest_result(&orch, &payload),
            Err(IngestError::MalformedSlot { .. })
        );
        let snapshot = orch.snapshot().unwrap();
        assert_eq!(
            snapshot.agents[0].status,
            callswarm_core::AgentStatus::Searching
        );
    }

    #[test]
    fn stale_run_id_is_rejected() {
        let orch = orchestrator(&["p1"]);
        let old_run = orch.start("dentist", None).unwrap().run_id;
        let _ = orch.start("dentist", None).unwrap();

        let payload = booking_payload(&old_run, "p1", "10:00 AM", true);
        assert_matches!(
            ingest_result(&orch, &payload),
            Err(IngestError::Runtime(RuntimeError::UnknownRun { .. }))
        );
    }

    #[test]
    fn unknown_agent_is_rejected() {
        let orch = orchestrator(&["p1"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let payload = booking_payload(&run, "ghost", "10:00 AM", true);
        assert_matches!(
            ingest_result(&orch, &payload),
            Err(IngestError::Runtime(RuntimeError::UnknownAgent { .. }))
        );
    }

    #[test]
    fn duplicate_terminal_result_is_conflict() {
        let orch = orchestrator(&["p1", "p2"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let payload = booking_payload(&run, "p1", "10:00 AM", true);
        let _ = ingest_result(&orch, &payload).unwrap();
        assert_matches!(
            ingest_result(&orch, &payload),
            Err(IngestError::Runtime(RuntimeError::AgentAlreadyTerminal { .. }))
        );
    }

    #[test]
    fn in_progress_advances_agent_to_negotiating() {
        let orch = orchestrator(&["p1"]);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _subs = orch
            .channel()
            .subscribe_all(Arc::new(move |e: &SwarmEvent| sink.lock().push(e.clone())));
        let run = orch.start("dentist", None).unwrap().run_id;

        let payload = InboundResult {
            call_status: CallStatus::InProgress,
            tool_invocations: vec![],
            ..booking_payload(&run, "p1", "Today at 2:15 PM", false)
        };
        let outcome = ingest_result(&orch, &payload).unwrap();
        assert_eq!(outcome, IngestOutcome::Progress { applied: true });

        let snapshot = orch.snapshot().unwrap();
        assert!(!snapshot.completed);
        assert_eq!(
            snapshot.agents[0].status,
            callswarm_core::AgentStatus::Negotiating
        );
        assert_eq!(snapshot.agents[0].slot_time.as_deref(), Some("2:15 PM"));
    }

    #[test]
    fn in_progress_after_terminal_is_dropped_not_errored() {
        let orch = orchestrator(&["p1", "p2"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let _ = ingest_result(&orch, &booking_payload(&run, "p1", "10:00 AM", true)).unwrap();
        let payload = InboundResult {
            call_status: CallStatus::InProgress,
            ..booking_payload(&run, "p1", "11:00 AM", false)
        };
        let outcome = ingest_result(&orch, &payload).unwrap();
        assert_eq!(outcome, IngestOutcome::Progress { applied: false });
    }

    #[test]
    fn late_completed_result_routes_to_cancelled() {
        let orch = orchestrator(&["p1", "p2"]);
        let run = orch.start("dentist", None).unwrap().run_id;

        let _ = ingest_result(&orch, &booking_payload(&run, "p1", "10:00 AM", true)).unwrap();
        let _ = ingest_result(&orch, &booking_payload(&run, "p2", "8:00 AM", true)).unwrap();
        assert!(orch.snapshot().unwrap().completed);

        // p2 was rejected pre-arbitration; its late duplicate is cancelled
        let outcome = ingest_result(&orch, &booking_payload(&run, "p2", "9:45 AM", true)).unwrap();
        assert_eq!(outcome, IngestOutcome::Terminal(ApplyOutcome::Cancelled));
    }

    #[test]
    fn payload_wire_format_is_camel_case() {
        let json = r#"{
            "runId": "run_1",
            "agentId": "p1",
            "callStatus": "no_answer"
        }"#;
        let payload: InboundResult = serde_json::from_str(json).unwrap();
        assert_eq!(payload.call_status, CallStatus::NoAnswer);
        assert!(payload.tool_invocations.is_empty());
        assert!(!payload.booking_confirmed);

        let bad = r#"{"runId": "r", "agentId": "a", "callStatus": "ringing"}"#;
        assert!(serde_json::from_str::<InboundResult>(bad).is_err());
    }
}
