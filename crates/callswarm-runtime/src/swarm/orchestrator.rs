//! Run state and booking arbitration.
//!
//! One orchestrator owns at most one active run. Two producers converge
//! on the same terminal path: the internal simulated driver and the
//! external result-ingestion boundary. Both go through
//! [`SwarmOrchestrator::apply_terminal`], the single mutex-guarded
//! critical section where status routing, the winner latch, and the
//! completion count are observed atomically.
//!
//! Events are published while the state lock is held, so the observable
//! event stream is always consistent with state order. Subscribers must
//! not call back into run control.

use std::sync::Arc;
use std::time::Duration;

use callswarm_core::{
    parse_time, rank_booked_agents, slot_is_acceptable, AgentStatus, BaseEvent, ProviderAgent,
    ScoreWeights, ShortlistEntry, SwarmEvent,
};
use callswarm_settings::SwarmSettings;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::EventChannel;
use crate::directory::{build_agents, normalize_service_type, ProviderDirectory};
use crate::errors::RuntimeError;
use crate::swarm::source::ResultSource;

/// Orchestrator policy knobs, resolved once from settings at startup.
#[derive(Clone, Debug)]
pub struct SwarmConfig {
    /// Hard ceiling on agents per run.
    pub max_agents: usize,
    /// Earliest acceptable slot ("9:30 AM" by default).
    pub min_slot_time: String,
    /// When true every agent runs against the internal simulator.
    pub demo_mode: bool,
    /// How long a live agent may wait for an external result.
    pub live_result_timeout: Duration,
    /// Simulated driver total-delay floor.
    pub sim_min_delay: Duration,
    /// Simulated driver total-delay ceiling.
    pub sim_max_delay: Duration,
    /// Shortlist factor weights.
    pub score_weights: ScoreWeights,
}

impl SwarmConfig {
    /// Resolve from validated settings.
    pub fn from_settings(settings: &SwarmSettings) -> Self {
        Self {
            max_agents: settings.max_agents,
            min_slot_time: settings.min_slot_time.clone(),
            demo_mode: settings.demo_mode,
            live_result_timeout: Duration::from_secs(settings.live_result_timeout_secs),
            sim_min_delay: Duration::from_millis(settings.sim_min_delay_ms),
            sim_max_delay: Duration::from_millis(settings.sim_max_delay_ms),
            score_weights: settings.score_weights,
        }
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self::from_settings(&SwarmSettings::default())
    }
}

/// Externally supplied terminal result for one agent.
#[derive(Clone, Debug, Default)]
pub struct TerminalResult {
    /// Slot the provider offered, already normalized.
    pub offered_slot: Option<String>,
    /// Whether the provider explicitly confirmed the booking.
    pub confirmed: bool,
    /// Override for the rejection message, when the producer knows the
    /// concrete cause (call failed, deadline expired, ...).
    pub reason: Option<String>,
}

/// Status the terminal path routed an agent to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Slot acceptable and confirmed, no winner yet.
    Booked,
    /// Slot missing, unacceptable, or unconfirmed.
    Rejected,
    /// A winner was already latched when the result arrived.
    Cancelled,
}

impl ApplyOutcome {
    fn status(self) -> AgentStatus {
        match self {
            Self::Booked => AgentStatus::Booked,
            Self::Rejected => AgentStatus::Rejected,
            Self::Cancelled => AgentStatus::Cancelled,
        }
    }
}

/// Result of starting a run.
#[derive(Clone, Debug)]
pub struct StartedRun {
    /// Identifier of the new run.
    pub run_id: String,
    /// Initial agent list, all `searching`.
    pub agents: Vec<ProviderAgent>,
}

/// Winning agent summary.
#[derive(Clone, Debug, PartialEq)]
pub struct WinnerInfo {
    /// Winning agent id.
    pub agent_id: String,
    /// Provider display name.
    pub provider_name: String,
    /// Confirmed slot.
    pub slot_time: String,
}

/// Read-only copy of the current run for the results endpoint.
#[derive(Clone, Debug)]
pub struct RunSnapshot {
    /// Run identifier.
    pub run_id: String,
    /// Whether arbitration has fired.
    pub completed: bool,
    /// Current state of every agent.
    pub agents: Vec<ProviderAgent>,
    /// Winner, once arbitration selects one.
    pub winner: Option<WinnerInfo>,
    /// Scored ranking of the booked agents, filled at arbitration.
    pub shortlist: Vec<ShortlistEntry>,
}

struct RunState {
    run_id: String,
    agents: Vec<ProviderAgent>,
    /// Winner latch. Checked and set only under the state lock; once
    /// true, every later terminal result routes to `cancelled` and
    /// arbitration can never fire again.
    winner_selected: bool,
    completed_count: usize,
    winner: Option<usize>,
    shortlist: Vec<ShortlistEntry>,
    cancel: CancellationToken,
}

/// Dispatches one run of provider-negotiation agents and arbitrates
/// exactly one winning booking.
pub struct SwarmOrchestrator {
    config: SwarmConfig,
    directory: Arc<dyn ProviderDirectory>,
    source: Arc<dyn ResultSource>,
    channel: EventChannel,
    state: Mutex<Option<RunState>>,
}

impl SwarmOrchestrator {
    /// Build an orchestrator over a directory and a result source.
    pub fn new(
        config: SwarmConfig,
        directory: Arc<dyn ProviderDirectory>,
        source: Arc<dyn ResultSource>,
    ) -> Self {
        Self {
            config,
            directory,
            source,
            channel: EventChannel::new(),
            state: Mutex::new(None),
        }
    }

    /// Orchestrator policy in effect.
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Event channel carrying this orchestrator's lifecycle events.
    pub fn channel(&self) -> &EventChannel {
        &self.channel
    }

    /// Start a new run, tearing down any prior one.
    ///
    /// The previous run's cancellation token fires and its run id is
    /// replaced, so results addressed to it are rejected as stale.
    /// Publishes `run:start` and dispatches one driver per agent.
    pub fn start(
        self: &Arc<Self>,
        service_type: &str,
        max_agents: Option<usize>,
    ) -> Result<StartedRun, RuntimeError> {
        let normalized = normalize_service_type(service_type);
        let cap = max_agents
            .unwrap_or(self.config.max_agents)
            .clamp(1, self.config.max_agents);

        let records = self.directory.providers_for(&normalized, cap);
        let agents = build_agents(&records, cap);
        if agents.is_empty() {
            return Err(RuntimeError::EmptyRegistry {
                service_type: normalized,
            });
        }

        let run_id = format!("run_{}", Uuid::now_v7().simple());
        let cancel = CancellationToken::new();
        {
            let mut state = self.state.lock();
            if let Some(prior) = state.take() {
                debug!(run_id = %prior.run_id, "tearing down prior run");
                prior.cancel.cancel();
            }
            *state = Some(RunState {
                run_id: run_id.clone(),
                agents: agents.clone(),
                winner_selected: false,
                completed_count: 0,
                winner: None,
                shortlist: Vec::new(),
                cancel: cancel.clone(),
            });
            let _ = self.channel.publish(&SwarmEvent::RunStart {
                base: BaseEvent::now(&run_id),
                agents: agents.clone(),
            });
        }

        counter!("swarm_runs_started_total").increment(1);
        counter!("swarm_agents_dispatched_total").increment(agents.len() as u64);
        gauge!("swarm_runs_active").set(1.0);
        info!(
            %run_id,
            service_type = %normalized,
            agents = agents.len(),
            "run started"
        );

        for agent in &agents {
            self.source
                .dispatch(self, &run_id, agent.clone(), cancel.clone());
        }

        Ok(StartedRun { run_id, agents })
    }

    /// Apply a non-terminal status transition for one agent.
    ///
    /// Returns `Ok(true)` when the update was applied and published,
    /// `Ok(false)` when it was dropped (winner already latched, or the
    /// agent is already terminal).
    pub fn apply_progress(
        &self,
        run_id: &str,
        agent_id: &str,
        status: AgentStatus,
        slot_time: Option<String>,
        message: String,
    ) -> Result<bool, RuntimeError> {
        let mut guard = self.state.lock();
        let state = current_run_mut(&mut guard, run_id)?;
        let latched = state.winner_selected;
        let agent = find_agent_mut(state, agent_id)?;
        if latched || agent.status.is_terminal() {
            return Ok(false);
        }
        agent.status = status;
        if slot_time.is_some() {
            agent.slot_time = slot_time.clone();
        }
        let _ = self.channel.publish(&SwarmEvent::RunUpdate {
            base: BaseEvent::now(run_id),
            agent_id: agent_id.to_string(),
            status,
            slot_time,
            message,
        });
        Ok(true)
    }

    /// Apply a terminal result for one agent.
    ///
    /// The single critical section both producers converge on. Routing:
    /// winner already latched goes to `cancelled`; an acceptable and
    /// confirmed slot goes to `booked`; everything else to `rejected`.
    /// When this result makes the last agent terminal and no winner is
    /// latched, arbitration fires inside the same critical section.
    pub fn apply_terminal(
        &self,
        run_id: &str,
        agent_id: &str,
        result: TerminalResult,
    ) -> Result<ApplyOutcome, RuntimeError> {
        let mut guard = self.state.lock();
        let state = current_run_mut(&mut guard, run_id)?;

        let min_slot = self.config.min_slot_time.clone();
        if state.winner_selected {
            // Late result after arbitration. The winner is immutable;
            // any other agent routes to cancelled without recounting.
            let winner_id = state.winner.map(|idx| state.agents[idx].id.clone());
            let agent = find_agent_mut(state, agent_id)?;
            if winner_id.as_deref() == Some(agent_id) {
                return Err(RuntimeError::AgentAlreadyTerminal {
                    agent_id: agent_id.to_string(),
                });
            }
            if agent.status != AgentStatus::Cancelled {
                agent.status = AgentStatus::Cancelled;
                let name = agent.name.clone();
                let slot_time = agent.slot_time.clone();
                let _ = self.channel.publish(&SwarmEvent::RunUpdate {
                    base: BaseEvent::now(run_id),
                    agent_id: agent_id.to_string(),
                    status: AgentStatus::Cancelled,
                    slot_time,
                    message: format!("{name}: Cancelled (winner already selected)"),
                });
            }
            return Ok(ApplyOutcome::Cancelled);
        }

        let agent = find_agent_mut(state, agent_id)?;
        if agent.status.is_terminal() {
            return Err(RuntimeError::AgentAlreadyTerminal {
                agent_id: agent_id.to_string(),
            });
        }

        let acceptable = result
            .offered_slot
            .as_deref()
            .is_some_and(|slot| slot_is_acceptable(slot, &min_slot));
        let outcome = if acceptable && result.confirmed {
            ApplyOutcome::Booked
        } else {
            ApplyOutcome::Rejected
        };

        agent.status = outcome.status();
        if result.offered_slot.is_some() {
            agent.slot_time = result.offered_slot.clone();
        }
        let name = agent.name.clone();
        let slot_time = agent.slot_time.clone();
        state.completed_count += 1;

        let message = match outcome {
            ApplyOutcome::Cancelled => format!("{name}: Cancelled (winner already selected)"),
            ApplyOutcome::Booked => {
                let slot = slot_time.as_deref().unwrap_or_default();
                format!("{name}: Slot {slot} accepted")
            }
            ApplyOutcome::Rejected => match result.reason {
                Some(reason) => format!("{name}: {reason}"),
                None => match result.offered_slot.as_deref() {
                    Some(slot) => format!("{name}: Slot {slot} rejected (before {min_slot})"),
                    None => format!("{name}: No slot offered"),
                },
            },
        };
        let _ = self.channel.publish(&SwarmEvent::RunUpdate {
            base: BaseEvent::now(run_id),
            agent_id: agent_id.to_string(),
            status: outcome.status(),
            slot_time,
            message,
        });

        if outcome == ApplyOutcome::Booked {
            counter!("swarm_bookings_total").increment(1);
        }
        if state.completed_count == state.agents.len() && !state.winner_selected {
            self.arbitrate_locked(state);
        }
        Ok(outcome)
    }

    /// Select the winner. Runs under the state lock; sets the latch
    /// before anything else so no later result can book.
    fn arbitrate_locked(&self, state: &mut RunState) {
        state.winner_selected = true;

        // Scored over every booked agent, before losers are demoted
        state.shortlist = rank_booked_agents(&state.agents, &self.config.score_weights);

        let mut winner: Option<(usize, u32)> = None;
        for (idx, agent) in state.agents.iter().enumerate() {
            if agent.status != AgentStatus::Booked {
                continue;
            }
            let Some(slot) = agent.slot_time.as_deref() else {
                continue;
            };
            let Ok(minutes) = parse_time(slot) else {
                continue;
            };
            // Strict less keeps the first-registered agent on ties.
            if winner.is_none_or(|(_, best)| minutes < best) {
                winner = Some((idx, minutes));
            }
        }

        let run_id = state.run_id.clone();
        if let Some((winner_idx, _)) = winner {
            let winner_id = state.agents[winner_idx].id.clone();
            for agent in &mut state.agents {
                if agent.id != winner_id && agent.status == AgentStatus::Booked {
                    agent.status = AgentStatus::Cancelled;
                    let _ = self.channel.publish(&SwarmEvent::RunUpdate {
                        base: BaseEvent::now(&run_id),
                        agent_id: agent.id.clone(),
                        status: AgentStatus::Cancelled,
                        slot_time: agent.slot_time.clone(),
                        message: format!("{}: Cancelled (not earliest slot)", agent.name),
                    });
                }
            }
            state.winner = Some(winner_idx);
            let winner_agent = &state.agents[winner_idx];
            let _ = self.channel.publish(&SwarmEvent::AgentBooked {
                base: BaseEvent::now(&run_id),
                agent_id: winner_agent.id.clone(),
                provider_name: winner_agent.name.clone(),
                slot_time: winner_agent.slot_time.clone().unwrap_or_default(),
            });
            info!(
                %run_id,
                winner = %winner_agent.id,
                slot = winner_agent.slot_time.as_deref().unwrap_or_default(),
                "winner selected"
            );
        } else {
            warn!(%run_id, "run completed with no bookable slot");
        }

        let winner_agent = state.winner.map(|idx| state.agents[idx].clone());
        let _ = self.channel.publish(&SwarmEvent::RunCompleted {
            base: BaseEvent::now(&run_id),
            winner_id: winner_agent.as_ref().map(|a| a.id.clone()),
            winner_name: winner_agent.as_ref().map(|a| a.name.clone()),
            winner_slot: winner_agent.as_ref().and_then(|a| a.slot_time.clone()),
            ranked_shortlist: state.shortlist.clone(),
            agents: state.agents.clone(),
        });
        counter!("swarm_runs_completed_total").increment(1);
        gauge!("swarm_runs_active").set(0.0);
        state.cancel.cancel();
    }

    /// Read-only copy of the current run.
    pub fn snapshot(&self) -> Option<RunSnapshot> {
        let guard = self.state.lock();
        guard.as_ref().map(|state| RunSnapshot {
            run_id: state.run_id.clone(),
            completed: state.winner_selected,
            agents: state.agents.clone(),
            winner: state.winner.map(|idx| {
                let agent = &state.agents[idx];
                WinnerInfo {
                    agent_id: agent.id.clone(),
                    provider_name: agent.name.clone(),
                    slot_time: agent.slot_time.clone().unwrap_or_default(),
                }
            }),
            shortlist: state.shortlist.clone(),
        })
    }

    /// Cancel pending work, drop run state, and clear the event channel.
    pub fn reset(&self) {
        let mut guard = self.state.lock();
        if let Some(state) = guard.take() {
            state.cancel.cancel();
            info!(run_id = %state.run_id, "run reset");
        }
        drop(guard);
        self.channel.clear(None);
        gauge!("swarm_runs_active").set(0.0);
    }
}

fn current_run_mut<'a>(
    guard: &'a mut Option<RunState>,
    run_id: &str,
) -> Result<&'a mut RunState, RuntimeError> {
    let state = guard.as_mut().ok_or(RuntimeError::NoActiveRun)?;
    if state.run_id != run_id {
        return Err(RuntimeError::UnknownRun {
            run_id: run_id.to_string(),
        });
    }
    Ok(state)
}

fn find_agent_mut<'a>(
    state: &'a mut RunState,
    agent_id: &str,
) -> Result<&'a mut ProviderAgent, RuntimeError> {
    state
        .agents
        .iter_mut()
        .find(|a| a.id == agent_id)
        .ok_or_else(|| RuntimeError::UnknownAgent {
            agent_id: agent_id.to_string(),
        })
}
