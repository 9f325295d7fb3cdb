//! Per-agent result drivers.
//!
//! A [`ResultSource`] turns one registered agent into a future terminal
//! result. The standard source runs two drivers: an internal simulator
//! that walks an agent through `calling` and `negotiating` on staggered
//! timers, and a live driver that publishes `calling` and then waits for
//! the ingestion boundary under a deadline. Both converge on
//! [`SwarmOrchestrator::apply_terminal`].

use std::sync::Arc;

use callswarm_core::AgentStatus;
use callswarm_core::ProviderAgent;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::swarm::orchestrator::{SwarmOrchestrator, TerminalResult};
use crate::swarm::simulation::SimulationPlan;

/// Produces terminal results for dispatched agents.
pub trait ResultSource: Send + Sync {
    /// Begin driving one agent toward a terminal result.
    ///
    /// Called once per agent at run start, synchronously, before
    /// `start()` returns. Implementations spawn their own tasks; all
    /// timers must select against `cancel`.
    fn dispatch(
        &self,
        orchestrator: &Arc<SwarmOrchestrator>,
        run_id: &str,
        agent: ProviderAgent,
        cancel: CancellationToken,
    );
}

/// Default source: simulator for demo-mode and non-live agents, deadline
/// wait for live ones.
pub struct StandardSource {
    plan: SimulationPlan,
}

impl StandardSource {
    /// Build over a simulation plan (empty plan draws from the shared
    /// slot pool).
    pub fn new(plan: SimulationPlan) -> Self {
        Self { plan }
    }
}

impl ResultSource for StandardSource {
    fn dispatch(
        &self,
        orchestrator: &Arc<SwarmOrchestrator>,
        run_id: &str,
        agent: ProviderAgent,
        cancel: CancellationToken,
    ) {
        let config = orchestrator.config();
        if agent.live_channel_ready && !config.demo_mode {
            dispatch_live(orchestrator, run_id, agent, cancel);
        } else {
            // Draw delay and slot before entering async; ThreadRng does
            // not cross awaits.
            let mut rng = rand::rng();
            let min = config.sim_min_delay.as_millis() as u64;
            let max = config.sim_max_delay.as_millis() as u64;
            let total_ms = rng.random_range(min..=max.max(min));
            let slot = self.plan.pick_slot(&agent.id, &mut rng);
            dispatch_simulated(orchestrator, run_id, agent, cancel, total_ms, slot);
        }
    }
}

/// Simulated receptionist: dial, negotiate, then settle the drawn slot.
fn dispatch_simulated(
    orchestrator: &Arc<SwarmOrchestrator>,
    run_id: &str,
    agent: ProviderAgent,
    cancel: CancellationToken,
    total_ms: u64,
    slot: String,
) {
    let orchestrator = Arc::clone(orchestrator);
    let run_id = run_id.to_string();
    // Phase split mirrors the negotiation shape: short ramp to dialing,
    // then two equal stretches for the conversation.
    let dial = tokio::time::Duration::from_millis(total_ms * 3 / 10);
    let talk = tokio::time::Duration::from_millis(total_ms * 35 / 100);
    drop(tokio::spawn(async move {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(dial) => {}
        }
        let applied = orchestrator.apply_progress(
            &run_id,
            &agent.id,
            AgentStatus::Calling,
            None,
            format!("{}: Dialing provider", agent.name),
        );
        if !matches!(applied, Ok(true)) {
            return;
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(talk) => {}
        }
        let applied = orchestrator.apply_progress(
            &run_id,
            &agent.id,
            AgentStatus::Negotiating,
            Some(slot.clone()),
            format!("{}: Negotiating, offered {slot}", agent.name),
        );
        if !matches!(applied, Ok(true)) {
            return;
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(talk) => {}
        }
        let result = TerminalResult {
            offered_slot: Some(slot),
            confirmed: true,
            reason: None,
        };
        if let Err(error) = orchestrator.apply_terminal(&run_id, &agent.id, result) {
            debug!(%run_id, agent_id = %agent.id, %error, "simulated result dropped");
        }
    }));
}

/// Live agent: publish `calling`, then leave the terminal result to the
/// ingestion boundary. If nothing arrives before the configured deadline
/// the agent is forced to `rejected` so arbitration cannot stall.
fn dispatch_live(
    orchestrator: &Arc<SwarmOrchestrator>,
    run_id: &str,
    agent: ProviderAgent,
    cancel: CancellationToken,
) {
    let orchestrator = Arc::clone(orchestrator);
    let run_id = run_id.to_string();
    let deadline = orchestrator.config().live_result_timeout;
    drop(tokio::spawn(async move {
        let applied = orchestrator.apply_progress(
            &run_id,
            &agent.id,
            AgentStatus::Calling,
            None,
            format!("{}: Dialing provider", agent.name),
        );
        if !matches!(applied, Ok(true)) {
            return;
        }

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(deadline) => {}
        }
        let result = TerminalResult {
            offered_slot: None,
            confirmed: false,
            reason: Some("No result before deadline".to_string()),
        };
        match orchestrator.apply_terminal(&run_id, &agent.id, result) {
            // The boundary settled this agent first; nothing to do.
            Err(error) => debug!(%run_id, agent_id = %agent.id, %error, "live deadline no-op"),
            Ok(outcome) => {
                debug!(%run_id, agent_id = %agent.id, ?outcome, "live agent timed out");
            }
        }
    }));
}
