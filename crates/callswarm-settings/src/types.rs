//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production default values. `#[serde(default)]` allows
//! partial JSON — missing fields get their default value during
//! deserialization.

use std::path::PathBuf;

use callswarm_core::ScoreWeights;
use serde::{Deserialize, Serialize};

/// Hard ceiling on concurrent calling agents per run.
pub const MAX_AGENT_CEILING: usize = 15;

/// Root settings type for the callswarm orchestrator.
///
/// Loaded from `~/.callswarm/settings.json` with defaults applied for
/// missing fields. `CALLSWARM_*` environment variables override specific
/// values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CallswarmSettings {
    /// Settings schema version.
    pub version: String,
    /// Server network settings.
    pub server: ServerSettings,
    /// Swarm dispatch and arbitration policy.
    pub swarm: SwarmSettings,
    /// Provider directory sources.
    pub directory: DirectorySettings,
}

impl Default for CallswarmSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            server: ServerSettings::default(),
            swarm: SwarmSettings::default(),
            directory: DirectorySettings::default(),
        }
    }
}

impl CallswarmSettings {
    /// Correct invalid values in place rather than rejecting them, so a
    /// hand-edited settings file degrades to working behavior with a
    /// warning instead of refusing to start.
    pub fn validate(&mut self) {
        let swarm = &mut self.swarm;
        if swarm.max_agents == 0 || swarm.max_agents > MAX_AGENT_CEILING {
            let clamped = swarm.max_agents.clamp(1, MAX_AGENT_CEILING);
            tracing::warn!(
                "swarm.maxAgents out of range ({}), clamped to {clamped}",
                swarm.max_agents
            );
            swarm.max_agents = clamped;
        }
        if callswarm_core::parse_time(&swarm.min_slot_time).is_err() {
            let fallback = SwarmSettings::default().min_slot_time;
            tracing::warn!(
                "swarm.minSlotTime unparseable ({:?}), falling back to {fallback:?}",
                swarm.min_slot_time
            );
            swarm.min_slot_time = fallback;
        }
        if swarm.sim_max_delay_ms < swarm.sim_min_delay_ms {
            tracing::warn!(
                "swarm simMaxDelayMs ({}) < simMinDelayMs ({}), correcting",
                swarm.sim_max_delay_ms,
                swarm.sim_min_delay_ms
            );
            swarm.sim_max_delay_ms = swarm.sim_min_delay_ms;
        }
        if swarm.live_result_timeout_secs == 0 {
            let fallback = SwarmSettings::default().live_result_timeout_secs;
            tracing::warn!("swarm.liveResultTimeoutSecs must be nonzero, using {fallback}");
            swarm.live_result_timeout_secs = fallback;
        }
        if !swarm.score_weights.is_valid() {
            tracing::warn!(
                "swarm.scoreWeights contains a negative or non-finite weight, using defaults"
            );
            swarm.score_weights = ScoreWeights::default();
        }
    }
}

/// Server network settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// HTTP/WebSocket port.
    pub port: u16,
    /// Shared secret required in the `x-callswarm-signature` header of
    /// inbound webhook requests. Unset disables the check (local dev).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            webhook_secret: None,
        }
    }
}

/// Swarm dispatch and arbitration policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwarmSettings {
    /// Maximum agents dispatched per run (cap 15).
    pub max_agents: usize,
    /// Earliest acceptable slot ("9:30 AM"). Offers before this are
    /// rejected.
    pub min_slot_time: String,
    /// Run every agent through the internal simulator, including agents
    /// marked live-channel-ready. Demo/default mode.
    pub demo_mode: bool,
    /// Deadline for an external result on a live-channel agent. On
    /// expiry the agent is forced to `rejected` so arbitration cannot
    /// stall.
    pub live_result_timeout_secs: u64,
    /// Lower bound of the simulated negotiation delay.
    pub sim_min_delay_ms: u64,
    /// Upper bound of the simulated negotiation delay.
    pub sim_max_delay_ms: u64,
    /// Factor weights of the ranked shortlist published on completion.
    pub score_weights: ScoreWeights,
}

impl Default for SwarmSettings {
    fn default() -> Self {
        Self {
            max_agents: MAX_AGENT_CEILING,
            min_slot_time: "9:30 AM".to_string(),
            demo_mode: true,
            live_result_timeout_secs: 120,
            sim_min_delay_ms: 300,
            sim_max_delay_ms: 1500,
            score_weights: ScoreWeights::default(),
        }
    }
}

/// Provider directory sources.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectorySettings {
    /// Path to `provider_directory.json`. Unset falls back to the
    /// compiled-in provider set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Path to a per-provider receptionist simulation file mapping
    /// provider ids to offered slots (demo mode).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation_path: Option<PathBuf>,
}
