//! # callswarm-core
//!
//! Foundation types for the callswarm appointment orchestrator.
//!
//! - **Types**: Agent status lifecycle, per-agent run records, provider
//!   directory records
//! - **Events**: [`SwarmEvent`] lifecycle events broadcast to consumers
//! - **Time**: 12-hour clock parsing and the minimum-slot-time policy check
//! - **Scoring**: weighted ranked shortlist over booked agents
//!
//! ## Crate Position
//!
//! Leaf crate. Depends only on serde/chrono/thiserror.
//! Depended on by: callswarm-settings, callswarm-runtime, callswarm-server.

#![deny(unsafe_code)]

pub mod events;
pub mod scoring;
pub mod time;
pub mod types;

pub use events::{BaseEvent, SwarmEvent};
pub use scoring::{rank_booked_agents, score_agent, ScoreWeights, ShortlistEntry};
pub use time::{TimeError, parse_time, slot_is_acceptable};
pub use types::{AgentStatus, ProviderAgent, ProviderRecord};
