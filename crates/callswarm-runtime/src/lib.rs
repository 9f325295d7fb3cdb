//! # callswarm-runtime
//!
//! Run orchestration for the callswarm appointment-booking swarm.
//!
//! ## Crate Position
//!
//! Sits between `callswarm-core` (data model, time policy, events) and
//! `callswarm-server` (HTTP/WS surface). Owns:
//!
//! - **Orchestrator** — per-run agent state, the winner latch, and the
//!   single-fire earliest-slot arbitration
//! - **Result sources** — the simulated negotiation driver and the
//!   live-channel deadline driver
//! - **Ingestion** — validation of external webhook results into the
//!   same terminal path the simulator uses
//! - **Event channel** — synchronous in-process fan-out of lifecycle
//!   events to subscribers (WS broadcast, logging)
//! - **Provider directory** — lookup seam plus registry construction

#![deny(unsafe_code)]

pub mod channel;
pub mod directory;
pub mod errors;
pub mod ingest;
pub mod swarm;

pub use channel::{EventChannel, Subscription};
pub use directory::{
    build_agents, normalize_service_type, JsonDirectory, ProviderDirectory, StaticDirectory,
};
pub use errors::{IngestError, RegistryError, RuntimeError};
pub use ingest::{
    ingest_result, normalize_slot_time, CallStatus, InboundResult, IngestOutcome, ToolInvocation,
    ToolParameters, BOOKING_TOOL,
};
pub use swarm::{
    ApplyOutcome, ResultSource, RunSnapshot, SimulationPlan, StandardSource, StartedRun,
    SwarmConfig, SwarmOrchestrator, TerminalResult, WinnerInfo, MOCK_SLOTS,
};
