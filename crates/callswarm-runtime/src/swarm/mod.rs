//! Swarm run lifecycle: dispatch, arbitration, and result application.

pub mod orchestrator;
pub mod simulation;
pub mod source;

pub use orchestrator::{
    ApplyOutcome, RunSnapshot, StartedRun, SwarmConfig, SwarmOrchestrator, TerminalResult,
    WinnerInfo,
};
pub use simulation::{SimulationPlan, MOCK_SLOTS};
pub use source::{ResultSource, StandardSource};
