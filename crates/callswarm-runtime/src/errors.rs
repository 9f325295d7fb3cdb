//! Runtime error taxonomy.
//!
//! [`RuntimeError`] covers run/agent correlation failures inside the
//! orchestrator. [`IngestError`] covers everything the result-ingestion
//! boundary rejects before any state mutation. [`RegistryError`] covers
//! provider directory loading.

use std::path::PathBuf;

use callswarm_core::TimeError;
use thiserror::Error;

/// Errors from orchestrator run-state operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// No run is currently in progress.
    #[error("no active run")]
    NoActiveRun,

    /// The referenced run is not the current run (stale or never existed).
    #[error("unknown run {run_id}")]
    UnknownRun {
        /// Offending run id.
        run_id: String,
    },

    /// The referenced agent is not part of the current run.
    #[error("unknown agent {agent_id}")]
    UnknownAgent {
        /// Offending agent id.
        agent_id: String,
    },

    /// A terminal result was already applied for this agent.
    #[error("agent {agent_id} already reached a terminal status")]
    AgentAlreadyTerminal {
        /// Offending agent id.
        agent_id: String,
    },

    /// The directory produced no providers for the requested category.
    #[error("no providers found for service type {service_type:?}")]
    EmptyRegistry {
        /// Requested service category.
        service_type: String,
    },
}

/// Errors rejecting an inbound external result at the ingestion boundary.
///
/// Every variant is produced before any agent state mutates.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Correlation or lifecycle failure from the orchestrator.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A tool invocation named something other than the booking tool.
    #[error("unrecognized tool {name:?}")]
    UnrecognizedTool {
        /// Tool name from the payload.
        name: String,
    },

    /// The booking tool invocation is missing a required parameter.
    #[error("tool invocation missing required parameter {param}")]
    MissingToolParam {
        /// Name of the missing/empty parameter.
        param: &'static str,
    },

    /// The offered slot does not parse even after normalization.
    #[error("malformed slot time {slot:?}: {source}")]
    MalformedSlot {
        /// Normalized slot string that failed to parse.
        slot: String,
        /// Underlying parse failure.
        #[source]
        source: TimeError,
    },
}

/// Errors loading provider directory or simulation files.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// File is not valid JSON of the expected shape.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}
