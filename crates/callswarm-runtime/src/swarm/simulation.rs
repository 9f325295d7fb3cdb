//! Demo-mode slot simulation.
//!
//! In demo mode the simulated driver offers each agent a slot drawn from
//! a per-provider plan file, falling back to the shared [`MOCK_SLOTS`]
//! pool when no plan entry exists for a provider.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use serde::Deserialize;
use tracing::warn;

use crate::errors::RegistryError;

/// Shared slot pool used when no per-provider plan entry applies.
///
/// Deliberately mixes slots on both sides of the default "9:30 AM"
/// minimum so demo runs produce a believable spread of booked and
/// rejected agents.
pub const MOCK_SLOTS: [&str; 13] = [
    "8:00 AM", "8:30 AM", "9:00 AM", "9:15 AM", "9:30 AM", "10:00 AM", "10:30 AM", "11:00 AM",
    "11:45 AM", "1:00 PM", "2:15 PM", "3:00 PM", "4:30 PM",
];

#[derive(Deserialize)]
struct PlanEntry {
    #[serde(default)]
    slots: Vec<String>,
}

#[derive(Deserialize)]
struct PlanFile {
    #[serde(rename = "byProviderId", default)]
    by_provider_id: HashMap<String, PlanEntry>,
}

/// Per-provider slot lists for simulated runs.
#[derive(Default)]
pub struct SimulationPlan {
    by_provider: HashMap<String, Vec<String>>,
}

impl SimulationPlan {
    /// Load a plan from a JSON file of shape
    /// `{"byProviderId": {"<id>": {"slots": [...]}}}`.
    ///
    /// A missing file is not an error; it yields an empty plan so every
    /// agent draws from [`MOCK_SLOTS`].
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: PlanFile = serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let by_provider = file
            .by_provider_id
            .into_iter()
            .filter(|(_, entry)| !entry.slots.is_empty())
            .map(|(id, entry)| (id, entry.slots))
            .collect();
        Ok(Self { by_provider })
    }

    /// Load from a path, downgrading failures to an empty plan.
    pub fn from_path_or_empty(path: &Path) -> Self {
        match Self::from_path(path) {
            Ok(plan) => plan,
            Err(error) => {
                warn!(%error, ?path, "simulation plan unusable, using shared slot pool");
                Self::default()
            }
        }
    }

    /// Build from explicit per-provider lists (tests).
    pub fn from_map(by_provider: HashMap<String, Vec<String>>) -> Self {
        Self {
            by_provider: by_provider
                .into_iter()
                .filter(|(_, slots)| !slots.is_empty())
                .collect(),
        }
    }

    /// Draw one slot for a provider: a random element of its plan entry,
    /// or of [`MOCK_SLOTS`] when no entry exists.
    pub fn pick_slot(&self, provider_id: &str, rng: &mut impl Rng) -> String {
        match self.by_provider.get(provider_id) {
            Some(slots) => slots[rng.random_range(0..slots.len())].clone(),
            None => MOCK_SLOTS[rng.random_range(0..MOCK_SLOTS.len())].to_string(),
        }
    }
}
