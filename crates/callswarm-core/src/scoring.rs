//! Scored ranking of booked agents.
//!
//! Arbitration picks the earliest acceptable slot; the ranked shortlist
//! is a supplementary ordering over the same booked set that also weighs
//! provider rating and distance. It is surfaced on `run:completed` and
//! the results snapshot and never influences which agent wins.

use serde::{Deserialize, Serialize};

use crate::time::parse_time;
use crate::types::{AgentStatus, ProviderAgent};

/// Relative weights of the shortlist scoring factors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreWeights {
    /// Weight of earliest availability.
    pub time: f64,
    /// Weight of the provider rating.
    pub rating: f64,
    /// Weight of provider distance.
    pub distance: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            time: 0.5,
            rating: 0.3,
            distance: 0.2,
        }
    }
}

impl ScoreWeights {
    /// Whether every weight is usable (finite and non-negative).
    pub fn is_valid(&self) -> bool {
        [self.time, self.rating, self.distance]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// One entry of the ranked shortlist, best first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortlistEntry {
    /// 1-based position, best first.
    pub rank: usize,
    /// Agent this entry describes.
    pub agent_id: String,
    /// Provider display name.
    pub provider_name: String,
    /// Booked slot.
    pub slot_time: String,
    /// Composite score, 0 to 1, rounded to four decimals.
    pub score: f64,
    /// Directory rating, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    /// Distance in miles, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_miles: Option<f64>,
}

// Scoring window: slots map linearly from 8:00 AM (best) to 5:00 PM
// (zero); slots outside the window contribute no time score.
const DAY_START_MINUTES: f64 = 480.0;
const DAY_END_MINUTES: f64 = 1020.0;

const DEFAULT_RATING: f64 = 4.5;
const DEFAULT_DISTANCE_MILES: f64 = 5.0;

/// Composite 0-1 score for one agent: earlier slot, higher rating, and
/// shorter distance all raise it, per the given weights.
pub fn score_agent(agent: &ProviderAgent, weights: &ScoreWeights) -> f64 {
    let mut score = 0.0;

    if let Some(minutes) = agent
        .slot_time
        .as_deref()
        .and_then(|slot| parse_time(slot).ok())
    {
        let minutes = f64::from(minutes);
        if (DAY_START_MINUTES..=DAY_END_MINUTES).contains(&minutes) {
            let span = DAY_END_MINUTES - DAY_START_MINUTES;
            score += weights.time * (1.0 - (minutes - DAY_START_MINUTES) / span);
        }
    }

    let rating = agent.rating.unwrap_or(DEFAULT_RATING);
    score += weights.rating * (rating / 5.0);

    let distance = agent.distance_miles.unwrap_or(DEFAULT_DISTANCE_MILES);
    score += weights.distance * (1.0 - distance / 10.0).max(0.0);

    score.min(1.0)
}

/// Rank the booked agents by composite score, best first.
///
/// Only agents in `booked` state with a slot participate. Equal scores
/// keep registration order.
pub fn rank_booked_agents(agents: &[ProviderAgent], weights: &ScoreWeights) -> Vec<ShortlistEntry> {
    let mut scored: Vec<(&ProviderAgent, f64)> = agents
        .iter()
        .filter(|a| a.status == AgentStatus::Booked && a.slot_time.is_some())
        .map(|a| (a, score_agent(a, weights)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (agent, score))| ShortlistEntry {
            rank: i + 1,
            agent_id: agent.id.clone(),
            provider_name: agent.name.clone(),
            slot_time: agent.slot_time.clone().unwrap_or_default(),
            score: (score * 10_000.0).round() / 10_000.0,
            rating: agent.rating,
            distance_miles: agent.distance_miles,
        })
        .collect()
}
