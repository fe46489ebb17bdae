// src/pool/strategy.rs

use crate::pool::usage::CredentialUsage;
use rand::Rng;
use std::fmt;

/// Policy for choosing the next credential from the selectable subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationStrategy {
    RoundRobin,
    LeastUsed,
    LeastRecent,
    Weighted,
    #[default]
    Hybrid,
}

impl RotationStrategy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "round_robin" => Some(Self::RoundRobin),
            "least_used" => Some(Self::LeastUsed),
            "least_recent" => Some(Self::LeastRecent),
            "weighted" => Some(Self::Weighted),
            "hybrid" => Some(Self::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::LeastUsed => "least_used",
            Self::LeastRecent => "least_recent",
            Self::Weighted => "weighted",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hybrid score: remaining quota weighted by how long the credential has
/// rested. A never-used credential gets the maximum time factor, so it
/// always outranks an equally-fresh credential that was used recently.
pub fn hybrid_score(usage: &CredentialUsage, daily_limit: u32, now: i64) -> f64 {
    let remaining = f64::from(usage.remaining(daily_limit));
    let time_factor = if usage.last_used == 0 {
        10.0
    } else {
        let minutes_ago = (now - usage.last_used) as f64 / 60.0;
        (minutes_ago * 0.1).min(10.0)
    };
    remaining * (1.0 + time_factor)
}

/// Picks an index into `selectable`. Ties resolve to the earliest entry,
/// which preserves encounter order.
///
/// `selectable` must be non-empty; `rotation_index` is only consulted by
/// round-robin.
pub fn select_index(
    strategy: RotationStrategy,
    selectable: &[(String, CredentialUsage)],
    daily_limit: u32,
    rotation_index: u64,
    now: i64,
) -> usize {
    match strategy {
        RotationStrategy::RoundRobin => (rotation_index % selectable.len() as u64) as usize,
        RotationStrategy::LeastUsed => {
            let mut best = 0;
            for (i, (_, usage)) in selectable.iter().enumerate() {
                if usage.count < selectable[best].1.count {
                    best = i;
                }
            }
            best
        }
        RotationStrategy::LeastRecent => {
            let mut best = 0;
            for (i, (_, usage)) in selectable.iter().enumerate() {
                if usage.last_used < selectable[best].1.last_used {
                    best = i;
                }
            }
            best
        }
        RotationStrategy::Weighted => {
            let weights: Vec<u64> = selectable
                .iter()
                .map(|(_, usage)| u64::from(usage.remaining(daily_limit).max(1)))
                .collect();
            let total: u64 = weights.iter().sum();
            let mut draw = rand::thread_rng().gen_range(0..total);
            for (i, weight) in weights.iter().enumerate() {
                if draw < *weight {
                    return i;
                }
                draw -= weight;
            }
            selectable.len() - 1
        }
        RotationStrategy::Hybrid => {
            let mut best = 0;
            let mut best_score = f64::NEG_INFINITY;
            for (i, (_, usage)) in selectable.iter().enumerate() {
                let score = hybrid_score(usage, daily_limit, now);
                if score > best_score {
                    best_score = score;
                    best = i;
                }
            }
            best
        }
    }
}
