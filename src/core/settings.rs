use serde::Deserialize;

use super::error::SimulationError;

pub const DEFAULT_PERCENTILE_RANKS: [u32; 5] = [5, 25, 50, 75, 95];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineSettings {
    pub max_simulations: u32,
    pub default_simulations: u32,
    pub percentile_ranks: Vec<u32>,
    pub allocation_tolerance: f64,
    pub parallel: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_simulations: 10_000,
            default_simulations: 1_000,
            percentile_ranks: DEFAULT_PERCENTILE_RANKS.to_vec(),
            allocation_tolerance: 1e-6,
            parallel: true,
        }
    }
}

impl EngineSettings {
    /// Checks the settings and normalises the rank list to ascending, unique order.
    pub fn validate(mut self) -> Result<Self, SimulationError> {
        if self.max_simulations == 0 {
            return Err(SimulationError::config(
                "Maximum simulation count must be at least 1",
            ));
        }
        if self.default_simulations == 0 || self.default_simulations > self.max_simulations {
            return Err(SimulationError::config(format!(
                "Default simulation count must be between 1 and {}",
                self.max_simulations
            )));
        }
        if self.percentile_ranks.is_empty() {
            return Err(SimulationError::config(
                "At least one percentile rank is required",
            ));
        }
        if let Some(rank) = self.percentile_ranks.iter().find(|r| **r > 100) {
            return Err(SimulationError::config(format!(
                "Percentile rank {rank} must be between 0 and 100"
            )));
        }
        if !self.allocation_tolerance.is_finite() || self.allocation_tolerance <= 0.0 {
            return Err(SimulationError::config(
                "Allocation tolerance must be a positive number",
            ));
        }

        self.percentile_ranks.sort_unstable();
        self.percentile_ranks.dedup();
        Ok(self)
    }

    pub fn lowest_rank(&self) -> u32 {
        self.percentile_ranks.first().copied().unwrap_or(0)
    }

    pub fn highest_rank(&self) -> u32 {
        self.percentile_ranks.last().copied().unwrap_or(100)
    }
}
