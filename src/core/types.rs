use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MIN_TIME_HORIZON_YEARS: u32 = 1;
pub const MAX_TIME_HORIZON_YEARS: u32 = 50;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RebalancingPolicy {
    #[default]
    None,
    Annual,
}

#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AssetAllocation {
    pub stocks: f64,
    pub bonds: f64,
}

impl AssetAllocation {
    pub fn new(stocks: f64, bonds: f64) -> Self {
        Self { stocks, bonds }
    }

    pub fn total(&self) -> f64 {
        self.stocks + self.bonds
    }
}

impl Default for AssetAllocation {
    fn default() -> Self {
        Self::new(0.6, 0.4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    pub simulation_count: u32,
    pub time_horizon_years: u32,
    pub asset_allocation: AssetAllocation,
    pub rebalancing: RebalancingPolicy,
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_count: 1_000,
            time_horizon_years: 30,
            asset_allocation: AssetAllocation::default(),
            rebalancing: RebalancingPolicy::Annual,
            seed: None,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialInputs {
    pub initial_balance: f64,
    pub monthly_contribution: f64,
}

impl FinancialInputs {
    pub fn annual_contribution(&self) -> f64 {
        self.monthly_contribution * 12.0
    }

    pub fn total_contributions(&self, years: u32) -> f64 {
        self.annual_contribution() * years as f64
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetParameters {
    pub expected_annual_return: f64,
    pub annual_volatility: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParameters {
    pub stocks: AssetParameters,
    pub bonds: AssetParameters,
    pub correlation: f64,
}

impl Default for MarketParameters {
    fn default() -> Self {
        Self {
            stocks: AssetParameters {
                expected_annual_return: 0.10,
                annual_volatility: 0.16,
            },
            bonds: AssetParameters {
                expected_annual_return: 0.04,
                annual_volatility: 0.05,
            },
            correlation: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedPath {
    pub yearly_values: Vec<f64>,
    pub final_value: f64,
    pub total_return: f64,
}

impl SimulatedPath {
    pub fn from_yearly_values(yearly_values: Vec<f64>, initial_balance: f64) -> Self {
        let final_value = yearly_values.last().copied().unwrap_or(initial_balance);
        let total_return = if initial_balance > 0.0 {
            (final_value - initial_balance) / initial_balance
        } else {
            0.0
        };
        Self {
            yearly_values,
            final_value,
            total_return,
        }
    }
}

/// Complete, read-only population of simulated paths for one batch.
#[derive(Debug, Clone)]
pub struct SimulationResultSet {
    paths: Vec<SimulatedPath>,
}

impl SimulationResultSet {
    pub(crate) fn new(paths: Vec<SimulatedPath>) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &[SimulatedPath] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn final_values(&self) -> Vec<f64> {
        self.paths.iter().map(|p| p.final_value).collect()
    }

    pub fn total_returns(&self) -> Vec<f64> {
        self.paths.iter().map(|p| p.total_return).collect()
    }

    pub fn into_paths(self) -> Vec<SimulatedPath> {
        self.paths
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub percentiles: BTreeMap<u32, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticalSummary {
    pub final_value: DistributionStats,
    pub total_return: DistributionStats,
    pub success_rate: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfidenceBound {
    pub final_value: f64,
    pub total_return: f64,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Success,
    Warning,
    Contribution,
    Volatility,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: String,
    pub description: String,
    pub confidence_label: ConfidenceLabel,
    pub metric: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub simulation_count: u32,
    pub time_horizon_years: u32,
    pub initial_balance: f64,
    pub monthly_contribution: f64,
    pub total_contributions: f64,
    pub rebalancing: RebalancingPolicy,
    pub success_rate: f64,
    pub median_return: f64,
    pub worst_case: f64,
    pub best_case: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub simulation_results: Vec<SimulatedPath>,
    pub statistical_analysis: StatisticalSummary,
    pub confidence_intervals: BTreeMap<u32, ConfidenceBound>,
    pub insights: Vec<Insight>,
    pub summary: SimulationSummary,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioInput {
    pub config: SimulationConfig,
    pub financial: FinancialInputs,
    pub market: MarketParameters,
}

/// Partial replacement of a base scenario. Unset fields inherit from the base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScenarioOverrides {
    pub simulation_count: Option<u32>,
    pub time_horizon_years: Option<u32>,
    pub asset_allocation: Option<AssetAllocation>,
    pub rebalancing: Option<RebalancingPolicy>,
    pub seed: Option<u64>,
    pub initial_balance: Option<f64>,
    pub monthly_contribution: Option<f64>,
    pub market: Option<MarketParameters>,
}

impl ScenarioOverrides {
    pub fn apply(&self, base: &ScenarioInput) -> ScenarioInput {
        let mut out = *base;
        if let Some(v) = self.simulation_count {
            out.config.simulation_count = v;
        }
        if let Some(v) = self.time_horizon_years {
            out.config.time_horizon_years = v;
        }
        if let Some(v) = self.asset_allocation {
            out.config.asset_allocation = v;
        }
        if let Some(v) = self.rebalancing {
            out.config.rebalancing = v;
        }
        if let Some(v) = self.seed {
            out.config.seed = Some(v);
        }
        if let Some(v) = self.initial_balance {
            out.financial.initial_balance = v;
        }
        if let Some(v) = self.monthly_contribution {
            out.financial.monthly_contribution = v;
        }
        if let Some(v) = self.market {
            out.market = v;
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioComparison {
    pub base: SimulationReport,
    pub scenarios: BTreeMap<String, SimulationReport>,
}
