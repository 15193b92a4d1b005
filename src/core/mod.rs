mod engine;
mod error;
mod insights;
mod path;
mod random;
mod settings;
mod stats;
mod types;

pub use engine::{CancellationToken, ENGINE_VERSION, MonteCarloEngine};
pub use error::SimulationError;
pub use insights::derive_insights;
pub use path::PathSimulator;
pub use random::{
    MarketSample, PathRng, box_muller, derive_seed, path_rng, sample_market, sample_normal,
    standard_normal,
};
pub use settings::{DEFAULT_PERCENTILE_RANKS, EngineSettings};
pub use stats::{analyze, percentile};
pub use types::{
    AssetAllocation, AssetParameters, ConfidenceBound, ConfidenceLabel,
    DistributionStats, FinancialInputs, Insight, InsightKind, MAX_TIME_HORIZON_YEARS,
    MIN_TIME_HORIZON_YEARS, MarketParameters, RebalancingPolicy, ScenarioComparison,
    ScenarioInput, ScenarioOverrides, SimulatedPath, SimulationConfig, SimulationReport,
    SimulationResultSet, SimulationSummary, StatisticalSummary,
};
