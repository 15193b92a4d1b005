use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::error::SimulationError;
use super::insights::derive_insights;
use super::path::PathSimulator;
use super::random::{path_rng, process_seed};
use super::settings::EngineSettings;
use super::stats::analyze;
use super::types::{
    ConfidenceBound, FinancialInputs, MAX_TIME_HORIZON_YEARS, MIN_TIME_HORIZON_YEARS,
    MarketParameters, ScenarioComparison, ScenarioInput, ScenarioOverrides, SimulatedPath,
    SimulationConfig, SimulationReport, SimulationResultSet, SimulationSummary,
    StatisticalSummary,
};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct MonteCarloEngine {
    settings: EngineSettings,
    market: MarketParameters,
}

impl MonteCarloEngine {
    pub fn new(
        settings: EngineSettings,
        market: MarketParameters,
    ) -> Result<Self, SimulationError> {
        let settings = settings.validate()?;
        validate_market(&market)?;
        Ok(Self { settings, market })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn market(&self) -> &MarketParameters {
        &self.market
    }

    pub fn run_simulation(
        &self,
        config: &SimulationConfig,
        financial: &FinancialInputs,
    ) -> Result<SimulationReport, SimulationError> {
        self.run_simulation_with_cancel(config, financial, &CancellationToken::new())
    }

    pub fn run_simulation_with_cancel(
        &self,
        config: &SimulationConfig,
        financial: &FinancialInputs,
        cancel: &CancellationToken,
    ) -> Result<SimulationReport, SimulationError> {
        let input = ScenarioInput {
            config: *config,
            financial: *financial,
            market: self.market,
        };
        self.run_input(&input, cancel)
    }

    /// Like `run_simulation_with_cancel`, but with market parameters supplied per call.
    pub fn run_input(
        &self,
        input: &ScenarioInput,
        cancel: &CancellationToken,
    ) -> Result<SimulationReport, SimulationError> {
        self.validate(input)?;
        let seed = input.config.seed.unwrap_or_else(process_seed);
        self.run_validated(input, seed, cancel)
    }

    pub fn run_scenario_comparison(
        &self,
        base: &ScenarioInput,
        scenarios: &BTreeMap<String, ScenarioOverrides>,
    ) -> Result<ScenarioComparison, SimulationError> {
        self.run_scenario_comparison_with_cancel(base, scenarios, &CancellationToken::new())
    }

    /// Validates the base and every variant before any path runs. Variants without
    /// their own seed share the base seed.
    pub fn run_scenario_comparison_with_cancel(
        &self,
        base: &ScenarioInput,
        scenarios: &BTreeMap<String, ScenarioOverrides>,
        cancel: &CancellationToken,
    ) -> Result<ScenarioComparison, SimulationError> {
        self.validate(base)?;
        let base_seed = base.config.seed.unwrap_or_else(process_seed);
        let mut shared_base = *base;
        shared_base.config.seed = Some(base_seed);

        let mut variants = Vec::with_capacity(scenarios.len());
        for (name, overrides) in scenarios {
            let variant = overrides.apply(&shared_base);
            self.validate(&variant).map_err(|err| match err {
                SimulationError::Configuration(msg) => {
                    SimulationError::Configuration(format!("scenario '{name}': {msg}"))
                }
                other => other,
            })?;
            variants.push((name.clone(), variant));
        }

        let base_report = self.run_validated(&shared_base, base_seed, cancel)?;
        let mut reports = BTreeMap::new();
        for (name, variant) in variants {
            debug!(
                scenario = %name,
                simulations = variant.config.simulation_count,
                "running scenario"
            );
            let seed = variant.config.seed.unwrap_or(base_seed);
            reports.insert(name, self.run_validated(&variant, seed, cancel)?);
        }

        Ok(ScenarioComparison {
            base: base_report,
            scenarios: reports,
        })
    }

    pub fn validate(&self, input: &ScenarioInput) -> Result<(), SimulationError> {
        let result = validate_input(input, &self.settings);
        if let Err(err) = &result {
            warn!(error = %err, "rejected simulation input");
        }
        result
    }

    fn simulate_paths(
        &self,
        input: &ScenarioInput,
        seed: u64,
        cancel: &CancellationToken,
    ) -> Result<SimulationResultSet, SimulationError> {
        let simulator = PathSimulator::new(&input.config, &input.financial, &input.market);
        let run_path = |index: u32| -> Result<SimulatedPath, SimulationError> {
            if cancel.is_cancelled() {
                return Err(SimulationError::Cancelled);
            }
            let mut rng = path_rng(seed, index);
            Ok(simulator.simulate(&mut rng))
        };

        let count = input.config.simulation_count;
        let paths = if self.settings.parallel {
            (0..count)
                .into_par_iter()
                .map(run_path)
                .collect::<Result<Vec<_>, _>>()
        } else {
            (0..count).map(run_path).collect::<Result<Vec<_>, _>>()
        };

        match paths {
            Ok(paths) => Ok(SimulationResultSet::new(paths)),
            Err(err) => {
                warn!(error = %err, "simulation batch aborted");
                Err(err)
            }
        }
    }

    fn run_validated(
        &self,
        input: &ScenarioInput,
        seed: u64,
        cancel: &CancellationToken,
    ) -> Result<SimulationReport, SimulationError> {
        let started = Instant::now();
        info!(
            simulations = input.config.simulation_count,
            years = input.config.time_horizon_years,
            rebalancing = ?input.config.rebalancing,
            parallel = self.settings.parallel,
            seed,
            "starting simulation batch"
        );

        let results = self.simulate_paths(input, seed, cancel)?;
        let analysis = analyze(&results, &self.settings.percentile_ranks)?;
        let insights = derive_insights(
            &analysis,
            &input.financial,
            input.config.time_horizon_years,
        );

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            success_rate = analysis.success_rate,
            insights = insights.len(),
            "finished simulation batch"
        );

        Ok(SimulationReport {
            confidence_intervals: confidence_intervals(&analysis),
            summary: build_summary(input, &analysis, &self.settings),
            simulation_results: results.into_paths(),
            statistical_analysis: analysis,
            insights,
            timestamp: Utc::now(),
            version: ENGINE_VERSION.to_string(),
        })
    }
}

impl Default for MonteCarloEngine {
    fn default() -> Self {
        Self {
            settings: EngineSettings::default(),
            market: MarketParameters::default(),
        }
    }
}

fn validate_input(input: &ScenarioInput, settings: &EngineSettings) -> Result<(), SimulationError> {
    let config = &input.config;
    if config.simulation_count == 0 {
        return Err(SimulationError::config(
            "Simulation count must be at least 1",
        ));
    }
    if config.simulation_count > settings.max_simulations {
        return Err(SimulationError::config(format!(
            "Simulation count cannot exceed {}",
            settings.max_simulations
        )));
    }
    if !(MIN_TIME_HORIZON_YEARS..=MAX_TIME_HORIZON_YEARS).contains(&config.time_horizon_years) {
        return Err(SimulationError::config(format!(
            "Time horizon must be between {MIN_TIME_HORIZON_YEARS} and {MAX_TIME_HORIZON_YEARS} years"
        )));
    }

    let allocation = &config.asset_allocation;
    if !allocation.stocks.is_finite() || !allocation.bonds.is_finite() {
        return Err(SimulationError::config(
            "Asset allocation weights must be finite numbers",
        ));
    }
    if allocation.stocks < 0.0 || allocation.bonds < 0.0 {
        return Err(SimulationError::config(
            "Asset allocation weights must be non-negative",
        ));
    }
    let total = allocation.total();
    if (total - 1.0).abs() > settings.allocation_tolerance {
        return Err(SimulationError::config(format!(
            "Asset allocation weights must sum to 1 (got {total})"
        )));
    }

    let financial = &input.financial;
    if !financial.initial_balance.is_finite() || financial.initial_balance < 0.0 {
        return Err(SimulationError::config(
            "Initial balance must be a non-negative number",
        ));
    }
    if !financial.monthly_contribution.is_finite() || financial.monthly_contribution < 0.0 {
        return Err(SimulationError::config(
            "Monthly contribution must be a non-negative number",
        ));
    }

    validate_market(&input.market)
}

fn validate_market(market: &MarketParameters) -> Result<(), SimulationError> {
    for (name, params) in [("stocks", market.stocks), ("bonds", market.bonds)] {
        if !params.expected_annual_return.is_finite() {
            return Err(SimulationError::config(format!(
                "Expected {name} return must be a finite number"
            )));
        }
        if !params.annual_volatility.is_finite() || params.annual_volatility < 0.0 {
            return Err(SimulationError::config(format!(
                "{name} volatility must be a non-negative number"
            )));
        }
    }
    if !(-1.0..=1.0).contains(&market.correlation) {
        return Err(SimulationError::config(
            "Return correlation must be between -1 and 1",
        ));
    }
    Ok(())
}

fn confidence_intervals(analysis: &StatisticalSummary) -> BTreeMap<u32, ConfidenceBound> {
    analysis
        .final_value
        .percentiles
        .iter()
        .map(|(rank, final_value)| {
            let total_return = analysis
                .total_return
                .percentiles
                .get(rank)
                .copied()
                .unwrap_or(0.0);
            (
                *rank,
                ConfidenceBound {
                    final_value: *final_value,
                    total_return,
                },
            )
        })
        .collect()
}

fn build_summary(
    input: &ScenarioInput,
    analysis: &StatisticalSummary,
    settings: &EngineSettings,
) -> SimulationSummary {
    let percentiles = &analysis.final_value.percentiles;
    let rank_value = |rank: u32| percentiles.get(&rank).copied().unwrap_or(0.0);
    SimulationSummary {
        simulation_count: input.config.simulation_count,
        time_horizon_years: input.config.time_horizon_years,
        initial_balance: input.financial.initial_balance,
        monthly_contribution: input.financial.monthly_contribution,
        total_contributions: input
            .financial
            .total_contributions(input.config.time_horizon_years),
        rebalancing: input.config.rebalancing,
        success_rate: analysis.success_rate,
        median_return: analysis.total_return.median,
        worst_case: rank_value(settings.lowest_rank()),
        best_case: rank_value(settings.highest_rank()),
    }
}
