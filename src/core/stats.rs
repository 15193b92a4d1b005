use std::collections::BTreeMap;

use super::error::SimulationError;
use super::types::{DistributionStats, SimulationResultSet, StatisticalSummary};

pub fn analyze(
    results: &SimulationResultSet,
    percentile_ranks: &[u32],
) -> Result<StatisticalSummary, SimulationError> {
    if results.is_empty() {
        return Err(SimulationError::computation(
            "cannot summarise an empty result set",
        ));
    }

    let final_value = describe(results.final_values(), percentile_ranks, "final value")?;
    let total_returns = results.total_returns();
    let winners = total_returns.iter().filter(|r| **r > 0.0).count();
    let success_rate = winners as f64 / results.len() as f64;
    let total_return = describe(total_returns, percentile_ranks, "total return")?;

    Ok(StatisticalSummary {
        final_value,
        total_return,
        success_rate,
    })
}

fn describe(
    mut values: Vec<f64>,
    percentile_ranks: &[u32],
    label: &str,
) -> Result<DistributionStats, SimulationError> {
    if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
        return Err(SimulationError::computation(format!(
            "non-finite {label} {bad} in simulated population"
        )));
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let mean = mean(&values);
    let percentiles = percentile_ranks
        .iter()
        .map(|rank| (*rank, percentile(&values, *rank)))
        .collect::<BTreeMap<_, _>>();

    Ok(DistributionStats {
        mean,
        median: median(&values),
        std_dev: std_dev(&values, mean),
        min: values[0],
        max: values[values.len() - 1],
        percentiles,
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Nearest-rank percentile: `sorted[floor(rank / 100 * n)]`, clamped to the last element.
pub fn percentile(sorted: &[f64], rank: u32) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((rank as f64 / 100.0) * sorted.len() as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
