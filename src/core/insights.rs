use super::types::{
    ConfidenceLabel, FinancialInputs, Insight, InsightKind, StatisticalSummary,
};

const HIGH_SUCCESS_RATE: f64 = 0.80;
const LOW_SUCCESS_RATE: f64 = 0.50;
const CONTRIBUTION_DRIVEN_RATIO: f64 = 0.5;
const HIGH_VOLATILITY_RATIO: f64 = 0.5;

pub fn derive_insights(
    summary: &StatisticalSummary,
    financial: &FinancialInputs,
    time_horizon_years: u32,
) -> Vec<Insight> {
    let total_contributions = financial.total_contributions(time_horizon_years);
    [
        success_insight(summary, financial),
        contribution_insight(summary, financial, total_contributions),
        volatility_insight(summary),
        downside_insight(summary, financial, total_contributions),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn success_insight(summary: &StatisticalSummary, financial: &FinancialInputs) -> Option<Insight> {
    let rate = summary.success_rate;
    if rate >= HIGH_SUCCESS_RATE {
        Some(Insight {
            kind: InsightKind::Success,
            title: "High probability of growth".to_string(),
            description: format!(
                "{:.0}% of simulated paths finish above the starting balance.",
                rate * 100.0
            ),
            confidence_label: ConfidenceLabel::High,
            metric: rate,
        })
    } else if rate < LOW_SUCCESS_RATE && financial.initial_balance > 0.0 {
        Some(Insight {
            kind: InsightKind::Warning,
            title: "Low probability of growth".to_string(),
            description: format!(
                "Only {:.0}% of simulated paths finish above the starting balance. \
                 Consider a longer horizon or a different allocation.",
                rate * 100.0
            ),
            confidence_label: ConfidenceLabel::Medium,
            metric: rate,
        })
    } else {
        None
    }
}

fn contribution_insight(
    summary: &StatisticalSummary,
    financial: &FinancialInputs,
    total_contributions: f64,
) -> Option<Insight> {
    let growth = summary.final_value.median - financial.initial_balance;
    if growth <= 0.0 || total_contributions <= 0.0 {
        return None;
    }
    let ratio = total_contributions / growth;
    (ratio > CONTRIBUTION_DRIVEN_RATIO).then(|| Insight {
        kind: InsightKind::Contribution,
        title: "Contribution-driven growth".to_string(),
        description: format!(
            "Contributions account for {:.0}% of median portfolio growth; \
             saving rate matters more than market returns here.",
            ratio.min(1.0) * 100.0
        ),
        confidence_label: ConfidenceLabel::High,
        metric: ratio,
    })
}

fn volatility_insight(summary: &StatisticalSummary) -> Option<Insight> {
    let stats = &summary.final_value;
    let (low, high) = outer_percentiles(summary)?;
    if stats.mean <= 0.0 {
        return None;
    }
    let ratio = (high - low) / stats.mean;
    (ratio > HIGH_VOLATILITY_RATIO).then(|| Insight {
        kind: InsightKind::Volatility,
        title: "High outcome volatility".to_string(),
        description: format!(
            "The spread between worst and best case outcomes is {:.0}% of the mean final value.",
            ratio * 100.0
        ),
        confidence_label: ConfidenceLabel::Medium,
        metric: ratio,
    })
}

fn downside_insight(
    summary: &StatisticalSummary,
    financial: &FinancialInputs,
    total_contributions: f64,
) -> Option<Insight> {
    let (&rank, &low) = summary.final_value.percentiles.iter().next()?;
    let paid_in = financial.initial_balance + total_contributions;
    let shortfall = paid_in - low;
    (shortfall > 0.0).then(|| Insight {
        kind: InsightKind::Warning,
        title: "Downside risk".to_string(),
        description: format!(
            "In the worst case the portfolio ends {shortfall:.2} below the total amount paid in."
        ),
        confidence_label: label_for_rank(rank),
        metric: shortfall,
    })
}

/// Confidence that the outcome beats the `rank` percentile, bucketed.
fn label_for_rank(rank: u32) -> ConfidenceLabel {
    let confidence = 1.0 - f64::from(rank) / 100.0;
    if confidence >= 0.9 {
        ConfidenceLabel::High
    } else if confidence >= 0.7 {
        ConfidenceLabel::Medium
    } else {
        ConfidenceLabel::Low
    }
}

fn outer_percentiles(summary: &StatisticalSummary) -> Option<(f64, f64)> {
    let percentiles = &summary.final_value.percentiles;
    let low = percentiles.values().next().copied()?;
    let high = percentiles.values().next_back().copied()?;
    Some((low, high))
}
