use rand::Rng;

use super::random::{MarketSample, sample_market};
use super::types::{
    AssetAllocation, FinancialInputs, MarketParameters, RebalancingPolicy, SimulatedPath,
    SimulationConfig,
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Portfolio {
    stocks: f64,
    bonds: f64,
}

impl Portfolio {
    fn at_target(total: f64, allocation: &AssetAllocation) -> Self {
        Self {
            stocks: total * allocation.stocks,
            bonds: total * allocation.bonds,
        }
    }

    fn total(&self) -> f64 {
        self.stocks + self.bonds
    }
}

/// Evolves single trajectories. Each year runs: apply returns, add contributions, then rebalance.
#[derive(Debug, Clone, Copy)]
pub struct PathSimulator<'a> {
    config: &'a SimulationConfig,
    financial: &'a FinancialInputs,
    market: &'a MarketParameters,
}

impl<'a> PathSimulator<'a> {
    pub fn new(
        config: &'a SimulationConfig,
        financial: &'a FinancialInputs,
        market: &'a MarketParameters,
    ) -> Self {
        Self {
            config,
            financial,
            market,
        }
    }

    pub fn simulate<R: Rng + ?Sized>(&self, rng: &mut R) -> SimulatedPath {
        let years = self.config.time_horizon_years as usize;
        let allocation = &self.config.asset_allocation;
        let annual_contribution = self.financial.annual_contribution();

        let mut portfolio = Portfolio::at_target(self.financial.initial_balance, allocation);
        let mut yearly_values = Vec::with_capacity(years + 1);
        yearly_values.push(self.financial.initial_balance);

        for _ in 0..years {
            let sampled = sample_market(self.market, rng);
            apply_growth(&mut portfolio, &sampled);
            apply_contributions(&mut portfolio, annual_contribution, allocation);
            if self.config.rebalancing == RebalancingPolicy::Annual {
                portfolio = Portfolio::at_target(portfolio.total(), allocation);
            }
            yearly_values.push(portfolio.total());
        }

        SimulatedPath::from_yearly_values(yearly_values, self.financial.initial_balance)
    }
}

fn apply_growth(portfolio: &mut Portfolio, sampled: &MarketSample) {
    portfolio.stocks *= 1.0 + sampled.stocks_return;
    portfolio.bonds *= 1.0 + sampled.bonds_return;
}

fn apply_contributions(portfolio: &mut Portfolio, annual: f64, allocation: &AssetAllocation) {
    portfolio.stocks += annual * allocation.stocks;
    portfolio.bonds += annual * allocation.bonds;
}
