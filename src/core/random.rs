use std::f64::consts::PI;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use super::types::{AssetParameters, MarketParameters};

const MIN_UNIFORM: f64 = 1e-12;
const MIN_ANNUAL_RETURN: f64 = -1.0;

pub type PathRng = ChaCha20Rng;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarketSample {
    pub stocks_return: f64,
    pub bonds_return: f64,
}

/// Box-Muller on a pair of uniforms. `u1` is clamped away from zero so the log stays finite.
pub fn box_muller(u1: f64, u2: f64) -> f64 {
    let u1 = u1.max(MIN_UNIFORM);
    let r = (-2.0 * u1.ln()).sqrt();
    let theta = 2.0 * PI * u2;
    r * theta.cos()
}

pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.random();
    let u2: f64 = rng.random();
    box_muller(u1, u2)
}

pub fn sample_normal<R: Rng + ?Sized>(rng: &mut R, mean: f64, volatility: f64) -> f64 {
    scale(standard_normal(rng), mean, volatility)
}

fn scale(z: f64, mean: f64, volatility: f64) -> f64 {
    mean + z * volatility
}

/// Draws one year of stock and bond returns, correlated through the 2x2 Cholesky factor.
pub fn sample_market<R: Rng + ?Sized>(market: &MarketParameters, rng: &mut R) -> MarketSample {
    let z1 = standard_normal(rng);
    let z2 = standard_normal(rng);

    let corr = market.correlation;
    let orth = (1.0 - corr * corr).max(0.0).sqrt();

    let stocks_return = shifted(market.stocks, z1);
    let bonds_return = shifted(market.bonds, corr * z1 + orth * z2);

    MarketSample {
        stocks_return,
        bonds_return,
    }
}

fn shifted(params: AssetParameters, z: f64) -> f64 {
    scale(z, params.expected_annual_return, params.annual_volatility).max(MIN_ANNUAL_RETURN)
}

pub fn path_rng(base_seed: u64, path_index: u32) -> PathRng {
    ChaCha20Rng::seed_from_u64(derive_seed(base_seed, path_index))
}

pub fn derive_seed(base_seed: u64, path_index: u32) -> u64 {
    splitmix64(base_seed ^ (((path_index as u64) << 1) | 1))
}

pub fn process_seed() -> u64 {
    rand::rng().random()
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
