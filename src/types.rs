//! # Allocation Types
//!
//! $$
//! \sum_i w_i = 1,\qquad 0 \le w_i \le 1
//! $$
//!
//! Weight vector and result containers.

use std::ops::Deref;

use crate::data::normalized_closes;
use crate::data::AlignedPrices;
use crate::error::AllocError;
use crate::error::Result;
use crate::optimizer::Objective;

/// Tolerance on `sum(w) == 1`.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Long-only, fully invested portfolio weights.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
  /// Validate and wrap raw weights.
  pub fn new(weights: Vec<f64>) -> Result<Self> {
    if weights.is_empty() {
      return Err(AllocError::invalid_input("empty weight vector"));
    }
    if let Some(w) = weights
      .iter()
      .find(|w| !w.is_finite() || **w < 0.0 || **w > 1.0)
    {
      return Err(AllocError::invalid_input(format!("weight {w} outside [0, 1]")));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
      return Err(AllocError::invalid_input(format!("weights sum to {sum}, not 1")));
    }
    Ok(Self(weights))
  }

  /// Dollar amount per asset for `budget`.
  pub fn allocate(&self, budget: f64) -> Vec<f64> {
    self.0.iter().map(|w| w * budget).collect()
  }
}

impl Deref for WeightVector {
  type Target = [f64];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

/// Output of one allocation run.
#[derive(Clone, Debug)]
pub struct PortfolioResult {
  /// Asset identifiers, same order as `weights`.
  pub tickers: Vec<String>,
  pub weights: WeightVector,
  /// Objective the weights were optimized for.
  pub objective: Objective,
  /// Annualized expected return `w·mu`.
  pub expected_return: f64,
  /// Annualized volatility `sqrt(w·Σ·w)`.
  pub volatility: f64,
  pub daily_return: f64,
  pub daily_volatility: f64,
  /// `(expected_return - risk_free) / volatility`, zero for a riskless book.
  pub sharpe: f64,
  pub budget: f64,
  /// `weight * budget` per asset.
  pub allocation: Vec<f64>,
  /// Last aligned close per asset.
  pub latest_prices: Vec<f64>,
  /// Whole shares affordable with each asset's allocation at the latest close.
  pub shares: Vec<u64>,
}

impl PortfolioResult {
  /// Weight of `ticker`, if it is in the book.
  pub fn weight_of(&self, ticker: &str) -> Option<f64> {
    self
      .tickers
      .iter()
      .position(|t| t.eq_ignore_ascii_case(ticker))
      .map(|i| self.weights[i])
  }

  /// Cash left after buying `shares` at `latest_prices`.
  pub fn residual_cash(&self) -> f64 {
    let spent: f64 = self
      .shares
      .iter()
      .zip(self.latest_prices.iter())
      .map(|(&n, &p)| n as f64 * p)
      .sum();
    self.budget - spent
  }

  /// Value path of the budget invested at the first aligned day with these weights.
  pub fn value_series(&self, aligned: &AlignedPrices) -> Result<Vec<f64>> {
    if aligned.tickers() != self.tickers.as_slice() {
      return Err(AllocError::invalid_input(
        "price history does not match the allocated assets",
      ));
    }
    let paths = normalized_closes(aligned, self.budget);
    Ok(
      paths
        .outer_iter()
        .map(|row| row.iter().zip(self.weights.iter()).map(|(v, w)| v * w).sum())
        .collect(),
    )
  }
}

pub(crate) fn whole_shares(allocation: &[f64], prices: &[f64]) -> Vec<u64> {
  allocation
    .iter()
    .zip(prices.iter())
    .map(|(&a, &p)| if p > 0.0 { (a / p).floor().max(0.0) as u64 } else { 0 })
    .collect()
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn weight_vector_enforces_simplex() {
    assert!(WeightVector::new(vec![0.5, 0.5]).is_ok());
    assert!(WeightVector::new(vec![0.6, 0.6]).is_err());
    assert!(WeightVector::new(vec![1.5, -0.5]).is_err());
    assert!(WeightVector::new(vec![f64::NAN, 1.0]).is_err());
    assert!(WeightVector::new(Vec::new()).is_err());
  }

  #[test]
  fn allocation_sums_to_budget() {
    let w = WeightVector::new(vec![0.2, 0.3, 0.5]).unwrap();
    let dollars = w.allocate(10_000.0);
    assert_abs_diff_eq!(dollars.iter().sum::<f64>(), 10_000.0, epsilon = 1e-9);
    assert_abs_diff_eq!(dollars[1], 3_000.0, epsilon = 1e-9);
  }

  #[test]
  fn whole_shares_round_down() {
    assert_eq!(whole_shares(&[1000.0, 250.0, 10.0], &[300.0, 50.0, 0.0]), vec![3, 5, 0]);
  }
}
