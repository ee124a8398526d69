//! # Return Statistics
//!
//! $$
//! \mu = 252\,\bar r,\qquad \Sigma = \frac{252}{T-1}\sum_t (r_t-\bar r)(r_t-\bar r)^\top
//! $$
//!
//! Daily and annualized moments of a return matrix.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use ndarray_stats::CorrelationExt;

use crate::error::AllocError;
use crate::error::Result;

/// Trading days per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Mean vector and covariance matrix of daily returns.
#[derive(Clone, Debug)]
pub struct Statistics {
  /// Mean daily return per asset.
  pub daily_mean: Array1<f64>,
  /// Sample covariance of daily returns (ddof = 1).
  pub daily_cov: Array2<f64>,
  /// Trading days per year applied by [`Statistics::mu`] and [`Statistics::sigma`].
  pub periods_per_year: f64,
}

impl Statistics {
  /// Estimate moments from a `(days, assets)` return matrix.
  pub fn from_returns(returns: &Array2<f64>, periods_per_year: f64) -> Result<Self> {
    let days = returns.nrows();
    if days == 0 {
      return Err(AllocError::insufficient_history("return matrix", days + 1));
    }
    if !(periods_per_year.is_finite() && periods_per_year > 0.0) {
      return Err(AllocError::invalid_input(format!(
        "periods per year must be positive, got {periods_per_year}"
      )));
    }

    let daily_mean = returns
      .mean_axis(Axis(0))
      .ok_or_else(|| AllocError::insufficient_history("return matrix", days + 1))?;

    // A single return has no dispersion estimate; treat it as riskless.
    let daily_cov = if days < 2 {
      Array2::zeros((returns.ncols(), returns.ncols()))
    } else {
      returns
        .t()
        .cov(1.0)
        .map_err(|e| AllocError::invalid_input(format!("covariance: {e}")))?
    };

    tracing::debug!(assets = returns.ncols(), days, "estimated return moments");

    Ok(Self {
      daily_mean,
      daily_cov,
      periods_per_year,
    })
  }

  /// Annualized expected returns.
  pub fn mu(&self) -> Array1<f64> {
    &self.daily_mean * self.periods_per_year
  }

  /// Annualized covariance matrix.
  pub fn sigma(&self) -> Array2<f64> {
    &self.daily_cov * self.periods_per_year
  }

  /// Portfolio return `w·mu` for annualized or daily inputs.
  pub fn portfolio_return(w: &Array1<f64>, mu: &Array1<f64>) -> f64 {
    w.dot(mu)
  }

  /// Portfolio volatility `sqrt(w·Σ·w)`, clamped at zero.
  pub fn portfolio_volatility(w: &Array1<f64>, cov: &Array2<f64>) -> f64 {
    w.dot(&cov.dot(w)).max(0.0).sqrt()
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn moments_match_hand_computation() {
    let r = array![[0.01, 0.02], [0.03, 0.00], [-0.01, 0.01]];
    let stats = Statistics::from_returns(&r, TRADING_DAYS).unwrap();

    assert_abs_diff_eq!(stats.daily_mean[0], 0.01, epsilon = 1e-15);
    assert_abs_diff_eq!(stats.daily_mean[1], 0.01, epsilon = 1e-15);
    // var(a) = (0 + 4e-4 + 4e-4) / 2
    assert_abs_diff_eq!(stats.daily_cov[[0, 0]], 4e-4, epsilon = 1e-15);
    // cov(a, b) = (0*0.01 + 0.02*-0.01 + -0.02*0) / 2
    assert_abs_diff_eq!(stats.daily_cov[[0, 1]], -1e-4, epsilon = 1e-15);
    assert_abs_diff_eq!(stats.daily_cov[[1, 0]], stats.daily_cov[[0, 1]], epsilon = 1e-18);

    assert_abs_diff_eq!(stats.mu()[0], 2.52, epsilon = 1e-12);
    assert_abs_diff_eq!(stats.sigma()[[0, 0]], 0.1008, epsilon = 1e-12);
  }

  #[test]
  fn portfolio_moments() {
    let w = array![0.5, 0.5];
    let mu = array![0.1, 0.2];
    let cov = array![[0.04, 0.0], [0.0, 0.09]];

    assert_abs_diff_eq!(Statistics::portfolio_return(&w, &mu), 0.15, epsilon = 1e-15);
    assert_abs_diff_eq!(
      Statistics::portfolio_volatility(&w, &cov),
      (0.25 * 0.04 + 0.25 * 0.09_f64).sqrt(),
      epsilon = 1e-15
    );
  }

  #[test]
  fn empty_returns_are_rejected() {
    let r = Array2::<f64>::zeros((0, 3));
    assert!(matches!(
      Statistics::from_returns(&r, TRADING_DAYS),
      Err(AllocError::InsufficientHistory { .. })
    ));
  }
}
