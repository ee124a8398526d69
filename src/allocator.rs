//! # Allocator
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Optimize}(\mu, \Sigma),\qquad \text{dollars}_i = w_i B
//! $$
//!
//! End-to-end allocation: align prices, estimate moments, solve for weights,
//! and size the budget.

use chrono::NaiveDate;
use ndarray::Array1;

use crate::data::align_prices;
use crate::data::AlignedPrices;
use crate::data::PriceSeries;
use crate::data::PriceSource;
use crate::error::AllocError;
use crate::error::Result;
use crate::optimizer::sharpe_ratio;
use crate::optimizer::solve;
use crate::optimizer::Objective;
use crate::optimizer::SolverSettings;
use crate::stats::Statistics;
use crate::stats::TRADING_DAYS;
use crate::types::whole_shares;
use crate::types::PortfolioResult;
use crate::types::WeightVector;

/// Runtime configuration for [`Allocator`].
#[derive(Clone, Debug)]
pub struct AllocatorConfig {
  /// Quantity the weights are optimized for.
  pub objective: Objective,
  /// Annual risk-free rate used by the Sharpe objective and reported ratio.
  pub risk_free: f64,
  /// Trading days per year used to annualize daily moments.
  pub trading_days: f64,
  /// Stopping rules for the solver.
  pub solver: SolverSettings,
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self {
      objective: Objective::MaxSharpe,
      risk_free: 0.0,
      trading_days: TRADING_DAYS,
      solver: SolverSettings::default(),
    }
  }
}

/// Stateless mean-variance allocator.
#[derive(Clone, Debug, Default)]
pub struct Allocator {
  config: AllocatorConfig,
}

impl Allocator {
  pub fn new(config: AllocatorConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &AllocatorConfig {
    &self.config
  }

  /// Optimize weights over the common history of `series` and size `budget`.
  pub fn optimize(&self, series: &[PriceSeries], budget: f64) -> Result<PortfolioResult> {
    self.optimize_in_range(series, None, budget)
  }

  /// As [`Allocator::optimize`], restricted to an inclusive date window.
  pub fn optimize_in_range(
    &self,
    series: &[PriceSeries],
    range: Option<(NaiveDate, NaiveDate)>,
    budget: f64,
  ) -> Result<PortfolioResult> {
    validate_budget(budget)?;
    let aligned = align_prices(series, range)?;
    self.optimize_aligned(&aligned, budget)
  }

  /// Fetch each ticker from `source` and optimize over `[start, end]`.
  pub fn run<S: PriceSource + ?Sized>(
    &self,
    source: &S,
    tickers: &[&str],
    start: NaiveDate,
    end: NaiveDate,
    budget: f64,
  ) -> Result<PortfolioResult> {
    validate_budget(budget)?;
    if start > end {
      return Err(AllocError::invalid_input(format!(
        "start date {start} is after end date {end}"
      )));
    }

    let mut series = Vec::with_capacity(tickers.len());
    for &ticker in tickers {
      let s = source
        .fetch(ticker, start, end)
        .map_err(|e| AllocError::data_unavailable(ticker, format!("{e:#}")))?;
      if s.is_empty() {
        return Err(AllocError::data_unavailable(
          ticker,
          format!("no prices between {start} and {end}"),
        ));
      }
      series.push(s);
    }

    self.optimize_in_range(&series, Some((start, end)), budget)
  }

  /// Optimize weights over an already aligned price history.
  pub fn optimize_aligned(&self, aligned: &AlignedPrices, budget: f64) -> Result<PortfolioResult> {
    validate_budget(budget)?;

    let stats = Statistics::from_returns(&aligned.returns(), self.config.trading_days)?;
    let mu = stats.mu();
    let sigma = stats.sigma();

    let solution = solve(
      &mu,
      &sigma,
      self.config.risk_free,
      self.config.objective,
      &self.config.solver,
    )?;

    let w = Array1::from(solution.weights.clone());
    let expected_return = Statistics::portfolio_return(&w, &mu);
    let volatility = Statistics::portfolio_volatility(&w, &sigma);
    let daily_return = Statistics::portfolio_return(&w, &stats.daily_mean);
    let daily_volatility = Statistics::portfolio_volatility(&w, &stats.daily_cov);
    let sharpe = sharpe_ratio(expected_return, volatility, self.config.risk_free);

    let weights = WeightVector::new(solution.weights)?;
    let allocation = weights.allocate(budget);
    let latest_prices = aligned.latest_closes();
    let shares = whole_shares(&allocation, &latest_prices);

    tracing::info!(
      tickers = ?aligned.tickers(),
      weights = ?&*weights,
      expected_return,
      volatility,
      "allocation complete"
    );

    Ok(PortfolioResult {
      tickers: aligned.tickers().to_vec(),
      weights,
      objective: self.config.objective,
      expected_return,
      volatility,
      daily_return,
      daily_volatility,
      sharpe,
      budget,
      allocation,
      latest_prices,
      shares,
    })
  }
}

fn validate_budget(budget: f64) -> Result<()> {
  if budget.is_finite() && budget >= 0.0 {
    Ok(())
  } else {
    Err(AllocError::invalid_input(format!(
      "budget must be a non-negative amount, got {budget}"
    )))
  }
}
