//! # Price Data
//!
//! $$
//! r_{t,i} = \frac{P_{t,i}}{P_{t-1,i}} - 1
//! $$
//!
//! Price series containers, the price source seam, date alignment and
//! the daily return matrix.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;

use anyhow::anyhow;
use chrono::NaiveDate;
use impl_new_derive::ImplNew;
use ndarray::Array2;
use ndarray::Axis;
use ndarray::s;

use crate::error::AllocError;
use crate::error::Result;

/// Single closing price observation.
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct PricePoint {
  pub date: NaiveDate,
  pub close: f64,
}

/// Date-indexed closing prices of one asset.
#[derive(ImplNew, Clone, Debug, PartialEq)]
pub struct PriceSeries {
  pub ticker: String,
  pub points: Vec<PricePoint>,
}

impl PriceSeries {
  /// Build a series from `(date, close)` pairs.
  pub fn from_pairs(ticker: impl Into<String>, pairs: &[(NaiveDate, f64)]) -> Self {
    Self {
      ticker: ticker.into(),
      points: pairs.iter().map(|&(d, c)| PricePoint::new(d, c)).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// Closing prices in the order they were supplied.
  pub fn closes(&self) -> Vec<f64> {
    self.points.iter().map(|p| p.close).collect()
  }
}

/// Collaborator that supplies historical closes for a ticker.
pub trait PriceSource {
  /// Fetch closes for `ticker` between `start` and `end` (inclusive).
  fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> anyhow::Result<PriceSeries>;
}

/// In-memory [`PriceSource`] backed by preloaded series.
#[derive(Clone, Debug, Default)]
pub struct StaticPriceSource {
  series: HashMap<String, PriceSeries>,
}

impl StaticPriceSource {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a series under its ticker, replacing any previous one.
  pub fn insert(&mut self, series: PriceSeries) {
    self.series.insert(series.ticker.to_uppercase(), series);
  }

  pub fn with_series(mut self, series: PriceSeries) -> Self {
    self.insert(series);
    self
  }
}

impl PriceSource for StaticPriceSource {
  fn fetch(&self, ticker: &str, start: NaiveDate, end: NaiveDate) -> anyhow::Result<PriceSeries> {
    let series = self
      .series
      .get(&ticker.to_uppercase())
      .ok_or_else(|| anyhow!("unknown ticker {ticker}"))?;

    Ok(PriceSeries {
      ticker: series.ticker.clone(),
      points: series
        .points
        .iter()
        .filter(|p| p.date >= start && p.date <= end)
        .copied()
        .collect(),
    })
  }
}

/// Closes of several assets restricted to their common trading dates.
///
/// Only [`align_prices`] builds one, so `closes` always has shape
/// `(dates, tickers)` with at least two rows.
#[derive(Clone, Debug)]
pub struct AlignedPrices {
  tickers: Vec<String>,
  dates: Vec<NaiveDate>,
  closes: Array2<f64>,
}

impl AlignedPrices {
  /// Asset identifiers, one per column.
  pub fn tickers(&self) -> &[String] {
    &self.tickers
  }

  /// Common trading dates in ascending order, one per row.
  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  /// Closing prices, shape `(dates, tickers)`.
  pub fn closes(&self) -> &Array2<f64> {
    &self.closes
  }

  pub fn n_days(&self) -> usize {
    self.dates.len()
  }

  /// Last aligned close per asset.
  pub fn latest_closes(&self) -> Vec<f64> {
    self.closes.row(self.closes.nrows() - 1).to_vec()
  }

  /// Daily fractional returns, shape `(dates - 1, tickers)`.
  pub fn returns(&self) -> Array2<f64> {
    let prev = self.closes.slice(s![..-1, ..]);
    let next = self.closes.slice(s![1.., ..]);
    &next / &prev - 1.0
  }
}

/// Intersect the trading dates of all series, optionally restricted to
/// an inclusive `[start, end]` window.
pub fn align_prices(
  series: &[PriceSeries],
  range: Option<(NaiveDate, NaiveDate)>,
) -> Result<AlignedPrices> {
  if series.is_empty() {
    return Err(AllocError::invalid_input("no assets supplied"));
  }

  if let Some((start, end)) = range {
    if start > end {
      return Err(AllocError::invalid_input(format!(
        "start date {start} is after end date {end}"
      )));
    }
  }

  let mut seen = HashSet::new();
  let mut by_asset: Vec<BTreeMap<NaiveDate, f64>> = Vec::with_capacity(series.len());

  for s in series {
    if !seen.insert(s.ticker.to_uppercase()) {
      return Err(AllocError::invalid_input(format!(
        "duplicate ticker {}",
        s.ticker
      )));
    }

    let mut closes = BTreeMap::new();
    for p in &s.points {
      if let Some((start, end)) = range {
        if p.date < start || p.date > end {
          continue;
        }
      }
      if !p.close.is_finite() || p.close <= 0.0 {
        return Err(AllocError::invalid_input(format!(
          "{} has non-positive close {} on {}",
          s.ticker, p.close, p.date
        )));
      }
      if closes.insert(p.date, p.close).is_some() {
        return Err(AllocError::invalid_input(format!(
          "{} repeats date {}",
          s.ticker, p.date
        )));
      }
    }

    if closes.len() < 2 {
      return Err(AllocError::insufficient_history(&s.ticker, closes.len()));
    }
    by_asset.push(closes);
  }

  let mut common: BTreeSet<NaiveDate> = by_asset[0].keys().copied().collect();
  for closes in &by_asset[1..] {
    common.retain(|d| closes.contains_key(d));
  }

  if common.is_empty() {
    return Err(AllocError::NoOverlap {
      assets: series.len(),
    });
  }
  if common.len() < 2 {
    return Err(AllocError::insufficient_history(
      "overlapping trading days",
      common.len(),
    ));
  }

  let dropped: usize = by_asset.iter().map(|c| c.len() - common.len()).sum();
  if dropped > 0 {
    tracing::warn!(dropped, kept = common.len(), "dropped non-overlapping observations");
  }

  let dates: Vec<NaiveDate> = common.into_iter().collect();
  let mut closes = Array2::<f64>::zeros((dates.len(), series.len()));
  for (j, asset) in by_asset.iter().enumerate() {
    for (i, d) in dates.iter().enumerate() {
      closes[[i, j]] = asset[d];
    }
  }

  tracing::debug!(
    assets = series.len(),
    days = dates.len(),
    "aligned price history"
  );

  Ok(AlignedPrices {
    tickers: series.iter().map(|s| s.ticker.clone()).collect(),
    dates,
    closes,
  })
}

/// Scale a close series to `scale` at its first observation.
pub fn normalized_value(closes: &[f64], scale: f64) -> Vec<f64> {
  match closes.first() {
    Some(&first) if first > 0.0 => closes.iter().map(|c| c / first * scale).collect(),
    _ => Vec::new(),
  }
}

/// Per-asset value paths of `scale` invested on the first aligned day.
pub fn normalized_closes(aligned: &AlignedPrices, scale: f64) -> Array2<f64> {
  let first = aligned.closes.row(0).to_owned();
  let mut out = aligned.closes.clone();
  for mut row in out.axis_iter_mut(Axis(0)) {
    row.zip_mut_with(&first, |v, f| *v = *v / f * scale);
  }
  out
}
