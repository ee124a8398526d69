//! # Errors
//!
//! Error taxonomy for the allocator.

use thiserror::Error;

/// Result type alias for allocator operations.
pub type Result<T> = std::result::Result<T, AllocError>;

/// Failures surfaced by [`crate::allocator::Allocator`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocError {
  /// Upstream price source returned nothing usable for a ticker.
  #[error("price data unavailable for {ticker}: {reason}")]
  DataUnavailable { ticker: String, reason: String },

  /// Too few observations to compute a single return.
  #[error("insufficient history for {context}: need at least {required} observations, got {available}")]
  InsufficientHistory {
    context: String,
    required: usize,
    available: usize,
  },

  /// The assets share no trading dates in the requested range.
  #[error("no overlapping trading days across {assets} assets")]
  NoOverlap { assets: usize },

  /// The solver failed to reach a feasible optimum.
  #[error("optimization failed: {reason}")]
  OptimizationFailure { reason: String },

  /// Caller supplied malformed input.
  #[error("invalid input: {message}")]
  InvalidInput { message: String },
}

impl AllocError {
  pub fn data_unavailable(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
    Self::DataUnavailable {
      ticker: ticker.into(),
      reason: reason.into(),
    }
  }

  pub fn insufficient_history(context: impl Into<String>, available: usize) -> Self {
    Self::InsufficientHistory {
      context: context.into(),
      required: 2,
      available,
    }
  }

  pub fn optimization_failure(reason: impl Into<String>) -> Self {
    Self::OptimizationFailure {
      reason: reason.into(),
    }
  }

  pub fn invalid_input(message: impl Into<String>) -> Self {
    Self::InvalidInput {
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insufficient_history_message_names_the_asset() {
    let err = AllocError::insufficient_history("AAPL", 1);
    assert_eq!(
      err.to_string(),
      "insufficient history for AAPL: need at least 2 observations, got 1"
    );
  }
}
