//! # portfolio-alloc
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}\ge 0,\ \mathbf{1}^\top\mathbf{w}=1} \frac{\mathbf{w}^\top\mu-r_f}{\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}}
//! $$
//!
//! Long-only budget allocation across a handful of stocks from their daily
//! closing prices.
//!
//! ```ignore
//! use portfolio_alloc::allocator::Allocator;
//!
//! let result = Allocator::default().optimize(&series, 10_000.0)?;
//! for (ticker, dollars) in result.tickers.iter().zip(&result.allocation) {
//!   println!("{ticker}: ${dollars:.2}");
//! }
//! ```

pub mod allocator;
pub mod data;
pub mod error;
pub mod optimizer;
pub mod stats;
pub mod types;

pub use allocator::Allocator;
pub use allocator::AllocatorConfig;
pub use data::PricePoint;
pub use data::PriceSeries;
pub use data::PriceSource;
pub use error::AllocError;
pub use error::Result;
pub use optimizer::Objective;
pub use types::PortfolioResult;
pub use types::WeightVector;
