//! Deterministic backtesting: replay the scan pipeline over a historical
//! window with a pinned clock, job-tracked.

pub mod clock;
pub mod driver;
pub mod history;
pub mod jobs;
pub mod templates;

pub use clock::{Granularity, SimClock};
pub use driver::{
    run_backtest, BacktestConfig, BacktestDeps, BacktestResult, BacktestRun, BacktestStatistics,
};
pub use history::{HistoricalQuoteSource, HoldingsTimeline, Interpolation};
pub use jobs::{BacktestJob, JobStatus, JobStore, ResultLookup};
pub use templates::StrategyTemplate;
