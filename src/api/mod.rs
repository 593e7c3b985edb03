//! HTTP control plane.

pub mod backtest_api;
pub mod error;
pub mod market_api;
pub mod middleware;
pub mod monitor_api;
pub mod routes;
pub mod signals_api;
pub mod strategy_api;
pub mod watchlist_api;

pub use error::{ApiError, ErrorKind};
pub use routes::{create_router, AppState};
