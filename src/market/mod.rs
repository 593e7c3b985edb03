//! Market-structure knowledge and the data-provider boundary.

pub mod board;
pub mod calendar;
pub mod provider;

pub use board::{board_of, limit_up_ceiling, market_prefix, normalize_code, Board};
pub use calendar::TradingCalendar;
pub use provider::{HistoryProvider, HoldingsProvider, QuoteProvider, StaticMarketSource};
