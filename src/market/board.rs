//! Exchange-board rules for A-share securities.
//!
//! The daily price limit depends on the board, which is inferred from the
//! 6-digit code prefix. Limit prices are rounded to cents by the exchange,
//! so all comparisons run against the rounded ceiling.

use crate::models::Quote;

/// Price tolerance when comparing against the rounded limit price.
const PRICE_EPSILON: f64 = 0.001;

/// Tolerance on the reported change percentage versus the board limit.
const CHANGE_EPSILON: f64 = 0.005;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Board {
    /// Shanghai/Shenzhen main boards: ±10%.
    Main,
    /// STAR market (688): ±20%.
    Star,
    /// ChiNext (300/301): ±20%.
    ChiNext,
    /// Beijing Stock Exchange (43/83/87/920): ±30%.
    Beijing,
}

impl Board {
    pub fn daily_limit(&self) -> f64 {
        match self {
            Board::Main => 0.10,
            Board::Star | Board::ChiNext => 0.20,
            Board::Beijing => 0.30,
        }
    }

    /// Minimum plausible change_pct for a limit-up on this board.
    pub fn min_limit_change(&self) -> f64 {
        self.daily_limit() - CHANGE_EPSILON
    }
}

/// Infer the board from a 6-digit code.
pub fn board_of(code: &str) -> Board {
    if code.starts_with("688") {
        Board::Star
    } else if code.starts_with("300") || code.starts_with("301") {
        Board::ChiNext
    } else if code.starts_with("43")
        || code.starts_with("83")
        || code.starts_with("87")
        || code.starts_with("920")
    {
        Board::Beijing
    } else {
        Board::Main
    }
}

/// Exchange prefix (sh/sz/bj) derived from the code, never stored.
pub fn market_prefix(code: &str) -> &'static str {
    match board_of(code) {
        Board::Beijing => "bj",
        Board::Star => "sh",
        Board::ChiNext => "sz",
        Board::Main => {
            if code.starts_with('6') {
                "sh"
            } else {
                "sz"
            }
        }
    }
}

/// Strip a market prefix (sh/sz/bj, any case) from a code.
pub fn normalize_code(code: &str) -> String {
    let lower = code.to_ascii_lowercase();
    for prefix in ["sh", "sz", "bj"] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            return rest.to_string();
        }
    }
    code.to_string()
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// The rounded upper limit price for the day.
pub fn limit_up_ceiling(prev_close: f64, board: Board) -> f64 {
    round2(prev_close * (1.0 + board.daily_limit()))
}

/// The rounded lower limit price for the day.
pub fn limit_down_floor(prev_close: f64, board: Board) -> f64 {
    round2(prev_close * (1.0 - board.daily_limit()))
}

/// A quote is limit-up when its price reaches the rounded ceiling (within
/// epsilon) and its change is consistent with the board limit.
pub fn is_limit_up(code: &str, prev_close: f64, price: f64, change_pct: f64) -> bool {
    if prev_close <= 0.0 {
        return false;
    }
    let board = board_of(code);
    price >= limit_up_ceiling(prev_close, board) - PRICE_EPSILON
        && change_pct >= board.min_limit_change()
}

pub fn is_limit_down(code: &str, prev_close: f64, price: f64, change_pct: f64) -> bool {
    if prev_close <= 0.0 {
        return false;
    }
    let board = board_of(code);
    price <= limit_down_floor(prev_close, board) + PRICE_EPSILON
        && change_pct <= -board.min_limit_change()
}

/// Fill in the derived limit flags on a freshly parsed quote.
pub fn derive_limit_flags(quote: &mut Quote) {
    quote.is_limit_up = is_limit_up(&quote.code, quote.prev_close, quote.price, quote.change_pct);
    quote.is_limit_down =
        is_limit_down(&quote.code, quote.prev_close, quote.price, quote.change_pct);
}
