//! Notification boundary: a sender accepts a finished signal.

use anyhow::Result;
use tracing::info;

use crate::models::TradingSignal;

pub trait SignalSender: Send + Sync {
    fn name(&self) -> &'static str;

    fn send(&self, signal: &TradingSignal) -> Result<()>;
}

/// Writes the signal to the structured log. The default sink when no
/// external channel is configured.
pub struct LogSender;

impl SignalSender for LogSender {
    fn name(&self) -> &'static str {
        "log"
    }

    fn send(&self, signal: &TradingSignal) -> Result<()> {
        info!(
            stock = %signal.stock_code,
            etf = %signal.etf_code,
            confidence = signal.confidence_score,
            risk = signal.risk_level.as_str(),
            "signal: {}",
            signal.reason
        );
        Ok(())
    }
}
