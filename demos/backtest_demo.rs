//! Backtest Demo
//!
//! Runs a small deterministic replay over synthetic history and prints the
//! per-date signal counts.
//!
//! Run with:
//!   cargo run --example backtest_demo

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::watch;

use etfarb_backend::backtest::driver::{run_backtest, BacktestConfig, BacktestDeps, BacktestRun};
use etfarb_backend::backtest::history::snapshot;
use etfarb_backend::backtest::{Granularity, Interpolation};
use etfarb_backend::config::Config;
use etfarb_backend::market::provider::{DailyBar, HistoryProvider};
use etfarb_backend::models::EtfHoldings;
use etfarb_backend::registry::Registries;

struct DemoHistory {
    bars: BTreeMap<String, Vec<DailyBar>>,
    snapshots: BTreeMap<NaiveDate, Vec<EtfHoldings>>,
}

#[async_trait]
impl HistoryProvider for DemoHistory {
    async fn daily_bars(
        &self,
        code: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> anyhow::Result<Vec<DailyBar>> {
        Ok(self.bars.get(code).cloned().unwrap_or_default())
    }

    async fn holdings_snapshots(
        &self,
        _etf_codes: &[String],
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> anyhow::Result<BTreeMap<NaiveDate, Vec<EtfHoldings>>> {
        Ok(self.snapshots.clone())
    }
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn bar(d: &str, prev: f64, close: f64) -> DailyBar {
    DailyBar {
        date: date(d),
        open: prev,
        close,
        prev_close: prev,
        volume: 1.0e6,
        amount: close * 2.0e7,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== ETF Arbitrage Backtest Demo ===\n");

    let mut bars = BTreeMap::new();
    // 600519 pins at +10% on Jan 3 and Jan 5.
    bars.insert(
        "600519".to_string(),
        vec![
            bar("2024-01-02", 1700.0, 1750.0),
            bar("2024-01-03", 1750.0, 1925.0),
            bar("2024-01-04", 1925.0, 1900.0),
            bar("2024-01-05", 1900.0, 2090.0),
        ],
    );
    bars.insert(
        "510300".to_string(),
        vec![
            bar("2024-01-02", 3.9, 3.95),
            bar("2024-01-03", 3.95, 4.0),
            bar("2024-01-04", 4.0, 4.02),
            bar("2024-01-05", 4.02, 4.1),
        ],
    );

    let mut snapshots = BTreeMap::new();
    snapshots.insert(
        date("2023-12-29"),
        vec![snapshot(
            "510300",
            "CSI 300 ETF",
            date("2023-12-29"),
            &[("600519", 0.085)],
        )],
    );

    let deps = BacktestDeps {
        base_config: Config::from_env()?,
        registries: Arc::new(Registries::with_builtins()),
        history: Arc::new(DemoHistory { bars, snapshots }),
    };

    let config = BacktestConfig {
        start_date: date("2024-01-02"),
        end_date: date("2024-01-05"),
        granularity: Granularity::Daily,
        interpolation: Interpolation::Step,
        securities: Some(vec!["600519".to_string()]),
        template: Some("balanced".to_string()),
        engine_config: None,
    };

    let (_cancel_tx, cancel_rx) = watch::channel(false);
    let run = run_backtest(
        &config,
        &deps,
        vec![],
        vec!["510300".to_string()],
        |fraction| println!("progress: {:.0}%", fraction * 100.0),
        &cancel_rx,
    )
    .await?;

    match run {
        BacktestRun::Completed(result) => {
            println!("\ntotal signals: {}", result.statistics.total_signals);
            println!(
                "high/medium/low: {}/{}/{}",
                result.statistics.high_confidence_count,
                result.statistics.medium_confidence_count,
                result.statistics.low_confidence_count
            );
            println!("\nper-date counts:");
            for (day, count) in &result.statistics.per_date_counts {
                println!("  {day}: {count}");
            }
            println!("\nsignals:");
            for signal in &result.signals {
                println!(
                    "  {} {} -> {} ({}, {:.2}) [{}]",
                    signal.timestamp,
                    signal.stock_code,
                    signal.etf_code,
                    signal.confidence_level.as_str(),
                    signal.confidence_score,
                    signal.reason
                );
            }
        }
        BacktestRun::Cancelled => println!("cancelled"),
    }

    Ok(())
}
