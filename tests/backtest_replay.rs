//! Backtest determinism and job lifecycle.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::watch;

use etfarb_backend::backtest::driver::{run_backtest, BacktestConfig, BacktestRun};
use etfarb_backend::backtest::history::snapshot;
use etfarb_backend::backtest::jobs::{JobStatus, ResultLookup};
use etfarb_backend::backtest::{Granularity, Interpolation};
use etfarb_backend::mapping::MappingStore;
use etfarb_backend::market::provider::{DailyBar, StaticMarketSource};

use common::{app_state, StaticHistory};

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// 600519 pins on Jan 3 and Jan 5; 601012 pins on Jan 5 only.
fn history() -> StaticHistory {
    let mut h = StaticHistory::default();

    let bar = |d: &str, prev: f64, close: f64| DailyBar {
        date: date(d),
        open: prev,
        close,
        prev_close: prev,
        volume: 1.0e6,
        amount: close * 2.0e7,
    };

    h.bars.insert(
        "600519".into(),
        vec![
            bar("2024-01-02", 1700.0, 1750.0),
            bar("2024-01-03", 1750.0, 1925.0),
            bar("2024-01-04", 1925.0, 1900.0),
            bar("2024-01-05", 1900.0, 2090.0),
        ],
    );
    h.bars.insert(
        "601012".into(),
        vec![
            bar("2024-01-02", 20.0, 20.5),
            bar("2024-01-03", 20.5, 21.0),
            bar("2024-01-04", 21.0, 21.5),
            bar("2024-01-05", 21.5, 23.65),
        ],
    );
    // The ETF trades every day with deep turnover.
    h.bars.insert(
        "510300".into(),
        vec![
            bar("2024-01-02", 3.9, 3.95),
            bar("2024-01-03", 3.95, 4.0),
            bar("2024-01-04", 4.0, 4.02),
            bar("2024-01-05", 4.02, 4.1),
        ],
    );

    h.snapshots.insert(
        date("2023-12-29"),
        vec![snapshot(
            "510300",
            "CSI 300 ETF",
            date("2023-12-29"),
            &[("600519", 0.085), ("601012", 0.06)],
        )],
    );
    h
}

fn config() -> BacktestConfig {
    BacktestConfig {
        start_date: date("2024-01-02"),
        end_date: date("2024-01-05"),
        granularity: Granularity::Daily,
        interpolation: Interpolation::Step,
        securities: Some(vec!["600519".into(), "601012".into()]),
        template: Some("balanced".into()),
        engine_config: None,
    }
}

#[tokio::test]
async fn replay_emits_signals_on_pinned_days_only() {
    let state = app_state(
        StaticMarketSource::new(),
        Arc::new(MappingStore::new()),
        Arc::new(history()),
    );
    let (_tx, cancel) = watch::channel(false);

    let run = run_backtest(
        &config(),
        &state.backtest_deps,
        vec![],
        vec!["510300".into()],
        |_| {},
        &cancel,
    )
    .await
    .unwrap();

    let BacktestRun::Completed(result) = run else {
        panic!("expected completion");
    };
    assert_eq!(result.statistics.total_signals, 3);
    assert_eq!(result.statistics.per_date_counts["2024-01-03"], 1);
    assert_eq!(result.statistics.per_date_counts["2024-01-05"], 2);
    assert!(!result.statistics.per_date_counts.contains_key("2024-01-02"));

    // Within a date, signals are ordered by stock code.
    let jan5: Vec<&str> = result
        .signals
        .iter()
        .filter(|s| s.timestamp.date() == date("2024-01-05"))
        .map(|s| s.stock_code.as_str())
        .collect();
    assert_eq!(jan5, vec!["600519", "601012"]);
}

#[tokio::test]
async fn rerun_is_deterministic() {
    let state = app_state(
        StaticMarketSource::new(),
        Arc::new(MappingStore::new()),
        Arc::new(history()),
    );
    let (_tx, cancel) = watch::channel(false);

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let run = run_backtest(
            &config(),
            &state.backtest_deps,
            vec![],
            vec!["510300".into()],
            |_| {},
            &cancel,
        )
        .await
        .unwrap();
        let BacktestRun::Completed(result) = run else {
            panic!("expected completion");
        };
        let tuples: Vec<(String, String, String, String)> = result
            .signals
            .iter()
            .map(|s| {
                (
                    s.timestamp.to_string(),
                    s.stock_code.clone(),
                    s.etf_code.clone(),
                    format!("{:.10}", s.confidence_score),
                )
            })
            .collect();
        outputs.push((tuples, serde_json::to_string(&result.signals).unwrap()));
    }

    assert_eq!(outputs[0].0, outputs[1].0);
    // Byte-identical signal sets.
    assert_eq!(outputs[0].1, outputs[1].1);
}

#[tokio::test]
async fn empty_date_range_fails_fast() {
    let state = app_state(
        StaticMarketSource::new(),
        Arc::new(MappingStore::new()),
        Arc::new(history()),
    );
    let (_tx, cancel) = watch::channel(false);

    let mut weekend = config();
    weekend.start_date = date("2024-01-06");
    weekend.end_date = date("2024-01-07");

    let result = run_backtest(
        &weekend,
        &state.backtest_deps,
        vec![],
        vec!["510300".into()],
        |_| {},
        &cancel,
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn pre_cancelled_run_discards_results() {
    let state = app_state(
        StaticMarketSource::new(),
        Arc::new(MappingStore::new()),
        Arc::new(history()),
    );
    let (tx, cancel) = watch::channel(false);
    tx.send(true).unwrap();

    let run = run_backtest(
        &config(),
        &state.backtest_deps,
        vec![],
        vec!["510300".into()],
        |_| {},
        &cancel,
    )
    .await
    .unwrap();
    assert!(matches!(run, BacktestRun::Cancelled));
}

#[tokio::test]
async fn job_store_tracks_a_full_run() {
    let state = app_state(
        StaticMarketSource::new(),
        Arc::new(MappingStore::new()),
        Arc::new(history()),
    );

    let job_id = state
        .jobs
        .start(
            config(),
            state.backtest_deps.clone(),
            vec![],
            vec!["510300".into()],
        )
        .unwrap();

    // Poll until the worker settles.
    let mut status = JobStatus::Queued;
    for _ in 0..100 {
        status = state.jobs.get(job_id).unwrap().status;
        if matches!(status, JobStatus::Completed | JobStatus::Failed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, JobStatus::Completed);

    let job = state.jobs.get(job_id).unwrap();
    assert!((job.progress - 1.0).abs() < 1e-9);
    assert!(job.started_at.is_some() && job.finished_at.is_some());

    match state.jobs.result(job_id) {
        ResultLookup::Ready(result) => {
            assert_eq!(result.statistics.total_signals, 3);
            assert_eq!(
                result.statistics.high_confidence_count
                    + result.statistics.medium_confidence_count
                    + result.statistics.low_confidence_count,
                3
            );
        }
        _ => panic!("result should be ready"),
    }

    let signals = state.jobs.signals(job_id).unwrap();
    assert_eq!(signals.len(), 3);
}

#[tokio::test]
async fn linear_interpolation_changes_weights_between_snapshots() {
    let mut h = history();
    h.snapshots.insert(
        date("2024-01-08"),
        vec![snapshot(
            "510300",
            "CSI 300 ETF",
            date("2024-01-08"),
            &[("600519", 0.085), ("601012", 0.02)],
        )],
    );
    let state = app_state(
        StaticMarketSource::new(),
        Arc::new(MappingStore::new()),
        Arc::new(h),
    );
    let (_tx, cancel) = watch::channel(false);

    let mut cfg = config();
    cfg.interpolation = Interpolation::Linear;

    let run = run_backtest(
        &cfg,
        &state.backtest_deps,
        vec![],
        vec!["510300".into()],
        |_| {},
        &cancel,
    )
    .await
    .unwrap();
    let BacktestRun::Completed(result) = run else {
        panic!("expected completion");
    };

    // 601012's weight decays toward 0.02 across the window; by Jan 5 it is
    // under the 0.05 floor, so only 600519 signals that day.
    let jan5: BTreeMap<&str, f64> = result
        .signals
        .iter()
        .filter(|s| s.timestamp.date() == date("2024-01-05"))
        .map(|s| (s.stock_code.as_str(), s.weight))
        .collect();
    assert!(jan5.contains_key("600519"));
    assert!(!jan5.contains_key("601012"));
}
