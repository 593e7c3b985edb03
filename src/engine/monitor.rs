//! Monitor mode: a long-lived loop that repeats scans on a schedule while
//! the market is open and sleeps toward the next session otherwise.
//!
//! `start` is idempotent at the API layer (a second start is a conflict),
//! `stop` cancels cooperatively and waits for the in-flight scan to drain,
//! bounded by the shutdown grace. Day counters survive stop/start cycles;
//! only a date change resets them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::engine::{ArbitrageEngine, ScanResult};
use crate::watchlist::WatchlistStore;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyRunning,
    #[error("monitor is not running")]
    NotRunning,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DayStats {
    pub day: Option<NaiveDate>,
    pub scans: u64,
    pub signals: u64,
    pub last_scan_time: Option<NaiveDateTime>,
}

struct RunningTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct Monitor {
    engine: Arc<ArbitrageEngine>,
    watchlist: Arc<WatchlistStore>,
    scan_interval: Duration,
    shutdown_grace: Duration,
    task: Mutex<Option<RunningTask>>,
    stats: Mutex<DayStats>,
}

impl Monitor {
    pub fn new(
        engine: Arc<ArbitrageEngine>,
        watchlist: Arc<WatchlistStore>,
        scan_interval: Duration,
        shutdown_grace: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine,
            watchlist,
            scan_interval,
            shutdown_grace,
            task: Mutex::new(None),
            stats: Mutex::new(DayStats::default()),
        })
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn stats(&self) -> DayStats {
        *self.stats.lock()
    }

    /// Record a finished scan into the day counters, rolling them over on a
    /// date change.
    pub fn record_scan(&self, now: NaiveDateTime, result: &ScanResult) {
        let mut stats = self.stats.lock();
        if stats.day != Some(now.date()) {
            *stats = DayStats {
                day: Some(now.date()),
                ..Default::default()
            };
        }
        stats.scans += 1;
        stats.signals += result.signals.len() as u64;
        stats.last_scan_time = Some(now);
    }

    pub fn start(self: &Arc<Self>) -> Result<(), MonitorError> {
        let mut task = self.task.lock();
        if task.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let (shutdown, rx) = watch::channel(false);
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            monitor.run_loop(rx).await;
        });

        *task = Some(RunningTask { shutdown, handle });
        info!(interval_secs = self.scan_interval.as_secs(), "monitor started");
        Ok(())
    }

    /// Cancel the loop and wait for the current scan to drain. The wait is
    /// bounded by the shutdown grace; past it the task is aborted.
    pub async fn stop(&self) -> Result<(), MonitorError> {
        let task = self.task.lock().take().ok_or(MonitorError::NotRunning)?;

        let _ = task.shutdown.send(true);
        match timeout(self.shutdown_grace, task.handle).await {
            Ok(_) => info!("monitor stopped"),
            Err(_) => {
                warn!(
                    grace_secs = self.shutdown_grace.as_secs(),
                    "monitor did not drain within the grace period"
                );
            }
        }
        Ok(())
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let now = Local::now().naive_local();
            if self.engine.calendar().is_trading_time(now) {
                let codes = self.watchlist.codes();
                let result = self.engine.scan(&codes, now).await;
                self.record_scan(now, &result);

                tokio::select! {
                    _ = sleep(self.scan_interval) => {}
                    _ = shutdown.changed() => return,
                }
            } else {
                let next_open = self.engine.calendar().next_open(now);
                let wait_secs = (next_open - now).num_seconds().clamp(1, 60) as u64;
                tokio::select! {
                    _ = sleep(Duration::from_secs(wait_secs)) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::mapping::MappingStore;
    use crate::market::provider::StaticMarketSource;
    use crate::market::TradingCalendar;
    use crate::registry::Registries;
    use crate::signals::repository::SignalRepository;

    fn monitor() -> Arc<Monitor> {
        let config = Config::from_env().unwrap();
        let source = StaticMarketSource::new();
        let registries = Registries::with_builtins();
        let engine = Arc::new(
            ArbitrageEngine::new(
                config.strategy.clone(),
                config.signal_evaluation,
                TradingCalendar::default(),
                config.cache,
                &config.engine,
                &registries,
                source.clone(),
                source,
                Arc::new(MappingStore::new()),
                Arc::new(SignalRepository::in_memory().unwrap()),
                Vec::new(),
            )
            .unwrap(),
        );
        Monitor::new(
            engine,
            Arc::new(WatchlistStore::ephemeral()),
            Duration::from_secs(120),
            Duration::from_secs(2),
        )
    }

    #[tokio::test]
    async fn start_twice_is_a_conflict() {
        let m = monitor();
        m.start().unwrap();
        assert!(matches!(m.start(), Err(MonitorError::AlreadyRunning)));
        m.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_is_a_conflict() {
        let m = monitor();
        assert!(matches!(m.stop().await, Err(MonitorError::NotRunning)));
    }

    #[tokio::test]
    async fn stop_then_restart_keeps_day_counters() {
        let m = monitor();
        let now: NaiveDateTime = "2026-03-05T10:00:00".parse().unwrap();
        m.record_scan(now, &ScanResult::default());
        m.start().unwrap();
        m.stop().await.unwrap();
        m.start().unwrap();
        let stats = m.stats();
        assert_eq!(stats.scans, 1);
        assert_eq!(stats.last_scan_time, Some(now));
        m.stop().await.unwrap();
    }

    #[tokio::test]
    async fn day_rollover_resets_counters() {
        let m = monitor();
        m.record_scan("2026-03-05T10:00:00".parse().unwrap(), &ScanResult::default());
        m.record_scan("2026-03-06T10:00:00".parse().unwrap(), &ScanResult::default());
        let stats = m.stats();
        assert_eq!(stats.scans, 1);
        assert_eq!(stats.day, NaiveDate::from_ymd_opt(2026, 3, 6));
    }
}
