//! Backtest job tracking.
//!
//! Jobs live in memory for the server's lifetime. A worker task owns each
//! run; cancellation is a cooperative signal the driver checks between
//! dates.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

use crate::backtest::driver::{
    run_backtest, BacktestConfig, BacktestDeps, BacktestResult, BacktestRun,
};
use crate::models::TradingSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Clone, Serialize)]
pub struct BacktestJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: f64,
    pub message: String,
    pub config: BacktestConfig,
    pub created_at: NaiveDateTime,
    pub started_at: Option<NaiveDateTime>,
    pub finished_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Served through the result endpoint, not the job view.
    #[serde(skip)]
    pub result: Option<BacktestResult>,
}

pub enum ResultLookup {
    NotFound,
    NotReady(JobStatus),
    Ready(Box<BacktestResult>),
}

struct JobEntry {
    job: BacktestJob,
    cancel: watch::Sender<bool>,
}

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
}

impl JobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Validate, enqueue and begin executing a backtest. Returns the job id
    /// immediately; progress flows into the store as the worker advances.
    pub fn start(
        self: &Arc<Self>,
        config: BacktestConfig,
        deps: Arc<BacktestDeps>,
        watchlist_codes: Vec<String>,
        etf_universe: Vec<String>,
    ) -> Result<Uuid> {
        config.validate()?;

        let job_id = Uuid::new_v4();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let job = BacktestJob {
            job_id,
            status: JobStatus::Queued,
            progress: 0.0,
            message: "queued".to_string(),
            config: config.clone(),
            created_at: Local::now().naive_local(),
            started_at: None,
            finished_at: None,
            error: None,
            result: None,
        };
        self.jobs.write().insert(
            job_id,
            JobEntry {
                job,
                cancel: cancel_tx,
            },
        );

        let store = self.clone();
        tokio::spawn(async move {
            store.run_job(job_id, config, deps, watchlist_codes, etf_universe, cancel_rx)
                .await;
        });

        Ok(job_id)
    }

    async fn run_job(
        self: Arc<Self>,
        job_id: Uuid,
        config: BacktestConfig,
        deps: Arc<BacktestDeps>,
        watchlist_codes: Vec<String>,
        etf_universe: Vec<String>,
        cancel: watch::Receiver<bool>,
    ) {
        self.update(job_id, |job| {
            job.status = JobStatus::Running;
            job.message = "running".to_string();
            job.started_at = Some(Local::now().naive_local());
        });

        let progress_store = self.clone();
        let outcome = run_backtest(
            &config,
            &deps,
            watchlist_codes,
            etf_universe,
            move |fraction| {
                progress_store.update(job_id, |job| {
                    job.progress = fraction;
                    job.message = format!("{:.0}% of dates replayed", fraction * 100.0);
                });
            },
            &cancel,
        )
        .await;

        let finished = Some(Local::now().naive_local());
        match outcome {
            Ok(BacktestRun::Completed(result)) => {
                info!(%job_id, signals = result.statistics.total_signals, "backtest job completed");
                self.update(job_id, |job| {
                    job.status = JobStatus::Completed;
                    job.progress = 1.0;
                    job.message = "completed".to_string();
                    job.finished_at = finished;
                    job.result = Some(result.clone());
                });
            }
            Ok(BacktestRun::Cancelled) => {
                self.update(job_id, |job| {
                    job.status = JobStatus::Cancelled;
                    job.message = "cancelled".to_string();
                    job.finished_at = finished;
                    job.result = None;
                });
            }
            Err(e) => {
                error!(%job_id, error = %e, "backtest job failed");
                self.update(job_id, |job| {
                    job.status = JobStatus::Failed;
                    job.message = "failed".to_string();
                    job.finished_at = finished;
                    job.error = Some(e.to_string());
                });
            }
        }
    }

    fn update(&self, job_id: Uuid, mutate: impl FnOnce(&mut BacktestJob)) {
        if let Some(entry) = self.jobs.write().get_mut(&job_id) {
            mutate(&mut entry.job);
        }
    }

    pub fn get(&self, job_id: Uuid) -> Option<BacktestJob> {
        self.jobs.read().get(&job_id).map(|e| e.job.clone())
    }

    pub fn result(&self, job_id: Uuid) -> ResultLookup {
        match self.jobs.read().get(&job_id) {
            None => ResultLookup::NotFound,
            Some(entry) => match &entry.job.result {
                Some(result) => ResultLookup::Ready(Box::new(result.clone())),
                None => ResultLookup::NotReady(entry.job.status),
            },
        }
    }

    pub fn signals(&self, job_id: Uuid) -> Option<Vec<TradingSignal>> {
        self.jobs
            .read()
            .get(&job_id)
            .map(|e| e.job.result.as_ref().map(|r| r.signals.clone()).unwrap_or_default())
    }

    /// Newest-first job listing.
    pub fn list(&self, limit: usize, offset: usize, status: Option<JobStatus>) -> Vec<BacktestJob> {
        let jobs = self.jobs.read();
        let mut listed: Vec<BacktestJob> = jobs
            .values()
            .map(|e| e.job.clone())
            .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.job_id.cmp(&a.job_id)));
        listed.into_iter().skip(offset).take(limit).collect()
    }

    /// Cancel a queued/running job, or delete a finished one. False when
    /// the id is unknown.
    pub fn cancel(&self, job_id: Uuid) -> bool {
        let mut jobs = self.jobs.write();
        let Some(entry) = jobs.get(&job_id) else {
            return false;
        };
        match entry.job.status {
            JobStatus::Queued | JobStatus::Running => {
                let _ = entry.cancel.send(true);
                true
            }
            _ => {
                jobs.remove(&job_id);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::clock::Granularity;
    use crate::backtest::history::Interpolation;

    fn config() -> BacktestConfig {
        BacktestConfig {
            start_date: "2024-01-02".parse().unwrap(),
            end_date: "2024-01-05".parse().unwrap(),
            granularity: Granularity::Daily,
            interpolation: Interpolation::Step,
            securities: Some(vec!["600519".into()]),
            template: None,
            engine_config: None,
        }
    }

    fn job(status: JobStatus, created_at: &str) -> BacktestJob {
        BacktestJob {
            job_id: Uuid::new_v4(),
            status,
            progress: 0.0,
            message: String::new(),
            config: config(),
            created_at: created_at.parse().unwrap(),
            started_at: None,
            finished_at: None,
            error: None,
            result: None,
        }
    }

    fn insert(store: &JobStore, job: BacktestJob) -> Uuid {
        let id = job.job_id;
        let (cancel, _) = watch::channel(false);
        store.jobs.write().insert(id, JobEntry { job, cancel });
        id
    }

    #[test]
    fn list_is_newest_first_and_filterable() {
        let store = JobStore::default();
        insert(&store, job(JobStatus::Completed, "2026-03-05T10:00:00"));
        insert(&store, job(JobStatus::Running, "2026-03-05T11:00:00"));
        insert(&store, job(JobStatus::Failed, "2026-03-05T12:00:00"));

        let all = store.list(10, 0, None);
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].status, JobStatus::Failed);
        assert_eq!(all[2].status, JobStatus::Completed);

        let running = store.list(10, 0, Some(JobStatus::Running));
        assert_eq!(running.len(), 1);

        let paged = store.list(1, 1, None);
        assert_eq!(paged.len(), 1);
        assert_eq!(paged[0].status, JobStatus::Running);
    }

    #[test]
    fn result_lookup_states() {
        let store = JobStore::default();
        assert!(matches!(store.result(Uuid::new_v4()), ResultLookup::NotFound));

        let id = insert(&store, job(JobStatus::Running, "2026-03-05T10:00:00"));
        assert!(matches!(
            store.result(id),
            ResultLookup::NotReady(JobStatus::Running)
        ));
    }

    #[test]
    fn cancel_semantics() {
        let store = JobStore::default();
        assert!(!store.cancel(Uuid::new_v4()));

        let running = insert(&store, job(JobStatus::Running, "2026-03-05T10:00:00"));
        assert!(store.cancel(running));
        // A cancel request does not remove a live job.
        assert!(store.get(running).is_some());

        let done = insert(&store, job(JobStatus::Completed, "2026-03-05T11:00:00"));
        assert!(store.cancel(done));
        assert!(store.get(done).is_none());
    }

    #[test]
    fn job_view_omits_result_payload() {
        let j = job(JobStatus::Completed, "2026-03-05T10:00:00");
        let json = serde_json::to_value(&j).unwrap();
        assert!(json.get("result").is_none());
        assert_eq!(json["status"], "completed");
    }
}
