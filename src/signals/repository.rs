//! SQLite-backed signal store.
//!
//! WAL mode for concurrent reads during writes, prepared-statement caching,
//! and covering indexes for the common listing patterns. Rowids are the
//! signal ids: AUTOINCREMENT keeps them strictly monotonic across all
//! writers for the lifetime of the database.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{info, warn};

use crate::models::{ConfidenceLevel, RiskLevel, ScoreBreakdown, TradingSignal};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA temp_store = MEMORY;

CREATE TABLE IF NOT EXISTS signals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    stock_code TEXT NOT NULL,
    stock_name TEXT NOT NULL,
    etf_code TEXT NOT NULL,
    etf_name TEXT NOT NULL,
    weight REAL NOT NULL,
    event_type TEXT NOT NULL,
    confidence_level TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    risk_level TEXT NOT NULL,
    reason TEXT NOT NULL,
    payload_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_signals_timestamp ON signals(timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_signals_stock ON signals(stock_code, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_signals_etf ON signals(etf_code, timestamp DESC);
"#;

/// Listing filters. All optional; `limit` defaults to 100.
#[derive(Debug, Clone, Default)]
pub struct SignalQuery {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
    pub stock_code: Option<String>,
    pub etf_code: Option<String>,
    pub event_type: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub struct SignalRepository {
    conn: Mutex<Connection>,
}

impl SignalRepository {
    pub fn open(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("failed to open signal database at {}", db_path))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize signal schema")?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM signals", [], |row| row.get(0))
            .unwrap_or(0);
        info!(path = db_path, existing = count, "signal repository ready");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize signal schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert and return the assigned monotonic id. One retry on failure;
    /// a signal that still fails is reported as not persisted.
    pub fn insert(&self, signal: &TradingSignal) -> Result<i64> {
        match self.insert_once(signal) {
            Ok(id) => Ok(id),
            Err(first) => {
                warn!(stock = %signal.stock_code, error = %first, "signal insert failed, retrying once");
                self.insert_once(signal)
            }
        }
    }

    fn insert_once(&self, signal: &TradingSignal) -> Result<i64> {
        let payload_json =
            serde_json::to_string(signal).context("failed to serialize signal payload")?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO signals
             (timestamp, stock_code, stock_name, etf_code, etf_name, weight, event_type,
              confidence_level, confidence_score, risk_level, reason, payload_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                signal.timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
                signal.stock_code,
                signal.stock_name,
                signal.etf_code,
                signal.etf_name,
                signal.weight,
                signal.event_type,
                signal.confidence_level.as_str(),
                signal.confidence_score,
                signal.risk_level.as_str(),
                signal.reason,
                payload_json,
            ],
        )
        .context("signal insert failed")?;
        Ok(conn.last_insert_rowid())
    }

    /// Newest-first listing (strictly decreasing id).
    pub fn list(&self, query: &SignalQuery) -> Result<Vec<TradingSignal>> {
        let (where_sql, args) = Self::build_where(query);
        let limit = query.limit.unwrap_or(100);
        let offset = query.offset.unwrap_or(0);
        let sql = format!(
            "SELECT id, payload_json FROM signals {} ORDER BY id DESC LIMIT {} OFFSET {}",
            where_sql, limit, offset
        );

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), Self::row_to_signal)?;
        let mut signals = Vec::new();
        for row in rows {
            signals.push(row?);
        }
        Ok(signals)
    }

    pub fn get(&self, id: i64) -> Result<Option<TradingSignal>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT id, payload_json FROM signals WHERE id = ?1")?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_signal(row)?)),
            None => Ok(None),
        }
    }

    pub fn count(&self, query: &SignalQuery) -> Result<i64> {
        let (where_sql, args) = Self::build_where(query);
        let sql = format!("SELECT COUNT(*) FROM signals {}", where_sql);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&sql)?;
        let count =
            stmt.query_row(rusqlite::params_from_iter(args.iter()), |row| row.get(0))?;
        Ok(count)
    }

    /// Signals stamped on the given calendar date.
    pub fn count_on(&self, date: NaiveDate) -> Result<i64> {
        let start = date.and_hms_opt(0, 0, 0).unwrap();
        let end = date.and_hms_opt(23, 59, 59).unwrap();
        self.count(&SignalQuery {
            start: Some(start),
            end: Some(end),
            ..Default::default()
        })
    }

    /// Per-date signal counts inside a range, for backtest statistics.
    pub fn counts_by_date(&self) -> Result<BTreeMap<String, i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT substr(timestamp, 1, 10) AS day, COUNT(*) FROM signals GROUP BY day",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (day, count) = row?;
            counts.insert(day, count);
        }
        Ok(counts)
    }

    fn build_where(query: &SignalQuery) -> (String, Vec<String>) {
        let mut clauses = Vec::new();
        let mut args = Vec::new();
        if let Some(start) = query.start {
            clauses.push("timestamp >= ?".to_string());
            args.push(start.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
        if let Some(end) = query.end {
            clauses.push("timestamp <= ?".to_string());
            args.push(end.format("%Y-%m-%dT%H:%M:%S").to_string());
        }
        if let Some(code) = &query.stock_code {
            clauses.push("stock_code = ?".to_string());
            args.push(code.clone());
        }
        if let Some(code) = &query.etf_code {
            clauses.push("etf_code = ?".to_string());
            args.push(code.clone());
        }
        if let Some(event_type) = &query.event_type {
            clauses.push("event_type = ?".to_string());
            args.push(event_type.clone());
        }
        if clauses.is_empty() {
            (String::new(), args)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), args)
        }
    }

    fn row_to_signal(row: &rusqlite::Row) -> rusqlite::Result<TradingSignal> {
        let id: i64 = row.get(0)?;
        let payload: String = row.get(1)?;
        let mut signal: TradingSignal = serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        signal.id = Some(id);
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(code: &str, ts: &str) -> TradingSignal {
        TradingSignal {
            id: None,
            timestamp: ts.parse().unwrap(),
            stock_code: code.into(),
            stock_name: "Test".into(),
            stock_price: 10.0,
            etf_code: "510300".into(),
            etf_name: "CSI 300 ETF".into(),
            weight: 0.08,
            event_type: "limit_up".into(),
            confidence_level: ConfidenceLevel::High,
            confidence_score: 0.82,
            risk_level: RiskLevel::Medium,
            reason: "test reason".into(),
            breakdown: ScoreBreakdown {
                order: 1.0,
                weight: 0.8,
                liquidity: 1.0,
                time: 0.5,
            },
        }
    }

    #[test]
    fn insert_assigns_strictly_increasing_ids() {
        let repo = SignalRepository::in_memory().unwrap();
        let a = repo.insert(&signal("600519", "2026-03-05T14:05:00")).unwrap();
        let b = repo.insert(&signal("601012", "2026-03-05T14:06:00")).unwrap();
        let c = repo.insert(&signal("600036", "2026-03-05T14:07:00")).unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn list_is_newest_first_by_id() {
        let repo = SignalRepository::in_memory().unwrap();
        for i in 0..5 {
            repo.insert(&signal(&format!("60051{i}"), "2026-03-05T14:05:00"))
                .unwrap();
        }
        let listed = repo.list(&SignalQuery::default()).unwrap();
        let ids: Vec<i64> = listed.iter().map(|s| s.id.unwrap()).collect();
        let mut sorted = ids.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(ids, sorted);
        assert_eq!(ids.len(), 5);
    }

    #[test]
    fn round_trip_preserves_fields() {
        let repo = SignalRepository::in_memory().unwrap();
        let original = signal("600519", "2026-03-05T14:05:00");
        let id = repo.insert(&original).unwrap();
        let loaded = repo.get(id).unwrap().expect("signal exists");
        assert_eq!(loaded.stock_code, original.stock_code);
        assert_eq!(loaded.etf_code, original.etf_code);
        assert_eq!(loaded.confidence_level, original.confidence_level);
        assert!((loaded.breakdown.weight - 0.8).abs() < 1e-12);
        assert_eq!(loaded.id, Some(id));
    }

    #[test]
    fn get_missing_returns_none() {
        let repo = SignalRepository::in_memory().unwrap();
        assert!(repo.get(42).unwrap().is_none());
    }

    #[test]
    fn filters_apply() {
        let repo = SignalRepository::in_memory().unwrap();
        repo.insert(&signal("600519", "2026-03-05T10:00:00")).unwrap();
        repo.insert(&signal("601012", "2026-03-05T14:00:00")).unwrap();
        repo.insert(&signal("600519", "2026-03-06T10:00:00")).unwrap();

        let by_stock = repo
            .list(&SignalQuery {
                stock_code: Some("600519".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_stock.len(), 2);

        let by_range = repo
            .list(&SignalQuery {
                start: Some("2026-03-05T00:00:00".parse().unwrap()),
                end: Some("2026-03-05T23:59:59".parse().unwrap()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(by_range.len(), 2);

        assert_eq!(
            repo.count_on(NaiveDate::from_ymd_opt(2026, 3, 6).unwrap())
                .unwrap(),
            1
        );
    }

    #[test]
    fn limit_and_offset_paginate() {
        let repo = SignalRepository::in_memory().unwrap();
        for i in 0..10 {
            repo.insert(&signal(&format!("6005{:02}", i), "2026-03-05T14:05:00"))
                .unwrap();
        }
        let page = repo
            .list(&SignalQuery {
                limit: Some(3),
                offset: Some(3),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].id, Some(7));
    }
}
