//! Stock ↔ ETF mapping store.
//!
//! The inversion `stock_code -> [etfs holding it]` built from ETF top-10
//! holdings. Readers clone an `Arc` snapshot; a rebuild assembles the new
//! mapping off to the side and swaps it in atomically, so a failed rebuild
//! never clobbers the previous snapshot.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::market::provider::HoldingsProvider;
use crate::models::CandidateEtf;

/// One mapped ETF under a stock. Sorted by weight descending within a
/// stock's list; etf_code unique within the list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappedEtf {
    pub etf_code: String,
    pub etf_name: String,
    pub weight: f64,
    pub rank: u32,
    #[serde(default)]
    pub top10_ratio: f64,
}

impl MappedEtf {
    pub fn to_candidate(&self) -> CandidateEtf {
        CandidateEtf {
            etf_code: self.etf_code.clone(),
            etf_name: self.etf_name.clone(),
            weight: self.weight,
            rank: self.rank,
            top10_ratio: self.top10_ratio,
            daily_amount: 0.0,
            quote: None,
        }
    }
}

/// The persistable document: `{stock_code: [mapped etfs]}`.
pub type MappingDocument = BTreeMap<String, Vec<MappedEtf>>;

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RebuildSummary {
    pub etfs_fetched: usize,
    pub etfs_failed: usize,
    pub stocks_covered: usize,
}

pub struct MappingStore {
    snapshot: RwLock<Arc<MappingDocument>>,
}

impl Default for MappingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingStore {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(BTreeMap::new())),
        }
    }

    pub fn from_document(document: MappingDocument) -> Self {
        let store = Self::new();
        store.replace(document);
        store
    }

    /// ETFs holding the stock, heaviest first. Empty when unmapped.
    pub fn etfs_for(&self, stock_code: &str) -> Vec<MappedEtf> {
        self.snapshot
            .read()
            .get(stock_code)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains(&self, stock_code: &str) -> bool {
        self.snapshot.read().contains_key(stock_code)
    }

    pub fn stock_codes(&self) -> Vec<String> {
        self.snapshot.read().keys().cloned().collect()
    }

    /// Distinct ETF codes anywhere in the mapping.
    pub fn etf_codes(&self) -> Vec<String> {
        let snapshot = self.snapshot.read();
        let mut codes: Vec<String> = snapshot
            .values()
            .flatten()
            .map(|e| e.etf_code.clone())
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }

    pub fn len(&self) -> usize {
        self.snapshot.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.read().is_empty()
    }

    /// Swap in a new document after normalizing it (sort + dedup).
    pub fn replace(&self, mut document: MappingDocument) {
        for etfs in document.values_mut() {
            normalize_entry(etfs);
        }
        *self.snapshot.write() = Arc::new(document);
    }

    /// Invert the holdings of `etf_codes` into a fresh mapping and commit
    /// it atomically. Individual fetch failures are skipped and counted;
    /// if every fetch fails the previous snapshot is left untouched.
    pub async fn rebuild(
        &self,
        etf_codes: &[String],
        provider: &dyn HoldingsProvider,
        min_weight_epsilon: f64,
    ) -> Result<RebuildSummary> {
        let mut document: MappingDocument = BTreeMap::new();
        let mut summary = RebuildSummary::default();

        for etf_code in etf_codes {
            let holdings = match provider.top_holdings(etf_code).await {
                Ok(h) => h,
                Err(e) => {
                    warn!(etf = %etf_code, error = %e, "holdings fetch failed, skipping");
                    summary.etfs_failed += 1;
                    continue;
                }
            };
            summary.etfs_fetched += 1;
            let top10_ratio = holdings.top10_ratio();

            for holding in holdings.holdings.iter().take(10) {
                if holding.weight < min_weight_epsilon {
                    continue;
                }
                document
                    .entry(holding.stock_code.clone())
                    .or_default()
                    .push(MappedEtf {
                        etf_code: holdings.etf_code.clone(),
                        etf_name: holdings.etf_name.clone(),
                        weight: holding.weight,
                        rank: holding.rank,
                        top10_ratio,
                    });
            }
        }

        if summary.etfs_fetched == 0 && !etf_codes.is_empty() {
            bail!(
                "mapping rebuild failed: no holdings could be fetched for {} ETFs",
                etf_codes.len()
            );
        }

        summary.stocks_covered = document.len();
        self.replace(document);
        info!(
            etfs = summary.etfs_fetched,
            failed = summary.etfs_failed,
            stocks = summary.stocks_covered,
            "stock-ETF mapping rebuilt"
        );
        Ok(summary)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let snapshot = self.snapshot.read().clone();
        let json = serde_json::to_string_pretty(&*snapshot)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to move mapping into {}", path.display()))?;
        Ok(())
    }

    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read mapping from {}", path.display()))?;
        let document: MappingDocument =
            serde_json::from_str(&text).context("malformed mapping document")?;
        self.replace(document);
        info!(path = %path.display(), stocks = self.len(), "stock-ETF mapping loaded");
        Ok(())
    }
}

/// Sort by weight descending and drop duplicate etf_codes, keeping the
/// highest-weight entry for each.
fn normalize_entry(etfs: &mut Vec<MappedEtf>) {
    etfs.sort_by(|a, b| {
        b.weight
            .partial_cmp(&a.weight)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.etf_code.cmp(&b.etf_code))
    });
    let mut seen = std::collections::HashSet::new();
    etfs.retain(|e| seen.insert(e.etf_code.clone()));
}
