//! Filter-statistics records, their JSON-lines log and offline analysis.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::stats::{RejectionKind, RejectionStats, percent};
use crate::util::{append_json_line, read_json_lines};

/// One contract session's filter statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStatsRecord {
    pub ts: String,
    pub contract: String,
    pub total_generated: u64,
    pub total_accepted: u64,
    pub total_rejected: u64,
    pub filter_rate_percent: f64,
    pub rejection_reasons: BTreeMap<RejectionKind, u64>,
}

impl FilterStatsRecord {
    pub fn from_stats(contract: impl Into<String>, stats: &RejectionStats) -> Self {
        Self {
            ts: Utc::now().to_rfc3339(),
            contract: contract.into(),
            total_generated: stats.total_generated,
            total_accepted: stats.total_accepted,
            total_rejected: stats.total_rejected,
            filter_rate_percent: stats.filter_rate_percent(),
            rejection_reasons: stats.rejection_reasons.clone(),
        }
    }
}

/// Append-only JSON-lines sink for [`FilterStatsRecord`]s.
#[derive(Debug, Clone)]
pub struct FilterStatsLog {
    path: PathBuf,
}

impl FilterStatsLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends the session's record and resets `stats`. Sessions that
    /// generated nothing are skipped and leave no record.
    pub fn export(
        &self,
        contract: &str,
        stats: &mut RejectionStats,
    ) -> Result<Option<FilterStatsRecord>> {
        if stats.is_empty() {
            return Ok(None);
        }
        let record = FilterStatsRecord::from_stats(contract, stats);
        append_json_line(&self.path, &record)?;
        stats.reset();
        Ok(Some(record))
    }

    pub fn load(&self) -> Result<Vec<FilterStatsRecord>> {
        load_records(&self.path)
    }
}

pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<FilterStatsRecord>> {
    read_json_lines(path)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasonShare {
    pub count: u64,
    pub percent_of_rejected: f64,
    pub percent_of_total: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContractTotals {
    pub generated: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub sessions: u64,
}

/// Aggregate over many filter-stats records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterAnalysis {
    pub total_llm_sessions: usize,
    pub total_generated: u64,
    pub total_accepted: u64,
    pub total_rejected: u64,
    pub filter_rate_percent: f64,
    pub acceptance_rate_percent: f64,
    pub reasons: BTreeMap<RejectionKind, ReasonShare>,
    pub per_contract: BTreeMap<String, ContractTotals>,
}

impl FilterAnalysis {
    pub fn from_records(records: &[FilterStatsRecord]) -> Self {
        let mut per_contract: BTreeMap<String, ContractTotals> = BTreeMap::new();
        let mut reason_counts: BTreeMap<RejectionKind, u64> = BTreeMap::new();
        let (mut generated, mut accepted, mut rejected) = (0, 0, 0);

        for record in records {
            generated += record.total_generated;
            accepted += record.total_accepted;
            rejected += record.total_rejected;
            for (kind, count) in &record.rejection_reasons {
                *reason_counts.entry(*kind).or_insert(0) += count;
            }
            let contract = per_contract.entry(record.contract.clone()).or_default();
            contract.generated += record.total_generated;
            contract.accepted += record.total_accepted;
            contract.rejected += record.total_rejected;
            contract.sessions += 1;
        }

        let reasons = RejectionKind::ALL
            .iter()
            .map(|kind| {
                let count = reason_counts.get(kind).copied().unwrap_or(0);
                let share = ReasonShare {
                    count,
                    percent_of_rejected: percent(count, rejected),
                    percent_of_total: percent(count, generated),
                };
                (*kind, share)
            })
            .collect();

        Self {
            total_llm_sessions: records.len(),
            total_generated: generated,
            total_accepted: accepted,
            total_rejected: rejected,
            filter_rate_percent: percent(rejected, generated),
            acceptance_rate_percent: percent(accepted, generated),
            reasons,
            per_contract,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_records(&load_records(path)?))
    }
}

impl fmt::Display for FilterAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "LLM filter statistics")?;
        writeln!(f, "  sessions:        {}", self.total_llm_sessions)?;
        writeln!(f, "  generated:       {}", self.total_generated)?;
        writeln!(f, "  accepted:        {}", self.total_accepted)?;
        writeln!(f, "  rejected:        {}", self.total_rejected)?;
        writeln!(f, "  filter rate:     {:.2}%", self.filter_rate_percent)?;
        writeln!(f, "  acceptance rate: {:.2}%", self.acceptance_rate_percent)?;
        writeln!(f, "Rejection reasons")?;
        for (kind, share) in &self.reasons {
            writeln!(
                f,
                "  {:<20} {:>6}  {:>6.2}% of rejected  {:>6.2}% of total",
                kind.as_str(),
                share.count,
                share.percent_of_rejected,
                share.percent_of_total
            )?;
        }
        Ok(())
    }
}
