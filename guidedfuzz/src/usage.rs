//! Token usage accounting and its JSON-lines records.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};

use crate::model::Phase;
use crate::util::{append_json_line, read_json_lines};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// One line of the usage log, written per model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub ts: String,
    pub contract: String,
    pub phase: Phase,
    pub mode: String,
    pub model: String,
    pub temperature: f32,
    #[serde(flatten)]
    pub usage: TokenUsage,
}

/// Accumulates token usage for one contract session, overall and per phase.
#[derive(Debug, Default)]
pub struct UsageTracker {
    total: TokenUsage,
    by_phase: BTreeMap<Phase, TokenUsage>,
    calls: u64,
    sink: Option<PathBuf>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also appends one [`UsageRecord`] per call to `path`.
    pub fn with_sink(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = Some(path.into());
        self
    }

    pub fn record(
        &mut self,
        contract: &str,
        phase: Phase,
        mode: &str,
        model: &str,
        temperature: f32,
        usage: TokenUsage,
    ) -> Result<()> {
        self.total += usage;
        *self.by_phase.entry(phase).or_default() += usage;
        self.calls += 1;

        if let Some(path) = &self.sink {
            let record = UsageRecord {
                ts: Utc::now().to_rfc3339(),
                contract: contract.to_string(),
                phase,
                mode: mode.to_string(),
                model: model.to_string(),
                temperature,
                usage,
            };
            append_json_line(path, &record)?;
        }
        Ok(())
    }

    pub fn total(&self) -> TokenUsage {
        self.total
    }

    pub fn phase(&self, phase: Phase) -> TokenUsage {
        self.by_phase.get(&phase).copied().unwrap_or_default()
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhaseUsage {
    pub calls: u64,
    #[serde(flatten)]
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContractUsage {
    pub total: TokenUsage,
    pub by_phase: BTreeMap<Phase, PhaseUsage>,
}

/// Offline aggregate over a usage log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub per_contract: BTreeMap<String, ContractUsage>,
    pub num_contracts: usize,
    pub mean_total_tokens_per_contract: f64,
}

impl UsageSummary {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> Self {
        let mut per_contract: BTreeMap<String, ContractUsage> = BTreeMap::new();
        for record in records {
            let contract = per_contract.entry(record.contract.clone()).or_default();
            contract.total += record.usage;
            let phase = contract.by_phase.entry(record.phase).or_default();
            phase.calls += 1;
            phase.usage += record.usage;
        }

        let num_contracts = per_contract.len();
        let mean_total_tokens_per_contract = if num_contracts == 0 {
            0.0
        } else {
            let sum: u64 = per_contract.values().map(|c| c.total.total_tokens).sum();
            sum as f64 / num_contracts as f64
        };
        Self {
            per_contract,
            num_contracts,
            mean_total_tokens_per_contract,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let records: Vec<UsageRecord> = read_json_lines(path)?;
        Ok(Self::from_records(&records))
    }
}
