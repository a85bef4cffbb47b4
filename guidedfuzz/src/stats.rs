//! Per-session rejection statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Why a generated test case was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    InvalidFormat,
    AbiMismatch,
    TypeSanitizeFail,
    ArgCountMismatch,
    JsonParseFail,
}

impl RejectionKind {
    pub const ALL: [RejectionKind; 5] = [
        RejectionKind::InvalidFormat,
        RejectionKind::AbiMismatch,
        RejectionKind::TypeSanitizeFail,
        RejectionKind::ArgCountMismatch,
        RejectionKind::JsonParseFail,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionKind::InvalidFormat => "invalid_format",
            RejectionKind::AbiMismatch => "abi_mismatch",
            RejectionKind::TypeSanitizeFail => "type_sanitize_fail",
            RejectionKind::ArgCountMismatch => "arg_count_mismatch",
            RejectionKind::JsonParseFail => "json_parse_fail",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters for one contract session.
///
/// `total_generated == total_accepted + total_rejected` and
/// `total_rejected == sum(rejection_reasons)` hold after every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionStats {
    pub total_generated: u64,
    pub total_accepted: u64,
    pub total_rejected: u64,
    pub rejection_reasons: BTreeMap<RejectionKind, u64>,
}

impl Default for RejectionStats {
    fn default() -> Self {
        Self {
            total_generated: 0,
            total_accepted: 0,
            total_rejected: 0,
            rejection_reasons: RejectionKind::ALL.iter().map(|kind| (*kind, 0)).collect(),
        }
    }
}

impl RejectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&mut self) {
        self.total_generated += 1;
        self.total_accepted += 1;
    }

    pub fn record_rejected(&mut self, kind: RejectionKind) {
        self.total_generated += 1;
        self.total_rejected += 1;
        *self.rejection_reasons.entry(kind).or_insert(0) += 1;
    }

    /// Adds another delta into these counters.
    pub fn merge(&mut self, other: &RejectionStats) {
        self.total_generated += other.total_generated;
        self.total_accepted += other.total_accepted;
        self.total_rejected += other.total_rejected;
        for (kind, count) in &other.rejection_reasons {
            *self.rejection_reasons.entry(*kind).or_insert(0) += count;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.total_generated == 0
    }

    pub fn reason_count(&self, kind: RejectionKind) -> u64 {
        self.rejection_reasons.get(&kind).copied().unwrap_or(0)
    }

    /// Share of generated cases that were rejected, in percent, rounded to
    /// two decimals. Zero when nothing was generated.
    pub fn filter_rate_percent(&self) -> f64 {
        percent(self.total_rejected, self.total_generated)
    }

    pub fn acceptance_rate_percent(&self) -> f64 {
        percent(self.total_accepted, self.total_generated)
    }

    pub fn is_consistent(&self) -> bool {
        self.total_generated == self.total_accepted + self.total_rejected
            && self.total_rejected == self.rejection_reasons.values().sum::<u64>()
    }
}

pub(crate) fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_stay_consistent() {
        let mut stats = RejectionStats::new();
        stats.record_accepted();
        stats.record_rejected(RejectionKind::AbiMismatch);
        stats.record_rejected(RejectionKind::AbiMismatch);
        assert_eq!(stats.total_generated, 3);
        assert_eq!(stats.reason_count(RejectionKind::AbiMismatch), 2);
        assert!(stats.is_consistent());
        assert_eq!(stats.filter_rate_percent(), 66.67);
        assert_eq!(stats.acceptance_rate_percent(), 33.33);
    }

    #[test]
    fn merge_and_reset() {
        let mut session = RejectionStats::new();
        let mut delta = RejectionStats::new();
        delta.record_rejected(RejectionKind::JsonParseFail);
        delta.record_accepted();
        session.merge(&delta);
        session.merge(&delta);
        assert_eq!(session.total_generated, 4);
        assert_eq!(session.reason_count(RejectionKind::JsonParseFail), 2);
        assert!(session.is_consistent());

        session.reset();
        assert!(session.is_empty());
        assert_eq!(session.filter_rate_percent(), 0.0);
        assert_eq!(session.rejection_reasons.len(), RejectionKind::ALL.len());
    }

    #[test]
    fn serializes_reason_names() {
        let mut stats = RejectionStats::new();
        stats.record_rejected(RejectionKind::ArgCountMismatch);
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["rejection_reasons"]["arg_count_mismatch"], 1);
        assert_eq!(json["rejection_reasons"]["invalid_format"], 0);
    }
}
