//! Model-driven seed generation.

use anyhow::Result;
use chrono::Utc;
use slog::{Discard, Logger, info, o, warn};
use std::collections::BTreeMap;

use crate::constants::{INIT_TEMPERATURE, MUTATION_TEMPERATURE, STRATEGY_TEMPERATURE};
use crate::model::{LanguageModel, ModelRequest, Phase};
use crate::prompt::{PromptMode, PromptTemplate};
use crate::report::{FilterStatsLog, FilterStatsRecord};
use crate::sanitizer::{SeedSanitizer, ValidatedSeed};
use crate::stats::RejectionStats;
use crate::usage::UsageTracker;

/// Asks a model for transaction batches and keeps the session's filter
/// statistics and token usage.
pub struct SeedGenerator {
    contract: String,
    abi_json: String,
    template: Option<PromptTemplate>,
    stats: RejectionStats,
    usage: UsageTracker,
    init_temperature: f32,
    mutation_temperature: f32,
    log: Logger,
}

impl SeedGenerator {
    pub fn new(contract: impl Into<String>, abi_json: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            abi_json: abi_json.into(),
            template: None,
            stats: RejectionStats::new(),
            usage: UsageTracker::new(),
            init_temperature: INIT_TEMPERATURE,
            mutation_temperature: MUTATION_TEMPERATURE,
            log: Logger::root(Discard, o!()),
        }
    }

    /// Uses `template` instead of the built-in prompt for every mode.
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_usage(mut self, usage: UsageTracker) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_temperatures(mut self, init: f32, mutation: f32) -> Self {
        self.init_temperature = init;
        self.mutation_temperature = mutation;
        self
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn stats(&self) -> &RejectionStats {
        &self.stats
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    pub fn prompt(&self, mode: PromptMode, num_cases: usize) -> String {
        let template = self
            .template
            .clone()
            .unwrap_or_else(|| PromptTemplate::builtin(mode));
        let vars = BTreeMap::from([
            ("num_cases", num_cases.to_string()),
            ("contract", self.contract.clone()),
            ("abi", self.abi_json.clone()),
            ("current_time", Utc::now().timestamp().to_string()),
        ]);
        template.render(&vars)
    }

    fn default_temperature(&self, phase: Phase) -> f32 {
        match phase {
            Phase::Init => self.init_temperature,
            Phase::Mutation => self.mutation_temperature,
            Phase::Strategy => STRATEGY_TEMPERATURE,
        }
    }

    /// Requests `num_cases` transactions and returns the ones that pass
    /// sanitization. A transport failure yields no seeds.
    pub fn generate<M: LanguageModel>(
        &mut self,
        model: &mut M,
        sanitizer: &SeedSanitizer<'_>,
        mode: PromptMode,
        num_cases: usize,
        phase: Phase,
        temperature: Option<f32>,
    ) -> Vec<ValidatedSeed> {
        let temperature = temperature.unwrap_or_else(|| self.default_temperature(phase));
        let request =
            ModelRequest::new(phase, self.prompt(mode, num_cases), temperature).json_output();

        let response = match model.complete(&request) {
            Ok(response) => response,
            Err(e) => {
                warn!(self.log, "Seed generation request failed";
                    "contract" => &self.contract,
                    "phase" => %phase,
                    "error" => %e);
                return Vec::new();
            }
        };

        if let Some(usage) = response.usage {
            if let Err(e) = self.usage.record(
                &self.contract,
                phase,
                mode.as_str(),
                model.model_name(),
                temperature,
                usage,
            ) {
                warn!(self.log, "Failed to record token usage"; "error" => %e);
            }
        }

        let batch = sanitizer.sanitize(&response.content);
        self.stats.merge(&batch.stats);
        info!(self.log, "Generated seeds";
            "contract" => &self.contract,
            "phase" => %phase,
            "accepted" => batch.seeds.len(),
            "session_generated" => self.stats.total_generated);
        batch.seeds
    }

    /// Writes this session's filter statistics and starts a new session.
    pub fn export_filter_stats(&mut self, sink: &FilterStatsLog) -> Result<Option<FilterStatsRecord>> {
        sink.export(&self.contract, &mut self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{Abi, AbiEntry, AbiParam};
    use crate::custom::scripted::ScriptedModel;
    use crate::signature::{Interface, SignatureIndex};
    use crate::stats::RejectionKind;
    use crate::usage::TokenUsage;

    fn deposit_abi() -> Abi {
        Abi::new(vec![AbiEntry::function(
            "deposit",
            vec![AbiParam::new("amount", "uint256")],
        )])
    }

    #[test]
    fn generates_and_accounts() {
        let abi = deposit_abi();
        let interface = Interface::from_abi(&abi);
        let index = SignatureIndex::from_abi(&abi, &interface);
        let sanitizer = SeedSanitizer::new(&index, &interface);

        let mut model = ScriptedModel::new()
            .respond_with_usage(
                r#"{"transactions": [{"arguments": ["deposit", 5]}, {"arguments": ["deposit"]}]}"#,
                TokenUsage::new(100, 20),
            )
            .respond("not json");
        let mut generator = SeedGenerator::new("Vault", abi.to_json());

        let seeds = generator.generate(&mut model, &sanitizer, PromptMode::Basic, 2, Phase::Init, None);
        assert_eq!(seeds.len(), 1);
        let seeds = generator.generate(&mut model, &sanitizer, PromptMode::Basic, 2, Phase::Mutation, None);
        assert!(seeds.is_empty());

        let requests = model.requests();
        assert_eq!(requests[0].temperature, 0.8);
        assert_eq!(requests[1].temperature, 0.5);
        assert!(requests[0].json_output);
        assert!(requests[0].prompt.contains("Vault"));

        let stats = generator.stats();
        assert_eq!(stats.total_generated, 3);
        assert_eq!(stats.reason_count(RejectionKind::ArgCountMismatch), 1);
        assert_eq!(stats.reason_count(RejectionKind::JsonParseFail), 1);
        assert_eq!(generator.usage().phase(Phase::Init).total_tokens, 120);
    }

    #[test]
    fn transport_failure_yields_nothing() {
        let abi = deposit_abi();
        let interface = Interface::from_abi(&abi);
        let index = SignatureIndex::from_abi(&abi, &interface);
        let sanitizer = SeedSanitizer::new(&index, &interface);
        let mut model = ScriptedModel::new().fail("connection reset");
        let mut generator = SeedGenerator::new("Vault", abi.to_json());

        let seeds =
            generator.generate(&mut model, &sanitizer, PromptMode::NewIdea, 3, Phase::Init, Some(1.0));
        assert!(seeds.is_empty());
        assert!(generator.stats().is_empty());
        assert_eq!(model.requests()[0].temperature, 1.0);
    }
}
