//! One contract's guidance state for the length of a campaign.

use anyhow::Result;
use rand::Rng;
use slog::{Discard, Logger, info, o};
use std::path::PathBuf;

use crate::abi::Abi;
use crate::config::GuidanceConfig;
use crate::error::AbiError;
use crate::gene::{Gene, ValueSource};
use crate::generator::SeedGenerator;
use crate::model::{LanguageModel, Phase};
use crate::mutator::{GeneMutator, MutationReport};
use crate::prompt::{ExecutionContext, PromptTemplate};
use crate::reconciler::{GroundTruth, MutationTargetMap, StrategyReconciler};
use crate::report::{FilterStatsLog, FilterStatsRecord};
use crate::sanitizer::{SeedSanitizer, ValidatedSeed};
use crate::schedule::{GuidanceSchedule, StrategyState};
use crate::signature::{Interface, SignatureIndex};
use crate::stats::RejectionStats;
use crate::usage::{TokenUsage, UsageTracker};

/// Owns the signature index, statistics, reconciler and schedule of a single
/// contract under test.
pub struct ContractSession {
    contract: String,
    interface: Interface,
    index: SignatureIndex,
    config: GuidanceConfig,
    generator: SeedGenerator,
    reconciler: StrategyReconciler,
    schedule: GuidanceSchedule,
    log: Logger,
}

impl ContractSession {
    /// Starts a session, deriving the fuzzer interface from `abi`.
    /// `contract_source` is shown to the model in strategy requests; pass the
    /// ABI text when no source is available.
    pub fn new(
        contract: impl Into<String>,
        abi: &Abi,
        contract_source: impl Into<String>,
        config: GuidanceConfig,
    ) -> Self {
        let contract = contract.into();
        let interface = Interface::from_abi(abi);
        let index = SignatureIndex::from_abi(abi, &interface);
        let generator = SeedGenerator::new(contract.clone(), abi.to_json())
            .with_temperatures(config.init_temperature, config.mutation_temperature);
        let reconciler = StrategyReconciler::new(GroundTruth::from_abi(abi), contract_source)
            .with_limits(config.max_edit_distance, config.max_retries)
            .with_temperature(config.strategy_temperature);

        Self {
            contract,
            interface,
            index,
            config,
            generator,
            reconciler,
            schedule: GuidanceSchedule::new(),
            log: Logger::root(Discard, o!()),
        }
    }

    pub fn from_abi_json(
        contract: impl Into<String>,
        abi_json: &str,
        contract_source: impl Into<String>,
        config: GuidanceConfig,
    ) -> Result<Self, AbiError> {
        let abi = Abi::from_json(abi_json)?;
        Ok(Self::new(contract, &abi, contract_source, config))
    }

    /// Uses the interface supplied by the fuzzer instead of the derived one.
    pub fn with_interface(mut self, abi: &Abi, interface: Interface) -> Self {
        self.index = SignatureIndex::from_abi(abi, &interface);
        self.interface = interface;
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.generator = self.generator.with_template(template);
        self
    }

    pub fn with_usage_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.generator = self.generator.with_usage(UsageTracker::new().with_sink(path));
        self
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        let log = log.new(o!("contract" => self.contract.clone()));
        self.generator = self.generator.with_logger(log.new(o!("component" => "generator")));
        self.reconciler = self
            .reconciler
            .with_logger(log.new(o!("component" => "reconciler")));
        self.log = log;
        self
    }

    pub fn contract(&self) -> &str {
        &self.contract
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    pub fn index(&self) -> &SignatureIndex {
        &self.index
    }

    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    pub fn ground_truth(&self) -> &GroundTruth {
        self.reconciler.ground_truth()
    }

    pub fn stats(&self) -> &RejectionStats {
        self.generator.stats()
    }

    pub fn token_usage(&self) -> TokenUsage {
        self.generator.usage().total()
    }

    pub fn strategy_state(&self) -> &StrategyState {
        self.schedule.state()
    }

    pub fn sanitizer(&self) -> SeedSanitizer<'_> {
        sanitizer_for(&self.index, &self.interface, &self.log)
    }

    pub fn mutator(&self) -> GeneMutator<'_> {
        GeneMutator::new(&self.index, &self.interface, self.config.policy())
            .with_logger(self.log.new(o!("component" => "mutator")))
    }

    /// Asks the model for a batch of seeds. Modes that do not use model seeds
    /// return nothing without calling the model.
    pub fn generate_seeds<M: LanguageModel>(&mut self, model: &mut M, phase: Phase) -> Vec<ValidatedSeed> {
        if !self.config.mode.uses_llm_seeds() {
            return Vec::new();
        }
        // Borrows fields one by one so the generator stays mutable.
        let sanitizer = sanitizer_for(&self.index, &self.interface, &self.log);
        self.generator.generate(
            model,
            &sanitizer,
            self.config.seed_prompt(),
            self.config.seeds_per_request,
            phase,
            None,
        )
    }

    /// Advances the guidance schedule to `generation`, requesting a strategy
    /// when `coverage` reports new coverage. Returns the targets valid for
    /// this generation.
    pub fn observe_generation<M: LanguageModel>(
        &mut self,
        model: &mut M,
        generation: u64,
        coverage: Option<&ExecutionContext>,
    ) -> Option<&MutationTargetMap> {
        if !self.config.mode.uses_guided_mutation() {
            return None;
        }
        let reconciler = &self.reconciler;
        self.schedule
            .observe(generation, coverage, |context| reconciler.reconcile(model, context))
    }

    /// Mutates an individual with the targets of `generation`, if any.
    pub fn mutate_individual<V, R>(
        &self,
        chromosome: &mut [Gene],
        generation: u64,
        source: &mut V,
        rng: &mut R,
    ) -> MutationReport
    where
        V: ValueSource + ?Sized,
        R: Rng + ?Sized,
    {
        let targets = if self.config.mode.uses_guided_mutation() {
            self.schedule.targets(generation)
        } else {
            None
        };
        self.mutator().mutate_individual(chromosome, targets, source, rng)
    }

    /// Exports this session's filter statistics and resets them.
    pub fn finish(&mut self, sink: &FilterStatsLog) -> Result<Option<FilterStatsRecord>> {
        let record = self.generator.export_filter_stats(sink)?;
        if let Some(record) = &record {
            info!(self.log, "Exported filter statistics";
                "generated" => record.total_generated,
                "filter_rate_percent" => record.filter_rate_percent);
        }
        Ok(record)
    }
}

fn sanitizer_for<'a>(index: &'a SignatureIndex, interface: &'a Interface, log: &Logger) -> SeedSanitizer<'a> {
    SeedSanitizer::new(index, interface).with_logger(log.new(o!("component" => "sanitizer")))
}

