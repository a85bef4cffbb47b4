//! Campaign-level settings for the guidance layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_BACKGROUND_PROBABILITY, DEFAULT_HIGH_PRIORITY_PROBABILITY, DEFAULT_MAX_EDIT_DISTANCE,
    DEFAULT_MAX_RETRIES, DEFAULT_SEEDS_PER_REQUEST, INIT_TEMPERATURE, MUTATION_TEMPERATURE,
    STRATEGY_TEMPERATURE,
};
use crate::error::ConfigError;
use crate::mutator::MutationPolicy;
use crate::prompt::PromptMode;

/// How a campaign uses the model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FuzzMode {
    /// No model involvement.
    Baseline,
    /// Model seeds from the basic prompt.
    #[default]
    Llm,
    /// Model seeds from the chain-of-thought prompt.
    LlmCot,
    /// Model seeds from the exploratory prompt.
    NewLlm,
    /// Model-guided mutation only.
    LlmMutate,
    /// Model seeds and model-guided mutation.
    LlmFull,
}

impl FuzzMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FuzzMode::Baseline => "baseline",
            FuzzMode::Llm => "llm",
            FuzzMode::LlmCot => "llm-cot",
            FuzzMode::NewLlm => "new-llm",
            FuzzMode::LlmMutate => "llm-mutate",
            FuzzMode::LlmFull => "llm-full",
        }
    }

    pub fn uses_llm_seeds(&self) -> bool {
        matches!(
            self,
            FuzzMode::Llm | FuzzMode::LlmCot | FuzzMode::NewLlm | FuzzMode::LlmFull
        )
    }

    pub fn uses_guided_mutation(&self) -> bool {
        matches!(self, FuzzMode::LlmMutate | FuzzMode::LlmFull)
    }

    /// The seed prompt this mode asks with, if it asks for seeds at all.
    pub fn prompt_mode(&self) -> Option<PromptMode> {
        match self {
            FuzzMode::Llm | FuzzMode::LlmFull => Some(PromptMode::Basic),
            FuzzMode::LlmCot => Some(PromptMode::ChainOfThought),
            FuzzMode::NewLlm => Some(PromptMode::NewIdea),
            FuzzMode::Baseline | FuzzMode::LlmMutate => None,
        }
    }
}

impl fmt::Display for FuzzMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FuzzMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline" => Ok(FuzzMode::Baseline),
            "llm" => Ok(FuzzMode::Llm),
            "llm-cot" => Ok(FuzzMode::LlmCot),
            "new-llm" => Ok(FuzzMode::NewLlm),
            "llm-mutate" => Ok(FuzzMode::LlmMutate),
            "llm-full" => Ok(FuzzMode::LlmFull),
            other => Err(ConfigError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuidanceConfig {
    pub mode: FuzzMode,
    pub background_probability: f64,
    pub high_priority_probability: f64,
    pub max_edit_distance: usize,
    pub max_retries: usize,
    pub init_temperature: f32,
    pub mutation_temperature: f32,
    pub strategy_temperature: f32,
    /// Overrides the prompt implied by `mode`.
    pub prompt_mode: Option<PromptMode>,
    pub seeds_per_request: usize,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            mode: FuzzMode::default(),
            background_probability: DEFAULT_BACKGROUND_PROBABILITY,
            high_priority_probability: DEFAULT_HIGH_PRIORITY_PROBABILITY,
            max_edit_distance: DEFAULT_MAX_EDIT_DISTANCE,
            max_retries: DEFAULT_MAX_RETRIES,
            init_temperature: INIT_TEMPERATURE,
            mutation_temperature: MUTATION_TEMPERATURE,
            strategy_temperature: STRATEGY_TEMPERATURE,
            prompt_mode: None,
            seeds_per_request: DEFAULT_SEEDS_PER_REQUEST,
        }
    }
}

impl GuidanceConfig {
    pub fn builder() -> GuidanceConfigBuilder {
        GuidanceConfigBuilder::new()
    }

    pub fn policy(&self) -> MutationPolicy {
        MutationPolicy {
            background: self.background_probability,
            high_priority: self.high_priority_probability,
        }
    }

    pub fn seed_prompt(&self) -> PromptMode {
        self.prompt_mode
            .or_else(|| self.mode.prompt_mode())
            .unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_probability("background_probability", self.background_probability)?;
        if self.background_probability == 0.0 {
            return Err(ConfigError::InvalidProbability {
                name: "background_probability",
                value: self.background_probability,
            });
        }
        check_probability("high_priority_probability", self.high_priority_probability)?;
        if self.max_retries == 0 {
            return Err(ConfigError::ZeroRetries);
        }
        check_temperature("init_temperature", self.init_temperature)?;
        check_temperature("mutation_temperature", self.mutation_temperature)?;
        check_temperature("strategy_temperature", self.strategy_temperature)?;
        Ok(())
    }
}

fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidProbability { name, value })
    }
}

fn check_temperature(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidTemperature { name, value })
    }
}

/// Chained construction of a [`GuidanceConfig`], validated on `build`.
#[derive(Debug, Default)]
pub struct GuidanceConfigBuilder {
    config: GuidanceConfig,
}

impl GuidanceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: FuzzMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn background_probability(mut self, probability: f64) -> Self {
        self.config.background_probability = probability;
        self
    }

    pub fn high_priority_probability(mut self, probability: f64) -> Self {
        self.config.high_priority_probability = probability;
        self
    }

    pub fn max_edit_distance(mut self, distance: usize) -> Self {
        self.config.max_edit_distance = distance;
        self
    }

    pub fn max_retries(mut self, retries: usize) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn temperatures(mut self, init: f32, mutation: f32) -> Self {
        self.config.init_temperature = init;
        self.config.mutation_temperature = mutation;
        self
    }

    pub fn strategy_temperature(mut self, temperature: f32) -> Self {
        self.config.strategy_temperature = temperature;
        self
    }

    pub fn prompt_mode(mut self, mode: PromptMode) -> Self {
        self.config.prompt_mode = Some(mode);
        self
    }

    pub fn seeds_per_request(mut self, seeds: usize) -> Self {
        self.config.seeds_per_request = seeds;
        self
    }

    pub fn build(self) -> Result<GuidanceConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        let config = GuidanceConfig::builder().build().unwrap();
        assert_eq!(config, GuidanceConfig::default());
        assert_eq!(config.policy(), MutationPolicy::default());
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_edit_distance, 2);
    }

    #[test]
    fn rejects_bad_values() {
        assert_matches!(
            GuidanceConfig::builder().background_probability(0.0).build(),
            Err(ConfigError::InvalidProbability { name: "background_probability", .. })
        );
        assert_matches!(
            GuidanceConfig::builder().high_priority_probability(1.5).build(),
            Err(ConfigError::InvalidProbability { name: "high_priority_probability", .. })
        );
        assert_matches!(
            GuidanceConfig::builder().max_retries(0).build(),
            Err(ConfigError::ZeroRetries)
        );
        assert_matches!(
            GuidanceConfig::builder().temperatures(f32::NAN, 0.5).build(),
            Err(ConfigError::InvalidTemperature { name: "init_temperature", .. })
        );
    }

    #[test]
    fn modes_parse_and_imply_prompts() {
        for name in ["baseline", "llm", "llm-cot", "new-llm", "llm-mutate", "llm-full"] {
            let mode: FuzzMode = name.parse().unwrap();
            assert_eq!(mode.to_string(), name);
        }
        assert_matches!("llm-magic".parse::<FuzzMode>(), Err(ConfigError::UnknownMode(_)));

        assert!(FuzzMode::LlmFull.uses_guided_mutation());
        assert!(!FuzzMode::LlmCot.uses_guided_mutation());
        assert!(!FuzzMode::LlmMutate.uses_llm_seeds());

        let config = GuidanceConfig::builder()
            .mode(FuzzMode::LlmCot)
            .build()
            .unwrap();
        assert_eq!(config.seed_prompt(), PromptMode::ChainOfThought);
        let config = GuidanceConfig::builder()
            .mode(FuzzMode::LlmCot)
            .prompt_mode(PromptMode::NewIdea)
            .build()
            .unwrap();
        assert_eq!(config.seed_prompt(), PromptMode::NewIdea);
    }
}
