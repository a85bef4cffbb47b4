//! This module defines constants used throughout the guidance layer.
//! These constants cover the default mutation policy, the feedback
//! reconciliation protocol, and the defaults applied to generated seeds.

/// Probability of mutating any gene field that the model did not flag.
pub const DEFAULT_BACKGROUND_PROBABILITY: f64 = 0.1;

/// Probability of mutating an argument that the model flagged as a target.
pub const DEFAULT_HIGH_PRIORITY_PROBABILITY: f64 = 0.8;

/// Largest Levenshtein distance at which a model-proposed name is still
/// considered a spelling of a ground-truth name.
pub const DEFAULT_MAX_EDIT_DISTANCE: usize = 2;

/// Number of model attempts the strategy reconciler makes before giving up.
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Sampling temperature for seed generation at campaign start.
pub const INIT_TEMPERATURE: f32 = 0.8;

/// Sampling temperature for seed generation during the mutation phase.
pub const MUTATION_TEMPERATURE: f32 = 0.5;

/// Sampling temperature for mutation-strategy requests.
pub const STRATEGY_TEMPERATURE: f32 = 0.8;

/// Number of transactions requested per seed-generation call.
pub const DEFAULT_SEEDS_PER_REQUEST: usize = 5;

/// Value of `amount` when a generated test case omits it.
pub const DEFAULT_AMOUNT: u128 = 0;

/// Value of `blocknumber` when a generated test case omits it.
pub const DEFAULT_BLOCKNUMBER: u64 = 1;

/// Value of `timestamp` when a generated test case omits it.
pub const DEFAULT_TIMESTAMP: u64 = 0;

/// Interface key under which the fuzzer registers the constructor.
pub const CONSTRUCTOR_KEY: &str = "constructor";

/// Interface key under which the fuzzer registers the fallback function.
pub const FALLBACK_KEY: &str = "fallback";

/// Length in bytes of a function selector.
pub const SELECTOR_LEN: usize = 4;
