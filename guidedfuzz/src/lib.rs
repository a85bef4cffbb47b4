//! A validation layer between a language model and an evolutionary
//! smart-contract fuzzer.
//!
//! The model proposes transaction batches and mutation targets as loosely
//! structured JSON. This crate turns them into what the fuzzer needs:
//! selector-keyed, ABI-typed seeds, and a per-generation map of the
//! parameters worth mutating. Every rejected proposal is counted by reason.
//!
//! ## Getting Started
//!
//! Implement [`model::LanguageModel`] for your transport, then drive a
//! [`session::ContractSession`] from the fuzzer's generation loop.
//!
//! ```no_run
//! use guidedfuzz::config::{FuzzMode, GuidanceConfig};
//! use guidedfuzz::custom::random_source::RandomValueSource;
//! use guidedfuzz::custom::scripted::ScriptedModel;
//! use guidedfuzz::gene::Gene;
//! use guidedfuzz::model::Phase;
//! use guidedfuzz::prompt::ExecutionContext;
//! use guidedfuzz::report::FilterStatsLog;
//! use guidedfuzz::session::ContractSession;
//! use guidedfuzz::util::read_abi;
//! use rand::SeedableRng;
//! use rand::rngs::StdRng;
//!
//! fn main() -> anyhow::Result<()> {
//!     let abi = read_abi("./build/Token.abi")?;
//!     let config = GuidanceConfig::builder()
//!         .mode(FuzzMode::LlmFull)
//!         .background_probability(0.1)
//!         .build()?;
//!     let mut session = ContractSession::new("Token", &abi, abi.to_json(), config);
//!
//!     // 1. Seed the initial population.
//!     let mut model = ScriptedModel::new();
//!     let mut population: Vec<Vec<Gene>> = session
//!         .generate_seeds(&mut model, Phase::Init)
//!         .into_iter()
//!         .map(|seed| vec![Gene::from(seed)])
//!         .collect();
//!
//!     // 2. Each generation, report new coverage and mutate.
//!     let mut source = RandomValueSource::new(0);
//!     let mut rng = StdRng::seed_from_u64(0);
//!     for generation in 0..10 {
//!         let coverage = ExecutionContext::new("JUMPI at pc 0x1f", "", "transfer");
//!         session.observe_generation(&mut model, generation, Some(&coverage));
//!         for individual in &mut population {
//!             session.mutate_individual(individual, generation, &mut source, &mut rng);
//!         }
//!     }
//!
//!     // 3. Record how much of the model's output survived.
//!     session.finish(&FilterStatsLog::new("./logs/filter_stats.jsonl"))?;
//!     Ok(())
//! }
//! ```
//!
//! For a runnable example, see `demos/scripted_session` in the repository.
pub mod abi;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod gene;
pub mod generator;
pub mod model;
pub mod mutator;
pub mod prompt;
pub mod reconciler;
pub mod report;
pub mod sanitizer;
pub mod schedule;
pub mod session;
pub mod signature;
pub mod stats;
pub mod usage;
pub mod util;
pub mod value;

mod constants;

pub mod custom;

pub use constants::{
    DEFAULT_BACKGROUND_PROBABILITY, DEFAULT_HIGH_PRIORITY_PROBABILITY, DEFAULT_MAX_EDIT_DISTANCE,
    DEFAULT_MAX_RETRIES,
};
