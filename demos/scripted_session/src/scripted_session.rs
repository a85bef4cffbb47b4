//! Drives one contract session against a scripted model: seeds, a strategy
//! round with a misspelled reply, guided mutation and the filter report.

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;

use guidedfuzz::config::{FuzzMode, GuidanceConfig};
use guidedfuzz::custom::random_source::RandomValueSource;
use guidedfuzz::custom::scripted::ScriptedModel;
use guidedfuzz::gene::Gene;
use guidedfuzz::model::Phase;
use guidedfuzz::prompt::ExecutionContext;
use guidedfuzz::report::{FilterAnalysis, FilterStatsLog};
use guidedfuzz::session::ContractSession;
use guidedfuzz::usage::TokenUsage;

const VAULT_ABI: &str = r#"[
  {"type": "constructor", "inputs": [{"name": "owner", "type": "address"}]},
  {"type": "function", "name": "deposit", "constant": false,
   "inputs": [{"name": "amount", "type": "uint256"}]},
  {"type": "function", "name": "withdraw", "constant": false,
   "inputs": [{"name": "value", "type": "uint256"}, {"name": "to", "type": "address"}]},
  {"type": "function", "name": "paused", "constant": true, "inputs": []}
]"#;

const VAULT_SOURCE: &str = "contract Vault { /* deposit, withdraw, paused */ }";

const SEEDS: &str = r#"{"transactions": [
  {"arguments": ["deposit", "1000"], "amount": "0x3e8", "timestamp": 1700000000},
  {"arguments": ["withdraw", 5, "0x00000000000000000000000000000000000000bb"]},
  {"arguments": ["withdraw", 5]},
  {"arguments": ["emergencyExit"]},
  {"arguments": ["paused"]}
]}"#;

fn main() -> Result<()> {
    let workdir = tempfile::tempdir()?;
    let stats_log = FilterStatsLog::new(workdir.path().join("filter_stats.jsonl"));

    let config = GuidanceConfig::builder().mode(FuzzMode::LlmFull).build()?;
    let mut session = ContractSession::from_abi_json("Vault", VAULT_ABI, VAULT_SOURCE, config)?
        .with_usage_log(workdir.path().join("usage.jsonl"));

    let mut model = ScriptedModel::new()
        .named("scripted-demo")
        .respond_with_usage(SEEDS, TokenUsage::new(812, 240))
        .respond(r#"{"deposit": "amount"}"#)
        .respond(r#"{"deposti": ["amout"], "withdraw": ["value"], "constructor": []}"#);

    let seeds = session.generate_seeds(&mut model, Phase::Init);
    println!("Accepted {} of {} generated seeds", seeds.len(), session.stats().total_generated);
    for seed in &seeds {
        println!("  {}", seed.to_json());
    }

    let coverage = ExecutionContext::new("JUMPI at pc 0x2c not taken", "[deposit(1000)]", "deposit");
    match session.observe_generation(&mut model, 1, Some(&coverage)) {
        Some(targets) => {
            for function in targets.functions() {
                println!("Targets for {function}: {:?}", targets.targets(function));
            }
        }
        None => println!("No strategy for generation 1, mutating in the background"),
    }
    println!("Strategy requests sent: {}", model.requests().len() - 1);

    let mut population: Vec<Vec<Gene>> = seeds.into_iter().map(|seed| vec![Gene::from(seed)]).collect();
    let mut source = RandomValueSource::new(7);
    let mut rng = StdRng::seed_from_u64(7);
    for individual in &mut population {
        let report = session.mutate_individual(individual, 1, &mut source, &mut rng);
        println!(
            "Mutated {} value(s): {}",
            report.total(),
            serde_json::to_string(&individual[0])?
        );
    }

    let usage = session.token_usage();
    session.finish(&stats_log)?;
    println!("Tokens used: {}", usage.total_tokens);
    println!("{}", FilterAnalysis::load(stats_log.path())?);
    Ok(())
}
