use assert_matches::assert_matches;
use guidedfuzz::config::{FuzzMode, GuidanceConfig};
use guidedfuzz::custom::random_source::RandomValueSource;
use guidedfuzz::custom::scripted::ScriptedModel;
use guidedfuzz::gene::Gene;
use guidedfuzz::model::Phase;
use guidedfuzz::prompt::ExecutionContext;
use guidedfuzz::report::{FilterAnalysis, FilterStatsLog};
use guidedfuzz::sanitizer::CandidateOutcome;
use guidedfuzz::schedule::StrategyState;
use guidedfuzz::session::ContractSession;
use guidedfuzz::signature::{FunctionKey, Selector};
use guidedfuzz::stats::RejectionKind;
use guidedfuzz::usage::{TokenUsage, UsageSummary};
use guidedfuzz::value::AbiValue;
use rand::SeedableRng;
use rand::rngs::StdRng;

const TOKEN_ABI: &str = r#"{
  "contractName": "Token",
  "abi": [
    {"type": "constructor", "inputs": [{"name": "supply", "type": "uint256"}]},
    {"type": "function", "name": "transfer", "constant": false,
     "inputs": [{"name": "to", "type": "address"}, {"name": "amount", "type": "uint256"}]},
    {"type": "function", "name": "approve", "constant": false,
     "inputs": [{"name": "spender", "type": "address"}, {"name": "amount", "type": "uint256"}]},
    {"type": "function", "name": "balanceOf", "constant": true,
     "inputs": [{"name": "owner", "type": "address"}]},
    {"type": "event", "name": "Transfer",
     "inputs": [{"name": "from", "type": "address"}, {"name": "to", "type": "address"}]}
  ]
}"#;

const ALICE: &str = "0x00000000000000000000000000000000000000aa";

fn session(mode: FuzzMode) -> ContractSession {
    let config = GuidanceConfig::builder().mode(mode).build().unwrap();
    ContractSession::from_abi_json("Token", TOKEN_ABI, "contract Token { ... }", config).unwrap()
}

fn transfer_key() -> FunctionKey {
    FunctionKey::from(Selector::from_signature("transfer(address,uint256)"))
}

#[test]
fn seeds_are_sanitized_and_counted() {
    let mut session = session(FuzzMode::Llm);
    let reply = format!(
        r#"{{"transactions": [
            {{"arguments": ["transfer", "{ALICE}", "100"], "amount": 0}},
            {{"arguments": ["transfer", "{ALICE}", 1, 2]}},
            {{"arguments": ["balanceOf", "{ALICE}"]}},
            {{"arguments": ["mint", 1]}}
        ]}}"#
    );
    let mut model = ScriptedModel::new().respond_with_usage(reply, TokenUsage::new(300, 50));

    let seeds = session.generate_seeds(&mut model, Phase::Init);
    assert_eq!(seeds.len(), 2);
    assert_eq!(seeds[0].function, transfer_key());
    assert_eq!(seeds[0].arguments[1], AbiValue::from(100));
    assert_eq!(seeds[1].function, FunctionKey::from(Selector::from_signature("balanceOf(address)")));

    let stats = session.stats();
    assert_eq!(stats.total_generated, 4);
    assert_eq!(stats.total_accepted, 2);
    assert_eq!(stats.reason_count(RejectionKind::ArgCountMismatch), 1);
    assert_eq!(stats.reason_count(RejectionKind::AbiMismatch), 1);
    assert!(stats.is_consistent());
    assert_eq!(session.token_usage().total_tokens, 350);
}

#[test]
fn session_sanitizer_checks_against_the_contract() {
    let session = session(FuzzMode::Llm);
    let sanitizer = session.sanitizer();
    let outcome = sanitizer.sanitize_candidate(&serde_json::json!({
        "arguments": ["approve", ALICE, "0x20"]
    }));
    assert_matches!(outcome, CandidateOutcome::Valid(seed) if seed.arguments[1] == AbiValue::from(32));

    let readonly = sanitizer.sanitize_candidate(&serde_json::json!({"arguments": ["balanceOf", 1, 2]}));
    assert_eq!(readonly.rejection_kind(), Some(RejectionKind::ArgCountMismatch));
    // Checking a candidate leaves the session's counters alone.
    assert!(session.stats().is_empty());
}

#[test]
fn baseline_mode_never_calls_the_model() {
    let mut session = session(FuzzMode::Baseline);
    let mut model = ScriptedModel::new();
    assert!(session.generate_seeds(&mut model, Phase::Init).is_empty());
    assert!(
        session
            .observe_generation(&mut model, 0, Some(&ExecutionContext::default()))
            .is_none()
    );
    assert!(model.requests().is_empty());
}

#[test]
fn guided_generation_targets_flagged_parameters() {
    let mut session = session(FuzzMode::LlmMutate);
    assert_eq!(
        session.ground_truth().listing(),
        "1:transfer(address to,uint256 amount),2:approve(address spender,uint256 amount),3:constructor(uint256 supply)"
    );

    let mut model = ScriptedModel::new()
        .respond(r#"{"transfr": ["amout"], "approve": [], "constructor": []}"#);
    let context = ExecutionContext::new("JUMPI 0x3a not taken", "[transfer]", "transfer");
    let targets = session
        .observe_generation(&mut model, 5, Some(&context))
        .cloned()
        .unwrap();
    assert!(targets.is_target("transfer", "amount"));
    assert_eq!(model.requests().len(), 1);
    assert!(model.requests()[0].prompt.contains("JUMPI 0x3a not taken"));

    // Served generation: no second request.
    assert!(session.observe_generation(&mut model, 5, Some(&context)).is_some());
    assert_eq!(model.requests().len(), 1);

    let mut individual = vec![Gene::new(
        transfer_key(),
        vec![AbiValue::Raw(ALICE.into()), AbiValue::from(1)],
    )];
    let mut source = RandomValueSource::new(11);
    let mut rng = StdRng::seed_from_u64(11);
    session.mutate_individual(&mut individual, 5, &mut source, &mut rng);
    assert!(individual[0].timestamp.is_some());
    assert!(individual[0].call_return.is_some());

    // A quiet generation drops the map.
    assert!(session.observe_generation(&mut model, 6, None).is_none());
    assert_eq!(session.strategy_state(), &StrategyState::NoStrategy);
}

#[test]
fn exhausted_strategy_falls_back_to_background() {
    let mut session = session(FuzzMode::LlmFull);
    let mut model = ScriptedModel::new()
        .respond("I think you should mutate amount.")
        .respond(r#"{"transfer": "amount"}"#)
        .fail("rate limited");

    let targets = session.observe_generation(&mut model, 1, Some(&ExecutionContext::default()));
    assert!(targets.is_none());
    assert_matches!(session.strategy_state(), StrategyState::Exhausted { generation: 1 });
    assert_eq!(model.requests().len(), 3);
    let last = &model.requests()[2].prompt;
    assert!(last.contains("did not contain a valid JSON object"));
    assert!(last.contains("must be a list of parameter names"));
}

#[test]
fn filter_stats_flow_into_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let stats_log = FilterStatsLog::new(dir.path().join("filter_stats.jsonl"));
    let usage_path = dir.path().join("usage.jsonl");

    let mut first = session(FuzzMode::Llm).with_usage_log(&usage_path);
    let mut model = ScriptedModel::new()
        .respond_with_usage(
            format!(r#"{{"transactions": [{{"arguments": ["approve", "{ALICE}", "0x10"]}}]}}"#),
            TokenUsage::new(10, 10),
        )
        .respond_with_usage("```json\nnope", TokenUsage::new(5, 5));
    first.generate_seeds(&mut model, Phase::Init);
    first.generate_seeds(&mut model, Phase::Mutation);
    let record = first.finish(&stats_log).unwrap().unwrap();
    assert_eq!(record.total_generated, 2);
    assert_eq!(record.filter_rate_percent, 50.0);
    assert!(first.stats().is_empty());

    let mut idle = session(FuzzMode::Llm);
    assert!(idle.finish(&stats_log).unwrap().is_none());

    let analysis = FilterAnalysis::load(stats_log.path()).unwrap();
    assert_eq!(analysis.total_llm_sessions, 1);
    assert_eq!(analysis.reasons[&RejectionKind::JsonParseFail].count, 1);

    let usage = UsageSummary::load(&usage_path).unwrap();
    assert_eq!(usage.num_contracts, 1);
    assert_eq!(usage.per_contract["Token"].total.total_tokens, 30);
}
