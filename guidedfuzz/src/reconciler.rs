//! Reconciliation of model-proposed mutation targets against the contract's
//! real function and parameter names.
//!
//! A model answering a strategy request may misspell names, invent
//! parameters, drop functions or wrap its JSON in prose. [`validate_feedback`]
//! maps every proposed name onto its closest ground-truth spelling and
//! collects what could not be mapped; [`StrategyReconciler`] feeds those
//! issues back to the model for a bounded number of attempts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use slog::{Discard, Logger, debug, info, o, warn};
use std::collections::{BTreeMap, BTreeSet};

use crate::abi::{Abi, AbiEntry};
use crate::constants::{
    CONSTRUCTOR_KEY, DEFAULT_MAX_EDIT_DISTANCE, DEFAULT_MAX_RETRIES, STRATEGY_TEMPERATURE,
};
use crate::error::FeedbackIssue;
use crate::fuzzy::best_match;
use crate::model::{LanguageModel, ModelRequest, Phase};
use crate::prompt::{ExecutionContext, STRATEGY_SYSTEM_PROMPT, strategy_prompt};
use crate::util::{extract_json_object, json_kind};

/// Function name to the parameter names worth mutating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MutationTargetMap(BTreeMap<String, BTreeSet<String>>);

impl MutationTargetMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, function: impl Into<String>, parameters: BTreeSet<String>) {
        self.0.insert(function.into(), parameters);
    }

    pub fn targets(&self, function: &str) -> Option<&BTreeSet<String>> {
        self.0.get(function)
    }

    pub fn is_target(&self, function: &str, parameter: &str) -> bool {
        self.0
            .get(function)
            .is_some_and(|parameters| parameters.contains(parameter))
    }

    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<F, P> FromIterator<(F, P)> for MutationTargetMap
where
    F: Into<String>,
    P: IntoIterator,
    P::Item: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (F, P)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(function, parameters)| {
                    (
                        function.into(),
                        parameters.into_iter().map(Into::into).collect(),
                    )
                })
                .collect(),
        )
    }
}

/// The state-changing functions of a contract and their parameter names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundTruth {
    functions: Vec<(String, Vec<String>)>,
    listing: String,
}

impl GroundTruth {
    /// Every non-constant function, then the first constructor (as
    /// `constructor`). Overloads share one entry whose parameter names are
    /// merged in first-seen order.
    pub fn from_abi(abi: &Abi) -> Self {
        let mut functions: Vec<(String, Vec<String>)> = Vec::new();
        let mut listed: Vec<String> = Vec::new();

        let mut add = |name: &str, entry: &AbiEntry| {
            listed.push(format!(
                "{}:{}({})",
                listed.len() + 1,
                name,
                entry
                    .inputs
                    .iter()
                    .map(|input| format!("{} {}", input.canonical_type(), input.name))
                    .collect::<Vec<_>>()
                    .join(",")
            ));
            let position = match functions.iter().position(|(known, _)| known == name) {
                Some(position) => position,
                None => {
                    functions.push((name.to_string(), Vec::new()));
                    functions.len() - 1
                }
            };
            let params = &mut functions[position].1;
            for param in entry.param_names() {
                if !params.contains(&param) {
                    params.push(param);
                }
            }
        };

        for entry in abi.functions().filter(|entry| !entry.is_constant()) {
            add(&entry.name, entry);
        }
        if let Some(constructor) = abi.constructor() {
            add(CONSTRUCTOR_KEY, constructor);
        }

        Self {
            functions,
            listing: listed.join(","),
        }
    }

    pub fn functions(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.functions
            .iter()
            .map(|(name, params)| (name.as_str(), params.as_slice()))
    }

    pub fn params(&self, function: &str) -> Option<&[String]> {
        self.functions
            .iter()
            .find(|(name, _)| name == function)
            .map(|(_, params)| params.as_slice())
    }

    /// `1:deposit(uint256 amount),2:withdraw(uint256 value)`
    pub fn listing(&self) -> &str {
        &self.listing
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

fn parse_feedback_object(raw: &str) -> Result<Map<String, Value>, FeedbackIssue> {
    let text = extract_json_object(raw).ok_or(FeedbackIssue::NoJsonObject)?;
    let value: Value = serde_json::from_str(text)
        .or_else(|_| serde_json::from_str(&text.replace('\'', "\"")))
        .map_err(|_| FeedbackIssue::InvalidJson)?;
    match value {
        Value::Object(object) if !object.is_empty() => Ok(object),
        _ => Err(FeedbackIssue::EmptyObject),
    }
}

/// Validates one raw strategy reply against `ground_truth`.
///
/// On success every ground-truth function is a key of the returned map and
/// every parameter is spelled as in the ABI.
pub fn validate_feedback(
    raw: &str,
    ground_truth: &GroundTruth,
    max_distance: usize,
) -> Result<MutationTargetMap, Vec<FeedbackIssue>> {
    let feedback = parse_feedback_object(raw).map_err(|issue| vec![issue])?;
    let keys: Vec<&str> = feedback.keys().map(String::as_str).collect();

    let mut issues = Vec::new();
    let mut validated = MutationTargetMap::new();
    for (function, params) in ground_truth.functions() {
        let Some(key) = best_match(function, keys.iter().copied(), max_distance) else {
            issues.push(FeedbackIssue::MissingFunction {
                function: function.to_string(),
            });
            continue;
        };
        let proposed = match &feedback[key] {
            Value::Array(proposed) => proposed,
            other => {
                issues.push(FeedbackIssue::NotAList {
                    function: function.to_string(),
                    received: json_kind(other).to_string(),
                });
                continue;
            }
        };

        let mut targets = BTreeSet::new();
        for parameter in proposed {
            let matched = parameter.as_str().and_then(|parameter| {
                best_match(parameter, params.iter().map(String::as_str), max_distance)
            });
            match matched {
                Some(matched) => {
                    targets.insert(matched.to_string());
                }
                None => issues.push(FeedbackIssue::UnknownParameter {
                    function: function.to_string(),
                    parameter: parameter
                        .as_str()
                        .map_or_else(|| parameter.to_string(), str::to_string),
                    available: params.to_vec(),
                }),
            }
        }
        validated.insert(function, targets);
    }

    if !issues.is_empty() {
        return Err(issues);
    }
    if validated.len() < ground_truth.len() {
        return Err(vec![FeedbackIssue::Incomplete]);
    }
    Ok(validated)
}

/// Result of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    Validated {
        targets: MutationTargetMap,
        attempts: usize,
    },
    /// Every attempt failed; the reminders that were sent are kept for
    /// diagnostics.
    Exhausted {
        attempts: usize,
        reminders: Vec<FeedbackIssue>,
    },
}

impl StrategyOutcome {
    pub fn attempts(&self) -> usize {
        match self {
            StrategyOutcome::Validated { attempts, .. } | StrategyOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    /// The validated map, or an empty one when the budget was exhausted.
    pub fn into_targets(self) -> MutationTargetMap {
        match self {
            StrategyOutcome::Validated { targets, .. } => targets,
            StrategyOutcome::Exhausted { .. } => MutationTargetMap::new(),
        }
    }
}

pub struct StrategyReconciler {
    ground_truth: GroundTruth,
    contract_source: String,
    max_edit_distance: usize,
    max_retries: usize,
    temperature: f32,
    log: Logger,
}

impl StrategyReconciler {
    pub fn new(ground_truth: GroundTruth, contract_source: impl Into<String>) -> Self {
        Self {
            ground_truth,
            contract_source: contract_source.into(),
            max_edit_distance: DEFAULT_MAX_EDIT_DISTANCE,
            max_retries: DEFAULT_MAX_RETRIES,
            temperature: STRATEGY_TEMPERATURE,
            log: Logger::root(Discard, o!()),
        }
    }

    pub fn with_limits(mut self, max_edit_distance: usize, max_retries: usize) -> Self {
        self.max_edit_distance = max_edit_distance;
        self.max_retries = max_retries;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn ground_truth(&self) -> &GroundTruth {
        &self.ground_truth
    }

    pub fn validate(&self, raw: &str) -> Result<MutationTargetMap, Vec<FeedbackIssue>> {
        validate_feedback(raw, &self.ground_truth, self.max_edit_distance)
    }

    /// Asks `model` for mutation targets until a reply validates or
    /// `max_retries` attempts have been made. Issues from every failed
    /// attempt are carried into the following prompts.
    pub fn reconcile<M: LanguageModel>(
        &self,
        model: &mut M,
        context: &ExecutionContext,
    ) -> StrategyOutcome {
        if self.ground_truth.is_empty() {
            debug!(self.log, "No state functions to target, skipping strategy request");
            return StrategyOutcome::Validated {
                targets: MutationTargetMap::new(),
                attempts: 0,
            };
        }

        let mut reminders: Vec<FeedbackIssue> = Vec::new();
        for attempt in 1..=self.max_retries {
            let prompt = strategy_prompt(
                context,
                &self.contract_source,
                self.ground_truth.listing(),
                &reminders,
            );
            let request = ModelRequest::new(Phase::Strategy, prompt, self.temperature)
                .with_system(STRATEGY_SYSTEM_PROMPT)
                .json_output();

            let reply = match model.complete(&request) {
                Ok(response) => response.content,
                Err(e) => {
                    warn!(self.log, "Strategy request failed"; "attempt" => attempt, "error" => %e);
                    reminders.push(FeedbackIssue::Transport(e.to_string()));
                    continue;
                }
            };

            match self.validate(&reply) {
                Ok(targets) => {
                    info!(self.log, "Received a valid mutation strategy";
                        "attempt" => attempt,
                        "functions" => targets.len());
                    return StrategyOutcome::Validated { targets, attempts: attempt };
                }
                Err(issues) => {
                    warn!(self.log, "Mutation strategy rejected";
                        "attempt" => attempt,
                        "issues" => issues.len());
                    reminders.extend(issues);
                }
            }
        }

        warn!(self.log, "No valid mutation strategy after all attempts";
            "attempts" => self.max_retries);
        StrategyOutcome::Exhausted {
            attempts: self.max_retries,
            reminders,
        }
    }
}
