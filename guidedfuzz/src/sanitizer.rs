//! Validation of model-generated transaction batches.
//!
//! A model reply is decoded into candidate test cases, and each candidate is
//! either turned into a [`ValidatedSeed`] or rejected with exactly one
//! [`RejectionKind`]. Nothing here fails towards the caller: every problem is
//! counted and logged.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use slog::{Discard, Logger, info, o, warn};
use std::collections::BTreeMap;

use crate::constants::{DEFAULT_AMOUNT, DEFAULT_BLOCKNUMBER, DEFAULT_TIMESTAMP};
use crate::error::{CoercionError, SanitizeError};
use crate::signature::{FunctionKey, Interface, Resolution, SignatureIndex};
use crate::stats::{RejectionKind, RejectionStats};
use crate::util::json_kind;
use crate::value::{AbiValue, coerce, integer_json, parse_integer};

/// A test case that passed validation, in the fuzzer's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSeed {
    pub function: FunctionKey,
    pub arguments: Vec<AbiValue>,
    pub amount: u128,
    pub blocknumber: u64,
    pub timestamp: u64,
    pub call_return: BTreeMap<String, u64>,
    pub extcodesize: BTreeMap<String, u64>,
    pub returndatasize: BTreeMap<String, u64>,
}

impl ValidatedSeed {
    pub fn new(function: FunctionKey, arguments: Vec<AbiValue>) -> Self {
        Self {
            function,
            arguments,
            amount: DEFAULT_AMOUNT,
            blocknumber: DEFAULT_BLOCKNUMBER,
            timestamp: DEFAULT_TIMESTAMP,
            call_return: BTreeMap::new(),
            extcodesize: BTreeMap::new(),
            returndatasize: BTreeMap::new(),
        }
    }

    /// `{"arguments": [selector, args...], "amount": .., ...}`
    pub fn to_json(&self) -> Value {
        let mut arguments = Vec::with_capacity(self.arguments.len() + 1);
        arguments.push(Value::String(self.function.to_string()));
        arguments.extend(self.arguments.iter().map(AbiValue::to_json));

        let mut object = Map::new();
        object.insert("arguments".to_string(), Value::Array(arguments));
        object.insert("amount".to_string(), integer_json(&BigInt::from(self.amount)));
        object.insert("blocknumber".to_string(), Value::from(self.blocknumber));
        object.insert("timestamp".to_string(), Value::from(self.timestamp));
        object.insert("call_return".to_string(), map_json(&self.call_return));
        object.insert("extcodesize".to_string(), map_json(&self.extcodesize));
        object.insert("returndatasize".to_string(), map_json(&self.returndatasize));
        Value::Object(object)
    }
}

fn map_json(map: &BTreeMap<String, u64>) -> Value {
    Value::Object(
        map.iter()
            .map(|(address, value)| (address.clone(), Value::from(*value)))
            .collect(),
    )
}

impl Serialize for ValidatedSeed {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// First-level classification of a raw model reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    ParsedBatch(Vec<Value>),
    MalformedJson(String),
}

impl ModelReply {
    pub fn parse(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw.trim()) {
            Ok(value) => value,
            Err(e) => return ModelReply::MalformedJson(e.to_string()),
        };
        let mut object = match value {
            Value::Object(object) => object,
            other => {
                return ModelReply::MalformedJson(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                ));
            }
        };
        match object.remove("transactions") {
            None => ModelReply::ParsedBatch(Vec::new()),
            Some(Value::Array(candidates)) => ModelReply::ParsedBatch(candidates),
            Some(other) => ModelReply::MalformedJson(format!(
                "`transactions` must be an array, got {}",
                json_kind(&other)
            )),
        }
    }
}

/// Second-level classification of one candidate test case.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateOutcome {
    Valid(ValidatedSeed),
    Rejected(SanitizeError),
}

/// Result of sanitizing one model reply.
#[derive(Debug, Clone, Default)]
pub struct SanitizedBatch {
    pub seeds: Vec<ValidatedSeed>,
    /// Counter delta for this reply alone.
    pub stats: RejectionStats,
    pub rejections: Vec<SanitizeError>,
}

pub struct SeedSanitizer<'a> {
    index: &'a SignatureIndex,
    interface: &'a Interface,
    log: Logger,
}

impl<'a> SeedSanitizer<'a> {
    pub fn new(index: &'a SignatureIndex, interface: &'a Interface) -> Self {
        Self {
            index,
            interface,
            log: Logger::root(Discard, o!()),
        }
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    /// Sanitizes a raw model reply.
    pub fn sanitize(&self, raw: &str) -> SanitizedBatch {
        let mut batch = SanitizedBatch::default();

        let candidates = match ModelReply::parse(raw) {
            ModelReply::ParsedBatch(candidates) => candidates,
            ModelReply::MalformedJson(reason) => {
                warn!(self.log, "Discarding malformed model response"; "reason" => %reason);
                let error = SanitizeError::MalformedResponse(reason);
                batch.stats.record_rejected(error.kind());
                batch.rejections.push(error);
                return batch;
            }
        };

        for candidate in &candidates {
            match self.sanitize_candidate(candidate) {
                CandidateOutcome::Valid(seed) => {
                    batch.stats.record_accepted();
                    batch.seeds.push(seed);
                }
                CandidateOutcome::Rejected(error) => {
                    warn!(self.log, "Rejected generated test case";
                        "reason" => %error.kind(),
                        "error" => %error);
                    batch.stats.record_rejected(error.kind());
                    batch.rejections.push(error);
                }
            }
        }

        info!(self.log, "Sanitized generated batch";
            "generated" => batch.stats.total_generated,
            "accepted" => batch.stats.total_accepted,
            "rejected" => batch.stats.total_rejected);
        batch
    }

    pub fn sanitize_candidate(&self, candidate: &Value) -> CandidateOutcome {
        match self.validate(candidate) {
            Ok(seed) => CandidateOutcome::Valid(seed),
            Err(error) => CandidateOutcome::Rejected(error),
        }
    }

    fn validate(&self, candidate: &Value) -> Result<ValidatedSeed, SanitizeError> {
        let object = candidate.as_object().ok_or_else(|| {
            SanitizeError::InvalidFormat(format!("test case is {}", json_kind(candidate)))
        })?;
        let arguments = match object.get("arguments") {
            Some(Value::Array(arguments)) if !arguments.is_empty() => arguments,
            Some(Value::Array(_)) => {
                return Err(SanitizeError::InvalidFormat("`arguments` is empty".to_string()));
            }
            Some(other) => {
                return Err(SanitizeError::InvalidFormat(format!(
                    "`arguments` is {}",
                    json_kind(other)
                )));
            }
            None => {
                return Err(SanitizeError::InvalidFormat(
                    "missing `arguments`".to_string(),
                ));
            }
        };

        let positional = &arguments[1..];
        let key = self.resolve(&arguments[0], positional.len())?;
        let function = key.to_string();

        let expected = self
            .interface
            .expected_types(&key)
            .ok_or_else(|| SanitizeError::UnknownSelector {
                identifier: function.clone(),
            })?;
        if expected.len() != positional.len() {
            return Err(SanitizeError::ArgumentCount {
                function,
                expected: expected.len(),
                received: positional.len(),
            });
        }

        let mut values = Vec::with_capacity(positional.len());
        for (position, (value, ty)) in positional.iter().zip(expected).enumerate() {
            let coerced = coerce(value, ty).map_err(|source| SanitizeError::TypeCoercion {
                function: function.clone(),
                field: format!("argument {}", position + 1),
                source,
            })?;
            values.push(coerced);
        }

        let mut seed = ValidatedSeed::new(key, values);
        if let Some(amount) = object.get("amount") {
            seed.amount = environment_integer(amount, "amount", &function, |v| v.to_u128())?;
        }
        if let Some(blocknumber) = object.get("blocknumber") {
            seed.blocknumber =
                environment_integer(blocknumber, "blocknumber", &function, |v| v.to_u64())?;
        }
        if let Some(timestamp) = object.get("timestamp") {
            seed.timestamp =
                environment_integer(timestamp, "timestamp", &function, |v| v.to_u64())?;
        }
        Ok(seed)
    }

    fn resolve(&self, identifier: &Value, arity: usize) -> Result<FunctionKey, SanitizeError> {
        let Some(identifier) = identifier.as_str() else {
            return Err(SanitizeError::UnknownSelector {
                identifier: identifier.to_string(),
            });
        };
        let identifier = identifier.trim();
        match self.index.resolve(identifier, arity) {
            Resolution::Resolved(key) => Ok(key),
            Resolution::Ambiguous(candidates) => Err(SanitizeError::AmbiguousFunction {
                identifier: identifier.to_string(),
                arity,
                candidates,
            }),
            Resolution::ArityMismatch { arities } => Err(SanitizeError::OverloadArity {
                function: identifier.to_string(),
                arities,
                received: arity,
            }),
            Resolution::Unknown => identifier
                .parse::<FunctionKey>()
                .ok()
                .filter(|key| self.interface.contains(key))
                .ok_or_else(|| SanitizeError::UnknownSelector {
                    identifier: identifier.to_string(),
                }),
        }
    }
}

fn environment_integer<T>(
    value: &Value,
    field: &str,
    function: &str,
    narrow: impl FnOnce(&BigInt) -> Option<T>,
) -> Result<T, SanitizeError> {
    let coercion_error = |source| SanitizeError::TypeCoercion {
        function: function.to_string(),
        field: field.to_string(),
        source,
    };
    let parsed = parse_integer(value).ok_or_else(|| {
        coercion_error(CoercionError::Integer {
            ty: field.to_string(),
            value: value.to_string(),
        })
    })?;
    narrow(&parsed).ok_or_else(|| {
        coercion_error(CoercionError::OutOfRange {
            field: field.to_string(),
            value: parsed.to_string(),
        })
    })
}

impl CandidateOutcome {
    pub fn rejection_kind(&self) -> Option<RejectionKind> {
        match self {
            CandidateOutcome::Valid(_) => None,
            CandidateOutcome::Rejected(error) => Some(error.kind()),
        }
    }
}
