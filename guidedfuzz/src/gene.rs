//! The fuzzer's transaction representation and its value-producer seam.

use num_bigint::BigInt;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::abi::AbiType;
use crate::sanitizer::ValidatedSeed;
use crate::signature::FunctionKey;
use crate::value::{AbiValue, integer_json};

/// One transaction of an individual.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gene {
    pub function: FunctionKey,
    pub arguments: Vec<AbiValue>,
    pub account: Option<String>,
    pub amount: Option<u128>,
    pub gaslimit: Option<u64>,
    pub timestamp: Option<u64>,
    pub blocknumber: Option<u64>,
    pub balance: Option<u128>,
    pub call_return: Option<BTreeMap<String, u64>>,
    pub extcodesize: Option<BTreeMap<String, u64>>,
    pub returndatasize: Option<BTreeMap<String, u64>>,
}

impl Gene {
    pub fn new(function: FunctionKey, arguments: Vec<AbiValue>) -> Self {
        Self {
            function,
            arguments,
            account: None,
            amount: None,
            gaslimit: None,
            timestamp: None,
            blocknumber: None,
            balance: None,
            call_return: None,
            extcodesize: None,
            returndatasize: None,
        }
    }

    pub fn to_json(&self) -> Value {
        let mut arguments = vec![Value::String(self.function.to_string())];
        arguments.extend(self.arguments.iter().map(AbiValue::to_json));

        let mut object = Map::new();
        object.insert("arguments".to_string(), Value::Array(arguments));
        if let Some(account) = &self.account {
            object.insert("account".to_string(), Value::String(account.clone()));
        }
        if let Some(amount) = self.amount {
            object.insert("amount".to_string(), integer_json(&BigInt::from(amount)));
        }
        if let Some(gaslimit) = self.gaslimit {
            object.insert("gaslimit".to_string(), Value::from(gaslimit));
        }
        if let Some(timestamp) = self.timestamp {
            object.insert("timestamp".to_string(), Value::from(timestamp));
        }
        if let Some(blocknumber) = self.blocknumber {
            object.insert("blocknumber".to_string(), Value::from(blocknumber));
        }
        if let Some(balance) = self.balance {
            object.insert("balance".to_string(), integer_json(&BigInt::from(balance)));
        }
        for (name, map) in [
            ("call_return", &self.call_return),
            ("extcodesize", &self.extcodesize),
            ("returndatasize", &self.returndatasize),
        ] {
            if let Some(map) = map {
                let entries = map
                    .iter()
                    .map(|(address, value)| (address.clone(), Value::from(*value)))
                    .collect();
                object.insert(name.to_string(), Value::Object(entries));
            }
        }
        Value::Object(object)
    }
}

impl From<ValidatedSeed> for Gene {
    fn from(seed: ValidatedSeed) -> Self {
        Self {
            amount: Some(seed.amount),
            timestamp: Some(seed.timestamp),
            blocknumber: Some(seed.blocknumber),
            call_return: Some(seed.call_return),
            extcodesize: Some(seed.extcodesize),
            returndatasize: Some(seed.returndatasize),
            ..Self::new(seed.function, seed.arguments)
        }
    }
}

impl Serialize for Gene {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// The fuzzer's random value producers.
///
/// The mutator decides *whether* a field changes; an implementation of this
/// trait decides *what* it changes to.
pub trait ValueSource {
    /// A fresh value for argument `index` of `function`, declared as `ty`.
    fn random_argument(&mut self, ty: &AbiType, function: &FunctionKey, index: usize) -> AbiValue;
    fn random_account(&mut self) -> String;
    fn random_amount(&mut self, function: &FunctionKey) -> u128;
    fn random_gaslimit(&mut self) -> u64;
    fn random_timestamp(&mut self) -> u64;
    fn random_blocknumber(&mut self) -> u64;
    fn random_balance(&mut self) -> u128;
    fn random_call_return(&mut self, function: &FunctionKey, address: &str) -> u64;
    fn random_call_return_entry(&mut self, function: &FunctionKey) -> (String, u64);
    fn random_extcodesize(&mut self, function: &FunctionKey, address: &str) -> u64;
    fn random_extcodesize_entry(&mut self, function: &FunctionKey) -> (String, u64);
    fn random_returndatasize(&mut self, function: &FunctionKey, address: &str) -> u64;
    fn random_returndatasize_entry(&mut self, function: &FunctionKey) -> (String, u64);
}
