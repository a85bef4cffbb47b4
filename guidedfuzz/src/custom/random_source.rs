//! Boundary-heavy [`ValueSource`] for standalone use of the mutator.
//!
//! Integers follow a skewed distribution: ~40% exact type boundaries, ~30%
//! near a boundary, ~30% uniform over the type's range.

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

use crate::abi::{AbiType, TypeCategory};
use crate::gene::ValueSource;
use crate::signature::FunctionKey;
use crate::value::AbiValue;

const MAX_ARRAY_LEN: usize = 3;
const MAX_BYTES_LEN: usize = 64;
const ONE_ETHER: u128 = 1_000_000_000_000_000_000;
const BASE_TIMESTAMP: u64 = 1_700_000_000;
const MAX_CODE_SIZE: u64 = 24_576;

const INTERESTING_STRINGS: [&str; 5] = ["", "a", "FUZZ", "0x", "\u{0}\u{ff}"];

pub struct RandomValueSource {
    rng: StdRng,
    accounts: Vec<String>,
}

impl RandomValueSource {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            accounts: Vec::new(),
        }
    }

    /// Addresses picked for `account` and, half of the time, for `address`
    /// arguments.
    pub fn with_accounts(mut self, accounts: Vec<String>) -> Self {
        self.accounts = accounts;
        self
    }

    fn random_hex(&mut self, len: usize) -> String {
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes[..]);
        format!("0x{}", hex::encode(bytes))
    }

    fn random_address(&mut self) -> String {
        if !self.accounts.is_empty() && self.rng.random_bool(0.5) {
            let index = self.rng.random_range(0..self.accounts.len());
            return self.accounts[index].clone();
        }
        self.random_hex(20)
    }

    fn gen_integer(&mut self, bits: u32, signed: bool) -> BigInt {
        let span = BigInt::one() << bits;
        let (min, max): (BigInt, BigInt) = if signed {
            let half = BigInt::one() << (bits - 1);
            (-half.clone(), half - 1)
        } else {
            (BigInt::zero(), &span - 1)
        };

        let mut boundaries = vec![BigInt::zero(), BigInt::one(), max.clone(), &max - 1];
        if signed {
            boundaries.extend([min.clone(), &min + 1, BigInt::from(-1)]);
        }

        let roll = self.rng.random_range(0..10);
        if roll < 4 {
            let index = self.rng.random_range(0..boundaries.len());
            boundaries.swap_remove(index)
        } else if roll < 7 {
            let index = self.rng.random_range(0..boundaries.len());
            let delta = BigInt::from(self.rng.random_range(1..=16u32));
            let near = if self.rng.random_bool(0.5) {
                &boundaries[index] + delta
            } else {
                &boundaries[index] - delta
            };
            near.clamp(min, max)
        } else {
            let mut bytes = vec![0u8; (bits as usize).div_ceil(8)];
            self.rng.fill(&mut bytes[..]);
            let unsigned = BigInt::from(BigUint::from_bytes_be(&bytes)) % &span;
            if signed { unsigned + min } else { unsigned }
        }
    }

    fn gen_value(&mut self, ty: &AbiType) -> Value {
        if let Some(components) = ty.tuple_components() {
            return Value::Array(components.iter().map(|component| self.gen_value(component)).collect());
        }
        if let Some(element) = ty.element() {
            let len = self.rng.random_range(0..=MAX_ARRAY_LEN);
            return Value::Array((0..len).map(|_| self.gen_value(&element)).collect());
        }
        match ty.category() {
            TypeCategory::Integer => {
                let bits = ty.integer_bits().unwrap_or(256);
                AbiValue::Int(self.gen_integer(bits, ty.is_signed())).to_json()
            }
            TypeCategory::Boolean => Value::Bool(self.rng.random_bool(0.5)),
            TypeCategory::Passthrough => self.gen_passthrough(ty.as_str()),
        }
    }

    fn gen_passthrough(&mut self, ty: &str) -> Value {
        match ty {
            "address" => Value::String(self.random_address()),
            "string" => {
                if self.rng.random_bool(0.5) {
                    let index = self.rng.random_range(0..INTERESTING_STRINGS.len());
                    Value::String(INTERESTING_STRINGS[index].to_string())
                } else {
                    let len = self.rng.random_range(1..=16);
                    Value::String(
                        (0..len)
                            .map(|_| char::from(self.rng.random_range(b'a'..=b'z')))
                            .collect(),
                    )
                }
            }
            "bytes" => {
                let len = self.rng.random_range(0..=MAX_BYTES_LEN);
                Value::String(self.random_hex(len))
            }
            _ => match ty.strip_prefix("bytes").and_then(|n| n.parse::<usize>().ok()) {
                Some(len) if (1..=32).contains(&len) => Value::String(self.random_hex(len)),
                _ => Value::Null,
            },
        }
    }

    fn gen_wei(&mut self) -> u128 {
        match self.rng.random_range(0..4) {
            0 => 0,
            1 => self.rng.random_range(1..=1_000_000),
            2 => ONE_ETHER * self.rng.random_range(1..=100),
            _ => self.rng.random(),
        }
    }
}

impl ValueSource for RandomValueSource {
    fn random_argument(&mut self, ty: &AbiType, _function: &FunctionKey, _index: usize) -> AbiValue {
        if ty.is_scalar() {
            match ty.category() {
                TypeCategory::Integer => {
                    let bits = ty.integer_bits().unwrap_or(256);
                    return AbiValue::Int(self.gen_integer(bits, ty.is_signed()));
                }
                TypeCategory::Boolean => return AbiValue::Bool(self.rng.random_bool(0.5)),
                TypeCategory::Passthrough => {}
            }
        }
        AbiValue::Raw(self.gen_value(ty))
    }

    fn random_account(&mut self) -> String {
        if self.accounts.is_empty() {
            return self.random_hex(20);
        }
        let index = self.rng.random_range(0..self.accounts.len());
        self.accounts[index].clone()
    }

    fn random_amount(&mut self, _function: &FunctionKey) -> u128 {
        self.gen_wei()
    }

    fn random_gaslimit(&mut self) -> u64 {
        self.rng.random_range(21_000..=10_000_000)
    }

    fn random_timestamp(&mut self) -> u64 {
        match self.rng.random_range(0..4) {
            0 => 0,
            _ => BASE_TIMESTAMP + self.rng.random_range(0..=365 * 24 * 3600),
        }
    }

    fn random_blocknumber(&mut self) -> u64 {
        self.rng.random_range(1..=20_000_000)
    }

    fn random_balance(&mut self) -> u128 {
        self.gen_wei()
    }

    fn random_call_return(&mut self, _function: &FunctionKey, _address: &str) -> u64 {
        self.rng.random_range(0..=1)
    }

    fn random_call_return_entry(&mut self, function: &FunctionKey) -> (String, u64) {
        let address = self.random_address();
        let value = self.random_call_return(function, &address);
        (address, value)
    }

    fn random_extcodesize(&mut self, _function: &FunctionKey, _address: &str) -> u64 {
        if self.rng.random_bool(0.5) {
            0
        } else {
            self.rng.random_range(1..=MAX_CODE_SIZE)
        }
    }

    fn random_extcodesize_entry(&mut self, function: &FunctionKey) -> (String, u64) {
        let address = self.random_address();
        let value = self.random_extcodesize(function, &address);
        (address, value)
    }

    fn random_returndatasize(&mut self, _function: &FunctionKey, _address: &str) -> u64 {
        self.rng.random_range(0..=1024)
    }

    fn random_returndatasize_entry(&mut self, function: &FunctionKey) -> (String, u64) {
        let address = self.random_address();
        let value = self.random_returndatasize(function, &address);
        (address, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_range(value: &AbiValue, bits: u32, signed: bool) -> bool {
        let Some(v) = value.as_int() else {
            return false;
        };
        if signed {
            let half = BigInt::one() << (bits - 1);
            *v >= -half.clone() && *v < half
        } else {
            *v >= BigInt::zero() && *v < (BigInt::one() << bits)
        }
    }

    #[test]
    fn integers_stay_within_their_type() {
        let mut source = RandomValueSource::new(7);
        let key = FunctionKey::Fallback;
        for (ty, bits, signed) in [("uint8", 8, false), ("int16", 16, true), ("uint256", 256, false)] {
            let ty = AbiType::from(ty);
            for _ in 0..200 {
                let value = source.random_argument(&ty, &key, 0);
                assert!(in_range(&value, bits, signed), "{ty}: {value:?}");
            }
        }
    }

    #[test]
    fn shapes_match_types() {
        let mut source = RandomValueSource::new(1);
        let key = FunctionKey::Fallback;
        for _ in 0..50 {
            let address = source.random_argument(&AbiType::from("address"), &key, 0);
            let AbiValue::Raw(Value::String(address)) = address else {
                panic!("address must be a string");
            };
            assert_eq!(address.len(), 42);

            let word = source.random_argument(&AbiType::from("bytes32"), &key, 0);
            assert_eq!(word.to_json().as_str().map(str::len), Some(66));

            let flag = source.random_argument(&AbiType::from("bool"), &key, 0);
            assert!(matches!(flag, AbiValue::Bool(_)));

            let list = source.random_argument(&AbiType::from("uint8[]"), &key, 0);
            let AbiValue::Raw(Value::Array(items)) = list else {
                panic!("arrays are passed as raw JSON");
            };
            assert!(items.len() <= MAX_ARRAY_LEN);
        }
    }

    #[test]
    fn generated_containers_pass_coercion() {
        let mut source = RandomValueSource::new(5);
        let key = FunctionKey::Fallback;
        for ty in ["(address,uint8,bool)", "uint256[]", "(uint16,bool)[]", "int8[][]"] {
            let ty = AbiType::from(ty);
            for _ in 0..30 {
                let value = source.random_argument(&ty, &key, 0);
                assert_eq!(crate::value::coerce(&value.to_json(), &ty), Ok(value));
            }
        }
        let pair = source.random_argument(&AbiType::from("(address,uint8)"), &key, 0);
        assert_matches::assert_matches!(pair, AbiValue::Raw(Value::Array(items)) if items.len() == 2);
    }

    #[test]
    fn same_seed_same_values() {
        let ty = AbiType::from("uint256");
        let key = FunctionKey::Constructor;
        let mut a = RandomValueSource::new(42);
        let mut b = RandomValueSource::new(42);
        for _ in 0..20 {
            assert_eq!(a.random_argument(&ty, &key, 0), b.random_argument(&ty, &key, 0));
        }
    }

    #[test]
    fn accounts_come_from_the_list() {
        let accounts = vec!["0x00000000000000000000000000000000000000aa".to_string()];
        let mut source = RandomValueSource::new(3).with_accounts(accounts.clone());
        for _ in 0..10 {
            assert_eq!(source.random_account(), accounts[0]);
        }
    }
}
