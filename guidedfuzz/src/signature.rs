//! Function selectors and the signature index built from a contract ABI.
//!
//! The index is keyed by full canonical signature so that overloaded
//! functions never shadow each other. Lookups by bare name only succeed when
//! the name is unambiguous or the caller can disambiguate by argument count.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::abi::{Abi, AbiType};
use crate::constants::{CONSTRUCTOR_KEY, FALLBACK_KEY, SELECTOR_LEN};
use crate::error::FunctionKeyError;

/// The first four bytes of the Keccak-256 hash of a canonical signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selector([u8; SELECTOR_LEN]);

impl Selector {
    pub fn from_signature(signature: &str) -> Self {
        let hash = Keccak256::digest(signature.as_bytes());
        let mut bytes = [0u8; SELECTOR_LEN];
        bytes.copy_from_slice(&hash[..SELECTOR_LEN]);
        Self(bytes)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl FromStr for Selector {
    type Err = FunctionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| FunctionKeyError(s.to_string()))?;
        let mut bytes = [0u8; SELECTOR_LEN];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| FunctionKeyError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

/// What `arguments[0]` of a transaction refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FunctionKey {
    Selector(Selector),
    Constructor,
    Fallback,
}

impl FunctionKey {
    pub fn selector(&self) -> Option<Selector> {
        match self {
            FunctionKey::Selector(selector) => Some(*selector),
            _ => None,
        }
    }
}

impl From<Selector> for FunctionKey {
    fn from(selector: Selector) -> Self {
        FunctionKey::Selector(selector)
    }
}

impl fmt::Display for FunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionKey::Selector(selector) => fmt::Display::fmt(selector, f),
            FunctionKey::Constructor => f.write_str(CONSTRUCTOR_KEY),
            FunctionKey::Fallback => f.write_str(FALLBACK_KEY),
        }
    }
}

impl FromStr for FunctionKey {
    type Err = FunctionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            CONSTRUCTOR_KEY => Ok(FunctionKey::Constructor),
            FALLBACK_KEY => Ok(FunctionKey::Fallback),
            _ => s.parse().map(FunctionKey::Selector),
        }
    }
}

impl Serialize for FunctionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FunctionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The fuzzer's interface map: expected argument types per function key,
/// including the literal `constructor` / `fallback` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interface {
    functions: BTreeMap<FunctionKey, Vec<AbiType>>,
}

impl Interface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the interface the same way the fuzzer does: every function by
    /// selector, the constructor's input types, and an empty fallback entry.
    pub fn from_abi(abi: &Abi) -> Self {
        let mut interface = Self::new();
        for entry in abi.functions() {
            let selector = Selector::from_signature(&entry.canonical_signature());
            interface.insert(selector.into(), entry.input_types());
        }
        if let Some(constructor) = abi.constructor() {
            interface.insert(FunctionKey::Constructor, constructor.input_types());
        }
        if abi.has_fallback() {
            interface.insert(FunctionKey::Fallback, Vec::new());
        }
        interface
    }

    pub fn insert(&mut self, key: FunctionKey, types: Vec<AbiType>) {
        self.functions.insert(key, types);
    }

    pub fn expected_types(&self, key: &FunctionKey) -> Option<&[AbiType]> {
        self.functions.get(key).map(Vec::as_slice)
    }

    pub fn contains(&self, key: &FunctionKey) -> bool {
        self.functions.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &FunctionKey> {
        self.functions.keys()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FromIterator<(FunctionKey, Vec<AbiType>)> for Interface {
    fn from_iter<T: IntoIterator<Item = (FunctionKey, Vec<AbiType>)>>(iter: T) -> Self {
        Self {
            functions: iter.into_iter().collect(),
        }
    }
}

/// Everything known about one callable entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub key: FunctionKey,
    /// Canonical signature text, e.g. `transfer(address,uint256)`.
    pub text: String,
    pub input_types: Vec<AbiType>,
    pub param_names: Vec<String>,
}

impl FunctionSignature {
    pub fn arity(&self) -> usize {
        self.input_types.len()
    }
}

/// Result of resolving a model-supplied function identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(FunctionKey),
    /// Several overloads remain after filtering by argument count.
    Ambiguous(Vec<String>),
    /// The name is overloaded but no overload takes `arity` arguments.
    /// `arities` lists the counts that would match, ascending.
    ArityMismatch { arities: Vec<usize> },
    Unknown,
}

/// Name, signature and selector maps for one contract.
#[derive(Debug, Clone, Default)]
pub struct SignatureIndex {
    by_signature: BTreeMap<String, FunctionKey>,
    by_key: BTreeMap<FunctionKey, FunctionSignature>,
    by_name: BTreeMap<String, Vec<FunctionKey>>,
}

impl SignatureIndex {
    /// Builds the index from the ABI. Only `function` entries are hashed;
    /// `constructor` and `fallback` are registered as identity entries when
    /// the fuzzer's interface carries them.
    pub fn from_abi(abi: &Abi, interface: &Interface) -> Self {
        let mut index = Self::default();

        for entry in abi.functions() {
            let text = entry.canonical_signature();
            let key = FunctionKey::Selector(Selector::from_signature(&text));
            index.register(FunctionSignature {
                name: entry.name.clone(),
                key,
                text,
                input_types: entry.input_types(),
                param_names: entry.param_names(),
            });
        }

        if let Some(types) = interface.expected_types(&FunctionKey::Constructor) {
            let param_names = abi
                .constructor()
                .map(|entry| entry.param_names())
                .unwrap_or_default();
            let text = format!(
                "{CONSTRUCTOR_KEY}({})",
                types.iter().map(AbiType::as_str).collect::<Vec<_>>().join(",")
            );
            index.register(FunctionSignature {
                name: CONSTRUCTOR_KEY.to_string(),
                key: FunctionKey::Constructor,
                text,
                input_types: types.to_vec(),
                param_names,
            });
        }

        if interface.contains(&FunctionKey::Fallback) {
            index.register(FunctionSignature {
                name: FALLBACK_KEY.to_string(),
                key: FunctionKey::Fallback,
                text: format!("{FALLBACK_KEY}()"),
                input_types: Vec::new(),
                param_names: Vec::new(),
            });
        }

        index
    }

    fn register(&mut self, signature: FunctionSignature) {
        let key = signature.key;
        if self.by_key.insert(key, signature.clone()).is_none() {
            self.by_name
                .entry(signature.name.clone())
                .or_default()
                .push(key);
        }
        self.by_signature.insert(signature.text, key);
    }

    /// The selector for `name`, if exactly one function carries that name.
    pub fn selector_of(&self, name: &str) -> Option<FunctionKey> {
        match self.by_name.get(name).map(Vec::as_slice) {
            Some([key]) => Some(*key),
            _ => None,
        }
    }

    /// All unambiguous `name -> selector` pairs.
    pub fn name_to_selector(&self) -> BTreeMap<&str, FunctionKey> {
        self.by_name
            .iter()
            .filter_map(|(name, keys)| match keys.as_slice() {
                [key] => Some((name.as_str(), *key)),
                _ => None,
            })
            .collect()
    }

    pub fn info(&self, key: &FunctionKey) -> Option<&FunctionSignature> {
        self.by_key.get(key)
    }

    pub fn by_signature(&self, text: &str) -> Option<&FunctionSignature> {
        self.by_signature
            .get(text)
            .and_then(|key| self.by_key.get(key))
    }

    pub fn overloads(&self, name: &str) -> &[FunctionKey] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Resolves a function name or canonical signature text. Overloaded names
    /// are narrowed by `arity`, the number of positional arguments supplied.
    pub fn resolve(&self, identifier: &str, arity: usize) -> Resolution {
        if identifier.contains('(') {
            let text: String = identifier.chars().filter(|c| !c.is_whitespace()).collect();
            return match self.by_signature(&text) {
                Some(signature) => Resolution::Resolved(signature.key),
                None => Resolution::Unknown,
            };
        }

        let candidates = self.overloads(identifier);
        match candidates {
            [] => Resolution::Unknown,
            [key] => Resolution::Resolved(*key),
            _ => {
                let matching: Vec<&FunctionSignature> = candidates
                    .iter()
                    .filter_map(|key| self.by_key.get(key))
                    .filter(|signature| signature.arity() == arity)
                    .collect();
                match matching.as_slice() {
                    [signature] => Resolution::Resolved(signature.key),
                    [] => {
                        let mut arities: Vec<usize> = candidates
                            .iter()
                            .filter_map(|key| self.by_key.get(key))
                            .map(FunctionSignature::arity)
                            .collect();
                        arities.sort_unstable();
                        arities.dedup();
                        Resolution::ArityMismatch { arities }
                    }
                    several => Resolution::Ambiguous(
                        several.iter().map(|signature| signature.text.clone()).collect(),
                    ),
                }
            }
        }
    }

    pub fn signatures(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.by_key.values()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}
