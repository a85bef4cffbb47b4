//! Typed view of a Solidity contract ABI.
//!
//! Only the parts the guidance layer needs are modelled: entry kind, name,
//! ordered inputs and mutability. Unknown fields (`outputs`, `anonymous`,
//! `payable`, ...) are ignored.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AbiError;

/// The `type` tag of an ABI entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Function,
    Constructor,
    Fallback,
    Receive,
    Event,
    Error,
}

/// Coarse category of an ABI type, which decides how a model-proposed value
/// is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    /// Any type whose tag contains `int` (`uint256`, `int8`, ...). Arrays and
    /// tuples are split into their element types before the category applies.
    Integer,
    /// Any type whose tag contains `bool`.
    Boolean,
    /// Everything else is passed through unchanged.
    Passthrough,
}

/// An ABI type tag such as `uint256`, `address` or `bytes32[]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AbiType(String);

impl AbiType {
    pub fn new(ty: impl Into<String>) -> Self {
        Self(ty.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn category(&self) -> TypeCategory {
        if self.0.contains("int") {
            TypeCategory::Integer
        } else if self.0.contains("bool") {
            TypeCategory::Boolean
        } else {
            TypeCategory::Passthrough
        }
    }

    /// The element type of an array type (`uint8[]` -> `uint8`,
    /// `address[3]` -> `address`), or `None` for non-array types.
    pub fn element(&self) -> Option<AbiType> {
        let open = self.0.rfind('[')?;
        self.0
            .ends_with(']')
            .then(|| AbiType::new(&self.0[..open]))
    }

    /// Component types of a canonical tuple type (`(address,uint256[])` ->
    /// `address`, `uint256[]`), or `None` for anything else. Tuple arrays
    /// such as `(address,uint256)[]` are arrays first; see [`AbiType::element`].
    pub fn tuple_components(&self) -> Option<Vec<AbiType>> {
        let inner = self.0.strip_prefix('(')?.strip_suffix(')')?;
        if inner.is_empty() {
            return Some(Vec::new());
        }
        let mut components = Vec::new();
        let mut depth = 0usize;
        let mut start = 0;
        for (i, c) in inner.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.checked_sub(1)?,
                ',' if depth == 0 => {
                    components.push(AbiType::new(&inner[start..i]));
                    start = i + 1;
                }
                _ => {}
            }
        }
        if depth != 0 {
            return None;
        }
        components.push(AbiType::new(&inner[start..]));
        Some(components)
    }

    /// Neither an array nor a tuple.
    pub fn is_scalar(&self) -> bool {
        self.element().is_none() && self.tuple_components().is_none()
    }

    /// Bit width of an integer type; `uint`/`int` without a suffix are 256 bits.
    pub fn integer_bits(&self) -> Option<u32> {
        let digits = self
            .0
            .strip_prefix("uint")
            .or_else(|| self.0.strip_prefix("int"))?;
        if digits.is_empty() {
            return Some(256);
        }
        digits.parse().ok().filter(|bits| (8..=256).contains(bits))
    }

    pub fn is_signed(&self) -> bool {
        self.0.starts_with("int")
    }
}

impl fmt::Display for AbiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AbiType {
    fn from(ty: &str) -> Self {
        Self::new(ty)
    }
}

/// One input (or tuple component) of an ABI entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: AbiType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<AbiParam>,
}

impl AbiParam {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: AbiType::new(ty),
            components: Vec::new(),
        }
    }

    /// The type as it appears in a canonical signature. Tuples are expanded
    /// into their component types, keeping any array suffix:
    /// `tuple[]` with components `(address, uint256)` becomes `(address,uint256)[]`.
    pub fn canonical_type(&self) -> String {
        match self.ty.as_str().strip_prefix("tuple") {
            Some(suffix) => {
                let inner: Vec<String> = self
                    .components
                    .iter()
                    .map(AbiParam::canonical_type)
                    .collect();
                format!("({}){suffix}", inner.join(","))
            }
            None => self.ty.as_str().to_string(),
        }
    }
}

/// A single ABI entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiEntry {
    /// Solidity treats a missing `type` as `function`.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: EntryKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<bool>,
    #[serde(
        default,
        rename = "stateMutability",
        skip_serializing_if = "Option::is_none"
    )]
    pub state_mutability: Option<String>,
}

fn default_kind() -> EntryKind {
    EntryKind::Function
}

impl AbiEntry {
    pub fn function(name: impl Into<String>, inputs: Vec<AbiParam>) -> Self {
        Self {
            kind: EntryKind::Function,
            name: name.into(),
            inputs,
            constant: Some(false),
            state_mutability: None,
        }
    }

    pub fn constructor(inputs: Vec<AbiParam>) -> Self {
        Self {
            kind: EntryKind::Constructor,
            name: String::new(),
            inputs,
            constant: None,
            state_mutability: None,
        }
    }

    /// Marks the entry as a read-only function.
    pub fn view(mut self) -> Self {
        self.constant = Some(true);
        self.state_mutability = Some("view".to_string());
        self
    }

    /// Whether calling this function cannot change contract state. Old ABIs
    /// use `constant`, newer ones `stateMutability`.
    pub fn is_constant(&self) -> bool {
        self.constant == Some(true)
            || matches!(self.state_mutability.as_deref(), Some("view" | "pure"))
    }

    pub fn input_types(&self) -> Vec<AbiType> {
        self.inputs
            .iter()
            .map(|input| AbiType::new(input.canonical_type()))
            .collect()
    }

    pub fn param_names(&self) -> Vec<String> {
        self.inputs.iter().map(|input| input.name.clone()).collect()
    }

    /// `name(type1,type2,...)` with no spaces.
    pub fn canonical_signature(&self) -> String {
        let types: Vec<String> = self.inputs.iter().map(AbiParam::canonical_type).collect();
        format!("{}({})", self.name, types.join(","))
    }
}

/// A contract ABI: its entries in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Abi {
    entries: Vec<AbiEntry>,
}

impl Abi {
    pub fn new(entries: Vec<AbiEntry>) -> Self {
        Self { entries }
    }

    /// Parses either a bare ABI array or a compiler artifact object carrying
    /// the array under `abi`.
    pub fn from_json(json: &str) -> Result<Self, AbiError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let entries = match value {
            serde_json::Value::Array(entries) => serde_json::Value::Array(entries),
            serde_json::Value::Object(mut object) => object.remove("abi").ok_or(AbiError::Shape)?,
            _ => return Err(AbiError::Shape),
        };
        Ok(Self {
            entries: serde_json::from_value(entries)?,
        })
    }

    pub fn entries(&self) -> &[AbiEntry] {
        &self.entries
    }

    pub fn functions(&self) -> impl Iterator<Item = &AbiEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == EntryKind::Function)
    }

    /// The first constructor entry, if any.
    pub fn constructor(&self) -> Option<&AbiEntry> {
        self.entries
            .iter()
            .find(|entry| entry.kind == EntryKind::Constructor)
    }

    pub fn has_fallback(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.kind == EntryKind::Fallback)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".to_string())
    }
}
