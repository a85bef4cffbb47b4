//! ABI argument values and the coercion rules applied to model output.

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Num, ToPrimitive};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::abi::{AbiType, TypeCategory};
use crate::error::CoercionError;

/// A coerced argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Int(BigInt),
    Bool(bool),
    /// Anything that is neither integer- nor boolean-typed, kept verbatim.
    Raw(Value),
}

impl AbiValue {
    pub fn category(&self) -> TypeCategory {
        match self {
            AbiValue::Int(_) => TypeCategory::Integer,
            AbiValue::Bool(_) => TypeCategory::Boolean,
            AbiValue::Raw(_) => TypeCategory::Passthrough,
        }
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            AbiValue::Int(value) => Some(value),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AbiValue::Int(value) => integer_json(value),
            AbiValue::Bool(value) => Value::Bool(*value),
            AbiValue::Raw(value) => value.clone(),
        }
    }
}

impl From<u64> for AbiValue {
    fn from(value: u64) -> Self {
        AbiValue::Int(BigInt::from(value))
    }
}

impl From<bool> for AbiValue {
    fn from(value: bool) -> Self {
        AbiValue::Bool(value)
    }
}

impl Serialize for AbiValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Integers that fit a JSON number natively are emitted as numbers; wider
/// ones as decimal strings so they survive a round trip through JSON.
pub fn integer_json(value: &BigInt) -> Value {
    if let Some(small) = value.to_i64() {
        Value::from(small)
    } else if let Some(small) = value.to_u64() {
        Value::from(small)
    } else {
        Value::String(value.to_str_radix(10))
    }
}

/// Coerces a JSON value to the category of `ty`.
///
/// Arrays are coerced element by element and stay [`AbiValue::Raw`]. A tuple
/// given as a JSON array of the right length is coerced component by
/// component; any other tuple shape is passed through.
pub fn coerce(value: &Value, ty: &AbiType) -> Result<AbiValue, CoercionError> {
    if let Some(components) = ty.tuple_components() {
        return match value {
            Value::Array(items) if items.len() == components.len() => items
                .iter()
                .zip(&components)
                .map(|(item, component)| coerce(item, component).map(|v| v.to_json()))
                .collect::<Result<Vec<_>, _>>()
                .map(|items| AbiValue::Raw(Value::Array(items))),
            _ => Ok(AbiValue::Raw(value.clone())),
        };
    }
    if let Some(element) = ty.element() {
        let Value::Array(items) = value else {
            return Err(CoercionError::Array {
                ty: ty.to_string(),
                value: value.to_string(),
            });
        };
        return items
            .iter()
            .map(|item| coerce(item, &element).map(|v| v.to_json()))
            .collect::<Result<Vec<_>, _>>()
            .map(|items| AbiValue::Raw(Value::Array(items)));
    }
    match ty.category() {
        TypeCategory::Integer => parse_integer(value)
            .map(AbiValue::Int)
            .ok_or_else(|| CoercionError::Integer {
                ty: ty.to_string(),
                value: value.to_string(),
            }),
        TypeCategory::Boolean => parse_bool(value)
            .map(AbiValue::Bool)
            .ok_or_else(|| CoercionError::Boolean {
                ty: ty.to_string(),
                value: value.to_string(),
            }),
        TypeCategory::Passthrough => Ok(AbiValue::Raw(value.clone())),
    }
}

/// JSON integers as-is, floats truncated toward zero, strings as `0x` hex or
/// signed decimal.
pub fn parse_integer(value: &Value) -> Option<BigInt> {
    match value {
        Value::Number(number) => {
            if let Some(v) = number.as_i64() {
                Some(BigInt::from(v))
            } else if let Some(v) = number.as_u64() {
                Some(BigInt::from(v))
            } else {
                number
                    .as_f64()
                    .filter(|v| v.is_finite())
                    .and_then(|v| BigInt::from_f64(v.trunc()))
            }
        }
        Value::String(text) => parse_integer_str(text),
        _ => None,
    }
}

fn parse_integer_str(text: &str) -> Option<BigInt> {
    let text = text.trim();
    if let Some(digits) = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        if digits.is_empty() {
            return None;
        }
        return BigInt::from_str_radix(digits, 16).ok();
    }
    if text.is_empty() {
        return None;
    }
    BigInt::from_str_radix(text, 10).ok()
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => Some(text.eq_ignore_ascii_case("true")),
        Value::Number(number) => match number.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn uint() -> AbiType {
        AbiType::from("uint256")
    }

    #[test]
    fn integers_from_every_accepted_shape() {
        assert_eq!(coerce(&json!(100), &uint()), Ok(AbiValue::from(100)));
        assert_eq!(coerce(&json!("100"), &uint()), Ok(AbiValue::from(100)));
        assert_eq!(coerce(&json!(" 0x10 "), &uint()), Ok(AbiValue::from(16)));
        assert_eq!(coerce(&json!(3.9), &uint()), Ok(AbiValue::from(3)));
        assert_eq!(
            coerce(&json!("-5"), &AbiType::from("int8")),
            Ok(AbiValue::Int(BigInt::from(-5)))
        );
    }

    #[test]
    fn rejects_unparsable_integers() {
        assert_matches!(
            coerce(&json!("abc"), &uint()),
            Err(CoercionError::Integer { .. })
        );
        assert_matches!(coerce(&json!("0x"), &uint()), Err(CoercionError::Integer { .. }));
        assert_matches!(coerce(&json!(null), &uint()), Err(CoercionError::Integer { .. }));
        assert_matches!(coerce(&json!([1]), &uint()), Err(CoercionError::Integer { .. }));
    }

    #[test]
    fn wide_integers_survive_json() {
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let value = coerce(&json!(max), &uint()).unwrap();
        assert_eq!(value.to_json(), json!(max));
        assert_eq!(coerce(&value.to_json(), &uint()), Ok(value));
    }

    #[test]
    fn booleans() {
        let ty = AbiType::from("bool");
        assert_eq!(coerce(&json!(true), &ty), Ok(AbiValue::Bool(true)));
        assert_eq!(coerce(&json!("TRUE"), &ty), Ok(AbiValue::Bool(true)));
        assert_eq!(coerce(&json!("yes"), &ty), Ok(AbiValue::Bool(false)));
        assert_eq!(coerce(&json!(1), &ty), Ok(AbiValue::Bool(true)));
        assert_matches!(coerce(&json!(2), &ty), Err(CoercionError::Boolean { .. }));
        assert_matches!(coerce(&json!(null), &ty), Err(CoercionError::Boolean { .. }));
    }

    #[test]
    fn other_types_pass_through() {
        let address = json!("0x00000000000000000000000000000000000000aa");
        assert_eq!(
            coerce(&address, &AbiType::from("address")),
            Ok(AbiValue::Raw(address.clone()))
        );
        assert_eq!(
            coerce(&json!(["a", "b"]), &AbiType::from("string[]")),
            Ok(AbiValue::Raw(json!(["a", "b"])))
        );
    }

    #[test]
    fn arrays_coerce_each_element() {
        let ty = AbiType::from("uint256[]");
        assert_eq!(
            coerce(&json!(["0x10", 2, "3"]), &ty),
            Ok(AbiValue::Raw(json!([16, 2, 3])))
        );
        assert_eq!(coerce(&json!([]), &ty), Ok(AbiValue::Raw(json!([]))));
        assert_matches!(
            coerce(&json!([1, "abc"]), &ty),
            Err(CoercionError::Integer { .. })
        );
        assert_matches!(coerce(&json!("0x10"), &ty), Err(CoercionError::Array { .. }));

        let flags = AbiType::from("bool[2]");
        assert_eq!(
            coerce(&json!(["true", 0]), &flags),
            Ok(AbiValue::Raw(json!([true, false])))
        );

        let nested = AbiType::from("uint8[][]");
        assert_eq!(
            coerce(&json!([["1"], []]), &nested),
            Ok(AbiValue::Raw(json!([[1], []])))
        );
    }

    #[test]
    fn coerced_arrays_coerce_again_unchanged() {
        let ty = AbiType::from("int64[]");
        let once = coerce(&json!(["-7", 8.5]), &ty).unwrap();
        assert_eq!(coerce(&once.to_json(), &ty), Ok(once));
    }

    #[test]
    fn tuples_coerce_by_component() {
        let ty = AbiType::from("(address,uint256,bool)");
        let address = "0x00000000000000000000000000000000000000aa";
        assert_eq!(
            coerce(&json!([address, "0x20", "true"]), &ty),
            Ok(AbiValue::Raw(json!([address, 32, true])))
        );
        assert_matches!(
            coerce(&json!([address, "many", true]), &ty),
            Err(CoercionError::Integer { .. })
        );

        let named = json!({"maker": address, "amount": 1});
        assert_eq!(coerce(&named, &ty), Ok(AbiValue::Raw(named.clone())));

        let orders = AbiType::from("(address,uint256)[]");
        assert_eq!(
            coerce(&json!([[address, "5"]]), &orders),
            Ok(AbiValue::Raw(json!([[address, 5]])))
        );
    }
}
