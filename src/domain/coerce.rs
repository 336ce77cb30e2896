//! Lenient numeric coercion at the storage boundary.
//!
//! Ledger records come back as JSON documents whose numeric fields may be
//! numbers, canonical strings, or missing entirely (older writers stored
//! plain floats; this engine stores decimals as canonical strings so no
//! precision is lost). Reads accept all of these; anything unusable
//! coerces to zero rather than failing the whole record.

use crate::domain::Decimal;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal as RustDecimal;
use serde_json::Value;

/// Coerce a JSON value to a Decimal: numbers and numeric strings parse,
/// everything else (null, objects, garbage strings) is 0.
pub fn lenient_decimal(value: &Value) -> Decimal {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Decimal::from(i)
            } else if let Some(u) = n.as_u64() {
                Decimal::from(u)
            } else if let Some(f) = n.as_f64() {
                RustDecimal::from_f64(f).map(Decimal::new).unwrap_or_default()
            } else {
                Decimal::zero()
            }
        }
        Value::String(s) => Decimal::from_str_canonical(s.trim()).unwrap_or_default(),
        _ => Decimal::zero(),
    }
}

/// Coerce a JSON value to a lamport count: non-negative integers pass
/// through, numeric strings parse, fractional values floor, everything
/// else is 0.
pub fn lenient_u64(value: &Value) -> u64 {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u
            } else if let Some(f) = n.as_f64() {
                if f > 0.0 {
                    f.floor() as u64
                } else {
                    0
                }
            } else {
                0
            }
        }
        Value::String(s) => s.trim().parse::<u64>().unwrap_or(0),
        _ => 0,
    }
}

/// Serde adapter for required Decimal fields on persisted records:
/// canonical string out, lenient coercion in. Pair with
/// `#[serde(default)]` so absent fields read as 0.
pub mod decimal_field {
    use super::*;
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde::Deserialize;

    pub fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_canonical_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(lenient_decimal(&raw))
    }
}

/// Serde adapter for optional Decimal fields: `None` serializes as null,
/// any present value goes through the lenient coercion.
pub mod decimal_opt_field {
    use super::*;
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde::Deserialize;

    pub fn serialize<S: Serializer>(
        value: &Option<Decimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_str(&d.to_canonical_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Decimal>, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        match raw {
            Value::Null => Ok(None),
            other => Ok(Some(lenient_decimal(&other))),
        }
    }
}

/// Serde adapter for lamport (u64) fields: plain JSON integer out,
/// lenient coercion in.
pub mod lamports_field {
    use super::*;
    use serde::de::Deserializer;
    use serde::ser::Serializer;
    use serde::Deserialize;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        Ok(lenient_u64(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[test]
    fn test_lenient_decimal_from_number() {
        assert_eq!(lenient_decimal(&json!(42)), d("42"));
        assert_eq!(lenient_decimal(&json!(-7)), d("-7"));
        assert_eq!(lenient_decimal(&json!(1.5)), d("1.5"));
    }

    #[test]
    fn test_lenient_decimal_from_string() {
        assert_eq!(lenient_decimal(&json!("58.5")), d("58.5"));
        assert_eq!(lenient_decimal(&json!(" 100 ")), d("100"));
    }

    #[test]
    fn test_lenient_decimal_garbage_is_zero() {
        assert_eq!(lenient_decimal(&json!(null)), Decimal::zero());
        assert_eq!(lenient_decimal(&json!("not-a-number")), Decimal::zero());
        assert_eq!(lenient_decimal(&json!({"nested": 1})), Decimal::zero());
        assert_eq!(lenient_decimal(&json!([1, 2])), Decimal::zero());
    }

    #[test]
    fn test_lenient_u64() {
        assert_eq!(lenient_u64(&json!(1_000_000)), 1_000_000);
        assert_eq!(lenient_u64(&json!("250")), 250);
        assert_eq!(lenient_u64(&json!(2.9)), 2);
        assert_eq!(lenient_u64(&json!(-5)), 0);
        assert_eq!(lenient_u64(&json!(null)), 0);
        assert_eq!(lenient_u64(&json!("junk")), 0);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "decimal_field", default)]
        amount: Decimal,
        #[serde(with = "decimal_opt_field", default)]
        price: Option<Decimal>,
        #[serde(with = "lamports_field", default)]
        accrued: u64,
    }

    #[test]
    fn test_decimal_field_serializes_as_canonical_string() {
        let sample = Sample {
            amount: d("12.340"),
            price: Some(d("3.5")),
            accrued: 77,
        };
        let value = serde_json::to_value(&sample).unwrap();
        assert_eq!(value["amount"], json!("12.34"));
        assert_eq!(value["price"], json!("3.5"));
        assert_eq!(value["accrued"], json!(77));
    }

    #[test]
    fn test_fields_accept_numbers_strings_and_absence() {
        let parsed: Sample =
            serde_json::from_value(json!({"amount": 2.5, "price": "9", "accrued": "11"})).unwrap();
        assert_eq!(parsed.amount, d("2.5"));
        assert_eq!(parsed.price, Some(d("9")));
        assert_eq!(parsed.accrued, 11);

        let sparse: Sample = serde_json::from_value(json!({})).unwrap();
        assert_eq!(sparse.amount, Decimal::zero());
        assert_eq!(sparse.price, None);
        assert_eq!(sparse.accrued, 0);
    }

    #[test]
    fn test_roundtrip_preserves_values() {
        let sample = Sample {
            amount: d("0.000000001"),
            price: None,
            accrued: u64::MAX,
        };
        let value = serde_json::to_value(&sample).unwrap();
        let back: Sample = serde_json::from_value(value).unwrap();
        assert_eq!(back, sample);
    }
}
