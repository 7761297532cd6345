//! Lenient field deserializers.
//!
//! The backend serialises numbers through a Decimal encoder, so integral
//! fields can arrive as `1997`, `1997.0` or `"1997"`. Unparseable values
//! read as absent rather than failing the whole payload.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn number_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn opt_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref()
        .and_then(number_from_value)
        .filter(|n| n.is_finite())
        .map(|n| n.round() as i32))
}

pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref()
        .and_then(number_from_value)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n.round() as u32))
}

pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref()
        .and_then(number_from_value)
        .filter(|n| n.is_finite())
        .map(|n| n.round() as i64))
}

pub fn u32_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    opt_u32(d).map(Option::unwrap_or_default)
}

pub fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref()
        .and_then(number_from_value)
        .filter(|n| n.is_finite())
        .unwrap_or(0.0))
}

/// Accept a single string, an array of strings, or null.
pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}

/// Accept a string or a number, keeping its textual form.
pub fn opt_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => Some(format!("{}", f as i64)),
            _ => Some(n.to_string()),
        },
        _ => None,
    })
}
