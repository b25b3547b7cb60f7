use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Number, Value};
use std::str::FromStr;

/// Replace decimal strings with JSON numbers wherever the conversion is lossless.
///
/// The exchange sends prices and quantities as strings. A string becomes a
/// number only if it is a plain decimal literal and the resulting number reads
/// back as the same value; everything else (symbols, ids too large for `f64`,
/// over-precise quantities) is left as a string. Applied recursively.
///
/// Identifier fields (`*Id`, `listenKey`) are never touched, and neither is any
/// string with leading zeros, since neither would read back unchanged.
pub fn coerce_numbers(value: Value) -> Value {
    coerce_field(None, value)
}

fn coerce_field(key: Option<&str>, value: Value) -> Value {
    match value {
        Value::String(s) if key.is_some_and(is_identifier_key) => Value::String(s),
        Value::String(s) => match lossless_number(&s) {
            Some(number) => Value::Number(number),
            None => Value::String(s),
        },
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| coerce_field(key, item))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = coerce_field(Some(&k), v);
                    (k, v)
                })
                .collect(),
        ),
        other => other,
    }
}

fn is_identifier_key(key: &str) -> bool {
    key.ends_with("Id") || key.ends_with("ID") || key == "listenKey"
}

fn is_decimal_literal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let int_part = parts.next().unwrap_or_default();
    let frac_part = parts.next();
    !int_part.is_empty()
        && !(int_part.len() > 1 && int_part.starts_with('0'))
        && int_part.bytes().all(|b| b.is_ascii_digit())
        && frac_part.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

fn lossless_number(s: &str) -> Option<Number> {
    if !is_decimal_literal(s) {
        return None;
    }
    let decimal = Decimal::from_str(s).ok()?;

    if decimal.fract().is_zero() {
        if let Some(n) = decimal.to_i64() {
            return Some(Number::from(n));
        }
        if let Some(n) = decimal.to_u64() {
            return Some(Number::from(n));
        }
    }

    let float = decimal.to_f64()?;
    // shortest round-trip rendering of the f64 must denote the same value
    let round_trip = Decimal::from_str(&float.to_string()).ok()?;
    if round_trip == decimal {
        Number::from_f64(float)
    } else {
        None
    }
}
