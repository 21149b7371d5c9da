//! Converters: per-attribute replacements for the built-in coercion rules.
//!
//! A converter receives the raw document value at the attribute's path
//! (scalar, list or table alike) and produces the field value, and back. It
//! never fails loudly: `None` from [`Converter::to_attribute`] is reported and
//! the field keeps its value; `None` from [`Converter::to_document`] writes
//! nothing.

use std::marker::PhantomData;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use toml::Value;

/// A stateless two-way transform between a raw value and a field value.
pub trait Converter: Send + Sync + 'static {
    type Output: 'static;

    fn to_attribute(&self, raw: &Value) -> Option<Self::Output>;

    fn to_document(&self, value: &Self::Output) -> Option<Value>;
}

/// Durations written as `"1d 2h 30m 15s"`.
///
/// Units are `d`, `h`, `m` and `s`; a number without a unit counts seconds and
/// parts may be run together (`"1h30m"`). An empty string is zero. A bare
/// integer in the document is read as seconds. Sub-second precision is not
/// kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct DurationConverter;

static DURATION_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*([dhms]?)").expect("duration pattern is valid"));

const UNITS: [(char, u64); 4] = [('d', 86_400), ('h', 3_600), ('m', 60), ('s', 1)];

fn parse_duration(text: &str) -> Option<Duration> {
    let mut seconds: u64 = 0;
    let mut consumed = 0;
    for caps in DURATION_PART.captures_iter(text) {
        let whole = caps.get(0)?;
        if !text[consumed..whole.start()].trim().is_empty() {
            return None;
        }
        consumed = whole.end();

        let amount: u64 = caps[1].parse().ok()?;
        let scale = match caps[2].chars().next() {
            Some(unit) => UNITS.iter().find(|(u, _)| *u == unit)?.1,
            None => 1,
        };
        seconds = seconds.checked_add(amount.checked_mul(scale)?)?;
    }
    if !text[consumed..].trim().is_empty() {
        return None;
    }
    Some(Duration::from_secs(seconds))
}

fn format_duration(duration: Duration) -> String {
    let mut remaining = duration.as_secs();
    if remaining == 0 {
        return "0s".into();
    }
    let mut parts = Vec::new();
    for (unit, scale) in UNITS {
        let amount = remaining / scale;
        if amount > 0 {
            parts.push(format!("{amount}{unit}"));
            remaining %= scale;
        }
    }
    parts.join(" ")
}

impl Converter for DurationConverter {
    type Output = Duration;

    fn to_attribute(&self, raw: &Value) -> Option<Duration> {
        match raw {
            Value::String(text) => parse_duration(text),
            Value::Integer(secs) => u64::try_from(*secs).ok().map(Duration::from_secs),
            _ => None,
        }
    }

    fn to_document(&self, value: &Duration) -> Option<Value> {
        Some(Value::String(format_duration(*value)))
    }
}

/// Converts any serde type through its `toml` representation.
///
/// Tables become structs, arrays become sequences, and so on, following the
/// type's own `Serialize`/`Deserialize` impls.
pub struct SerdeConverter<F> {
    _marker: PhantomData<fn() -> F>,
}

impl<F> SerdeConverter<F> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<F> Default for SerdeConverter<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> Converter for SerdeConverter<F>
where
    F: Serialize + DeserializeOwned + 'static,
{
    type Output = F;

    fn to_attribute(&self, raw: &Value) -> Option<F> {
        raw.clone().try_into().ok()
    }

    fn to_document(&self, value: &F) -> Option<Value> {
        Value::try_from(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn parses_spaced_units() {
        let c = DurationConverter;
        let raw = Value::String("1d 2h 3m 4s".into());
        assert_eq!(c.to_attribute(&raw), Some(secs(86_400 + 7_200 + 180 + 4)));
    }

    #[test]
    fn parses_compact_and_bare_seconds() {
        let c = DurationConverter;
        assert_eq!(c.to_attribute(&Value::String("1h30m".into())), Some(secs(5_400)));
        assert_eq!(c.to_attribute(&Value::String("2m 5".into())), Some(secs(125)));
        assert_eq!(c.to_attribute(&Value::String("".into())), Some(Duration::ZERO));
        assert_eq!(c.to_attribute(&Value::Integer(90)), Some(secs(90)));
    }

    #[test]
    fn rejects_garbage() {
        let c = DurationConverter;
        assert_eq!(c.to_attribute(&Value::String("soon".into())), None);
        assert_eq!(c.to_attribute(&Value::String("5x".into())), None);
        assert_eq!(c.to_attribute(&Value::Integer(-1)), None);
        assert_eq!(c.to_attribute(&Value::Boolean(true)), None);
    }

    #[test]
    fn formats_largest_units_first() {
        let c = DurationConverter;
        assert_eq!(
            c.to_document(&secs(93_784)),
            Some(Value::String("1d 2h 3m 4s".into()))
        );
        assert_eq!(c.to_document(&secs(3_600)), Some(Value::String("1h".into())));
        assert_eq!(c.to_document(&Duration::ZERO), Some(Value::String("0s".into())));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn serde_converter_reads_tables() {
        let c = SerdeConverter::<Point>::new();
        let mut table = toml::Table::new();
        table.insert("x".into(), Value::Integer(1));
        table.insert("y".into(), Value::Integer(-2));
        assert_eq!(c.to_attribute(&Value::Table(table.clone())), Some(Point { x: 1, y: -2 }));
        assert_eq!(c.to_document(&Point { x: 1, y: -2 }), Some(Value::Table(table)));
    }

    #[test]
    fn serde_converter_rejects_wrong_shape() {
        let c = SerdeConverter::<Point>::new();
        assert_eq!(c.to_attribute(&Value::String("1,2".into())), None);
    }
}
