//! Validation gate: decide whether a raw value may be assigned during load.
//!
//! A [`Rule`] is declared per attribute. It runs against the raw document value
//! before coercion (and per element for scalar lists). A rejected value is
//! reported and simply not assigned; the load carries on.

use regex::Regex;
use toml::Value;

use crate::report::{Diagnostic, Reporter};

/// Constraints on an attribute's raw value.
///
/// `min`/`max` apply to numbers, `pattern` to strings (the whole string must
/// match). `not_null` rejects an absent value.
#[derive(Debug, Clone, Default)]
pub struct Rule {
    not_null: bool,
    min: Option<f64>,
    max: Option<f64>,
    pattern: Option<Pattern>,
}

#[derive(Debug, Clone)]
struct Pattern {
    source: String,
    compiled: Result<Regex, String>,
}

impl Rule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn range(min: f64, max: f64) -> Self {
        Self::new().min(min).max(max)
    }

    /// Require strings to match `pattern` in full. An empty pattern means no
    /// constraint. The pattern is compiled here, once.
    pub fn pattern(mut self, pattern: &str) -> Self {
        if pattern.is_empty() {
            self.pattern = None;
            return self;
        }
        let compiled = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| e.to_string());
        self.pattern = Some(Pattern {
            source: pattern.to_string(),
            compiled,
        });
        self
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        (self.min, self.max)
    }

    pub fn pattern_source(&self) -> Option<&str> {
        self.pattern.as_ref().map(|p| p.source.as_str())
    }
}

/// Check `value` (the raw value found at `path`, `None` if absent) against
/// `rule`. Returns `true` when the value may be assigned; every rejection is
/// reported.
pub fn validate(
    path: &str,
    value: Option<&Value>,
    rule: &Rule,
    reporter: &mut dyn Reporter,
) -> bool {
    let Some(value) = value else {
        if rule.not_null {
            reporter.report(Diagnostic::NullRejected { path: path.into() });
        }
        return false;
    };

    let number = match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    if let Some(n) = number {
        let below = rule.min.is_some_and(|min| n < min);
        let above = rule.max.is_some_and(|max| n > max);
        if below || above {
            reporter.report(Diagnostic::OutOfRange {
                path: path.into(),
                value: n,
                min: rule.min,
                max: rule.max,
            });
            return false;
        }
    }

    if let (Value::String(s), Some(pattern)) = (value, &rule.pattern) {
        match &pattern.compiled {
            Ok(regex) if regex.is_match(s) => {}
            Ok(_) => {
                reporter.report(Diagnostic::PatternMismatch {
                    path: path.into(),
                    value: s.clone(),
                    pattern: pattern.source.clone(),
                });
                return false;
            }
            Err(reason) => {
                reporter.report(Diagnostic::InvalidPattern {
                    path: path.into(),
                    pattern: pattern.source.clone(),
                    reason: reason.clone(),
                });
                return false;
            }
        }
    }

    true
}
