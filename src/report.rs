//! Diagnostics sink for the mapping engine.
//!
//! The engine is a best-effort pipeline: a bad value in one attribute never
//! stops its siblings. Everything that goes wrong along the way is described by
//! a [`Diagnostic`] and handed to the [`Reporter`] passed into the entry point.
//!
//! - [`TracingReporter`] forwards diagnostics to `tracing` (the usual choice).
//! - [`Collector`] keeps them in memory so callers and tests can inspect them.

use thiserror::Error;

use crate::coerce::CoerceError;
use crate::hooks::HookPhase;

/// How serious a diagnostic is. Maps one-to-one onto `tracing` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One event emitted while loading, saving or migrating a document.
///
/// Paths are full dotted paths from the document root; sequence elements are
/// addressed as `path[index]`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Diagnostic {
    #[error("Cannot load '{path}': {error}")]
    Coercion { path: String, error: CoerceError },

    #[error("'{path}' cannot be null")]
    NullRejected { path: String },

    #[error("'{path}' is out of range: {value} (min: {}, max: {})", bound(.min), bound(.max))]
    OutOfRange {
        path: String,
        value: f64,
        min: Option<f64>,
        max: Option<f64>,
    },

    #[error("'{path}' value '{value}' does not match pattern '{pattern}'")]
    PatternMismatch {
        path: String,
        value: String,
        pattern: String,
    },

    #[error("'{path}' has an invalid validation pattern '{pattern}': {reason}")]
    InvalidPattern {
        path: String,
        pattern: String,
        reason: String,
    },

    #[error("Map key '{key}' under '{path}' is not a valid {target}")]
    KeyConversion {
        path: String,
        key: String,
        target: &'static str,
    },

    #[error("Map entry '{key}' under '{path}' has no section; skipped")]
    MissingSubsection { path: String, key: String },

    #[error("'{path}' should be a section, found {found}")]
    NotASection { path: String, found: &'static str },

    #[error("'{path}' should be a list, found {found}")]
    NotASequence { path: String, found: &'static str },

    #[error("Converter {converter} rejected the value at '{path}'")]
    ConverterRejected {
        path: String,
        converter: &'static str,
    },

    #[error("'{path}' not found; read it from legacy path '{legacy}'")]
    LegacyPathUsed { path: String, legacy: String },

    #[error("{phase} hook '{hook}' failed: {reason}")]
    HookFailed {
        hook: &'static str,
        phase: HookPhase,
        reason: String,
    },

    #[error("Updating config version: v{from} -> v{to}")]
    VersionUpdated { from: i64, to: i64 },

    #[error("{path} is broken and will be regenerated with defaults: {reason}")]
    BrokenDocument { path: String, reason: String },
}

fn bound(value: &Option<f64>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::LegacyPathUsed { .. } | Diagnostic::VersionUpdated { .. } => {
                Severity::Info
            }
            Diagnostic::InvalidPattern { .. }
            | Diagnostic::HookFailed { .. }
            | Diagnostic::BrokenDocument { .. } => Severity::Error,
            _ => Severity::Warning,
        }
    }

    /// The document path the diagnostic is about, when there is one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Diagnostic::Coercion { path, .. }
            | Diagnostic::NullRejected { path }
            | Diagnostic::OutOfRange { path, .. }
            | Diagnostic::PatternMismatch { path, .. }
            | Diagnostic::InvalidPattern { path, .. }
            | Diagnostic::KeyConversion { path, .. }
            | Diagnostic::MissingSubsection { path, .. }
            | Diagnostic::NotASection { path, .. }
            | Diagnostic::NotASequence { path, .. }
            | Diagnostic::ConverterRejected { path, .. }
            | Diagnostic::LegacyPathUsed { path, .. }
            | Diagnostic::BrokenDocument { path, .. } => Some(path),
            Diagnostic::HookFailed { .. } | Diagnostic::VersionUpdated { .. } => None,
        }
    }
}

/// Receives diagnostics from the engine.
pub trait Reporter {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to `tracing` under the `figmap` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&mut self, diagnostic: Diagnostic) {
        let path = diagnostic.path().unwrap_or("");
        match diagnostic.severity() {
            Severity::Info => tracing::info!(target: "figmap", path, "{diagnostic}"),
            Severity::Warning => tracing::warn!(target: "figmap", path, "{diagnostic}"),
            Severity::Error => tracing::error!(target: "figmap", path, "{diagnostic}"),
        }
    }
}

/// Keeps diagnostics in memory, in emission order.
#[derive(Debug, Default, Clone)]
pub struct Collector {
    diagnostics: Vec<Diagnostic>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics at [`Severity::Warning`] or above.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() >= Severity::Warning)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn into_inner(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl Reporter for Collector {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
