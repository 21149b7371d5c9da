use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced to the caller.
///
/// Per-attribute problems (type mismatches, validation rejections, bad map
/// keys) are never errors: they are [`Diagnostic`](crate::Diagnostic)s sent to
/// the [`Reporter`](crate::Reporter). Only document syntax and file I/O fail.
#[derive(Debug, Error)]
pub enum FigmapError {
    #[error("Malformed document: {0}")]
    Syntax(#[from] toml_edit::TomlError),

    #[error("Failed to read {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("No platform config directory for '{0}' (is a home directory set?)")]
    NoPlatformDir(String),
}
