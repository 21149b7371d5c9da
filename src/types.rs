/// Structural kind of a declared attribute. Decides how the engine walks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A single scalar coerced by the built-in rules. Converted attributes
    /// also report this kind: the converter sees one raw value.
    Primitive,
    /// A fieldless enum stored by member name.
    Enum,
    /// A nested mapped object stored as its own section.
    Complex,
    /// An ordered list.
    Sequence,
    /// A keyed section of entries.
    Mapping,
}

/// When to copy a document aside before it is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupPolicy {
    /// Master switch.
    pub enabled: bool,
    /// Backup folder, relative to the document's directory.
    pub folder: String,
    /// Back up a document that fails to parse, before it is regenerated.
    pub on_failure: bool,
    /// Back up a document whose stored version is older than the declared one.
    pub on_migration: bool,
}

impl Default for BackupPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            folder: "backups".into(),
            on_failure: true,
            on_migration: true,
        }
    }
}

/// How a document's stored version relates to the type's declared version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionState {
    /// The type declares no version; nothing to do.
    Unversioned,
    Current { version: i64 },
    /// The stored version is older and the document needs migrating.
    Stale { stored: i64, target: i64 },
}
