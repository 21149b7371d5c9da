//! Schema versions and migration.
//!
//! A type that declares a version stores it at the root key
//! [`VERSION_KEY`]. A document with an older (or no) stored version is stale:
//! [`handle_version`] optionally backs the file up, then stamps the current
//! version. The regular load that follows fills in every path the old document
//! lacks. Nothing the old document contains is removed.
//!
//! Backups are taken in exactly two situations: before a stale document is
//! migrated and before a broken document is regenerated. Both need the type to
//! opt in with a [`BackupPolicy`].

use std::path::{Path, PathBuf};

use toml::Value;

use crate::descriptor::{Mapped, resolve};
use crate::document::Document;
use crate::report::{Diagnostic, Reporter};
use crate::types::{BackupPolicy, VersionState};

/// Root key holding the stored schema version.
pub const VERSION_KEY: &str = "config-version";

/// Copies a file aside before it is rewritten.
///
/// Implementations handle their own failures (typically by logging them): a
/// backup that cannot be taken never stops the load.
pub trait Backup {
    fn create_backup(&self, source: &Path, folder: &Path, tag: &str);
}

/// Takes no backups.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBackup;

impl Backup for NoBackup {
    fn create_backup(&self, _source: &Path, _folder: &Path, _tag: &str) {}
}

/// The version stored in `doc`. Absent or non-integer values read as 0.
pub fn stored_version(doc: &Document) -> i64 {
    match doc.get(VERSION_KEY) {
        Some(Value::Integer(version)) => version,
        _ => 0,
    }
}

pub fn version_state<T: Mapped>(doc: &Document) -> VersionState {
    let Some(target) = resolve::<T>().version() else {
        return VersionState::Unversioned;
    };
    let stored = stored_version(doc);
    if stored < target {
        VersionState::Stale { stored, target }
    } else {
        VersionState::Current { version: stored }
    }
}

fn backup_folder(origin: &Path, policy: &BackupPolicy) -> PathBuf {
    origin
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(&policy.folder)
}

/// Bring a parsed document up to `T`'s declared version.
///
/// When the document is stale, the file at `origin` (if any) is backed up with
/// tag `v{stored}` as the policy allows, then the version key is rewritten.
/// Returns the state found before migrating.
pub fn handle_version<T: Mapped>(
    doc: &mut Document,
    origin: Option<&Path>,
    backup: &dyn Backup,
    reporter: &mut dyn Reporter,
) -> VersionState {
    let state = version_state::<T>(doc);
    let VersionState::Stale { stored, target } = state else {
        return state;
    };

    if let (Some(policy), Some(origin)) = (resolve::<T>().backup_policy(), origin)
        && policy.enabled
        && policy.on_migration
        && origin.exists()
    {
        backup.create_backup(origin, &backup_folder(origin, policy), &format!("v{stored}"));
    }

    doc.set(VERSION_KEY, &Value::Integer(target));
    reporter.report(Diagnostic::VersionUpdated {
        from: stored,
        to: target,
    });
    state
}

/// Start over after `origin` failed to parse: back it up with tag `broken` as
/// the policy allows and return an empty document stamped with the current
/// version. The caller resets the instance and saves it into the result.
pub fn recover_broken<T: Mapped>(
    origin: &Path,
    reason: &str,
    backup: &dyn Backup,
    reporter: &mut dyn Reporter,
) -> Document {
    reporter.report(Diagnostic::BrokenDocument {
        path: origin.display().to_string(),
        reason: reason.to_string(),
    });

    let descriptor = resolve::<T>();
    if let Some(policy) = descriptor.backup_policy()
        && policy.enabled
        && policy.on_failure
        && origin.exists()
    {
        backup.create_backup(origin, &backup_folder(origin, policy), "broken");
    }

    let mut doc = Document::new();
    if let Some(version) = descriptor.version() {
        doc.set(VERSION_KEY, &Value::Integer(version));
    }
    doc
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::fs;

    use tempfile::TempDir;

    use super::*;
    use crate::fixtures::test::{AppConfig, Inventory, ServerConfig};
    use crate::report::Collector;

    /// Records backup requests instead of copying anything.
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<(PathBuf, PathBuf, String)>>,
    }

    impl Backup for Recorder {
        fn create_backup(&self, source: &Path, folder: &Path, tag: &str) {
            self.calls
                .borrow_mut()
                .push((source.to_path_buf(), folder.to_path_buf(), tag.to_string()));
        }
    }

    fn existing_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, "config-version = 1\n").unwrap();
        path
    }

    #[test]
    fn stored_version_defaults_to_zero() {
        assert_eq!(stored_version(&Document::new()), 0);
        let doc = Document::parse("config-version = \"three\"\n").unwrap();
        assert_eq!(stored_version(&doc), 0);
    }

    #[test]
    fn states() {
        let doc = Document::parse("config-version = 3\n").unwrap();
        assert_eq!(
            version_state::<ServerConfig>(&doc),
            VersionState::Current { version: 3 }
        );
        assert_eq!(
            version_state::<AppConfig>(&doc),
            VersionState::Current { version: 3 }
        );
        assert_eq!(version_state::<Inventory>(&doc), VersionState::Unversioned);

        let old = Document::parse("config-version = 1\n").unwrap();
        assert_eq!(
            version_state::<ServerConfig>(&old),
            VersionState::Stale {
                stored: 1,
                target: 3
            }
        );
    }

    #[test]
    fn stale_document_is_stamped() {
        let mut doc = Document::parse("config-version = 1\nunknown = true\n").unwrap();
        let mut sink = Collector::new();
        handle_version::<ServerConfig>(&mut doc, None, &NoBackup, &mut sink);
        assert_eq!(stored_version(&doc), 3);
        assert_eq!(doc.get("unknown"), Some(Value::Boolean(true)));
        assert_eq!(
            sink.diagnostics(),
            [Diagnostic::VersionUpdated { from: 1, to: 3 }]
        );
    }

    #[test]
    fn migration_backup_is_tagged_with_old_version() {
        let dir = TempDir::new().unwrap();
        let origin = existing_file(&dir);
        let mut doc = Document::parse("config-version = 1\n").unwrap();
        let recorder = Recorder::default();
        handle_version::<AppConfig>(
            &mut doc,
            Some(origin.as_path()),
            &recorder,
            &mut Collector::new(),
        );

        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, origin);
        assert_eq!(calls[0].1, dir.path().join("backups"));
        assert_eq!(calls[0].2, "v1");
        assert_eq!(stored_version(&doc), 2);
    }

    #[test]
    fn no_backup_without_policy() {
        let dir = TempDir::new().unwrap();
        let origin = existing_file(&dir);
        let mut doc = Document::parse("config-version = 1\n").unwrap();
        let recorder = Recorder::default();
        handle_version::<ServerConfig>(
            &mut doc,
            Some(origin.as_path()),
            &recorder,
            &mut Collector::new(),
        );
        assert!(recorder.calls.borrow().is_empty());
    }

    #[test]
    fn no_backup_for_missing_origin() {
        let dir = TempDir::new().unwrap();
        let mut doc = Document::new();
        let recorder = Recorder::default();
        handle_version::<AppConfig>(
            &mut doc,
            Some(dir.path().join("absent.toml").as_path()),
            &recorder,
            &mut Collector::new(),
        );
        assert!(recorder.calls.borrow().is_empty());
        assert_eq!(stored_version(&doc), 2);
    }

    #[test]
    fn current_document_is_untouched() {
        let mut doc = Document::parse("config-version = 2\n").unwrap();
        let recorder = Recorder::default();
        let mut sink = Collector::new();
        let state = handle_version::<AppConfig>(&mut doc, None, &recorder, &mut sink);
        assert_eq!(state, VersionState::Current { version: 2 });
        assert!(sink.is_empty());
        assert!(recorder.calls.borrow().is_empty());
    }

    #[test]
    fn broken_document_is_backed_up_once_and_restamped() {
        let dir = TempDir::new().unwrap();
        let origin = existing_file(&dir);
        let recorder = Recorder::default();
        let mut sink = Collector::new();
        let doc = recover_broken::<AppConfig>(&origin, "expected `=`", &recorder, &mut sink);

        let calls = recorder.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].2, "broken");
        assert_eq!(stored_version(&doc), 2);
        assert!(matches!(
            &sink.diagnostics()[0],
            Diagnostic::BrokenDocument { reason, .. } if reason == "expected `=`"
        ));
    }
}
