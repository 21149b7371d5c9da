//! Config files on disk: create, load, migrate, recover and save.
//!
//! [`ConfigFile`] ties the engine to one TOML file. [`ConfigFile::init`] is the
//! usual entry point:
//!
//! 1. Read the file. A missing file starts from the seed text, or from an
//!    empty document.
//! 2. Parse it. A file that does not parse is reported, backed up with tag
//!    `broken` (when the type's policy allows), and replaced by defaults.
//! 3. Migrate: a stale version is backed up with tag `v{old}` and restamped.
//! 4. Load the instance, running post-load hooks.
//! 5. Save the instance back and write the file atomically, so the file on
//!    disk always lists every declared path.
//!
//! Missing parent directories are created on write.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use toml::Value;

use crate::descriptor::Mapped;
use crate::document::Document;
use crate::error::FigmapError;
use crate::hooks::run_on_reload;
use crate::mapper::{load_from_config, reset_to_defaults, save_to_config};
use crate::migrate::{Backup, VERSION_KEY, handle_version, recover_broken, version_state};
use crate::report::Reporter;
use crate::types::VersionState;

/// One config file and how to back it up.
pub struct ConfigFile {
    path: PathBuf,
    seed: Option<String>,
    backup: Box<dyn Backup>,
}

impl ConfigFile {
    /// A config file at `path`, backed up with [`FsBackup`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seed: None,
            backup: Box::new(FsBackup),
        }
    }

    /// `file_name` inside the platform config directory for `app_name`
    /// (e.g. `~/.config/{app_name}/` on Linux).
    pub fn platform(app_name: &str, file_name: &str) -> Result<Self, FigmapError> {
        let dirs = directories::ProjectDirs::from("", "", app_name)
            .ok_or_else(|| FigmapError::NoPlatformDir(app_name.into()))?;
        Ok(Self::new(dirs.config_dir().join(file_name)))
    }

    /// Text to start from when the file does not exist yet, typically a
    /// bundled default file with explanatory comments.
    pub fn seed(mut self, text: impl Into<String>) -> Self {
        self.seed = Some(text.into());
        self
    }

    pub fn backup(mut self, backup: impl Backup + 'static) -> Self {
        self.backup = Box::new(backup);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load `instance` from the file, creating, migrating or regenerating it
    /// as needed, then write the result back.
    pub fn init<T: Mapped>(
        &self,
        instance: &mut T,
        reporter: &mut dyn Reporter,
    ) -> Result<(), FigmapError> {
        let mut doc = match read_optional(&self.path)? {
            Some(text) => match Document::parse(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    // Nothing to load: write the defaults straight back.
                    reset_to_defaults(instance);
                    let mut doc = recover_broken::<T>(
                        &self.path,
                        &e.to_string(),
                        self.backup.as_ref(),
                        reporter,
                    );
                    save_to_config(instance, &mut doc, reporter);
                    return write_atomic(&self.path, &doc);
                }
            },
            None => match &self.seed {
                Some(seed) => Document::parse(seed)?,
                None => Document::new(),
            },
        };

        handle_version::<T>(&mut doc, Some(&self.path), self.backup.as_ref(), reporter);
        load_from_config(instance, &doc, reporter);
        save_to_config(instance, &mut doc, reporter);
        write_atomic(&self.path, &doc)
    }

    /// [`init`](Self::init) again, then run the type's reload hooks.
    pub fn reload<T: Mapped>(
        &self,
        instance: &mut T,
        reporter: &mut dyn Reporter,
    ) -> Result<(), FigmapError> {
        self.init(instance, reporter)?;
        run_on_reload(instance, reporter);
        Ok(())
    }

    /// Write `instance` into the file, keeping the file's comments and any keys
    /// the type does not declare. A file that no longer parses is overwritten.
    /// The stored version is raised to the declared one, never lowered.
    pub fn save<T: Mapped>(&self, instance: &T, reporter: &mut dyn Reporter) -> Result<(), FigmapError> {
        let mut doc = match read_optional(&self.path)? {
            Some(text) => Document::parse(&text).unwrap_or_else(|err| {
                tracing::warn!(%err, path = %self.path.display(), "overwriting unparsable config file");
                Document::new()
            }),
            None => Document::new(),
        };
        if let VersionState::Stale { target, .. } = version_state::<T>(&doc) {
            doc.set(VERSION_KEY, &Value::Integer(target));
        }
        save_to_config(instance, &mut doc, reporter);
        write_atomic(&self.path, &doc)
    }
}

/// Read a file to a string. A missing file is `None`; other I/O errors
/// propagate.
fn read_optional(path: &Path) -> Result<Option<String>, FigmapError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FigmapError::IoError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Write through a sibling temp file and rename, so readers never see a
/// half-written file.
fn write_atomic(path: &Path, doc: &Document) -> Result<(), FigmapError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| FigmapError::WriteError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    fs::write(&tmp, doc.to_string()).map_err(|e| FigmapError::WriteError {
        path: tmp.clone(),
        source: e,
    })?;
    fs::rename(&tmp, path).map_err(|e| FigmapError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::debug!(path = %path.display(), "wrote config file");
    Ok(())
}

/// Copies files into a backup folder as
/// `{stem}_{tag}_{YYYY-MM-DD_HH-MM-SS}.{ext}`.
///
/// Failures are logged and swallowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsBackup;

impl FsBackup {
    fn file_name(source: &Path, tag: &str) -> String {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config".into());
        let stamp = Local::now().format("%Y-%m-%d_%H-%M-%S");
        match source.extension() {
            Some(ext) => format!("{stem}_{tag}_{stamp}.{}", ext.to_string_lossy()),
            None => format!("{stem}_{tag}_{stamp}"),
        }
    }
}

impl Backup for FsBackup {
    fn create_backup(&self, source: &Path, folder: &Path, tag: &str) {
        if !source.exists() {
            return;
        }
        if let Err(err) = fs::create_dir_all(folder) {
            tracing::warn!(?err, folder = %folder.display(), "failed to create backup folder");
            return;
        }
        let target = folder.join(Self::file_name(source, tag));
        match fs::copy(source, &target) {
            Ok(_) => {
                tracing::info!(from = %source.display(), to = %target.display(), "backed up config file")
            }
            Err(err) => {
                tracing::warn!(?err, path = %source.display(), "failed to back up config file")
            }
        }
    }
}
