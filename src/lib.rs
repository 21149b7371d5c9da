//! Typed Rust structs mapped onto comment-preserving TOML files. Describe a
//! struct once, point it at a file, and go.
//!
//! ```ignore
//! #[derive(Debug)]
//! struct AppConfig {
//!     port: u16,
//!     host: String,
//!     retry: Duration,
//! }
//!
//! impl Default for AppConfig { /* compiled defaults */ }
//!
//! impl Mapped for AppConfig {
//!     fn describe(d: &mut Describe<Self>) {
//!         d.version(2).header(["My app"]).backup(BackupPolicy::default());
//!         d.value("port", lens!(port))
//!             .comment("The port number.")
//!             .validate(Rule::range(1.0, 65535.0));
//!         d.value("host", lens!(host));
//!         d.converted("retry", lens!(retry), DurationConverter);
//!     }
//! }
//!
//! let mut config = AppConfig::default();
//! ConfigFile::platform("myapp", "config.toml")?.init(&mut config, &mut TracingReporter)?;
//! ```
//!
//! That call reads `~/.config/myapp/config.toml` (or the platform
//! equivalent), creates it with defaults and comments if it is missing,
//! migrates it if it was written by an older version, loads every declared
//! attribute into `config`, and writes back any path the file lacked.
//!
//! # Design: the struct's descriptor is the schema
//!
//! [`Mapped::describe`] declares each persisted field once, through a
//! [`Describe`] builder: its name, its kind (scalar, enum, nested object,
//! list, map, converted), and its metadata. The declaration is turned into an
//! immutable [`TypeDescriptor`] the first time the type is used and cached for
//! the life of the process ([`resolve`]). Loading, saving, resetting, template
//! generation and listing all walk that descriptor.
//!
//! - **Paths.** An attribute's document path defaults to the kebab-case form
//!   of its name (`maxPlayers` → `max-players`) and can be overridden with a
//!   dotted path (`.path("display.motd")`). Nested objects map to TOML
//!   sections.
//! - **Defaults** come from the type's `Default` impl. A path absent from the
//!   document leaves the field at its current value, and the next save writes
//!   it out.
//! - **Comments** (`.comment(..)`) are written above a path when a save
//!   creates it. Comments a user wrote in the file are never replaced.
//! - **Unknown keys** in the document are left alone.
//!
//! # Failure model
//!
//! Loading never fails on content. A value of the wrong type, a number out of
//! range, a string that misses its pattern, an unknown enum member or a map
//! key that does not convert is reported as a [`Diagnostic`] to the
//! [`Reporter`] passed in, and the field keeps its previous value. Sibling
//! attributes load normally. [`TracingReporter`] logs diagnostics through
//! `tracing`; [`Collector`] keeps them for inspection.
//!
//! Only file I/O and document syntax return [`FigmapError`]. A file that does
//! not parse during [`ConfigFile::init`] is backed up and replaced with
//! defaults, so a hand-edited typo never stops an application from starting.
//!
//! # Versions and backups
//!
//! A type that declares `.version(n)` stores it under [`VERSION_KEY`]. Older
//! documents are restamped and filled in on load; nothing they contain is
//! removed. With a [`BackupPolicy`], the old file is first copied to
//! `backups/{stem}_v{old}_{timestamp}.toml`, and a broken file to
//! `backups/{stem}_broken_{timestamp}.toml`.
//!
//! # Hooks
//!
//! `.post_load(name, fn)` runs after every top-level load; `.on_reload(name,
//! fn)` after [`ConfigFile::reload`]. A failing hook is reported and the
//! remaining hooks still run.
//!
//! # Lower-level API
//!
//! [`ConfigFile`] is a thin layer. The same pipeline is available piecewise
//! over an in-memory [`Document`]: [`handle_version`], [`load_from_config`],
//! [`save_to_config`], [`reset_to_defaults`] and [`run_on_reload`].
//! [`generate_template`] and [`list_values`] render a type without touching
//! the file system.

pub mod error;
pub mod types;

mod coerce;
mod convert;
mod descriptor;
mod document;
mod file;
mod hooks;
mod mapper;
mod migrate;
mod ops;
mod report;
mod traverse;
mod validate;

#[cfg(test)]
mod fixtures;

pub use coerce::{CoerceError, Codec, ConfigEnum, Primitive, ScalarKind, raw_type_name};
pub use convert::{Converter, DurationConverter, SerdeConverter};
pub use descriptor::{
    Attribute, AttributeBuilder, Describe, Lens, Mapped, TypeDescriptor, kebab_case, resolve,
};
pub use document::Document;
pub use error::FigmapError;
pub use file::{ConfigFile, FsBackup};
pub use hooks::{Hook, HookError, HookPhase, run_on_reload, run_post_load};
pub use mapper::{load_from_config, reset_to_defaults, save_to_config};
pub use migrate::{
    Backup, NoBackup, VERSION_KEY, handle_version, recover_broken, stored_version, version_state,
};
pub use ops::{generate_template, list_values};
pub use report::{Collector, Diagnostic, Reporter, Severity, TracingReporter};
pub use traverse::{FloatKey, MapKey};
pub use types::{BackupPolicy, Kind, VersionState};
pub use validate::{Rule, validate};
