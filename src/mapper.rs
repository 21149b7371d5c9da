//! Engine entry points: load an instance from a document, save it back, reset
//! it to defaults.
//!
//! Loading is best-effort. Every attribute is handled on its own: a value that
//! is missing, fails validation or cannot be coerced leaves that one field as
//! it was and produces a [`Diagnostic`]. Siblings carry on.
//!
//! Saving writes every persistable attribute, creating sections as needed.
//! Keys the type does not declare are left alone, as are user comments.

use toml::Value;
use toml_edit::{Item, Table, TableLike};

use crate::coerce::{CoerceError, raw_type_name};
use crate::descriptor::{Attribute, Binding, Mapped, resolve};
use crate::document::{self, Document, item_to_value, lookup};
use crate::hooks::run_post_load;
use crate::report::{Diagnostic, Reporter};
use crate::validate::validate;

/// Populate `instance` from `doc`, then run its post-load hooks.
///
/// Attributes whose path is absent keep their current values, so loading into
/// a fresh `T::default()` fills missing paths with defaults.
pub fn load_from_config<T: Mapped>(instance: &mut T, doc: &Document, reporter: &mut dyn Reporter) {
    load_object(instance, doc.root(), "", reporter);
    run_post_load(instance, reporter);
}

/// Write every persistable attribute of `instance` into `doc`.
///
/// The type's header, when it declares one, replaces the document header.
pub fn save_to_config<T: Mapped>(instance: &T, doc: &mut Document, reporter: &mut dyn Reporter) {
    let header = resolve::<T>().header();
    if !header.is_empty() {
        doc.set_header(header.iter().cloned());
    }
    save_object(instance, doc.root_mut(), "", reporter);
}

/// Put every persistable attribute of `instance` back to its default value.
/// Ignored and undeclared fields are untouched.
pub fn reset_to_defaults<T: Mapped>(instance: &mut T) {
    let mut reference = T::default();
    for attribute in resolve::<T>().persistable() {
        attribute.binding.reset(instance, &mut reference);
    }
}

fn qualify(scope: &str, path: &str) -> String {
    if scope.is_empty() {
        path.to_string()
    } else {
        format!("{scope}.{path}")
    }
}

/// Find the attribute's item in `section`, falling back to its legacy path.
fn locate<'s, T>(
    attribute: &Attribute<T>,
    section: &'s dyn TableLike,
    scope: &str,
    reporter: &mut dyn Reporter,
) -> Option<&'s Item> {
    if let Some(item) = lookup(section, attribute.path()) {
        return Some(item);
    }
    let legacy = attribute.legacy_path()?;
    let item = lookup(section, legacy)?;
    reporter.report(Diagnostic::LegacyPathUsed {
        path: qualify(scope, attribute.path()),
        legacy: qualify(scope, legacy),
    });
    Some(item)
}

fn found(item: &Item) -> &'static str {
    item_to_value(item).map_or("nothing", |raw| raw_type_name(&raw))
}

/// Load every persistable attribute of `T` from `section`. `scope` is the
/// dotted path of `section` itself, used in diagnostics.
pub(crate) fn load_object<T: Mapped>(
    instance: &mut T,
    section: &dyn TableLike,
    scope: &str,
    reporter: &mut dyn Reporter,
) {
    for attribute in resolve::<T>().persistable() {
        let path = qualify(scope, attribute.path());

        let item = locate(attribute, section, scope, reporter);
        let Some(item) = item else {
            if let Some(rule) = attribute.rule() {
                validate(&path, None, rule, reporter);
            }
            continue;
        };

        match &attribute.binding {
            Binding::Scalar(access) | Binding::Converted(access) => {
                let Some(raw) = item_to_value(item) else {
                    continue;
                };
                if let Some(rule) = attribute.rule()
                    && !validate(&path, Some(&raw), rule, reporter)
                {
                    continue;
                }
                if let Err(error) = access.load(instance, &raw) {
                    reporter.report(match error {
                        CoerceError::Converter(converter) => {
                            Diagnostic::ConverterRejected { path, converter }
                        }
                        error => Diagnostic::Coercion { path, error },
                    });
                }
            }
            Binding::Complex(access) => match item.as_table_like() {
                Some(subsection) => access.load(instance, subsection, &path, reporter),
                None => reporter.report(Diagnostic::NotASection {
                    found: found(item),
                    path,
                }),
            },
            Binding::Sequence(access) => match item_to_value(item) {
                Some(Value::Array(items)) => {
                    access.load(instance, &items, attribute.rule(), &path, reporter)
                }
                _ => reporter.report(Diagnostic::NotASequence {
                    found: found(item),
                    path,
                }),
            },
            // A scalar where a mapping belongs counts as absent.
            Binding::Mapping(access) => {
                if let Some(subsection) = item.as_table_like() {
                    access.load(instance, subsection, attribute.rule(), &path, reporter);
                }
            }
        }
    }
}

/// Save every persistable attribute of `T` into `section`. Declared comments
/// are attached to the entries this save creates.
pub(crate) fn save_object<T: Mapped>(
    instance: &T,
    section: &mut Table,
    scope: &str,
    reporter: &mut dyn Reporter,
) {
    for attribute in resolve::<T>().persistable() {
        let path = qualify(scope, attribute.path());
        let existed = lookup(&*section, attribute.path()).is_some();

        match &attribute.binding {
            Binding::Scalar(access) | Binding::Converted(access) => {
                if let Some(raw) = access.save(instance) {
                    document::set(section, attribute.path(), &raw);
                }
            }
            Binding::Complex(access) => {
                let subsection = document::create_section(section, attribute.path());
                access.save(instance, subsection, &path, reporter);
            }
            Binding::Sequence(access) => {
                let items = access.save(instance, &path, reporter);
                document::set(section, attribute.path(), &Value::Array(items));
            }
            Binding::Mapping(access) => {
                let subsection = document::create_section(section, attribute.path());
                access.save(instance, subsection, &path, reporter);
            }
        }

        // Entries that were already there keep whatever comment the user left.
        if !existed {
            document::set_comments(section, attribute.path(), attribute.comments());
        }
    }
}
