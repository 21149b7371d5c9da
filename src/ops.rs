//! Read-only operations on mapped types: template generation and value listing.
//!
//! Both render through the regular save pipeline, so what they show is exactly
//! what a config file would contain.

use toml::Value;
use toml_edit::{Item, TableLike};

use crate::descriptor::{Mapped, resolve};
use crate::document::{Document, item_to_value, value_to_edit};
use crate::mapper::save_to_config;
use crate::migrate::VERSION_KEY;
use crate::report::TracingReporter;

/// Render a fully defaulted, commented document for `T`: the header, the
/// version stamp (when declared) and every persistable path with its comments.
pub fn generate_template<T: Mapped>() -> String {
    let mut doc = Document::new();
    if let Some(version) = resolve::<T>().version() {
        doc.set(VERSION_KEY, &Value::Integer(version));
    }
    save_to_config(&T::default(), &mut doc, &mut TracingReporter);
    doc.to_string()
}

/// Every value `instance` would persist, as dotted key/value pairs in document
/// order. Sections are flattened; lists and arrays of tables are shown inline.
pub fn list_values<T: Mapped>(instance: &T) -> Vec<(String, String)> {
    let mut doc = Document::new();
    save_to_config(instance, &mut doc, &mut TracingReporter);
    let mut entries = Vec::new();
    flatten_into(doc.root(), "", &mut entries);
    entries
}

fn flatten_into(section: &dyn TableLike, prefix: &str, out: &mut Vec<(String, String)>) {
    for (key, item) in section.iter() {
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        };
        match item {
            Item::Table(_) | Item::Value(toml_edit::Value::InlineTable(_)) => {
                if let Some(table) = item.as_table_like() {
                    flatten_into(table, &path, out);
                }
            }
            _ => {
                if let Some(value) = item_to_value(item) {
                    out.push((path, format_value(&value)));
                }
            }
        }
    }
}

/// Strings are shown bare; everything else in TOML syntax.
fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        other => value_to_edit(other).to_string(),
    }
}
