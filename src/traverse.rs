//! Recursive traversal of nested objects, sequences and keyed mappings.
//!
//! Each declared attribute owns one field object implementing the access trait
//! for its kind. The field object carries the [`Lens`] and whatever codec the
//! element type needs, so the engine can walk any attribute through a trait
//! object without knowing its concrete type.
//!
//! Every loader replaces the whole field on success: a list or map in the
//! document is authoritative, and entries that fail to convert are dropped
//! (with a diagnostic) rather than merged with the previous contents.

use std::collections::BTreeMap;
use std::mem;

use toml::Value;
use toml_edit::{Table, TableLike};
use uuid::Uuid;

use crate::coerce::{Codec, CoerceError, ConfigEnum, raw_type_name};
use crate::convert::Converter;
use crate::descriptor::{Lens, Mapped};
use crate::document::{self, item_to_value, table_from_raw, table_to_raw};
use crate::mapper::{load_object, save_object};
use crate::report::{Diagnostic, Reporter};
use crate::validate::{Rule, validate};

pub(crate) trait ScalarAccess<T>: Send + Sync {
    /// Decode `raw` and assign it. On error the field is left unchanged.
    fn load(&self, target: &mut T, raw: &Value) -> Result<(), CoerceError>;
    fn save(&self, source: &T) -> Option<Value>;
    fn reset(&self, target: &mut T, reference: &mut T);
}

pub(crate) trait ObjectAccess<T>: Send + Sync {
    fn load(&self, target: &mut T, section: &dyn TableLike, scope: &str, reporter: &mut dyn Reporter);
    fn save(&self, source: &T, section: &mut Table, scope: &str, reporter: &mut dyn Reporter);
    fn reset(&self, target: &mut T, reference: &mut T);
}

pub(crate) trait SequenceAccess<T>: Send + Sync {
    fn load(
        &self,
        target: &mut T,
        items: &[Value],
        rule: Option<&Rule>,
        scope: &str,
        reporter: &mut dyn Reporter,
    );
    fn save(&self, source: &T, scope: &str, reporter: &mut dyn Reporter) -> Vec<Value>;
    fn reset(&self, target: &mut T, reference: &mut T);
}

pub(crate) trait MappingAccess<T>: Send + Sync {
    fn load(
        &self,
        target: &mut T,
        section: &dyn TableLike,
        rule: Option<&Rule>,
        scope: &str,
        reporter: &mut dyn Reporter,
    );
    fn save(&self, source: &T, section: &mut Table, scope: &str, reporter: &mut dyn Reporter);
    fn reset(&self, target: &mut T, reference: &mut T);
}

fn element_path(scope: &str, index: usize) -> String {
    format!("{scope}[{index}]")
}

fn entry_path(scope: &str, key: &str) -> String {
    format!("{scope}.{key}")
}

// -- Scalars ----------------------------------------------------------------

pub(crate) struct ScalarField<T, F> {
    lens: Lens<T, F>,
    codec: Codec<F>,
}

impl<T, F> ScalarField<T, F> {
    pub(crate) fn new(lens: Lens<T, F>, codec: Codec<F>) -> Self {
        Self { lens, codec }
    }
}

impl<T: 'static, F: Send + Sync + 'static> ScalarAccess<T> for ScalarField<T, F> {
    fn load(&self, target: &mut T, raw: &Value) -> Result<(), CoerceError> {
        *self.lens.get_mut(target) = self.codec.decode(raw)?;
        Ok(())
    }

    fn save(&self, source: &T) -> Option<Value> {
        self.codec.encode(self.lens.get(source))
    }

    fn reset(&self, target: &mut T, reference: &mut T) {
        mem::swap(self.lens.get_mut(target), self.lens.get_mut(reference));
    }
}

pub(crate) struct ConvertedField<T, C: Converter> {
    lens: Lens<T, C::Output>,
    converter: C,
}

impl<T, C: Converter> ConvertedField<T, C> {
    pub(crate) fn new(lens: Lens<T, C::Output>, converter: C) -> Self {
        Self { lens, converter }
    }
}

impl<T: 'static, C: Converter> ScalarAccess<T> for ConvertedField<T, C> {
    fn load(&self, target: &mut T, raw: &Value) -> Result<(), CoerceError> {
        let value = self
            .converter
            .to_attribute(raw)
            .ok_or(CoerceError::Converter(std::any::type_name::<C>()))?;
        *self.lens.get_mut(target) = value;
        Ok(())
    }

    fn save(&self, source: &T) -> Option<Value> {
        self.converter.to_document(self.lens.get(source))
    }

    fn reset(&self, target: &mut T, reference: &mut T) {
        mem::swap(self.lens.get_mut(target), self.lens.get_mut(reference));
    }
}

// -- Nested objects ---------------------------------------------------------

pub(crate) struct NestedField<T, N> {
    lens: Lens<T, N>,
}

impl<T, N> NestedField<T, N> {
    pub(crate) fn new(lens: Lens<T, N>) -> Self {
        Self { lens }
    }
}

impl<T: 'static, N: Mapped> ObjectAccess<T> for NestedField<T, N> {
    fn load(&self, target: &mut T, section: &dyn TableLike, scope: &str, reporter: &mut dyn Reporter) {
        load_object(self.lens.get_mut(target), section, scope, reporter);
    }

    fn save(&self, source: &T, section: &mut Table, scope: &str, reporter: &mut dyn Reporter) {
        save_object(self.lens.get(source), section, scope, reporter);
    }

    fn reset(&self, target: &mut T, reference: &mut T) {
        mem::swap(self.lens.get_mut(target), self.lens.get_mut(reference));
    }
}

pub(crate) struct OptionalNestedField<T, N> {
    lens: Lens<T, Option<N>>,
}

impl<T, N> OptionalNestedField<T, N> {
    pub(crate) fn new(lens: Lens<T, Option<N>>) -> Self {
        Self { lens }
    }
}

impl<T: 'static, N: Mapped> ObjectAccess<T> for OptionalNestedField<T, N> {
    fn load(&self, target: &mut T, section: &dyn TableLike, scope: &str, reporter: &mut dyn Reporter) {
        let nested = self.lens.get_mut(target).get_or_insert_with(N::default);
        load_object(nested, section, scope, reporter);
    }

    fn save(&self, source: &T, section: &mut Table, scope: &str, reporter: &mut dyn Reporter) {
        match self.lens.get(source) {
            Some(nested) => save_object(nested, section, scope, reporter),
            None => save_object(&N::default(), section, scope, reporter),
        }
    }

    fn reset(&self, target: &mut T, reference: &mut T) {
        mem::swap(self.lens.get_mut(target), self.lens.get_mut(reference));
    }
}

// -- Sequences --------------------------------------------------------------

pub(crate) struct ScalarList<T, F> {
    lens: Lens<T, Vec<F>>,
    codec: Codec<F>,
}

impl<T, F> ScalarList<T, F> {
    pub(crate) fn new(lens: Lens<T, Vec<F>>, codec: Codec<F>) -> Self {
        Self { lens, codec }
    }
}

impl<T: 'static, F: Send + Sync + 'static> SequenceAccess<T> for ScalarList<T, F> {
    fn load(
        &self,
        target: &mut T,
        items: &[Value],
        rule: Option<&Rule>,
        scope: &str,
        reporter: &mut dyn Reporter,
    ) {
        let mut out = Vec::with_capacity(items.len());
        for (index, raw) in items.iter().enumerate() {
            let path = element_path(scope, index);
            if let Some(rule) = rule
                && !validate(&path, Some(raw), rule, reporter)
            {
                continue;
            }
            match self.codec.decode(raw) {
                Ok(value) => out.push(value),
                Err(error) => reporter.report(Diagnostic::Coercion { path, error }),
            }
        }
        *self.lens.get_mut(target) = out;
    }

    fn save(&self, source: &T, _scope: &str, _reporter: &mut dyn Reporter) -> Vec<Value> {
        self.lens
            .get(source)
            .iter()
            .filter_map(|value| self.codec.encode(value))
            .collect()
    }

    fn reset(&self, target: &mut T, reference: &mut T) {
        mem::swap(self.lens.get_mut(target), self.lens.get_mut(reference));
    }
}

/// Free-form tables, kept as they are.
pub(crate) struct TableList<T> {
    lens: Lens<T, Vec<toml::Table>>,
}

impl<T> TableList<T> {
    pub(crate) fn new(lens: Lens<T, Vec<toml::Table>>) -> Self {
        Self { lens }
    }
}

impl<T: 'static> SequenceAccess<T> for TableList<T> {
    fn load(
        &self,
        target: &mut T,
        items: &[Value],
        _rule: Option<&Rule>,
        scope: &str,
        reporter: &mut dyn Reporter,
    ) {
        let mut out = Vec::with_capacity(items.len());
        for (index, raw) in items.iter().enumerate() {
            match raw {
                Value::Table(table) => out.push(table.clone()),
                other => reporter.report(Diagnostic::NotASection {
                    path: element_path(scope, index),
                    found: raw_type_name(other),
                }),
            }
        }
        *self.lens.get_mut(target) = out;
    }

    fn save(&self, source: &T, _scope: &str, _reporter: &mut dyn Reporter) -> Vec<Value> {
        self.lens
            .get(source)
            .iter()
            .cloned()
            .map(Value::Table)
            .collect()
    }

    fn reset(&self, target: &mut T, reference: &mut T) {
        mem::swap(self.lens.get_mut(target), self.lens.get_mut(reference));
    }
}

/// Nested objects in a list. Each element goes through a scratch table so it
/// can be loaded and saved with the full pipeline.
pub(crate) struct ObjectList<T, N> {
    lens: Lens<T, Vec<N>>,
}

impl<T, N> ObjectList<T, N> {
    pub(crate) fn new(lens: Lens<T, Vec<N>>) -> Self {
        Self { lens }
    }
}

impl<T: 'static, N: Mapped> SequenceAccess<T> for ObjectList<T, N> {
    fn load(
        &self,
        target: &mut T,
        items: &[Value],
        _rule: Option<&Rule>,
        scope: &str,
        reporter: &mut dyn Reporter,
    ) {
        let mut out = Vec::with_capacity(items.len());
        for (index, raw) in items.iter().enumerate() {
            let path = element_path(scope, index);
            let Value::Table(table) = raw else {
                reporter.report(Diagnostic::NotASection {
                    path,
                    found: raw_type_name(raw),
                });
                continue;
            };
            let scratch = table_from_raw(table);
            let mut element = N::default();
            load_object(&mut element, &scratch, &path, reporter);
            out.push(element);
        }
        *self.lens.get_mut(target) = out;
    }

    fn save(&self, source: &T, scope: &str, reporter: &mut dyn Reporter) -> Vec<Value> {
        self.lens
            .get(source)
            .iter()
            .enumerate()
            .map(|(index, element)| {
                let mut scratch = Table::new();
                save_object(element, &mut scratch, &element_path(scope, index), reporter);
                Value::Table(table_to_raw(&scratch))
            })
            .collect()
    }

    fn reset(&self, target: &mut T, reference: &mut T) {
        mem::swap(self.lens.get_mut(target), self.lens.get_mut(reference));
    }
}

// -- Keyed mappings ---------------------------------------------------------

/// A type usable as a mapping key. Keys are always strings in the document.
pub trait MapKey: Sized + Ord + Send + Sync + 'static {
    const TYPE_NAME: &'static str;

    fn parse_key(key: &str) -> Option<Self>;

    fn key_string(&self) -> String;
}

impl MapKey for String {
    const TYPE_NAME: &'static str = "string";

    fn parse_key(key: &str) -> Option<Self> {
        Some(key.to_string())
    }

    fn key_string(&self) -> String {
        self.clone()
    }
}

macro_rules! integral_key {
    ($($ty:ty),*) => {$(
        impl MapKey for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn parse_key(key: &str) -> Option<Self> {
                key.trim().parse().ok()
            }

            fn key_string(&self) -> String {
                self.to_string()
            }
        }
    )*};
}

integral_key!(i32, i64);

/// An `f64` usable as a map key, ordered with [`f64::total_cmp`].
#[derive(Debug, Clone, Copy)]
pub struct FloatKey(pub f64);

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0).is_eq()
    }
}

impl Eq for FloatKey {}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl MapKey for FloatKey {
    const TYPE_NAME: &'static str = "f64";

    fn parse_key(key: &str) -> Option<Self> {
        key.trim().parse().ok().map(FloatKey)
    }

    fn key_string(&self) -> String {
        self.0.to_string()
    }
}

impl MapKey for Uuid {
    const TYPE_NAME: &'static str = "uuid";

    fn parse_key(key: &str) -> Option<Self> {
        Uuid::parse_str(key.trim()).ok()
    }

    fn key_string(&self) -> String {
        self.to_string()
    }
}

/// Enum keys match member names case-insensitively and save by name.
impl<E: ConfigEnum + Ord> MapKey for E {
    const TYPE_NAME: &'static str = <E as ConfigEnum>::TYPE_NAME;

    fn parse_key(key: &str) -> Option<Self> {
        E::from_name(key)
    }

    fn key_string(&self) -> String {
        self.name().to_string()
    }
}

/// Parse every key of `section`, reporting and dropping the ones that fail.
fn parsed_entries<'s, K: MapKey>(
    section: &'s dyn TableLike,
    scope: &str,
    reporter: &mut dyn Reporter,
) -> Vec<(K, &'s str, &'s toml_edit::Item)> {
    let mut entries = Vec::new();
    for (key, item) in section.iter() {
        match K::parse_key(key) {
            Some(parsed) => entries.push((parsed, key, item)),
            None => reporter.report(Diagnostic::KeyConversion {
                path: scope.to_string(),
                key: key.to_string(),
                target: K::TYPE_NAME,
            }),
        }
    }
    entries
}

/// Remove keys from `section` that no longer exist in the map.
fn retain_keys<K: MapKey, V>(section: &mut Table, map: &BTreeMap<K, V>) {
    let keep: Vec<String> = map.keys().map(MapKey::key_string).collect();
    section.retain(|key, _| keep.iter().any(|k| k == key));
}

pub(crate) struct ScalarMap<T, K, V> {
    lens: Lens<T, BTreeMap<K, V>>,
    codec: Codec<V>,
}

impl<T, K, V> ScalarMap<T, K, V> {
    pub(crate) fn new(lens: Lens<T, BTreeMap<K, V>>, codec: Codec<V>) -> Self {
        Self { lens, codec }
    }
}

impl<T: 'static, K: MapKey, V: Send + Sync + 'static> MappingAccess<T> for ScalarMap<T, K, V> {
    fn load(
        &self,
        target: &mut T,
        section: &dyn TableLike,
        rule: Option<&Rule>,
        scope: &str,
        reporter: &mut dyn Reporter,
    ) {
        let mut out = BTreeMap::new();
        for (key, raw_key, item) in parsed_entries::<K>(section, scope, reporter) {
            let path = entry_path(scope, raw_key);
            let Some(raw) = item_to_value(item) else {
                continue;
            };
            if let Some(rule) = rule
                && !validate(&path, Some(&raw), rule, reporter)
            {
                continue;
            }
            match self.codec.decode(&raw) {
                Ok(value) => {
                    out.insert(key, value);
                }
                Err(error) => reporter.report(Diagnostic::Coercion { path, error }),
            }
        }
        *self.lens.get_mut(target) = out;
    }

    fn save(&self, source: &T, section: &mut Table, _scope: &str, _reporter: &mut dyn Reporter) {
        let map = self.lens.get(source);
        retain_keys(section, map);
        for (key, value) in map {
            let key = key.key_string();
            match self.codec.encode(value) {
                Some(raw) => document::set_entry(section, &key, &raw),
                None => {
                    section.remove(&key);
                }
            }
        }
    }

    fn reset(&self, target: &mut T, reference: &mut T) {
        mem::swap(self.lens.get_mut(target), self.lens.get_mut(reference));
    }
}

pub(crate) struct ObjectMap<T, K, N> {
    lens: Lens<T, BTreeMap<K, N>>,
}

impl<T, K, N> ObjectMap<T, K, N> {
    pub(crate) fn new(lens: Lens<T, BTreeMap<K, N>>) -> Self {
        Self { lens }
    }
}

impl<T: 'static, K: MapKey, N: Mapped> MappingAccess<T> for ObjectMap<T, K, N> {
    fn load(
        &self,
        target: &mut T,
        section: &dyn TableLike,
        _rule: Option<&Rule>,
        scope: &str,
        reporter: &mut dyn Reporter,
    ) {
        let mut out = BTreeMap::new();
        for (key, raw_key, item) in parsed_entries::<K>(section, scope, reporter) {
            let Some(subsection) = item.as_table_like() else {
                reporter.report(Diagnostic::MissingSubsection {
                    path: scope.to_string(),
                    key: raw_key.to_string(),
                });
                continue;
            };
            let mut value = N::default();
            load_object(&mut value, subsection, &entry_path(scope, raw_key), reporter);
            out.insert(key, value);
        }
        *self.lens.get_mut(target) = out;
    }

    fn save(&self, source: &T, section: &mut Table, scope: &str, reporter: &mut dyn Reporter) {
        let map = self.lens.get(source);
        retain_keys(section, map);
        for (key, value) in map {
            let key = key.key_string();
            let path = entry_path(scope, &key);
            save_object(value, document::entry_section(section, &key), &path, reporter);
        }
    }

    fn reset(&self, target: &mut T, reference: &mut T) {
        mem::swap(self.lens.get_mut(target), self.lens.get_mut(reference));
    }
}
