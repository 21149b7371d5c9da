//! Type descriptors: what a mapped type persists and how.
//!
//! A type opts in by implementing [`Mapped`]. Its `describe` function declares
//! each persistable attribute once, through the [`Describe`] builder, together
//! with type-level metadata (schema version, header, backup policy, hooks).
//! Fields that are never declared are transient.
//!
//! ```ignore
//! #[derive(Default)]
//! struct Server {
//!     max_players: u32,
//!     motd: String,
//! }
//!
//! impl Mapped for Server {
//!     fn describe(d: &mut Describe<Self>) {
//!         d.version(2);
//!         d.value("max_players", lens!(max_players))
//!             .comment("Players allowed at once.")
//!             .validate(Rule::range(1.0, 500.0));
//!         d.value("motd", lens!(motd)).path("display.motd");
//!     }
//! }
//! ```
//!
//! The descriptor is built on first use by [`resolve`] and cached for the life
//! of the process.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{PoisonError, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::coerce::{Codec, ConfigEnum, Primitive};
use crate::convert::{Converter, SerdeConverter};
use crate::hooks::{Hook, HookError};
use crate::traverse::{
    ConvertedField, MapKey, MappingAccess, NestedField, ObjectAccess, ObjectList, ObjectMap,
    OptionalNestedField, ScalarAccess, ScalarField, ScalarList, ScalarMap, SequenceAccess,
    TableList,
};
use crate::types::{BackupPolicy, Kind};
use crate::validate::Rule;

/// A type that can be loaded from and saved to a document.
///
/// Mapped types must implement [`Default`]: nested objects, list elements and
/// map values are default-constructed before they are loaded, and
/// [`reset_to_defaults`](crate::reset_to_defaults) copies from a fresh default.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a mapped type",
    note = "implement `figmap::Mapped` for `{Self}` (it must also implement `Default`)"
)]
pub trait Mapped: Default + 'static {
    fn describe(d: &mut Describe<Self>);
}

/// Typed access to one field of `T`.
///
/// Build one with [`lens!`](crate::lens).
pub struct Lens<T, F> {
    get: fn(&T) -> &F,
    get_mut: fn(&mut T) -> &mut F,
}

impl<T, F> Lens<T, F> {
    pub const fn new(get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> Self {
        Self { get, get_mut }
    }

    pub fn get<'a>(&self, target: &'a T) -> &'a F {
        (self.get)(target)
    }

    pub fn get_mut<'a>(&self, target: &'a mut T) -> &'a mut F {
        (self.get_mut)(target)
    }
}

impl<T, F> Clone for Lens<T, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, F> Copy for Lens<T, F> {}

/// Build a [`Lens`] for a field, or a dotted chain of fields.
///
/// ```ignore
/// d.value("port", lens!(port));
/// d.value("pool", lens!(database.pool_size));
/// ```
#[macro_export]
macro_rules! lens {
    ($($field:ident).+) => {
        $crate::Lens::new(|t| &t.$($field).+, |t| &mut t.$($field).+)
    };
}

/// How the engine reaches an attribute's field. One variant per structural
/// kind; converted attributes bypass coercion entirely.
pub(crate) enum Binding<T> {
    Scalar(Box<dyn ScalarAccess<T>>),
    Converted(Box<dyn ScalarAccess<T>>),
    Complex(Box<dyn ObjectAccess<T>>),
    Sequence(Box<dyn SequenceAccess<T>>),
    Mapping(Box<dyn MappingAccess<T>>),
}

impl<T> Binding<T> {
    /// Move the field's value out of `reference` into `target`.
    pub(crate) fn reset(&self, target: &mut T, reference: &mut T) {
        match self {
            Binding::Scalar(access) | Binding::Converted(access) => access.reset(target, reference),
            Binding::Complex(access) => access.reset(target, reference),
            Binding::Sequence(access) => access.reset(target, reference),
            Binding::Mapping(access) => access.reset(target, reference),
        }
    }
}

/// Resolved metadata for one persistable attribute.
pub struct Attribute<T> {
    name: &'static str,
    path: String,
    kind: Kind,
    element_type: Option<&'static str>,
    key_type: Option<&'static str>,
    value_type: Option<&'static str>,
    converter: Option<&'static str>,
    rule: Option<Rule>,
    comments: Vec<String>,
    legacy_path: Option<String>,
    ignored: bool,
    pub(crate) binding: Binding<T>,
}

impl<T> Attribute<T> {
    fn new(name: &'static str, kind: Kind, binding: Binding<T>) -> Self {
        Self {
            name,
            path: kebab_case(name),
            kind,
            element_type: None,
            key_type: None,
            value_type: None,
            converter: None,
            rule: None,
            comments: Vec::new(),
            legacy_path: None,
            ignored: false,
            binding,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Dotted document path, relative to the owning section.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Element type of a sequence.
    pub fn element_type(&self) -> Option<&'static str> {
        self.element_type
    }

    /// Key type of a mapping.
    pub fn key_type(&self) -> Option<&'static str> {
        self.key_type
    }

    /// Value type of a mapping.
    pub fn value_type(&self) -> Option<&'static str> {
        self.value_type
    }

    /// Type name of the converter, for converted attributes.
    pub fn converter(&self) -> Option<&'static str> {
        self.converter
    }

    pub fn rule(&self) -> Option<&Rule> {
        self.rule.as_ref()
    }

    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    pub fn legacy_path(&self) -> Option<&str> {
        self.legacy_path.as_deref()
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }
}

impl<T> fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("kind", &self.kind)
            .field("converter", &self.converter)
            .field("legacy_path", &self.legacy_path)
            .field("ignored", &self.ignored)
            .finish_non_exhaustive()
    }
}

/// Fine-tunes the attribute just declared on a [`Describe`].
pub struct AttributeBuilder<'a, T> {
    attribute: &'a mut Attribute<T>,
}

impl<T> AttributeBuilder<'_, T> {
    /// Store the attribute at `path` instead of the kebab-cased name.
    pub fn path(self, path: impl Into<String>) -> Self {
        self.attribute.path = path.into();
        self
    }

    /// Add a comment line written above the attribute on save. Call repeatedly
    /// for several lines; an empty string is a bare `#` line.
    pub fn comment(self, line: impl Into<String>) -> Self {
        self.attribute.comments.push(line.into());
        self
    }

    pub fn validate(self, rule: Rule) -> Self {
        self.attribute.rule = Some(rule);
        self
    }

    /// Read from `path` when the attribute's own path is absent. Saving always
    /// writes the current path.
    pub fn legacy_path(self, path: impl Into<String>) -> Self {
        self.attribute.legacy_path = Some(path.into());
        self
    }

    /// Keep the declaration but exclude it from load, save and reset.
    pub fn ignore(self) -> Self {
        self.attribute.ignored = true;
        self
    }
}

/// Collects the declarations of a mapped type. Handed to
/// [`Mapped::describe`].
pub struct Describe<T> {
    attributes: Vec<Attribute<T>>,
    version: Option<i64>,
    header: Vec<String>,
    backup: Option<BackupPolicy>,
    post_load: Vec<Hook<T>>,
    on_reload: Vec<Hook<T>>,
}

impl<T: Mapped> Describe<T> {
    fn new() -> Self {
        Self {
            attributes: Vec::new(),
            version: None,
            header: Vec::new(),
            backup: None,
            post_load: Vec::new(),
            on_reload: Vec::new(),
        }
    }

    /// Declare the schema version documents of this type should be at.
    pub fn version(&mut self, version: i64) -> &mut Self {
        self.version = Some(version);
        self
    }

    /// Header comment block written at the top of the document.
    pub fn header<I, S>(&mut self, lines: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Opt into backups before migrations and broken-document recovery.
    pub fn backup(&mut self, policy: BackupPolicy) -> &mut Self {
        self.backup = Some(policy);
        self
    }

    pub fn post_load(
        &mut self,
        name: &'static str,
        run: fn(&mut T) -> Result<(), HookError>,
    ) -> &mut Self {
        self.post_load.push(Hook { name, run });
        self
    }

    pub fn on_reload(
        &mut self,
        name: &'static str,
        run: fn(&mut T) -> Result<(), HookError>,
    ) -> &mut Self {
        self.on_reload.push(Hook { name, run });
        self
    }

    fn push(&mut self, attribute: Attribute<T>) -> AttributeBuilder<'_, T> {
        self.attributes.push(attribute);
        let last = self.attributes.len() - 1;
        AttributeBuilder {
            attribute: &mut self.attributes[last],
        }
    }

    /// A scalar: `bool`, integers, floats, `String`, `char`, or `Option` of
    /// any of those.
    pub fn value<F: Primitive>(
        &mut self,
        name: &'static str,
        lens: Lens<T, F>,
    ) -> AttributeBuilder<'_, T> {
        let field = ScalarField::new(lens, Codec::<F>::primitive());
        self.push(Attribute::new(
            name,
            Kind::Primitive,
            Binding::Scalar(Box::new(field)),
        ))
    }

    pub fn enumeration<E: ConfigEnum>(
        &mut self,
        name: &'static str,
        lens: Lens<T, E>,
    ) -> AttributeBuilder<'_, T> {
        let field = ScalarField::new(lens, Codec::<E>::enumeration());
        self.push(Attribute::new(name, Kind::Enum, Binding::Scalar(Box::new(field))))
    }

    /// A nested object stored as its own section.
    pub fn nested<N: Mapped>(
        &mut self,
        name: &'static str,
        lens: Lens<T, N>,
    ) -> AttributeBuilder<'_, T> {
        self.push(Attribute::new(
            name,
            Kind::Complex,
            Binding::Complex(Box::new(NestedField::new(lens))),
        ))
    }

    /// Like [`nested`](Self::nested) for an `Option` field. An unset value is
    /// default-constructed on load.
    pub fn optional_nested<N: Mapped>(
        &mut self,
        name: &'static str,
        lens: Lens<T, Option<N>>,
    ) -> AttributeBuilder<'_, T> {
        self.push(Attribute::new(
            name,
            Kind::Complex,
            Binding::Complex(Box::new(OptionalNestedField::new(lens))),
        ))
    }

    pub fn list<F: Primitive>(
        &mut self,
        name: &'static str,
        lens: Lens<T, Vec<F>>,
    ) -> AttributeBuilder<'_, T> {
        let mut attribute = Attribute::new(
            name,
            Kind::Sequence,
            Binding::Sequence(Box::new(ScalarList::new(lens, Codec::<F>::primitive()))),
        );
        attribute.element_type = Some(F::TYPE_NAME);
        self.push(attribute)
    }

    pub fn enum_list<E: ConfigEnum>(
        &mut self,
        name: &'static str,
        lens: Lens<T, Vec<E>>,
    ) -> AttributeBuilder<'_, T> {
        let mut attribute = Attribute::new(
            name,
            Kind::Sequence,
            Binding::Sequence(Box::new(ScalarList::new(lens, Codec::<E>::enumeration()))),
        );
        attribute.element_type = Some(E::TYPE_NAME);
        self.push(attribute)
    }

    /// A list of free-form tables, kept verbatim.
    pub fn table_list(
        &mut self,
        name: &'static str,
        lens: Lens<T, Vec<toml::Table>>,
    ) -> AttributeBuilder<'_, T> {
        let mut attribute = Attribute::new(
            name,
            Kind::Sequence,
            Binding::Sequence(Box::new(TableList::new(lens))),
        );
        attribute.element_type = Some("table");
        self.push(attribute)
    }

    /// A list of nested objects, stored as an array of tables.
    pub fn object_list<N: Mapped>(
        &mut self,
        name: &'static str,
        lens: Lens<T, Vec<N>>,
    ) -> AttributeBuilder<'_, T> {
        let mut attribute = Attribute::new(
            name,
            Kind::Sequence,
            Binding::Sequence(Box::new(ObjectList::new(lens))),
        );
        attribute.element_type = Some(std::any::type_name::<N>());
        self.push(attribute)
    }

    /// A keyed section of scalar values.
    pub fn map<K: MapKey, V: Primitive>(
        &mut self,
        name: &'static str,
        lens: Lens<T, BTreeMap<K, V>>,
    ) -> AttributeBuilder<'_, T> {
        let mut attribute = Attribute::new(
            name,
            Kind::Mapping,
            Binding::Mapping(Box::new(ScalarMap::new(lens, Codec::<V>::primitive()))),
        );
        attribute.key_type = Some(K::TYPE_NAME);
        attribute.value_type = Some(V::TYPE_NAME);
        self.push(attribute)
    }

    pub fn enum_map<K: MapKey, E: ConfigEnum>(
        &mut self,
        name: &'static str,
        lens: Lens<T, BTreeMap<K, E>>,
    ) -> AttributeBuilder<'_, T> {
        let mut attribute = Attribute::new(
            name,
            Kind::Mapping,
            Binding::Mapping(Box::new(ScalarMap::new(lens, Codec::<E>::enumeration()))),
        );
        attribute.key_type = Some(K::TYPE_NAME);
        attribute.value_type = Some(E::TYPE_NAME);
        self.push(attribute)
    }

    /// A keyed section whose entries are nested objects, one sub-section per
    /// key.
    pub fn object_map<K: MapKey, N: Mapped>(
        &mut self,
        name: &'static str,
        lens: Lens<T, BTreeMap<K, N>>,
    ) -> AttributeBuilder<'_, T> {
        let mut attribute = Attribute::new(
            name,
            Kind::Mapping,
            Binding::Mapping(Box::new(ObjectMap::new(lens))),
        );
        attribute.key_type = Some(K::TYPE_NAME);
        attribute.value_type = Some(std::any::type_name::<N>());
        self.push(attribute)
    }

    /// Hand the raw value to `converter` instead of the built-in rules.
    pub fn converted<C: Converter>(
        &mut self,
        name: &'static str,
        lens: Lens<T, C::Output>,
        converter: C,
    ) -> AttributeBuilder<'_, T> {
        let mut attribute = Attribute::new(
            name,
            Kind::Primitive,
            Binding::Converted(Box::new(ConvertedField::new(lens, converter))),
        );
        attribute.converter = Some(std::any::type_name::<C>());
        self.push(attribute)
    }

    /// Convert through serde, for any type with `Serialize` and
    /// `Deserialize` impls.
    pub fn serde<F>(&mut self, name: &'static str, lens: Lens<T, F>) -> AttributeBuilder<'_, T>
    where
        F: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.converted(name, lens, SerdeConverter::<F>::new())
    }
}

/// The resolved, immutable description of a mapped type.
pub struct TypeDescriptor<T> {
    attributes: Vec<Attribute<T>>,
    version: Option<i64>,
    header: Vec<String>,
    backup: Option<BackupPolicy>,
    pub(crate) post_load: Vec<Hook<T>>,
    pub(crate) on_reload: Vec<Hook<T>>,
}

impl<T: Mapped> TypeDescriptor<T> {
    fn build() -> Self {
        let mut d = Describe::<T>::new();
        T::describe(&mut d);
        Self {
            attributes: d.attributes,
            version: d.version,
            header: d.header,
            backup: d.backup,
            post_load: d.post_load,
            on_reload: d.on_reload,
        }
    }
}

impl<T> TypeDescriptor<T> {
    /// Every declared attribute, ignored ones included, in declaration order.
    pub fn attributes(&self) -> &[Attribute<T>] {
        &self.attributes
    }

    /// Attributes the engine loads, saves and resets.
    pub fn persistable(&self) -> impl Iterator<Item = &Attribute<T>> {
        self.attributes.iter().filter(|a| !a.ignored)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute<T>> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn backup_policy(&self) -> Option<&BackupPolicy> {
        self.backup.as_ref()
    }

    pub fn post_load_hooks(&self) -> &[Hook<T>] {
        &self.post_load
    }

    pub fn on_reload_hooks(&self) -> &[Hook<T>] {
        &self.on_reload
    }
}

impl<T> fmt::Debug for TypeDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("attributes", &self.attributes)
            .field("version", &self.version)
            .field("header", &self.header)
            .field("backup", &self.backup)
            .field("post_load", &self.post_load)
            .field("on_reload", &self.on_reload)
            .finish()
    }
}

type Registry = HashMap<TypeId, &'static (dyn Any + Send + Sync)>;

static REGISTRY: Lazy<RwLock<Registry>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// The descriptor of `T`, built on first use and cached for the life of the
/// process.
///
/// Two threads racing on the first use both build a descriptor; the first one
/// stored wins and the other is dropped. Building is deterministic, so either
/// is correct.
pub fn resolve<T: Mapped>() -> &'static TypeDescriptor<T> {
    let id = TypeId::of::<T>();
    let cached = REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .copied();
    let entry = match cached {
        Some(entry) => entry,
        None => {
            // Built outside the lock: `describe` may resolve other types.
            let built = TypeDescriptor::<T>::build();
            let mut registry = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
            match registry.get(&id) {
                Some(existing) => *existing,
                None => {
                    let leaked: &'static (dyn Any + Send + Sync) = Box::leak(Box::new(built));
                    registry.insert(id, leaked);
                    leaked
                }
            }
        }
    };
    match entry.downcast_ref::<TypeDescriptor<T>>() {
        Some(descriptor) => descriptor,
        None => unreachable!("registry entries are keyed by their own TypeId"),
    }
}

static CASE_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new("([a-z])([A-Z]+)").expect("case boundary pattern is valid"));

/// Default document path for an attribute name: `maxPlayers` and
/// `max_players` both become `max-players`.
pub fn kebab_case(name: &str) -> String {
    CASE_BOUNDARY
        .replace_all(name, "$1-$2")
        .replace('_', "-")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::test::{Color, Inventory, Player, ServerConfig};

    #[test]
    fn kebab_case_paths() {
        assert_eq!(kebab_case("maxPlayers"), "max-players");
        assert_eq!(kebab_case("max_players"), "max-players");
        assert_eq!(kebab_case("port"), "port");
        assert_eq!(kebab_case("enableHTTPServer"), "enable-httpserver");
        assert_eq!(kebab_case("HTTPPort"), "httpport");
        assert_eq!(kebab_case("ipV4"), "ip-v4");
    }

    #[test]
    fn attributes_keep_declaration_order() {
        let names: Vec<_> = resolve::<ServerConfig>()
            .attributes()
            .iter()
            .map(Attribute::name)
            .collect();
        assert_eq!(
            names,
            [
                "motd",
                "maxPlayers",
                "difficulty",
                "whitelist",
                "database",
                "limits",
                "session_token",
            ]
        );
    }

    #[test]
    fn resolved_metadata() {
        let d = resolve::<ServerConfig>();
        let max = d.attribute("maxPlayers").unwrap();
        assert_eq!(max.path(), "max-players");
        assert_eq!(max.kind(), Kind::Primitive);
        assert_eq!(max.rule().unwrap().bounds(), (Some(0.0), Some(100.0)));
        assert_eq!(max.comments(), ["Players allowed at once."]);

        let motd = d.attribute("motd").unwrap();
        assert_eq!(motd.path(), "display.motd");
        assert_eq!(motd.legacy_path(), Some("message-of-the-day"));

        assert_eq!(d.attribute("difficulty").unwrap().kind(), Kind::Enum);
        assert_eq!(d.attribute("database").unwrap().kind(), Kind::Complex);

        let whitelist = d.attribute("whitelist").unwrap();
        assert_eq!(whitelist.kind(), Kind::Sequence);
        assert_eq!(whitelist.element_type(), Some("string"));

        let limits = d.attribute("limits").unwrap();
        assert_eq!(limits.kind(), Kind::Mapping);
        assert_eq!(limits.key_type(), Some("string"));
        assert_eq!(limits.value_type(), Some("i64"));

        assert!(d.attribute("session_token").unwrap().is_ignored());
        assert_eq!(d.persistable().count(), 6);
        assert_eq!(d.version(), Some(3));
        assert_eq!(d.header(), ["Server settings"]);
    }

    #[test]
    fn converter_is_named() {
        let d = resolve::<Player>();
        let cooldown = d.attribute("cooldown").unwrap();
        assert!(cooldown.converter().unwrap().ends_with("DurationConverter"));
        assert_eq!(cooldown.kind(), Kind::Primitive);
        assert!(d.attribute("name").unwrap().converter().is_none());
    }

    #[test]
    fn mapping_metadata_for_enum_values() {
        let d = resolve::<Inventory>();
        let colors = d.attribute("colors").unwrap();
        assert_eq!(colors.value_type(), Some(<Color as ConfigEnum>::TYPE_NAME));
    }

    #[test]
    fn resolve_is_cached() {
        let a = resolve::<ServerConfig>() as *const _;
        let b = resolve::<ServerConfig>() as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn resolve_from_many_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| resolve::<Inventory>().attributes().len()))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), resolve::<Inventory>().attributes().len());
        }
    }

    #[test]
    fn lens_reads_and_writes() {
        let lens: Lens<ServerConfig, u32> = lens!(max_players);
        let mut config = ServerConfig::default();
        *lens.get_mut(&mut config) = 7;
        assert_eq!(*lens.get(&config), 7);

        let nested: Lens<ServerConfig, u32> = lens!(database.pool_size);
        assert_eq!(*nested.get(&config), config.database.pool_size);
    }
}
