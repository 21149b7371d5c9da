//! Comment-preserving TOML document: the store the mapping engine reads from
//! and writes to.
//!
//! Built on `toml_edit`, so everything the engine does not touch (user
//! comments, key order, formatting, keys unknown to the mapped type) survives a
//! load/save cycle. Paths are dotted (`server.port`); every segment but the last
//! names a table.
//!
//! Raw values cross the boundary as [`toml::Value`]. TOML has no null, so an
//! absent path is the null value.
//!
//! # Header
//!
//! A leading block of `#` lines followed by a blank line is the document header.
//! It is kept apart from the body and written back first, so a type can own the
//! header without disturbing the comments of the first key.

use std::fmt;
use std::str::FromStr;

use toml::Value;
use toml_edit::{ArrayOfTables, DocumentMut, Item, Table, TableLike};

use crate::error::FigmapError;

/// A parsed TOML document plus its header comment block.
#[derive(Debug, Clone, Default)]
pub struct Document {
    header: Vec<String>,
    body: DocumentMut,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, FigmapError> {
        let (header, body) = split_header(text);
        let body: DocumentMut = body.parse()?;
        Ok(Self { header, body })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn set_header<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header = lines.into_iter().map(Into::into).collect();
    }

    pub fn root(&self) -> &Table {
        self.body.as_table()
    }

    pub fn root_mut(&mut self) -> &mut Table {
        self.body.as_table_mut()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        get(self.root(), path)
    }

    pub fn contains(&self, path: &str) -> bool {
        lookup(self.root(), path).is_some()
    }

    pub fn is_section(&self, path: &str) -> bool {
        lookup(self.root(), path).is_some_and(Item::is_table_like)
    }

    pub fn section(&self, path: &str) -> Option<&dyn TableLike> {
        lookup(self.root(), path).and_then(Item::as_table_like)
    }

    /// The list at `path`, if there is one.
    pub fn sequence(&self, path: &str) -> Option<Vec<Value>> {
        match self.get(path)? {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn set(&mut self, path: &str, value: &Value) {
        set(self.root_mut(), path, value);
    }

    pub fn create_section(&mut self, path: &str) -> &mut Table {
        create_section(self.root_mut(), path)
    }

    pub fn set_comments(&mut self, path: &str, lines: &[String]) {
        set_comments(self.root_mut(), path, lines);
    }
}

impl FromStr for Document {
    type Err = FigmapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.header.is_empty() {
            for line in &self.header {
                if line.is_empty() {
                    writeln!(f, "#")?;
                } else {
                    writeln!(f, "# {line}")?;
                }
            }
            writeln!(f)?;
        }
        write!(f, "{}", self.body)
    }
}

/// Split off the header block: comment lines up to the first blank line.
/// Without a terminating blank line the comments belong to the body.
fn split_header(text: &str) -> (Vec<String>, &str) {
    let mut header = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if header.is_empty() {
                return (Vec::new(), text);
            }
            return (header, &text[offset + line.len()..]);
        }
        let Some(comment) = trimmed.strip_prefix('#') else {
            return (Vec::new(), text);
        };
        header.push(comment.strip_prefix(' ').unwrap_or(comment).to_string());
        offset += line.len();
    }
    (Vec::new(), text)
}

/// Walk a dotted path through nested tables.
pub(crate) fn lookup<'a>(section: &'a dyn TableLike, path: &str) -> Option<&'a Item> {
    let mut segments = path.split('.');
    let mut item = section.get(segments.next()?)?;
    for segment in segments {
        item = item.as_table_like()?.get(segment)?;
    }
    if item.is_none() { None } else { Some(item) }
}

pub(crate) fn get(section: &dyn TableLike, path: &str) -> Option<Value> {
    lookup(section, path).and_then(item_to_value)
}

/// Set `path` to `value`, creating intermediate tables. An existing scalar
/// keeps its decoration, so trailing comments survive the rewrite.
pub(crate) fn set(table: &mut Table, path: &str, value: &Value) {
    let (parent, leaf) = parent_table(table, path);
    set_entry(parent, leaf, value);
}

/// Set a single key of `table`. Dots in `key` are part of the key.
pub(crate) fn set_entry(table: &mut Table, key: &str, value: &Value) {
    let mut item = value_to_item(value);
    if let (Some(old), Some(new)) = (
        table.get(key).and_then(Item::as_value),
        item.as_value_mut(),
    ) {
        *new.decor_mut() = old.decor().clone();
    }
    table[key] = item;
}

/// Get or create the table at `path`. An inline table found there is promoted
/// to a standard table with its entries; any other value is replaced.
pub(crate) fn create_section<'t>(table: &'t mut Table, path: &str) -> &'t mut Table {
    let (parent, leaf) = parent_table(table, path);
    entry_section(parent, leaf)
}

/// Get or create the table under a single key of `table`.
pub(crate) fn entry_section<'t>(table: &'t mut Table, key: &str) -> &'t mut Table {
    let section = table_entry(table, key, Table::new());
    section.set_implicit(false);
    section
}

/// Attach comment lines above `path`. Replaces whatever comment was there.
pub(crate) fn set_comments(table: &mut Table, path: &str, lines: &[String]) {
    if lines.is_empty() || lookup(&*table, path).is_none() {
        return;
    }
    let prefix: String = lines
        .iter()
        .map(|line| {
            if line.is_empty() {
                "#\n".to_string()
            } else {
                format!("# {line}\n")
            }
        })
        .collect();

    let (parent, leaf) = parent_table(table, path);
    if let Some(Item::Table(section)) = parent.get_mut(leaf) {
        section.decor_mut().set_prefix(prefix);
    } else if let Some(mut key) = parent.key_mut(leaf) {
        key.leaf_decor_mut().set_prefix(prefix);
    }
}

fn parent_table<'t, 'p>(table: &'t mut Table, path: &'p str) -> (&'t mut Table, &'p str) {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };
    let mut current = table;
    for segment in parents.into_iter().flat_map(|p| p.split('.')) {
        let mut implicit = Table::new();
        implicit.set_implicit(true);
        current = table_entry(current, segment, implicit);
    }
    (current, leaf)
}

/// The table under `key`, inserting `fresh` when the key is absent. A key
/// that held a value sheds its `key = ` decor, which has no place in a
/// `[header]`.
fn table_entry<'t>(table: &'t mut Table, key: &str, fresh: Table) -> &'t mut Table {
    if table.get(key).is_some_and(|item| !item.is_table())
        && let Some(mut existing) = table.key_mut(key)
    {
        existing.leaf_decor_mut().clear();
    }
    ensure_table(table.entry(key).or_insert(Item::Table(fresh)))
}

fn ensure_table(item: &mut Item) -> &mut Table {
    if !item.is_table() {
        let table = match std::mem::take(item) {
            Item::Value(toml_edit::Value::InlineTable(inline)) => inline.into_table(),
            _ => Table::new(),
        };
        *item = Item::Table(table);
    }
    match item {
        Item::Table(table) => table,
        _ => unreachable!("item was just replaced with a table"),
    }
}

/// Convert a document item into a raw value. `Item::None` has no raw form.
pub(crate) fn item_to_value(item: &Item) -> Option<Value> {
    match item {
        Item::None => None,
        Item::Value(value) => Some(edit_to_value(value)),
        Item::Table(table) => Some(Value::Table(table_to_raw(table))),
        Item::ArrayOfTables(tables) => Some(Value::Array(
            tables
                .iter()
                .map(|table| Value::Table(table_to_raw(table)))
                .collect(),
        )),
    }
}

fn edit_to_value(value: &toml_edit::Value) -> Value {
    match value {
        toml_edit::Value::String(s) => Value::String(s.value().clone()),
        toml_edit::Value::Integer(i) => Value::Integer(*i.value()),
        toml_edit::Value::Float(f) => Value::Float(*f.value()),
        toml_edit::Value::Boolean(b) => Value::Boolean(*b.value()),
        toml_edit::Value::Datetime(d) => Value::Datetime(d.value().clone()),
        toml_edit::Value::Array(items) => Value::Array(items.iter().map(edit_to_value).collect()),
        toml_edit::Value::InlineTable(table) => Value::Table(
            table
                .iter()
                .map(|(key, value)| (key.to_string(), edit_to_value(value)))
                .collect(),
        ),
    }
}

/// Snapshot a table (standard or inline) as a raw table.
pub(crate) fn table_to_raw(table: &dyn TableLike) -> toml::Table {
    table
        .iter()
        .filter_map(|(key, item)| item_to_value(item).map(|value| (key.to_string(), value)))
        .collect()
}

/// Build a detached table from a raw table. Used as the scratch section for
/// sequence elements.
pub(crate) fn table_from_raw(raw: &toml::Table) -> Table {
    let mut table = Table::new();
    for (key, value) in raw {
        table.insert(key, value_to_item(value));
    }
    table
}

/// Convert a raw value into a document item. Tables become standard tables and
/// non-empty lists made only of tables become arrays of tables.
pub(crate) fn value_to_item(value: &Value) -> Item {
    match value {
        Value::Table(raw) => Item::Table(table_from_raw(raw)),
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_table) => {
            let mut array = ArrayOfTables::new();
            for item in items {
                if let Value::Table(raw) = item {
                    array.push(table_from_raw(raw));
                }
            }
            Item::ArrayOfTables(array)
        }
        other => Item::Value(value_to_edit(other)),
    }
}

pub(crate) fn value_to_edit(value: &Value) -> toml_edit::Value {
    match value {
        Value::String(s) => toml_edit::Value::from(s.as_str()),
        Value::Integer(i) => toml_edit::Value::from(*i),
        Value::Float(f) => toml_edit::Value::from(*f),
        Value::Boolean(b) => toml_edit::Value::from(*b),
        Value::Datetime(d) => toml_edit::Value::from(d.clone()),
        Value::Array(items) => toml_edit::Value::Array(items.iter().map(value_to_edit).collect()),
        Value::Table(raw) => toml_edit::Value::InlineTable(
            raw.iter()
                .map(|(key, value)| (key.as_str(), value_to_edit(value)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_flat_and_nested() {
        let doc = Document::parse("port = 8080\n[database]\npool-size = 5\n").unwrap();
        assert_eq!(doc.get("port"), Some(Value::Integer(8080)));
        assert_eq!(doc.get("database.pool-size"), Some(Value::Integer(5)));
        assert!(doc.contains("database"));
        assert!(doc.is_section("database"));
        assert!(!doc.is_section("port"));
        assert!(!doc.contains("database.url"));
    }

    #[test]
    fn inline_tables_read_as_sections() {
        let doc = Document::parse("server = { host = \"x\", port = 1 }\n").unwrap();
        assert!(doc.is_section("server"));
        assert_eq!(doc.get("server.port"), Some(Value::Integer(1)));
    }

    #[test]
    fn array_of_tables_reads_as_list_of_tables() {
        let doc = Document::parse("[[item]]\nname = \"a\"\n[[item]]\nname = \"b\"\n").unwrap();
        let items = doc.sequence("item").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["name"].as_str(), Some("b"));
    }

    #[test]
    fn set_creates_intermediate_tables() {
        let mut doc = Document::new();
        doc.set("a.b.c", &Value::Integer(1));
        assert_eq!(doc.get("a.b.c"), Some(Value::Integer(1)));
        let text = doc.to_string();
        assert!(text.contains("c = 1"), "{text}");
    }

    #[test]
    fn set_preserves_surrounding_comments() {
        let mut doc =
            Document::parse("# keep me\nport = 8080 # trailing\nhost = \"x\"\n").unwrap();
        doc.set("port", &Value::Integer(3000));
        let text = doc.to_string();
        assert!(text.contains("# keep me"), "{text}");
        assert!(text.contains("port = 3000"), "{text}");
        assert!(text.contains("# trailing"), "{text}");
        assert!(text.contains("host = \"x\""), "{text}");
    }

    #[test]
    fn create_section_keeps_existing_entries() {
        let mut doc = Document::parse("[db]\nurl = \"pg://\"\n").unwrap();
        let section = doc.create_section("db");
        section["pool"] = toml_edit::value(3);
        assert_eq!(doc.get("db.url"), Some(Value::String("pg://".into())));
        assert_eq!(doc.get("db.pool"), Some(Value::Integer(3)));
    }

    #[test]
    fn create_section_promotes_inline_table() {
        let mut doc = Document::parse("db = { url = \"pg://\" }\n").unwrap();
        doc.create_section("db");
        let text = doc.to_string();
        assert!(text.contains("[db]"), "{text}");
        assert_eq!(doc.get("db.url"), Some(Value::String("pg://".into())));
    }

    #[test]
    fn promoted_tables_have_clean_headers() {
        let mut doc = Document::parse("server = { host = \"a\" }\nlimits = 3\n").unwrap();
        doc.set("server.port", &Value::Integer(80));
        doc.create_section("limits");
        let text = doc.to_string();
        assert!(text.contains("[server]\n"), "{text}");
        assert!(text.contains("[limits]\n"), "{text}");
        assert!(!text.contains(" ]"), "{text}");
        assert_eq!(doc.get("server.host"), Some(Value::String("a".into())));
        assert_eq!(doc.get("server.port"), Some(Value::Integer(80)));
    }

    #[test]
    fn empty_section_is_rendered() {
        let mut doc = Document::new();
        doc.create_section("empty");
        assert!(doc.to_string().contains("[empty]"));
    }

    #[test]
    fn comments_above_keys_and_sections() {
        let mut doc = Document::new();
        doc.set("port", &Value::Integer(1));
        doc.create_section("db");
        doc.set_comments("port", &["The port.".to_string()]);
        doc.set_comments("db", &["Database settings.".to_string()]);
        let text = doc.to_string();
        assert!(text.contains("# The port.\nport = 1"), "{text}");
        assert!(text.contains("# Database settings.\n[db]"), "{text}");
    }

    #[test]
    fn comments_are_replaced_not_duplicated() {
        let mut doc = Document::new();
        doc.set("port", &Value::Integer(1));
        doc.set_comments("port", &["One".to_string()]);
        doc.set_comments("port", &["One".to_string()]);
        assert_eq!(doc.to_string().matches("# One").count(), 1);
    }

    #[test]
    fn header_round_trips() {
        let mut doc = Document::new();
        doc.set_header(["My plugin", "", "Edit with care"]);
        doc.set("a", &Value::Integer(1));
        let text = doc.to_string();
        assert!(text.starts_with("# My plugin\n#\n# Edit with care\n\na = 1"), "{text}");

        let reparsed = Document::parse(&text).unwrap();
        assert_eq!(reparsed.header(), &["My plugin", "", "Edit with care"]);
        assert_eq!(reparsed.to_string(), text);
    }

    #[test]
    fn comment_without_blank_line_stays_in_body() {
        let doc = Document::parse("# about a\na = 1\n").unwrap();
        assert!(doc.header().is_empty());
        assert!(doc.to_string().contains("# about a\na = 1"));
    }

    #[test]
    fn malformed_document_fails() {
        assert!(Document::parse("a = = 1").is_err());
        assert!(Document::parse("[a\nb = 1").is_err());
    }

    #[test]
    fn lists_of_tables_are_written_as_arrays_of_tables() {
        let mut doc = Document::new();
        let mut row = toml::Table::new();
        row.insert("name".into(), Value::String("a".into()));
        doc.set("item", &Value::Array(vec![Value::Table(row)]));
        assert!(doc.to_string().contains("[[item]]"));
    }

    #[test]
    fn empty_list_is_an_empty_array() {
        let mut doc = Document::new();
        doc.set("tags", &Value::Array(vec![]));
        assert!(doc.to_string().contains("tags = []"));
        assert_eq!(doc.sequence("tags"), Some(vec![]));
    }
}
