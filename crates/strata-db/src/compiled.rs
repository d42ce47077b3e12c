//! The executed-query object.
//!
//! Every builder lowers itself into a [`CompiledQuery`] before it reaches the
//! [`crate::Session`]. It exposes exactly what a caller observing the
//! execution needs: the SQL text, its bindings, auxiliary execution metadata,
//! the extension state describing how rows are hydrated, and the query kind.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Key of a binding or metadata entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingKey {
    /// Zero-based position of a `?` placeholder.
    Index(usize),
    /// A named parameter (`:name`) or metadata entry.
    Name(String),
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKey::Index(idx) => write!(f, "#{idx}"),
            BindingKey::Name(name) => write!(f, ":{name}"),
        }
    }
}

impl From<usize> for BindingKey {
    fn from(value: usize) -> Self {
        BindingKey::Index(value)
    }
}

impl From<&str> for BindingKey {
    fn from(value: &str) -> Self {
        BindingKey::Name(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
    Select,
    Insert,
    Update,
    Delete,
    /// Raw multi-statement SQL executed without bindings.
    Batch,
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryKind::Select => "select",
            QueryKind::Insert => "insert",
            QueryKind::Update => "update",
            QueryKind::Delete => "delete",
            QueryKind::Batch => "batch",
        };
        f.write_str(name)
    }
}

/// How a select's rows are turned into a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    All,
    One,
    Count,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::All => "all",
            FetchMode::One => "one",
            FetchMode::Count => "count",
        }
    }
}

/// Metadata key for the fetch mode of a select.
pub const META_FETCH: &str = "fetch";
/// Metadata key capping the number of rows read from a select.
pub const META_MAX_ROWS: &str = "max_rows";

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    sql: Option<String>,
    bindings: Vec<(BindingKey, Value)>,
    metadata: Vec<(BindingKey, Value)>,
    extension: Option<serde_json::Value>,
    kind: QueryKind,
}

impl CompiledQuery {
    pub fn new(sql: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            sql: Some(sql.into()),
            bindings: Vec::new(),
            metadata: Vec::new(),
            extension: None,
            kind,
        }
    }

    /// A query whose text and bindings are not observable.
    pub fn opaque(kind: QueryKind) -> Self {
        Self {
            sql: None,
            bindings: Vec::new(),
            metadata: Vec::new(),
            extension: None,
            kind,
        }
    }

    /// Binds positional parameters `0..n` in order.
    pub fn with_positional(mut self, params: Vec<Value>) -> Self {
        self.bindings = params
            .into_iter()
            .enumerate()
            .map(|(idx, value)| (BindingKey::Index(idx), value))
            .collect();
        self
    }

    pub fn with_bindings(mut self, bindings: Vec<(BindingKey, Value)>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_metadata(mut self, metadata: Vec<(BindingKey, Value)>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_extension(mut self, extension: Option<serde_json::Value>) -> Self {
        self.extension = extension;
        self
    }

    pub fn to_sql(&self) -> Option<&str> {
        self.sql.as_deref()
    }

    pub fn bindings(&self) -> &[(BindingKey, Value)] {
        &self.bindings
    }

    pub fn metadata(&self) -> &[(BindingKey, Value)] {
        &self.metadata
    }

    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata
            .iter()
            .find(|(k, _)| matches!(k, BindingKey::Name(name) if name == key))
            .map(|(_, value)| value)
    }

    pub fn extension_state(&self) -> Option<&serde_json::Value> {
        self.extension.as_ref()
    }

    pub fn kind(&self) -> QueryKind {
        self.kind
    }
}
