//! Query shapes and argument-mapping inference.

use std::collections::{btree_map, BTreeMap};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strata_db::{BindingKey, CompiledQuery, QueryKind, Value};

/// Where a binding's value comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// The call argument at this index.
    Argument(usize),
    /// A value that does not depend on the arguments.
    Constant(Value),
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Slot::Argument(a), Slot::Argument(b)) => a == b,
            (Slot::Constant(a), Slot::Constant(b)) => a.identical(b),
            _ => false,
        }
    }
}

impl Slot {
    pub fn resolve(&self, args: &[Value]) -> Option<Value> {
        match self {
            Slot::Argument(idx) => args.get(*idx).cloned(),
            Slot::Constant(value) => Some(value.clone()),
        }
    }
}

/// Binding key to slot assignment of one query.
///
/// Serialized as a list of `[key, slot]` pairs since binding keys are not
/// strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentMapping(BTreeMap<BindingKey, Slot>);

impl ArgumentMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: BindingKey, slot: Slot) {
        self.0.insert(key, slot);
    }

    pub fn get(&self, key: &BindingKey) -> Option<&Slot> {
        self.0.get(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, BindingKey, Slot> {
        self.0.iter()
    }

    pub fn keys(&self) -> btree_map::Keys<'_, BindingKey, Slot> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(BindingKey, Slot)> for ArgumentMapping {
    fn from_iter<I: IntoIterator<Item = (BindingKey, Slot)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ArgumentMapping {
    type Item = (&'a BindingKey, &'a Slot);
    type IntoIter = btree_map::Iter<'a, BindingKey, Slot>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Serialize for ArgumentMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

impl<'de> Deserialize<'de> for ArgumentMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<(BindingKey, Slot)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

/// Outcome of mapping one binding list onto the call arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Inference {
    Mapped(ArgumentMapping),
    /// The value bound to this key equals more than one argument.
    Ambiguous(BindingKey),
}

/// Maps every binding to the single argument holding an identical value, or
/// to a constant when no argument does. Reals match by bit pattern.
pub fn infer_mapping(bindings: &[(BindingKey, Value)], args: &[Value]) -> Inference {
    let mut mapping = ArgumentMapping::new();

    for (key, value) in bindings {
        let mut matches = args
            .iter()
            .enumerate()
            .filter(|(_, arg)| arg.identical(value))
            .map(|(idx, _)| idx);

        let slot = match (matches.next(), matches.next()) {
            (None, _) => Slot::Constant(value.clone()),
            (Some(idx), None) => Slot::Argument(idx),
            (Some(_), Some(_)) => return Inference::Ambiguous(key.clone()),
        };
        mapping.insert(key.clone(), slot);
    }

    Inference::Mapped(mapping)
}

/// What one execution of a procedure looked like.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub query_text: String,
    pub bindings: Vec<(BindingKey, Value)>,
    pub metadata: Vec<(BindingKey, Value)>,
    pub extension: serde_json::Value,
}

impl Shape {
    /// Extracts the shape of an executed query.
    ///
    /// Only select queries exposing their text and carrying extension state
    /// have a shape; the error names what is missing.
    pub fn capture(query: &CompiledQuery) -> Result<Self, String> {
        if query.kind() != QueryKind::Select {
            return Err(format!("{} queries are not specialized", query.kind()));
        }
        let query_text = query
            .to_sql()
            .ok_or_else(|| "query exposes no compiled text".to_string())?;
        let extension = query
            .extension_state()
            .ok_or_else(|| "select query carries no extension state".to_string())?;

        Ok(Self {
            query_text: query_text.to_string(),
            bindings: query.bindings().to_vec(),
            metadata: query.metadata().to_vec(),
            extension: extension.clone(),
        })
    }
}
