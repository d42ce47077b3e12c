//! Owned result rows.

use serde::{Deserialize, Serialize};

use crate::{
    error::{DbError, Result},
    value::{FromValue, Value},
};

/// A fully materialized result row, columns in statement order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Value)>) -> Self {
        Self { columns }
    }

    pub(crate) fn from_sqlite(row: &rusqlite::Row<'_>, names: &[String]) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            columns.push((name.clone(), Value::from(row.get_ref(idx)?)));
        }
        Ok(Self { columns })
    }

    /// Reads `column` as `T`.
    pub fn get<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self.value(column).ok_or_else(|| {
            DbError::MissingColumn {
                column: column.to_string(),
            }
        })?;
        T::extract(column, value)
    }

    /// Reads the column at `idx` as `T`.
    pub fn get_index<T: FromValue>(&self, idx: usize) -> Result<T> {
        let (name, value) = self.columns.get(idx).ok_or_else(|| {
            DbError::MissingColumn {
                column: format!("#{idx}"),
            }
        })?;
        T::extract(name, value)
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }
}
