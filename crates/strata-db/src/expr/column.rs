//! Represents a typed database column.
//!
//! `Col<T>` ties a column name to a Rust type `T`. It implements
//! [`Expression`], so it can be used directly in filters.

use std::marker::PhantomData;

use crate::{traits::Expression, value::Value};

/// A typed reference to a database column.
///
/// `T` documents the Rust type read from this column; it is not enforced at
/// runtime, so keep `FromRow` implementations in sync with it.
#[derive(Debug)]
pub struct Col<T> {
    pub name: &'static str,
    _type: PhantomData<fn() -> T>,
}

impl<T> Clone for Col<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Col<T> {}

impl<T> Col<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _type: PhantomData,
        }
    }
}

impl<T> Expression for Col<T> {
    fn to_sql(&self, _params: &mut Vec<Value>) -> String {
        self.name.to_string()
    }
}
