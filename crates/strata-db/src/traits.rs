//! Core traits that power the query builder.
//!
//! These traits define the contract for:
//! - Building SQL expressions (`Expression`)
//! - Converting rows into entities (`FromRow`)
//! - Turning a select's rows into a procedure result (`Hydrate`)
//! - Handing a repository's session to generic code (`Repository`)

use crate::{
    error::{DbError, Result},
    expr::ops::{BinaryOp, InOp, LikeOp, LogicalOp, NullOp},
    row::Row,
    session::Session,
    value::Value,
};

/// A trait for types that can be converted into SQL expressions.
///
/// When `to_sql` is called, it appends bound parameters to `params` and
/// returns the SQL fragment with `?` placeholders.
///
/// # Example
///
/// ```rust
/// use strata_db::expr::Col;
/// use strata_db::traits::Expression as _;
///
/// let col = Col::<String>::new("name");
/// let expr = col.eq("User");
/// let mut params = vec![];
/// let sql = expr.to_sql(&mut params);
/// assert_eq!(sql, "name = ?");
/// assert_eq!(params.len(), 1);
/// ```
pub trait Expression: Sized {
    fn to_sql(&self, params: &mut Vec<Value>) -> String;

    /// Creates a SQL `=` condition.
    fn eq<T: Into<Value>>(self, value: T) -> BinaryOp<Self> {
        BinaryOp::new(self, "=", value.into())
    }

    /// Creates a SQL `!=` condition.
    fn ne<T: Into<Value>>(self, value: T) -> BinaryOp<Self> {
        BinaryOp::new(self, "!=", value.into())
    }

    /// Creates a SQL `>` condition.
    fn gt<T: Into<Value>>(self, value: T) -> BinaryOp<Self> {
        BinaryOp::new(self, ">", value.into())
    }

    /// Creates a SQL `<` condition.
    fn lt<T: Into<Value>>(self, value: T) -> BinaryOp<Self> {
        BinaryOp::new(self, "<", value.into())
    }

    /// Creates a SQL `>=` condition.
    fn gte<T: Into<Value>>(self, value: T) -> BinaryOp<Self> {
        BinaryOp::new(self, ">=", value.into())
    }

    /// Creates a SQL `<=` condition.
    fn lte<T: Into<Value>>(self, value: T) -> BinaryOp<Self> {
        BinaryOp::new(self, "<=", value.into())
    }

    /// Creates a SQL `LIKE` condition matching `%pattern%`.
    fn like(self, pattern: impl Into<String>) -> LikeOp<Self> {
        LikeOp::new(self, pattern.into(), false)
    }

    /// Creates a case-insensitive `LIKE` condition.
    fn ilike(self, pattern: impl Into<String>) -> LikeOp<Self> {
        LikeOp::new(self, pattern.into(), true)
    }

    /// Creates a SQL `IN` condition.
    fn in_<T, I>(self, values: I) -> InOp<Self>
    where
        T: Into<Value>,
        I: IntoIterator<Item = T>,
    {
        InOp::new(self, values.into_iter().map(Into::into).collect(), false)
    }

    /// Creates a SQL `NOT IN` condition.
    fn not_in<T, I>(self, values: I) -> InOp<Self>
    where
        T: Into<Value>,
        I: IntoIterator<Item = T>,
    {
        InOp::new(self, values.into_iter().map(Into::into).collect(), true)
    }

    /// Creates a SQL `IS NULL` condition.
    fn null(self) -> NullOp<Self> {
        NullOp::new(self, true)
    }

    /// Creates a SQL `IS NOT NULL` condition.
    fn not_null(self) -> NullOp<Self> {
        NullOp::new(self, false)
    }

    /// Combines two expressions with `AND`.
    fn and<E: Expression>(self, other: E) -> LogicalOp<Self, E> {
        LogicalOp::new(self, other, "AND")
    }

    /// Combines two expressions with `OR`.
    fn or<E: Expression>(self, other: E) -> LogicalOp<Self, E> {
        LogicalOp::new(self, other, "OR")
    }
}

/// A trait for types that can be constructed from a result row.
///
/// # Example
///
/// ```rust
/// use strata_db::{FromRow, Row};
///
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> strata_db::Result<Self> {
///         Ok(User {
///             id: row.get("id")?,
///             name: row.get("name")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

/// Turns the rows of an executed select into a result value.
///
/// Given the same rows, hydration must always produce the same value.
pub trait Hydrate: Sized {
    fn hydrate(rows: Vec<Row>) -> Result<Self>;
}

impl<E: FromRow> Hydrate for Vec<E> {
    fn hydrate(rows: Vec<Row>) -> Result<Self> {
        rows.iter().map(E::from_row).collect()
    }
}

impl<E: FromRow> Hydrate for Option<E> {
    fn hydrate(rows: Vec<Row>) -> Result<Self> {
        rows.first().map(E::from_row).transpose()
    }
}

impl Hydrate for u64 {
    fn hydrate(rows: Vec<Row>) -> Result<Self> {
        match rows.first() {
            Some(row) => row.get_index(0),
            None => {
                Err(DbError::MissingColumn {
                    column: "#0".into(),
                })
            }
        }
    }
}

/// A data-access object whose procedures run against one session.
pub trait Repository {
    fn session(&self) -> &Session;
}
