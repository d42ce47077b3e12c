//! The SELECT builder.

use std::{any::type_name, marker::PhantomData};

use serde_json::json;

use crate::{
    compiled::{BindingKey, CompiledQuery, FetchMode, QueryKind, META_FETCH, META_MAX_ROWS},
    error::Result,
    expr::column::Col,
    query::clause::{render_wheres, OrderClause, WhereClause},
    session::Session,
    traits::{Expression, FromRow, Hydrate},
    value::Value,
};

/// A SQL SELECT builder hydrating rows into `E`.
///
/// Constructed via [`SelectQuery::from`], then chained with `.filter()`,
/// `.order_by()`, etc.
///
/// # Example
///
/// ```rust
/// use strata_db::{define_entity, FromRow, Row, SelectQuery, Session};
/// use strata_db::traits::Expression as _;
///
/// #[derive(Debug)]
/// struct User {
///     id: i64,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &Row) -> strata_db::Result<Self> {
///         Ok(User { id: row.get("id")? })
///     }
/// }
///
/// define_entity!(
///     users {
///         table: "users",
///         columns: {
///             ID: i64 => "id"
///         }
///     }
/// );
///
/// let session = Session::open_in_memory().unwrap();
/// session
///     .execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY)")
///     .unwrap();
///
/// let users = SelectQuery::<User>::from(session, users::TABLE)
///     .filter(users::ID.gt(0))
///     .order_by(users::ID, false)
///     .limit(10)
///     .fetch()
///     .unwrap();
/// assert!(users.is_empty());
/// ```
pub struct SelectQuery<E> {
    session: Session,
    table: &'static str,
    columns: Vec<&'static str>,
    joins: Vec<String>,
    wheres: Vec<WhereClause>,
    orders: Vec<OrderClause>,
    limit: Option<u32>,
    offset: Option<u32>,
    max_rows: Option<Value>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> SelectQuery<E> {
    /// Starts a new query on the given table.
    pub fn from(session: Session, table: &'static str) -> Self {
        Self {
            session,
            table,
            columns: vec![],
            joins: vec![],
            wheres: vec![],
            orders: vec![],
            limit: None,
            offset: None,
            max_rows: None,
            _entity: PhantomData,
        }
    }

    /// Select specific columns from the table.
    pub fn select<T>(mut self, cols: &[Col<T>]) -> Self {
        self.columns.extend(cols.iter().map(|c| c.name));
        self
    }

    /// Select all columns from the table.
    pub fn select_all(mut self) -> Self {
        self.columns.clear();
        self
    }

    /// Adds a JOIN clause.
    pub fn join(mut self, join: impl Into<String>) -> Self {
        self.joins.push(join.into());
        self
    }

    /// Applies the WHERE condition.
    pub fn filter<Expr: Expression + 'static>(mut self, expr: Expr) -> Self {
        self.wheres.push(WhereClause::new(expr));
        self
    }

    /// Adds an ORDER BY clause.
    pub fn order_by<T>(mut self, col: Col<T>, desc: bool) -> Self {
        self.orders.push(OrderClause {
            column: col.name,
            desc,
        });
        self
    }

    /// Limit the number of results.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set query offset.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set pagination params. Pages start at 1.
    pub fn page(mut self, page: u32, per_page: u32) -> Self {
        self.limit = Some(per_page);
        self.offset = Some(page.saturating_sub(1) * per_page);
        self
    }

    /// Caps how many rows are read while executing, without changing the SQL.
    pub fn max_rows(mut self, max_rows: impl Into<Value>) -> Self {
        self.max_rows = Some(max_rows.into());
        self
    }

    /// Lowers the builder into the query `fetch`/`fetch_one`/`count` would run.
    pub fn compile(&self, mode: FetchMode) -> CompiledQuery {
        let mut params = vec![];

        let mut sql = match mode {
            FetchMode::Count => format!("SELECT COUNT(*) FROM {}", self.table),
            FetchMode::All | FetchMode::One => {
                let select = if self.columns.is_empty() {
                    "*".to_string()
                } else {
                    self.columns.join(", ")
                };
                format!("SELECT {} FROM {}", select, self.table)
            }
        };

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        render_wheres(&mut sql, &self.wheres, &mut params);

        if mode != FetchMode::Count {
            if !self.orders.is_empty() {
                let orders = self
                    .orders
                    .iter()
                    .map(|o| format!("{} {}", o.column, if o.desc { "DESC" } else { "ASC" }))
                    .collect::<Vec<_>>();
                sql.push_str(" ORDER BY ");
                sql.push_str(&orders.join(", "));
            }

            let limit = if mode == FetchMode::One {
                Some(1)
            } else {
                self.limit
            };
            if let Some(limit) = limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            if let Some(offset) = self.offset {
                if limit.is_none() {
                    sql.push_str(" LIMIT -1");
                }
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        let mut metadata = vec![(
            BindingKey::from(META_FETCH),
            Value::from(mode.as_str()),
        )];
        if let Some(max_rows) = &self.max_rows {
            metadata.push((BindingKey::from(META_MAX_ROWS), max_rows.clone()));
        }

        CompiledQuery::new(sql, QueryKind::Select)
            .with_positional(params)
            .with_metadata(metadata)
            .with_extension(Some(json!({
                "entity": type_name::<E>(),
                "table": self.table,
            })))
    }

    fn run<T: Hydrate>(&self, mode: FetchMode) -> Result<T> {
        let compiled = self.compile(mode);
        T::hydrate(self.session.query(&compiled)?)
    }
}

impl<E: FromRow> SelectQuery<E> {
    pub fn fetch(self) -> Result<Vec<E>> {
        self.run(FetchMode::All)
    }

    pub fn fetch_one(self) -> Result<Option<E>> {
        self.run(FetchMode::One)
    }

    pub fn count(self) -> Result<u64> {
        self.run(FetchMode::Count)
    }
}
