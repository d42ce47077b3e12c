//! Internal representation of query clauses.

use crate::value::Value;

/// A WHERE clause represented as a closure that generates SQL and binds parameters.
pub(crate) struct WhereClause {
    pub sql_fn: Box<dyn Fn(&mut Vec<Value>) -> String>,
}

impl WhereClause {
    pub fn new<E: crate::traits::Expression + 'static>(expr: E) -> Self {
        Self {
            sql_fn: Box::new(move |params| expr.to_sql(params)),
        }
    }
}

/// An ORDER BY clause.
pub(crate) struct OrderClause {
    pub column: &'static str,
    pub desc: bool,
}

/// Renders ` WHERE a AND b` or nothing.
pub(crate) fn render_wheres(sql: &mut String, wheres: &[WhereClause], params: &mut Vec<Value>) {
    if wheres.is_empty() {
        return;
    }
    let conditions = wheres
        .iter()
        .map(|w| (w.sql_fn)(params))
        .collect::<Vec<_>>();
    sql.push_str(" WHERE ");
    sql.push_str(&conditions.join(" AND "));
}
