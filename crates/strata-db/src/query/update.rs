use crate::{
    compiled::{CompiledQuery, QueryKind},
    error::Result,
    expr::Col,
    query::clause::{render_wheres, WhereClause},
    session::Session,
    traits::Expression,
    value::Value,
};

pub struct UpdateQuery {
    session: Session,
    table: &'static str,
    updates: Vec<(&'static str, Value)>,
    wheres: Vec<WhereClause>,
}

impl UpdateQuery {
    pub fn table(session: Session, table: &'static str) -> Self {
        Self {
            session,
            table,
            updates: vec![],
            wheres: vec![],
        }
    }

    pub fn set<T, V: Into<Value>>(mut self, col: Col<T>, value: V) -> Self {
        self.updates.push((col.name, value.into()));
        self
    }

    pub fn filter<Expr: Expression + 'static>(mut self, expr: Expr) -> Self {
        self.wheres.push(WhereClause::new(expr));
        self
    }

    /// Runs the update and returns the number of changed rows.
    pub fn execute(self) -> Result<usize> {
        let compiled = self.compile();
        Ok(self.session.execute(&compiled)?.changes)
    }

    pub fn compile(&self) -> CompiledQuery {
        let mut params = Vec::new();

        let sets: Vec<String> = self
            .updates
            .iter()
            .map(|(col, val)| {
                params.push(val.clone());
                format!("{col} = ?")
            })
            .collect();

        let mut sql = format!("UPDATE {} SET {}", self.table, sets.join(", "));
        render_wheres(&mut sql, &self.wheres, &mut params);

        CompiledQuery::new(sql, QueryKind::Update).with_positional(params)
    }
}
