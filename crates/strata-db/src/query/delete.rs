use crate::{
    compiled::{CompiledQuery, QueryKind},
    error::Result,
    query::clause::{render_wheres, WhereClause},
    session::Session,
    traits::Expression,
};

pub struct DeleteQuery {
    session: Session,
    table: &'static str,
    wheres: Vec<WhereClause>,
}

impl DeleteQuery {
    pub fn from(session: Session, table: &'static str) -> Self {
        Self {
            session,
            table,
            wheres: Vec::new(),
        }
    }

    pub fn filter<Expr: Expression + 'static>(mut self, expr: Expr) -> Self {
        self.wheres.push(WhereClause::new(expr));
        self
    }

    /// Runs the delete and returns the number of removed rows.
    pub fn execute(self) -> Result<usize> {
        let compiled = self.compile();
        Ok(self.session.execute(&compiled)?.changes)
    }

    pub fn compile(&self) -> CompiledQuery {
        let mut params = Vec::new();
        let mut sql = format!("DELETE FROM {}", self.table);
        render_wheres(&mut sql, &self.wheres, &mut params);
        CompiledQuery::new(sql, QueryKind::Delete).with_positional(params)
    }
}
