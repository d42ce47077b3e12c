use crate::{
    compiled::{CompiledQuery, QueryKind},
    error::Result,
    expr::Col,
    session::Session,
    value::Value,
};

pub struct InsertQuery {
    session: Session,
    table: &'static str,
    columns: Vec<&'static str>,
    values: Vec<Value>,
    on_conflict: Option<String>,
}

impl InsertQuery {
    pub fn into(session: Session, table: &'static str) -> Self {
        Self {
            session,
            table,
            columns: vec![],
            values: vec![],
            on_conflict: None,
        }
    }

    pub fn set<T, V: Into<Value>>(mut self, col: Col<T>, value: V) -> Self {
        self.columns.push(col.name);
        self.values.push(value.into());
        self
    }

    pub fn on_conflict_do_nothing(mut self) -> Self {
        self.on_conflict = Some("ON CONFLICT DO NOTHING".to_string());
        self
    }

    pub fn on_conflict_update(mut self, conflict_cols: &[&str], update_cols: &[&str]) -> Self {
        let updates: Vec<String> = update_cols
            .iter()
            .map(|col| format!("{col} = excluded.{col}"))
            .collect();
        self.on_conflict = Some(format!(
            "ON CONFLICT({}) DO UPDATE SET {}",
            conflict_cols.join(", "),
            updates.join(", ")
        ));
        self
    }

    /// Runs the insert and returns the new row id.
    pub fn execute(self) -> Result<i64> {
        let compiled = self.compile();
        Ok(self.session.execute(&compiled)?.last_insert_rowid)
    }

    pub fn compile(&self) -> CompiledQuery {
        let placeholders = vec!["?"; self.values.len()].join(", ");

        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            self.columns.join(", "),
            placeholders
        );

        if let Some(conflict) = &self.on_conflict {
            sql.push(' ');
            sql.push_str(conflict);
        }

        CompiledQuery::new(sql, QueryKind::Insert).with_positional(self.values.clone())
    }
}
