//! Query execution.
//!
//! A [`Session`] is the only path from a [`CompiledQuery`] to SQLite. Each
//! execution is first reported to the session's probe, so a caller can run
//! arbitrary data-access code under [`Session::observe`] and learn exactly
//! which queries it issued and which rows they returned.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use rusqlite::Connection;
use tracing::trace;

use crate::{
    compiled::{BindingKey, CompiledQuery, QueryKind, META_MAX_ROWS},
    error::{DbError, Result},
    row::Row,
    value::Value,
};

/// Outcome of a write query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub changes: usize,
    pub last_insert_rowid: i64,
}

/// A query issued under [`Session::observe`].
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub query: CompiledQuery,
    /// Rows the query returned; `None` for writes and failed reads.
    pub rows: Option<Vec<Row>>,
}

/// Stack of capture frames; executions are recorded into the innermost one.
#[derive(Default)]
struct Probe {
    frames: Mutex<Vec<Vec<Executed>>>,
}

impl Probe {
    fn report(&self, query: &CompiledQuery) -> Result<()> {
        let mut frames = self.frames.lock()?;
        if let Some(frame) = frames.last_mut() {
            frame.push(Executed {
                query: query.clone(),
                rows: None,
            });
        }
        Ok(())
    }

    /// Attaches `rows` to the execution reported last.
    fn returned(&self, rows: &[Row]) -> Result<()> {
        let mut frames = self.frames.lock()?;
        if let Some(executed) = frames.last_mut().and_then(|frame| frame.last_mut()) {
            executed.rows = Some(rows.to_vec());
        }
        Ok(())
    }
}

/// Pops the frame it pushed, also when the observed closure unwinds.
struct Frame<'a> {
    probe: &'a Probe,
    armed: bool,
}

impl<'a> Frame<'a> {
    fn push(probe: &'a Probe) -> Result<Self> {
        probe.frames.lock()?.push(Vec::new());
        Ok(Self { probe, armed: true })
    }

    fn take(mut self) -> Result<Vec<Executed>> {
        self.armed = false;
        Ok(self.probe.frames.lock()?.pop().unwrap_or_default())
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Ok(mut frames) = self.probe.frames.lock() {
                frames.pop();
            }
        }
    }
}

/// Shared handle over a SQLite connection.
#[derive(Clone)]
pub struct Session {
    conn: Arc<Mutex<Connection>>,
    probe: Arc<Probe>,
}

impl Session {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let _: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        Ok(Self::new(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock()?)
    }

    /// Runs `f` with the probe armed and returns its result together with
    /// every query executed through this session meanwhile.
    ///
    /// Observations nest; an inner `observe` does not leak into the outer one.
    pub fn observe<T>(&self, f: impl FnOnce() -> T) -> Result<(T, Vec<Executed>)> {
        let frame = Frame::push(&self.probe)?;
        let result = f();
        Ok((result, frame.take()?))
    }

    #[cfg(test)]
    fn observation_depth(&self) -> usize {
        self.probe.frames.lock().map_or(0, |frames| frames.len())
    }

    /// Executes raw SQL, possibly several statements, without bindings.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.probe.report(&CompiledQuery::opaque(QueryKind::Batch))?;
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    /// Executes a row-returning query and materializes its rows.
    ///
    /// A `max_rows` metadata entry caps how many rows are read.
    pub fn query(&self, query: &CompiledQuery) -> Result<Vec<Row>> {
        self.probe.report(query)?;
        let sql = query.to_sql().ok_or(DbError::MissingSql)?;
        trace!(sql, bindings = query.bindings().len(), "query");

        let max_rows = match query.metadata_value(META_MAX_ROWS) {
            Some(Value::Integer(n)) => usize::try_from(*n).ok(),
            _ => None,
        };

        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        bind_all(&mut stmt, query.bindings())?;

        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.raw_query();
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            if max_rows.is_some_and(|max| result.len() >= max) {
                break;
            }
            result.push(Row::from_sqlite(row, &names)?);
        }
        self.probe.returned(&result)?;
        Ok(result)
    }

    /// Executes a write query.
    pub fn execute(&self, query: &CompiledQuery) -> Result<Execution> {
        self.probe.report(query)?;
        let sql = query.to_sql().ok_or(DbError::MissingSql)?;
        trace!(sql, bindings = query.bindings().len(), "execute");

        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        bind_all(&mut stmt, query.bindings())?;
        let changes = stmt.raw_execute()?;

        Ok(Execution {
            changes,
            last_insert_rowid: conn.last_insert_rowid(),
        })
    }
}

fn bind_all(stmt: &mut rusqlite::Statement<'_>, bindings: &[(BindingKey, Value)]) -> Result<()> {
    for (key, value) in bindings {
        let idx = match key {
            BindingKey::Index(idx) => idx + 1,
            BindingKey::Name(name) => {
                let prefixed = if name.starts_with([':', '@', '$']) {
                    name.clone()
                } else {
                    format!(":{name}")
                };
                stmt.parameter_index(&prefixed)?
                    .ok_or_else(|| DbError::UnknownParameter(name.clone()))?
            }
        };
        stmt.raw_bind_parameter(idx, value)?;
    }
    Ok(())
}
