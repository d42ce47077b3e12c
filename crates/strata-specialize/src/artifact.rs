//! Compiled artifacts.
//!
//! A compiled variant is stored as a [`CompiledPlan`]: the frozen query text
//! plus, for every binding and metadata entry, the slot its value is taken
//! from. Loading a plan yields a [`CompiledArtifact`], which serves calls by
//! filling the slots from the call's arguments and running the frozen text
//! directly through the session. No query builder runs on this path and no
//! generated code is ever executed.

use serde::{Deserialize, Serialize};
use strata_db::{BindingKey, CompiledQuery, DbError, Hydrate, QueryKind, Repository, Value};
use strata_utils::hash::checksum_bytes;

use crate::{
    error::{StoreError, StoreResult},
    shape::Slot,
};

/// Current plan format. Plans written with another version are not loaded.
pub const PLAN_FORMAT: u32 = 1;

/// Serialized form of a compiled variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledPlan {
    pub format: u32,
    pub key: String,
    pub owner: String,
    pub procedure: String,
    pub arity: usize,
    pub sql: String,
    pub bindings: Vec<(BindingKey, Slot)>,
    pub metadata: Vec<(BindingKey, Slot)>,
    pub extension: serde_json::Value,
}

impl CompiledPlan {
    pub fn to_source(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_source(source: &str) -> StoreResult<Self> {
        let plan: Self = serde_json::from_str(source)?;
        if plan.format != PLAN_FORMAT {
            return Err(StoreError::UnsupportedFormat(plan.format));
        }
        Ok(plan)
    }
}

/// Content-addressed file name for an artifact source.
pub fn artifact_path(source: &str) -> String {
    let digest = checksum_bytes(source.as_bytes());
    format!("{}.json", &digest[..16])
}

/// A loaded, executable compiled variant.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    plan: CompiledPlan,
}

impl CompiledArtifact {
    pub fn load(source: &str) -> StoreResult<Self> {
        Ok(Self {
            plan: CompiledPlan::from_source(source)?,
        })
    }

    pub fn plan(&self) -> &CompiledPlan {
        &self.plan
    }

    pub fn arity(&self) -> usize {
        self.plan.arity
    }

    /// Rebuilds the frozen query for `args`, or `None` when the argument
    /// count differs from the one the plan was compiled for.
    pub fn bind(&self, args: &[Value]) -> Option<CompiledQuery> {
        if args.len() != self.plan.arity {
            return None;
        }

        let fill = |slots: &[(BindingKey, Slot)]| {
            slots
                .iter()
                .map(|(key, slot)| Some((key.clone(), slot.resolve(args)?)))
                .collect::<Option<Vec<_>>>()
        };

        Some(
            CompiledQuery::new(self.plan.sql.clone(), QueryKind::Select)
                .with_bindings(fill(&self.plan.bindings)?)
                .with_metadata(fill(&self.plan.metadata)?)
                .with_extension(Some(self.plan.extension.clone())),
        )
    }

    /// Runs the frozen query for `args` and hydrates its rows.
    ///
    /// Returns `None` when the artifact cannot serve this argument list.
    pub fn invoke<R: Repository, T: Hydrate>(
        &self,
        repo: &R,
        args: &[Value],
    ) -> Option<Result<T, DbError>> {
        let query = self.bind(args)?;
        Some(
            repo.session()
                .query(&query)
                .and_then(T::hydrate),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strata_db::{Row, Session, META_FETCH};

    use super::*;

    struct Repo(Session);

    impl Repository for Repo {
        fn session(&self) -> &Session {
            &self.0
        }
    }

    fn plan() -> CompiledPlan {
        CompiledPlan {
            format: PLAN_FORMAT,
            key: "Repo::find".into(),
            owner: "Repo".into(),
            procedure: "find".into(),
            arity: 1,
            sql: "SELECT * FROM t WHERE id = ? AND kind = ?".into(),
            bindings: vec![
                (BindingKey::Index(0), Slot::Argument(0)),
                (BindingKey::Index(1), Slot::Constant(Value::from("a"))),
            ],
            metadata: vec![(BindingKey::from(META_FETCH), Slot::Constant(Value::from("all")))],
            extension: json!({"entity": "Row", "table": "t"}),
        }
    }

    #[test]
    fn test_bind_fills_slots() {
        let artifact = CompiledArtifact::load(&plan().to_source().unwrap()).unwrap();
        let query = artifact.bind(&[Value::Integer(42)]).unwrap();

        assert_eq!(
            query.bindings(),
            &[
                (BindingKey::Index(0), Value::Integer(42)),
                (BindingKey::Index(1), Value::from("a")),
            ]
        );
        assert_eq!(query.metadata_value(META_FETCH), Some(&Value::from("all")));
        assert_eq!(query.extension_state(), Some(&json!({"entity": "Row", "table": "t"})));
        assert!(artifact.bind(&[]).is_none());
    }

    #[test]
    fn test_invoke_runs_frozen_query() {
        let session = Session::open_in_memory().unwrap();
        session
            .execute_batch(
                "CREATE TABLE t (id INTEGER, kind TEXT);
                 INSERT INTO t VALUES (42, 'a'), (42, 'b'), (7, 'a');",
            )
            .unwrap();
        let repo = Repo(session);

        let artifact = CompiledArtifact { plan: plan() };
        let rows: Vec<Row> = artifact.invoke(&repo, &[Value::Integer(42)]).unwrap().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String>("kind").unwrap(), "a");
    }

    #[test]
    fn test_rejects_other_formats() {
        let mut plan = plan();
        plan.format = 99;
        let source = serde_json::to_string(&plan).unwrap();
        assert!(matches!(
            CompiledArtifact::load(&source),
            Err(StoreError::UnsupportedFormat(99))
        ));
    }

    #[test]
    fn test_artifact_path_is_content_addressed() {
        let a = artifact_path("one");
        assert_eq!(a, artifact_path("one"));
        assert_ne!(a, artifact_path("two"));
        assert_eq!(a.len(), 16 + ".json".len());
    }
}
