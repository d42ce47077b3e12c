//! The query hook: runs the real procedure with the session probe armed and
//! hands back what it executed.

use strata_db::{CompiledQuery, DbError, Executed, Hydrate, QueryKind, Repository, Value};
use tracing::debug;

use crate::{shape::Shape, specializer::ObservationPlan};

pub const REASON_NO_QUERY: &str = "no compiled query captured";
pub const REASON_MULTIPLE_QUERIES: &str = "multiple queries executed";
pub const REASON_RESULT_DIVERGED: &str = "result is not the hydrated query rows";

/// Queries captured during one hooked call.
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    Query(CompiledQuery),
    Nothing,
    Multiple(usize),
    /// The procedure ran one query but returned something other than its
    /// hydrated rows.
    Diverged(CompiledQuery),
    /// The call is not incorporated: the procedure failed or was called
    /// with an argument count its declaration does not allow.
    Skipped,
}

impl Capture {
    /// The shape to fold into the observation state, `None` for a skipped
    /// call, or the reason the call cannot be specialized.
    pub fn into_shape(self) -> Result<Option<Shape>, String> {
        match self {
            Capture::Skipped => Ok(None),
            Capture::Nothing => Err(REASON_NO_QUERY.to_string()),
            Capture::Multiple(n) => Err(format!("{REASON_MULTIPLE_QUERIES} ({n})")),
            Capture::Diverged(_) => Err(REASON_RESULT_DIVERGED.to_string()),
            Capture::Query(query) => Shape::capture(&query).map(Some),
        }
    }
}

/// An installed observation variant.
#[derive(Debug, Clone)]
pub struct QueryHook {
    plan: ObservationPlan,
}

impl QueryHook {
    pub fn new(plan: ObservationPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> &ObservationPlan {
        &self.plan
    }

    /// Runs `procedure` and returns its own result, untouched, along with
    /// the queries it executed.
    ///
    /// A single captured select only counts when the procedure's result
    /// equals that query's rows hydrated into `T`, which is all a compiled
    /// artifact can reproduce.
    pub fn run<R, T, E, F>(&self, repo: &R, args: &[Value], procedure: &F) -> (Result<T, E>, Capture)
    where
        R: Repository,
        T: Hydrate + PartialEq,
        E: From<DbError>,
        F: Fn(&R, &[Value]) -> Result<T, E>,
    {
        if args.len() != self.plan.arity {
            debug!(
                "{} declares {} parameters, called with {}",
                self.plan.identity,
                self.plan.arity,
                args.len()
            );
            return (procedure(repo, args), Capture::Skipped);
        }

        let (result, mut captured) = match repo.session().observe(|| procedure(repo, args)) {
            Ok(observed) => observed,
            Err(err) => return (Err(err.into()), Capture::Skipped),
        };

        if result.is_err() {
            return (result, Capture::Skipped);
        }

        let capture = match captured.len() {
            0 => Capture::Nothing,
            1 => {
                match (captured.pop(), result.as_ref().ok()) {
                    (Some(executed), Some(value)) if reproduces(&executed, value) => {
                        Capture::Query(executed.query)
                    }
                    (Some(executed), _) => {
                        debug!("{} did not return its query rows", self.plan.identity);
                        Capture::Diverged(executed.query)
                    }
                    (None, _) => Capture::Nothing,
                }
            }
            n => Capture::Multiple(n),
        };

        (result, capture)
    }
}

/// Whether hydrating the rows of `executed` gives back `value`.
///
/// Writes carry no rows; they are rejected later by their query kind.
fn reproduces<T: Hydrate + PartialEq>(executed: &Executed, value: &T) -> bool {
    match &executed.rows {
        Some(rows) => T::hydrate(rows.clone()).is_ok_and(|hydrated| hydrated == *value),
        None => executed.query.kind() != QueryKind::Select,
    }
}

#[cfg(test)]
mod tests {
    use strata_db::{Row, Session};

    use super::*;
    use crate::identity::ProcedureIdentity;

    struct Repo {
        session: Session,
    }

    impl Repository for Repo {
        fn session(&self) -> &Session {
            &self.session
        }
    }

    fn repo() -> Repo {
        let session = Session::open_in_memory().unwrap();
        session
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1), (2);")
            .unwrap();
        Repo { session }
    }

    fn hook(arity: usize) -> QueryHook {
        QueryHook::new(ObservationPlan {
            identity: ProcedureIdentity::new("Repo", "ids"),
            variant: "ids__observed".into(),
            arity,
            params: vec![],
            param_types: vec![],
        })
    }

    fn ids(repo: &Repo, _args: &[Value]) -> Result<Vec<Row>, DbError> {
        let query = CompiledQuery::new("SELECT id FROM t", QueryKind::Select);
        repo.session().query(&query)
    }

    #[test]
    fn test_run_returns_real_result_and_capture() {
        let repo = repo();
        let (result, capture) = hook(0).run(&repo, &[], &ids);

        assert_eq!(result.unwrap().len(), 2);
        let Capture::Query(query) = capture else {
            panic!("expected one query");
        };
        assert_eq!(query.to_sql(), Some("SELECT id FROM t"));
    }

    #[test]
    fn test_run_counts_queries() {
        let repo = repo();

        let none = |_: &Repo, _: &[Value]| Ok::<Vec<Row>, DbError>(vec![]);
        let (_, capture) = hook(0).run(&repo, &[], &none);
        assert_eq!(capture, Capture::Nothing);
        assert_eq!(capture.into_shape().unwrap_err(), REASON_NO_QUERY);

        let twice = |repo: &Repo, args: &[Value]| {
            let mut rows = ids(repo, args)?;
            rows.extend(ids(repo, args)?);
            Ok::<_, DbError>(rows)
        };
        let (result, capture) = hook(0).run(&repo, &[], &twice);
        assert_eq!(result.unwrap().len(), 4);
        assert_eq!(capture, Capture::Multiple(2));
    }

    #[test]
    fn test_run_flags_post_processed_results() {
        let repo = repo();

        let first = |repo: &Repo, args: &[Value]| {
            let mut rows = ids(repo, args)?;
            rows.truncate(1);
            Ok::<_, DbError>(rows)
        };
        let (result, capture) = hook(0).run(&repo, &[], &first);
        assert_eq!(result.unwrap().len(), 1);
        assert!(matches!(capture, Capture::Diverged(_)));
        assert_eq!(capture.into_shape().unwrap_err(), REASON_RESULT_DIVERGED);

        let failed_read = |repo: &Repo, _: &[Value]| {
            let missing = CompiledQuery::new("SELECT id FROM missing", QueryKind::Select);
            Ok::<Vec<Row>, DbError>(repo.session().query(&missing).unwrap_or_default())
        };
        let (_, capture) = hook(0).run(&repo, &[], &failed_read);
        assert!(matches!(capture, Capture::Diverged(_)));
    }

    #[test]
    fn test_run_skips_failures_and_wrong_arity() {
        let repo = repo();

        let failing = |_: &Repo, _: &[Value]| Err::<Vec<Row>, _>(DbError::MissingSql);
        let (result, capture) = hook(0).run(&repo, &[], &failing);
        assert!(result.is_err());
        assert_eq!(capture, Capture::Skipped);

        let (result, capture) = hook(1).run(&repo, &[], &ids);
        assert_eq!(result.unwrap().len(), 2);
        assert_eq!(capture, Capture::Skipped);
    }
}
