//! The call-site wrapper.

use std::{marker::PhantomData, sync::Arc};

use strata_db::{DbError, Hydrate, Repository, Value};
use strata_events::FallbackReason;

use crate::{
    error::SpecializationError,
    identity::ProcedureIdentity,
    manager::{Route, SpecializationManager},
};

/// A procedure wrapped by a [`SpecializationManager`].
///
/// The wrapped procedure must execute exactly one query through the
/// repository's session and return that query's hydrated rows. Observation
/// checks this on every call; a procedure that returns anything else is
/// never compiled.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use strata_db::{define_entity, Expression as _, Repository, Row, SelectQuery, Session, Value};
/// use strata_specialize::{
///     source::{DeclaredSources, Param, ProcedureNode, SourceTree},
///     store::{MemoryArtifactStore, MemoryStore},
///     Error, Settings, SpecializationManager,
/// };
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
/// struct Users(Session);
///
/// impl Repository for Users {
///     fn session(&self) -> &Session {
///         &self.0
///     }
/// }
///
/// fn find(repo: &Users, args: &[Value]) -> Result<Vec<Row>, Error> {
///     Ok(SelectQuery::<Row>::from(repo.session().clone(), users::TABLE)
///         .filter(users::ID.eq(args[0].clone()))
///         .fetch()?)
/// }
///
/// let sources = DeclaredSources::new().with(
///     SourceTree::new("Users", "fn find(id: i64)")
///         .procedure(ProcedureNode::new("find").param(Param::new("id", "i64"))),
/// );
/// let manager = Arc::new(SpecializationManager::new(
///     Settings::default(),
///     Arc::new(sources),
///     Box::new(MemoryStore::new()),
///     Box::new(MemoryArtifactStore::new()),
/// ));
///
/// let session = Session::open_in_memory().unwrap();
/// session.execute_batch("CREATE TABLE users (id INTEGER PRIMARY KEY)").unwrap();
/// let repo = Users(session);
///
/// let find = manager.wrap("Users", "find", find);
/// assert!(find.call(&repo, &[Value::Integer(1)]).unwrap().is_empty());
/// ```
pub struct Specialized<R, T, E, F> {
    manager: Arc<SpecializationManager>,
    identity: ProcedureIdentity,
    procedure: F,
    _signature: PhantomData<fn(&R) -> Result<T, E>>,
}

impl<R, T, E, F> Specialized<R, T, E, F>
where
    R: Repository,
    T: Hydrate + PartialEq,
    E: From<DbError> + From<SpecializationError>,
    F: Fn(&R, &[Value]) -> Result<T, E>,
{
    pub fn new(manager: Arc<SpecializationManager>, identity: ProcedureIdentity, procedure: F) -> Self {
        Self {
            manager,
            identity,
            procedure,
            _signature: PhantomData,
        }
    }

    pub fn identity(&self) -> &ProcedureIdentity {
        &self.identity
    }

    pub fn manager(&self) -> &Arc<SpecializationManager> {
        &self.manager
    }

    /// Calls the procedure, through its compiled artifact when one is loaded.
    pub fn call(&self, repo: &R, args: &[Value]) -> Result<T, E> {
        let hook = match self.manager.route(&self.identity) {
            Route::Compiled(artifact) => {
                if let Some(result) = artifact.invoke(repo, args) {
                    self.manager.note_compiled_hit(&self.identity);
                    return result.map_err(E::from);
                }
                return self.fallback(
                    repo,
                    args,
                    FallbackReason::ArityMismatch {
                        expected: artifact.arity(),
                        actual: args.len(),
                    },
                );
            }
            Route::Hook(hook) => hook,
            Route::Fallback => return self.fallback(repo, args, FallbackReason::Invalid),
            Route::Synthesize => {
                match self.manager.install_hook(&self.identity)? {
                    Some(hook) => hook,
                    None => return self.fallback(repo, args, FallbackReason::Unsupported),
                }
            }
        };

        let (result, capture) = hook.run(repo, args, &self.procedure);
        if self.manager.record(&self.identity, capture, args)? {
            self.manager.compile(&self.identity);
        }
        result
    }

    fn fallback(&self, repo: &R, args: &[Value], reason: FallbackReason) -> Result<T, E> {
        self.manager.note_fallback(&self.identity, reason);
        (self.procedure)(repo, args)
    }
}
