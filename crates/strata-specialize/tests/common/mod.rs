#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use strata_db::{
    define_entity, DeleteQuery, Expression as _, FromRow, InsertQuery, Repository, Row,
    SelectQuery, Session, UpdateQuery, Value,
};
use strata_events::{CollectorSink, EventSinkHandle, SpecializationEvent};
use strata_specialize::{
    source::{DeclaredSources, Param, ProcedureNode, SourceTree},
    store::{ArtifactStore, KeyValueStore, MemoryArtifactStore, MemoryStore},
    Error, Settings, SpecializationManager,
};

define_entity!(
    items {
        table: "items",
        columns: {
            ID: i64 => "id",
            STATUS: Option<String> => "status",
            SCORE: i64 => "score"
        }
    }
);

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,
    pub status: Option<String>,
    pub score: i64,
}

impl FromRow for Item {
    fn from_row(row: &Row) -> strata_db::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            status: row.get("status")?,
            score: row.get("score")?,
        })
    }
}

pub struct Items {
    session: Session,
}

impl Repository for Items {
    fn session(&self) -> &Session {
        &self.session
    }
}

impl Items {
    pub fn seeded() -> Self {
        let session = Session::open_in_memory().unwrap();
        session
            .execute_batch(
                "CREATE TABLE items (
                    id INTEGER PRIMARY KEY,
                    status TEXT,
                    score INTEGER NOT NULL
                )",
            )
            .unwrap();

        for id in 1..=60i64 {
            let status = match id % 3 {
                0 => None,
                1 => Some("active"),
                _ => Some("archived"),
            };
            InsertQuery::into(session.clone(), items::TABLE)
                .set(items::ID, id)
                .set(items::STATUS, status)
                .set(items::SCORE, id * 10)
                .execute()
                .unwrap();
        }

        Self { session }
    }
}

pub fn find(repo: &Items, args: &[Value]) -> Result<Vec<Item>, Error> {
    Ok(SelectQuery::from(repo.session().clone(), items::TABLE)
        .filter(items::ID.eq(args[0].clone()))
        .fetch()?)
}

pub fn search(repo: &Items, args: &[Value]) -> Result<Vec<Item>, Error> {
    let query = SelectQuery::from(repo.session().clone(), items::TABLE);
    let query = if args[0].is_null() {
        query.filter(items::STATUS.null())
    } else {
        query.filter(items::STATUS.eq(args[0].clone()))
    };
    Ok(query.order_by(items::ID, false).fetch()?)
}

pub fn range(repo: &Items, args: &[Value]) -> Result<Vec<Item>, Error> {
    Ok(SelectQuery::from(repo.session().clone(), items::TABLE)
        .filter(items::ID.gte(args[0].clone()))
        .filter(items::ID.lte(args[1].clone()))
        .order_by(items::ID, false)
        .fetch()?)
}

pub fn first_with_status(repo: &Items, args: &[Value]) -> Result<Option<Item>, Error> {
    Ok(SelectQuery::from(repo.session().clone(), items::TABLE)
        .filter(items::STATUS.eq(args[0].clone()))
        .order_by(items::SCORE, true)
        .fetch_one()?)
}

pub fn limited(repo: &Items, args: &[Value]) -> Result<Vec<Item>, Error> {
    Ok(SelectQuery::from(repo.session().clone(), items::TABLE)
        .filter(items::STATUS.eq(args[0].clone()))
        .order_by(items::ID, false)
        .max_rows(args[1].clone())
        .fetch()?)
}

/// Fetches every item with the status, then keeps the first `n` in memory.
pub fn first_n(repo: &Items, args: &[Value]) -> Result<Vec<Item>, Error> {
    let mut found: Vec<Item> = SelectQuery::from(repo.session().clone(), items::TABLE)
        .filter(items::STATUS.eq(args[0].clone()))
        .order_by(items::ID, false)
        .fetch()?;
    if let Value::Integer(n) = args[1] {
        found.truncate(usize::try_from(n).unwrap_or(0));
    }
    Ok(found)
}

pub fn count_above(repo: &Items, args: &[Value]) -> Result<u64, Error> {
    Ok(SelectQuery::<Item>::from(repo.session().clone(), items::TABLE)
        .filter(items::SCORE.gt(args[0].clone()))
        .count()?)
}

pub fn touch(repo: &Items, args: &[Value]) -> Result<u64, Error> {
    let changed = UpdateQuery::table(repo.session().clone(), items::TABLE)
        .set(items::SCORE, 0)
        .filter(items::ID.eq(args[0].clone()))
        .execute()?;
    Ok(changed as u64)
}

pub fn purge(repo: &Items, args: &[Value]) -> Result<u64, Error> {
    let removed = DeleteQuery::from(repo.session().clone(), items::TABLE)
        .filter(items::ID.eq(args[0].clone()))
        .execute()?;
    Ok(removed as u64)
}

pub fn twice(repo: &Items, args: &[Value]) -> Result<Vec<Item>, Error> {
    let mut found = find(repo, args)?;
    found.extend(find(repo, args)?);
    Ok(found)
}

pub fn by_ids(repo: &Items, args: &[Value]) -> Result<Vec<Item>, Error> {
    Ok(SelectQuery::from(repo.session().clone(), items::TABLE)
        .filter(items::ID.in_(args.to_vec()))
        .fetch()?)
}

pub const ITEMS_SOURCE: &str =
    "impl Items { find, search, range, first_with_status, limited, first_n, count_above, touch, purge, twice, by_ids }";

pub fn sources(source: &str) -> DeclaredSources {
    let one = |name: &str, param: &str, ty: &str| ProcedureNode::new(name).param(Param::new(param, ty));

    DeclaredSources::new().with(
        SourceTree::new("Items", source)
            .procedure(one("find", "id", "i64"))
            .procedure(one("search", "status", "Option<String>"))
            .procedure(
                ProcedureNode::new("range")
                    .param(Param::new("min", "i64"))
                    .param(Param::new("max", "i64")),
            )
            .procedure(one("first_with_status", "status", "String"))
            .procedure(
                ProcedureNode::new("limited")
                    .param(Param::new("status", "String"))
                    .param(Param::new("max", "i64")),
            )
            .procedure(
                ProcedureNode::new("first_n")
                    .param(Param::new("status", "String"))
                    .param(Param::new("n", "i64")),
            )
            .procedure(one("count_above", "score", "i64"))
            .procedure(one("touch", "id", "i64"))
            .procedure(one("purge", "id", "i64"))
            .procedure(one("twice", "id", "i64"))
            .procedure(ProcedureNode::new("by_ids").param(Param::new("ids", "i64").variadic())),
    )
}

pub struct Harness {
    pub manager: Arc<SpecializationManager>,
    pub events: Arc<CollectorSink>,
}

impl Harness {
    pub fn new(settings: Settings, snapshots: impl KeyValueStore + 'static, artifacts: impl ArtifactStore + 'static) -> Self {
        Self::with_source(settings, snapshots, artifacts, ITEMS_SOURCE)
    }

    pub fn with_source(
        settings: Settings,
        snapshots: impl KeyValueStore + 'static,
        artifacts: impl ArtifactStore + 'static,
        source: &str,
    ) -> Self {
        let events = Arc::new(CollectorSink::default());
        let sink: EventSinkHandle = events.clone();
        let manager = SpecializationManager::new(
            settings,
            Arc::new(sources(source)),
            Box::new(snapshots),
            Box::new(artifacts),
        )
        .with_events(sink);

        Self {
            manager: Arc::new(manager),
            events,
        }
    }

    pub fn in_memory(settings: Settings) -> Self {
        Self::new(settings, MemoryStore::new(), MemoryArtifactStore::new())
    }

    pub fn compiled_hits(&self, key: &str) -> usize {
        self.events
            .events_for(key)
            .iter()
            .filter(|e| matches!(e, SpecializationEvent::CompiledHit { .. }))
            .count()
    }
}

pub fn strict() -> Settings {
    Settings {
        ignore_errors: false,
        ..Settings::default()
    }
}

/// Wraps `procedure` so every real execution bumps `counter`.
pub fn counted<T>(
    counter: &Arc<AtomicUsize>,
    procedure: fn(&Items, &[Value]) -> Result<T, Error>,
) -> impl Fn(&Items, &[Value]) -> Result<T, Error> {
    let counter = Arc::clone(counter);
    move |repo, args| {
        counter.fetch_add(1, Ordering::SeqCst);
        procedure(repo, args)
    }
}

pub fn int(value: i64) -> Value {
    Value::Integer(value)
}
