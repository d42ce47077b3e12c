use nu_ansi_term::Color::{Blue, Cyan, Green, Red, Yellow};
use serde::Serialize;
use strata_config::config::Config;
use strata_specialize::{
    artifact::CompiledPlan,
    shape::Slot,
    snapshot::SnapshotEntry,
    store::{ArtifactStore, FsArtifactStore, KeyValueStore, SqliteStore},
    Result, StoreError,
};
use strata_utils::fs::safe_remove;
use tracing::{info, warn};

use crate::utils::Colored;

/// The persisted state a command operates on.
pub struct StateContext {
    snapshots: SqliteStore,
    artifacts: FsArtifactStore,
}

impl StateContext {
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self {
            snapshots: SqliteStore::open(config.get_state_path()?)?,
            artifacts: FsArtifactStore::new(config.get_artifact_path()?)?,
        })
    }

    #[cfg(test)]
    fn new(snapshots: SqliteStore, artifacts: FsArtifactStore) -> Self {
        Self {
            snapshots,
            artifacts,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusRow {
    pub key: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl StatusRow {
    fn new(key: String, value: &str) -> Self {
        let mut row = Self {
            key,
            status: "unreadable",
            call_count: None,
            reason: None,
            artifact: None,
        };

        match SnapshotEntry::decode(value) {
            Ok(SnapshotEntry::Observing { state }) => {
                row.status = "observing";
                row.call_count = Some(state.call_count);
            }
            Ok(SnapshotEntry::Compiled { artifact, .. }) => {
                row.status = "compiled";
                row.artifact = Some(artifact);
            }
            Ok(SnapshotEntry::Invalid { reason, call_count }) => {
                row.status = "invalid";
                row.call_count = Some(call_count);
                row.reason = Some(reason);
            }
            Err(err) => row.reason = Some(err.to_string()),
        }
        row
    }
}

pub fn collect_status(ctx: &StateContext) -> Result<Vec<StatusRow>> {
    let mut rows = Vec::new();
    for key in ctx.snapshots.keys()? {
        if let Some(value) = ctx.snapshots.get(&key)? {
            rows.push(StatusRow::new(key, &value));
        }
    }
    Ok(rows)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).map_err(StoreError::from)?;
    println!("{rendered}");
    Ok(())
}

pub fn display_status(ctx: &StateContext, json: bool) -> Result<()> {
    let rows = collect_status(ctx)?;
    if json {
        return print_json(&rows);
    }

    if rows.is_empty() {
        info!("No persisted specialization state");
        return Ok(());
    }

    for row in &rows {
        let status = match row.status {
            "compiled" => Colored(Green, row.status),
            "observing" => Colored(Cyan, row.status),
            "invalid" => Colored(Yellow, row.status),
            _ => Colored(Red, row.status),
        };
        let mut line = format!("{} [{}]", Colored(Blue, &row.key), status);
        if let Some(count) = row.call_count {
            line.push_str(&format!(" calls={count}"));
        }
        if let Some(artifact) = &row.artifact {
            line.push_str(&format!(" artifact={artifact}"));
        }
        if let Some(reason) = &row.reason {
            line.push_str(&format!(" ({reason})"));
        }
        info!("{}", line);
    }

    let compiled = rows.iter().filter(|row| row.status == "compiled").count();
    info!(
        "{} identities, {} compiled",
        Colored(Blue, rows.len()),
        Colored(Green, compiled)
    );
    Ok(())
}

fn describe_slot(slot: &Slot) -> String {
    match slot {
        Slot::Argument(idx) => format!("argument {idx}"),
        Slot::Constant(value) => format!("constant {value}"),
    }
}

pub fn inspect(ctx: &StateContext, key: &str, json: bool) -> Result<()> {
    let Some(value) = ctx.snapshots.get(key)? else {
        warn!("No persisted state for {}", key);
        return Ok(());
    };
    let entry = SnapshotEntry::decode(&value)?;
    let plan = match &entry {
        SnapshotEntry::Compiled { artifact, .. } => {
            match ctx.artifacts.load_executable(artifact) {
                Ok(loaded) => Some(loaded.plan().clone()),
                Err(err) => {
                    warn!("Artifact {} of {} is unusable: {}", artifact, key, err);
                    None
                }
            }
        }
        _ => None,
    };

    if json {
        #[derive(Serialize)]
        struct Inspection<'a> {
            key: &'a str,
            entry: &'a SnapshotEntry,
            plan: Option<&'a CompiledPlan>,
        }
        return print_json(&Inspection {
            key,
            entry: &entry,
            plan: plan.as_ref(),
        });
    }

    info!("{}: {}", Colored(Blue, key), Colored(Cyan, entry.status()));
    match &entry {
        SnapshotEntry::Observing { state } => {
            info!("  calls: {}", state.call_count);
            if let Some(text) = &state.frozen_query_text {
                info!("  query: {}", text);
            }
            if let Some(mapping) = &state.binding_map {
                for (binding, slot) in mapping.iter() {
                    info!("  {} <- {}", binding, describe_slot(slot));
                }
            }
        }
        SnapshotEntry::Invalid { reason, call_count } => {
            info!("  calls: {}", call_count);
            info!("  reason: {}", Colored(Yellow, reason));
        }
        SnapshotEntry::Compiled {
            artifact,
            compiled_at,
        } => {
            info!("  artifact: {}", artifact);
            info!("  compiled at: {}", compiled_at.to_rfc3339());
        }
    }

    if let Some(plan) = plan {
        info!("  arity: {}", plan.arity);
        info!("  sql: {}", plan.sql);
        for (binding, slot) in &plan.bindings {
            info!("  {} <- {}", binding, describe_slot(slot));
        }
        for (name, slot) in &plan.metadata {
            info!("  meta {} <- {}", name, describe_slot(slot));
        }
    }
    Ok(())
}

/// Removes the state of `key`, or of every identity when `key` is `None`.
/// Returns how many identities were reset.
pub fn reset(ctx: &StateContext, key: Option<&str>, keep_artifacts: bool) -> Result<usize> {
    let keys = match key {
        Some(key) => vec![key.to_string()],
        None => ctx.snapshots.keys()?,
    };

    let mut removed = 0;
    for key in keys {
        let artifact = ctx
            .snapshots
            .get(&key)?
            .and_then(|value| SnapshotEntry::decode(&value).ok())
            .and_then(|entry| {
                match entry {
                    SnapshotEntry::Compiled { artifact, .. } => Some(artifact),
                    _ => None,
                }
            });

        if !ctx.snapshots.remove(&key)? {
            warn!("No persisted state for {}", key);
            continue;
        }
        removed += 1;

        if let Some(artifact) = artifact.filter(|_| !keep_artifacts) {
            safe_remove(ctx.artifacts.dir().join(&artifact)).map_err(StoreError::from)?;
        }
        info!("Reset {}", Colored(Blue, &key));
    }
    Ok(removed)
}
