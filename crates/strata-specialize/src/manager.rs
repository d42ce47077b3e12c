//! The specialization manager.
//!
//! Owns the lifecycle of every procedure identity seen by this process:
//!
//! ```text
//! UNSEEN -> OBSERVING -> READY -> COMPILED
//!              |           |
//!              +-----------+--> INVALID
//! ```
//!
//! State is loaded from the key-value store the first time an identity is
//! touched and cached for the rest of the manager's life. Observation
//! progress is written back by [`SpecializationManager::flush`], which also
//! runs on drop; compiled entries are written as soon as their artifact is
//! published.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use strata_config::config::{Config, DEFAULT_MINIMUM_OBSERVATION_COUNT};
use strata_db::{Hydrate, Repository, Value};
use strata_events::{EventSinkHandle, FallbackReason, NullSink, SpecializationEvent};
use tracing::{debug, error, info, warn};

use crate::{
    artifact::{artifact_path, CompiledArtifact},
    error::{Result, SpecializationError, StoreError},
    hook::{Capture, QueryHook, REASON_RESULT_DIVERGED},
    identity::ProcedureIdentity,
    interceptor::Specialized,
    observation::{ObservationState, Round},
    snapshot::SnapshotEntry,
    source::SourceTransformer,
    specializer::Specializer,
    store::{ArtifactStore, FsArtifactStore, KeyValueStore, SqliteStore},
};

/// Policy knobs of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Degrade failures to the unspecialized procedure instead of returning
    /// them.
    pub ignore_errors: bool,
    /// Consistent calls required before compiling. Values below 2 are
    /// treated as 2.
    pub minimum_observation_count: u32,
    /// Tie identities to a checksum of the owner's source.
    pub checksum_guard: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignore_errors: true,
            minimum_observation_count: DEFAULT_MINIMUM_OBSERVATION_COUNT,
            checksum_guard: true,
        }
    }
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            ignore_errors: config.ignore_errors(),
            minimum_observation_count: config.minimum_observation_count(),
            checksum_guard: config.checksum_guard(),
        }
    }
}

impl Settings {
    fn threshold(&self) -> u32 {
        self.minimum_observation_count.max(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecializationState {
    Unseen,
    Observing,
    Ready,
    Compiled,
    Invalid,
}

impl fmt::Display for SpecializationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpecializationState::Unseen => "unseen",
            SpecializationState::Observing => "observing",
            SpecializationState::Ready => "ready",
            SpecializationState::Compiled => "compiled",
            SpecializationState::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// What the interceptor should do with a call.
pub(crate) enum Route {
    Compiled(Arc<CompiledArtifact>),
    Hook(Arc<QueryHook>),
    Synthesize,
    Fallback,
}

enum Phase {
    Observing {
        hook: Option<Arc<QueryHook>>,
        state: ObservationState,
    },
    Compiled {
        artifact: Arc<CompiledArtifact>,
        path: String,
    },
}

struct Tracked {
    phase: Phase,
    dirty: bool,
}

impl Tracked {
    fn unseen() -> Self {
        Self {
            phase: Phase::Observing {
                hook: None,
                state: ObservationState::new(),
            },
            dirty: false,
        }
    }

    fn state(&self, threshold: u32) -> SpecializationState {
        match &self.phase {
            Phase::Compiled { .. } => SpecializationState::Compiled,
            Phase::Observing { state, .. } if state.invalid => SpecializationState::Invalid,
            Phase::Observing { state, .. } if state.is_ready(threshold) => {
                SpecializationState::Ready
            }
            Phase::Observing { hook: None, state } if state.is_pristine() => {
                SpecializationState::Unseen
            }
            Phase::Observing { .. } => SpecializationState::Observing,
        }
    }
}

pub struct SpecializationManager {
    settings: Settings,
    specializer: Specializer,
    snapshots: Box<dyn KeyValueStore>,
    artifacts: Box<dyn ArtifactStore>,
    events: EventSinkHandle,
    tracked: Mutex<HashMap<String, Tracked>>,
}

impl SpecializationManager {
    pub fn new(
        settings: Settings,
        transformer: Arc<dyn SourceTransformer>,
        snapshots: Box<dyn KeyValueStore>,
        artifacts: Box<dyn ArtifactStore>,
    ) -> Self {
        Self {
            settings,
            specializer: Specializer::new(transformer),
            snapshots,
            artifacts,
            events: Arc::new(NullSink),
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a manager persisting to the locations named by `config`.
    pub fn from_config(config: &Config, transformer: Arc<dyn SourceTransformer>) -> Result<Self> {
        let snapshots = SqliteStore::open(config.get_state_path()?)?;
        let artifacts = FsArtifactStore::new(config.get_artifact_path()?)?;
        Ok(Self::new(
            Settings::from(config),
            transformer,
            Box::new(snapshots),
            Box::new(artifacts),
        ))
    }

    pub fn with_events(mut self, events: EventSinkHandle) -> Self {
        self.events = events;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The identity of `owner::procedure`, checksummed when the guard is on
    /// and the owner's source is known.
    pub fn identity(&self, owner: &str, procedure: &str) -> ProcedureIdentity {
        let identity = ProcedureIdentity::new(owner, procedure);
        if !self.settings.checksum_guard {
            return identity;
        }
        match self.specializer.transformer().parse(owner) {
            Some(tree) => identity.with_checksum(tree.checksum()),
            None => identity,
        }
    }

    /// Wraps `procedure` so that calls go through the specialization
    /// lifecycle of `owner::name`.
    pub fn wrap<R, T, E, F>(self: &Arc<Self>, owner: &str, name: &str, procedure: F) -> Specialized<R, T, E, F>
    where
        R: Repository,
        T: Hydrate + PartialEq,
        E: From<strata_db::DbError> + From<SpecializationError>,
        F: Fn(&R, &[Value]) -> std::result::Result<T, E>,
    {
        Specialized::new(Arc::clone(self), self.identity(owner, name), procedure)
    }

    pub fn state(&self, identity: &ProcedureIdentity) -> SpecializationState {
        let threshold = self.settings.threshold();
        self.with_tracked(identity, |tracked| tracked.state(threshold))
    }

    /// A copy of the observation state, while the identity has one.
    pub fn observation(&self, identity: &ProcedureIdentity) -> Option<ObservationState> {
        self.with_tracked(identity, |tracked| {
            match &tracked.phase {
                Phase::Observing { state, .. } => Some(state.clone()),
                Phase::Compiled { .. } => None,
            }
        })
    }

    pub fn invalid_reason(&self, identity: &ProcedureIdentity) -> Option<String> {
        self.observation(identity)
            .filter(|state| state.invalid)
            .and_then(|state| state.invalid_reason)
    }

    /// Writes every changed observation state back to the snapshot store.
    pub fn flush(&self) -> std::result::Result<(), StoreError> {
        let mut tracked = self.lock();
        for (key, entry) in tracked.iter_mut().filter(|(_, t)| t.dirty) {
            let snapshot = match &entry.phase {
                Phase::Observing { state, .. } => SnapshotEntry::from_state(state),
                Phase::Compiled { path, .. } => SnapshotEntry::compiled(path.clone()),
            };
            self.snapshots.set(key, &snapshot.encode()?)?;
            entry.dirty = false;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Tracked>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_tracked<O>(&self, identity: &ProcedureIdentity, f: impl FnOnce(&mut Tracked) -> O) -> O {
        let mut tracked = self.lock();
        let entry = tracked
            .entry(identity.key())
            .or_insert_with_key(|key| self.restore(key));
        f(entry)
    }

    /// Loads the persisted state of `key`. Unreadable state counts as unseen.
    fn restore(&self, key: &str) -> Tracked {
        let value = match self.snapshots.get(key) {
            Ok(Some(value)) => value,
            Ok(None) => return Tracked::unseen(),
            Err(err) => {
                warn!("Failed to read persisted state of {}: {}", key, err);
                return Tracked::unseen();
            }
        };

        let entry = match SnapshotEntry::decode(&value) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Discarding unreadable persisted state of {}: {}", key, err);
                return Tracked {
                    dirty: true,
                    ..Tracked::unseen()
                };
            }
        };

        let tracked = match entry {
            SnapshotEntry::Observing { state } => {
                Tracked {
                    phase: Phase::Observing { hook: None, state },
                    dirty: false,
                }
            }
            SnapshotEntry::Invalid { reason, call_count } => {
                Tracked {
                    phase: Phase::Observing {
                        hook: None,
                        state: ObservationState::invalidated(reason, call_count),
                    },
                    dirty: false,
                }
            }
            SnapshotEntry::Compiled { artifact, .. } => {
                match self.load_artifact(key, &artifact) {
                    Ok(loaded) => {
                        Tracked {
                            phase: Phase::Compiled {
                                artifact: Arc::new(loaded),
                                path: artifact,
                            },
                            dirty: false,
                        }
                    }
                    Err(err) => {
                        warn!(
                            "Compiled artifact {} of {} is unusable, observing again: {}",
                            artifact, key, err
                        );
                        Tracked {
                            dirty: true,
                            ..Tracked::unseen()
                        }
                    }
                }
            }
        };

        let threshold = self.settings.threshold();
        debug!("Restored {} as {}", key, tracked.state(threshold));
        self.events.emit(SpecializationEvent::StateRestored {
            key: key.to_string(),
            state: tracked.state(threshold).to_string(),
        });
        tracked
    }

    fn load_artifact(&self, key: &str, path: &str) -> std::result::Result<CompiledArtifact, String> {
        let artifact = self
            .artifacts
            .load_executable(path)
            .map_err(|err| err.to_string())?;
        if artifact.plan().key != key {
            return Err(format!("artifact belongs to {}", artifact.plan().key));
        }
        Ok(artifact)
    }

    pub(crate) fn route(&self, identity: &ProcedureIdentity) -> Route {
        self.with_tracked(identity, |tracked| {
            match &tracked.phase {
                Phase::Compiled { artifact, .. } => Route::Compiled(Arc::clone(artifact)),
                Phase::Observing { state, .. } if state.invalid => Route::Fallback,
                Phase::Observing { hook: Some(hook), .. } => Route::Hook(Arc::clone(hook)),
                Phase::Observing { hook: None, .. } => Route::Synthesize,
            }
        })
    }

    /// Synthesizes and installs the observation variant of `identity`.
    ///
    /// On failure the identity becomes invalid. The error is returned only
    /// under the strict policy; otherwise `Ok(None)` asks for a fallback.
    pub(crate) fn install_hook(
        &self,
        identity: &ProcedureIdentity,
    ) -> std::result::Result<Option<Arc<QueryHook>>, SpecializationError> {
        match self.specializer.synthesize_observation_variant(identity) {
            Ok(plan) => {
                let hook = Arc::new(QueryHook::new(plan));
                self.with_tracked(identity, |tracked| {
                    if let Phase::Observing { hook: slot, .. } = &mut tracked.phase {
                        *slot = Some(Arc::clone(&hook));
                    }
                });
                debug!("Installed observation hook for {}", identity);
                self.events.emit(SpecializationEvent::HookInstalled { key: identity.key() });
                Ok(Some(hook))
            }
            Err(err) => {
                self.invalidate(identity, &err);
                self.apply_policy(err).map(|()| None)
            }
        }
    }

    /// Folds a hooked call into the observation state.
    ///
    /// Returns whether the identity is now ready to compile. Errors are
    /// returned only under the strict policy.
    pub(crate) fn record(
        &self,
        identity: &ProcedureIdentity,
        capture: Capture,
        args: &[Value],
    ) -> std::result::Result<bool, SpecializationError> {
        if let Capture::Diverged(_) = capture {
            let err = SpecializationError::shape_inconsistency(identity, REASON_RESULT_DIVERGED);
            self.invalidate(identity, &err);
            return self.apply_policy(err).map(|()| false);
        }

        let shape = match capture.into_shape() {
            Ok(Some(shape)) => shape,
            Ok(None) => return Ok(false),
            Err(reason) => {
                let err = SpecializationError::unsupported_query_kind(identity, reason);
                self.invalidate(identity, &err);
                return self.apply_policy(err).map(|()| false);
            }
        };

        let threshold = self.settings.threshold();
        let round = self.with_tracked(identity, |tracked| {
            match &mut tracked.phase {
                Phase::Observing { state, .. } => {
                    let round = state.observe(&shape, args);
                    if !matches!(round, Round::Ambiguous(_)) {
                        tracked.dirty = true;
                    }
                    Some(round)
                }
                Phase::Compiled { .. } => None,
            }
        });

        match round {
            Some(Round::Counted(call_count)) => {
                debug!("{} observed {} consistent call(s)", identity, call_count);
                self.events.emit(SpecializationEvent::Observed {
                    key: identity.key(),
                    call_count,
                });
                Ok(call_count >= threshold)
            }
            Some(Round::Ambiguous(binding)) => {
                let err = SpecializationError::ambiguous_binding(identity, binding.to_string());
                debug!("{}", err);
                self.events.emit(SpecializationEvent::RoundAmbiguous {
                    key: identity.key(),
                    binding: binding.to_string(),
                });
                Ok(false)
            }
            Some(Round::Invalidated(reason)) => {
                let err = SpecializationError::shape_inconsistency(identity, reason);
                self.report_invalid(identity, &err);
                self.apply_policy(err).map(|()| false)
            }
            None => Ok(false),
        }
    }

    /// Compiles a ready identity and swaps the artifact in.
    ///
    /// Failures invalidate the identity and are never returned: the call
    /// that triggered compilation already has its result.
    pub(crate) fn compile(&self, identity: &ProcedureIdentity) {
        let pending = self.with_tracked(identity, |tracked| {
            match &tracked.phase {
                Phase::Observing {
                    hook: Some(hook),
                    state,
                } if !state.invalid => Some((Arc::clone(hook), state.clone())),
                _ => None,
            }
        });
        let Some((hook, state)) = pending else {
            return;
        };

        match self.publish(identity, &hook, &state) {
            Ok((path, artifact)) => {
                self.with_tracked(identity, |tracked| {
                    tracked.phase = Phase::Compiled {
                        artifact: Arc::new(artifact),
                        path: path.clone(),
                    };
                    tracked.dirty = false;
                });
                let persisted = SnapshotEntry::compiled(path.clone())
                    .encode()
                    .and_then(|value| self.snapshots.set(&identity.key(), &value));
                if let Err(err) = persisted {
                    warn!("Failed to persist compiled state of {}: {}", identity, err);
                    self.with_tracked(identity, |tracked| tracked.dirty = true);
                }

                info!("Compiled {} into {}", identity, path);
                self.events.emit(SpecializationEvent::Compiled {
                    key: identity.key(),
                    artifact: path,
                });
            }
            Err(err) => {
                self.invalidate(identity, &err);
                if !self.settings.ignore_errors {
                    error!("{}", err);
                }
            }
        }
    }

    fn publish(
        &self,
        identity: &ProcedureIdentity,
        hook: &QueryHook,
        state: &ObservationState,
    ) -> std::result::Result<(String, CompiledArtifact), SpecializationError> {
        let plan = self
            .specializer
            .synthesize_compiled_variant(hook.plan(), state)?;
        let generation = |err: StoreError| SpecializationError::generation(identity, err.to_string());

        let source = plan.to_source().map_err(generation)?;
        let path = artifact_path(&source);
        self.artifacts.write(&path, &source).map_err(generation)?;
        let artifact = self.artifacts.load_executable(&path).map_err(generation)?;
        Ok((path, artifact))
    }

    pub(crate) fn note_fallback(&self, identity: &ProcedureIdentity, reason: FallbackReason) {
        debug!("{} falls back to the original procedure ({:?})", identity, reason);
        self.events.emit(SpecializationEvent::Fallback {
            key: identity.key(),
            reason,
        });
    }

    pub(crate) fn note_compiled_hit(&self, identity: &ProcedureIdentity) {
        self.events.emit(SpecializationEvent::CompiledHit { key: identity.key() });
    }

    fn invalidate(&self, identity: &ProcedureIdentity, err: &SpecializationError) {
        let reason = err.reason();
        self.with_tracked(identity, |tracked| {
            tracked.phase = Phase::Observing {
                hook: None,
                state: match &tracked.phase {
                    Phase::Observing { state, .. } => {
                        let mut state = state.clone();
                        state.invalidate(reason.clone());
                        state
                    }
                    Phase::Compiled { .. } => ObservationState::invalidated(reason.clone(), 0),
                },
            };
            tracked.dirty = true;
        });
        self.report_invalid(identity, err);
    }

    fn report_invalid(&self, identity: &ProcedureIdentity, err: &SpecializationError) {
        if self.settings.ignore_errors {
            warn!("{}", err);
        }
        info!("{} is no longer specialized", identity);
        self.events.emit(SpecializationEvent::Invalidated {
            key: identity.key(),
            reason: err.reason(),
        });
    }

    fn apply_policy(&self, err: SpecializationError) -> std::result::Result<(), SpecializationError> {
        if self.settings.ignore_errors {
            Ok(())
        } else {
            error!("{}", err);
            Err(err)
        }
    }
}

impl Drop for SpecializationManager {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!("Failed to persist specialization state: {}", err);
        }
    }
}
