mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use common::*;
use strata_db::Value;
use strata_events::{FallbackReason, SpecializationEvent};
use strata_specialize::{
    hook::REASON_RESULT_DIVERGED,
    observation::REASON_TEXT_CHANGED,
    store::{MemoryArtifactStore, MemoryStore},
    Settings, SpecializationState,
};

#[test]
fn test_stable_lookup_compiles_after_threshold() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();
    let calls = Arc::new(AtomicUsize::new(0));
    let find_item = harness.manager.wrap("Items", "find", counted(&calls, find));
    let key = find_item.identity().key();

    for (i, id) in [5, 7, 9].into_iter().enumerate() {
        let items = find_item.call(&repo, &[int(id)]).unwrap();
        assert_eq!(items[0].id, id);
        assert_eq!(calls.load(Ordering::SeqCst), i + 1);
    }
    assert_eq!(
        harness.manager.state(find_item.identity()),
        SpecializationState::Compiled
    );

    let compiled = find_item.call(&repo, &[int(42)]).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(compiled, find(&repo, &[int(42)]).unwrap());
    assert_eq!(harness.compiled_hits(&key), 1);
}

#[test]
fn test_compiled_path_matches_original_for_new_arguments() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();

    let wrapped_find = harness.manager.wrap("Items", "find", find);
    let wrapped_first = harness.manager.wrap("Items", "first_with_status", first_with_status);
    let wrapped_count = harness.manager.wrap("Items", "count_above", count_above);

    for id in [1, 2, 3] {
        wrapped_find.call(&repo, &[int(id)]).unwrap();
        wrapped_count.call(&repo, &[int(id * 100)]).unwrap();
    }
    for status in ["active", "archived", "active"] {
        wrapped_first.call(&repo, &[Value::from(status)]).unwrap();
    }

    for wrapped in [wrapped_find.identity(), wrapped_first.identity(), wrapped_count.identity()] {
        assert_eq!(harness.manager.state(wrapped), SpecializationState::Compiled);
    }

    for id in [0, 17, 60, 61, -4] {
        assert_eq!(
            wrapped_find.call(&repo, &[int(id)]).unwrap(),
            find(&repo, &[int(id)]).unwrap()
        );
        assert_eq!(
            wrapped_count.call(&repo, &[int(id * 7)]).unwrap(),
            count_above(&repo, &[int(id * 7)]).unwrap()
        );
    }
    for status in ["archived", "missing"] {
        let args = [Value::from(status)];
        assert_eq!(
            wrapped_first.call(&repo, &args).unwrap(),
            first_with_status(&repo, &args).unwrap()
        );
    }
}

#[test]
fn test_max_rows_argument_is_refilled_by_compiled_path() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "limited", limited);

    for (status, max) in [("active", 2), ("archived", 3), ("active", 4)] {
        let items = wrapped.call(&repo, &[Value::from(status), int(max)]).unwrap();
        assert_eq!(items.len(), max as usize);
    }
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Compiled
    );

    for (status, max) in [("archived", 5), ("active", 1), ("missing", 3)] {
        let args = [Value::from(status), int(max)];
        assert_eq!(wrapped.call(&repo, &args).unwrap(), limited(&repo, &args).unwrap());
    }
    assert_eq!(harness.compiled_hits(&wrapped.identity().key()), 3);
}

#[test]
fn test_post_processed_result_is_never_compiled() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "first_n", first_n);
    let identity = wrapped.identity().clone();

    for status in ["active", "archived", "active"] {
        let args = [Value::from(status), int(2)];
        assert_eq!(wrapped.call(&repo, &args).unwrap(), first_n(&repo, &args).unwrap());
    }
    assert_eq!(harness.manager.state(&identity), SpecializationState::Invalid);
    assert_eq!(
        harness.manager.invalid_reason(&identity).as_deref(),
        Some(REASON_RESULT_DIVERGED)
    );

    let items = wrapped.call(&repo, &[Value::from("active"), int(2)]).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(harness.compiled_hits(&identity.key()), 0);
}

#[test]
fn test_null_drift_invalidates_forever() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "search", search);
    let identity = wrapped.identity().clone();

    let nulls = wrapped.call(&repo, &[Value::Null]).unwrap();
    assert!(nulls.iter().all(|item| item.status.is_none()));
    assert_eq!(harness.manager.state(&identity), SpecializationState::Observing);

    let active = wrapped.call(&repo, &[Value::from("active")]).unwrap();
    assert_eq!(active, search(&repo, &[Value::from("active")]).unwrap());
    assert_eq!(harness.manager.state(&identity), SpecializationState::Invalid);
    assert_eq!(
        harness.manager.invalid_reason(&identity).as_deref(),
        Some(REASON_TEXT_CHANGED)
    );

    for _ in 0..5 {
        let again = wrapped.call(&repo, &[Value::from("active")]).unwrap();
        assert_eq!(again, active);
    }
    assert_eq!(harness.manager.state(&identity), SpecializationState::Invalid);

    let fallbacks = harness
        .events
        .events_for(&identity.key())
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                SpecializationEvent::Fallback {
                    reason: FallbackReason::Invalid,
                    ..
                }
            )
        })
        .count();
    assert_eq!(fallbacks, 5);
}

#[test]
fn test_ambiguous_round_is_discarded() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "range", range);
    let identity = wrapped.identity().clone();

    let same = wrapped.call(&repo, &[int(5), int(5)]).unwrap();
    assert_eq!(same.len(), 1);

    let state = harness.manager.observation(&identity).unwrap();
    assert_eq!(state.call_count, 0);
    assert!(!state.invalid);
    assert!(state.binding_map.is_none());
    assert!(harness
        .events
        .events_for(&identity.key())
        .iter()
        .any(|e| matches!(e, SpecializationEvent::RoundAmbiguous { .. })));

    wrapped.call(&repo, &[int(3), int(9)]).unwrap();
    assert_eq!(harness.manager.observation(&identity).unwrap().call_count, 1);

    wrapped.call(&repo, &[int(10), int(20)]).unwrap();
    wrapped.call(&repo, &[int(1), int(2)]).unwrap();
    assert_eq!(harness.manager.state(&identity), SpecializationState::Compiled);

    assert_eq!(
        wrapped.call(&repo, &[int(4), int(6)]).unwrap(),
        range(&repo, &[int(4), int(6)]).unwrap()
    );
    assert_eq!(
        wrapped.call(&repo, &[int(8), int(8)]).unwrap(),
        range(&repo, &[int(8), int(8)]).unwrap()
    );
}

#[test]
fn test_restart_resumes_counting() {
    let snapshots = MemoryStore::new();
    let artifacts = MemoryArtifactStore::new();
    let repo = Items::seeded();

    let key = {
        let harness = Harness::new(Settings::default(), snapshots.clone(), artifacts.clone());
        let wrapped = harness.manager.wrap("Items", "find", find);
        wrapped.call(&repo, &[int(5)]).unwrap();
        wrapped.call(&repo, &[int(7)]).unwrap();
        assert_eq!(
            harness.manager.observation(wrapped.identity()).unwrap().call_count,
            2
        );
        wrapped.identity().key()
    };

    let harness = Harness::new(Settings::default(), snapshots.clone(), artifacts.clone());
    let wrapped = harness.manager.wrap("Items", "find", find);
    assert_eq!(wrapped.identity().key(), key);
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Observing
    );
    assert_eq!(
        harness.manager.observation(wrapped.identity()).unwrap().call_count,
        2
    );

    wrapped.call(&repo, &[int(9)]).unwrap();
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Compiled
    );
    drop(wrapped);
    drop(harness);

    let harness = Harness::new(Settings::default(), snapshots, artifacts);
    let calls = Arc::new(AtomicUsize::new(0));
    let wrapped = harness.manager.wrap("Items", "find", counted(&calls, find));
    assert_eq!(
        wrapped.call(&repo, &[int(42)]).unwrap(),
        find(&repo, &[int(42)]).unwrap()
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(harness.compiled_hits(&key), 1);
}

#[test]
fn test_write_queries_are_not_specialized() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();

    let wrapped_touch = harness.manager.wrap("Items", "touch", touch);
    assert_eq!(wrapped_touch.call(&repo, &[int(1)]).unwrap(), 1);
    assert_eq!(
        harness.manager.state(wrapped_touch.identity()),
        SpecializationState::Invalid
    );
    assert_eq!(wrapped_touch.call(&repo, &[int(2)]).unwrap(), 1);

    let wrapped_purge = harness.manager.wrap("Items", "purge", purge);
    assert_eq!(wrapped_purge.call(&repo, &[int(3)]).unwrap(), 1);
    assert_eq!(wrapped_purge.call(&repo, &[int(3)]).unwrap(), 0);
    assert_eq!(
        harness.manager.state(wrapped_purge.identity()),
        SpecializationState::Invalid
    );
}

#[test]
fn test_multiple_queries_invalidate() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "twice", twice);

    assert_eq!(wrapped.call(&repo, &[int(4)]).unwrap().len(), 2);
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Invalid
    );
    assert!(harness
        .manager
        .invalid_reason(wrapped.identity())
        .unwrap()
        .starts_with("multiple queries executed"));
}

#[test]
fn test_untransformable_procedures_fall_back() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();

    let variadic = harness.manager.wrap("Items", "by_ids", by_ids);
    assert_eq!(variadic.call(&repo, &[int(1), int(2)]).unwrap().len(), 2);
    assert_eq!(
        harness.manager.state(variadic.identity()),
        SpecializationState::Invalid
    );

    let undeclared = harness.manager.wrap("Items", "undeclared", find);
    assert_eq!(undeclared.call(&repo, &[int(1)]).unwrap().len(), 1);
    assert!(harness
        .events
        .events_for(&undeclared.identity().key())
        .iter()
        .any(|e| {
            matches!(
                e,
                SpecializationEvent::Fallback {
                    reason: FallbackReason::Unsupported,
                    ..
                }
            )
        }));
}

#[test]
fn test_arity_mismatch_bypasses_artifact() {
    let harness = Harness::in_memory(Settings::default());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "find", find);

    for id in [1, 2, 3] {
        wrapped.call(&repo, &[int(id)]).unwrap();
    }
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Compiled
    );

    let items = wrapped.call(&repo, &[int(4), int(99)]).unwrap();
    assert_eq!(items[0].id, 4);
    assert!(harness
        .events
        .events_for(&wrapped.identity().key())
        .iter()
        .any(|e| {
            matches!(
                e,
                SpecializationEvent::Fallback {
                    reason: FallbackReason::ArityMismatch {
                        expected: 1,
                        actual: 2
                    },
                    ..
                }
            )
        }));
}

#[test]
fn test_checksum_guard_restarts_on_source_change() {
    let snapshots = MemoryStore::new();
    let artifacts = MemoryArtifactStore::new();
    let repo = Items::seeded();

    {
        let harness = Harness::new(Settings::default(), snapshots.clone(), artifacts.clone());
        let wrapped = harness.manager.wrap("Items", "find", find);
        for id in [1, 2, 3] {
            wrapped.call(&repo, &[int(id)]).unwrap();
        }
        assert_eq!(
            harness.manager.state(wrapped.identity()),
            SpecializationState::Compiled
        );
    }

    let edited = format!("{ITEMS_SOURCE} // edited");
    let harness = Harness::with_source(
        Settings::default(),
        snapshots.clone(),
        artifacts.clone(),
        &edited,
    );
    let wrapped = harness.manager.wrap("Items", "find", find);
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Unseen
    );

    let unguarded = Settings {
        checksum_guard: false,
        ..Settings::default()
    };
    let harness = Harness::new(unguarded, snapshots, artifacts);
    let wrapped = harness.manager.wrap("Items", "find", find);
    assert_eq!(wrapped.identity().key(), "Items::find");
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Unseen
    );
}
