mod common;

use common::*;
use strata_db::Value;
use strata_specialize::{Error, SpecializationError, SpecializationState};

#[test]
fn test_transformation_error_is_returned_once() {
    let harness = Harness::in_memory(strict());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "undeclared", find);

    let err = wrapped.call(&repo, &[int(1)]).unwrap_err();
    let Error::Specialization(err) = err else {
        panic!("expected a specialization error, got {err:?}");
    };
    assert!(matches!(err, SpecializationError::Transformation { .. }));
    assert_eq!(err.owner(), "Items");
    assert_eq!(err.procedure(), "undeclared");

    assert_eq!(wrapped.call(&repo, &[int(1)]).unwrap().len(), 1);
}

#[test]
fn test_shape_inconsistency_is_returned() {
    let harness = Harness::in_memory(strict());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "search", search);

    wrapped.call(&repo, &[Value::Null]).unwrap();
    let err = wrapped.call(&repo, &[Value::from("active")]).unwrap_err();
    assert!(matches!(
        err,
        Error::Specialization(SpecializationError::ShapeInconsistency { .. })
    ));
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Invalid
    );

    let active = wrapped.call(&repo, &[Value::from("active")]).unwrap();
    assert_eq!(active, search(&repo, &[Value::from("active")]).unwrap());
}

#[test]
fn test_diverging_result_is_a_shape_inconsistency() {
    let harness = Harness::in_memory(strict());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "first_n", first_n);
    let args = [Value::from("active"), int(3)];

    assert!(matches!(
        wrapped.call(&repo, &args),
        Err(Error::Specialization(
            SpecializationError::ShapeInconsistency { .. }
        ))
    ));
    assert_eq!(wrapped.call(&repo, &args).unwrap().len(), 3);
}

#[test]
fn test_unsupported_query_kind_is_returned() {
    let harness = Harness::in_memory(strict());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "touch", touch);

    assert!(matches!(
        wrapped.call(&repo, &[int(1)]),
        Err(Error::Specialization(
            SpecializationError::UnsupportedQueryKind { .. }
        ))
    ));
    assert_eq!(wrapped.call(&repo, &[int(1)]).unwrap(), 1);
}

#[test]
fn test_ambiguity_is_never_returned() {
    let harness = Harness::in_memory(strict());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "range", range);

    assert_eq!(wrapped.call(&repo, &[int(5), int(5)]).unwrap().len(), 1);
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Observing
    );
}

#[test]
fn test_strict_mode_still_compiles() {
    let harness = Harness::in_memory(strict());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "find", find);

    for id in [10, 20, 30] {
        wrapped.call(&repo, &[int(id)]).unwrap();
    }
    assert_eq!(
        harness.manager.state(wrapped.identity()),
        SpecializationState::Compiled
    );
    assert_eq!(
        wrapped.call(&repo, &[int(11)]).unwrap(),
        find(&repo, &[int(11)]).unwrap()
    );
}

#[test]
fn test_procedure_errors_pass_through() {
    let harness = Harness::in_memory(strict());
    let repo = Items::seeded();
    let wrapped = harness.manager.wrap("Items", "find", find);

    repo_drop_items(&repo);
    assert!(matches!(
        wrapped.call(&repo, &[int(1)]),
        Err(Error::Db(_))
    ));
    let state = harness.manager.observation(wrapped.identity()).unwrap();
    assert_eq!(state.call_count, 0);
    assert!(!state.invalid);
}

fn repo_drop_items(repo: &Items) {
    use strata_db::Repository as _;
    repo.session().execute_batch("DROP TABLE items").unwrap();
}
