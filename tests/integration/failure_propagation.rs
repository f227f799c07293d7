//! Failure propagation tests.
//!
//! A failed task must fail all of its transitive dependents without
//! their capabilities ever being invoked.

use foreman::core::{Capability, TaskFailure, TaskStatus};
use foreman::service::ServiceFailure;
use foreman::RunState;

use crate::fixtures::{id, launch_chain, task, transitions, Behavior, HarnessBuilder, ScriptedProvider};

/// Test: R fails => M and P fail without being invoked
#[tokio::test]
async fn test_root_failure_fails_chain() {
    let research = ScriptedProvider::new("search", Behavior::Error);
    let email = ScriptedProvider::new("mailer", Behavior::Succeed);
    let payment = ScriptedProvider::new("billing", Behavior::Succeed);
    let mut harness = HarnessBuilder::new()
        .provider(Capability::Research, research.clone())
        .provider(Capability::Email, email.clone())
        .provider(Capability::Payment, payment.clone())
        .agents(Capability::Research, 1)
        .agents(Capability::Email, 1)
        .agents(Capability::Payment, 1)
        .build(launch_chain());

    let report = harness.scheduler.run_to_completion().await;

    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.status_of(&id("R")), Some(TaskStatus::Failed));
    assert_eq!(report.status_of(&id("M")), Some(TaskStatus::Failed));
    assert_eq!(report.status_of(&id("P")), Some(TaskStatus::Failed));
    assert_eq!(research.calls(), 1);
    assert_eq!(email.calls(), 0);
    assert_eq!(payment.calls(), 0);

    for dependent in ["M", "P"] {
        let task = report.get(&id(dependent)).unwrap();
        assert_eq!(
            task.failure,
            Some(TaskFailure::DependencyFailed { dependency: id("R") })
        );
        assert!(task.started_at.is_none());
    }

    // Dependents never pass through Running.
    let events = harness.drain_events();
    assert!(!transitions(&events)
        .iter()
        .any(|(t, s)| (t == "M" || t == "P") && *s == TaskStatus::Running));
}

/// Test: Root failure records the service failure kind
#[tokio::test]
async fn test_root_failure_kind_is_recorded() {
    let mut harness = HarnessBuilder::new()
        .provider(Capability::Research, ScriptedProvider::new("search", Behavior::InvalidPayload))
        .agents(Capability::Research, 1)
        .build(vec![task("R", Capability::Research)]);

    let report = harness.scheduler.run_to_completion().await;

    match &report.get(&id("R")).unwrap().failure {
        Some(TaskFailure::Service {
            failure: ServiceFailure::InvalidPayload { .. },
        }) => {}
        other => panic!("Expected InvalidPayload failure, got {:?}", other),
    }
}

/// Test: Independent branches are unaffected by a failure elsewhere
/// Given R -> M and an independent X -> Y
/// When R fails
/// Then X and Y still complete
#[tokio::test]
async fn test_failure_does_not_cross_branches() {
    let payment = ScriptedProvider::new("billing", Behavior::Succeed);
    let mut harness = HarnessBuilder::new()
        .provider(Capability::Research, ScriptedProvider::new("search", Behavior::Unavailable))
        .provider(Capability::Payment, payment.clone())
        .agents(Capability::Research, 1)
        .agents(Capability::Payment, 1)
        .build(vec![
            task("R", Capability::Research),
            task("M", Capability::Payment).depends_on("R"),
            task("X", Capability::Payment),
            task("Y", Capability::Payment).depends_on("X"),
        ]);

    let report = harness.scheduler.run_to_completion().await;

    assert_eq!(report.status_of(&id("M")), Some(TaskStatus::Failed));
    assert_eq!(report.status_of(&id("X")), Some(TaskStatus::Completed));
    assert_eq!(report.status_of(&id("Y")), Some(TaskStatus::Completed));
    assert_eq!(payment.seen_tasks(), vec!["X", "Y"]);
}

/// Test: Diamond with one failed parent
/// Given A -> C and B -> C
/// When A fails and B succeeds
/// Then C fails without being invoked
#[tokio::test]
async fn test_diamond_partial_failure() {
    let email = ScriptedProvider::new("mailer", Behavior::Succeed);
    let mut harness = HarnessBuilder::new()
        .provider(Capability::Research, ScriptedProvider::new("search", Behavior::Error))
        .provider(Capability::Email, email.clone())
        .agents(Capability::Research, 1)
        .agents(Capability::Email, 1)
        .build(vec![
            task("A", Capability::Research),
            task("B", Capability::Email),
            task("C", Capability::Email).depends_on("A").depends_on("B"),
        ]);

    let report = harness.scheduler.run_to_completion().await;

    assert_eq!(report.status_of(&id("B")), Some(TaskStatus::Completed));
    assert_eq!(report.status_of(&id("C")), Some(TaskStatus::Failed));
    assert_eq!(email.seen_tasks(), vec!["B"]);
}
