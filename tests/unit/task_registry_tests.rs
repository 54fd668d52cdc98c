//! Unit tests for per-session task state and single-flight claiming.

use chrono::{Duration, Utc};
use session_conductor::models::task::{TaskRecord, TaskStatus};
use session_conductor::orchestrator::registry::{TaskRegistry, STALE_AFTER_MINUTES};
use tokio_util::sync::CancellationToken;

#[test]
fn get_or_create_returns_an_idle_record() {
    let registry = TaskRegistry::new();
    let record = registry.get_or_create("s1");
    assert_eq!(record.session_id, "s1");
    assert_eq!(record.status, TaskStatus::Idle);

    // Second access sees the same logical slot, not a fresh one.
    registry.transition("s1", TaskStatus::Completed, None);
    assert_eq!(registry.get_or_create("s1").status, TaskStatus::Completed);
}

#[test]
fn begin_run_claims_the_session_exactly_once() {
    let registry = TaskRegistry::new();

    assert!(registry.begin_run("s1", CancellationToken::new()));
    assert!(registry.is_running("s1"));

    // A second claim must fail while the first run is in flight.
    assert!(!registry.begin_run("s1", CancellationToken::new()));

    // Other sessions are unaffected.
    assert!(registry.begin_run("s2", CancellationToken::new()));
}

#[test]
fn begin_run_succeeds_again_after_terminal_transition() {
    let registry = TaskRegistry::new();
    for terminal in [TaskStatus::Completed, TaskStatus::Error, TaskStatus::Cancelled] {
        assert!(registry.begin_run("s1", CancellationToken::new()));
        registry.transition("s1", terminal, None);
        assert!(!registry.is_running("s1"));
    }
    assert!(registry.begin_run("s1", CancellationToken::new()));
}

#[test]
fn transition_to_running_stores_handle_and_start_time() {
    let registry = TaskRegistry::new();
    let token = CancellationToken::new();
    registry.transition("s1", TaskStatus::Running, Some(token));

    let record = registry.get_or_create("s1");
    assert_eq!(record.status, TaskStatus::Running);
    assert!(record.cancel.is_some());
    assert!(record.started_at.is_some());
}

#[test]
fn terminal_transition_clears_the_handle() {
    let registry = TaskRegistry::new();
    assert!(registry.begin_run("s1", CancellationToken::new()));

    registry.transition("s1", TaskStatus::Completed, None);
    let record = registry.get_or_create("s1");
    assert_eq!(record.status, TaskStatus::Completed);
    assert!(record.cancel.is_none());
}

#[test]
fn cancel_fires_the_stored_token() {
    let registry = TaskRegistry::new();
    let token = CancellationToken::new();
    assert!(registry.begin_run("s1", token.clone()));

    assert!(registry.cancel("s1"));
    assert!(token.is_cancelled());
    assert_eq!(registry.get_or_create("s1").status, TaskStatus::Cancelled);
}

#[test]
fn cancel_without_a_running_task_is_refused() {
    let registry = TaskRegistry::new();
    assert!(!registry.cancel("never-seen"));

    registry.transition("s1", TaskStatus::Completed, None);
    assert!(!registry.cancel("s1"));

    // Cancel is not idempotent: the second call finds nothing running.
    assert!(registry.begin_run("s1", CancellationToken::new()));
    assert!(registry.cancel("s1"));
    assert!(!registry.cancel("s1"));
}

#[test]
fn touch_stamps_last_event_time() {
    let registry = TaskRegistry::new();
    assert!(registry.begin_run("s1", CancellationToken::new()));
    assert!(registry.get_or_create("s1").last_event_at.is_none());

    registry.touch("s1");
    assert!(registry.get_or_create("s1").last_event_at.is_some());

    // Touching an unknown session must not create a record.
    registry.touch("never-seen");
}

#[test]
fn running_without_handle_is_stale() {
    let now = Utc::now();
    let mut record = TaskRecord::new("s1".into());
    record.status = TaskStatus::Running;
    record.started_at = Some(now);
    record.cancel = None;
    assert!(TaskRegistry::is_stale(&record, now));
}

#[test]
fn running_past_threshold_is_stale() {
    let now = Utc::now();
    let mut record = TaskRecord::new("s1".into());
    record.status = TaskStatus::Running;
    record.cancel = Some(CancellationToken::new());

    record.started_at = Some(now - Duration::minutes(STALE_AFTER_MINUTES + 1));
    assert!(TaskRegistry::is_stale(&record, now));

    record.started_at = Some(now - Duration::minutes(STALE_AFTER_MINUTES - 1));
    assert!(!TaskRegistry::is_stale(&record, now));
}

#[test]
fn non_running_records_are_never_stale() {
    let now = Utc::now();
    let ancient = now - Duration::minutes(STALE_AFTER_MINUTES * 10);
    for status in [TaskStatus::Idle, TaskStatus::Completed, TaskStatus::Error] {
        let mut record = TaskRecord::new("s1".into());
        record.status = status;
        record.started_at = Some(ancient);
        assert!(!TaskRegistry::is_stale(&record, now), "{status:?}");
    }
}

#[test]
fn repair_stale_resets_to_idle_once() {
    let registry = TaskRegistry::new();
    assert!(registry.begin_run("s1", CancellationToken::new()));

    // Fresh run: not stale, nothing repaired.
    assert!(!registry.repair_stale("s1", Utc::now()));
    assert!(registry.is_running("s1"));

    // Pretend the run has been in flight past the threshold.
    let future = Utc::now() + Duration::minutes(STALE_AFTER_MINUTES + 1);
    assert!(registry.repair_stale("s1", future));
    assert_eq!(registry.get_or_create("s1").status, TaskStatus::Idle);

    // The second concurrent checker finds nothing left to repair.
    assert!(!registry.repair_stale("s1", future));
}

#[test]
fn repair_stale_on_unknown_session_is_a_no_op() {
    let registry = TaskRegistry::new();
    assert!(!registry.repair_stale("never-seen", Utc::now()));
}
