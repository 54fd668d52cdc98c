//! Unit tests for the watcher-facing event wire format.

use serde_json::json;
use session_conductor::models::event::SessionEvent;
use session_conductor::models::queue::{PromptOptions, QueuedPrompt};
use session_conductor::models::task::TaskStatus;

#[test]
fn task_status_serializes_with_event_tag() {
    let event = SessionEvent::TaskStatus {
        session_id: "s1".into(),
        status: TaskStatus::Running,
    };
    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(
        value,
        json!({"event": "task_status", "session_id": "s1", "status": "running"})
    );
}

#[test]
fn tool_call_keeps_input_verbatim() {
    let event = SessionEvent::ToolCall {
        session_id: "s1".into(),
        name: "bash".into(),
        input: json!({"command": "ls", "nested": {"depth": 2}}),
    };
    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["event"], "tool_call");
    assert_eq!(value["input"]["nested"]["depth"], 2);
}

#[test]
fn queue_updated_carries_snapshot_and_size() {
    let items = vec![
        QueuedPrompt::new("first".into(), PromptOptions::default()),
        QueuedPrompt::new("second".into(), PromptOptions::default()),
    ];
    let event = SessionEvent::QueueUpdated {
        session_id: "s1".into(),
        queue: items.clone(),
        size: items.len(),
    };
    let value = serde_json::to_value(&event).expect("serialize");
    assert_eq!(value["event"], "queue_updated");
    assert_eq!(value["size"], 2);
    assert_eq!(value["queue"][0]["prompt"], "first");
    assert_eq!(value["queue"][1]["prompt"], "second");
}

#[test]
fn events_round_trip_through_json() {
    let event = SessionEvent::SessionShared {
        session_id: "s1".into(),
        is_shared: true,
    };
    let line = serde_json::to_string(&event).expect("serialize");
    let back: SessionEvent = serde_json::from_str(&line).expect("deserialize");
    assert_eq!(back, event);
}

#[test]
fn session_id_accessor_covers_all_variants() {
    let events = [
        SessionEvent::TaskStatus {
            session_id: "s1".into(),
            status: TaskStatus::Idle,
        },
        SessionEvent::Content {
            session_id: "s1".into(),
            text: "hi".into(),
        },
        SessionEvent::Error {
            session_id: "s1".into(),
            message: "boom".into(),
        },
    ];
    for event in events {
        assert_eq!(event.session_id(), "s1");
    }
}
