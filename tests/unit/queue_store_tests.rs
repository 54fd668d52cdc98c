//! Unit tests for the per-session FIFO prompt backlog.

use session_conductor::models::queue::PromptOptions;
use session_conductor::orchestrator::queue_store::{QueueStore, MAX_QUEUED_PROMPTS};
use session_conductor::AppError;

fn enqueue(store: &QueueStore, session: &str, prompt: &str) -> String {
    store
        .enqueue(session, prompt, PromptOptions::default())
        .expect("enqueue should succeed")
        .id
}

#[test]
fn dequeue_returns_items_in_arrival_order() {
    let store = QueueStore::new();
    enqueue(&store, "s1", "first");
    enqueue(&store, "s1", "second");
    enqueue(&store, "s1", "third");

    let prompts: Vec<String> = std::iter::from_fn(|| store.dequeue("s1"))
        .map(|item| item.prompt)
        .collect();
    assert_eq!(prompts, ["first", "second", "third"]);
    assert!(store.dequeue("s1").is_none());
}

#[test]
fn sessions_have_independent_queues() {
    let store = QueueStore::new();
    enqueue(&store, "s1", "for s1");
    enqueue(&store, "s2", "for s2");

    assert_eq!(store.len("s1"), 1);
    assert_eq!(store.len("s2"), 1);
    assert_eq!(store.dequeue("s2").expect("item").prompt, "for s2");
    assert_eq!(store.len("s1"), 1);
}

#[test]
fn empty_and_whitespace_prompts_are_rejected() {
    let store = QueueStore::new();
    for prompt in ["", "   ", "\n\t"] {
        let err = store
            .enqueue("s1", prompt, PromptOptions::default())
            .expect_err("blank prompt must fail");
        assert!(matches!(err, AppError::Validation(_)), "got {err:?}");
    }
    assert!(store.is_empty("s1"));
}

#[test]
fn enqueue_past_cap_is_rejected_without_side_effects() {
    let store = QueueStore::new();
    for i in 0..MAX_QUEUED_PROMPTS {
        enqueue(&store, "s1", &format!("prompt {i}"));
    }
    assert_eq!(store.len("s1"), MAX_QUEUED_PROMPTS);

    let err = store
        .enqueue("s1", "one too many", PromptOptions::default())
        .expect_err("51st enqueue must fail");
    assert!(matches!(err, AppError::QueueFull(_)));
    assert_eq!(store.len("s1"), MAX_QUEUED_PROMPTS);

    // The cap is per session.
    enqueue(&store, "s2", "fits elsewhere");
}

#[test]
fn delete_removes_only_the_named_item() {
    let store = QueueStore::new();
    enqueue(&store, "s1", "keep one");
    let target = enqueue(&store, "s1", "remove me");
    enqueue(&store, "s1", "keep two");

    assert!(store.delete("s1", &target));
    let remaining: Vec<String> = store.list("s1").into_iter().map(|i| i.prompt).collect();
    assert_eq!(remaining, ["keep one", "keep two"]);

    assert!(!store.delete("s1", &target));
    assert!(!store.delete("s1", "no-such-id"));
    assert!(!store.delete("other", &target));
}

#[test]
fn clear_drops_the_whole_backlog() {
    let store = QueueStore::new();
    enqueue(&store, "s1", "a");
    enqueue(&store, "s1", "b");

    store.clear("s1");
    assert!(store.is_empty("s1"));
    assert!(store.list("s1").is_empty());

    // Clearing an absent session is a no-op.
    store.clear("never-seen");
}

#[test]
fn requeue_front_restores_head_position() {
    let store = QueueStore::new();
    enqueue(&store, "s1", "head");
    enqueue(&store, "s1", "tail");

    let head = store.dequeue("s1").expect("head item");
    store.requeue_front("s1", head.clone());

    let list = store.list("s1");
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].id, head.id);
    assert_eq!(list[1].prompt, "tail");
}

#[test]
fn list_is_a_snapshot_not_a_view() {
    let store = QueueStore::new();
    enqueue(&store, "s1", "a");
    let snapshot = store.list("s1");

    enqueue(&store, "s1", "b");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(store.len("s1"), 2);
}
