use super::*;

fn engine() -> EngineApi {
    EngineApi::from_scenario("single_vehicle").expect("preset exists")
}

#[test]
fn require_run_rejects_unknown_and_mismatched_ids() {
    let mut inner = ServerInner::default();
    assert!(require_run(&inner, "run_single_vehicle").is_err());

    inner.engine = Some(engine());
    assert!(require_run(&inner, "run_single_vehicle").is_ok());
    assert!(require_run(&inner, "run_other").is_err());
    assert!(require_run_mut(&mut inner, "run_other").is_err());
}

#[test]
fn delta_messages_carry_status_then_snapshot_once_per_tick() {
    let mut inner = ServerInner {
        engine: Some(engine()),
        last_streamed_tick: None,
    };

    let first = collect_delta_messages(&mut inner);
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].message_type, "run.status");
    assert_eq!(first[1].message_type, "snapshot.created");

    // Same tick again: only the status repeats.
    let second = collect_delta_messages(&mut inner);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].message_type, "run.status");

    // Advancing the world makes the next snapshot due.
    if let Some(engine) = inner.engine.as_mut() {
        engine.start();
        engine.step(1);
    }
    let third = collect_delta_messages(&mut inner);
    assert_eq!(third.len(), 2);
    assert_eq!(third[1].message_type, "snapshot.created");
}

#[test]
fn stream_messages_tag_run_and_tick() {
    let engine = engine();
    let status_message = StreamMessage::run_status(engine.status());
    assert_eq!(status_message.run_id, "run_single_vehicle");
    assert_eq!(status_message.tick, 0);

    let snapshot_message = StreamMessage::snapshot_created(&engine.snapshot_for_current_tick());
    assert_eq!(snapshot_message.message_type, "snapshot.created");
    let encoded = serde_json::to_value(&snapshot_message).expect("serialize");
    assert_eq!(encoded["type"], "snapshot.created");
    assert_eq!(encoded["schema_version"], SCHEMA_VERSION_V1);
}

#[test]
fn router_builds_with_fresh_state() {
    let _ = router(AppState::new());
}
