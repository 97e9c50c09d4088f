use super::*;

#[tokio::test]
async fn promote_moves_provisional_entry_to_durable_key() {
    let reg = CallRegistry::new();
    reg.insert_provisional("ch1", "1001", None).await;
    assert!(reg.get_by_composite("ch1", "1001").await.is_some());

    let promoted = reg.promote("ch1", "1001", "C1").await.unwrap();
    assert_eq!(promoted.call_id, "C1");
    assert!(reg.get_by_call_id("C1").await.is_some());
    // the provisional composite key is gone once promoted
    assert!(reg.get_by_composite("ch1", "1001").await.is_none());
}

#[tokio::test]
async fn promote_without_provisional_entry_is_noop() {
    let reg = CallRegistry::new();
    assert!(reg.promote("ch1", "1001", "C1").await.is_none());
    assert!(reg.get_by_call_id("C1").await.is_none());
}

#[tokio::test]
async fn fail_cleanup_removes_provisional_entry() {
    let reg = CallRegistry::new();
    reg.insert_provisional("ch1", "1001", None).await;
    reg.fail_cleanup("ch1", "1001").await;
    assert!(reg.get_by_composite("ch1", "1001").await.is_none());
}

#[tokio::test]
async fn attach_alias_and_appid_makes_entry_addressable_by_both_keys() {
    let reg = CallRegistry::new();
    reg.upsert_for_event("C2", None, None).await;

    let updated = reg.attach_alias_and_appid("C2", "ch2", "2002", Some("app-9".to_owned())).await;
    assert!(updated.is_some());
    assert_eq!(updated.unwrap().appid, Some("app-9".to_owned()));

    assert!(reg.get_by_call_id("C2").await.is_some());
    assert!(reg.get_by_composite("ch2", "2002").await.is_some());
}

#[tokio::test]
async fn terminal_removal_drops_both_durable_and_alias_keys() {
    let reg = CallRegistry::new();
    reg.upsert_for_event("C2", None, None).await;
    reg.attach_alias_and_appid("C2", "ch2", "2002", None).await;

    let removed = reg.remove_terminal("C2").await;
    assert!(removed.is_some());
    assert!(reg.get_by_call_id("C2").await.is_none());
    assert!(reg.get_by_composite("ch2", "2002").await.is_none());
}

#[tokio::test]
async fn call_hangup_for_unknown_call_is_noop() {
    let reg = CallRegistry::new();
    assert!(reg.remove_terminal("ghost").await.is_none());
}

#[tokio::test]
async fn event_driven_insert_creates_inbound_record() {
    let reg = CallRegistry::new();
    let record = reg.upsert_for_event("C3", None, None).await;
    assert_eq!(record.direction, CallDirection::Inbound);
    assert_eq!(record.state, CallState::Incoming);
    assert!(reg.get_by_call_id("C3").await.is_some());
}

#[tokio::test]
async fn event_driven_insert_promotes_matching_provisional_entry_instead_of_duplicating() {
    let reg = CallRegistry::new();
    reg.insert_provisional("ch1", "1001", None).await;

    // A racing event names the call id before the dial reply arrives.
    let record = reg.upsert_for_event("C4", Some("ch1"), Some("1001")).await;
    assert_eq!(record.call_id, "C4");
    assert_eq!(record.direction, CallDirection::Outbound);

    // One entry, not two: the provisional key is gone, the durable key exists.
    assert!(reg.get_by_composite("ch1", "1001").await.is_none());
    assert!(reg.get_by_call_id("C4").await.is_some());
}

#[tokio::test]
async fn apply_event_fields_merges_nonempty_values_only() {
    let reg = CallRegistry::new();
    reg.upsert_for_event("C5", None, None).await;

    reg.apply_event_fields(
        "C5",
        EventFieldMerge {
            state: Some(CallState::Ringing),
            from: Some("+15551230000".to_owned()),
            to: Some(String::new()),
            ..Default::default()
        },
    )
    .await;

    let record = reg.get_by_call_id("C5").await.unwrap();
    assert_eq!(record.state, CallState::Ringing);
    assert_eq!(record.from, "+15551230000");
    assert_eq!(record.to, ""); // empty merge value left the prior (also empty) field alone
}

#[tokio::test]
async fn unclaimed_incoming_removal_is_idempotent() {
    let reg = CallRegistry::new();
    reg.upsert_for_event("C6", None, None).await;

    let first = reg.remove_unclaimed("C6").await;
    assert!(first.is_some());
    let second = reg.remove_unclaimed("C6").await;
    assert!(second.is_none());
}
