//! Scenario tests for the write-through mediator: validation gating,
//! upstream-first ordering, rollback on failure, and delete semantics.

mod support;

use calbridge_common::UpstreamError;
use calbridge_domain::{
    Attendee, CalbridgeError, EventDraft, EventFilters, EventPatch,
};
use chrono::{Duration, TimeZone, Utc};

use support::{harness, seed_authenticated_user, slot};

fn draft(title: &str) -> EventDraft {
    let (start, end) = slot(10);
    EventDraft {
        title: title.to_string(),
        description: None,
        start,
        end,
        location: None,
        attendees: vec![],
        is_all_day: false,
        timezone: None,
    }
}

#[tokio::test]
async fn create_writes_upstream_then_local() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let event = h.service.create("u1", draft("Meeting")).await.unwrap();

    assert_eq!(event.google_event_id.as_deref(), Some("upstream-generated"));
    assert_eq!(h.calendar.inserted.lock().await.len(), 1);

    let stored = h.events.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "Meeting");
}

#[tokio::test]
async fn create_with_inverted_range_is_rejected_before_upstream() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let start = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
    let mut bad = draft("Meeting");
    bad.start = start;
    bad.end = start - Duration::hours(1);

    let result = h.service.create("u1", bad).await;

    assert!(matches!(result, Err(CalbridgeError::Validation(_))));
    // No upstream call was issued and no local row exists.
    assert!(h.calendar.inserted.lock().await.is_empty());
    assert!(h.events.all().await.is_empty());
}

#[tokio::test]
async fn create_with_blank_title_is_rejected() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let result = h.service.create("u1", draft("   ")).await;
    assert!(matches!(result, Err(CalbridgeError::Validation(_))));
    assert!(h.calendar.inserted.lock().await.is_empty());
}

#[tokio::test]
async fn create_with_malformed_attendee_email_is_rejected() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let mut bad = draft("Meeting");
    bad.attendees = vec![Attendee {
        email: "not-an-email".to_string(),
        display_name: None,
        optional: false,
        response_status: None,
    }];

    let result = h.service.create("u1", bad).await;
    assert!(matches!(result, Err(CalbridgeError::Validation(_))));
}

#[tokio::test]
async fn create_rolls_back_when_upstream_fails() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    // Upstream keeps failing with server errors through the retry budget.
    for _ in 0..5 {
        h.calendar
            .insert_responses
            .lock()
            .await
            .push_back(Err(UpstreamError::Network("HTTP 500: backend".to_string())));
    }

    let result = h.service.create("u1", draft("Meeting")).await;

    assert!(matches!(result, Err(CalbridgeError::Network(_))));
    assert!(h.events.all().await.is_empty());

    // A subsequent list does not show the event.
    let page = h.service.list("u1", EventFilters::default()).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn create_compensates_upstream_when_local_insert_fails() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    *h.events.fail_next_insert.lock().await = true;

    let result = h.service.create("u1", draft("Meeting")).await;

    assert!(matches!(result, Err(CalbridgeError::Database(_))));
    // The compensating upstream delete targeted the just-created event.
    assert_eq!(h.calendar.deleted.lock().await.as_slice(), ["upstream-generated"]);
    assert!(h.events.all().await.is_empty());
}

#[tokio::test]
async fn update_merges_patch_and_sends_full_payload() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let created = h.service.create("u1", draft("Original")).await.unwrap();

    let patch = EventPatch { title: Some("Renamed".to_string()), ..EventPatch::default() };
    let updated = h.service.update("u1", &created.id, patch).await.unwrap();

    assert_eq!(updated.title, "Renamed");
    assert_eq!(updated.start, created.start);

    let stored = h.events.all().await;
    assert_eq!(stored[0].title, "Renamed");
}

#[tokio::test]
async fn update_rejects_merged_inverted_range() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let created = h.service.create("u1", draft("Original")).await.unwrap();

    let patch =
        EventPatch { end: Some(created.start - Duration::hours(2)), ..EventPatch::default() };
    let result = h.service.update("u1", &created.id, patch).await;

    assert!(matches!(result, Err(CalbridgeError::Validation(_))));
    assert_eq!(h.events.all().await[0].title, "Original");
}

#[tokio::test]
async fn update_of_missing_event_is_not_found() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let result = h.service.update("u1", "ghost", EventPatch::default()).await;
    assert!(matches!(result, Err(CalbridgeError::NotFound(_))));
}

#[tokio::test]
async fn delete_removes_both_replicas() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let created = h.service.create("u1", draft("Meeting")).await.unwrap();
    h.service.delete("u1", &created.id).await.unwrap();

    assert!(h.events.all().await.is_empty());
    assert_eq!(h.calendar.deleted.lock().await.as_slice(), ["upstream-generated"]);
}

#[tokio::test]
async fn delete_treats_upstream_gone_as_success() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let created = h.service.create("u1", draft("Meeting")).await.unwrap();

    h.calendar
        .delete_responses
        .lock()
        .await
        .push_back(Err(UpstreamError::Gone("already deleted".to_string())));

    h.service.delete("u1", &created.id).await.unwrap();
    assert!(h.events.all().await.is_empty());
}

#[tokio::test]
async fn delete_aborts_local_removal_on_other_upstream_errors() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let created = h.service.create("u1", draft("Meeting")).await.unwrap();

    h.calendar
        .delete_responses
        .lock()
        .await
        .push_back(Err(UpstreamError::QuotaExceeded("dailyLimitExceeded".to_string())));

    let result = h.service.delete("u1", &created.id).await;
    assert!(matches!(result, Err(CalbridgeError::QuotaExceeded(_))));
    assert_eq!(h.events.all().await.len(), 1);
}

#[tokio::test]
async fn list_never_returns_foreign_events() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;
    seed_authenticated_user(&h, "u2").await;

    h.service.create("u1", draft("Mine")).await.unwrap();
    let page = h.service.list("u2", EventFilters::default()).await.unwrap();

    assert_eq!(page.total, 0);
    assert!(page.events.is_empty());
}

#[tokio::test]
async fn search_requires_two_characters() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    let result = h.service.search("u1", "a", 50).await;
    assert!(matches!(result, Err(CalbridgeError::Validation(_))));

    h.service.create("u1", draft("Architecture review")).await.unwrap();
    let page = h.service.search("u1", "architec", 50).await.unwrap();
    assert_eq!(page.total, 1);
}

#[tokio::test]
async fn list_page_past_total_is_empty_with_correct_total() {
    let h = harness();
    seed_authenticated_user(&h, "u1").await;

    h.service.create("u1", draft("Only one")).await.unwrap();

    let filters = EventFilters { page: 4, limit: 50, ..EventFilters::default() };
    let page = h.service.list("u1", filters).await.unwrap();

    assert!(page.events.is_empty());
    assert_eq!(page.total, 1);
    assert!(!page.has_next());
}
