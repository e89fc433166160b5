mod common;

use std::{
    collections::HashSet,
    sync::atomic::Ordering,
    time::{Duration, Instant},
};

use futures_util::future::join_all;
use interviewlab::{
    models::{Difficulty, SessionStatus},
    reconcile, AppError, LIST_LIMIT,
};
use uuid::Uuid;

use common::{harness, harness_with_timeout};

#[tokio::test]
async fn create_starts_active_and_provisions_call_and_channel() {
    let h = harness().await;
    let host = h.user("host").await;

    let session = h.sessions.create(&host, "  Two Sum ", "easy").await.unwrap();

    assert_eq!(session.problem, "Two Sum");
    assert_eq!(session.difficulty, Difficulty::Easy);
    assert_eq!(session.status, SessionStatus::Active);
    assert!(session.participant.is_none());
    let host_summary = session.host.as_ref().unwrap();
    assert_eq!(host_summary.id, host.id);
    assert_eq!(host_summary.external_id, None);
    assert_eq!(host_summary.email, None);

    assert_eq!(
        h.platform.log(),
        vec![
            format!("create_call {} Two Sum easy {}", session.call_id, session.id),
            format!("create_channel {} ext_host", session.call_id),
        ]
    );
}

#[tokio::test]
async fn call_ids_never_repeat() {
    let h = harness().await;
    let host = h.user("host").await;

    let mut call_ids = HashSet::new();
    for i in 0..50 {
        let session = h.sessions.create(&host, &format!("Problem {i}"), "medium").await.unwrap();
        assert!(call_ids.insert(session.call_id));
    }
}

#[tokio::test]
async fn create_rejects_bad_input_without_writing() {
    let h = harness().await;
    let host = h.user("host").await;

    for (problem, difficulty) in [("", "easy"), ("   ", "easy"), ("Two Sum", ""), ("Two Sum", "brutal"), ("Two Sum", "Easy")] {
        let err = h.sessions.create(&host, problem, difficulty).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{problem:?}/{difficulty:?}: {err:?}");
    }

    assert!(h.sessions.list_active().await.unwrap().is_empty());
    assert!(h.platform.log().is_empty());
}

#[tokio::test]
async fn provisioning_failure_keeps_the_record_for_reconciliation() {
    let h = harness().await;
    let host = h.user("host").await;
    h.platform.fail_provisioning.store(true, Ordering::SeqCst);

    let err = h.sessions.create(&host, "Two Sum", "easy").await.unwrap_err();
    assert!(matches!(err, AppError::Provisioning(_)));

    let active = h.sessions.list_active().await.unwrap();
    assert_eq!(active.len(), 1);

    // Still failing: the sweep reports and leaves it pending.
    let report = reconcile::sweep(&h.sessions, Duration::ZERO).await.unwrap();
    assert_eq!((report.provisioned, report.failed), (0, 1));

    h.platform.fail_provisioning.store(false, Ordering::SeqCst);
    let report = reconcile::sweep(&h.sessions, Duration::ZERO).await.unwrap();
    assert_eq!((report.provisioned, report.failed), (1, 0));
    assert_eq!(h.platform.count(&format!("create_call {}", active[0].call_id)), 1);

    // Nothing left to do.
    let report = reconcile::sweep(&h.sessions, Duration::ZERO).await.unwrap();
    assert_eq!(report, reconcile::SweepReport::default());
}

#[tokio::test]
async fn sweep_respects_the_grace_period() {
    let h = harness().await;
    let host = h.user("host").await;
    h.platform.fail_provisioning.store(true, Ordering::SeqCst);
    h.sessions.create(&host, "Two Sum", "easy").await.unwrap_err();
    h.platform.fail_provisioning.store(false, Ordering::SeqCst);

    let report = reconcile::sweep(&h.sessions, Duration::from_secs(3600)).await.unwrap();
    assert_eq!(report, reconcile::SweepReport::default());
}

#[tokio::test]
async fn two_sum_scenario() {
    let h = harness().await;
    let host = h.user("h").await;
    let p = h.user("p").await;
    let q = h.user("q").await;

    let s = h.sessions.create(&host, "Two Sum", "easy").await.unwrap();
    assert_eq!(s.status, SessionStatus::Active);
    assert!(s.participant.is_none());

    let joined = h.sessions.join(&p, s.id).await.unwrap();
    assert_eq!(joined.participant.as_ref().unwrap().id, p.id);
    assert_eq!(h.platform.count(&format!("add_member {} ext_p", s.call_id)), 1);

    match h.sessions.join(&q, s.id).await {
        Err(AppError::Conflict(message)) => assert_eq!(message, "Session is full"),
        other => panic!("expected conflict, got {other:?}"),
    }

    assert!(matches!(h.sessions.end(&q, s.id).await, Err(AppError::Forbidden(_))));

    let ended = h.sessions.end(&host, s.id).await.unwrap();
    assert_eq!(ended.status, SessionStatus::Completed);
    assert_eq!(h.platform.count(&format!("delete_call {}", s.call_id)), 1);
    assert_eq!(h.platform.count(&format!("delete_channel {}", s.call_id)), 1);

    assert!(matches!(h.sessions.end(&host, s.id).await, Err(AppError::InvalidState(_))));
    assert_eq!(h.sessions.get(s.id).await.unwrap().status, SessionStatus::Completed);
}

#[tokio::test]
async fn concurrent_joins_have_exactly_one_winner() {
    let h = harness().await;
    let host = h.user("host").await;
    let session = h.sessions.create(&host, "LRU Cache", "hard").await.unwrap();

    let mut candidates = Vec::new();
    for i in 0..8 {
        candidates.push(h.user(&format!("candidate{i}")).await);
    }

    let results = join_all(candidates.iter().map(|user| h.sessions.join(user, session.id))).await;

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert_eq!(
        results.iter().filter(|r| matches!(r, Err(AppError::Conflict(_)))).count(),
        candidates.len() - 1
    );

    let seated = h.sessions.get(session.id).await.unwrap().participant.unwrap();
    assert_eq!(seated.id, winners[0].participant.as_ref().unwrap().id);
    assert_eq!(h.platform.count("add_member"), 1);
}

#[tokio::test]
async fn joining_a_completed_session_is_invalid_state() {
    let h = harness().await;
    let host = h.user("host").await;
    let guest = h.user("guest").await;
    let session = h.sessions.create(&host, "Two Sum", "easy").await.unwrap();
    h.sessions.end(&host, session.id).await.unwrap();

    assert!(matches!(
        h.sessions.join(&guest, session.id).await,
        Err(AppError::InvalidState(_))
    ));
    assert!(h.sessions.get(session.id).await.unwrap().participant.is_none());
}

#[tokio::test]
async fn host_may_take_the_participant_seat() {
    let h = harness().await;
    let host = h.user("host").await;
    let session = h.sessions.create(&host, "Two Sum", "easy").await.unwrap();

    let joined = h.sessions.join(&host, session.id).await.unwrap();
    assert_eq!(joined.participant.unwrap().id, host.id);
}

#[tokio::test]
async fn missing_sessions_are_not_found() {
    let h = harness().await;
    let user = h.user("someone").await;
    let id = Uuid::now_v7();

    assert!(matches!(h.sessions.get(id).await, Err(AppError::NotFound(_))));
    assert!(matches!(h.sessions.join(&user, id).await, Err(AppError::NotFound(_))));
    assert!(matches!(h.sessions.end(&user, id).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn non_host_end_leaves_session_untouched() {
    let h = harness().await;
    let host = h.user("host").await;
    let guest = h.user("guest").await;
    let session = h.sessions.create(&host, "Two Sum", "easy").await.unwrap();
    h.sessions.join(&guest, session.id).await.unwrap();
    let before = h.sessions.get(session.id).await.unwrap();

    assert!(matches!(h.sessions.end(&guest, session.id).await, Err(AppError::Forbidden(_))));

    let after = h.sessions.get(session.id).await.unwrap();
    assert_eq!(after.status, SessionStatus::Active);
    assert_eq!(after.updated_at, before.updated_at);
    assert_eq!(h.platform.count("delete_"), 0);
}

#[tokio::test]
async fn teardown_failure_is_reported_but_session_stays_completed() {
    let h = harness().await;
    let host = h.user("host").await;
    let session = h.sessions.create(&host, "Two Sum", "easy").await.unwrap();
    h.platform.fail_teardown.store(true, Ordering::SeqCst);

    assert!(matches!(h.sessions.end(&host, session.id).await, Err(AppError::Teardown(_))));
    assert_eq!(h.sessions.get(session.id).await.unwrap().status, SessionStatus::Completed);
    assert!(matches!(h.sessions.end(&host, session.id).await, Err(AppError::InvalidState(_))));

    h.platform.fail_teardown.store(false, Ordering::SeqCst);
    let report = reconcile::sweep(&h.sessions, Duration::ZERO).await.unwrap();
    assert_eq!(report.released, 1);
    assert_eq!(h.platform.count(&format!("delete_call {}", session.call_id)), 1);
    assert_eq!(h.sessions.get(session.id).await.unwrap().status, SessionStatus::Completed);
}

#[tokio::test]
async fn listings_filter_by_status_and_membership() {
    let h = harness().await;
    let alice = h.user("alice").await;
    let bob = h.user("bob").await;
    let carol = h.user("carol").await;

    let hosted = h.sessions.create(&alice, "Two Sum", "easy").await.unwrap();
    let joined = h.sessions.create(&carol, "Valid Parentheses", "easy").await.unwrap();
    let unrelated = h.sessions.create(&carol, "Merge Intervals", "medium").await.unwrap();
    let still_active = h.sessions.create(&alice, "Word Ladder", "hard").await.unwrap();

    h.sessions.join(&alice, joined.id).await.unwrap();
    h.sessions.join(&bob, unrelated.id).await.unwrap();
    for (host, id) in [(&alice, hosted.id), (&carol, joined.id), (&carol, unrelated.id)] {
        h.sessions.end(host, id).await.unwrap();
    }

    let active = h.sessions.list_active().await.unwrap();
    assert_eq!(active.iter().map(|s| s.id).collect::<Vec<_>>(), vec![still_active.id]);
    assert!(active.iter().all(|s| s.status == SessionStatus::Active));

    let recent = h.sessions.list_recent(&alice).await.unwrap();
    assert_eq!(recent.iter().map(|s| s.id).collect::<Vec<_>>(), vec![joined.id, hosted.id]);
    assert!(recent.iter().all(|s| s.status == SessionStatus::Completed));

    let bob_recent = h.sessions.list_recent(&bob).await.unwrap();
    assert_eq!(bob_recent.iter().map(|s| s.id).collect::<Vec<_>>(), vec![unrelated.id]);
}

#[tokio::test]
async fn active_listing_is_newest_first_and_capped() {
    let h = harness().await;
    let host = h.user("host").await;

    let mut created = Vec::new();
    for i in 0..(LIST_LIMIT + 5) {
        created.push(h.sessions.create(&host, &format!("Problem {i}"), "easy").await.unwrap().id);
    }

    let active = h.sessions.list_active().await.unwrap();
    assert_eq!(active.len(), LIST_LIMIT as usize);

    let expected: Vec<_> = created.iter().rev().take(LIST_LIMIT as usize).copied().collect();
    assert_eq!(active.iter().map(|s| s.id).collect::<Vec<_>>(), expected);

    let host_summary = active[0].host.as_ref().unwrap();
    assert_eq!(host_summary.name, "host");
    assert_eq!(host_summary.email, None);
}

#[tokio::test]
async fn detail_view_survives_host_deletion() {
    let h = harness().await;
    let host = h.user("host").await;
    let session = h.sessions.create(&host, "Two Sum", "easy").await.unwrap();

    let detailed = h.sessions.get(session.id).await.unwrap();
    assert_eq!(detailed.host.unwrap().email.as_deref(), Some("host@example.com"));

    interviewlab::users::delete_by_external_id(&h.db_pool, "ext_host").await.unwrap();
    assert!(h.sessions.get(session.id).await.unwrap().host.is_none());
}

#[tokio::test]
async fn membership_failure_still_holds_the_seat() {
    let h = harness().await;
    let host = h.user("host").await;
    let guest = h.user("guest").await;
    let other = h.user("other").await;
    let session = h.sessions.create(&host, "Two Sum", "easy").await.unwrap();
    h.platform.fail_membership.store(true, Ordering::SeqCst);

    assert!(matches!(h.sessions.join(&guest, session.id).await, Err(AppError::Provisioning(_))));
    assert_eq!(h.sessions.get(session.id).await.unwrap().participant.unwrap().id, guest.id);
    assert!(matches!(h.sessions.join(&other, session.id).await, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn hanging_provisioning_times_out_and_leaves_the_session_pending() {
    let h = harness_with_timeout(Duration::from_millis(200)).await;
    let host = h.user("host").await;
    h.platform.hang_provisioning.store(true, Ordering::SeqCst);

    let started = Instant::now();
    let err = h.sessions.create(&host, "Two Sum", "easy").await.unwrap_err();
    assert!(matches!(err, AppError::Provisioning(_)), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));

    let active = h.sessions.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(h.platform.count("create_"), 0);

    h.platform.hang_provisioning.store(false, Ordering::SeqCst);
    let report = reconcile::sweep(&h.sessions, Duration::ZERO).await.unwrap();
    assert_eq!((report.provisioned, report.failed), (1, 0));
    assert_eq!(h.platform.count(&format!("create_call {}", active[0].call_id)), 1);
}

#[tokio::test]
async fn hanging_teardown_times_out_and_leaves_the_session_completed() {
    let h = harness_with_timeout(Duration::from_millis(200)).await;
    let host = h.user("host").await;
    let session = h.sessions.create(&host, "Two Sum", "easy").await.unwrap();
    h.platform.hang_teardown.store(true, Ordering::SeqCst);

    let started = Instant::now();
    let err = h.sessions.end(&host, session.id).await.unwrap_err();
    assert!(matches!(err, AppError::Teardown(_)), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(h.sessions.get(session.id).await.unwrap().status, SessionStatus::Completed);
    assert_eq!(h.platform.count("delete_call"), 0);

    h.platform.hang_teardown.store(false, Ordering::SeqCst);
    let report = reconcile::sweep(&h.sessions, Duration::ZERO).await.unwrap();
    assert_eq!((report.released, report.failed), (1, 0));
    assert_eq!(h.platform.count(&format!("delete_call {}", session.call_id)), 1);
}

#[tokio::test]
async fn pending_session_of_a_deleted_host_is_closed_by_the_sweep() {
    let h = harness().await;
    let host = h.user("host").await;
    h.platform.fail_provisioning.store(true, Ordering::SeqCst);
    let err = h.sessions.create(&host, "Two Sum", "easy").await.unwrap_err();
    assert!(matches!(err, AppError::Provisioning(_)));
    h.platform.fail_provisioning.store(false, Ordering::SeqCst);
    interviewlab::users::delete_by_external_id(&h.db_pool, "ext_host").await.unwrap();

    let first = reconcile::sweep(&h.sessions, Duration::ZERO).await.unwrap();
    assert_eq!((first.abandoned, first.provisioned, first.failed), (1, 0, 0));
    assert!(h.sessions.list_active().await.unwrap().is_empty());

    let second = reconcile::sweep(&h.sessions, Duration::ZERO).await.unwrap();
    assert_eq!(second.failed, 0);
    assert_eq!(first.released + second.released, 1);
    assert_eq!(
        reconcile::sweep(&h.sessions, Duration::ZERO).await.unwrap(),
        reconcile::SweepReport::default()
    );
    assert_eq!(h.platform.count("create_call"), 0);
}

#[tokio::test]
async fn enormous_grace_periods_never_select_anything() {
    let h = harness().await;
    let host = h.user("host").await;
    h.platform.fail_provisioning.store(true, Ordering::SeqCst);
    h.sessions.create(&host, "Two Sum", "easy").await.unwrap_err();
    h.platform.fail_provisioning.store(false, Ordering::SeqCst);

    let report = reconcile::sweep(&h.sessions, Duration::from_secs(u64::MAX)).await.unwrap();
    assert_eq!(report, reconcile::SweepReport::default());
}
