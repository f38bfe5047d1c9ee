//! Integration tests for the scheduling engine
//!
//! These tests drive the public engine API over the in-memory store:
//! - Availability over day and overnight shifts
//! - Allocation, task reuse, detach and capacity
//! - Reschedule cap
//! - Batch reconciliation with pending overwrite sessions
//! - Auto-scheduling and roster queries

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{config_with_capacity, day_worker, harness, june, night_worker, now};
use shiftline::models::{BatchProposal, Job, JobStatus, Leave};
use shiftline::scheduler::SchedulerError;
use shiftline::storage::SchedulingStore;
use tokio::task::JoinSet;

fn job(id: &str) -> Job {
    Job::new(id, format!("DEV-{id}"), "Upgrade", now())
}

fn proposal(device: &str, at: Option<chrono::DateTime<chrono::Utc>>, worker: &str) -> BatchProposal {
    BatchProposal {
        device_id: device.to_string(),
        scheduled_time: at,
        assigned_worker: worker.to_string(),
        contact: Some(format!("{}@example.com", device.to_lowercase())),
    }
}

// ============================================================================
// Availability
// ============================================================================

#[tokio::test]
async fn test_day_shift_windows() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let slots = h
        .engine
        .find_available_windows(june(2, 0), june(3, 0), "Upgrade")
        .await
        .unwrap();

    // 16:00-20:00 runs past the 17:00 shift end
    assert_eq!(slots, vec![june(2, 8), june(2, 12)]);
}

#[tokio::test]
async fn test_overnight_shift_windows() {
    let h = harness(config_with_capacity(5), vec![night_worker("n1")]).await;

    let slots = h
        .engine
        .find_available_windows(june(2, 0), june(3, 0), "Upgrade")
        .await
        .unwrap();

    assert_eq!(slots, vec![june(2, 0)]);
}

#[tokio::test]
async fn test_windows_not_after_now_are_skipped() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;
    h.clock.set(june(1, 9));

    let slots = h
        .engine
        .find_available_windows(june(1, 0), june(2, 0), "Upgrade")
        .await
        .unwrap();

    assert_eq!(slots, vec![june(1, 12)]);
}

#[tokio::test]
async fn test_unknown_skill_has_no_windows() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let slots = h
        .engine
        .find_available_windows(june(2, 0), june(3, 0), "Fiber")
        .await
        .unwrap();

    assert!(slots.is_empty());
}

#[tokio::test]
async fn test_leave_removes_window() {
    let worker = day_worker("w1").with_leave(Leave::new("VACATION", june(2, 8), june(2, 12)));
    let h = harness(config_with_capacity(5), vec![worker]).await;

    let slots = h
        .engine
        .find_available_windows(june(2, 0), june(3, 0), "Upgrade")
        .await
        .unwrap();

    assert_eq!(slots, vec![june(2, 12)]);
}

// ============================================================================
// Allocation
// ============================================================================

#[tokio::test]
async fn test_least_loaded_worker_wins() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1"), day_worker("w2")]).await;

    let mut a = job("a");
    let mut b = job("b");
    let task_a = h.engine.allocate(&mut a, june(2, 8), "Upgrade").await.unwrap();
    let task_b = h.engine.allocate(&mut b, june(2, 8), "Upgrade").await.unwrap();

    // Equal load falls to the lowest worker id
    assert_eq!(task_a.worker_id, "w1");
    assert_eq!(task_b.worker_id, "w2");
    assert_eq!(a.status, JobStatus::Scheduled);
    assert_eq!(a.scheduled_time, Some(june(2, 8)));
    assert_eq!(a.assigned_worker.as_deref(), Some("w1"));
}

#[tokio::test]
async fn test_same_window_reuses_task() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let mut a = job("a");
    let mut b = job("b");
    let first = h.engine.allocate(&mut a, june(2, 8), "Upgrade").await.unwrap();
    let second = h.engine.allocate(&mut b, june(2, 8), "Upgrade").await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.workflow_count(), 2);
    assert_eq!(h.store.task_count().await, 1);
}

#[tokio::test]
async fn test_reallocation_detaches_and_deletes_empty_task() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let mut a = job("a");
    let old = h.engine.allocate(&mut a, june(2, 8), "Upgrade").await.unwrap();
    let new = h.engine.allocate(&mut a, june(2, 12), "Upgrade").await.unwrap();

    assert_ne!(old.id, new.id);
    assert_eq!(a.task_id, Some(new.id));
    assert!(h.store.find_task(old.id).await.unwrap().is_none());
    assert_eq!(h.store.task_count().await, 1);
}

#[tokio::test]
async fn test_capacity_ceiling() {
    let h = harness(config_with_capacity(2), vec![day_worker("w1")]).await;

    for id in ["a", "b"] {
        let mut j = job(id);
        h.engine.allocate(&mut j, june(2, 8), "Upgrade").await.unwrap();
    }

    let mut c = job("c");
    let err = h.engine.allocate(&mut c, june(2, 8), "Upgrade").await.unwrap_err();
    assert!(matches!(err, SchedulerError::NoCapacity { .. }));
    assert!(c.task_id.is_none());

    let slots = h
        .engine
        .find_available_windows(june(2, 0), june(3, 0), "Upgrade")
        .await
        .unwrap();
    assert_eq!(slots, vec![june(2, 12)]);
}

#[tokio::test]
async fn test_past_time_rejected() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let mut a = job("a");
    let err = h.engine.allocate(&mut a, now(), "Upgrade").await.unwrap_err();
    assert!(matches!(err, SchedulerError::PastTime { .. }));
}

#[tokio::test]
async fn test_concurrent_allocations_respect_capacity() {
    let h = harness(config_with_capacity(3), vec![day_worker("w1"), day_worker("w2")]).await;

    let mut set = JoinSet::new();
    for i in 0..10 {
        let engine = Arc::clone(&h.engine);
        set.spawn(async move {
            let mut j = job(&format!("c{i}"));
            engine.allocate(&mut j, june(2, 8), "Upgrade").await
        });
    }

    let mut ok = 0;
    let mut full = 0;
    while let Some(result) = set.join_next().await {
        match result.unwrap() {
            Ok(_) => ok += 1,
            Err(SchedulerError::NoCapacity { .. }) => full += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ok, 6);
    assert_eq!(full, 4);
    for task in h.store.all_tasks().await {
        assert!(task.workflow_count() <= 3);
    }
}

// ============================================================================
// Reschedule
// ============================================================================

#[tokio::test]
async fn test_reschedule_cap() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let mut a = job("a");
    h.engine.allocate(&mut a, june(2, 8), "Upgrade").await.unwrap();

    for day in 3..6 {
        let task = h.engine.reschedule("a", june(day, 8)).await.unwrap();
        assert_eq!(task.start, june(day, 8));
    }

    let err = h.engine.reschedule("a", june(6, 8)).await.unwrap_err();
    match err {
        SchedulerError::RescheduleLimit { count, max, .. } => {
            assert_eq!(count, 3);
            assert_eq!(max, 3);
        }
        other => panic!("unexpected: {other:?}"),
    }

    let stored = h.store.find_job("a").await.unwrap().unwrap();
    assert_eq!(stored.reschedule_count, 3);
    assert_eq!(stored.scheduled_time, Some(june(5, 8)));
}

#[tokio::test]
async fn test_failed_reschedule_does_not_count() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let mut a = job("a");
    h.engine.allocate(&mut a, june(2, 8), "Upgrade").await.unwrap();

    let err = h.engine.reschedule("a", june(1, 4)).await.unwrap_err();
    assert!(matches!(err, SchedulerError::PastTime { .. }));

    // No worker covers 20:00
    let err = h.engine.reschedule("a", june(3, 20)).await.unwrap_err();
    assert!(matches!(err, SchedulerError::NoCapacity { .. }));

    let stored = h.store.find_job("a").await.unwrap().unwrap();
    assert_eq!(stored.reschedule_count, 0);
    assert_eq!(stored.scheduled_time, Some(june(2, 8)));
}

#[tokio::test]
async fn test_reschedule_unknown_job() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let err = h.engine.reschedule("missing", june(3, 8)).await.unwrap_err();
    assert!(matches!(err, SchedulerError::EntityNotFound { .. }));
}

// ============================================================================
// Batch Reconciliation
// ============================================================================

#[tokio::test]
async fn test_batch_creates_and_allocates_new_jobs() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1"), day_worker("w2")]).await;

    let outcome = h
        .engine
        .reconcile_batch(&[
            proposal("DEV-1", Some(june(20, 8)), "w2"),
            proposal("DEV-2", None, "w1"),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.new.len(), 2);
    assert!(outcome.failed.is_empty());
    assert!(outcome.pending_session_id.is_none());

    let dev1 = &outcome.new[0];
    let task = h.store.find_task(dev1.task_id.unwrap()).await.unwrap().unwrap();
    assert_eq!(task.worker_id, "w2");
    assert_eq!(dev1.scheduled_time, Some(june(20, 8)));

    assert!(outcome.new[1].task_id.is_none());
}

#[tokio::test]
async fn test_batch_rejects_invalid_rows() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let mut bad = proposal("DEV-1", None, "w1");
    bad.contact = Some("nope".to_string());

    let err = h.engine.reconcile_batch(&[bad]).await.unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidBatch { .. }));
    assert_eq!(h.store.job_count().await, 0);
}

#[tokio::test]
async fn test_batch_classifies_existing_jobs_and_confirms() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1"), day_worker("w2")]).await;

    h.engine
        .reconcile_batch(&[
            proposal("DEV-1", Some(june(20, 8)), "w1"),
            proposal("DEV-2", Some(june(2, 8)), "w1"),
            proposal("DEV-4", None, "w1"),
        ])
        .await
        .unwrap();

    let outcome = h
        .engine
        .reconcile_batch(&[
            proposal("DEV-1", Some(june(21, 8)), "w1"),
            proposal("DEV-2", Some(june(3, 12)), "w1"),
            proposal("DEV-3", None, "w1"),
            proposal("DEV-4", None, "w1"),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.new.len(), 1);
    assert_eq!(outcome.new[0].device_id, "DEV-3");
    assert_eq!(outcome.duplicates, 1);
    assert_eq!(outcome.blocked.len(), 1);
    assert_eq!(outcome.blocked[0].device_id, "DEV-2");
    assert_eq!(outcome.conflicts.len(), 1);
    assert_eq!(outcome.conflicts[0].device_id, "DEV-1");

    let session_id = outcome.pending_session_id.unwrap();
    assert!(h.engine.pending_session(session_id).await.is_some());

    let confirmed = h.engine.confirm_overwrites(session_id).await.unwrap();
    assert_eq!(confirmed.applied.len(), 1);
    assert!(confirmed.failed.is_empty());

    let job_id = &confirmed.applied[0].job_id;
    let job = h.store.find_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.scheduled_time, Some(june(21, 8)));
    assert_eq!(job.status, JobStatus::Overwritten);

    let updates = h.notifier.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].device_id, "DEV-1");
    assert_eq!(updates[0].scheduled_time, Some(june(21, 8)));
    assert_eq!(updates[0].pre_upgrade_time, Some(june(14, 8)));

    let err = h.engine.confirm_overwrites(session_id).await.unwrap_err();
    assert!(matches!(err, SchedulerError::SessionNotFound { .. }));
}

#[tokio::test]
async fn test_confirmed_worker_change_is_required() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1"), day_worker("w2")]).await;

    h.engine
        .reconcile_batch(&[proposal("DEV-1", Some(june(20, 8)), "w1")])
        .await
        .unwrap();

    let outcome = h
        .engine
        .reconcile_batch(&[proposal("DEV-1", Some(june(20, 8)), "w2")])
        .await
        .unwrap();
    let session_id = outcome.pending_session_id.unwrap();

    let confirmed = h.engine.confirm_overwrites(session_id).await.unwrap();
    let task_id = confirmed.applied[0].task_id.unwrap();
    let task = h.store.find_task(task_id).await.unwrap().unwrap();
    assert_eq!(task.worker_id, "w2");
}

#[tokio::test]
async fn test_session_expires_after_ttl() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1"), day_worker("w2")]).await;

    h.engine
        .reconcile_batch(&[proposal("DEV-1", Some(june(20, 8)), "w1")])
        .await
        .unwrap();

    let conflicting = [proposal("DEV-1", Some(june(21, 8)), "w1")];

    // Expired on confirm
    let first = h.engine.reconcile_batch(&conflicting).await.unwrap();
    h.clock.advance(Duration::seconds(181));
    let err = h
        .engine
        .confirm_overwrites(first.pending_session_id.unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulerError::SessionExpired { .. }));

    // Expired by the sweep first
    let second = h.engine.reconcile_batch(&conflicting).await.unwrap();
    let session_id = second.pending_session_id.unwrap();
    h.clock.advance(Duration::seconds(181));
    assert_eq!(h.engine.sessions().sweep().await, 1);
    assert!(h.engine.pending_session(session_id).await.is_none());

    let err = h.engine.confirm_overwrites(session_id).await.unwrap_err();
    assert!(matches!(err, SchedulerError::SessionExpired { .. }));

    let job = h.store.find_active_jobs_by_devices(&["DEV-1".to_string()]).await.unwrap();
    assert_eq!(job[0].scheduled_time, Some(june(20, 8)));
}

// ============================================================================
// Auto-schedule and Roster
// ============================================================================

#[tokio::test]
async fn test_auto_schedule_picks_first_window_after_lead() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;
    h.store.save_job(&job("a")).await.unwrap();

    let task = h.engine.auto_schedule("a").await.unwrap();

    // now + 30 days is 2025-07-01 06:00; the first covered window is 08:00
    let expected = now() + Duration::days(30) + Duration::hours(2);
    assert_eq!(task.start, expected);

    let updates = h.notifier.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].pre_upgrade_time, Some(expected - Duration::days(7)));
}

#[tokio::test]
async fn test_auto_schedule_without_workers() {
    let h = harness(config_with_capacity(5), vec![]).await;
    h.store.save_job(&job("a")).await.unwrap();

    let err = h.engine.auto_schedule("a").await.unwrap_err();
    assert!(matches!(err, SchedulerError::NoCapacity { .. }));
}

#[tokio::test]
async fn test_roster_lists_active_workers_with_tasks() {
    let inactive = day_worker("w3").with_active(false);
    let h = harness(
        config_with_capacity(1),
        vec![day_worker("w1"), day_worker("w2"), inactive],
    )
    .await;

    for id in ["a", "b"] {
        let mut j = job(id);
        h.engine.allocate(&mut j, june(2, 8), "Upgrade").await.unwrap();
    }

    let roster = h.engine.roster(june(2, 0), june(3, 0)).await.unwrap();
    let ids: Vec<&str> = roster.iter().map(|s| s.worker.id.as_str()).collect();
    assert_eq!(ids, vec!["w1", "w2"]);
    assert!(roster.iter().all(|s| s.total_jobs() == 1));
}

#[tokio::test]
async fn test_background_sweeper_expires_sessions() {
    let mut config = config_with_capacity(5);
    config.sessions.sweep_interval_secs = 1;
    let h = harness(config, vec![day_worker("w1")]).await;

    h.engine
        .reconcile_batch(&[proposal("DEV-1", Some(june(20, 8)), "w1")])
        .await
        .unwrap();
    let outcome = h
        .engine
        .reconcile_batch(&[proposal("DEV-1", Some(june(21, 8)), "w1")])
        .await
        .unwrap();
    assert!(outcome.pending_session_id.is_some());
    assert_eq!(h.engine.sessions().len().await, 1);

    let mut sweeper = h.engine.sweeper();
    sweeper.start();
    assert!(sweeper.is_running());

    h.clock.advance(Duration::seconds(181));
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    assert!(h.engine.sessions().is_empty().await);

    sweeper.stop().await;
    assert!(!sweeper.is_running());
}

#[tokio::test]
async fn test_night_worker_takes_windows_across_midnight() {
    let h = harness(config_with_capacity(5), vec![night_worker("n1")]).await;

    let mut late = job("late");
    let task = h.engine.allocate(&mut late, june(2, 23), "Upgrade").await.unwrap();
    assert_eq!(task.worker_id, "n1");
    assert_eq!(task.end, june(3, 3));

    // Covered by the shift that began at 22:00 on June 2
    let mut early = job("early");
    let task = h.engine.allocate(&mut early, june(3, 1), "Upgrade").await.unwrap();
    assert_eq!(task.worker_id, "n1");

    // 04:00-08:00 runs past the 06:00 shift end
    let mut spill = job("spill");
    let err = h.engine.allocate(&mut spill, june(3, 4), "Upgrade").await.unwrap_err();
    assert!(matches!(err, SchedulerError::NoCapacity { .. }));
}

#[tokio::test]
async fn test_reschedule_notifies_process_and_marks_job() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    let mut a = job("a");
    h.engine.allocate(&mut a, june(10, 8), "Upgrade").await.unwrap();
    assert!(h.notifier.updates().is_empty());

    h.engine.reschedule("a", june(12, 12)).await.unwrap();

    let stored = h.store.find_job("a").await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Rescheduled);

    let updates = h.notifier.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].job_id, "a");
    assert_eq!(updates[0].scheduled_time, Some(june(12, 12)));
    assert_eq!(updates[0].pre_upgrade_time, Some(june(12, 12) - Duration::days(7)));
    assert_eq!(updates[0].assigned_worker.as_deref(), Some("w1"));

    // A rejected reschedule sends nothing
    h.engine.reschedule("a", june(1, 4)).await.unwrap_err();
    assert_eq!(h.notifier.updates().len(), 1);
}

#[tokio::test]
async fn test_locks_released_after_reschedule_and_confirm() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1"), day_worker("w2")]).await;

    h.engine
        .reconcile_batch(&[proposal("DEV-1", Some(june(20, 8)), "w1")])
        .await
        .unwrap();
    let job_id = h
        .store
        .find_active_jobs_by_devices(&["DEV-1".to_string()])
        .await
        .unwrap()[0]
        .id
        .clone();

    h.engine.reschedule(&job_id, june(21, 8)).await.unwrap();
    assert_eq!(h.engine.tracked_locks(), 0);

    let outcome = h
        .engine
        .reconcile_batch(&[proposal("DEV-1", Some(june(21, 8)), "w2")])
        .await
        .unwrap();
    h.engine
        .confirm_overwrites(outcome.pending_session_id.unwrap())
        .await
        .unwrap();
    assert_eq!(h.engine.tracked_locks(), 0);
}

#[tokio::test]
async fn test_timed_out_session_stays_expired_on_retry() {
    let h = harness(config_with_capacity(5), vec![day_worker("w1")]).await;

    h.engine
        .reconcile_batch(&[proposal("DEV-1", Some(june(20, 8)), "w1")])
        .await
        .unwrap();
    let outcome = h
        .engine
        .reconcile_batch(&[proposal("DEV-1", Some(june(21, 8)), "w1")])
        .await
        .unwrap();
    let session_id = outcome.pending_session_id.unwrap();

    h.clock.advance(Duration::minutes(4));
    for _ in 0..2 {
        let err = h.engine.confirm_overwrites(session_id).await.unwrap_err();
        assert!(matches!(err, SchedulerError::SessionExpired { .. }));
    }
}
