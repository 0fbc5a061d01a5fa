//! Integration tests for admission and state tracking.

use std::sync::Arc;
use std::time::Duration;
use taskexec::engine::{Tracker, WorkerPool};
use taskexec::error::{Error, Result};
use taskexec::model::{Statistics, TaskId, batch_from_secs};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

struct Harness {
    tracker: Arc<Tracker>,
    shutdown: CancellationToken,
    run: JoinHandle<Result<()>>,
}

/// Pool with `workers` workers, and a tracker whose loop is already live.
async fn start(capacity: usize, workers: usize) -> Harness {
    let pool = Arc::new(WorkerPool::new(capacity).unwrap());
    pool.spawn(workers);
    let tracker = Arc::new(Tracker::new(pool));
    let shutdown = CancellationToken::new();

    let run = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        let shutdown = shutdown.clone();
        async move { tracker.run(shutdown).await }
    });
    tracker.started().await;

    Harness {
        tracker,
        shutdown,
        run,
    }
}

fn ids(ids: &[&str]) -> Vec<TaskId> {
    ids.iter().map(|id| TaskId::from(*id)).collect()
}

fn assert_disjoint(stats: &Statistics) {
    for id in &stats.waiting {
        assert!(!stats.running.contains(id), "{id} is both waiting and running");
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn tasks_run_to_completion() {
    let h = start(10, 3).await;

    h.tracker
        .submit_batch(&batch_from_secs([("a", 5), ("b", 5), ("c", 5)]))
        .unwrap();

    sleep(Duration::from_millis(100)).await;
    let pool = h.tracker.pool();
    assert_eq!(pool.total_workers(), 3);
    assert_eq!(pool.active_workers(), 3);
    let stats = h.tracker.statistics();
    assert_eq!(stats.running, ids(&["a", "b", "c"]));
    assert!(stats.waiting.is_empty());

    sleep(Duration::from_secs(6)).await;
    assert_eq!(pool.active_workers(), 0);
    assert_eq!(h.tracker.statistics(), Statistics::default());
}

#[tokio::test(start_paused = true)]
async fn excess_tasks_wait_for_a_free_worker() {
    let h = start(10, 1).await;

    h.tracker
        .submit_batch(&batch_from_secs([("a", 2), ("b", 2), ("c", 2)]))
        .unwrap();

    let mut seen_running = Vec::new();
    for _ in 0..80 {
        let stats = h.tracker.statistics();
        assert_disjoint(&stats);
        assert!(stats.running.len() <= 1);
        for id in stats.running {
            if !seen_running.contains(&id) {
                seen_running.push(id);
            }
        }
        sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(seen_running, ids(&["a", "b", "c"]));
    assert_eq!(h.tracker.statistics(), Statistics::default());
}

#[tokio::test(start_paused = true)]
async fn zero_duration_task_is_cleared() {
    let h = start(4, 1).await;

    h.tracker.submit_batch(&batch_from_secs([("now", 0)])).unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(h.tracker.statistics(), Statistics::default());
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn duplicate_submission_is_a_noop() {
    let h = start(10, 2).await;

    let first = h.tracker.submit_batch(&batch_from_secs([("a", 5)])).unwrap();
    let second = h.tracker.submit_batch(&batch_from_secs([("a", 5)])).unwrap();
    assert_eq!(first.accepted, ids(&["a"]));
    assert!(second.accepted.is_empty());
    assert_eq!(second.skipped, ids(&["a"]));

    let stats = h.tracker.statistics();
    assert_eq!(
        stats.waiting.len() + stats.running.len(),
        1,
        "a tracked once: {stats:?}"
    );

    sleep(Duration::from_millis(100)).await;
    let again = h.tracker.submit_batch(&batch_from_secs([("a", 5)])).unwrap();
    assert_eq!(again.skipped, ids(&["a"]));
    assert_eq!(h.tracker.statistics().running, ids(&["a"]));
    assert_eq!(h.tracker.pool().active_workers(), 1);
}

#[tokio::test(start_paused = true)]
async fn completed_id_can_be_submitted_again() {
    let h = start(10, 1).await;

    h.tracker.submit_batch(&batch_from_secs([("a", 1)])).unwrap();
    sleep(Duration::from_secs(2)).await;
    assert_eq!(h.tracker.statistics(), Statistics::default());

    let admission = h.tracker.submit_batch(&batch_from_secs([("a", 1)])).unwrap();
    assert_eq!(admission.accepted, ids(&["a"]));
}

#[tokio::test]
async fn over_capacity_batch_keeps_earlier_ids() {
    let h = start(2, 0).await;

    let result = h
        .tracker
        .submit_batch(&batch_from_secs([("x", 1), ("y", 1), ("z", 1)]));

    assert!(matches!(result, Err(Error::CapacityExceeded)));
    let stats = h.tracker.statistics();
    assert_eq!(stats.waiting, ids(&["x", "y"]));
    assert!(stats.running.is_empty());
    assert_eq!(h.tracker.pool().queued(), 2);
}

#[tokio::test]
async fn submit_after_pool_stopped_fails() {
    let h = start(4, 1).await;
    h.tracker.pool().stop();

    let result = h.tracker.submit_batch(&batch_from_secs([("a", 1)]));
    assert!(matches!(result, Err(Error::Stopped)));
    assert_eq!(h.tracker.statistics(), Statistics::default());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_id_is_never_reported_as_tracked() {
    let h = start(1, 0).await;
    h.tracker.submit_batch(&batch_from_secs([("fill", 1)])).unwrap();

    // Every racer hits the full queue. None may see "x" as already
    // tracked, since it is never queued.
    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..500 {
                    let result = h.tracker.submit_batch(&batch_from_secs([("x", 1)]));
                    assert!(
                        matches!(result, Err(Error::CapacityExceeded)),
                        "x admitted or skipped: {result:?}"
                    );
                }
            });
        }
    });

    assert_eq!(h.tracker.statistics().waiting, ids(&["fill"]));
    assert_eq!(h.tracker.pool().queued(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_duplicates_are_admitted_once() {
    let h = start(16, 0).await;

    let accepted = std::thread::scope(|scope| {
        let racers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| h.tracker.submit_batch(&batch_from_secs([("x", 1)]))))
            .collect();
        racers
            .into_iter()
            .map(|racer| racer.join().unwrap().unwrap().accepted.len())
            .sum::<usize>()
    });

    assert_eq!(accepted, 1);
    assert_eq!(h.tracker.statistics().waiting, ids(&["x"]));
    assert_eq!(h.tracker.pool().queued(), 1);
}

#[tokio::test]
async fn submit_before_run_is_rejected() {
    let pool = Arc::new(WorkerPool::new(4).unwrap());
    let tracker = Tracker::new(pool);

    let result = tracker.submit_batch(&batch_from_secs([("a", 1)]));
    assert!(matches!(result, Err(Error::NotRunning)));
    assert_eq!(tracker.statistics(), Statistics::default());
}

// ---------------------------------------------------------------------------
// Run loop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn started_waits_for_the_loop() {
    let pool = Arc::new(WorkerPool::new(4).unwrap());
    let tracker = Arc::new(Tracker::new(pool));

    let waiter = tokio::spawn({
        let tracker = Arc::clone(&tracker);
        async move { tracker.started().await }
    });
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let tracker = Arc::clone(&tracker);
        let shutdown = shutdown.clone();
        async move { tracker.run(shutdown).await }
    });

    tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("started() never resolved")
        .unwrap();
    assert!(tracker.is_running());

    // Already running: resolves at once.
    tracker.started().await;
    shutdown.cancel();
}

#[tokio::test]
async fn second_run_is_rejected() {
    let h = start(4, 1).await;

    let result = h.tracker.run(CancellationToken::new()).await;
    assert!(matches!(result, Err(Error::AlreadyRunning)));
}

#[tokio::test]
async fn cancellation_ends_the_loop() {
    let h = start(4, 1).await;

    h.shutdown.cancel();
    let result = h.run.await.unwrap();
    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn cancellation_releases_in_flight_tasks() {
    let h = start(4, 2).await;
    h.tracker
        .submit_batch(&batch_from_secs([("long", 3600), ("longer", 7200)]))
        .unwrap();
    sleep(Duration::from_millis(100)).await;
    assert_eq!(h.tracker.pool().active_workers(), 2);

    h.shutdown.cancel();
    assert!(matches!(h.run.await.unwrap(), Err(Error::Cancelled)));

    // The tasks wake on the same token instead of waiting out their duration.
    assert!(h.tracker.pool().shutdown(Duration::from_secs(1)).await);
    assert_eq!(h.tracker.pool().total_workers(), 0);
    assert_eq!(h.tracker.pool().active_workers(), 0);
}

#[tokio::test(start_paused = true)]
async fn tasks_drained_after_loop_exit_do_not_block() {
    let h = start(4, 0).await;
    h.tracker
        .submit_batch(&batch_from_secs([("a", 3600), ("b", 3600)]))
        .unwrap();

    h.shutdown.cancel();
    assert!(matches!(h.run.await.unwrap(), Err(Error::Cancelled)));

    // Queued tasks still run once workers appear; every event they emit
    // is discarded and counted rather than waited on.
    let pool = h.tracker.pool();
    pool.spawn(2);
    assert!(pool.shutdown(Duration::from_secs(1)).await);
    assert_eq!(h.tracker.dropped_events(), 4);
}

#[tokio::test]
async fn submit_after_shutdown_is_rejected() {
    let h = start(4, 1).await;
    h.shutdown.cancel();

    let result = h.tracker.submit_batch(&batch_from_secs([("a", 1)]));
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(h.tracker.statistics(), Statistics::default());
}
