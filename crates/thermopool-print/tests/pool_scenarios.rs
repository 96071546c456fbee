// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end behaviour of `PrinterPool` against a scripted transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

use thermopool_core::error::{PoolError, Result};
use thermopool_core::types::PrinterId;
use thermopool_core::{JobId, JobKind, JobMetadata, PoolConfig, PrintRow};
use thermopool_print::journal::JobJournal;
use thermopool_print::transport::mock::ScriptedTransport;
use thermopool_print::{DispatchOutcome, OutboundJob, PoolEvent, PrinterPool, PrinterTransport};

fn config() -> PoolConfig {
    PoolConfig {
        settle_after_print: false,
        ..Default::default()
    }
}

fn pool_with(config: PoolConfig) -> (Arc<ScriptedTransport>, PrinterPool) {
    let transport = Arc::new(ScriptedTransport::new());
    (transport.clone(), PrinterPool::new(config, transport))
}

fn pool() -> (Arc<ScriptedTransport>, PrinterPool) {
    pool_with(config())
}

fn receipt() -> JobMetadata {
    JobMetadata::new(JobKind::Receipt)
}

async fn queue(pool: &PrinterPool, printer: &str, text: &str) -> thermopool_core::JobId {
    pool.submit(printer, vec![PrintRow::text(text)], &receipt())
        .await
        .queued_job()
        .expect("submit should queue")
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (_transport, pool) = pool_with(PoolConfig {
        journal_path: Some(dir.path().join("pending.db")),
        ..config()
    });

    assert!(pool.initialize().await);
    queue(&pool, "10.0.0.5", "Hi").await;
    assert!(pool.initialize().await);
    assert!(pool.is_initialized().await);
    // Restore ran once.
    assert_eq!(pool.pending_jobs().len(), 1);
}

#[tokio::test]
async fn initialize_failure_is_retryable() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Parent directory does not exist.
    let (_transport, pool) = pool_with(PoolConfig {
        journal_path: Some(dir.path().join("missing").join("pending.db")),
        ..config()
    });
    assert!(!pool.initialize().await);
    assert!(!pool.is_initialized().await);
    assert!(!pool.initialize().await);
}

#[tokio::test]
async fn add_printer_twice_keeps_one_entry() {
    let (transport, pool) = pool();
    transport.set_reachable("10.0.0.5", true);

    assert!(pool.add_printer("10.0.0.5").await);
    assert!(pool.add_printer("10.0.0.5").await);

    let status = pool.list_status();
    assert_eq!(status.len(), 1);
    assert!(status[0].is_reachable);
    assert_eq!(status[0].printer_name, "PrinterName_10.0.0.5");
    assert_eq!(transport.connect_count("10.0.0.5"), 2);
}

#[tokio::test]
async fn failed_add_still_registers() {
    let (_transport, pool) = pool();
    assert!(!pool.add_printer("10.0.0.5").await);

    let status = pool.list_status();
    assert_eq!(status.len(), 1);
    assert!(!status[0].is_reachable);
    assert!(pool.remove_printer("10.0.0.5"));
    assert!(!pool.remove_printer("10.0.0.5"));
}

#[tokio::test]
async fn failed_submit_queues_and_marks_unreachable() {
    let (transport, pool) = pool();
    transport.set_reachable("10.0.0.5", true);
    assert!(pool.add_printer("10.0.0.5").await);
    transport.set_reachable("10.0.0.5", false);

    let rows = vec![PrintRow::text("Flat white"), PrintRow::Cut];
    let outcome = pool.submit("10.0.0.5", rows.clone(), &receipt()).await;
    assert!(matches!(outcome, DispatchOutcome::Queued { retry_count: 0, .. }));

    let queued = pool.pending_jobs_for_printer("10.0.0.5");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].rows, rows);
    assert_eq!(queued[0].metadata.kind, JobKind::Receipt);
    assert_eq!(queued[0].printer_name, "PrinterName_10.0.0.5");
    assert!(!pool.list_status()[0].is_reachable);
}

#[tokio::test]
async fn one_malformed_job_empties_the_listing() {
    let (_transport, pool) = pool();
    queue(&pool, "10.0.0.5", "good").await;
    let bad = pool
        .submit_blob("10.0.0.5", vec![PrintRow::text("bad")], "{\"order\":1}".into())
        .await;
    assert!(bad.queued_job().is_some());

    assert!(pool.pending_jobs().is_empty());
    assert!(pool.pending_jobs_for_printer("10.0.0.5").is_empty());
    assert!(matches!(
        pool.try_pending_jobs(),
        Err(PoolError::MalformedMetadata { .. })
    ));
}

#[tokio::test]
async fn reroute_keeps_payload_and_counts_the_retry() {
    let (_transport, pool) = pool();
    let rows = vec![PrintRow::text("Table 12"), PrintRow::Feed { lines: 2 }];
    let job_id = pool
        .submit("10.0.0.5", rows.clone(), &receipt())
        .await
        .queued_job()
        .expect("queued");

    let outcome = pool.reroute_job(&job_id, "10.0.0.6").await;
    assert!(matches!(outcome, DispatchOutcome::Queued { retry_count: 1, .. }));

    assert!(pool.pending_jobs_for_printer("10.0.0.5").is_empty());
    let moved = pool.pending_jobs_for_printer("10.0.0.6");
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].job_id, job_id);
    assert_eq!(moved[0].rows, rows);
    assert_eq!(moved[0].retry_count, 1);
    assert!(moved[0].last_error.is_some());
}

#[tokio::test]
async fn reroute_of_unknown_job_is_rejected() {
    let (_transport, pool) = pool();
    let outcome = pool
        .reroute_job(&thermopool_core::JobId::new(), "10.0.0.6")
        .await;
    assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
}

#[tokio::test]
async fn reconnect_flushes_the_queue() {
    let (transport, pool) = pool();
    let first = queue(&pool, "10.0.0.5", "one").await;
    let second = queue(&pool, "10.0.0.5", "two").await;

    transport.set_reachable("10.0.0.5", true);
    assert!(pool.reconnect("10.0.0.5").await);

    let sent: Vec<_> = transport
        .delivered_to("10.0.0.5")
        .into_iter()
        .map(|job| job.job_id)
        .collect();
    assert_eq!(sent, vec![Some(first), Some(second)]);
    assert!(pool.pending_jobs().is_empty());
    assert!(pool.list_status()[0].is_reachable);
}

#[tokio::test]
async fn reconnect_leaves_failures_queued() {
    let (transport, pool) = pool();
    queue(&pool, "10.0.0.5", "one").await;
    queue(&pool, "10.0.0.5", "two").await;

    transport.set_reachable("10.0.0.5", true);
    transport.reject_sends("10.0.0.5", true);
    assert!(pool.reconnect("10.0.0.5").await);

    let left = pool.pending_jobs_for_printer("10.0.0.5");
    assert_eq!(left.len(), 2);
    assert!(left.iter().all(|job| job.retry_count == 1));
}

#[tokio::test]
async fn failed_reconnect_sends_nothing() {
    let (transport, pool) = pool();
    queue(&pool, "10.0.0.5", "one").await;
    assert!(!pool.reconnect("10.0.0.5").await);
    assert!(transport.delivered().is_empty());
    assert_eq!(pool.pending_jobs().len(), 1);
}

#[tokio::test]
async fn offline_printer_job_rerouted_to_backup() {
    let (transport, pool) = pool();
    transport.set_reachable("10.0.0.6", true);

    assert!(!pool.add_printer("10.0.0.5").await);
    assert!(!pool.list_status()[0].is_reachable);

    let metadata = JobMetadata::parse(r#"{"type":"Receipt"}"#).expect("metadata");
    let j1 = pool
        .submit("10.0.0.5", vec![PrintRow::text("Hi")], &metadata)
        .await
        .queued_job()
        .expect("queued");
    let for_five: Vec<_> = pool
        .pending_jobs_for_printer("10.0.0.5")
        .into_iter()
        .map(|job| job.job_id)
        .collect();
    assert_eq!(for_five, vec![j1]);

    assert!(pool.reroute_job(&j1, "10.0.0.6").await.is_delivered());

    assert!(pool.pending_jobs_for_printer("10.0.0.5").is_empty());
    assert!(pool.pending_jobs_for_printer("10.0.0.6").is_empty());
    assert!(pool.pending_jobs().iter().all(|job| job.job_id != j1));
    assert_eq!(transport.delivered_to("10.0.0.6")[0].rows, vec![PrintRow::text("Hi")]);
}

#[tokio::test]
async fn reroute_all_moves_whole_queue() {
    let (transport, pool) = pool();
    queue(&pool, "10.0.0.5", "a").await;
    queue(&pool, "10.0.0.5", "b").await;
    queue(&pool, "10.0.0.7", "other").await;
    transport.set_reachable("10.0.0.6", true);

    assert!(pool.reroute_all_for_printer("10.0.0.5", "10.0.0.6").await);
    assert_eq!(transport.delivered_to("10.0.0.6").len(), 2);
    assert_eq!(pool.pending_jobs().len(), 1);
    // Nothing to move is still a completed sweep.
    assert!(pool.reroute_all_for_printer("10.0.0.5", "10.0.0.6").await);
}

#[tokio::test]
async fn delete_operations() {
    let (_transport, pool) = pool();
    let a = queue(&pool, "10.0.0.5", "a").await;
    queue(&pool, "10.0.0.5", "b").await;

    assert!(pool.delete_pending_job(&a));
    assert!(!pool.delete_pending_job(&a));
    assert!(pool.delete_pending_jobs_for_printer("10.0.0.5"));
    assert!(pool.pending_jobs().is_empty());
    assert!(pool.delete_pending_jobs_for_printer("10.0.0.5"));
    assert!(pool.delete_pending_jobs_for_printer("10.0.0.99"));
}

#[tokio::test]
async fn removed_printer_queue_is_stale_after_readd() {
    let (_transport, pool) = pool();
    let old = queue(&pool, "10.0.0.5", "before removal").await;

    assert!(pool.remove_printer("10.0.0.5"));
    pool.add_printer("10.0.0.5").await;

    assert!(pool.pending_jobs_for_printer("10.0.0.5").is_empty());
    assert_eq!(pool.pending_jobs()[0].job_id, old);
    // Still addressable by id.
    assert!(matches!(
        pool.reroute_job(&old, "10.0.0.5").await,
        DispatchOutcome::Queued { .. }
    ));
    assert_eq!(pool.pending_jobs_for_printer("10.0.0.5").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn deleting_in_flight_job_cancels_requeue() {
    let (transport, pool) = pool();
    let pool = Arc::new(pool);
    let job = queue(&pool, "10.0.0.5", "slow").await;
    transport.set_delay("10.0.0.6", Duration::from_millis(200));

    let rerouting = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move { pool.reroute_job(&job, "10.0.0.6").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(pool.delete_pending_job(&job));
    let outcome = rerouting.await.expect("reroute task");
    assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
    assert!(pool.pending_jobs().is_empty());

    // A second reroute of the same id finds nothing.
    assert!(matches!(
        pool.reroute_job(&job, "10.0.0.6").await,
        DispatchOutcome::Rejected { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn slow_printer_does_not_hold_up_others() {
    let (transport, pool) = pool();
    let pool = Arc::new(pool);
    transport.set_reachable("10.0.0.5", true);
    transport.set_reachable("10.0.0.6", true);
    transport.set_delay("10.0.0.5", Duration::from_secs(5));

    let slow = {
        let pool = Arc::clone(&pool);
        tokio::spawn(async move {
            pool.submit("10.0.0.5", vec![PrintRow::Cut], &receipt()).await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = tokio::time::Instant::now();
    assert!(pool
        .submit("10.0.0.6", vec![PrintRow::Cut], &receipt())
        .await
        .is_delivered());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(transport.delivered_to("10.0.0.5").is_empty());

    assert!(slow.await.expect("slow task").is_delivered());
}

#[tokio::test(start_paused = true)]
async fn hanging_printer_times_out_into_the_queue() {
    let (transport, pool) = pool_with(PoolConfig {
        send_timeout_ms: 1_000,
        ..config()
    });
    transport.set_reachable("10.0.0.5", true);
    transport.set_delay("10.0.0.5", Duration::from_secs(60));

    let outcome = pool.submit("10.0.0.5", vec![PrintRow::Cut], &receipt()).await;
    let DispatchOutcome::Queued { reason, .. } = outcome else {
        panic!("expected the job to queue");
    };
    assert!(reason.contains("timed out"));
}

#[tokio::test]
async fn subscribers_see_events_in_order() {
    let (_transport, pool) = pool();
    let (subscription, mut rx) = pool.subscribe_channel();

    queue(&pool, "10.0.0.5", "x").await;
    assert!(matches!(rx.recv().await, Some(PoolEvent::PrePrintCheck { .. })));
    assert_eq!(
        rx.recv().await,
        Some(PoolEvent::PrinterUnreachable {
            printer: "10.0.0.5".into()
        })
    );

    subscription.unsubscribe();
    queue(&pool, "10.0.0.5", "y").await;
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn journal_restores_queue_into_new_pool() {
    let dir = tempfile::tempdir().expect("tempdir");
    let journaled = PoolConfig {
        journal_path: Some(dir.path().join("pending.db")),
        ..config()
    };

    let (_transport, first) = pool_with(journaled.clone());
    assert!(first.initialize().await);
    let job = queue(&first, "10.0.0.5", "survives restart").await;
    first.shutdown().await;

    let (transport, second) = pool_with(journaled);
    assert!(second.initialize().await);
    assert_eq!(second.pending_jobs()[0].job_id, job);

    transport.set_reachable("10.0.0.5", true);
    assert!(second.add_printer("10.0.0.5").await);
    assert_eq!(second.pending_jobs_for_printer("10.0.0.5").len(), 1);
    assert!(second.reconnect("10.0.0.5").await);
    assert!(second.pending_jobs().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn journal_keeps_up_with_a_burst_of_submits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("pending.db");
    let (transport, pool) = pool_with(PoolConfig {
        journal_path: Some(path.clone()),
        ..config()
    });
    let pool = Arc::new(pool);
    assert!(pool.initialize().await);
    transport.set_reachable("10.0.0.8", true);

    let mut submits = JoinSet::new();
    for i in 0..40 {
        let pool = Arc::clone(&pool);
        let printer = format!("10.0.0.{}", 5 + i % 4);
        submits.spawn(async move {
            pool.submit(printer, vec![PrintRow::text(format!("order {i}"))], &receipt())
                .await
        });
    }
    while let Some(joined) = submits.join_next().await {
        joined.expect("submit task");
    }

    let queued = pool.pending_jobs();
    assert_eq!(queued.len(), 30);
    assert!(pool.delete_pending_job(&queued[0].job_id));
    let expected: Vec<JobId> = pool.pending_jobs().iter().map(|j| j.job_id).collect();
    pool.shutdown().await;

    let journaled: Vec<JobId> = JobJournal::open(&path)
        .expect("reopen")
        .load_all()
        .expect("load")
        .into_iter()
        .map(|(job, _)| job.id)
        .collect();
    assert_eq!(journaled, expected);
}

/// Counts how many transport calls are running at once.
#[derive(Default)]
struct OverlapTransport {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl OverlapTransport {
    async fn hold(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrinterTransport for OverlapTransport {
    async fn connect(&self, _printer: &PrinterId) -> Result<Option<String>> {
        self.hold().await;
        Ok(None)
    }

    async fn send(&self, _printer: &PrinterId, _job: &OutboundJob) -> Result<()> {
        self.hold().await;
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_printer_operations_never_overlap() {
    let transport = Arc::new(OverlapTransport::default());
    let pool = Arc::new(PrinterPool::new(config(), transport.clone()));
    assert!(pool.add_printer("10.0.0.5").await);

    let mut tasks = JoinSet::new();
    for i in 0..3 {
        let p = Arc::clone(&pool);
        tasks.spawn(async move {
            assert!(p.reconnect("10.0.0.5").await);
        });
        let p = Arc::clone(&pool);
        tasks.spawn(async move {
            let outcome = p
                .submit("10.0.0.5", vec![PrintRow::text(format!("order {i}"))], &receipt())
                .await;
            assert!(outcome.is_delivered());
        });
        let p = Arc::clone(&pool);
        tasks.spawn(async move {
            assert!(p.retry_all_for_printer("10.0.0.5").await);
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("task");
    }

    assert_eq!(transport.peak(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_printers_overlap() {
    let transport = Arc::new(OverlapTransport::default());
    let pool = Arc::new(PrinterPool::new(config(), transport.clone()));

    let mut tasks = JoinSet::new();
    for printer in ["10.0.0.5", "10.0.0.6"] {
        let p = Arc::clone(&pool);
        tasks.spawn(async move {
            let outcome = p.submit(printer, vec![PrintRow::text("Hi")], &receipt()).await;
            assert!(outcome.is_delivered());
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined.expect("task");
    }

    assert_eq!(transport.peak(), 2);
}

#[tokio::test]
async fn blank_identity_is_refused() {
    let (transport, pool) = pool();
    transport.set_reachable("", true);

    assert!(!pool.add_printer("   ").await);
    assert!(pool.list_status().is_empty());

    let outcome = pool.submit("", vec![PrintRow::text("Hi")], &receipt()).await;
    assert!(matches!(outcome, DispatchOutcome::Rejected { .. }));
    assert!(pool.pending_jobs().is_empty());
    assert!(transport.delivered().is_empty());
}
