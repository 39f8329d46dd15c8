/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Worker execution: outcomes, retries, timeouts and pool shutdown.

use drover::{
    HandlerError, HandlerRegistry, Job, JobQueue, JobStatus, NewJob, RetryPolicy, Worker,
    WorkerPool, WorkerSettings,
};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::fixtures::TestFixture;

fn settings(job_timeout: Duration) -> WorkerSettings {
    WorkerSettings {
        poll_interval: Duration::from_millis(20),
        job_timeout,
        retry_policy: RetryPolicy::linear(Duration::ZERO),
    }
}

async fn run_once(queue: &JobQueue, registry: &Arc<HandlerRegistry>, timeout: Duration) -> Job {
    let job = queue.claim().await.unwrap().expect("a claimable job");
    let id = job.id;
    Worker::new(0, queue.clone(), registry.clone(), settings(timeout))
        .process(job)
        .await;
    queue.get_by_id(id).await.unwrap()
}

async fn wait_for_status(queue: &JobQueue, id: Uuid, status: JobStatus) -> Job {
    for _ in 0..200 {
        let job = queue.get_by_id(id).await.unwrap();
        if job.status == status {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {} never reached {}", id, status);
}

#[tokio::test]
async fn test_successful_handler_completes_job() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let registry = Arc::new(HandlerRegistry::new());
    registry.register_fn("send_email", |ctx, job| async move {
        assert_eq!(ctx.job_id(), job.id);
        assert_eq!(ctx.attempt(), 1);
        Ok(())
    });

    queue
        .enqueue(NewJob::new("send_email", json!({ "to": "a@example.com" })))
        .await
        .unwrap();
    let job = run_once(&queue, &registry, Duration::from_secs(5)).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempts, 0);
    assert!(job.completed_at.is_some());
    assert!(job.last_error.is_none());
}

/// An always-failing handler walks the job through
/// pending -> retrying -> retrying -> failed.
#[tokio::test]
async fn test_retry_exhaustion() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let registry = Arc::new(HandlerRegistry::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    registry.register_fn("send_sms", move |ctx, _job| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::transient(format!(
                "carrier rejected attempt {}",
                ctx.attempt()
            )))
        }
    });

    let job = queue
        .enqueue(NewJob::new("send_sms", json!({})).max_attempts(3))
        .await
        .unwrap();

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let after = run_once(&queue, &registry, Duration::from_secs(5)).await;
        statuses.push(after.status);
        if after.status == JobStatus::Retrying {
            assert_eq!(queue.promote_due_retries().await.unwrap(), 1);
        }
    }

    assert_eq!(
        statuses,
        vec![JobStatus::Retrying, JobStatus::Retrying, JobStatus::Failed]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let failed = queue.get_by_id(job.id).await.unwrap();
    assert_eq!(failed.attempts, 3);
    assert_eq!(failed.last_error.as_deref(), Some("carrier rejected attempt 3"));
    assert!(failed.completed_at.is_some());
    assert!(queue.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn test_permanent_error_fails_immediately() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let registry = Arc::new(HandlerRegistry::new());
    registry.register_fn("process_payment", |_ctx, job| async move {
        #[derive(serde::Deserialize)]
        #[allow(dead_code)]
        struct Payment {
            amount: u64,
        }
        match job.payload_as::<Payment>() {
            Ok(_) => Ok(()),
            Err(e) => Err(HandlerError::from(e)),
        }
    });

    queue
        .enqueue(NewJob::new("process_payment", json!({ "amount": "lots" })).max_attempts(5))
        .await
        .unwrap();
    let job = run_once(&queue, &registry, Duration::from_secs(5)).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.unwrap().starts_with("invalid payload"));
}

#[tokio::test]
async fn test_missing_handler_fails_without_attempt() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let registry = Arc::new(HandlerRegistry::new());

    queue
        .enqueue(NewJob::new("detect_life_events", json!({})))
        .await
        .unwrap();
    let job = run_once(&queue, &registry, Duration::from_secs(5)).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 0);
    assert!(job
        .last_error
        .unwrap()
        .contains("no handler registered for job type 'detect_life_events'"));
}

#[tokio::test]
async fn test_timeout_counts_as_attempt() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let registry = Arc::new(HandlerRegistry::new());
    registry.register_fn("update_vendor_ranks", |_ctx, _job| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    });

    queue
        .enqueue(NewJob::new("update_vendor_ranks", json!({})).max_attempts(2))
        .await
        .unwrap();
    let job = run_once(&queue, &registry, Duration::from_millis(50)).await;

    assert_eq!(job.status, JobStatus::Retrying);
    assert_eq!(job.attempts, 1);
    assert!(job.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let registry = Arc::new(HandlerRegistry::new());
    registry.register_fn("process_referrals", |_ctx, job: Job| async move {
        if job.payload.is_object() {
            panic!("referral graph corrupted");
        }
        Ok(())
    });

    queue
        .enqueue(NewJob::new("process_referrals", json!({})).max_attempts(1))
        .await
        .unwrap();
    let job = run_once(&queue, &registry, Duration::from_secs(5)).await;

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(
        job.last_error.as_deref(),
        Some("handler panicked: referral graph corrupted")
    );
}

#[tokio::test]
async fn test_pool_processes_enqueued_jobs() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let registry = Arc::new(HandlerRegistry::new());
    let done = Arc::new(AtomicUsize::new(0));
    let counter = done.clone();
    registry.register_fn("send_email", move |_ctx, _job| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let pool = WorkerPool::start(3, queue.clone(), registry, settings(Duration::from_secs(5)));
    assert_eq!(pool.size(), 3);

    let mut ids = Vec::new();
    for i in 0..6 {
        let job = queue
            .enqueue(NewJob::new("send_email", json!({ "n": i })))
            .await
            .unwrap();
        ids.push(job.id);
    }
    for id in ids {
        wait_for_status(&queue, id, JobStatus::Completed).await;
    }
    assert_eq!(done.load(Ordering::SeqCst), 6);

    assert!(pool.shutdown(Duration::from_secs(5)).await);
}

/// After shutdown is signalled, the in-flight handler finishes and resolves
/// normally and no further jobs are claimed.
#[tokio::test]
async fn test_graceful_shutdown_lets_in_flight_job_finish() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let registry = Arc::new(HandlerRegistry::new());
    let started = Arc::new(tokio::sync::Notify::new());
    let signal = started.clone();
    registry.register_fn("archive_old_data", move |_ctx, _job| {
        let signal = signal.clone();
        async move {
            signal.notify_one();
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(())
        }
    });

    let in_flight = queue
        .enqueue(NewJob::new("archive_old_data", json!({})).priority(90))
        .await
        .unwrap();

    let pool = WorkerPool::start(1, queue.clone(), registry, settings(Duration::from_secs(5)));
    started.notified().await;

    let waiting = queue
        .enqueue(NewJob::new("archive_old_data", json!({})))
        .await
        .unwrap();

    assert!(pool.shutdown(Duration::from_secs(5)).await);

    let finished = queue.get_by_id(in_flight.id).await.unwrap();
    assert_eq!(finished.status, JobStatus::Completed);

    let untouched = queue.get_by_id(waiting.id).await.unwrap();
    assert_eq!(untouched.status, JobStatus::Pending);
}

#[tokio::test]
async fn test_shutdown_timeout_is_reported() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let registry = Arc::new(HandlerRegistry::new());
    let started = Arc::new(tokio::sync::Notify::new());
    let signal = started.clone();
    registry.register_fn("cleanup_expired", move |_ctx, _job| {
        let signal = signal.clone();
        async move {
            signal.notify_one();
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
    });

    queue
        .enqueue(NewJob::new("cleanup_expired", json!({})))
        .await
        .unwrap();

    let pool = WorkerPool::start(1, queue.clone(), registry, settings(Duration::from_secs(30)));
    started.notified().await;

    assert!(!pool.shutdown(Duration::from_millis(100)).await);
}
