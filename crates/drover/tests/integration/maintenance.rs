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

//! Mover sweeps, orphan recovery and the monitoring surface.

use chrono::{Duration as ChronoDuration, Utc};
use drover::{
    JobMonitor, JobOutcome, JobStatus, MemoryDispatchChannel, NewJob, ReadyQueueMover,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::fixtures::TestFixture;

#[tokio::test]
async fn test_mover_promotes_due_retries() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    queue
        .enqueue(NewJob::new("reconcile_payments", json!({})))
        .await
        .unwrap();
    let job = queue.claim().await.unwrap().unwrap();
    queue
        .resolve(
            &job,
            JobOutcome::Retry {
                attempts: 1,
                delay: Duration::from_millis(30),
                error: "ledger locked".into(),
            },
        )
        .await
        .unwrap();

    let mover = ReadyQueueMover::new(queue.clone(), Duration::from_secs(10), 100);
    assert_eq!(mover.sweep().await.unwrap().promoted, 0, "backoff not elapsed");
    tokio::time::sleep(Duration::from_millis(60)).await;

    let report = mover.sweep().await.unwrap();
    assert_eq!(report.promoted, 1);
    assert_eq!(report.published, 0, "no channel, nothing to publish");

    assert_eq!(queue.get_by_id(job.id).await.unwrap().status, JobStatus::Pending);

    let claimed = queue.claim().await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.attempts, 1);
    assert_eq!(claimed.last_error.as_deref(), Some("ledger locked"));
}

#[tokio::test]
async fn test_mover_republishes_due_jobs_only() {
    let fixture = TestFixture::sqlite().await;
    let channel = Arc::new(MemoryDispatchChannel::new());
    let producer = fixture.queue();
    let queue = fixture.queue().with_dispatch_channel(channel.clone());

    // Enqueued without a channel, so no hints exist yet.
    let due = producer
        .enqueue(NewJob::new("send_email", json!({})).priority(30))
        .await
        .unwrap();
    producer
        .enqueue(
            NewJob::new("send_email", json!({}))
                .scheduled_at(Utc::now() + ChronoDuration::hours(1)),
        )
        .await
        .unwrap();
    assert!(channel.is_empty());

    let mover = ReadyQueueMover::new(queue.clone(), Duration::from_secs(10), 100);
    let report = mover.sweep().await.unwrap();
    assert_eq!(report.published, 1);
    assert_eq!(channel.len(), 1);

    // Sweeping again does not duplicate the hint.
    mover.sweep().await.unwrap();
    assert_eq!(channel.len(), 1);

    assert_eq!(queue.claim().await.unwrap().unwrap().id, due.id);
    assert!(queue.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn test_mover_respects_batch_size() {
    let fixture = TestFixture::sqlite().await;
    let channel = Arc::new(MemoryDispatchChannel::new());
    let producer = fixture.queue();
    let queue = fixture.queue().with_dispatch_channel(channel.clone());

    for i in 0..5 {
        producer
            .enqueue(NewJob::new("send_sms", json!({ "n": i })))
            .await
            .unwrap();
    }

    let mover = ReadyQueueMover::new(queue, Duration::from_secs(10), 3);
    assert_eq!(mover.sweep().await.unwrap().published, 3);
    assert_eq!(channel.len(), 3);
}

#[tokio::test]
async fn test_orphaned_claims_are_recovered() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    let job = queue
        .enqueue(NewJob::new("archive_old_data", json!({})))
        .await
        .unwrap();
    let claimed = queue.claim().await.unwrap().unwrap();
    assert_eq!(claimed.id, job.id);

    // A fresh claim is not stale yet.
    assert_eq!(queue.recover_orphaned(Duration::from_secs(3600)).await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(20)).await;
    let mover = ReadyQueueMover::new(queue.clone(), Duration::from_secs(10), 100)
        .with_orphan_recovery(Duration::from_millis(1));
    let report = mover.sweep().await.unwrap();
    assert_eq!(report.recovered, 1);

    let recovered = queue.get_by_id(job.id).await.unwrap();
    assert_eq!(recovered.status, JobStatus::Pending);
    assert_eq!(recovered.attempts, 0);
    assert!(recovered.claimed_at.is_none());

    // The worker that lost the claim can no longer resolve it.
    assert!(!queue.resolve(&claimed, JobOutcome::Completed).await.unwrap());
    assert_eq!(queue.claim().await.unwrap().unwrap().id, job.id);
}

#[tokio::test]
async fn test_monitor_stats_and_failed_listing() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();
    let monitor = JobMonitor::new(queue.clone());

    for i in 0..4 {
        queue
            .enqueue(NewJob::new("calculate_analytics", json!({ "n": i })))
            .await
            .unwrap();
    }

    // Two complete, one fails, one stays pending.
    for _ in 0..2 {
        let job = queue.claim().await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        queue.resolve(&job, JobOutcome::Completed).await.unwrap();
    }
    let failed = queue.claim().await.unwrap().unwrap();
    queue
        .resolve(
            &failed,
            JobOutcome::Failed {
                attempts: Some(1),
                error: "warehouse unavailable".into(),
            },
        )
        .await
        .unwrap();

    let report = monitor.stats().await.unwrap();
    assert_eq!(report.pending, 1);
    assert_eq!(report.processing, 0);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.total_last_24h, 4);
    assert!((report.success_rate - 0.5).abs() < 1e-9);
    assert!(report.avg_duration_seconds > 0.0);

    let listed = monitor.list_failed(None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, failed.id);
    assert_eq!(listed[0].last_error.as_deref(), Some("warehouse unavailable"));

    let fetched = monitor.get(failed.id).await.unwrap();
    assert_eq!(fetched.status, JobStatus::Failed);

    let retried = monitor.retry_failed(failed.id).await.unwrap();
    assert_eq!(retried.status, JobStatus::Pending);
    assert_eq!(monitor.stats().await.unwrap().pending, 2);
}

#[tokio::test]
async fn test_empty_store_stats() {
    let fixture = TestFixture::sqlite().await;
    let report = JobMonitor::new(fixture.queue()).stats().await.unwrap();
    assert_eq!(report.total_last_24h, 0);
    assert_eq!(report.success_rate, 0.0);
    assert_eq!(report.avg_duration_seconds, 0.0);
}
