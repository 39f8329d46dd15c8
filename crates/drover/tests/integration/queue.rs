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

//! Enqueue, resolve and manual retry through the Queue Store.

use drover::{JobOutcome, JobStatus, NewJob, QueueError};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::fixtures::TestFixture;

#[tokio::test]
async fn test_enqueue_defaults() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue().with_default_max_attempts(4);

    let job = queue
        .enqueue(NewJob::new("send_email", json!({ "to": "ops@example.com" })))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.priority, 0);
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, 4);
    assert!(job.scheduled_at <= chrono::Utc::now());

    let stored = queue.get_by_id(job.id).await.unwrap();
    assert_eq!(stored.id, job.id);
    assert_eq!(stored.job_type, "send_email");
    assert_eq!(stored.payload, json!({ "to": "ops@example.com" }));
    assert_eq!(stored.max_attempts, 4);
}

#[tokio::test]
async fn test_enqueue_rejects_out_of_range_priority() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    let err = queue
        .enqueue(NewJob::new("send_email", json!({})).priority(101))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InvalidPriority(101)));

    let err = queue
        .enqueue(NewJob::new("send_email", json!({})).priority(-1))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InvalidPriority(-1)));
}

#[tokio::test]
async fn test_batch_enqueue_is_all_or_nothing() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    let err = queue
        .enqueue_batch(vec![
            NewJob::new("send_email", json!({ "n": 1 })),
            NewJob::new("send_email", json!({ "n": 2 })).priority(500),
            NewJob::new("send_email", json!({ "n": 3 })),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InvalidPriority(500)));
    assert!(queue.list_ready(10).await.unwrap().is_empty());

    let jobs = queue
        .enqueue_batch(vec![
            NewJob::new("send_email", json!({ "n": 1 })),
            NewJob::new("send_sms", json!({ "n": 2 })).priority(60),
        ])
        .await
        .unwrap();
    assert_eq!(jobs.len(), 2);

    let ready = queue.list_ready(10).await.unwrap();
    assert_eq!(ready.len(), 2);
    assert_eq!(ready[0].priority, 60);
}

#[tokio::test]
async fn test_resolve_completed_is_idempotent() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    queue
        .enqueue(NewJob::new("calculate_analytics", json!({})))
        .await
        .unwrap();
    let job = queue.claim().await.unwrap().unwrap();

    assert!(queue.resolve(&job, JobOutcome::Completed).await.unwrap());
    let completed = queue.get_by_id(job.id).await.unwrap();
    assert_eq!(completed.status, JobStatus::Completed);
    let completed_at = completed.completed_at.expect("completed_at set");

    tokio::time::sleep(Duration::from_millis(10)).await;

    // A second resolve of any kind is ignored.
    assert!(!queue.resolve(&job, JobOutcome::Completed).await.unwrap());
    assert!(!queue
        .resolve(
            &job,
            JobOutcome::Failed {
                attempts: Some(1),
                error: "late failure".into(),
            },
        )
        .await
        .unwrap());

    let after = queue.get_by_id(job.id).await.unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.completed_at, Some(completed_at));
    assert!(after.last_error.is_none());
}

#[tokio::test]
async fn test_resolve_retry_schedules_backoff() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    queue
        .enqueue(NewJob::new("send_push_notification", json!({})))
        .await
        .unwrap();
    let job = queue.claim().await.unwrap().unwrap();

    let before = chrono::Utc::now();
    assert!(queue
        .resolve(
            &job,
            JobOutcome::Retry {
                attempts: 1,
                delay: Duration::from_secs(60),
                error: "gateway timeout".into(),
            },
        )
        .await
        .unwrap());

    let retrying = queue.get_by_id(job.id).await.unwrap();
    assert_eq!(retrying.status, JobStatus::Retrying);
    assert_eq!(retrying.attempts, 1);
    assert_eq!(retrying.last_error.as_deref(), Some("gateway timeout"));
    assert!(retrying.scheduled_at >= before + chrono::Duration::seconds(59));
    assert!(retrying.claimed_at.is_none());

    // Not claimable and not promotable until the backoff elapses.
    assert!(queue.claim().await.unwrap().is_none());
    assert_eq!(queue.promote_due_retries().await.unwrap(), 0);
}

#[tokio::test]
async fn test_get_unknown_job_is_not_found() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    let id = Uuid::new_v4();
    let err = queue.get_by_id(id).await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound(missing) if missing == id));
}

#[tokio::test]
async fn test_retry_failed_resets_state() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    queue
        .enqueue(NewJob::new("process_refund", json!({ "refund": 9 })).max_attempts(3))
        .await
        .unwrap();
    let job = queue.claim().await.unwrap().unwrap();
    queue
        .resolve(
            &job,
            JobOutcome::Failed {
                attempts: Some(3),
                error: "card declined".into(),
            },
        )
        .await
        .unwrap();

    let failed = queue.list_failed(50).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].attempts, 3);

    let reset = queue.retry_failed(job.id).await.unwrap();
    assert_eq!(reset.id, job.id);
    assert_eq!(reset.status, JobStatus::Pending);
    assert_eq!(reset.attempts, 0);
    assert!(reset.completed_at.is_none());
    assert_eq!(reset.payload, json!({ "refund": 9 }));

    let claimed = queue.claim().await.unwrap().expect("immediately claimable");
    assert_eq!(claimed.id, job.id);
    assert!(queue.list_failed(50).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_retry_failed_rejects_non_failed_jobs() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    let pending = queue
        .enqueue(NewJob::new("send_email", json!({})))
        .await
        .unwrap();
    let err = queue.retry_failed(pending.id).await.unwrap_err();
    assert!(matches!(
        err,
        QueueError::InvalidState {
            status: JobStatus::Pending,
            ..
        }
    ));

    let err = queue.retry_failed(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, QueueError::NotFound(_)));
}

/// A retried job comes back through `claim` once its backoff has elapsed,
/// without any mover sweep in between.
#[tokio::test]
async fn test_retried_job_is_claimable_after_backoff() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    queue
        .enqueue(NewJob::new("send_sms", json!({})))
        .await
        .unwrap();
    let job = queue.claim().await.unwrap().unwrap();
    queue
        .resolve(
            &job,
            JobOutcome::Retry {
                attempts: 1,
                delay: Duration::from_millis(30),
                error: "carrier busy".into(),
            },
        )
        .await
        .unwrap();

    assert!(queue.claim().await.unwrap().is_none(), "backoff not elapsed");
    tokio::time::sleep(Duration::from_millis(60)).await;

    let ready = queue.list_ready(10).await.unwrap();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].id, job.id);

    let again = queue.claim().await.unwrap().expect("retried job claimable");
    assert_eq!(again.id, job.id);
    assert_eq!(again.status, JobStatus::Processing);
    assert_eq!(again.attempts, 1);
    assert_eq!(again.last_error.as_deref(), Some("carrier busy"));
    assert!(queue.claim().await.unwrap().is_none());
}

#[tokio::test]
async fn test_enqueued_job_matches_stored_row() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    let at = chrono::Utc::now() + chrono::Duration::nanoseconds(123_456_789);
    let job = queue
        .enqueue(NewJob::new("send_email", json!({ "to": "a@example.com" })).scheduled_at(at))
        .await
        .unwrap();
    assert_eq!(job, queue.get_by_id(job.id).await.unwrap());

    let batch = queue
        .enqueue_batch(vec![
            NewJob::new("send_email", json!({ "n": 1 })),
            NewJob::new("send_sms", json!({ "n": 2 })),
        ])
        .await
        .unwrap();
    for job in batch {
        assert_eq!(job, queue.get_by_id(job.id).await.unwrap());
    }
}

#[tokio::test]
async fn test_enqueue_rejects_invalid_job_type() {
    let fixture = TestFixture::sqlite().await;
    let queue = fixture.queue();

    let err = queue
        .enqueue(NewJob::new("", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InvalidJobType(_)));

    let long = "x".repeat(drover::models::job::MAX_JOB_TYPE_LEN + 1);
    let err = queue
        .enqueue(NewJob::new(long, json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::InvalidJobType(_)));

    let exact = "x".repeat(drover::models::job::MAX_JOB_TYPE_LEN);
    assert!(queue.enqueue(NewJob::new(exact, json!({}))).await.is_ok());
}
