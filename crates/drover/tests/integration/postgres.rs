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

//! PostgreSQL claiming. Skipped unless `DROVER_TEST_POSTGRES_URL` is set.

use chrono::{Duration as ChronoDuration, Utc};
use drover::{BackendType, JobOutcome, JobStatus, NewJob};
use serde_json::json;
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

use crate::fixtures::TestFixture;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_postgres_concurrent_claims_are_exclusive() {
    let Some(fixture) = TestFixture::postgres().await else {
        return;
    };
    assert_eq!(fixture.database().backend(), BackendType::Postgres);
    let queue = fixture.queue();

    const NUM_JOBS: usize = 40;
    const NUM_CLAIMANTS: usize = 10;

    let mut created = HashSet::new();
    for i in 0..NUM_JOBS {
        let job = queue
            .enqueue(NewJob::new("send_email", json!({ "n": i })))
            .await
            .expect("Failed to enqueue job");
        created.insert(job.id);
    }

    // Each claimant drains until the table is empty.
    let barrier = Arc::new(Barrier::new(NUM_CLAIMANTS));
    let mut handles = Vec::new();
    for _ in 0..NUM_CLAIMANTS {
        let queue = queue.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let mut mine = Vec::new();
            while let Some(job) = queue.claim().await.expect("Claim failed") {
                mine.push(job.id);
            }
            mine
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        claimed.extend(handle.await.expect("Claimant panicked"));
    }

    let unique: HashSet<_> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), NUM_JOBS, "every job claimed exactly once");
    assert_eq!(unique, created);
}

#[tokio::test]
#[serial]
async fn test_postgres_priority_and_retry_flow() {
    let Some(fixture) = TestFixture::postgres().await else {
        return;
    };
    let queue = fixture.queue();

    let at = Utc::now() - ChronoDuration::seconds(5);
    for priority in [20, 80] {
        queue
            .enqueue(
                NewJob::new("update_vendor_ranks", json!({}))
                    .priority(priority)
                    .scheduled_at(at),
            )
            .await
            .unwrap();
    }

    let first = queue.claim().await.unwrap().unwrap();
    assert_eq!(first.priority, 80);
    assert_eq!(first.status, JobStatus::Processing);

    queue
        .resolve(
            &first,
            JobOutcome::Retry {
                attempts: 1,
                delay: Duration::ZERO,
                error: "rank service busy".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(queue.promote_due_retries().await.unwrap(), 1);

    let again = queue.claim().await.unwrap().unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(again.attempts, 1);
    assert!(queue.resolve(&again, JobOutcome::Completed).await.unwrap());

    let second = queue.claim().await.unwrap().unwrap();
    assert_eq!(second.priority, 20);
    assert!(queue.claim().await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn test_postgres_large_batch_enqueue() {
    let Some(fixture) = TestFixture::postgres().await else {
        return;
    };
    let queue = fixture.queue();

    // Nine bound columns per row puts this past the bind-parameter limit
    // of a single statement.
    const NUM_JOBS: usize = 8_000;
    let jobs = queue
        .enqueue_batch(
            (0..NUM_JOBS)
                .map(|i| NewJob::new("calculate_analytics", json!({ "n": i })))
                .collect(),
        )
        .await
        .unwrap();
    assert_eq!(jobs.len(), NUM_JOBS);

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.pending, NUM_JOBS as i64);
    assert_eq!(jobs[0], queue.get_by_id(jobs[0].id).await.unwrap());
}
