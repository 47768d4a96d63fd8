//! Mock backends for failure injection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use event_store::{EventStore, MemoryStore, PathCount, StoreError, StoreResult};
use job_queue::{
    FailureOutcome, Job, JobId, JobQueue, NewJob, QueueError, QueueResult, QueueStats, StalledJobs,
};
use parking_lot::Mutex;
use pipeline_core::{Event, EventFilter};

/// Store wrapping a [`MemoryStore`] that fails the first `failures` inserts.
///
/// Every insert call is counted, so tests can also assert the store was
/// never touched.
#[derive(Clone)]
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    remaining_failures: Arc<Mutex<usize>>,
    insert_calls: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: Arc::new(MemoryStore::new()),
            remaining_failures: Arc::new(Mutex::new(failures)),
            insert_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A store whose inserts never succeed.
    pub fn always_failing() -> Self {
        Self::new(usize::MAX)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.inner.events()
    }
}

impl Default for FlakyStore {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl EventStore for FlakyStore {
    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut remaining = self.remaining_failures.lock();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StoreError::Unavailable("mock store failure".into()));
            }
        }
        self.inner.insert_event(event).await
    }

    async fn count(&self, filter: &EventFilter) -> StoreResult<u64> {
        self.inner.count(filter).await
    }

    async fn distinct_users(&self, filter: &EventFilter) -> StoreResult<Vec<Option<String>>> {
        self.inner.distinct_users(filter).await
    }

    async fn top_paths(&self, filter: &EventFilter, limit: usize) -> StoreResult<Vec<PathCount>> {
        self.inner.top_paths(filter, limit).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    fn backend(&self) -> &'static str {
        "flaky"
    }
}

/// Store whose reads always fail.
#[derive(Clone, Default)]
pub struct BrokenReadStore;

#[async_trait]
impl EventStore for BrokenReadStore {
    async fn insert_event(&self, _event: &Event) -> StoreResult<()> {
        Ok(())
    }

    async fn count(&self, _filter: &EventFilter) -> StoreResult<u64> {
        Err(StoreError::Unavailable("connection refused to 10.0.0.7".into()))
    }

    async fn distinct_users(&self, _filter: &EventFilter) -> StoreResult<Vec<Option<String>>> {
        Err(StoreError::Unavailable("connection refused to 10.0.0.7".into()))
    }

    async fn top_paths(&self, _filter: &EventFilter, _limit: usize) -> StoreResult<Vec<PathCount>> {
        Err(StoreError::Unavailable("connection refused to 10.0.0.7".into()))
    }

    async fn ping(&self) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused to 10.0.0.7".into()))
    }

    fn backend(&self) -> &'static str {
        "broken"
    }
}

/// Queue that cannot accept jobs.
#[derive(Clone, Default)]
pub struct UnavailableQueue {
    enqueue_calls: Arc<AtomicUsize>,
}

impl UnavailableQueue {
    pub fn enqueue_calls(&self) -> usize {
        self.enqueue_calls.load(Ordering::SeqCst)
    }

    fn down() -> QueueError {
        QueueError::Connection(sqlx::Error::PoolTimedOut)
    }
}

#[async_trait]
impl JobQueue for UnavailableQueue {
    async fn enqueue(&self, _job: NewJob) -> QueueResult<JobId> {
        self.enqueue_calls.fetch_add(1, Ordering::SeqCst);
        Err(Self::down())
    }

    async fn claim(&self, _worker_id: &str) -> QueueResult<Option<Job>> {
        Err(Self::down())
    }

    async fn complete(&self, _job: &Job) -> QueueResult<()> {
        Err(Self::down())
    }

    async fn fail(&self, _job: &Job, _error: &str) -> QueueResult<FailureOutcome> {
        Err(Self::down())
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        Err(Self::down())
    }

    async fn failed_jobs(&self, _limit: usize) -> QueueResult<Vec<Job>> {
        Err(Self::down())
    }

    async fn reset_stalled(&self, _timeout: Duration) -> QueueResult<StalledJobs> {
        Err(Self::down())
    }

    async fn purge_completed(&self, _older_than: Duration) -> QueueResult<u64> {
        Err(Self::down())
    }

    async fn ping(&self) -> QueueResult<()> {
        Err(Self::down())
    }

    fn backend(&self) -> &'static str {
        "unavailable"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event() -> Event {
        Event {
            site_id: "s1".into(),
            event_type: "page_view".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            path: Some("/home".into()),
            user_id: None,
        }
    }

    #[tokio::test]
    async fn test_flaky_store_recovers_after_failures() {
        let store = FlakyStore::new(2);

        assert!(store.insert_event(&event()).await.is_err());
        assert!(store.insert_event(&event()).await.is_err());
        assert!(store.insert_event(&event()).await.is_ok());
        assert!(store.insert_event(&event()).await.unwrap_err().is_duplicate());

        assert_eq!(store.insert_calls(), 4);
        assert_eq!(store.events().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_queue_rejects_enqueue() {
        let queue = UnavailableQueue::default();
        let result = queue
            .enqueue(NewJob::new("analytics-event", serde_json::json!({})))
            .await;

        assert!(result.is_err());
        assert_eq!(queue.enqueue_calls(), 1);
    }
}
