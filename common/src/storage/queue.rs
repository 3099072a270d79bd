use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use crate::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            job::{Job, JobState},
            progress::ProgressEvent,
            StoredObject,
        },
    },
};

/// Job queue with at-least-once delivery, plus the progress pub/sub channel
/// the SSE broadcaster fans out from. A broker outage is a transient error:
/// callers are expected to back off and retry rather than treat it as fatal.
#[async_trait]
pub trait Queue: Send + Sync {
    async fn push(&self, doc_id: &str) -> Result<(), AppError>;
    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<Job>, AppError>;
    async fn set_progress(&self, event: &ProgressEvent, ttl: Duration) -> Result<(), AppError>;
    async fn get_progress(&self, doc_id: &str) -> Result<Option<ProgressEvent>, AppError>;
    fn publish(&self, event: ProgressEvent);
    fn subscribe(&self) -> broadcast::Receiver<ProgressEvent>;
}

/// `(created_at + ttl)`-expiring snapshot of a document's last progress event.
/// Table name follows the queue/progress key layout: `progress:<doc_id>`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ProgressSnapshot {
    event: ProgressEvent,
    expires_at: chrono::DateTime<Utc>,
}

pub struct SurrealQueue {
    db: SurrealDbClient,
    poll_interval: Duration,
    broadcast: broadcast::Sender<ProgressEvent>,
}

impl SurrealQueue {
    pub fn new(db: SurrealDbClient) -> Self {
        let (broadcast, _) = broadcast::channel(256);
        Self {
            db,
            poll_interval: Duration::from_millis(200),
            broadcast,
        }
    }

    /// Attempt to atomically claim the oldest `Ready` job. Returns `None`
    /// when the queue is empty, never blocks.
    async fn try_claim(&self) -> Result<Option<Job>, AppError> {
        let mut response = self
            .db
            .client
            .query(
                "SELECT * FROM job WHERE state = 'Ready' ORDER BY created_at ASC LIMIT 1",
            )
            .await?;
        let candidates: Vec<Job> = response.take(0).unwrap_or_default();
        let Some(mut job) = candidates.into_iter().next() else {
            return Ok(None);
        };

        job.state = JobState::Claimed;
        job.updated_at = Utc::now();
        let claimed: Option<Job> = self
            .db
            .client
            .update((Job::table_name(), job.id.clone()))
            .content(job.clone())
            .await?;

        Ok(claimed)
    }
}

#[async_trait]
impl Queue for SurrealQueue {
    async fn push(&self, doc_id: &str) -> Result<(), AppError> {
        self.db.store_item(Job::new(doc_id)).await?;
        Ok(())
    }

    async fn blocking_pop(&self, timeout: Duration) -> Result<Option<Job>, AppError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(job) = self.try_claim().await? {
                return Ok(Some(job));
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(timeout)).await;
        }
    }

    async fn set_progress(&self, event: &ProgressEvent, ttl: Duration) -> Result<(), AppError> {
        let snapshot = ProgressSnapshot {
            event: event.clone(),
            expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default(),
        };
        let key = format!("progress:{}", event.doc_id);
        self.db
            .client
            .query("UPSERT type::thing('progress_snapshot', $key) CONTENT $snapshot")
            .bind(("key", key))
            .bind(("snapshot", snapshot))
            .await?
            .check()?;
        Ok(())
    }

    async fn get_progress(&self, doc_id: &str) -> Result<Option<ProgressEvent>, AppError> {
        let key = format!("progress:{doc_id}");
        let mut response = self
            .db
            .client
            .query("SELECT * FROM type::thing('progress_snapshot', $key)")
            .bind(("key", key))
            .await?;
        let snapshot: Option<ProgressSnapshot> = response.take(0).unwrap_or_default();
        Ok(snapshot.and_then(|s| (s.expires_at > Utc::now()).then_some(s.event)))
    }

    fn publish(&self, event: ProgressEvent) {
        // No active subscribers is not an error: the SSE endpoint may simply
        // not have a connected client for this document right now.
        let _ = self.broadcast.send(event);
    }

    fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.broadcast.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopeKey;
    use crate::storage::types::progress::Stage;
    use uuid::Uuid;

    async fn queue() -> SurrealQueue {
        let db = SurrealDbClient::memory("queue_test", &Uuid::new_v4().to_string())
            .await
            .expect("memory db");
        db.build_indexes().await.expect("indexes");
        SurrealQueue::new(db)
    }

    #[tokio::test]
    async fn push_then_blocking_pop_claims_job() {
        let queue = queue().await;
        queue.push("doc-1").await.unwrap();

        let job = queue
            .blocking_pop(Duration::from_millis(500))
            .await
            .unwrap()
            .expect("job claimed");
        assert_eq!(job.doc_id, "doc-1");
        assert_eq!(job.state, JobState::Claimed);
    }

    #[tokio::test]
    async fn blocking_pop_times_out_on_empty_queue() {
        let queue = queue().await;
        let job = queue.blocking_pop(Duration::from_millis(250)).await.unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn claimed_job_is_not_claimed_twice() {
        let queue = queue().await;
        queue.push("doc-1").await.unwrap();
        let first = queue.blocking_pop(Duration::from_millis(500)).await.unwrap();
        assert!(first.is_some());

        let second = queue.blocking_pop(Duration::from_millis(250)).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn set_and_get_progress_round_trip() {
        let queue = queue().await;
        let event = ProgressEvent::new("doc-1", ScopeKey::tenant("t1"), Stage::Chunking);
        queue.set_progress(&event, Duration::from_secs(3600)).await.unwrap();

        let fetched = queue.get_progress("doc-1").await.unwrap().expect("progress present");
        assert_eq!(fetched.stage, Stage::Chunking);
    }

    #[tokio::test]
    async fn expired_progress_snapshot_is_not_returned() {
        let queue = queue().await;
        let event = ProgressEvent::new("doc-1", ScopeKey::tenant("t1"), Stage::Chunking);
        queue.set_progress(&event, Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let fetched = queue.get_progress("doc-1").await.unwrap();
        assert!(fetched.is_none());
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let queue = queue().await;
        let mut rx = queue.subscribe();
        let event = ProgressEvent::new("doc-1", ScopeKey::tenant("t1"), Stage::Indexed);
        queue.publish(event.clone());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.doc_id, event.doc_id);
    }
}
