//! Deferred sync: drains the record store by replaying every pending write
//! to the origin, clearing the store only when the whole batch succeeds.

use color_eyre::Result;
use futures::future;
use http::StatusCode;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::origin::Origin;

use super::store::{PendingRecord, RecordStore};

/// Result of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
  /// The signal carried a tag this coordinator does not own
  Ignored,
  /// Nothing was pending
  Empty,
  /// Every replay succeeded; the store was cleared
  Flushed(usize),
  /// At least one replay failed; the store was left untouched
  Retained { pending: usize, failed: usize },
}

/// Replays pending records against the fixed write endpoint.
pub struct SyncCoordinator<R: RecordStore> {
  origin: Arc<dyn Origin>,
  store: Arc<R>,
  endpoint: Url,
  tag: String,
}

impl<R: RecordStore> SyncCoordinator<R> {
  pub fn new(origin: Arc<dyn Origin>, store: Arc<R>, endpoint: Url, tag: String) -> Self {
    Self {
      origin,
      store,
      endpoint,
      tag,
    }
  }

  /// Run one all-or-nothing sync pass for the given tag.
  ///
  /// All pending writes are issued concurrently; the outcome is evaluated
  /// once, after every write has settled. Partial success keeps the entire
  /// store (including the records that went through) for the next pass.
  pub async fn drain(&self, tag: &str) -> Result<DrainOutcome> {
    if tag != self.tag {
      return Ok(DrainOutcome::Ignored);
    }

    let records = self.store.list_all()?;
    if records.is_empty() {
      return Ok(DrainOutcome::Empty);
    }

    let replays = records.iter().map(|record| self.replay(record));
    let results = future::join_all(replays).await;

    let mut failed = 0usize;
    for (record, result) in records.iter().zip(&results) {
      match result {
        Ok(status) if status.is_success() => {}
        Ok(status) => {
          warn!(id = record.id, status = %status, "Replay rejected by origin");
          failed += 1;
        }
        Err(e) => {
          warn!(id = record.id, "Replay failed: {}", e);
          failed += 1;
        }
      }
    }

    if failed > 0 {
      return Ok(DrainOutcome::Retained {
        pending: records.len(),
        failed,
      });
    }

    self.store.clear()?;
    info!(count = records.len(), "Flushed pending records");

    Ok(DrainOutcome::Flushed(records.len()))
  }

  async fn replay(&self, record: &PendingRecord) -> Result<StatusCode> {
    let response = self.origin.post_json(&self.endpoint, &record.payload).await?;
    Ok(response.status)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::origin::testing::FakeOrigin;
  use crate::outbox::store::SqliteQueue;
  use serde_json::json;

  const TAG: &str = "sync-pending-writes";

  fn coordinator(
    origin: Arc<FakeOrigin>,
  ) -> (tempfile::TempDir, SyncCoordinator<SqliteQueue>, Arc<SqliteQueue>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SqliteQueue::open(&dir.path().join("queue.db")).unwrap());
    let endpoint = Url::parse("http://origin.test/auth/register").unwrap();
    let coordinator = SyncCoordinator::new(origin, Arc::clone(&store), endpoint, TAG.to_string());
    (dir, coordinator, store)
  }

  #[tokio::test]
  async fn test_drain_flushes_when_all_replays_succeed() {
    let origin = Arc::new(FakeOrigin::new());
    let (_dir, coordinator, store) = coordinator(Arc::clone(&origin));

    store.append(&json!({"name": "a"})).unwrap();
    store.append(&json!({"name": "b"})).unwrap();

    let outcome = coordinator.drain(TAG).await.unwrap();

    assert_eq!(outcome, DrainOutcome::Flushed(2));
    assert!(store.is_empty().unwrap());

    // Every record was posted to the fixed endpoint as JSON
    let posts = origin.posts();
    assert_eq!(posts.len(), 2);
    assert!(posts
      .iter()
      .all(|(url, _)| url.as_str() == "http://origin.test/auth/register"));
  }

  #[tokio::test]
  async fn test_drain_retains_everything_on_partial_failure() {
    let origin = Arc::new(FakeOrigin::new());
    origin.script_post_statuses(&[StatusCode::OK, StatusCode::INTERNAL_SERVER_ERROR]);
    let (_dir, coordinator, store) = coordinator(Arc::clone(&origin));

    store.append(&json!({"name": "a"})).unwrap();
    store.append(&json!({"name": "b"})).unwrap();

    let outcome = coordinator.drain(TAG).await.unwrap();

    assert_eq!(
      outcome,
      DrainOutcome::Retained {
        pending: 2,
        failed: 1
      }
    );
    // No partial pruning: both records stay, including the one that succeeded
    assert_eq!(store.len().unwrap(), 2);
  }

  #[tokio::test]
  async fn test_drain_retains_on_transport_failure() {
    let origin = Arc::new(FakeOrigin::new());
    let (_dir, coordinator, store) = coordinator(Arc::clone(&origin));

    store.append(&json!({"name": "a"})).unwrap();
    origin.set_offline(true);

    let outcome = coordinator.drain(TAG).await.unwrap();

    assert_eq!(
      outcome,
      DrainOutcome::Retained {
        pending: 1,
        failed: 1
      }
    );
    assert_eq!(store.len().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_drain_empty_store_is_a_noop() {
    let origin = Arc::new(FakeOrigin::new());
    let (_dir, coordinator, store) = coordinator(Arc::clone(&origin));

    let outcome = coordinator.drain(TAG).await.unwrap();

    assert_eq!(outcome, DrainOutcome::Empty);
    assert!(store.is_empty().unwrap());
    assert!(origin.posts().is_empty());
  }

  #[tokio::test]
  async fn test_drain_ignores_foreign_tags() {
    let origin = Arc::new(FakeOrigin::new());
    let (_dir, coordinator, store) = coordinator(Arc::clone(&origin));

    store.append(&json!({"name": "a"})).unwrap();

    let outcome = coordinator.drain("some-other-tag").await.unwrap();

    assert_eq!(outcome, DrainOutcome::Ignored);
    assert_eq!(store.len().unwrap(), 1);
    assert!(origin.posts().is_empty());
  }

  #[tokio::test]
  async fn test_retained_records_flush_on_a_later_pass() {
    let origin = Arc::new(FakeOrigin::new());
    origin.script_post_statuses(&[StatusCode::BAD_GATEWAY]);
    let (_dir, coordinator, store) = coordinator(Arc::clone(&origin));

    store.append(&json!({"name": "a"})).unwrap();

    let first = coordinator.drain(TAG).await.unwrap();
    assert!(matches!(first, DrainOutcome::Retained { .. }));

    // Next pass: the scripted failure is exhausted, defaults back to 200
    let second = coordinator.drain(TAG).await.unwrap();
    assert_eq!(second, DrainOutcome::Flushed(1));
    assert!(store.is_empty().unwrap());
  }
}
