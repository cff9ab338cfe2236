//! Core types and the storage trait for the partitioned response cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use http::StatusCode;

use crate::origin::OriginResponse;
use crate::request::RequestIdentity;

/// A response snapshot as persisted in a cache partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
  pub status: StatusCode,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl From<&OriginResponse> for StoredResponse {
  fn from(response: &OriginResponse) -> Self {
    Self {
      status: response.status,
      content_type: response.content_type.clone(),
      body: response.body.clone(),
    }
  }
}

/// A snapshot read back from a partition, with storage metadata.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: StoredResponse,
  /// When the snapshot was written
  pub stored_at: DateTime<Utc>,
}

/// Trait for partitioned response-cache backends.
///
/// Partitions are independent namespaces identified by name; entries within
/// a partition are keyed by request identity, last-write-wins.
pub trait PartitionStore: Send + Sync {
  /// Upsert one entry.
  fn put(
    &self,
    partition: &str,
    identity: &RequestIdentity,
    response: &StoredResponse,
  ) -> Result<()>;

  /// Write a batch of entries into a partition in a single transaction.
  /// Either every entry lands or none do.
  fn put_many(&self, partition: &str, entries: &[(RequestIdentity, StoredResponse)])
    -> Result<()>;

  /// Get the entry for an identity, or `None` on a miss.
  fn get(&self, partition: &str, identity: &RequestIdentity) -> Result<Option<CachedResponse>>;

  /// Names of every partition that currently holds entries.
  fn list_partitions(&self) -> Result<Vec<String>>;

  /// Drop a partition and everything in it.
  fn delete_partition(&self, partition: &str) -> Result<()>;

  /// Number of entries in a partition.
  fn partition_len(&self, partition: &str) -> Result<usize>;
}
