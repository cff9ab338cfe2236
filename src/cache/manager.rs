//! Partition lifecycle: versioned naming, shell install, stale-partition purge.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use url::Url;

use crate::origin::Origin;
use crate::request::{RelayRequest, RequestIdentity};

use super::traits::{CachedResponse, PartitionStore, StoredResponse};

/// Deterministic partition names for one deployed version.
#[derive(Debug, Clone)]
pub struct Generation {
  version: String,
}

impl Generation {
  pub fn new(version: &str) -> Self {
    Self {
      version: version.to_string(),
    }
  }

  pub fn shell(&self) -> String {
    format!("shell-{}", self.version)
  }

  pub fn dynamic(&self) -> String {
    format!("dynamic-{}", self.version)
  }

  pub fn is_current(&self, partition: &str) -> bool {
    partition == self.shell() || partition == self.dynamic()
  }
}

/// Manages the shell and dynamic partitions for the running version.
pub struct CacheManager<S: PartitionStore> {
  store: Arc<S>,
  generation: Generation,
}

impl<S: PartitionStore> CacheManager<S> {
  pub fn new(store: Arc<S>, generation: Generation) -> Self {
    Self { store, generation }
  }

  /// Whether the shell partition still needs its install-time population.
  /// Install is transactional, so a non-empty shell is a complete one.
  pub fn needs_install(&self) -> Result<bool> {
    Ok(self.store.partition_len(&self.generation.shell())? == 0)
  }

  /// Bulk-load the shell partition from the manifest.
  ///
  /// Every path is fetched from the origin first; the first failure aborts
  /// the whole install. Snapshots land in one transaction so the shell is
  /// never partially populated.
  pub async fn install(
    &self,
    origin: &dyn Origin,
    base: &Url,
    manifest: &[String],
  ) -> Result<usize> {
    let mut entries = Vec::with_capacity(manifest.len());

    for path in manifest {
      let url = base
        .join(path)
        .map_err(|e| eyre!("Invalid manifest path {}: {}", path, e))?;
      let req = RelayRequest::get(url);

      let response = origin
        .forward(&req)
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", path, e))?;

      if !response.status.is_success() {
        return Err(eyre!(
          "Failed to precache {}: origin returned {}",
          path,
          response.status
        ));
      }

      entries.push((req.identity(), StoredResponse::from(&response)));
    }

    self.store.put_many(&self.generation.shell(), &entries)?;

    Ok(entries.len())
  }

  /// Delete every partition that does not belong to the running version.
  /// Returns the purged names.
  pub fn activate(&self) -> Result<Vec<String>> {
    let mut purged = Vec::new();

    for name in self.store.list_partitions()? {
      if !self.generation.is_current(&name) {
        self.store.delete_partition(&name)?;
        purged.push(name);
      }
    }

    Ok(purged)
  }

  /// Most recent snapshot for an identity across the current partitions.
  pub fn lookup(&self, identity: &RequestIdentity) -> Result<Option<CachedResponse>> {
    let dynamic = self.store.get(&self.generation.dynamic(), identity)?;
    let shell = self.store.get(&self.generation.shell(), identity)?;

    Ok(match (dynamic, shell) {
      // On a timestamp tie prefer the dynamic partition, where fresh GETs land
      (Some(d), Some(s)) => Some(if s.stored_at > d.stored_at { s } else { d }),
      (d, s) => d.or(s),
    })
  }

  /// Upsert one opportunistically observed response into the dynamic partition.
  pub fn put_dynamic(&self, identity: &RequestIdentity, response: &StoredResponse) -> Result<()> {
    self.store.put(&self.generation.dynamic(), identity, response)
  }
}

impl<S: PartitionStore> Clone for CacheManager<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      generation: self.generation.clone(),
    }
  }
}
