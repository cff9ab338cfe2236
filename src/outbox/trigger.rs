//! Sync trigger registry: named tags armed by the interceptor and
//! re-delivered by the agent when connectivity returns.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashSet;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::event::Event;

/// Holds the set of armed sync tags.
///
/// Registration is idempotent: arming an already-armed tag is a no-op.
/// A newly armed tag is also nudged onto the event channel so a drain is
/// attempted right away; re-delivery after a failed drain waits for the
/// next connectivity transition instead.
pub struct SyncScheduler {
  tags: Mutex<HashSet<String>>,
  tx: mpsc::UnboundedSender<Event>,
}

impl SyncScheduler {
  pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
    Self {
      tags: Mutex::new(HashSet::new()),
      tx,
    }
  }

  /// Arm a tag. Returns an error only when the trigger cannot be delivered;
  /// the tag stays armed either way.
  pub fn register(&self, tag: &str) -> Result<()> {
    let newly_armed = self
      .tags
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?
      .insert(tag.to_string());

    if newly_armed {
      self
        .tx
        .send(Event::SyncDue(tag.to_string()))
        .map_err(|e| eyre!("Failed to deliver sync trigger: {}", e))?;
    }

    Ok(())
  }

  /// Re-arm a tag after a failed drain, without an immediate nudge.
  pub fn rearm(&self, tag: &str) {
    if let Ok(mut tags) = self.tags.lock() {
      tags.insert(tag.to_string());
    }
  }

  /// Take every armed tag, disarming them. The caller re-arms any tag whose
  /// drain did not complete.
  pub fn take(&self) -> Vec<String> {
    match self.tags.lock() {
      Ok(mut tags) => tags.drain().collect(),
      Err(_) => Vec::new(),
    }
  }

  pub fn disarm(&self, tag: &str) {
    if let Ok(mut tags) = self.tags.lock() {
      tags.remove(tag);
    }
  }
}
