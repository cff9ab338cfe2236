//! Request interception: every relayed request is classified and routed to
//! the network, the response cache, or the offline write queue.

use color_eyre::Result;
use http::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheManager, CachedResponse, PartitionStore, StoredResponse};
use crate::origin::{Origin, OriginResponse};
use crate::outbox::{RecordStore, SyncScheduler};
use crate::request::{RelayRequest, RelayResponse, ResponseSource};

/// Confirmation text for a write accepted into the offline queue.
pub const SAVED_OFFLINE_MESSAGE: &str = "Saved offline";

/// Rejection text for a write whose body could not be decoded.
pub const INVALID_BODY_MESSAGE: &str = "Invalid request body";

/// Stateless request-handling logic over the cache, the queue and the origin.
pub struct Interceptor<S: PartitionStore, R: RecordStore> {
  origin: Arc<dyn Origin>,
  cache: CacheManager<S>,
  outbox: Arc<R>,
  scheduler: Arc<SyncScheduler>,
  sync_tag: String,
  /// When set, only POSTs whose path contains this fragment get the
  /// offline-queue treatment; other POSTs take the read path.
  write_filter: Option<String>,
}

impl<S: PartitionStore, R: RecordStore> Interceptor<S, R> {
  pub fn new(
    origin: Arc<dyn Origin>,
    cache: CacheManager<S>,
    outbox: Arc<R>,
    scheduler: Arc<SyncScheduler>,
    sync_tag: String,
    write_filter: Option<String>,
  ) -> Self {
    Self {
      origin,
      cache,
      outbox,
      scheduler,
      sync_tag,
      write_filter,
    }
  }

  /// Handle one intercepted request.
  ///
  /// Write requests never surface a raw network error: they resolve to the
  /// origin's response or to a synthesized confirmation after queuing. Read
  /// requests fall back to the cache; a miss lets the error through.
  pub async fn handle(&self, req: RelayRequest) -> Result<RelayResponse> {
    // Non-HTTP schemes bypass interception entirely
    if !req.is_http() {
      return Ok(forwarded(self.origin.forward(&req).await?));
    }

    if self.is_write(&req) {
      self.handle_write(req).await
    } else {
      self.handle_read(req).await
    }
  }

  fn is_write(&self, req: &RelayRequest) -> bool {
    req.method == Method::POST
      && self
        .write_filter
        .as_deref()
        .map_or(true, |fragment| req.url.path().contains(fragment))
  }

  async fn handle_write(&self, req: RelayRequest) -> Result<RelayResponse> {
    let payload: Value = match serde_json::from_slice(&req.body) {
      Ok(value) => value,
      Err(e) => {
        warn!(url = %req.url, "Rejected write with undecodable body: {}", e);
        return Ok(RelayResponse::synthesized(
          StatusCode::BAD_REQUEST,
          INVALID_BODY_MESSAGE,
        ));
      }
    };

    match self.origin.forward(&req).await {
      Ok(response) => Ok(forwarded(response)),
      Err(e) => {
        debug!(url = %req.url, "Origin unreachable for write: {}", e);

        // The record must be durably committed before the confirmation goes out
        let id = self.outbox.append(&payload)?;
        info!(id, "Queued write for deferred sync");

        if let Err(e) = self.scheduler.register(&self.sync_tag) {
          warn!("Failed to register sync trigger: {}", e);
        }

        Ok(RelayResponse::synthesized(
          StatusCode::OK,
          SAVED_OFFLINE_MESSAGE,
        ))
      }
    }
  }

  async fn handle_read(&self, req: RelayRequest) -> Result<RelayResponse> {
    match self.origin.forward(&req).await {
      Ok(response) => {
        if req.method == Method::GET && response.status.is_success() {
          let identity = req.identity();
          if let Err(e) = self.cache.put_dynamic(&identity, &StoredResponse::from(&response)) {
            warn!("Failed to cache response for {}: {}", identity.description(), e);
          }
        }
        Ok(forwarded(response))
      }
      Err(e) => match self.cache.lookup(&req.identity())? {
        Some(cached) => {
          debug!(url = %req.url, "Serving cached response");
          Ok(from_cache(cached))
        }
        None => Err(e),
      },
    }
  }
}

fn forwarded(response: OriginResponse) -> RelayResponse {
  RelayResponse {
    status: response.status,
    content_type: response.content_type,
    body: response.body,
    source: ResponseSource::Origin,
  }
}

fn from_cache(cached: CachedResponse) -> RelayResponse {
  RelayResponse {
    status: cached.response.status,
    content_type: cached.response.content_type,
    body: cached.response.body,
    source: ResponseSource::Cache,
  }
}
