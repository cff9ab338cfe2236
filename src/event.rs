//! Agent events and the connectivity watcher that produces them.

use http::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;
use url::Url;

use crate::origin::Origin;
use crate::request::RelayRequest;

/// Events consumed by the agent loop
#[derive(Debug)]
pub enum Event {
  /// Origin connectivity was restored
  Online,
  /// A sync trigger asked for a drain of the named tag
  SyncDue(String),
}

/// Receiving side of the agent's event channel
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn channel() -> (mpsc::UnboundedSender<Event>, Self) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Self { rx })
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

/// Spawn the connectivity watcher task.
///
/// Probes the origin with a HEAD request on an interval and emits `Online`
/// on each offline-to-online transition. The watcher starts assuming the
/// origin is offline, so the first successful probe also counts as a
/// transition; that is what re-delivers sync triggers armed while the
/// process was down.
pub fn spawn_connectivity_watcher(
  origin: Arc<dyn Origin>,
  probe_url: Url,
  interval: Duration,
  tx: mpsc::UnboundedSender<Event>,
) {
  tokio::spawn(async move {
    let probe = RelayRequest::new(Method::HEAD, probe_url);
    let mut was_online = false;

    loop {
      tokio::time::sleep(interval).await;

      let online = origin.forward(&probe).await.is_ok();
      if online && !was_online {
        debug!("Origin connectivity restored");
        if tx.send(Event::Online).is_err() {
          break;
        }
      }
      was_online = online;
    }
  });
}
