//! Agent wiring: storage, lifecycle, the serving surface, and the event loop.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::cache::{CacheManager, Generation, SqliteStore};
use crate::config::Config;
use crate::event::{spawn_connectivity_watcher, Event, EventHandler};
use crate::intercept::Interceptor;
use crate::origin::{HttpOrigin, Origin};
use crate::outbox::{DrainOutcome, RecordStore, SqliteQueue, SyncCoordinator, SyncScheduler};
use crate::server;

/// Owns every component and runs the relay until shutdown.
pub struct Agent {
  config: Config,
  origin: Arc<dyn Origin>,
  cache: CacheManager<SqliteStore>,
  queue: Arc<SqliteQueue>,
  scheduler: Arc<SyncScheduler>,
  coordinator: SyncCoordinator<SqliteQueue>,
  interceptor: Arc<Interceptor<SqliteStore, SqliteQueue>>,
  events: EventHandler,
  event_tx: mpsc::UnboundedSender<Event>,
}

impl Agent {
  pub fn new(config: Config) -> Result<Self> {
    let db_path = config.storage.database_path()?;
    let cache_store = Arc::new(SqliteStore::open(&db_path)?);
    let queue = Arc::new(SqliteQueue::open(&db_path)?);
    let origin: Arc<dyn Origin> = Arc::new(HttpOrigin::new()?);

    let (event_tx, events) = EventHandler::channel();
    let scheduler = Arc::new(SyncScheduler::new(event_tx.clone()));
    let cache = CacheManager::new(cache_store, Generation::new(&config.cache.version));

    let interceptor = Arc::new(Interceptor::new(
      Arc::clone(&origin),
      cache.clone(),
      Arc::clone(&queue),
      Arc::clone(&scheduler),
      config.sync.tag.clone(),
      config.origin.write_filter.clone(),
    ));

    let coordinator = SyncCoordinator::new(
      Arc::clone(&origin),
      Arc::clone(&queue),
      config.sync_endpoint()?,
      config.sync.tag.clone(),
    );

    Ok(Self {
      config,
      origin,
      cache,
      queue,
      scheduler,
      coordinator,
      interceptor,
      events,
      event_tx,
    })
  }

  pub async fn run(&mut self) -> Result<()> {
    self.start_lifecycle().await?;

    // Records left over from a previous run drain on the next online transition
    if !self.queue.is_empty()? {
      info!(
        pending = self.queue.len()?,
        "Re-arming sync trigger for records from a previous run"
      );
      self.scheduler.rearm(&self.config.sync.tag);
    }

    spawn_connectivity_watcher(
      Arc::clone(&self.origin),
      self.config.origin.base_url()?,
      Duration::from_secs(self.config.sync.probe_interval_secs),
      self.event_tx.clone(),
    );

    let listener = tokio::net::TcpListener::bind(&self.config.relay.listen)
      .await
      .map_err(|e| eyre!("Failed to bind {}: {}", self.config.relay.listen, e))?;

    let router = server::router(Arc::clone(&self.interceptor), self.config.origin.base_url()?);
    tokio::spawn(async move {
      if let Err(e) = axum::serve(listener, router).await {
        error!("Relay server exited: {}", e);
      }
    });

    info!(
      listen = %self.config.relay.listen,
      origin = %self.config.origin.url,
      "Relay serving"
    );

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => {
          info!("Shutting down");
          break;
        }
        maybe_event = self.events.next() => match maybe_event {
          Some(Event::Online) => {
            for tag in self.scheduler.take() {
              self.drain(&tag).await;
            }
          }
          Some(Event::SyncDue(tag)) => {
            self.scheduler.disarm(&tag);
            self.drain(&tag).await;
          }
          None => break,
        },
      }
    }

    Ok(())
  }

  /// Install-if-needed, then purge stale partitions. The relay only starts
  /// serving after this completes.
  async fn start_lifecycle(&self) -> Result<()> {
    let manifest = &self.config.cache.manifest;

    if !manifest.is_empty() && self.cache.needs_install()? {
      let base = self.config.origin.base_url()?;
      match self.cache.install(self.origin.as_ref(), &base, manifest).await {
        Ok(count) => info!(entries = count, "Shell partition installed"),
        // The shell stays empty and install is retried on the next startup
        Err(e) => error!("Shell install failed: {}", e),
      }
    }

    let purged = self.cache.activate()?;
    if !purged.is_empty() {
      info!(partitions = ?purged, "Purged stale cache partitions");
    }

    Ok(())
  }

  async fn drain(&self, tag: &str) {
    match self.coordinator.drain(tag).await {
      Ok(DrainOutcome::Flushed(_) | DrainOutcome::Empty | DrainOutcome::Ignored) => {}
      Ok(DrainOutcome::Retained { pending, failed }) => {
        warn!(
          pending,
          failed, "Sync pass left records queued; retrying on the next trigger"
        );
        self.scheduler.rearm(tag);
      }
      Err(e) => {
        error!("Sync pass failed: {}", e);
        self.scheduler.rearm(tag);
      }
    }
  }
}
