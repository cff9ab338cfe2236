//! Origin client: the relay's outbound HTTP seam.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde_json::Value;
use url::Url;

use crate::request::RelayRequest;

/// A response that actually reached us from the origin. An HTTP error status
/// is still a response; only transport failures surface as `Err`.
#[derive(Debug, Clone)]
pub struct OriginResponse {
  pub status: StatusCode,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

/// Outbound network access, abstracted so the interceptor and the sync
/// coordinator can be exercised against a scripted origin in tests.
#[async_trait]
pub trait Origin: Send + Sync {
  /// Forward a captured request to the origin verbatim.
  async fn forward(&self, req: &RelayRequest) -> Result<OriginResponse>;

  /// POST a JSON payload to an absolute URL with `Content-Type: application/json`.
  async fn post_json(&self, url: &Url, payload: &Value) -> Result<OriginResponse>;
}

/// Production origin client backed by reqwest.
pub struct HttpOrigin {
  client: reqwest::Client,
}

impl HttpOrigin {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Origin for HttpOrigin {
  async fn forward(&self, req: &RelayRequest) -> Result<OriginResponse> {
    let mut builder = self.client.request(req.method.clone(), req.url.clone());

    if let Some(ct) = &req.content_type {
      builder = builder.header(CONTENT_TYPE, ct);
    }
    if !req.body.is_empty() {
      builder = builder.body(req.body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach origin for {}: {}", req.url, e))?;

    read_response(response).await
  }

  async fn post_json(&self, url: &Url, payload: &Value) -> Result<OriginResponse> {
    let response = self
      .client
      .post(url.clone())
      .json(payload)
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach origin for {}: {}", url, e))?;

    read_response(response).await
  }
}

async fn read_response(response: reqwest::Response) -> Result<OriginResponse> {
  let status = response.status();
  let content_type = response
    .headers()
    .get(CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .map(String::from);

  let body = response
    .bytes()
    .await
    .map_err(|e| eyre!("Failed to read origin response body: {}", e))?
    .to_vec();

  Ok(OriginResponse {
    status,
    content_type,
    body,
  })
}

#[cfg(test)]
pub mod testing {
  //! Scripted origin for exercising interception and sync without a network.

  use std::collections::{HashMap, VecDeque};
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::Mutex;

  use super::*;

  pub struct FakeOrigin {
    routes: Mutex<HashMap<String, OriginResponse>>,
    offline: AtomicBool,
    forward_calls: AtomicUsize,
    posts: Mutex<Vec<(Url, Value)>>,
    post_statuses: Mutex<VecDeque<StatusCode>>,
  }

  impl FakeOrigin {
    pub fn new() -> Self {
      Self {
        routes: Mutex::new(HashMap::new()),
        offline: AtomicBool::new(false),
        forward_calls: AtomicUsize::new(0),
        posts: Mutex::new(Vec::new()),
        post_statuses: Mutex::new(VecDeque::new()),
      }
    }

    pub fn on(&self, method: &str, url: &str, status: StatusCode, body: &[u8]) {
      self.routes.lock().unwrap().insert(
        format!("{} {}", method, url),
        OriginResponse {
          status,
          content_type: Some("text/plain".to_string()),
          body: body.to_vec(),
        },
      );
    }

    pub fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    /// Queue statuses returned by successive `post_json` calls; defaults to 200.
    pub fn script_post_statuses(&self, statuses: &[StatusCode]) {
      self.post_statuses.lock().unwrap().extend(statuses.iter().copied());
    }

    pub fn forward_calls(&self) -> usize {
      self.forward_calls.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> Vec<(Url, Value)> {
      self.posts.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl Origin for FakeOrigin {
    async fn forward(&self, req: &RelayRequest) -> Result<OriginResponse> {
      self.forward_calls.fetch_add(1, Ordering::SeqCst);

      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("Failed to reach origin for {}: connection refused", req.url));
      }

      let key = format!("{} {}", req.method, req.url);
      match self.routes.lock().unwrap().get(&key) {
        Some(response) => Ok(response.clone()),
        None => Ok(OriginResponse {
          status: StatusCode::NOT_FOUND,
          content_type: None,
          body: Vec::new(),
        }),
      }
    }

    async fn post_json(&self, url: &Url, payload: &Value) -> Result<OriginResponse> {
      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("Failed to reach origin for {}: connection refused", url));
      }

      self.posts.lock().unwrap().push((url.clone(), payload.clone()));

      let status = self
        .post_statuses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(StatusCode::OK);

      Ok(OriginResponse {
        status,
        content_type: None,
        body: Vec::new(),
      })
    }
  }
}
