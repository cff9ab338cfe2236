//! Inbound HTTP surface: a catch-all axum route feeding the interceptor.

use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use axum::Router;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::cache::PartitionStore;
use crate::intercept::Interceptor;
use crate::outbox::RecordStore;
use crate::request::RelayRequest;

/// Largest request body the relay will buffer.
const BODY_LIMIT: usize = 10 * 1024 * 1024;

pub struct RelayState<S: PartitionStore, R: RecordStore> {
  interceptor: Arc<Interceptor<S, R>>,
  origin_base: Url,
}

impl<S: PartitionStore, R: RecordStore> Clone for RelayState<S, R> {
  fn clone(&self) -> Self {
    Self {
      interceptor: Arc::clone(&self.interceptor),
      origin_base: self.origin_base.clone(),
    }
  }
}

/// Build the relay router. Every path and method funnels into the
/// interceptor against the configured origin.
pub fn router<S, R>(interceptor: Arc<Interceptor<S, R>>, origin_base: Url) -> Router
where
  S: PartitionStore + 'static,
  R: RecordStore + 'static,
{
  Router::new().fallback(relay::<S, R>).with_state(RelayState {
    interceptor,
    origin_base,
  })
}

async fn relay<S, R>(State(state): State<RelayState<S, R>>, request: Request) -> Response
where
  S: PartitionStore + 'static,
  R: RecordStore + 'static,
{
  let (parts, body) = request.into_parts();

  let target = match parts.uri.path_and_query() {
    Some(pq) => state.origin_base.join(pq.as_str()),
    None => state.origin_base.join(parts.uri.path()),
  };
  let url = match target {
    Ok(url) => url,
    Err(e) => {
      return (StatusCode::BAD_REQUEST, format!("invalid request path: {e}")).into_response()
    }
  };

  let content_type = parts
    .headers
    .get(CONTENT_TYPE)
    .and_then(|v| v.to_str().ok())
    .map(String::from);

  let bytes = match axum::body::to_bytes(body, BODY_LIMIT).await {
    Ok(bytes) => bytes,
    Err(e) => {
      return (
        StatusCode::PAYLOAD_TOO_LARGE,
        format!("failed to read request body: {e}"),
      )
        .into_response()
    }
  };

  let relay_request = RelayRequest::new(parts.method, url).with_body(content_type, bytes.to_vec());

  match state.interceptor.handle(relay_request).await {
    Ok(res) => {
      let mut headers = HeaderMap::new();
      if let Some(ct) = res.content_type.as_deref() {
        if let Ok(value) = HeaderValue::from_str(ct) {
          headers.insert(CONTENT_TYPE, value);
        }
      }
      (res.status, headers, res.body).into_response()
    }
    Err(e) => {
      warn!("Request could not be resolved: {}", e);
      (StatusCode::BAD_GATEWAY, format!("origin unreachable: {e}")).into_response()
    }
  }
}
