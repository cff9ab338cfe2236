//! Request and response model shared across the relay.

use http::{Method, StatusCode};
use sha2::{Digest, Sha256};
use url::Url;

/// A request captured at the relay boundary, ready to be classified.
#[derive(Debug, Clone)]
pub struct RelayRequest {
  pub method: Method,
  pub url: Url,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl RelayRequest {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      content_type: None,
      body: Vec::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn with_body(mut self, content_type: Option<String>, body: Vec<u8>) -> Self {
    self.content_type = content_type;
    self.body = body;
    self
  }

  /// Whether the request targets an HTTP origin. Anything else bypasses
  /// interception entirely.
  pub fn is_http(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }

  pub fn identity(&self) -> RequestIdentity {
    RequestIdentity::new(self.method.clone(), self.url.clone())
  }
}

/// Cache identity of a request: method plus URL, fragment excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
  method: Method,
  url: Url,
}

impl RequestIdentity {
  pub fn new(method: Method, mut url: Url) -> Self {
    url.set_fragment(None);
    Self { method, url }
  }

  /// Stable fixed-length storage key (SHA256 over method + URL).
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form, kept alongside the hash for diagnostics.
  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

/// A response produced by the interceptor, tagged with where it came from.
#[derive(Debug, Clone)]
pub struct RelayResponse {
  pub status: StatusCode,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub source: ResponseSource,
}

/// Indicates how a relay response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Forwarded from the origin server
  Origin,
  /// Served from a cache partition while the origin was unreachable
  Cache,
  /// Synthesized locally (offline confirmation or decode error)
  Synthesized,
}

impl RelayResponse {
  /// Synthesize the fixed-shape JSON body `{"message": <text>}`.
  pub fn synthesized(status: StatusCode, message: &str) -> Self {
    let body = serde_json::json!({ "message": message });
    Self {
      status,
      content_type: Some("application/json".to_string()),
      body: body.to_string().into_bytes(),
      source: ResponseSource::Synthesized,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_cache_key_is_stable() {
    let a = RequestIdentity::new(Method::GET, url("http://origin.test/a?x=1"));
    let b = RequestIdentity::new(Method::GET, url("http://origin.test/a?x=1"));
    assert_eq!(a.cache_key(), b.cache_key());
  }

  #[test]
  fn test_cache_key_varies_by_method_and_url() {
    let get = RequestIdentity::new(Method::GET, url("http://origin.test/a"));
    let head = RequestIdentity::new(Method::HEAD, url("http://origin.test/a"));
    let other = RequestIdentity::new(Method::GET, url("http://origin.test/b"));
    assert_ne!(get.cache_key(), head.cache_key());
    assert_ne!(get.cache_key(), other.cache_key());
  }

  #[test]
  fn test_fragment_does_not_affect_identity() {
    let plain = RequestIdentity::new(Method::GET, url("http://origin.test/a"));
    let fragment = RequestIdentity::new(Method::GET, url("http://origin.test/a#section"));
    assert_eq!(plain.cache_key(), fragment.cache_key());
  }

  #[test]
  fn test_non_http_scheme_detected() {
    let req = RelayRequest::get(url("ftp://origin.test/file"));
    assert!(!req.is_http());
    assert!(RelayRequest::get(url("https://origin.test/")).is_http());
  }

  #[test]
  fn test_synthesized_response_shape() {
    let res = RelayResponse::synthesized(StatusCode::OK, "Saved offline");
    assert_eq!(res.content_type.as_deref(), Some("application/json"));
    let value: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
    assert_eq!(value["message"], "Saved offline");
  }
}
