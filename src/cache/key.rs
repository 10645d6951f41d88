//! Request normalization for cache lookups.

use reqwest::header::{HeaderMap, VARY};
use sha2::{Digest, Sha256};

use crate::http::{Request, Response};

/// Normalized descriptor of a request used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  /// Build a key from a request. The URL fragment never reaches the server,
  /// so it is not part of the key.
  pub fn from_request(request: &Request) -> Self {
    let mut url = request.url.clone();
    url.set_fragment(None);

    Self {
      method: request.method.as_str().to_string(),
      url: url.to_string(),
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  /// Stable fixed-length hash used as the storage primary key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Request header values a stored response varies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VaryHeaders(Vec<(String, Option<String>)>);

impl VaryHeaders {
  /// Capture the request headers named by the response's `Vary` header.
  ///
  /// Returns `None` for `Vary: *`, which can never be matched.
  pub fn capture(request: &Request, response: &Response) -> Option<Self> {
    let mut captured = Vec::new();

    for name in vary_names(&response.headers) {
      if name == "*" {
        return None;
      }
      let value = header_text(&request.headers, &name);
      captured.push((name, value));
    }

    Some(Self(captured))
  }

  /// Whether the request carries the same values as the stored request.
  pub fn matches(&self, request: &Request) -> bool {
    self
      .0
      .iter()
      .all(|(name, value)| header_text(&request.headers, name) == *value)
  }
}

fn vary_names(headers: &HeaderMap) -> Vec<String> {
  headers
    .get_all(VARY)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(','))
    .map(|name| name.trim().to_lowercase())
    .filter(|name| !name.is_empty())
    .collect()
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
  headers
    .get(name)
    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}
