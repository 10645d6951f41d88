//! Request and response snapshots, and the network interface.
//!
//! Responses are fully buffered so they can be cloned before one copy is
//! handed to the caller and the other is written to a cache store.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use url::Url;

/// How the request was issued by the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level page navigation
  Navigate,
  SameOrigin,
  NoCors,
  #[default]
  Cors,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
  pub mode: RequestMode,
  pub body: Option<Bytes>,
}

impl Request {
  /// A plain `GET` for the given URL.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: HeaderMap::new(),
      mode: RequestMode::default(),
      body: None,
    }
  }

  /// A `GET` issued as a page navigation.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      ..Self::get(url)
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.insert(name, value);
    self
  }

  pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = Some(body.into());
    self
  }

  pub fn is_navigation(&self) -> bool {
    self.mode == RequestMode::Navigate
  }
}

/// A buffered response snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
  pub status: StatusCode,
  pub status_text: String,
  pub headers: HeaderMap,
  pub body: Bytes,
}

impl Response {
  /// An empty response with the canonical reason phrase for `status`.
  pub fn new(status: StatusCode) -> Self {
    Self {
      status,
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers: HeaderMap::new(),
      body: Bytes::new(),
    }
  }

  pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = body.into();
    self
  }

  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.insert(name, value);
    self
  }

  /// The `503 Service Unavailable` response returned when neither the
  /// network nor the cache can answer.
  pub fn service_unavailable(message: &str) -> Self {
    Self::new(StatusCode::SERVICE_UNAVAILABLE)
      .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
      .with_body(message.to_string())
  }

  /// True for any 2xx status.
  pub fn is_ok(&self) -> bool {
    self.status.is_success()
  }

  /// Body decoded as UTF-8, with invalid sequences replaced.
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// Failure to get any response at all from the network.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
  #[error("network request failed: {0}")]
  Network(#[from] reqwest::Error),

  #[error("network unreachable: {0}")]
  Unreachable(String),
}

/// Network interface consumed by the agent.
#[async_trait]
pub trait Fetcher: Send + Sync {
  /// Issue the request and buffer the whole response.
  ///
  /// Any HTTP status is a successful fetch; only connectivity failures are
  /// errors.
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Fetcher backed by a shared reqwest client.
#[derive(Clone)]
pub struct ReqwestFetcher {
  client: reqwest::Client,
}

impl ReqwestFetcher {
  pub fn new() -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("offline-agent/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone())
      .headers(request.headers.clone());

    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder.send().await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.bytes().await?;

    Ok(Response {
      status,
      status_text: status.canonical_reason().unwrap_or_default().to_string(),
      headers,
      body,
    })
  }
}
