//! Request routing: cache-first for the application's own assets,
//! network-first for everything else.

use reqwest::{Method, StatusCode};
use std::sync::Arc;
use tracing::{debug, warn};

use super::CacheAgent;
use crate::cache::CacheStorage;
use crate::http::{Request, Response};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
  /// Cache hit, no network attempted
  Cache,
  /// Fresh from the network
  Network,
  /// Network failed, serving a cached copy
  Offline,
  /// Navigation could not be served, showing the offline page
  OfflinePage,
  /// Neither network nor cache could answer
  Synthesized,
}

/// A response together with its source.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ServeSource,
}

impl Served {
  fn new(response: Response, source: ServeSource) -> Self {
    Self { response, source }
  }
}

impl<S: CacheStorage + 'static> CacheAgent<S> {
  /// Answer an intercepted request.
  pub async fn handle_fetch(&self, request: Request) -> Served {
    if self.is_same_origin(&request.url) {
      self.cache_first(request).await
    } else {
      self.network_first(request).await
    }
  }

  /// Answer a request without involving the cache, as for a page the agent
  /// does not control yet.
  pub async fn passthrough(&self, request: Request) -> Served {
    match self.fetcher.fetch(&request).await {
      Ok(response) => Served::new(response, ServeSource::Network),
      Err(e) => {
        debug!(url = %request.url, error = %e, "uncontrolled fetch failed");
        self.unavailable()
      }
    }
  }

  /// Cache-first:
  ///
  /// 1. Check cache - a hit is returned as is, never revalidated
  /// 2. On miss, fetch from network and cache a 200 in the background
  /// 3. Non-200 or network failure: offline page for navigations, otherwise
  ///    the failing response or a synthesized 503
  async fn cache_first(&self, request: Request) -> Served {
    if let Some(cached) = self.lookup(&request) {
      debug!(url = %request.url, "served from cache");
      return Served::new(cached, ServeSource::Cache);
    }

    match self.fetcher.fetch(&request).await {
      Ok(response) if response.status == StatusCode::OK => {
        self.store_in_background(request, response.clone());
        Served::new(response, ServeSource::Network)
      }
      Ok(response) => {
        debug!(url = %request.url, status = %response.status, "network returned an error status");
        if request.is_navigation() {
          self.offline_page()
        } else {
          Served::new(response, ServeSource::Network)
        }
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network unavailable");
        if request.is_navigation() {
          self.offline_page()
        } else {
          self.unavailable()
        }
      }
    }
  }

  /// Network-first:
  ///
  /// 1. Fetch from network; a GET answered with 200 is cached in the background
  /// 2. On network failure, fall back to the cached copy
  async fn network_first(&self, request: Request) -> Served {
    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        if request.method == Method::GET && response.status == StatusCode::OK {
          self.store_in_background(request, response.clone());
        }
        Served::new(response, ServeSource::Network)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "network unavailable, trying cache");
        match self.lookup(&request) {
          Some(cached) => Served::new(cached, ServeSource::Offline),
          None => self.unavailable(),
        }
      }
    }
  }

  /// Look the request up in the current store. Storage errors count as a miss.
  fn lookup(&self, request: &Request) -> Option<Response> {
    match self.storage.match_request(self.version(), request) {
      Ok(hit) => hit.map(|cached| cached.response),
      Err(e) => {
        warn!(url = %request.url, error = %e, "cache lookup failed");
        None
      }
    }
  }

  fn offline_page(&self) -> Served {
    let page = match self.resolve(&self.config.offline_page) {
      Ok(url) => self.lookup(&Request::get(url)),
      Err(e) => {
        warn!(error = %e, "offline page has no valid URL");
        None
      }
    };

    match page {
      Some(response) => Served::new(response, ServeSource::OfflinePage),
      None => {
        warn!(page = %self.config.offline_page, "offline page is not cached");
        self.unavailable()
      }
    }
  }

  fn unavailable(&self) -> Served {
    Served::new(
      Response::service_unavailable(&self.config.offline_message),
      ServeSource::Synthesized,
    )
  }

  /// Write a response copy to the current store without waiting for it.
  fn store_in_background(&self, request: Request, response: Response) {
    let storage = Arc::clone(&self.storage);
    let cache = self.version().to_string();

    self.background.spawn(async move {
      match storage.put(&cache, &request, &response) {
        Ok(()) => debug!(url = %request.url, cache = %cache, "cached response"),
        Err(e) => warn!(url = %request.url, error = %e, "failed to cache response"),
      }
    });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{app_url, harness, Harness, ScriptedFetcher};
  use reqwest::header::{HeaderValue, CONTENT_TYPE};
  use url::Url;

  const API: &str = "https://story-api.dicoding.dev/v1/stories";

  fn api() -> Url {
    Url::parse(API).unwrap()
  }

  fn cached(h: &Harness, request: &Request) -> Option<Response> {
    h.agent
      .storage()
      .match_request(h.agent.version(), request)
      .unwrap()
      .map(|c| c.response)
  }

  fn seed(h: &Harness, request: &Request, body: &str) {
    h.agent
      .storage()
      .put(
        h.agent.version(),
        request,
        &Response::new(StatusCode::OK).with_body(body.to_string()),
      )
      .unwrap();
  }

  #[tokio::test]
  async fn test_same_origin_hit_skips_network() {
    let h = harness(ScriptedFetcher::default().respond(app_url("/app.bundle.js").as_str(), 200, "new"));
    let request = Request::get(app_url("/app.bundle.js"));
    seed(&h, &request, "old");

    let served = h.agent.handle_fetch(request).await;

    assert_eq!(served.source, ServeSource::Cache);
    assert_eq!(served.response.text(), "old");
    assert!(h.fetcher.calls().is_empty());
  }

  #[tokio::test]
  async fn test_same_origin_miss_is_fetched_and_cached() {
    let h = harness(ScriptedFetcher::default().respond(app_url("/app.bundle.js").as_str(), 200, "js"));
    let request = Request::get(app_url("/app.bundle.js"));

    let served = h.agent.handle_fetch(request.clone()).await;
    assert_eq!(served.source, ServeSource::Network);
    assert_eq!(served.response.text(), "js");

    h.agent.background().drain().await;
    assert_eq!(cached(&h, &request).unwrap().text(), "js");

    // Second request never reaches the network
    let served = h.agent.handle_fetch(request).await;
    assert_eq!(served.source, ServeSource::Cache);
    assert_eq!(h.fetcher.calls().len(), 1);
  }

  #[tokio::test]
  async fn test_response_returned_before_cache_write_lands() {
    let h = harness(ScriptedFetcher::default().respond(app_url("/app.webmanifest").as_str(), 200, "{}"));
    let request = Request::get(app_url("/app.webmanifest"));

    // Current-thread runtime: the write cannot run until this test yields
    let served = h.agent.handle_fetch(request.clone()).await;
    assert_eq!(served.source, ServeSource::Network);
    assert!(!h.agent.background().is_empty());
    assert!(cached(&h, &request).is_none());

    h.agent.background().drain().await;
    assert_eq!(cached(&h, &request).unwrap().text(), "{}");
  }

  #[tokio::test]
  async fn test_same_origin_navigation_offline_gets_offline_page() {
    let h = harness(ScriptedFetcher::default());
    seed(&h, &Request::get(app_url("/offline.html")), "you are offline");

    let served = h.agent.handle_fetch(Request::navigate(app_url("/stories/42"))).await;

    assert_eq!(served.source, ServeSource::OfflinePage);
    assert_eq!(served.response.text(), "you are offline");
  }

  #[tokio::test]
  async fn test_same_origin_navigation_error_status_gets_offline_page() {
    let h = harness(ScriptedFetcher::default().respond(app_url("/missing").as_str(), 404, "nope"));
    seed(&h, &Request::get(app_url("/offline.html")), "you are offline");

    let served = h.agent.handle_fetch(Request::navigate(app_url("/missing"))).await;

    assert_eq!(served.source, ServeSource::OfflinePage);
    assert_eq!(served.response.status, StatusCode::OK);
  }

  #[tokio::test]
  async fn test_same_origin_404_returned_unmodified_and_not_cached() {
    let h = harness(ScriptedFetcher::default().respond(app_url("/img/cat.png").as_str(), 404, "nope"));
    seed(&h, &Request::get(app_url("/offline.html")), "you are offline");
    let request = Request::get(app_url("/img/cat.png"));

    let served = h.agent.handle_fetch(request.clone()).await;
    h.agent.background().drain().await;

    assert_eq!(served.source, ServeSource::Network);
    assert_eq!(served.response.status, StatusCode::NOT_FOUND);
    assert_eq!(served.response.text(), "nope");
    assert!(cached(&h, &request).is_none());
  }

  #[tokio::test]
  async fn test_same_origin_asset_offline_gets_503() {
    let h = harness(ScriptedFetcher::default());

    let served = h.agent.handle_fetch(Request::get(app_url("/app.bundle.js"))).await;

    assert_eq!(served.source, ServeSource::Synthesized);
    assert_eq!(served.response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(served.response.status_text, "Service Unavailable");
    assert_eq!(
      served.response.headers.get(CONTENT_TYPE),
      Some(&HeaderValue::from_static("text/plain"))
    );
    assert_eq!(served.response.text(), h.agent.config().offline_message);
  }

  #[tokio::test]
  async fn test_navigation_without_cached_offline_page_gets_503() {
    let h = harness(ScriptedFetcher::default());

    let served = h.agent.handle_fetch(Request::navigate(app_url("/"))).await;

    assert_eq!(served.source, ServeSource::Synthesized);
    assert_eq!(served.response.status, StatusCode::SERVICE_UNAVAILABLE);
  }

  #[tokio::test]
  async fn test_cross_origin_200_is_returned_and_cached() {
    let h = harness(ScriptedFetcher::default().respond(API, 200, r#"{"listStory":[]}"#));
    let request = Request::get(api());

    let served = h.agent.handle_fetch(request.clone()).await;
    h.agent.background().drain().await;

    assert_eq!(served.source, ServeSource::Network);
    assert_eq!(served.response.text(), r#"{"listStory":[]}"#);
    assert!(cached(&h, &request).is_some());
  }

  #[tokio::test]
  async fn test_cross_origin_500_is_returned_not_cached() {
    let h = harness(ScriptedFetcher::default().respond(API, 500, "boom"));
    let request = Request::get(api());

    let served = h.agent.handle_fetch(request.clone()).await;
    h.agent.background().drain().await;

    assert_eq!(served.response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(cached(&h, &request).is_none());
  }

  #[tokio::test]
  async fn test_cross_origin_prefers_network_over_cache() {
    let h = harness(ScriptedFetcher::default().respond(API, 200, "fresh"));
    let request = Request::get(api());
    seed(&h, &request, "stale");

    let served = h.agent.handle_fetch(request.clone()).await;
    h.agent.background().drain().await;

    assert_eq!(served.response.text(), "fresh");
    assert_eq!(cached(&h, &request).unwrap().text(), "fresh");
  }

  #[tokio::test]
  async fn test_cross_origin_post_is_not_cached() {
    let h = harness(ScriptedFetcher::default().respond(API, 200, "created"));
    let request = Request::get(api()).with_method(Method::POST).with_body("{}");

    let served = h.agent.handle_fetch(request).await;
    h.agent.background().drain().await;

    assert_eq!(served.response.text(), "created");
    assert!(cached(&h, &Request::get(api())).is_none());
    assert!(h.agent.background().is_empty());
  }

  #[tokio::test]
  async fn test_cross_origin_offline_serves_cached_copy() {
    let h = harness(ScriptedFetcher::default().respond(API, 200, "stories"));
    let request = Request::get(api());

    h.agent.handle_fetch(request.clone()).await;
    h.agent.background().drain().await;
    h.fetcher.go_offline();

    let served = h.agent.handle_fetch(request).await;
    assert_eq!(served.source, ServeSource::Offline);
    assert_eq!(served.response.text(), "stories");
  }

  #[tokio::test]
  async fn test_cross_origin_offline_miss_gets_503() {
    let h = harness(ScriptedFetcher::default());

    let served = h.agent.handle_fetch(Request::get(api())).await;

    assert_eq!(served.source, ServeSource::Synthesized);
    assert_eq!(served.response.status, StatusCode::SERVICE_UNAVAILABLE);
  }

  #[tokio::test]
  async fn test_other_versions_are_not_consulted() {
    let h = harness(ScriptedFetcher::default());
    let request = Request::get(app_url("/app.bundle.js"));
    h.agent
      .storage()
      .put(
        "storyapp-v1.0.0",
        &request,
        &Response::new(StatusCode::OK).with_body("old"),
      )
      .unwrap();

    let served = h.agent.handle_fetch(request).await;
    assert_eq!(served.source, ServeSource::Synthesized);
  }

  #[tokio::test]
  async fn test_passthrough_ignores_cache() {
    let h = harness(ScriptedFetcher::default().respond(app_url("/").as_str(), 200, "live"));
    let request = Request::get(app_url("/"));
    seed(&h, &request, "cached");

    let served = h.agent.passthrough(request.clone()).await;
    h.agent.background().drain().await;

    assert_eq!(served.source, ServeSource::Network);
    assert_eq!(served.response.text(), "live");
    assert_eq!(cached(&h, &request).unwrap().text(), "cached");
  }
}
