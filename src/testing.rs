//! Test doubles for the agent's outside interfaces.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

use crate::agent::{CacheAgent, Clients, Notification, Notifier};
use crate::cache::SqliteStorage;
use crate::config::Config;
use crate::http::{FetchError, Fetcher, Request, Response};

pub const ORIGIN: &str = "http://localhost:8080";

/// Absolute URL for a path on the test origin.
pub fn app_url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

#[derive(Clone)]
enum Route {
  Respond(Response),
  Down,
}

/// Fetcher answering from a fixed table. Unknown URLs are unreachable.
#[derive(Default)]
pub struct ScriptedFetcher {
  routes: Mutex<HashMap<String, Route>>,
  calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
  pub fn respond(self, url: &str, status: u16, body: &str) -> Self {
    self.set(url, status, body);
    self
  }

  pub fn set(&self, url: &str, status: u16, body: &str) {
    let response = Response::new(StatusCode::from_u16(status).unwrap()).with_body(body.to_string());
    self.set_response(url, response);
  }

  pub fn set_response(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Route::Respond(response));
  }

  pub fn go_offline(&self) {
    for route in self.routes.lock().unwrap().values_mut() {
      *route = Route::Down;
    }
  }

  /// URLs fetched so far, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
    let url = request.url.to_string();
    self.calls.lock().unwrap().push(url.clone());

    match self.routes.lock().unwrap().get(&url).cloned() {
      Some(Route::Respond(response)) => Ok(response),
      Some(Route::Down) | None => Err(FetchError::Unreachable(url)),
    }
  }
}

#[derive(Default)]
pub struct RecordingNotifier {
  pub shown: Mutex<Vec<Notification>>,
  pub closed: Mutex<Vec<Notification>>,
  pub fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn show(&self, notification: &Notification) -> Result<()> {
    if self.fail {
      return Err(eyre!("notifications are blocked"));
    }
    self.shown.lock().unwrap().push(notification.clone());
    Ok(())
  }

  fn close(&self, notification: &Notification) {
    self.closed.lock().unwrap().push(notification.clone());
  }
}

#[derive(Default)]
pub struct RecordingClients {
  pub opened: Mutex<Vec<Url>>,
}

#[async_trait]
impl Clients for RecordingClients {
  async fn open_window(&self, url: &Url) -> Result<()> {
    self.opened.lock().unwrap().push(url.clone());
    Ok(())
  }
}

/// An agent over in-memory storage plus handles to its doubles.
pub struct Harness {
  pub agent: CacheAgent<SqliteStorage>,
  pub fetcher: Arc<ScriptedFetcher>,
  pub notifier: Arc<RecordingNotifier>,
  pub clients: Arc<RecordingClients>,
}

pub fn harness(fetcher: ScriptedFetcher) -> Harness {
  harness_with(Config::default(), fetcher, RecordingNotifier::default())
}

pub fn harness_with(config: Config, fetcher: ScriptedFetcher, notifier: RecordingNotifier) -> Harness {
  let fetcher = Arc::new(fetcher);
  let notifier = Arc::new(notifier);
  let clients = Arc::new(RecordingClients::default());

  let agent = CacheAgent::new(
    Config {
      origin: ORIGIN.to_string(),
      ..config
    },
    SqliteStorage::open_in_memory().unwrap(),
    fetcher.clone(),
    notifier.clone(),
    clients.clone(),
  )
  .unwrap();

  Harness {
    agent,
    fetcher,
    notifier,
    clients,
  }
}

/// A fetcher that serves every asset of the default manifest.
pub fn manifest_fetcher() -> ScriptedFetcher {
  Config::default()
    .precache
    .iter()
    .fold(ScriptedFetcher::default(), |fetcher, path| {
      let body = format!("asset {path}");
      fetcher.respond(app_url(path).as_str(), 200, &body)
    })
}
