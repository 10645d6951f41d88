//! The cache agent: lifecycle, request routing and notifications.
//!
//! The agent never runs on its own. A host calls into it at fixed points
//! (install, activate, fetch, push, notification click) and the agent reaches
//! the outside world only through the interfaces it was built with.

mod console;
mod lifecycle;
mod push;
mod router;

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use url::Url;

use crate::cache::CacheStorage;
use crate::config::Config;
use crate::event::Background;
use crate::http::Fetcher;

pub use console::{ConsoleClients, ConsoleNotifier};
pub use push::NotificationDescriptor;
pub use router::{ServeSource, Served};

/// Data attached to a displayed notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationData {
  /// Page to open when the notification is clicked
  pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub data: NotificationData,
}

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub options: NotificationOptions,
}

/// Displays notifications to the user.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn show(&self, notification: &Notification) -> Result<()>;

  /// Dismiss a notification that is on screen.
  fn close(&self, notification: &Notification);
}

/// Opens application windows.
#[async_trait]
pub trait Clients: Send + Sync {
  async fn open_window(&self, url: &Url) -> Result<()>;
}

/// The caching agent for one cache generation.
pub struct CacheAgent<S: CacheStorage> {
  config: Arc<Config>,
  origin: Url,
  storage: Arc<S>,
  fetcher: Arc<dyn Fetcher>,
  notifier: Arc<dyn Notifier>,
  clients: Arc<dyn Clients>,
  background: Background,
}

impl<S: CacheStorage + 'static> CacheAgent<S> {
  /// Create an agent. The configuration is fixed for the agent's lifetime;
  /// a new cache generation needs a new agent.
  pub fn new(
    config: Config,
    storage: S,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    clients: Arc<dyn Clients>,
  ) -> Result<Self> {
    config.validate()?;
    let origin = config.origin_url()?;

    Ok(Self {
      config: Arc::new(config),
      origin,
      storage: Arc::new(storage),
      fetcher,
      notifier,
      clients,
      background: Background::default(),
    })
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Version tag, which is also the name of this agent's cache store.
  pub fn version(&self) -> &str {
    &self.config.version
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Cache writes that have been started but not awaited.
  pub fn background(&self) -> &Background {
    &self.background
  }

  /// Whether the store for the current version exists.
  pub fn is_installed(&self) -> Result<bool> {
    self.storage.has(self.version())
  }

  /// Whether `url` belongs to the application's own origin.
  pub fn is_same_origin(&self, url: &Url) -> bool {
    url.origin() == self.origin.origin()
  }

  /// Resolve a path (or absolute URL) against the application origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Failed to resolve '{}' against {}: {}", path, self.origin, e))
  }
}

impl<S: CacheStorage> Clone for CacheAgent<S> {
  fn clone(&self) -> Self {
    Self {
      config: Arc::clone(&self.config),
      origin: self.origin.clone(),
      storage: Arc::clone(&self.storage),
      fetcher: Arc::clone(&self.fetcher),
      notifier: Arc::clone(&self.notifier),
      clients: Arc::clone(&self.clients),
      background: self.background.clone(),
    }
  }
}
