//! Install and activate.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{info, warn};

use super::CacheAgent;
use crate::cache::CacheStorage;
use crate::event::ExtendableEvent;
use crate::http::Request;

impl<S: CacheStorage + 'static> CacheAgent<S> {
  /// Register installation on the event's lifetime.
  pub fn on_install(&self, event: &mut ExtendableEvent) {
    let agent = self.clone();
    event.wait_until(async move { agent.install().await });
  }

  /// Register activation on the event's lifetime.
  pub fn on_activate(&self, event: &mut ExtendableEvent) {
    let agent = self.clone();
    event.wait_until(async move { agent.activate().await });
  }

  /// Fetch every manifest asset and store them in the current version's
  /// store. Nothing is written unless every asset succeeded.
  pub async fn install(&self) -> Result<()> {
    let requests = self
      .config
      .precache
      .iter()
      .map(|path| self.resolve(path).map(Request::get))
      .collect::<Result<Vec<_>>>()?;

    let fetches = requests.into_iter().map(|request| async move {
      let response = self
        .fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", request.url, e))?;

      if !response.is_ok() {
        return Err(eyre!(
          "Failed to precache {}: server responded {}",
          request.url,
          response.status
        ));
      }

      Ok::<_, color_eyre::Report>((request, response))
    });
    let entries = try_join_all(fetches).await?;

    // put_all creates the store in the same transaction as the entries
    self.storage.put_all(self.version(), &entries)?;

    info!(cache = %self.version(), assets = entries.len(), "cache opened and manifest stored");
    Ok(())
  }

  /// Delete every store that does not belong to the current version. Every
  /// stale store is attempted; the first failure is returned.
  pub async fn activate(&self) -> Result<()> {
    let stale: Vec<String> = self
      .storage
      .keys()?
      .into_iter()
      .filter(|name| name != self.version())
      .collect();

    let mut first_error = None;
    for name in &stale {
      match self.storage.delete(name) {
        Ok(_) => info!(cache = %name, "deleted stale cache"),
        Err(e) => {
          warn!(cache = %name, error = %e, "failed to delete stale cache");
          first_error.get_or_insert(e);
        }
      }
    }

    if let Some(e) = first_error {
      return Err(e);
    }

    info!(cache = %self.version(), purged = stale.len(), "activated");
    Ok(())
  }
}
