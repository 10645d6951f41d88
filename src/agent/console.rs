//! Terminal stand-ins for the notification and window interfaces.

use async_trait::async_trait;
use color_eyre::Result;
use tracing::info;
use url::Url;

use super::{Clients, Notification, Notifier};

/// Prints notifications to stdout.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
  async fn show(&self, notification: &Notification) -> Result<()> {
    info!(title = %notification.title, "showing notification");

    println!("[{}] {}", notification.options.icon, notification.title);
    println!("  {}", notification.options.body);
    if let Some(url) = &notification.options.data.url {
      println!("  -> {}", url);
    }

    Ok(())
  }

  fn close(&self, notification: &Notification) {
    info!(title = %notification.title, "notification closed");
  }
}

/// Prints the URL a window would be opened at.
pub struct ConsoleClients;

#[async_trait]
impl Clients for ConsoleClients {
  async fn open_window(&self, url: &Url) -> Result<()> {
    println!("open {}", url);
    Ok(())
  }
}
