//! Push messages and notification clicks.

use color_eyre::eyre::eyre;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::{CacheAgent, Notification, NotificationData, NotificationOptions};
use crate::cache::CacheStorage;
use crate::config::NotificationConfig;
use crate::event::ExtendableEvent;

/// What to show for one push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDescriptor {
  pub title: String,
  pub body: String,
  pub url: String,
}

impl NotificationDescriptor {
  /// Interpret a push payload. Never fails: malformed payloads fall back to
  /// plain text, and anything missing takes the configured default.
  pub fn from_payload(payload: Option<&[u8]>, defaults: &NotificationConfig) -> Self {
    let (title, body, url) = match payload {
      None => (
        Some(defaults.fallback_title.clone()),
        Some(defaults.empty_body.clone()),
        None,
      ),
      Some(bytes) => match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(fields)) => (
          string_field(&fields, "title"),
          string_field(&fields, "body"),
          string_field(&fields, "url"),
        ),
        // Valid JSON, but nothing we can read fields from
        Ok(_) => (None, None, None),
        Err(_) => (
          Some(defaults.fallback_title.clone()),
          Some(String::from_utf8_lossy(bytes).into_owned()),
          None,
        ),
      },
    };

    Self {
      title: non_empty(title).unwrap_or_else(|| defaults.title.clone()),
      body: non_empty(body).unwrap_or_else(|| defaults.body.clone()),
      url: non_empty(url).unwrap_or_else(|| defaults.url.clone()),
    }
  }

  pub fn into_notification(self, defaults: &NotificationConfig) -> Notification {
    Notification {
      title: self.title,
      options: NotificationOptions {
        body: self.body,
        icon: defaults.icon.clone(),
        badge: defaults.badge.clone(),
        data: NotificationData { url: Some(self.url) },
      },
    }
  }
}

// Non-string values such as {"title": 7} are ignored, not stringified
fn string_field(fields: &Map<String, Value>, name: &str) -> Option<String> {
  fields.get(name).and_then(Value::as_str).map(String::from)
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|v| !v.is_empty())
}

impl<S: CacheStorage + 'static> CacheAgent<S> {
  /// Show one notification for a push message, keeping the event alive
  /// until it is displayed.
  pub fn on_push(&self, event: &mut ExtendableEvent, payload: Option<&[u8]>) {
    let defaults = &self.config.notifications;
    let notification = NotificationDescriptor::from_payload(payload, defaults).into_notification(defaults);
    debug!(title = %notification.title, "push received");

    let notifier = Arc::clone(&self.notifier);
    event.wait_until(async move { notifier.show(&notification).await });
  }

  /// Close the clicked notification and open a window at its URL.
  pub fn on_notification_click(&self, event: &mut ExtendableEvent, notification: Notification) {
    self.notifier.close(&notification);

    let target = notification
      .options
      .data
      .url
      .as_deref()
      .filter(|url| !url.is_empty())
      .unwrap_or("/");
    let url = self.resolve(target);

    let clients = Arc::clone(&self.clients);
    event.wait_until(async move {
      let url = url?;
      info!(url = %url, "opening window for notification");
      clients
        .open_window(&url)
        .await
        .map_err(|e| eyre!("Failed to open window at {}: {}", url, e))
    });
  }
}
