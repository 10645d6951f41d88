use bytes::Bytes;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::path::PathBuf;
use std::sync::Arc;

use offline_agent::agent::{
  ConsoleClients, ConsoleNotifier, Notification, NotificationData, NotificationOptions,
};
use offline_agent::cache::{CacheStorage, SqliteStorage};
use offline_agent::http::{ReqwestFetcher, Request};
use offline_agent::{logging, CacheAgent, Config, ServiceHost, WorkerState};

#[derive(Parser, Debug)]
#[command(name = "offline-agent")]
#[command(about = "Offline-first caching agent for the StoryApp")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-agent/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the asset manifest for the current version
  Install,
  /// Delete caches of every other version
  Activate,
  /// Route a request through the agent and print the response
  Fetch {
    /// Absolute URL, or a path on the application origin
    url: String,
    #[arg(short, long, default_value = "GET")]
    method: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
  },
  /// Deliver a push message
  Push {
    /// Message payload, JSON or plain text
    payload: Option<String>,
  },
  /// Click a notification
  Click {
    /// URL attached to the notification
    #[arg(long)]
    url: Option<String>,
  },
  /// List cache stores
  Caches,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging)?;

  let storage = match &config.storage.path {
    Some(path) => SqliteStorage::open(path)?,
    None => SqliteStorage::open_default()?,
  };

  if let Command::Caches = args.command {
    for name in storage.keys()? {
      let marker = if name == config.version { "*" } else { " " };
      println!("{} {}", marker, name);
    }
    return Ok(());
  }

  let fetcher = ReqwestFetcher::new()?;
  let agent = CacheAgent::new(
    config,
    storage,
    Arc::new(fetcher),
    Arc::new(ConsoleNotifier),
    Arc::new(ConsoleClients),
  )?;

  let (host, worker) = match args.command {
    Command::Install => ServiceHost::spawn(agent.clone(), WorkerState::Parsed),
    _ => ServiceHost::resume(agent.clone())?,
  };

  match args.command {
    Command::Install => host.install().await?,
    Command::Activate => host.activate().await?,
    Command::Fetch {
      url,
      method,
      navigate,
    } => {
      let url = agent.resolve(&url)?;
      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;
      let request = if navigate {
        Request::navigate(url)
      } else {
        Request::get(url)
      }
      .with_method(method);

      let served = host.fetch(request).await?;
      eprintln!(
        "{} {} ({:?})",
        served.response.status.as_u16(),
        served.response.status_text,
        served.source
      );
      println!("{}", served.response.text());
    }
    Command::Push { payload } => host.push(payload.map(Bytes::from)).await?,
    Command::Click { url } => {
      let defaults = &agent.config().notifications;
      let notification = Notification {
        title: defaults.title.clone(),
        options: NotificationOptions {
          body: defaults.body.clone(),
          icon: defaults.icon.clone(),
          badge: defaults.badge.clone(),
          data: NotificationData { url },
        },
      };
      host.notification_click(notification).await?;
    }
    Command::Caches => {}
  }

  // Let in-flight work and background cache writes finish
  drop(host);
  worker.await?;

  Ok(())
}
