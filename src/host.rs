//! Supervising loop that delivers lifecycle events to the agent.
//!
//! The host owns the worker state. Install and activate run one at a time on
//! the loop; fetch, push and click events are spawned so a slow one does not
//! hold up the rest. When every [`HostHandle`] is dropped the loop stops
//! accepting events, waits for in-flight events and background cache writes,
//! and exits.

use bytes::Bytes;
use color_eyre::{eyre::eyre, Result};
use std::fmt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::agent::{CacheAgent, Notification, Served};
use crate::cache::CacheStorage;
use crate::event::ExtendableEvent;
use crate::http::Request;

/// Lifecycle state of the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
  /// Install failed; the worker will never control pages
  Redundant,
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Self::Parsed => "parsed",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Activated => "activated",
      Self::Redundant => "redundant",
    };
    f.write_str(name)
  }
}

enum Command {
  Install(oneshot::Sender<Result<()>>),
  Activate(oneshot::Sender<Result<()>>),
  Fetch(Request, oneshot::Sender<Served>),
  Push(Option<Bytes>, oneshot::Sender<Result<()>>),
  NotificationClick(Notification, oneshot::Sender<Result<()>>),
  State(oneshot::Sender<WorkerState>),
}

/// Submits events to a running host.
#[derive(Clone)]
pub struct HostHandle {
  tx: mpsc::UnboundedSender<Command>,
}

impl HostHandle {
  async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
    let (tx, rx) = oneshot::channel();
    self
      .tx
      .send(command(tx))
      .map_err(|_| eyre!("Host has stopped"))?;
    rx.await.map_err(|_| eyre!("Host dropped the event"))
  }

  pub async fn install(&self) -> Result<()> {
    self.request(Command::Install).await?
  }

  pub async fn activate(&self) -> Result<()> {
    self.request(Command::Activate).await?
  }

  pub async fn fetch(&self, request: Request) -> Result<Served> {
    self.request(|tx| Command::Fetch(request, tx)).await
  }

  pub async fn push(&self, payload: Option<Bytes>) -> Result<()> {
    self.request(|tx| Command::Push(payload, tx)).await?
  }

  pub async fn notification_click(&self, notification: Notification) -> Result<()> {
    self
      .request(|tx| Command::NotificationClick(notification, tx))
      .await?
  }

  pub async fn state(&self) -> Result<WorkerState> {
    self.request(Command::State).await
  }
}

/// Event loop driving one agent.
pub struct ServiceHost<S: CacheStorage> {
  agent: CacheAgent<S>,
  state: WorkerState,
  rx: mpsc::UnboundedReceiver<Command>,
  in_flight: JoinSet<()>,
}

impl<S: CacheStorage + 'static> ServiceHost<S> {
  /// Start a host for `agent` in the given state.
  pub fn spawn(agent: CacheAgent<S>, state: WorkerState) -> (HostHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();

    let host = Self {
      agent,
      state,
      rx,
      in_flight: JoinSet::new(),
    };
    let worker = tokio::spawn(host.run());

    (HostHandle { tx }, worker)
  }

  /// Start a host that is already activated if the current version's store
  /// exists, and freshly parsed otherwise.
  pub fn resume(agent: CacheAgent<S>) -> Result<(HostHandle, JoinHandle<()>)> {
    let state = if agent.is_installed()? {
      WorkerState::Activated
    } else {
      WorkerState::Parsed
    };

    Ok(Self::spawn(agent, state))
  }

  async fn run(mut self) {
    info!(cache = %self.agent.version(), state = %self.state, "host started");

    while let Some(command) = self.rx.recv().await {
      self.dispatch(command).await;
      while self.in_flight.try_join_next().is_some() {}
    }

    while self.in_flight.join_next().await.is_some() {}
    self.agent.background().drain().await;

    info!(state = %self.state, "host stopped");
  }

  async fn dispatch(&mut self, command: Command) {
    match command {
      Command::Install(reply) => {
        let _ = reply.send(self.install().await);
      }
      Command::Activate(reply) => {
        let _ = reply.send(self.activate().await);
      }
      Command::Fetch(request, reply) => {
        let agent = self.agent.clone();
        let controlled = self.state == WorkerState::Activated;

        self.in_flight.spawn(async move {
          let served = if controlled {
            agent.handle_fetch(request).await
          } else {
            agent.passthrough(request).await
          };
          let _ = reply.send(served);
        });
      }
      Command::Push(payload, reply) => {
        if let Err(e) = self.require_active("push") {
          let _ = reply.send(Err(e));
          return;
        }

        let mut event = ExtendableEvent::new("push");
        self.agent.on_push(&mut event, payload.as_deref());
        self.settle_in_flight(event, reply);
      }
      Command::NotificationClick(notification, reply) => {
        if let Err(e) = self.require_active("notificationclick") {
          let _ = reply.send(Err(e));
          return;
        }

        let mut event = ExtendableEvent::new("notificationclick");
        self.agent.on_notification_click(&mut event, notification);
        self.settle_in_flight(event, reply);
      }
      Command::State(reply) => {
        let _ = reply.send(self.state);
      }
    }
  }

  async fn install(&mut self) -> Result<()> {
    if self.state != WorkerState::Parsed {
      return Err(eyre!("Cannot install: worker is {}", self.state));
    }

    self.state = WorkerState::Installing;
    let mut event = ExtendableEvent::new("install");
    self.agent.on_install(&mut event);

    match event.settle().await {
      Ok(()) => {
        self.state = WorkerState::Installed;
        info!(cache = %self.agent.version(), "installed");
        Ok(())
      }
      Err(e) => {
        self.state = WorkerState::Redundant;
        error!(cache = %self.agent.version(), error = %e, "install failed");
        Err(e)
      }
    }
  }

  async fn activate(&mut self) -> Result<()> {
    match self.state {
      WorkerState::Installed | WorkerState::Activated => {}
      other => return Err(eyre!("Cannot activate: worker is {}", other)),
    }

    self.state = WorkerState::Activating;
    let mut event = ExtendableEvent::new("activate");
    self.agent.on_activate(&mut event);
    let result = event.settle().await;

    // A failed cleanup does not stop the worker from taking control
    self.state = WorkerState::Activated;
    if let Err(e) = &result {
      warn!(error = %e, "activation cleanup failed");
    }

    result
  }

  fn require_active(&self, kind: &str) -> Result<()> {
    if self.state == WorkerState::Activated {
      Ok(())
    } else {
      Err(eyre!("No active worker for {} event (worker is {})", kind, self.state))
    }
  }

  fn settle_in_flight(&mut self, event: ExtendableEvent, reply: oneshot::Sender<Result<()>>) {
    let kind = event.kind();

    self.in_flight.spawn(async move {
      let result = event.settle().await;
      if let Err(e) = &result {
        error!(event = kind, error = %e, "event handler failed");
      }
      let _ = reply.send(result);
    });
  }
}
