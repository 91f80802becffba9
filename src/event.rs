use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error};

use crate::http::Request;
use crate::worker::message::VersionReply;
use crate::worker::{FetchReply, Worker};

/// Events delivered by the host
#[derive(Debug)]
pub enum Event {
  Install {
    done: Option<oneshot::Sender<Result<()>>>,
  },
  Activate {
    done: Option<oneshot::Sender<Result<()>>>,
  },
  /// Intercepted request; the reply is the `respondWith` value
  Fetch {
    request: Request,
    respond_with: oneshot::Sender<FetchReply>,
  },
  Message {
    data: Vec<u8>,
    port: Option<oneshot::Sender<VersionReply>>,
  },
  Sync {
    tag: String,
  },
  PeriodicSync {
    tag: String,
  },
  Push {
    data: Option<Vec<u8>>,
  },
  NotificationClick {
    tag: String,
    action: Option<String>,
  },
  /// Connectivity observation
  Online(bool),
}

impl Event {
  fn name(&self) -> &'static str {
    match self {
      Event::Install { .. } => "install",
      Event::Activate { .. } => "activate",
      Event::Fetch { .. } => "fetch",
      Event::Message { .. } => "message",
      Event::Sync { .. } => "sync",
      Event::PeriodicSync { .. } => "periodicsync",
      Event::Push { .. } => "push",
      Event::NotificationClick { .. } => "notificationclick",
      Event::Online(_) => "online",
    }
  }
}

pub type EventSender = mpsc::UnboundedSender<Event>;

/// Runs every event as its own task.
///
/// In-flight tasks are aborted if the loop is dropped; once every sender is
/// gone the loop waits for them to finish and returns.
pub struct EventLoop {
  worker: Arc<Worker>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventLoop {
  pub fn new(worker: Arc<Worker>) -> (Self, EventSender) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { worker, rx }, tx)
  }

  pub async fn run(mut self) {
    let mut tasks = JoinSet::new();

    loop {
      tokio::select! {
        event = self.rx.recv() => match event {
          Some(event) => {
            let worker = Arc::clone(&self.worker);
            tasks.spawn(dispatch(worker, event));
          }
          None => break,
        },
        Some(joined) = tasks.join_next(), if !tasks.is_empty() => finished(joined),
      }
    }

    while let Some(joined) = tasks.join_next().await {
      finished(joined);
    }
    debug!("Event loop stopped");
  }
}

fn finished(joined: Result<(), JoinError>) {
  if let Err(err) = joined {
    error!(error = %err, "Event task panicked");
  }
}

fn reply<T>(tx: Option<oneshot::Sender<T>>, value: T) {
  if let Some(tx) = tx {
    if tx.send(value).is_err() {
      debug!("Event reply dropped");
    }
  }
}

async fn dispatch(worker: Arc<Worker>, event: Event) {
  let name = event.name();

  let result = match event {
    Event::Install { done } => {
      let result = worker.install().await;
      log_failure(name, &result);
      reply(done, result);
      return;
    }
    Event::Activate { done } => {
      let result = worker.activate().await;
      log_failure(name, &result);
      reply(done, result);
      return;
    }
    Event::Fetch {
      request,
      respond_with,
    } => {
      reply(Some(respond_with), worker.fetch(request).await);
      return;
    }
    Event::Message { data, port } => worker.message(&data, port).await,
    Event::Sync { tag } => worker.sync(&tag).await,
    Event::PeriodicSync { tag } => worker.periodic_sync(&tag).await,
    Event::Push { data } => worker.push(data.as_deref()).map(|_| ()),
    Event::NotificationClick { tag, action } => worker
      .notification_click(&tag, action.as_deref())
      .map(|_| ()),
    Event::Online(online) => worker.set_online(online).await,
  };

  log_failure(name, &result);
}

fn log_failure(event: &str, result: &Result<()>) {
  if let Err(err) = result {
    error!(event, error = %err, "Event handler failed");
  }
}
