mod cache;
mod config;
mod console;
mod context;
mod db;
mod event;
mod http;
mod logging;
mod network;
mod strategy;
#[cfg(test)]
mod test_support;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::{info, warn};

use event::{Event, EventLoop};
use http::{Destination, Request};
use worker::lifecycle::WorkerState;
use worker::{FetchReply, Worker};

#[derive(Parser, Debug)]
#[command(name = "offline-worker")]
#[command(about = "Offline caching and sync engine for a web app shell")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-worker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the application shell and activate it
  Update,
  /// Route one GET request through the worker
  Fetch {
    /// Absolute URL or a path on the configured origin
    url: String,
    /// Treat the request as a navigation
    #[arg(long, conflicts_with = "destination")]
    document: bool,
    /// Request destination (document, style, script, image, manifest)
    #[arg(long)]
    destination: Option<Destination>,
  },
  /// Deliver a control message, e.g. '{"type":"GET_VERSION"}'
  Message { json: String },
  /// Queue an analytics payload for background sync
  Enqueue { json: String },
  /// Fire a background sync event
  Sync { tag: Option<String> },
  /// Fire a periodic sync event
  PeriodicSync { tag: Option<String> },
  /// Deliver a push message
  Push { payload: Option<String> },
  /// Click the app notification
  Click { action: Option<String> },
  /// Show cache generations and the sync queue
  Status,
  /// Install, then serve events from stdin and periodic sync until interrupted
  Run,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.logging)?;

  let worker = Worker::open(config)?;

  match args.command {
    Command::Update => {
      update(&worker).await?;
      println!("{} ({:?})", worker.version(), worker.state()?);
    }
    Command::Fetch {
      url,
      document,
      destination,
    } => {
      let destination = if document {
        Destination::Document
      } else {
        destination.unwrap_or_default()
      };
      fetch(&worker, &url, destination).await?
    }
    Command::Message { json } => {
      let (port, reply) = oneshot::channel();
      worker.message(json.as_bytes(), Some(port)).await?;
      if let Ok(reply) = reply.await {
        println!("{}", serde_json::to_string(&reply)?);
      }
    }
    Command::Enqueue { json } => {
      let payload: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| eyre!("Invalid JSON payload: {}", e))?;
      let id = worker.enqueue(&payload)?;
      println!("queued #{}", id);
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| worker.config().sync.background_tag.clone());
      worker.sync(&tag).await?;
      println!("{} pending", worker.status()?.pending_sync);
    }
    Command::PeriodicSync { tag } => {
      let tag = tag.unwrap_or_else(|| worker.config().sync.periodic_tag.clone());
      worker.periodic_sync(&tag).await?;
    }
    Command::Push { payload } => {
      let notification = worker.push(payload.as_deref().map(str::as_bytes))?;
      println!("{}", serde_json::to_string_pretty(&notification)?);
    }
    Command::Click { action } => {
      let tag = worker.config().notifications.tag.clone();
      let outcome = worker.notification_click(&tag, action.as_deref())?;
      println!("{:?}", outcome);
    }
    Command::Status => {
      let status = worker.status()?;
      println!("version: {} ({:?})", status.version, status.state);
      println!(
        "active: {}",
        status.active_version.as_deref().unwrap_or("none")
      );
      println!("online: {}", status.online);
      for generation in &status.generations {
        println!("{:<24} {} entries", generation.name, generation.entries);
      }
      println!("pending sync: {}", status.pending_sync);
      for item in worker.pending()? {
        println!(
          "  #{} [{}] queued {} attempts {}{}",
          item.id,
          item.tag,
          item.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
          item.attempts,
          item
            .last_error
            .map(|e| format!(", last error: {}", e))
            .unwrap_or_default()
        );
      }
    }
    Command::Run => run(worker).await?,
  }

  Ok(())
}

/// Install, then activate if install left the worker waiting. Each CLI
/// invocation is a fresh worker with no predecessor to wait for.
async fn update(worker: &Worker) -> Result<()> {
  worker.install().await?;
  if worker.state()? == WorkerState::Installed {
    worker.activate().await?;
  }
  Ok(())
}

async fn fetch(worker: &Worker, target: &str, destination: Destination) -> Result<()> {
  let request =
    Request::get(console::resolve_url(worker.config(), target)?).with_destination(destination);

  let outcome = match worker.fetch(request).await {
    FetchReply::PassThrough => {
      println!("not intercepted");
      return Ok(());
    }
    FetchReply::Respond(outcome) => outcome?,
  };
  console::print_outcome(&outcome);

  // Finish the background refresh before the process exits
  if let Some(revalidation) = outcome.revalidation {
    if let Ok(Err(err)) = revalidation.await {
      info!(error = %err, "Revalidation failed");
    }
  }
  Ok(())
}

async fn run(worker: Worker) -> Result<()> {
  let period = Duration::from_secs(worker.config().sync.periodic_interval_secs.max(1));
  let periodic_tag = worker.config().sync.periodic_tag.clone();
  let config = worker.config().clone();
  let worker = Arc::new(worker);

  let (event_loop, tx) = EventLoop::new(Arc::clone(&worker));
  let running = tokio::spawn(event_loop.run());

  let (done, installed) = oneshot::channel();
  tx.send(Event::Install { done: Some(done) })
    .map_err(|_| eyre!("Event loop stopped"))?;
  installed
    .await
    .map_err(|_| eyre!("Install was dropped"))??;
  if worker.state()? == WorkerState::Installed {
    let (done, activated) = oneshot::channel();
    tx.send(Event::Activate { done: Some(done) })
      .map_err(|_| eyre!("Event loop stopped"))?;
    activated
      .await
      .map_err(|_| eyre!("Activate was dropped"))??;
  }

  let mut ticker = tokio::time::interval(period);
  ticker.tick().await;
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut stdin_open = true;

  info!(period_secs = period.as_secs(), "Running, press Ctrl-C to stop");
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        if tx.send(Event::PeriodicSync { tag: periodic_tag.clone() }).is_err() {
          break;
        }
      }
      line = lines.next_line(), if stdin_open => match line {
        Ok(Some(line)) => match console::parse(&line, &config) {
          Ok(Some((event, awaiting))) => {
            if tx.send(event).is_err() {
              break;
            }
            tokio::spawn(console::report(awaiting));
          }
          Ok(None) => {}
          Err(err) => warn!(error = %err, "Ignoring command"),
        },
        Ok(None) => stdin_open = false,
        Err(err) => {
          warn!(error = %err, "Failed to read stdin");
          stdin_open = false;
        }
      },
      _ = tokio::signal::ctrl_c() => break,
    }
  }

  drop(tx);
  running
    .await
    .map_err(|e| eyre!("Event loop failed: {}", e))?;
  info!("Stopped");
  Ok(())
}
