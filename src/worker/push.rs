//! Push messages and notification clicks.

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::clients::{Clients, Notifier};
use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// What gets shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationDescriptor {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// A new notification with the same tag supersedes the old one
  pub tag: String,
  pub require_interaction: bool,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
}

impl NotificationDescriptor {
  /// The notification shown when a push carries no usable payload.
  pub fn defaults(config: &Config) -> Self {
    let n = &config.notifications;

    Self {
      title: config.app_name.clone(),
      body: n
        .default_body
        .clone()
        .unwrap_or_else(|| format!("There is a new update in {}!", config.app_name)),
      icon: config.scoped(&n.icon),
      badge: config.scoped(&n.badge),
      tag: n.tag.clone(),
      require_interaction: n.require_interaction,
      actions: vec![
        NotificationAction {
          action: "open".to_string(),
          title: "Open App".to_string(),
        },
        NotificationAction {
          action: "dismiss".to_string(),
          title: "Close".to_string(),
        },
      ],
    }
  }

  /// Build from push data. Missing, empty or malformed fields fall back to
  /// the defaults; this never fails.
  pub fn from_push(config: &Config, data: Option<&[u8]>) -> Self {
    let mut notification = Self::defaults(config);

    let payload = match data {
      Some(bytes) => serde_json::from_slice::<PushPayload>(bytes).unwrap_or_else(|e| {
        warn!(error = %e, "Error parsing push data");
        PushPayload::default()
      }),
      None => PushPayload::default(),
    };

    if let Some(title) = payload.title.filter(|t| !t.is_empty()) {
      notification.title = title;
    }
    if let Some(body) = payload.body.filter(|b| !b.is_empty()) {
      notification.body = body;
    }

    notification
  }
}

/// Which part of the notification the user clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
  Open,
  Dismiss,
  /// The notification body itself (or an action we don't know)
  Default,
}

impl ClickAction {
  pub fn from_action(action: Option<&str>) -> Self {
    match action {
      Some("open") => Self::Open,
      Some("dismiss") => Self::Dismiss,
      _ => Self::Default,
    }
  }
}

/// What a click resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  Focused(String),
  Opened(String),
  Dismissed,
}

/// Show the notification for a push event.
pub fn handle_push(
  config: &Config,
  notifier: &dyn Notifier,
  data: Option<&[u8]>,
) -> Result<NotificationDescriptor> {
  info!("Push received");
  let notification = NotificationDescriptor::from_push(config, data);
  notifier.show(&notification)?;
  Ok(notification)
}

/// Close the clicked notification and route the click to a window.
pub fn handle_click(
  config: &Config,
  notifier: &dyn Notifier,
  clients: &dyn Clients,
  tag: &str,
  action: Option<&str>,
) -> Result<ClickOutcome> {
  info!(tag, action = ?action, "Notification clicked");
  notifier.close(tag)?;

  let root = config.url_for(&config.app_root())?.to_string();

  match ClickAction::from_action(action) {
    ClickAction::Open => {
      if let Some(client) = clients.match_all().into_iter().find(|c| c.url == root) {
        clients.focus(&client.id)?;
        return Ok(ClickOutcome::Focused(client.id));
      }
      let client = clients.open_window(&root)?;
      Ok(ClickOutcome::Opened(client.id))
    }
    ClickAction::Dismiss => {
      info!("Notification dismissed");
      Ok(ClickOutcome::Dismissed)
    }
    ClickAction::Default => {
      if let Some(client) = clients.match_all().into_iter().next() {
        clients.focus(&client.id)?;
        return Ok(ClickOutcome::Focused(client.id));
      }
      let client = clients.open_window(&root)?;
      Ok(ClickOutcome::Opened(client.id))
    }
  }
}
