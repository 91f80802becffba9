//! Host surfaces the worker drives: client windows and notifications.

use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::push::NotificationDescriptor;

/// A window controlled (or controllable) by the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
  pub id: String,
  pub url: String,
  pub focused: bool,
  pub controlled: bool,
}

/// The host's window list.
pub trait Clients: Send + Sync {
  /// All open windows, in the order they were opened.
  fn match_all(&self) -> Vec<ClientInfo>;

  fn focus(&self, id: &str) -> Result<()>;

  fn open_window(&self, url: &str) -> Result<ClientInfo>;

  /// Take control of every open window. Returns how many were newly claimed.
  fn claim(&self) -> Result<usize>;
}

/// The host's notification surface.
pub trait Notifier: Send + Sync {
  /// Show a notification; one with the same tag is replaced.
  fn show(&self, notification: &NotificationDescriptor) -> Result<()>;

  fn close(&self, tag: &str) -> Result<()>;
}

/// In-memory window list.
#[derive(Default)]
pub struct ClientRegistry {
  clients: Mutex<Vec<ClientInfo>>,
  next_id: AtomicU64,
}

impl ClientRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  #[cfg(test)]
  /// Register a window the worker does not control yet (e.g. opened before
  /// the worker activated).
  pub fn add(&self, url: &str) -> Result<ClientInfo> {
    let client = ClientInfo {
      id: format!("client-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
      url: url.to_string(),
      focused: false,
      controlled: false,
    };
    self.lock()?.push(client.clone());
    Ok(client)
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<ClientInfo>>> {
    self.clients.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

impl Clients for ClientRegistry {
  fn match_all(&self) -> Vec<ClientInfo> {
    self.lock().map(|c| c.clone()).unwrap_or_default()
  }

  fn focus(&self, id: &str) -> Result<()> {
    let mut clients = self.lock()?;
    if !clients.iter().any(|c| c.id == id) {
      return Err(eyre!("No client with id {}", id));
    }
    for client in clients.iter_mut() {
      client.focused = client.id == id;
    }
    Ok(())
  }

  fn open_window(&self, url: &str) -> Result<ClientInfo> {
    let client = ClientInfo {
      id: format!("client-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1),
      url: url.to_string(),
      focused: true,
      controlled: true,
    };

    let mut clients = self.lock()?;
    for other in clients.iter_mut() {
      other.focused = false;
    }
    clients.push(client.clone());
    Ok(client)
  }

  fn claim(&self) -> Result<usize> {
    let mut clients = self.lock()?;
    let mut claimed = 0;
    for client in clients.iter_mut().filter(|c| !c.controlled) {
      client.controlled = true;
      claimed += 1;
    }
    Ok(claimed)
  }
}

/// In-memory notification tray.
#[derive(Default)]
pub struct NotificationCenter {
  shown: Mutex<Vec<NotificationDescriptor>>,
}

impl NotificationCenter {
  pub fn new() -> Self {
    Self::default()
  }

  #[cfg(test)]
  /// Notifications currently displayed.
  pub fn visible(&self) -> Vec<NotificationDescriptor> {
    self.shown.lock().map(|s| s.clone()).unwrap_or_default()
  }
}

impl Notifier for NotificationCenter {
  fn show(&self, notification: &NotificationDescriptor) -> Result<()> {
    let mut shown = self.shown.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    shown.retain(|n| n.tag != notification.tag);
    shown.push(notification.clone());
    Ok(())
  }

  fn close(&self, tag: &str) -> Result<()> {
    let mut shown = self.shown.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    shown.retain(|n| n.tag != tag);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_claim_controls_existing_windows_once() {
    let registry = ClientRegistry::new();
    registry.add("https://example.com/a").unwrap();
    registry.add("https://example.com/b").unwrap();

    assert_eq!(registry.claim().unwrap(), 2);
    assert_eq!(registry.claim().unwrap(), 0);
    assert!(registry.match_all().iter().all(|c| c.controlled));
  }

  #[test]
  fn test_open_window_takes_focus() {
    let registry = ClientRegistry::new();
    let first = registry.open_window("https://example.com/").unwrap();
    let second = registry.open_window("https://example.com/other").unwrap();

    let clients = registry.match_all();
    assert_eq!(clients.len(), 2);
    assert!(!clients.iter().find(|c| c.id == first.id).unwrap().focused);
    assert!(clients.iter().find(|c| c.id == second.id).unwrap().focused);

    registry.focus(&first.id).unwrap();
    assert!(registry.match_all()[0].focused);
    assert!(registry.focus("missing").is_err());
  }
}
