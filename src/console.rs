//! Line commands read from stdin in `run` mode, one event per line.
//!
//! ```text
//! install | activate
//! fetch <url-or-path> [destination]
//! message <json>
//! sync [tag] | periodic-sync [tag]
//! push [json] | click [action]
//! online | offline
//! ```

use color_eyre::{eyre::eyre, Result};
use tokio::sync::oneshot;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::event::Event;
use crate::http::{Destination, Request};
use crate::strategy::FetchOutcome;
use crate::worker::message::VersionReply;
use crate::worker::FetchReply;

/// Reply still owed to the console for a sent event.
#[derive(Debug)]
pub enum Awaiting {
  Nothing,
  Done(oneshot::Receiver<Result<()>>),
  Fetch(oneshot::Receiver<FetchReply>),
  Version(oneshot::Receiver<VersionReply>),
}

/// Resolve an absolute URL, or a path on the configured origin.
pub fn resolve_url(config: &Config, target: &str) -> Result<Url> {
  match Url::parse(target) {
    Ok(url) => Ok(url),
    Err(_) => config.url_for(target),
  }
}

/// Parse one line. Blank lines yield `None`.
pub fn parse(line: &str, config: &Config) -> Result<Option<(Event, Awaiting)>> {
  let line = line.trim();
  if line.is_empty() {
    return Ok(None);
  }

  let (command, rest) = match line.split_once(char::is_whitespace) {
    Some((command, rest)) => (command, rest.trim()),
    None => (line, ""),
  };
  let arg = (!rest.is_empty()).then(|| rest.to_string());

  let parsed = match command {
    "install" | "activate" => {
      let (tx, rx) = oneshot::channel();
      let event = if command == "install" {
        Event::Install { done: Some(tx) }
      } else {
        Event::Activate { done: Some(tx) }
      };
      (event, Awaiting::Done(rx))
    }
    "fetch" => {
      let mut parts = rest.split_whitespace();
      let target = parts
        .next()
        .ok_or_else(|| eyre!("Usage: fetch <url-or-path> [destination]"))?;
      let destination = match parts.next() {
        Some(d) => d.parse::<Destination>().map_err(|e| eyre!("{}", e))?,
        None => Destination::Empty,
      };

      let request = Request::get(resolve_url(config, target)?).with_destination(destination);
      let (tx, rx) = oneshot::channel();
      (
        Event::Fetch {
          request,
          respond_with: tx,
        },
        Awaiting::Fetch(rx),
      )
    }
    "message" => {
      let (tx, rx) = oneshot::channel();
      (
        Event::Message {
          data: rest.as_bytes().to_vec(),
          port: Some(tx),
        },
        Awaiting::Version(rx),
      )
    }
    "sync" => (
      Event::Sync {
        tag: arg.unwrap_or_else(|| config.sync.background_tag.clone()),
      },
      Awaiting::Nothing,
    ),
    "periodic-sync" => (
      Event::PeriodicSync {
        tag: arg.unwrap_or_else(|| config.sync.periodic_tag.clone()),
      },
      Awaiting::Nothing,
    ),
    "push" => (
      Event::Push {
        data: arg.map(String::into_bytes),
      },
      Awaiting::Nothing,
    ),
    "click" => (
      Event::NotificationClick {
        tag: config.notifications.tag.clone(),
        action: arg,
      },
      Awaiting::Nothing,
    ),
    "online" => (Event::Online(true), Awaiting::Nothing),
    "offline" => (Event::Online(false), Awaiting::Nothing),
    other => return Err(eyre!("Unknown command: {}", other)),
  };

  Ok(Some(parsed))
}

pub fn print_outcome(outcome: &FetchOutcome) {
  let response = &outcome.response;
  println!(
    "{} {} ({:?}) {}",
    response.status,
    response.status_text,
    outcome.source,
    response.header("content-type").unwrap_or("-")
  );
  println!("{}", String::from_utf8_lossy(&response.body));
}

/// Print whatever the event replied. Dropped replies print nothing.
pub async fn report(awaiting: Awaiting) {
  match awaiting {
    Awaiting::Nothing => {}
    Awaiting::Done(rx) => match rx.await {
      Ok(Ok(())) => println!("ok"),
      Ok(Err(err)) => println!("error: {}", err),
      Err(_) => {}
    },
    Awaiting::Fetch(rx) => match rx.await {
      Ok(FetchReply::PassThrough) => println!("not intercepted"),
      Ok(FetchReply::Respond(Ok(outcome))) => print_outcome(&outcome),
      Ok(FetchReply::Respond(Err(err))) => println!("error: {}", err),
      Err(_) => {}
    },
    Awaiting::Version(rx) => {
      if let Ok(reply) = rx.await {
        println!("version: {}", reply.version);
      } else {
        info!("Message handled without a reply");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::config;

  fn event(line: &str) -> Event {
    parse(line, &config()).unwrap().unwrap().0
  }

  #[test]
  fn test_blank_line_is_skipped() {
    assert!(parse("   ", &config()).unwrap().is_none());
  }

  #[test]
  fn test_fetch_with_destination() {
    let Event::Fetch { request, .. } = event("fetch /coba-web-app/ document") else {
      panic!("expected a fetch event");
    };
    assert_eq!(
      request.url.as_str(),
      "https://example.github.io/coba-web-app/"
    );
    assert!(request.is_navigation());

    let Event::Fetch { request, .. } = event("fetch https://cdn.example.com/lib.js script") else {
      panic!("expected a fetch event");
    };
    assert_eq!(request.url.host_str(), Some("cdn.example.com"));
    assert_eq!(request.destination, Destination::Script);
  }

  #[test]
  fn test_fetch_errors() {
    assert!(parse("fetch", &config()).is_err());
    assert!(parse("fetch /x video", &config()).is_err());
    assert!(parse("teleport", &config()).is_err());
  }

  #[test]
  fn test_tags_default_from_config() {
    assert!(matches!(event("sync"), Event::Sync { tag } if tag == "background-sync"));
    assert!(matches!(event("sync other"), Event::Sync { tag } if tag == "other"));
    assert!(matches!(
      event("periodic-sync"),
      Event::PeriodicSync { tag } if tag == "content-sync"
    ));
  }

  #[test]
  fn test_message_keeps_whole_payload() {
    let Event::Message { data, port } = event(r#"message {"type": "GET_VERSION"}"#) else {
      panic!("expected a message event");
    };
    assert_eq!(data, br#"{"type": "GET_VERSION"}"#);
    assert!(port.is_some());
  }

  #[test]
  fn test_push_click_and_connectivity() {
    assert!(matches!(event("push"), Event::Push { data: None }));
    assert!(matches!(
      event(r#"push {"title":"Hi"}"#),
      Event::Push { data: Some(d) } if d == br#"{"title":"Hi"}"#
    ));
    assert!(matches!(
      event("click open"),
      Event::NotificationClick { tag, action: Some(a) } if tag == "app-notification" && a == "open"
    ));
    assert!(matches!(event("offline"), Event::Online(false)));
    assert!(matches!(event("online"), Event::Online(true)));
    assert!(matches!(event("activate"), Event::Activate { done: Some(_) }));
  }
}
