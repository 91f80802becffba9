//! Request and response snapshots passed across the interception boundary.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;

/// What the requesting page intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
  /// Top-level navigation (HTML document)
  Document,
  Style,
  Script,
  Image,
  Manifest,
  /// fetch()/XHR and anything else without a destination
  #[default]
  Empty,
}

impl FromStr for Destination {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "document" => Ok(Self::Document),
      "style" => Ok(Self::Style),
      "script" => Ok(Self::Script),
      "image" => Ok(Self::Image),
      "manifest" => Ok(Self::Manifest),
      "" | "empty" => Ok(Self::Empty),
      other => Err(format!("unknown request destination: {}", other)),
    }
  }
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  pub destination: Destination,
}

impl Request {
  /// Create a plain GET request.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      headers: Vec::new(),
      body: None,
      destination: Destination::Empty,
    }
  }

  /// Create a POST request carrying a JSON body.
  pub fn post_json(url: Url, body: Vec<u8>) -> Self {
    Self {
      method: Method::POST,
      url,
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: Some(body),
      destination: Destination::Empty,
    }
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  /// Whether this is a navigation (document) request.
  pub fn is_navigation(&self) -> bool {
    self.destination == Destination::Document
  }
}

/// A response snapshot: status, headers and a fully-read body.
///
/// Bodies are buffered, so `clone()` yields an independent copy that can be
/// stored while the original is handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

/// Body of the synthetic offline API response.
#[derive(Debug, Serialize, Deserialize)]
pub struct OfflineBody {
  pub error: String,
  pub message: String,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      status_text: String::new(),
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  /// The 503 JSON response returned to API callers when neither network nor
  /// cache can answer.
  pub fn offline(message: &str) -> Self {
    let body = OfflineBody {
      error: "Offline".to_string(),
      message: message.to_string(),
    };
    // Serializing a struct of two strings cannot fail
    let body = serde_json::to_vec(&body).unwrap_or_default();

    let mut response =
      Self::new(503, body).with_header("Content-Type", "application/json");
    response.status_text = "Service Unavailable".to_string();
    response
  }

  /// 2xx status.
  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}
