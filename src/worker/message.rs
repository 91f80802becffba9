//! Control messages posted to the worker by the page.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A parsed control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
  /// Activate a waiting worker now
  SkipWaiting,
  /// Reply with the active static generation name
  GetVersion,
  /// Delete every cache generation
  ClearCache,
  /// Re-fetch the application shell into the static generation
  ForceUpdate,
  Unknown(String),
}

#[derive(Debug, Error)]
pub enum MessageError {
  #[error("malformed message: {0}")]
  Malformed(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Envelope {
  #[serde(rename = "type")]
  kind: String,
}

impl ControlMessage {
  /// Parse a `{ "type": ..., "payload": ... }` message.
  pub fn parse(data: &[u8]) -> Result<Self, MessageError> {
    let envelope: Envelope = serde_json::from_slice(data)?;

    Ok(match envelope.kind.as_str() {
      "SKIP_WAITING" => Self::SkipWaiting,
      "GET_VERSION" => Self::GetVersion,
      "CLEAR_CACHE" => Self::ClearCache,
      "FORCE_UPDATE" => Self::ForceUpdate,
      _ => Self::Unknown(envelope.kind),
    })
  }
}

/// Reply posted back on the message port for GET_VERSION.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
  pub version: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_known_types() {
    assert_eq!(
      ControlMessage::parse(br#"{"type":"SKIP_WAITING"}"#).unwrap(),
      ControlMessage::SkipWaiting
    );
    assert_eq!(
      ControlMessage::parse(br#"{"type":"GET_VERSION"}"#).unwrap(),
      ControlMessage::GetVersion
    );
    assert_eq!(
      ControlMessage::parse(br#"{"type":"CLEAR_CACHE","payload":null}"#).unwrap(),
      ControlMessage::ClearCache
    );
    assert_eq!(
      ControlMessage::parse(br#"{"type":"FORCE_UPDATE","payload":{"reason":"manual"}}"#).unwrap(),
      ControlMessage::ForceUpdate
    );
  }

  #[test]
  fn test_parse_unknown_type() {
    assert_eq!(
      ControlMessage::parse(br#"{"type":"PING"}"#).unwrap(),
      ControlMessage::Unknown("PING".to_string())
    );
  }

  #[test]
  fn test_parse_malformed() {
    assert!(ControlMessage::parse(b"not json").is_err());
    assert!(ControlMessage::parse(br#"{"kind":"GET_VERSION"}"#).is_err());
  }

  #[test]
  fn test_version_reply_shape() {
    let reply = VersionReply {
      version: "static-v1".to_string(),
    };
    assert_eq!(
      serde_json::to_string(&reply).unwrap(),
      r#"{"version":"static-v1"}"#
    );
  }
}
