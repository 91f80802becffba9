//! Cache generation naming.

use std::fmt;

/// Logical role of a cache generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
  /// Application shell, populated at install
  Static,
  /// Runtime-cached API and other responses
  Dynamic,
}

impl Role {
  pub fn as_str(&self) -> &'static str {
    match self {
      Role::Static => "static",
      Role::Dynamic => "dynamic",
    }
  }
}

/// A named, versioned cache bucket, e.g. `static-v1`.
///
/// Bumping the version tag is how an old generation gets invalidated: on
/// activate, every stored generation whose name differs from the current
/// static/dynamic names is evicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
  name: String,
}

impl CacheGeneration {
  pub fn new(role: Role, version: &str) -> Self {
    Self {
      name: format!("{}-{}", role.as_str(), version),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }
}

impl fmt::Display for CacheGeneration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name)
  }
}
