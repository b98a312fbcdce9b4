//! Entity identifiers with explicit provenance.
//!
//! Every account and transaction starts life under a locally minted
//! temporary id so the UI can show it before the remote store has assigned
//! a durable one. The two phases are a sum type on purpose: callers cannot
//! accidentally treat a pending id as durable, and the string form carries a
//! `srv_` marker so provenance survives serialization into the cache and
//! back.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Marker prefix for server-assigned ids in their string form.
const REMOTE_PREFIX: &str = "srv_";

/// Process-wide sequence making locally minted ids unique even within one
/// millisecond.
static LOCAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identifier of an account, transaction or category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    /// Temporary id minted by this client; the entity is pending remote
    /// confirmation.
    Local(String),
    /// Durable id assigned by the remote document store.
    Remote(String),
}

impl EntityId {
    /// Mints a new temporary id (time-based plus a process-wide counter).
    pub fn mint_local() -> Self {
        let seq = LOCAL_SEQ.fetch_add(1, Ordering::Relaxed);
        Self::Local(format!("{}-{seq}", Utc::now().timestamp_millis()))
    }

    /// Wraps a raw id returned by the remote store.
    pub fn from_remote(raw: impl Into<String>) -> Self {
        Self::Remote(raw.into())
    }

    /// Parses the marked string form back into an id.
    pub fn parse(s: &str) -> Self {
        match s.strip_prefix(REMOTE_PREFIX) {
            Some(raw) => Self::Remote(raw.to_string()),
            None => Self::Local(s.to_string()),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// The raw remote id without its marker, if this id is durable.
    pub fn remote_part(&self) -> Option<&str> {
        match self {
            Self::Remote(raw) => Some(raw),
            Self::Local(_) => None,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(raw) => f.write_str(raw),
            Self::Remote(raw) => write!(f, "{REMOTE_PREFIX}{raw}"),
        }
    }
}

impl Serialize for EntityId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}
