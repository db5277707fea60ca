// ── Bug identity ──
//
// A bug is identified either by the id the server assigned, or by a
// placeholder minted on this device while the create is still pending.
// Placeholders carry the reserved `local-` prefix so the two can never
// be confused, on the wire or in the cache.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix reserved for placeholder identifiers. The server never issues it.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Canonical identifier for a bug.
///
/// Serializes as a plain string: server ids verbatim, placeholders as
/// `local-<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BugId {
    /// Assigned by the server on the first successful create.
    Remote(String),
    /// Placeholder for a bug whose create has not reached the server yet.
    Local(Uuid),
}

impl BugId {
    /// Mint a fresh placeholder identifier.
    pub fn new_local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    /// `true` for placeholder ids that still need replacing by a server id.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// The server-assigned id, if this is one.
    pub fn as_remote(&self) -> Option<&str> {
        match self {
            Self::Remote(s) => Some(s),
            Self::Local(_) => None,
        }
    }

    /// The cache key this bug is stored under.
    pub fn cache_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BugId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(s) => write!(f, "{s}"),
            Self::Local(u) => write!(f, "{LOCAL_ID_PREFIX}{u}"),
        }
    }
}

impl FromStr for BugId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl From<String> for BugId {
    fn from(s: String) -> Self {
        match s.strip_prefix(LOCAL_ID_PREFIX).map(Uuid::parse_str) {
            Some(Ok(u)) => Self::Local(u),
            _ => Self::Remote(s),
        }
    }
}

impl From<&str> for BugId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<BugId> for String {
    fn from(id: BugId) -> Self {
        id.to_string()
    }
}
