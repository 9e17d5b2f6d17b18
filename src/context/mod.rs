//! Context lifecycle: isolated per-tenant document indexes.
//!
//! A [`ContextStore`] owns every live context. Each context holds at most one
//! vector index, the names of the documents ingested into it, and the scratch
//! files it created. Contexts idle for longer than the configured limit are
//! removed by the [`ContextSweeper`].

mod resources;
mod store;
mod sweeper;

pub use resources::{TempResource, TempResources};
pub use store::{ContextEntry, ContextStore};
pub use sweeper::{ContextSweeper, SweepConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque context identifier handed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a client-supplied id. Blank or malformed input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        Uuid::parse_str(raw).ok().map(Self)
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ContextId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Point-in-time view of a context, safe to hand out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSummary {
    pub context_id: ContextId,
    pub chunk_count: usize,
    pub has_documents: bool,
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}
