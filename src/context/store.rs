//! The context store: sole authority over context existence and expiry.

use super::{ContextId, ContextSummary, TempResource, TempResources};
use crate::error::{DocQaError, Result};
use crate::vector_index::VectorIndex;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Mutable bookkeeping of one context.
///
/// `index` is `Some` exactly when `chunk_count > 0`; the only code that sets
/// either is [`ContextEntry::commit_ingest`], which sets both together.
struct ContextState {
    last_accessed_at: DateTime<Utc>,
    chunk_count: usize,
    sources: Vec<String>,
    index: Option<Arc<dyn VectorIndex>>,
    temp_resources: TempResources,
    released: bool,
}

/// A live context.
pub struct ContextEntry {
    id: ContextId,
    created_at: DateTime<Utc>,
    state: Mutex<ContextState>,
    /// Serializes index creation, insertion and commit for this context.
    ingest_lock: tokio::sync::Mutex<()>,
}

impl ContextEntry {
    fn new(id: ContextId) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            state: Mutex::new(ContextState {
                last_accessed_at: now,
                chunk_count: 0,
                sources: Vec::new(),
                index: None,
                temp_resources: TempResources::new(),
                released: false,
            }),
            ingest_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.state.lock().last_accessed_at
    }

    pub fn chunk_count(&self) -> usize {
        self.state.lock().chunk_count
    }

    pub fn has_documents(&self) -> bool {
        self.state.lock().chunk_count > 0
    }

    /// Ingested document names, in ingestion order.
    pub fn sources(&self) -> Vec<String> {
        self.state.lock().sources.clone()
    }

    /// Handle to the index, if any document has been ingested.
    pub fn index(&self) -> Option<Arc<dyn VectorIndex>> {
        self.state.lock().index.clone()
    }

    /// Number of temp resources currently owned by this context.
    pub fn temp_resource_count(&self) -> usize {
        self.state.lock().temp_resources.len()
    }

    /// Whether the context has been deleted.
    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    pub fn summary(&self) -> ContextSummary {
        let state = self.state.lock();
        ContextSummary {
            context_id: self.id,
            chunk_count: state.chunk_count,
            has_documents: state.chunk_count > 0,
            sources: state.sources.clone(),
            created_at: self.created_at,
            last_accessed_at: state.last_accessed_at,
        }
    }

    /// Refresh `last_accessed_at`.
    pub fn touch(&self) {
        self.state.lock().last_accessed_at = Utc::now();
    }

    /// Acquire the per-context ingestion lock.
    ///
    /// Hold it only across index creation, insertion and commit, never across
    /// extraction or embedding.
    pub async fn lock_ingest(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.ingest_lock.lock().await
    }

    /// Record a successful ingestion of `added` chunks from `source`.
    ///
    /// `index` becomes the context's index if it has none yet, and `resource`
    /// (the index's scratch space, if any) is handed over to the context. A
    /// context that was deleted in the meantime is not resurrected: the call
    /// fails and the resource is released immediately.
    pub fn commit_ingest(
        &self,
        index: Arc<dyn VectorIndex>,
        resource: Option<TempResource>,
        added: usize,
        source: impl Into<String>,
    ) -> Result<usize> {
        let mut state = self.state.lock();

        if state.released {
            drop(state);
            if let Some(mut resource) = resource {
                resource.release();
            }
            return Err(DocQaError::NotFound(format!(
                "Context {} was deleted during ingestion",
                self.id
            )));
        }

        if added == 0 {
            drop(state);
            if let Some(mut resource) = resource {
                resource.release();
            }
            return Err(DocQaError::Validation(
                "Cannot commit an ingestion without chunks".to_string(),
            ));
        }

        if state.index.is_none() {
            state.index = Some(index);
        }
        if let Some(resource) = resource {
            state.temp_resources.track(resource);
        }
        state.chunk_count += added;
        state.sources.push(source.into());
        state.last_accessed_at = Utc::now();

        Ok(state.chunk_count)
    }

    fn is_idle(&self, now: DateTime<Utc>, max_idle: TimeDelta) -> bool {
        now.signed_duration_since(self.state.lock().last_accessed_at) > max_idle
    }

    /// Drop the index handle and release every temp resource. Never fails.
    fn release(&self) {
        let (index, mut resources) = {
            let mut state = self.state.lock();
            state.released = true;
            (
                state.index.take(),
                std::mem::take(&mut state.temp_resources),
            )
        };

        // Close the index before removing the files behind it.
        drop(index);
        resources.release_all();
    }
}

impl std::fmt::Debug for ContextEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEntry")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("chunk_count", &self.chunk_count())
            .finish()
    }
}

fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Map from context id to live context.
pub struct ContextStore {
    contexts: RwLock<HashMap<ContextId, Arc<ContextEntry>>>,
    max_idle: TimeDelta,
}

impl ContextStore {
    /// Create an empty store whose `get` treats contexts idle for longer than
    /// `max_idle` as gone.
    pub fn new(max_idle: Duration) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            max_idle: to_time_delta(max_idle),
        }
    }

    /// Configured idle limit.
    pub fn max_idle(&self) -> TimeDelta {
        self.max_idle
    }

    /// Allocate a new, empty context.
    pub fn create(&self) -> Arc<ContextEntry> {
        let mut contexts = self.contexts.write();
        loop {
            let id = ContextId::new();
            if let Entry::Vacant(slot) = contexts.entry(id) {
                let entry = Arc::new(ContextEntry::new(id));
                slot.insert(entry.clone());
                info!("Created context {}", id);
                return entry;
            }
            warn!("Context id collision on {}, regenerating", id);
        }
    }

    /// Look up a live context and refresh its access time.
    ///
    /// An idle-expired context is deleted on the spot and reported as missing.
    pub fn get(&self, id: &ContextId) -> Option<Arc<ContextEntry>> {
        let entry = self.contexts.read().get(id).cloned()?;

        if entry.is_idle(Utc::now(), self.max_idle) {
            debug!("Context {} expired on access", id);
            self.delete(id);
            return None;
        }

        entry.touch();
        Some(entry)
    }

    /// Look up a context by a client-supplied id string.
    pub fn get_str(&self, raw: &str) -> Option<Arc<ContextEntry>> {
        ContextId::parse(raw).and_then(|id| self.get(&id))
    }

    /// Resolve a client-supplied id, creating a context when it is absent,
    /// blank, malformed or unknown. The flag reports whether one was created.
    pub fn resolve(&self, raw: Option<&str>) -> (Arc<ContextEntry>, bool) {
        match raw.and_then(|raw| self.get_str(raw)) {
            Some(entry) => (entry, false),
            None => {
                if let Some(raw) = raw.filter(|r| !r.trim().is_empty()) {
                    debug!("Context {:?} not found, creating a new one", raw);
                }
                (self.create(), true)
            }
        }
    }

    /// Summary of a live context.
    pub fn status(&self, id: &ContextId) -> Option<ContextSummary> {
        self.get(id).map(|entry| entry.summary())
    }

    /// Remove a context and release its resources.
    ///
    /// Returns `false` when the id is unknown (including a second delete).
    pub fn delete(&self, id: &ContextId) -> bool {
        let removed = self.contexts.write().remove(id);
        match removed {
            Some(entry) => {
                entry.release();
                info!("Deleted context {}", id);
                true
            }
            None => false,
        }
    }

    /// Ids of contexts idle for longer than `max_idle` at `now`.
    pub fn expired_ids(&self, now: DateTime<Utc>, max_idle: TimeDelta) -> Vec<ContextId> {
        self.contexts
            .read()
            .values()
            .filter(|entry| entry.is_idle(now, max_idle))
            .map(|entry| entry.id())
            .collect()
    }

    /// Delete `id` if it is still idle at `now`. A context touched since it
    /// was selected for sweeping survives.
    pub fn delete_if_idle(&self, id: &ContextId, now: DateTime<Utc>, max_idle: TimeDelta) -> bool {
        let removed = {
            let mut contexts = self.contexts.write();
            match contexts.get(id) {
                Some(entry) if entry.is_idle(now, max_idle) => contexts.remove(id),
                _ => None,
            }
        };

        match removed {
            Some(entry) => {
                entry.release();
                info!("Swept idle context {}", id);
                true
            }
            None => false,
        }
    }

    /// Delete every context idle for longer than `max_idle` at `now`.
    /// Returns the ids removed.
    pub fn sweep(&self, now: DateTime<Utc>, max_idle: TimeDelta) -> Vec<ContextId> {
        self.expired_ids(now, max_idle)
            .into_iter()
            .filter(|id| self.delete_if_idle(id, now, max_idle))
            .collect()
    }

    /// Snapshot of all live contexts, oldest first.
    pub fn list(&self) -> Vec<ContextSummary> {
        let entries: Vec<Arc<ContextEntry>> = self.contexts.read().values().cloned().collect();
        let mut summaries: Vec<ContextSummary> = entries.iter().map(|e| e.summary()).collect();
        summaries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.context_id.cmp(&b.context_id))
        });
        summaries
    }

    /// Delete every context. Used on shutdown.
    pub fn clear(&self) -> usize {
        let drained: Vec<Arc<ContextEntry>> =
            self.contexts.write().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            entry.release();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 60 * 60))
    }
}
