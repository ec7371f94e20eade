//! Forward and reverse contact indices.
//!
//! The `ContactIndex` answers two questions: "what is this handle called?"
//! (forward, normalized handle → display name) and "which handles belong to
//! this name?" (reverse, lowercased term → raw handles). Both are built in a
//! single pass over every configured directory the first time either is
//! needed, and stay untouched until [`ContactIndex::invalidate`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::contact::{ContactRecord, DirectorySource};
use crate::handle::Handle;

/// Lazily built, explicitly invalidated contact index.
///
/// Concurrent first callers coalesce onto one build; later reads only clone
/// an `Arc` to the immutable snapshot.
pub struct ContactIndex {
    /// Directories scanned on build, in priority order.
    sources: Vec<Arc<dyn DirectorySource>>,

    /// The current snapshot, `None` until built or after invalidation.
    snapshot: RwLock<Option<Arc<IndexSnapshot>>>,

    /// Serializes builds so the directories are scanned once.
    build_lock: Mutex<()>,

    /// Number of completed builds.
    builds: AtomicUsize,
}

/// Immutable contents of a built index.
#[derive(Debug, Default)]
struct IndexSnapshot {
    /// Normalized handle → display name.
    names: HashMap<String, String>,

    /// Lowercased search term → raw handles.
    terms: IndexMap<String, IndexSet<String>>,

    /// Every record seen, for contact search.
    records: Vec<ContactRecord>,
}

impl IndexSnapshot {
    fn build(sources: &[Arc<dyn DirectorySource>]) -> Self {
        let mut snapshot = Self::default();

        for source in sources {
            match source.load() {
                Ok(records) => {
                    debug!("Indexing {} contacts from {}", records.len(), source.name());
                    for record in records {
                        snapshot.insert(record);
                    }
                }
                Err(e) => {
                    warn!("Skipping contact directory {}: {e}", source.name());
                }
            }
        }

        snapshot
    }

    fn insert(&mut self, record: ContactRecord) {
        let handles: Vec<Handle> = record
            .all_handles()
            .map(Handle::parse)
            .filter(Handle::is_indexable)
            .collect();

        if let Some(name) = record.display_name() {
            for handle in &handles {
                // First writer wins so results do not depend on scan order
                // within a later source.
                self.names
                    .entry(handle.normalized.clone())
                    .or_insert_with(|| name.clone());
            }
        }

        for term in record.search_terms() {
            let entry = self.terms.entry(term).or_default();
            for handle in &handles {
                entry.insert(handle.raw.clone());
            }
        }

        self.records.push(record);
    }
}

impl ContactIndex {
    /// Create an index over the given directories. Nothing is read yet.
    pub fn new(sources: Vec<Arc<dyn DirectorySource>>) -> Self {
        Self {
            sources,
            snapshot: RwLock::new(None),
            build_lock: Mutex::new(()),
            builds: AtomicUsize::new(0),
        }
    }

    /// An index with no directories; every lookup comes back empty.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Build the index now if it has not been built yet.
    pub fn build(&self) {
        let _ = self.snapshot();
    }

    /// Whether a snapshot is currently available.
    pub fn is_built(&self) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the current snapshot; the next lookup rebuilds from scratch.
    pub fn invalidate(&self) {
        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        info!("Contact index invalidated");
    }

    fn current(&self) -> Option<Arc<IndexSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn snapshot(&self) -> Arc<IndexSnapshot> {
        if let Some(snapshot) = self.current() {
            return snapshot;
        }

        let _guard = self.build_lock.lock().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have finished the build while we waited.
        if let Some(snapshot) = self.current() {
            return snapshot;
        }

        let snapshot = Arc::new(IndexSnapshot::build(&self.sources));
        self.builds.fetch_add(1, Ordering::SeqCst);
        info!(
            "Built contact index: {} handles named, {} search terms, {} records",
            snapshot.names.len(),
            snapshot.terms.len(),
            snapshot.records.len()
        );

        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        snapshot
    }

    /// Display name for a handle, in any spelling.
    pub fn get_name(&self, handle: &str) -> Option<String> {
        let handle = Handle::parse(handle);
        if !handle.is_matchable() {
            return None;
        }
        self.snapshot().names.get(&handle.normalized).cloned()
    }

    /// Raw handles for a name, nickname or organization.
    ///
    /// An exact term match wins outright. Otherwise every term that contains
    /// the query, or is contained in it, contributes its handles.
    pub fn find_handles(&self, query: &str) -> Vec<String> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let snapshot = self.snapshot();
        if let Some(handles) = snapshot.terms.get(&query)
            && !handles.is_empty()
        {
            return handles.iter().cloned().collect();
        }

        let mut matches: IndexSet<String> = IndexSet::new();
        for (term, handles) in &snapshot.terms {
            if term.contains(&query) || query.contains(term.as_str()) {
                matches.extend(handles.iter().cloned());
            }
        }

        debug!("Partial contact match for {query:?}: {} handles", matches.len());
        matches.into_iter().collect()
    }

    /// Contacts whose name fields contain `query`, merged by display name.
    pub fn search_contacts(&self, query: &str) -> Vec<ContactSummary> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }

        let snapshot = self.snapshot();
        let mut merged: IndexMap<String, IndexSet<String>> = IndexMap::new();

        for record in &snapshot.records {
            let full_name = match (record.first(), record.last()) {
                (Some(first), Some(last)) => Some(format!("{first} {last}")),
                _ => None,
            };
            let hit = [record.first(), record.last(), record.nick(), record.org()]
                .into_iter()
                .flatten()
                .chain(full_name.as_deref())
                .any(|field| field.to_lowercase().contains(&query));
            if !hit {
                continue;
            }
            let Some(name) = record.display_name() else {
                continue;
            };
            merged
                .entry(name)
                .or_default()
                .extend(record.all_handles().map(str::to_string));
        }

        merged
            .into_iter()
            .filter(|(_, handles)| !handles.is_empty())
            .map(|(name, handles)| ContactSummary {
                name,
                handles: handles.into_iter().collect(),
            })
            .collect()
    }

    /// Get statistics about the index, building it if necessary.
    pub fn stats(&self) -> IndexStats {
        let snapshot = self.snapshot();
        IndexStats {
            source_count: self.sources.len(),
            record_count: snapshot.records.len(),
            named_handle_count: snapshot.names.len(),
            term_count: snapshot.terms.len(),
            build_count: self.builds.load(Ordering::SeqCst),
        }
    }
}

impl std::fmt::Debug for ContactIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContactIndex")
            .field("sources", &self.sources.len())
            .field("built", &self.is_built())
            .finish()
    }
}

/// A contact found by [`ContactIndex::search_contacts`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactSummary {
    pub name: String,
    pub handles: Vec<String>,
}

/// Statistics about the contact index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub source_count: usize,
    pub record_count: usize,
    pub named_handle_count: usize,
    pub term_count: usize,
    pub build_count: usize,
}
