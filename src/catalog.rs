//! Graph catalog with versioned, immutable snapshots.
//!
//! The committed state of every graph lives in a [`CatalogSnapshot`] behind an
//! `ArcSwap`:
//! - readers load the current snapshot without locking and keep it for the
//!   lifetime of their transaction
//! - the writer publishes a whole new snapshot at commit, sharing unchanged
//!   graphs with the previous one through `Arc`
//! - a snapshot never changes after publication

use std::{collections::BTreeMap, sync::Arc, time::SystemTime};

use arc_swap::ArcSwap;

use crate::index::TripleIndex;

/// Committed state of all graphs as of one version.
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    version: u64,
    graphs: BTreeMap<String, Arc<TripleIndex>>,
    created_at: SystemTime,
}

impl CatalogSnapshot {
    pub fn new(version: u64, graphs: BTreeMap<String, Arc<TripleIndex>>) -> Self {
        Self {
            version,
            graphs,
            created_at: SystemTime::now(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn graph(&self, name: &str) -> Option<&Arc<TripleIndex>> {
        self.graphs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.graphs.contains_key(name)
    }

    pub fn graph_names(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    pub fn triple_count(&self) -> usize {
        self.graphs.values().map(|index| index.len()).sum()
    }

    pub fn graphs(&self) -> impl Iterator<Item = (&str, &Arc<TripleIndex>)> {
        self.graphs.iter().map(|(name, index)| (name.as_str(), index))
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

impl Default for CatalogSnapshot {
    fn default() -> Self {
        Self::new(0, BTreeMap::new())
    }
}

/// Maps graph names to their indexes; graphs are created on first reference.
#[derive(Debug)]
pub struct GraphCatalog {
    current: ArcSwap<CatalogSnapshot>,
    empty: Arc<TripleIndex>,
}

impl GraphCatalog {
    pub fn new() -> Self {
        Self::with_state(0, BTreeMap::new())
    }

    pub fn with_state(version: u64, graphs: BTreeMap<String, TripleIndex>) -> Self {
        let graphs = graphs
            .into_iter()
            .map(|(name, index)| (name, Arc::new(index)))
            .collect();
        Self {
            current: ArcSwap::from_pointee(CatalogSnapshot::new(version, graphs)),
            empty: Arc::new(TripleIndex::new()),
        }
    }

    /// Current committed snapshot.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        self.current.load_full()
    }

    pub fn version(&self) -> u64 {
        self.current.load().version()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.current.load().contains(name)
    }

    /// Returns the committed index for `name`, registering an empty graph if
    /// the name has never been seen. Registration does not change the version.
    pub fn get_or_create(&self, name: &str) -> Arc<TripleIndex> {
        if let Some(index) = self.current.load().graph(name) {
            return Arc::clone(index);
        }
        self.current.rcu(|state| {
            let mut next = CatalogSnapshot::clone(state);
            next.graphs
                .entry(name.to_string())
                .or_insert_with(|| Arc::clone(&self.empty));
            next
        });
        self.current
            .load()
            .graph(name)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.empty))
    }

    /// Shared empty index, used for graphs a snapshot predates.
    pub fn empty_index(&self) -> Arc<TripleIndex> {
        Arc::clone(&self.empty)
    }

    /// Installs `changed` graphs atomically under a new version.
    pub(crate) fn publish(
        &self,
        version: u64,
        changed: BTreeMap<String, Arc<TripleIndex>>,
    ) -> Arc<CatalogSnapshot> {
        self.current.rcu(|state| {
            let mut graphs = state.graphs.clone();
            for (name, index) in &changed {
                graphs.insert(name.clone(), Arc::clone(index));
            }
            CatalogSnapshot::new(version, graphs)
        });
        self.snapshot()
    }
}

impl Default for GraphCatalog {
    fn default() -> Self {
        Self::new()
    }
}
