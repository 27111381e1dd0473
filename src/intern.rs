use ahash::AHashSet;
use parking_lot::RwLock;

use crate::triple::{Identifier, Triple};

/// Shares one allocation per distinct identifier string across all graphs.
#[derive(Default)]
pub struct Interner {
    inner: RwLock<AHashSet<Identifier>>,
}

impl Interner {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AHashSet::new()),
        }
    }

    pub fn intern(&self, value: &Identifier) -> Identifier {
        if let Some(hit) = self.inner.read().get(value.as_str()) {
            return hit.clone();
        }
        let mut guard = self.inner.write();
        if let Some(hit) = guard.get(value.as_str()) {
            return hit.clone();
        }
        guard.insert(value.clone());
        value.clone()
    }

    pub fn intern_str(&self, value: &str) -> Identifier {
        if let Some(hit) = self.inner.read().get(value) {
            return hit.clone();
        }
        self.intern(&Identifier::from(value))
    }

    pub fn intern_triple(&self, triple: &Triple) -> Triple {
        Triple::new(
            self.intern(triple.subject()),
            self.intern(triple.predicate()),
            self.intern(triple.object()),
        )
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Drops identifiers no committed graph, snapshot or caller still holds.
    /// Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut guard = self.inner.write();
        let before = guard.len();
        guard.retain(Identifier::is_shared);
        before - guard.len()
    }
}
