//! Boundary connections drawn between a layer and its expanded children.

use indexmap::IndexMap;

use strata_core::identifier::Id;

use super::proxies::BoundaryProxy;

/// `(from entity uid, child layer uid)`.
pub type BoundaryKey = (Id, Id);

/// Boundary proxies of a layer, keyed by the expansion that created them.
#[derive(Debug, Default)]
pub struct BoundaryRegistry {
    entries: IndexMap<BoundaryKey, Vec<BoundaryProxy>>,
}

impl BoundaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `proxies`, replacing whatever was registered under `key`.
    pub fn insert(&mut self, key: BoundaryKey, proxies: Vec<BoundaryProxy>) -> Option<Vec<BoundaryProxy>> {
        self.entries.insert(key, proxies)
    }

    pub fn remove(&mut self, key: &BoundaryKey) -> Option<Vec<BoundaryProxy>> {
        self.entries.swap_remove(key)
    }

    pub fn get(&self, key: &BoundaryKey) -> Option<&[BoundaryProxy]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn get_mut(&mut self, key: &BoundaryKey) -> Option<&mut Vec<BoundaryProxy>> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &BoundaryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &BoundaryKey> {
        self.entries.keys()
    }

    /// Every registered proxy.
    pub fn proxies(&self) -> impl Iterator<Item = &BoundaryProxy> {
        self.entries.values().flatten()
    }

    pub fn proxies_mut(&mut self) -> impl Iterator<Item = &mut BoundaryProxy> {
        self.entries.values_mut().flatten()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
