use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
};

use bytes::Bytes;

/// State of an entry in a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryState<T> {
    /// The entry has been added/modified in our snapshot
    Stored(T),
    /// The entry has been deleted in our snapshot
    Deleted,
    /// The entry is not present in our snapshot, must fallback on disk
    Absent,
}

impl<T> EntryState<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, EntryState::Absent)
    }
}

/// Pending writes for a single column
#[derive(Clone, Debug, Default)]
pub struct Changes {
    pub writes: BTreeMap<Bytes, Option<Bytes>>,
}

impl Changes {
    /// Set a key to a new value.
    /// Returns the previous value state if any.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> EntryState<Bytes>
    where
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        match self.writes.insert(key.into(), Some(value.into())) {
            Some(Some(prev)) => EntryState::Stored(prev),
            Some(None) => EntryState::Deleted,
            None => EntryState::Absent,
        }
    }

    pub fn get(&self, key: &[u8]) -> EntryState<Bytes> {
        match self.writes.get(key) {
            Some(Some(value)) => EntryState::Stored(value.clone()),
            Some(None) => EntryState::Deleted,
            None => EntryState::Absent,
        }
    }
}

impl IntoIterator for Changes {
    type Item = (Bytes, Option<Bytes>);
    type IntoIter = std::collections::btree_map::IntoIter<Bytes, Option<Bytes>>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

/// Batch of staged writes across columns, committed atomically by the
/// storage backend or dropped without touching it.
#[derive(Debug, Clone)]
pub struct Snapshot<C: Hash + Eq> {
    pub trees: HashMap<C, Changes>,
}

impl<C: Hash + Eq> Default for Snapshot<C> {
    fn default() -> Self {
        Self {
            trees: HashMap::new(),
        }
    }
}

impl<C: Hash + Eq> Snapshot<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a key/value.
    /// Returns the previous value state.
    pub fn put<K: Into<Bytes>, V: Into<Bytes>>(
        &mut self,
        column: C,
        key: K,
        value: V,
    ) -> EntryState<Bytes> {
        self.trees.entry(column).or_default().insert(key, value)
    }

    pub fn get(&self, column: &C, key: &[u8]) -> EntryState<Bytes> {
        self.trees
            .get(column)
            .map_or(EntryState::Absent, |changes| changes.get(key))
    }

    /// Number of staged writes across all columns
    pub fn len(&self) -> usize {
        self.trees.values().map(|c| c.writes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_trees(self) -> HashMap<C, Changes> {
        self.trees
    }
}
