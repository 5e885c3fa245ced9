use std::{
    collections::{BTreeMap, HashMap},
    ops::Bound,
    sync::RwLock,
};

use anyhow::anyhow;
use log::trace;

use super::{Column, ColumnStore, Snapshot};
use crate::core::error::LedgerError;

type Tree = BTreeMap<Vec<u8>, Vec<u8>>;

/// Volatile backend used for dry runs and tests.
/// A snapshot is applied under a single write guard.
#[derive(Default)]
pub struct MemoryStorage {
    trees: RwLock<HashMap<Column, Tree>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    // Number of entries stored in a column
    pub fn count_entries(&self, column: Column) -> Result<usize, LedgerError> {
        let trees = self
            .trees
            .read()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        Ok(trees.get(&column).map_or(0, BTreeMap::len))
    }
}

impl ColumnStore for MemoryStorage {
    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        let trees = self
            .trees
            .read()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        Ok(trees.get(&column).and_then(|tree| tree.get(key).cloned()))
    }

    fn scan_prefix_raw(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LedgerError> {
        let trees = self
            .trees
            .read()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;

        let Some(tree) = trees.get(&column) else {
            return Ok(Vec::new());
        };

        Ok(tree
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn commit(&self, snapshot: Snapshot) -> Result<(), LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("commit snapshot with {} writes", snapshot.len());
        }

        let mut trees = self
            .trees
            .write()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;

        for (column, changes) in snapshot.into_trees() {
            let tree = trees.entry(column).or_default();
            for (key, value) in changes {
                match value {
                    Some(value) => {
                        tree.insert(key.to_vec(), value.to_vec());
                    }
                    None => {
                        tree.remove(key.as_ref());
                    }
                }
            }
        }

        Ok(())
    }
}
