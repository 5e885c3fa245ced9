mod column;
pub mod memory;
mod providers;
pub mod rocksdb;
mod snapshot;

use std::collections::BTreeMap;

use log::trace;
use nodeshare_common::serializer::Serializer;

use crate::core::error::LedgerError;

pub use column::*;
pub use memory::MemoryStorage;
pub use providers::*;
pub use rocksdb::RocksStorage;
pub use snapshot::{Changes, EntryState};

/// Snapshot specialized to the ledger columns
pub type Snapshot = snapshot::Snapshot<Column>;

/// Raw key/value access shared by every backend.
///
/// Reads always see committed state only. Writes are staged into a
/// [`Snapshot`] and applied by `commit` as a single atomic batch: either
/// every staged row becomes visible or none does.
pub trait ColumnStore: Send + Sync + 'static {
    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError>;

    // Entries whose key starts with `prefix`, in ascending key order
    fn scan_prefix_raw(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LedgerError>;

    fn commit(&self, snapshot: Snapshot) -> Result<(), LedgerError>;

    fn load_optional_from_disk<V: Serializer>(
        &self,
        column: Column,
        key: &[u8],
    ) -> Result<Option<V>, LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("load optional {:?} from disk", column);
        }

        match self.get_raw(column, key)? {
            Some(bytes) => Ok(Some(V::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn contains_data(&self, column: Column, key: &[u8]) -> Result<bool, LedgerError> {
        Ok(self.get_raw(column, key)?.is_some())
    }

    fn load_prefix_from_disk<V: Serializer>(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<BTreeMap<Vec<u8>, V>, LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("load prefix {:?} from disk", column);
        }

        self.scan_prefix_raw(column, prefix)?
            .into_iter()
            .map(|(key, value)| Ok((key, V::from_bytes(&value)?)))
            .collect()
    }
}

/// Every backend that stores ledger columns implements the whole provider set
pub trait Storage:
    ColumnStore
    + WalletProvider
    + HierarchyProvider
    + CommissionProvider
    + WithdrawalProvider
    + MemberLevelProvider
    + CommissionSettingsProvider
{
}

impl<S: ColumnStore> Storage for S {}
