use std::sync::Arc;

use anyhow::Context;
use log::{debug, info, trace};
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, DBCompactionStyle, DBCompressionType,
    DBWithThreadMode, Direction, Env, IteratorMode, MultiThreaded, Options, WriteBatch,
    WriteOptions,
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use super::{Column, ColumnStore, Snapshot};
use crate::{config::RocksDBConfig, core::error::LedgerError};

macro_rules! cf_handle {
    ($db: expr, $column: expr) => {
        $db.cf_handle($column.as_ref())
            .with_context(|| format!("Column {:?} not found", $column))?
    };
}

type InnerDB = DBWithThreadMode<MultiThreaded>;

#[derive(Debug, Copy, Clone, clap::ValueEnum, Serialize, Deserialize)]
#[clap(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CompressionMode {
    None,
    Snappy,
    Zlib,
    Lz4,
    Zstd,
}

#[derive(Debug, Copy, Clone, clap::ValueEnum, Serialize, Deserialize)]
#[clap(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    None,
    Lru,
    HyperClock,
}

impl Default for CacheMode {
    fn default() -> Self {
        Self::Lru
    }
}

impl Default for CompressionMode {
    fn default() -> Self {
        Self::Snappy
    }
}

impl CompressionMode {
    pub fn convert(self) -> DBCompressionType {
        match self {
            Self::None => DBCompressionType::None,
            Self::Snappy => DBCompressionType::Snappy,
            Self::Zlib => DBCompressionType::Zlib,
            Self::Lz4 => DBCompressionType::Lz4,
            Self::Zstd => DBCompressionType::Zstd,
        }
    }
}

/// Persistent ledger backed by one RocksDB column family per [`Column`]
pub struct RocksStorage {
    db: Arc<InnerDB>,
    sync_writes: bool,
}

impl RocksStorage {
    pub fn new(dir: &str, config: &RocksDBConfig) -> Result<Self, LedgerError> {
        let cfs = Column::iter()
            .map(|column| ColumnFamilyDescriptor::new(column.to_string(), Options::default()));

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compaction_style(DBCompactionStyle::Universal);

        opts.increase_parallelism(config.parallelism as _);
        opts.set_max_background_jobs(config.max_background_jobs as _);
        opts.set_max_subcompactions(config.max_subcompaction_jobs as _);

        opts.set_max_open_files(config.max_open_files);
        opts.set_keep_log_file_num(config.keep_max_log_files);

        let mut env = Env::new().context("Error while creating RocksDB env")?;
        env.set_low_priority_background_threads(config.low_priority_background_threads as _);
        opts.set_env(&env);
        opts.set_compression_type(config.compression_mode.convert());

        let mut block_opts = BlockBasedOptions::default();
        match config.cache_mode {
            CacheMode::None => {
                block_opts.disable_cache();
            }
            CacheMode::Lru => {
                let cache = Cache::new_lru_cache(config.cache_size as _);
                block_opts.set_block_cache(&cache);
            }
            CacheMode::HyperClock => {
                let cache = Cache::new_hyper_clock_cache(config.cache_size as _, 1024);
                block_opts.set_block_cache(&cache);
            }
        };

        opts.set_block_based_table_factory(&block_opts);
        if config.write_buffer_shared {
            opts.set_db_write_buffer_size(config.write_buffer_size as _);
        } else {
            opts.set_write_buffer_size(config.write_buffer_size as _);
        }

        if log::log_enabled!(log::Level::Info) {
            info!("Opening RocksDB ledger at {}", dir);
        }

        let db = InnerDB::open_cf_descriptors(&opts, dir, cfs)
            .with_context(|| format!("Failed to open RocksDB at {}", dir))?;

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.sync_writes,
        })
    }

    pub fn flush(&self) -> Result<(), LedgerError> {
        debug!("flushing RocksDB ledger");
        for column in Column::iter() {
            let cf = cf_handle!(self.db, column);
            self.db
                .flush_cf(&cf)
                .with_context(|| format!("Error while flushing column {:?}", column))?;
        }
        Ok(())
    }
}

impl ColumnStore for RocksStorage {
    fn get_raw(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError> {
        let cf = cf_handle!(self.db, column);
        let value = self
            .db
            .get_cf(&cf, key)
            .with_context(|| format!("Internal error while reading column {:?}", column))?;
        Ok(value)
    }

    fn scan_prefix_raw(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("scan prefix of {} bytes in {:?}", prefix.len(), column);
        }

        let cf = cf_handle!(self.db, column);
        let iterator = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iterator {
            let (key, value) = item
                .with_context(|| format!("Internal error while iterating column {:?}", column))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.into_vec(), value.into_vec()));
        }

        Ok(entries)
    }

    fn commit(&self, snapshot: Snapshot) -> Result<(), LedgerError> {
        if log::log_enabled!(log::Level::Trace) {
            trace!("commit snapshot with {} writes", snapshot.len());
        }

        let mut batch = WriteBatch::default();
        for (column, changes) in snapshot.into_trees() {
            let cf = cf_handle!(self.db, column);
            for (key, value) in changes {
                match value {
                    Some(value) => batch.put_cf(&cf, key, value),
                    None => batch.delete_cf(&cf, key),
                }
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db
            .write_opt(batch, &write_opts)
            .context("Error while committing ledger batch")?;

        Ok(())
    }
}
