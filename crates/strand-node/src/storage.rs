//! RocksDB-backed chain store.
//!
//! Three independent databases live under the store directory:
//! - `main.db`: metadata, blocks by hash, height index, transactions by hash,
//!   and the spend index, each in its own column family.
//! - `blocktx.db`: transaction hash -> containing block hash.
//! - `affects.db`: `address_hash || tx_hash` -> empty, scanned by address prefix.
//!
//! Metadata carries an `isRunning` flag that is set on [`ChainStore::connect`]
//! and cleared on [`ChainStore::disconnect`]. Finding it set on connect means
//! the previous process died mid-write, so the chain height is wound back by
//! [`CRASH_ROLLBACK_BLOCKS`] and the tail is re-synced from peers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Options, SliceTransform, WriteBatch};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use strand_core::codec::decode_transaction;
use strand_core::constants::{CRASH_ROLLBACK_BLOCKS, DB_MAJOR_VERSION, DB_MINOR_VERSION};
use strand_core::crypto::CryptoProvider;
use strand_core::error::{StoreError, StrandError};
use strand_core::types::{AddressHash, Block, Hash256, OutPoint, Transaction};
use strand_network::ChainHead;

use crate::config::StoreOptions;

// --- Column family names (main.db) ---

const CF_META: &str = "meta";
const CF_BLOCKS: &str = "blocks";
const CF_HEIGHTS: &str = "heights";
const CF_TXS: &str = "txs";
const CF_SPENDS: &str = "spends";

const MAIN_CFS: &[&str] = &[CF_META, CF_BLOCKS, CF_HEIGHTS, CF_TXS, CF_SPENDS];

const MAIN_DB: &str = "main.db";
const BLOCKTX_DB: &str = "blocktx.db";
const AFFECTS_DB: &str = "affects.db";

const ADDRESS_LEN: usize = 20;
const AFFECTS_KEY_LEN: usize = ADDRESS_LEN + 32;

fn storage(e: rocksdb::Error) -> StrandError {
    StrandError::Storage(e.to_string())
}

fn corrupt(what: &str, e: impl std::fmt::Display) -> StrandError {
    StoreError::Corrupt(format!("{what}: {e}")).into()
}

/// Height key: 4-byte big-endian so keys sort by height.
fn height_key(height: u32) -> [u8; 4] {
    height.to_be_bytes()
}

fn affects_key(address: &AddressHash, tx_hash: &Hash256) -> [u8; AFFECTS_KEY_LEN] {
    let mut key = [0u8; AFFECTS_KEY_LEN];
    key[..ADDRESS_LEN].copy_from_slice(address.as_bytes());
    key[ADDRESS_LEN..].copy_from_slice(tx_hash.as_bytes());
    key
}

/// Metadata record names. Each is stored under its own plain-string key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaKey {
    MajorVersion,
    MinorVersion,
    ChainHeight,
    IsRunning,
}

impl MetaKey {
    pub const ALL: [MetaKey; 4] = [
        MetaKey::MajorVersion,
        MetaKey::MinorVersion,
        MetaKey::ChainHeight,
        MetaKey::IsRunning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKey::MajorVersion => "majorVersion",
            MetaKey::MinorVersion => "minorVersion",
            MetaKey::ChainHeight => "chainHeight",
            MetaKey::IsRunning => "isRunning",
        }
    }
}

/// In-memory copy of the store's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainMetadata {
    pub major_version: u32,
    pub minor_version: u32,
    /// Height of the current tip.
    pub chain_height: u32,
    /// Non-zero while a process has the store open.
    pub is_running: u32,
}

impl ChainMetadata {
    fn fresh() -> Self {
        Self {
            major_version: DB_MAJOR_VERSION,
            minor_version: DB_MINOR_VERSION,
            chain_height: 0,
            is_running: 0,
        }
    }

    pub fn get(&self, key: MetaKey) -> u32 {
        match key {
            MetaKey::MajorVersion => self.major_version,
            MetaKey::MinorVersion => self.minor_version,
            MetaKey::ChainHeight => self.chain_height,
            MetaKey::IsRunning => self.is_running,
        }
    }

    fn set(&mut self, key: MetaKey, value: u32) {
        match key {
            MetaKey::MajorVersion => self.major_version = value,
            MetaKey::MinorVersion => self.minor_version = value,
            MetaKey::ChainHeight => self.chain_height = value,
            MetaKey::IsRunning => self.is_running = value,
        }
    }
}

/// Pending writes to `main.db`, flushed atomically by [`ChainStore::end_transaction`].
#[derive(Default)]
pub struct StoreBatch {
    batch: WriteBatch,
}

impl StoreBatch {
    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

struct Databases {
    main: DB,
    block_tx: DB,
    affects: DB,
}

impl Databases {
    fn cf(&self, name: &str) -> Result<&ColumnFamily, StrandError> {
        self.main
            .cf_handle(name)
            .ok_or_else(|| StrandError::Storage(format!("missing column family: {name}")))
    }
}

/// Persistent chain state: blocks, transactions, and their indexes.
pub struct ChainStore {
    path: PathBuf,
    options: StoreOptions,
    crypto: Arc<dyn CryptoProvider>,
    dbs: Option<Databases>,
    meta: ChainMetadata,
}

impl ChainStore {
    /// Create a disconnected store rooted at `path`.
    pub fn new(path: impl AsRef<Path>, options: StoreOptions, crypto: Arc<dyn CryptoProvider>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options,
            crypto,
            dbs: None,
            meta: ChainMetadata::fresh(),
        }
    }

    /// Create and connect a store with default options.
    pub fn open(path: impl AsRef<Path>, crypto: Arc<dyn CryptoProvider>) -> Result<Self, StrandError> {
        let mut store = Self::new(path, StoreOptions::default(), crypto);
        store.connect()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_connected(&self) -> bool {
        self.dbs.is_some()
    }

    pub fn metadata(&self) -> ChainMetadata {
        self.meta
    }

    pub fn chain_height(&self) -> u32 {
        self.meta.chain_height
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    fn db_options(&self) -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_max_open_files(self.options.max_open_files);
        opts.set_write_buffer_size(self.options.write_buffer_size);
        opts
    }

    /// Open all databases and load metadata. No-op when already connected.
    pub fn connect(&mut self) -> Result<(), StrandError> {
        if self.dbs.is_some() {
            return Ok(());
        }
        info!(path = %self.path.display(), "opening chain store");
        std::fs::create_dir_all(&self.path).map_err(|e| {
            StrandError::Storage(format!("cannot create {}: {e}", self.path.display()))
        })?;

        let mut main_opts = self.db_options();
        main_opts.create_missing_column_families(true);
        let cfs = MAIN_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));
        let main = DB::open_cf_descriptors(&main_opts, self.path.join(MAIN_DB), cfs).map_err(storage)?;

        let block_tx = DB::open(&self.db_options(), self.path.join(BLOCKTX_DB)).map_err(storage)?;

        let mut affects_opts = self.db_options();
        affects_opts.set_prefix_extractor(SliceTransform::create_fixed_prefix(ADDRESS_LEN));
        let affects = DB::open(&affects_opts, self.path.join(AFFECTS_DB)).map_err(storage)?;

        self.dbs = Some(Databases { main, block_tx, affects });

        let is_new = match self.load_meta()? {
            Some(meta) => {
                self.meta = meta;
                false
            }
            None => {
                self.meta = ChainMetadata::fresh();
                for key in MetaKey::ALL {
                    self.set_meta(key, self.meta.get(key))?;
                }
                true
            }
        };

        if self.meta.is_running != 0 {
            let height = self.meta.chain_height.saturating_sub(CRASH_ROLLBACK_BLOCKS);
            error!(
                from = self.meta.chain_height,
                to = height,
                "database was not shut down cleanly, rolling back chain height"
            );
            self.set_meta(MetaKey::ChainHeight, height)?;
        }
        self.set_meta(MetaKey::IsRunning, 1)?;

        info!(
            new = is_new,
            version = %format!("{}.{}", self.meta.major_version, self.meta.minor_version),
            chain_height = self.meta.chain_height,
            "chain store ready"
        );
        Ok(())
    }

    /// Clear the running flag and close all databases. No-op when not connected.
    pub fn disconnect(&mut self) -> Result<(), StrandError> {
        if self.dbs.is_none() {
            return Ok(());
        }
        self.set_meta(MetaKey::IsRunning, 0)?;
        if let Some(dbs) = self.dbs.take() {
            dbs.main.flush().map_err(storage)?;
        }
        info!(path = %self.path.display(), "chain store closed");
        Ok(())
    }

    /// Destroy all three databases, leaving the store disconnected.
    pub fn drop_database(&mut self) -> Result<(), StrandError> {
        // Closing without clearing the running flag; the files are about to go.
        self.dbs = None;
        let opts = Options::default();
        for name in [MAIN_DB, BLOCKTX_DB, AFFECTS_DB] {
            DB::destroy(&opts, self.path.join(name)).map_err(storage)?;
        }
        self.meta = ChainMetadata::fresh();
        info!(path = %self.path.display(), "chain store destroyed");
        Ok(())
    }

    /// Destroy and recreate all three databases.
    pub fn empty_database(&mut self) -> Result<(), StrandError> {
        self.disconnect()?;
        self.drop_database()?;
        self.connect()
    }

    /// Open a batch. Batch-aware writes queue into it until [`Self::end_transaction`].
    pub fn start_transaction(&self) -> StoreBatch {
        StoreBatch::default()
    }

    /// Write a batch atomically. An empty batch writes nothing.
    pub fn end_transaction(&self, batch: StoreBatch) -> Result<(), StrandError> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!(ops = batch.len(), "flushing store batch");
        self.dbs()?.main.write(batch.batch).map_err(storage)
    }

    fn dbs(&self) -> Result<&Databases, StrandError> {
        self.dbs.as_ref().ok_or_else(|| StoreError::NotConnected.into())
    }

    /// Queue `ops` into `batch`, or write them at once if there is none.
    fn write_main(
        &self,
        batch: Option<&mut StoreBatch>,
        ops: impl FnOnce(&Databases, &mut WriteBatch) -> Result<(), StrandError>,
    ) -> Result<(), StrandError> {
        let dbs = self.dbs()?;
        match batch {
            Some(b) => ops(dbs, &mut b.batch),
            None => {
                let mut wb = WriteBatch::default();
                ops(dbs, &mut wb)?;
                dbs.main.write(wb).map_err(storage)
            }
        }
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Read all metadata records. `None` if any is missing.
    fn load_meta(&self) -> Result<Option<ChainMetadata>, StrandError> {
        let mut meta = ChainMetadata::fresh();
        for key in MetaKey::ALL {
            match self.get_meta(key)? {
                Some(value) => meta.set(key, value),
                None => return Ok(None),
            }
        }
        Ok(Some(meta))
    }

    /// Read one metadata record from disk.
    pub fn get_meta(&self, key: MetaKey) -> Result<Option<u32>, StrandError> {
        let dbs = self.dbs()?;
        let cf = dbs.cf(CF_META)?;
        match dbs.main.get_cf(cf, key.as_str()).map_err(storage)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| corrupt(key.as_str(), e)),
            None => Ok(None),
        }
    }

    /// Write one metadata record and update the in-memory copy.
    pub fn set_meta(&mut self, key: MetaKey, value: u32) -> Result<(), StrandError> {
        let dbs = self.dbs()?;
        let cf = dbs.cf(CF_META)?;
        let bytes = serde_json::to_vec(&value).map_err(|e| corrupt(key.as_str(), e))?;
        dbs.main.put_cf(cf, key.as_str(), bytes).map_err(storage)?;
        self.meta.set(key, value);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Persist a block, its height index entry, and its transaction index.
    ///
    /// Only active blocks are height-indexed. An active block above the
    /// current tip advances `chainHeight`.
    pub fn save_block(&mut self, block: &Block) -> Result<(), StrandError> {
        let hash = block.hash(self.crypto.as_ref());
        let record = bincode::encode_to_vec(block, bincode::config::standard())
            .map_err(|e| corrupt("block", e))?;
        let advances = block.active && self.meta.chain_height < block.height;

        {
            let dbs = self.dbs()?;
            let mut wb = WriteBatch::default();
            wb.put_cf(dbs.cf(CF_BLOCKS)?, hash.as_bytes(), &record);
            if block.active {
                wb.put_cf(dbs.cf(CF_HEIGHTS)?, height_key(block.height), hash.as_bytes());
            }
            dbs.main.write(wb).map_err(storage)?;
        }

        if advances {
            self.set_meta(MetaKey::ChainHeight, block.height)?;
        }

        let dbs = self.dbs()?;
        let mut wb = WriteBatch::default();
        for tx_hash in &block.txs {
            wb.put(tx_hash.as_bytes(), hash.as_bytes());
        }
        dbs.block_tx.write(wb).map_err(storage)?;

        debug!(%hash, height = block.height, active = block.active, txs = block.txs.len(), "saved block");
        Ok(())
    }

    /// Persist one transaction's canonical bytes keyed by its hash.
    pub fn save_transaction(&self, tx: &Transaction, batch: Option<&mut StoreBatch>) -> Result<(), StrandError> {
        self.save_transactions(std::slice::from_ref(tx), batch)
    }

    pub fn save_transactions(&self, txs: &[Transaction], batch: Option<&mut StoreBatch>) -> Result<(), StrandError> {
        let crypto = self.crypto.as_ref();
        self.write_main(batch, |dbs, wb| {
            let cf = dbs.cf(CF_TXS)?;
            for tx in txs {
                wb.put_cf(cf, tx.hash(crypto).as_bytes(), &tx.raw);
            }
            Ok(())
        })
    }

    pub fn connect_transaction(&self, tx: &Transaction, batch: Option<&mut StoreBatch>) -> Result<(), StrandError> {
        self.connect_transactions(std::slice::from_ref(tx), batch)
    }

    /// Mark every outpoint spent by `txs` and index each affected address.
    ///
    /// Spend entries honor `batch`. Address entries live in a separate
    /// database and are written immediately.
    pub fn connect_transactions(&self, txs: &[Transaction], batch: Option<&mut StoreBatch>) -> Result<(), StrandError> {
        let crypto = self.crypto.as_ref();
        let hashes: Vec<Hash256> = txs.iter().map(|tx| tx.hash(crypto)).collect();

        self.write_main(batch, |dbs, wb| {
            let cf = dbs.cf(CF_SPENDS)?;
            for (tx, hash) in txs.iter().zip(&hashes) {
                for outpoint in tx.spent_outpoints() {
                    wb.put_cf(cf, outpoint.as_bytes(), hash.as_bytes());
                }
            }
            Ok(())
        })?;

        let mut wb = WriteBatch::default();
        for (tx, hash) in txs.iter().zip(&hashes) {
            for address in &tx.affects {
                wb.put(affects_key(address, hash), []);
            }
        }
        if !wb.is_empty() {
            self.dbs()?.affects.write(wb).map_err(storage)?;
        }
        Ok(())
    }

    pub fn disconnect_transaction(&self, tx: &Transaction, batch: Option<&mut StoreBatch>) -> Result<(), StrandError> {
        self.disconnect_transactions(std::slice::from_ref(tx), batch)
    }

    /// Remove the spend entries written by [`Self::connect_transactions`].
    ///
    /// Address index entries are kept; that index is an append-only history.
    pub fn disconnect_transactions(&self, txs: &[Transaction], batch: Option<&mut StoreBatch>) -> Result<(), StrandError> {
        self.write_main(batch, |dbs, wb| {
            let cf = dbs.cf(CF_SPENDS)?;
            for outpoint in txs.iter().flat_map(Transaction::spent_outpoints) {
                wb.delete_cf(cf, outpoint.as_bytes());
            }
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Fetch several keys from one column family, keeping only the hits.
    fn multi_get(&self, cf_name: &str, keys: &[&[u8]]) -> Result<Vec<Vec<u8>>, StrandError> {
        let dbs = self.dbs()?;
        let cf = dbs.cf(cf_name)?;
        let mut found = Vec::with_capacity(keys.len());
        for result in dbs.main.multi_get_cf(keys.iter().map(|k| (cf, *k))) {
            if let Some(value) = result.map_err(storage)? {
                found.push(value);
            }
        }
        Ok(found)
    }

    fn decode_block(bytes: &[u8]) -> Result<Block, StrandError> {
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map(|(block, _)| block)
            .map_err(|e| corrupt("block", e))
    }

    fn decode_tx(bytes: &[u8]) -> Result<Transaction, StrandError> {
        decode_transaction(bytes).map_err(|e| corrupt("transaction", e))
    }

    pub fn get_transaction_by_hash(&self, hash: &Hash256) -> Result<Option<Transaction>, StrandError> {
        let dbs = self.dbs()?;
        match dbs.main.get_cf(dbs.cf(CF_TXS)?, hash.as_bytes()).map_err(storage)? {
            Some(bytes) => Self::decode_tx(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Transactions for the known hashes among `hashes`, in request order.
    pub fn get_transactions_by_hashes(&self, hashes: &[Hash256]) -> Result<Vec<Transaction>, StrandError> {
        let keys: Vec<&[u8]> = hashes.iter().map(|h| h.as_bytes().as_slice()).collect();
        self.multi_get(CF_TXS, &keys)?
            .iter()
            .map(|bytes| Self::decode_tx(bytes))
            .collect()
    }

    /// Same as [`Self::get_transactions_by_hashes`]; outputs are read from the full transaction.
    pub fn get_outputs_by_hashes(&self, hashes: &[Hash256]) -> Result<Vec<Transaction>, StrandError> {
        self.get_transactions_by_hashes(hashes)
    }

    pub fn get_block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>, StrandError> {
        let dbs = self.dbs()?;
        match dbs.main.get_cf(dbs.cf(CF_BLOCKS)?, hash.as_bytes()).map_err(storage)? {
            Some(bytes) => Self::decode_block(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Blocks for the known hashes among `hashes`, in request order.
    pub fn get_blocks_by_hashes(&self, hashes: &[Hash256]) -> Result<Vec<Block>, StrandError> {
        let keys: Vec<&[u8]> = hashes.iter().map(|h| h.as_bytes().as_slice()).collect();
        self.multi_get(CF_BLOCKS, &keys)?
            .iter()
            .map(|bytes| Self::decode_block(bytes))
            .collect()
    }

    /// Hash of the active block at `height`.
    pub fn get_block_hash(&self, height: u32) -> Result<Option<Hash256>, StrandError> {
        let dbs = self.dbs()?;
        let value = dbs
            .main
            .get_cf(dbs.cf(CF_HEIGHTS)?, height_key(height))
            .map_err(storage)?;
        match value {
            Some(bytes) => Hash256::from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| corrupt("height index", format!("{} byte hash at {height}", bytes.len()))),
            None => Ok(None),
        }
    }

    pub fn get_block_by_height(&self, height: u32) -> Result<Option<Block>, StrandError> {
        match self.get_block_hash(height)? {
            Some(hash) => self.get_block_by_hash(&hash),
            None => Ok(None),
        }
    }

    /// Active blocks at the indexed heights among `heights`, sorted by height.
    pub fn get_blocks_by_heights(&self, heights: &[u32]) -> Result<Vec<Block>, StrandError> {
        let keys: Vec<[u8; 4]> = heights.iter().map(|h| height_key(*h)).collect();
        let key_refs: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let hashes = self
            .multi_get(CF_HEIGHTS, &key_refs)?
            .into_iter()
            .map(|bytes| {
                Hash256::from_slice(&bytes)
                    .ok_or_else(|| corrupt("height index", format!("{} byte hash", bytes.len())))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut blocks = self.get_blocks_by_hashes(&hashes)?;
        blocks.sort_by_key(|b| b.height);
        Ok(blocks)
    }

    /// The active block following `prev`.
    ///
    /// Fails with [`StoreError::BlockNotFound`] if `prev` itself is unknown.
    pub fn get_block_by_prev(&self, prev: &Hash256) -> Result<Option<Block>, StrandError> {
        let block = self
            .get_block_by_hash(prev)?
            .ok_or_else(|| StoreError::BlockNotFound(prev.to_string()))?;
        self.get_block_by_height(block.height + 1)
    }

    /// The active block at the current chain height.
    pub fn get_top_block(&self) -> Result<Option<Block>, StrandError> {
        self.get_block_by_height(self.meta.chain_height)
    }

    /// Active blocks in the height range `[start, start + limit)`, clipped to the tip.
    ///
    /// A negative `start` or `limit` counts back from one past the tip. A
    /// `limit` of `None` runs to the tip; `Some(0)` is always empty.
    pub fn get_block_slice(&self, start: i64, limit: Option<i64>) -> Result<Vec<Block>, StrandError> {
        let past_tip = i64::from(self.meta.chain_height) + 1;
        let start = if start < 0 { past_tip + start } else { start };
        let start = start.max(0);
        let end = match limit {
            Some(0) => return Ok(Vec::new()),
            Some(l) if l < 0 => past_tip + l,
            Some(l) => start.saturating_add(l),
            None => past_tip,
        };
        let end = end.min(past_tip);
        if start >= end {
            return Ok(Vec::new());
        }
        let heights: Vec<u32> = (start..end).filter_map(|h| u32::try_from(h).ok()).collect();
        self.get_blocks_by_heights(&heights)
    }

    /// The highest active block among `locator`.
    pub fn get_block_by_locator(&self, locator: &[Hash256]) -> Result<Option<Block>, StrandError> {
        Ok(self
            .get_blocks_by_hashes(locator)?
            .into_iter()
            .filter(|b| b.active)
            .max_by_key(|b| b.height))
    }

    /// How many of `outpoints` are already spent.
    pub fn count_conflicting_transactions(&self, outpoints: &[OutPoint]) -> Result<usize, StrandError> {
        let keys: Vec<&[u8]> = outpoints.iter().map(|o| o.as_bytes().as_slice()).collect();
        Ok(self.multi_get(CF_SPENDS, &keys)?.len())
    }

    /// The stored transactions spending any of `outpoints`.
    pub fn get_conflicting_transactions(&self, outpoints: &[OutPoint]) -> Result<Vec<Transaction>, StrandError> {
        let keys: Vec<&[u8]> = outpoints.iter().map(|o| o.as_bytes().as_slice()).collect();
        let hashes: Vec<Hash256> = self
            .multi_get(CF_SPENDS, &keys)?
            .iter()
            .filter_map(|bytes| Hash256::from_slice(bytes))
            .collect();
        self.get_transactions_by_hashes(&hashes)
    }

    pub fn knows_block(&self, hash: &Hash256) -> Result<bool, StrandError> {
        let dbs = self.dbs()?;
        Ok(dbs
            .main
            .get_pinned_cf(dbs.cf(CF_BLOCKS)?, hash.as_bytes())
            .map_err(storage)?
            .is_some())
    }

    pub fn knows_transaction(&self, hash: &Hash256) -> Result<bool, StrandError> {
        let dbs = self.dbs()?;
        Ok(dbs
            .main
            .get_pinned_cf(dbs.cf(CF_TXS)?, hash.as_bytes())
            .map_err(storage)?
            .is_some())
    }

    /// Hash of the block that contains `tx_hash`.
    pub fn get_containing_block(&self, tx_hash: &Hash256) -> Result<Option<Hash256>, StrandError> {
        let value = self.dbs()?.block_tx.get(tx_hash.as_bytes()).map_err(storage)?;
        match value {
            Some(bytes) => Hash256::from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| corrupt("block tx index", format!("{} byte hash", bytes.len()))),
            None => Ok(None),
        }
    }

    /// Hashes of every transaction indexed under any of `addresses`.
    pub fn get_affected_transactions(&self, addresses: &[AddressHash]) -> Result<Vec<Hash256>, StrandError> {
        let dbs = self.dbs()?;
        let mut hashes = Vec::new();
        for address in addresses {
            let prefix = address.as_bytes();
            for item in dbs.affects.prefix_iterator(prefix) {
                let (key, _) = item.map_err(storage)?;
                // prefix_iterator may overshoot
                if key.len() != AFFECTS_KEY_LEN || &key[..ADDRESS_LEN] != prefix {
                    break;
                }
                if let Some(hash) = Hash256::from_slice(&key[ADDRESS_LEN..]) {
                    hashes.push(hash);
                }
            }
        }
        Ok(hashes)
    }
}

impl ChainHead for ChainStore {
    fn best_height(&self) -> u32 {
        self.meta.chain_height
    }
}
