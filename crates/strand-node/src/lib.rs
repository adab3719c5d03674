//! # strand-node
//! Chain store and node composition.
//!
//! - [`storage::ChainStore`]: persistent blocks, transactions, and indexes backed by RocksDB
//! - [`node::Node`]: event loop wiring the store to peer sessions
//! - [`config::NodeConfig`]: node configuration

pub mod config;
pub mod node;
pub mod storage;

pub use config::{NodeConfig, StoreOptions};
pub use node::{Node, StoreChainHead};
pub use storage::{ChainMetadata, ChainStore, MetaKey, StoreBatch};
