//! Node composition and event loop.
//!
//! The [`Node`] wires the chain store to the peer network. Sessions handle
//! the handshake and pings themselves; the node answers data requests
//! (`getblocks`, `getheaders`, `getdata`) from the store and asks peers for
//! announced items it does not have yet.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use strand_core::constants::{MAX_HEADERS_PER_GETHEADERS, MAX_INV_PER_GETBLOCKS, MSG_BLOCK, MSG_TX};
use strand_core::crypto::CryptoProvider;
use strand_core::error::StrandError;
use strand_core::types::Block;
use strand_network::{BlockLocator, BlockMessage, ChainHead, InvItem, Message, NetworkEvent, NetworkNode, SessionContext};

use crate::config::NodeConfig;
use crate::storage::ChainStore;

/// Adapter exposing the shared store's tip height to peer sessions.
pub struct StoreChainHead {
    store: Arc<RwLock<ChainStore>>,
}

impl StoreChainHead {
    pub fn new(store: Arc<RwLock<ChainStore>>) -> Self {
        Self { store }
    }
}

impl ChainHead for StoreChainHead {
    fn best_height(&self) -> u32 {
        self.store.read().chain_height()
    }
}

pub struct Node {
    config: NodeConfig,
    crypto: Arc<dyn CryptoProvider>,
    store: Arc<RwLock<ChainStore>>,
    network: NetworkNode,
}

impl Node {
    /// Open the chain store and prepare the network layer.
    ///
    /// Returns the node together with the receiver that [`Node::run`] drains.
    pub fn new(
        config: NodeConfig,
        crypto: Arc<dyn CryptoProvider>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<NetworkEvent>), StrandError> {
        let mut store = ChainStore::new(config.db_path(), config.store, crypto.clone());
        store.connect()?;
        let store = Arc::new(RwLock::new(store));

        let head = Arc::new(StoreChainHead::new(store.clone()));
        let ctx = Arc::new(SessionContext::new(config.network.clone(), crypto.clone(), head));
        let (network, events) = NetworkNode::new(ctx);

        let node = Arc::new(Self {
            config,
            crypto,
            store,
            network,
        });
        Ok((node, events))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<RwLock<ChainStore>> {
        &self.store
    }

    pub fn network(&self) -> &NetworkNode {
        &self.network
    }

    /// Start listening and dial the configured peers.
    ///
    /// A peer that cannot be reached is logged and skipped.
    pub async fn start(&self) -> Result<(), StrandError> {
        if self.config.network.listen {
            self.network.listen().await?;
        }
        for peer in &self.config.network.connect_peers {
            match self.network.connect(peer).await {
                Ok(addr) => info!(%addr, "dialed peer"),
                Err(e) => warn!(%peer, error = %e, "failed to connect"),
            }
        }
        Ok(())
    }

    /// Process network events until the channel closes.
    pub async fn run(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<NetworkEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        info!("network event channel closed");
    }

    fn handle_event(&self, event: NetworkEvent) {
        match event {
            NetworkEvent::PeerConnected { peer, inbound } => {
                debug!(%peer, inbound, peers = self.network.peer_count(), "peer connected");
            }
            NetworkEvent::Message { peer, message } => match self.respond(&message) {
                Ok(replies) => {
                    for reply in replies {
                        if let Err(e) = self.network.send(peer, reply) {
                            debug!(%peer, error = %e, "reply not sent");
                        }
                    }
                }
                Err(e) => {
                    error!(%peer, command = message.command(), error = %e, "failed to handle message");
                }
            },
            NetworkEvent::PeerDisconnected { peer, reason } => match reason {
                Some(e) => info!(%peer, error = %e, "peer dropped"),
                None => debug!(%peer, "peer left"),
            },
        }
    }

    /// Replies owed for one inbound message.
    pub fn respond(&self, message: &Message) -> Result<Vec<Message>, StrandError> {
        let store = self.store.read();
        let replies = match message {
            Message::GetBlocks(locator) => {
                let blocks = self.following_blocks(&store, locator, MAX_INV_PER_GETBLOCKS)?;
                if blocks.is_empty() {
                    Vec::new()
                } else {
                    let items = blocks
                        .iter()
                        .map(|b| InvItem::block(b.hash(self.crypto.as_ref())))
                        .collect();
                    vec![Message::Inv(items)]
                }
            }
            Message::GetHeaders(locator) => {
                let blocks = self.following_blocks(&store, locator, MAX_HEADERS_PER_GETHEADERS)?;
                vec![Message::Headers(blocks.into_iter().map(|b| b.header).collect())]
            }
            Message::GetData(items) => {
                let mut replies = Vec::new();
                for item in items {
                    match item.kind {
                        MSG_BLOCK => {
                            if let Some(block) = store.get_block_by_hash(&item.hash)? {
                                let txs = store.get_transactions_by_hashes(&block.txs)?;
                                replies.push(Message::Block(BlockMessage {
                                    header: block.header,
                                    txs,
                                    size: block.size as usize,
                                }));
                            }
                        }
                        MSG_TX => {
                            if let Some(tx) = store.get_transaction_by_hash(&item.hash)? {
                                replies.push(Message::Tx(tx));
                            }
                        }
                        kind => debug!(kind, hash = %item.hash, "unsupported getdata type"),
                    }
                }
                replies
            }
            Message::Inv(items) => {
                let mut wanted = Vec::new();
                for item in items {
                    let known = match item.kind {
                        MSG_BLOCK => store.knows_block(&item.hash)?,
                        MSG_TX => store.knows_transaction(&item.hash)?,
                        _ => true,
                    };
                    if !known {
                        wanted.push(*item);
                    }
                }
                if wanted.is_empty() {
                    Vec::new()
                } else {
                    vec![Message::GetData(wanted)]
                }
            }
            Message::Block(block) => {
                debug!(
                    hash = %block.header.hash(self.crypto.as_ref()),
                    txs = block.txs.len(),
                    "block received"
                );
                Vec::new()
            }
            Message::Tx(tx) => {
                debug!(hash = %tx.hash(self.crypto.as_ref()), "transaction received");
                Vec::new()
            }
            _ => Vec::new(),
        };
        Ok(replies)
    }

    /// Active blocks after the best locator match, up to and including `stop`.
    ///
    /// Without a match the walk starts at height 0.
    fn following_blocks(
        &self,
        store: &ChainStore,
        locator: &BlockLocator,
        max: usize,
    ) -> Result<Vec<Block>, StrandError> {
        let start = match store.get_block_by_locator(&locator.starts)? {
            Some(block) => i64::from(block.height) + 1,
            None => 0,
        };
        let limit = i64::try_from(max).unwrap_or(i64::MAX);
        let mut blocks = store.get_block_slice(start, Some(limit))?;
        if !locator.stop.is_zero() {
            let crypto = self.crypto.as_ref();
            if let Some(pos) = blocks.iter().position(|b| b.hash(crypto) == locator.stop) {
                blocks.truncate(pos + 1);
            }
        }
        Ok(blocks)
    }

    /// Close every peer and release the store cleanly.
    pub fn shutdown(&self) -> Result<(), StrandError> {
        self.network.shutdown();
        self.store.write().disconnect()
    }
}
