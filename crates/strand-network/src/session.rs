//! Per-connection peer session: framing, version negotiation, and replies.
//!
//! The session owns no socket. Bytes come in through [`PeerSession::receive`]
//! and frames go out through a [`Transport`], so the same state machine runs
//! under the tokio driver in [`crate::service`] and in memory under tests.

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use strand_core::constants::{BIP0031_VERSION, CHECKSUM_VERSION};
use strand_core::crypto::CryptoProvider;
use strand_core::error::NetworkError;
use strand_core::types::{BlockHeader, Hash256, Transaction};

use crate::config::NetworkConfig;
use crate::frame::{FrameAssembler, encode_frame};
use crate::message::{BlockLocator, BlockMessage, InvItem, Message, VersionMessage};

/// Outbound byte sink for a session.
pub trait Transport: Send {
    /// Queue one complete frame for writing.
    fn send(&mut self, frame: Vec<u8>) -> Result<(), NetworkError>;
    /// Tear down the underlying connection.
    fn close(&mut self);
}

/// Source of the local best height advertised in `version`.
pub trait ChainHead: Send + Sync {
    fn best_height(&self) -> u32;
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, no `version` exchanged yet.
    Connected,
    /// At least one `version` has been sent or received.
    Handshaking,
    /// `verack` received.
    Active,
    Closed,
}

/// Everything sessions on one node share.
pub struct SessionContext {
    pub config: NetworkConfig,
    /// Identifies this node; a peer echoing it back is ourselves.
    pub nonce: [u8; 8],
    pub crypto: Arc<dyn CryptoProvider>,
    pub chain: Arc<dyn ChainHead>,
}

impl SessionContext {
    /// Build a context with a fresh random nonce.
    pub fn new(config: NetworkConfig, crypto: Arc<dyn CryptoProvider>, chain: Arc<dyn ChainHead>) -> Self {
        Self {
            config,
            nonce: rand::random(),
            crypto,
            chain,
        }
    }
}

pub struct PeerSession<T: Transport> {
    ctx: Arc<SessionContext>,
    peer: String,
    inbound: bool,
    transport: T,
    assembler: FrameAssembler,
    state: SessionState,
    send_version: u32,
    recv_version: u32,
    /// Receive version applied once the peer's `verack` arrives.
    pending_recv_version: Option<u32>,
    best_height: u32,
}

impl<T: Transport> PeerSession<T> {
    pub fn new(ctx: Arc<SessionContext>, peer: impl Into<String>, inbound: bool, transport: T) -> Self {
        let assembler = FrameAssembler::new(ctx.config.magic(), ctx.config.max_receive_buffer);
        let initial = ctx.config.initial_version;
        Self {
            ctx,
            peer: peer.into(),
            inbound,
            transport,
            assembler,
            state: SessionState::Connected,
            send_version: initial,
            recv_version: initial,
            pending_recv_version: None,
            best_height: 0,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_inbound(&self) -> bool {
        self.inbound
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True once the peer's `verack` has been received.
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn send_version_number(&self) -> u32 {
        self.send_version
    }

    pub fn recv_version(&self) -> u32 {
        self.recv_version
    }

    /// Start height the peer advertised.
    pub fn best_height(&self) -> u32 {
        self.best_height
    }

    pub fn buffered(&self) -> usize {
        self.assembler.buffered()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Transport is up. Outbound sessions open the handshake.
    pub fn on_connect(&mut self) {
        info!(peer = %self.peer, inbound = self.inbound, "peer connected");
        if !self.inbound {
            self.send_version();
        }
    }

    /// Feed received bytes and return every message they complete.
    ///
    /// Malformed or corrupt messages are logged and skipped. An `Err` means
    /// the session has been closed.
    pub fn receive(&mut self, data: &[u8]) -> Result<Vec<Message>, NetworkError> {
        if self.state == SessionState::Closed {
            return Err(NetworkError::Closed);
        }
        if let Err(e) = self.assembler.extend(data) {
            error!(peer = %self.peer, error = %e, "receive buffer overflow, disconnecting");
            self.close();
            return Err(e);
        }

        let mut messages = Vec::new();
        loop {
            let frame = match self.assembler.next_frame(self.recv_version, self.ctx.crypto.as_ref()) {
                None => break,
                Some(Ok(frame)) => frame,
                Some(Err(e)) if e.is_fatal() => {
                    error!(peer = %self.peer, error = %e, "fatal framing error, disconnecting");
                    self.close();
                    return Err(e);
                }
                Some(Err(e)) => {
                    warn!(peer = %self.peer, error = %e, "dropping message");
                    continue;
                }
            };

            let message = match Message::decode(&frame.command, &frame.payload, self.recv_version) {
                Ok(Message::Unknown { command }) => {
                    debug!(peer = %self.peer, %command, "ignoring unsupported command");
                    continue;
                }
                Ok(message) => message,
                Err(e) => {
                    error!(peer = %self.peer, error = %e, "failed to parse message");
                    continue;
                }
            };
            trace!(peer = %self.peer, command = message.command(), "received");

            if let Err(e) = self.handle(&message) {
                self.close();
                return Err(e);
            }
            messages.push(message);
        }
        Ok(messages)
    }

    fn handle(&mut self, message: &Message) -> Result<(), NetworkError> {
        match message {
            Message::Version(v) => self.handle_version(v),
            Message::Verack => {
                if let Some(version) = self.pending_recv_version.take() {
                    self.recv_version = version;
                }
                self.state = SessionState::Active;
                info!(peer = %self.peer, recv_version = self.recv_version, "handshake complete");
                Ok(())
            }
            Message::Ping(Some(nonce)) => {
                self.send_message(&Message::Pong(*nonce));
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn handle_version(&mut self, v: &VersionMessage) -> Result<(), NetworkError> {
        if v.nonce == self.ctx.nonce {
            warn!(peer = %self.peer, "connected to self, disconnecting");
            return Err(NetworkError::SelfConnection);
        }

        if self.inbound {
            self.send_version();
        }
        if v.version >= CHECKSUM_VERSION {
            self.send_verack();
        }

        let negotiated = v.version.min(self.ctx.config.protocol_version);
        self.send_version = negotiated;
        if v.version < CHECKSUM_VERSION {
            self.recv_version = negotiated;
        } else {
            self.pending_recv_version = Some(negotiated);
        }

        self.best_height = v.start_height;
        if self.state == SessionState::Connected {
            self.state = SessionState::Handshaking;
        }
        debug!(
            peer = %self.peer,
            version = v.version,
            start_height = v.start_height,
            agent = %String::from_utf8_lossy(&v.subversion),
            "peer version"
        );
        Ok(())
    }

    /// Frame and queue a message at the current send version.
    ///
    /// Failures are logged and otherwise ignored.
    pub fn send_message(&mut self, message: &Message) {
        if self.state == SessionState::Closed {
            debug!(peer = %self.peer, command = message.command(), "send on closed session");
            return;
        }
        let payload = message.encode_payload();
        let frame = match encode_frame(
            self.ctx.config.magic(),
            message.command(),
            &payload,
            self.send_version,
            self.ctx.crypto.as_ref(),
        ) {
            Ok(frame) => frame,
            Err(e) => {
                error!(peer = %self.peer, error = %e, "failed to frame message");
                return;
            }
        };
        trace!(peer = %self.peer, command = message.command(), len = payload.len(), "sending");
        if let Err(e) = self.transport.send(frame) {
            warn!(peer = %self.peer, command = message.command(), error = %e, "send failed");
        }
    }

    pub fn send_version(&mut self) {
        let version = VersionMessage {
            version: self.ctx.config.protocol_version,
            services: self.ctx.config.services,
            timestamp: chrono::Utc::now().timestamp().max(0) as u64,
            addr_me: [0; 26],
            addr_you: [0; 26],
            nonce: self.ctx.nonce,
            subversion: self.ctx.config.user_agent.as_bytes().to_vec(),
            start_height: self.ctx.chain.best_height(),
        };
        if self.state == SessionState::Connected {
            self.state = SessionState::Handshaking;
        }
        self.send_message(&Message::Version(version));
    }

    pub fn send_verack(&mut self) {
        self.send_message(&Message::Verack);
    }

    pub fn send_ping(&mut self) {
        let nonce = (self.send_version > BIP0031_VERSION).then(rand::random);
        self.send_message(&Message::Ping(nonce));
    }

    pub fn send_pong(&mut self, nonce: [u8; 8]) {
        self.send_message(&Message::Pong(nonce));
    }

    fn locator(&self, starts: Vec<Hash256>, stop: Option<Hash256>) -> BlockLocator {
        BlockLocator {
            version: self.ctx.config.protocol_version,
            starts,
            stop: stop.unwrap_or(Hash256::ZERO),
        }
    }

    /// Request block inventory after `starts`; a missing `stop` means no limit.
    pub fn send_get_blocks(&mut self, starts: Vec<Hash256>, stop: Option<Hash256>) {
        let locator = self.locator(starts, stop);
        self.send_message(&Message::GetBlocks(locator));
    }

    pub fn send_get_headers(&mut self, starts: Vec<Hash256>, stop: Option<Hash256>) {
        let locator = self.locator(starts, stop);
        self.send_message(&Message::GetHeaders(locator));
    }

    pub fn send_get_data(&mut self, items: Vec<InvItem>) {
        self.send_message(&Message::GetData(items));
    }

    pub fn send_get_addr(&mut self) {
        self.send_message(&Message::GetAddr);
    }

    pub fn send_inv(&mut self, items: Vec<InvItem>) {
        self.send_message(&Message::Inv(items));
    }

    pub fn send_headers(&mut self, headers: Vec<BlockHeader>) {
        self.send_message(&Message::Headers(headers));
    }

    pub fn send_tx(&mut self, tx: Transaction) {
        self.send_message(&Message::Tx(tx));
    }

    pub fn send_block(&mut self, header: BlockHeader, txs: Vec<Transaction>) {
        self.send_message(&Message::Block(BlockMessage { header, txs, size: 0 }));
    }

    /// Close the transport. Idempotent.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.state = SessionState::Closed;
            self.transport.close();
            info!(peer = %self.peer, "peer session closed");
        }
    }
}
