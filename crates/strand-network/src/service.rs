//! TCP driver for peer sessions.
//!
//! [`NetworkNode`] owns the listener and one tokio task per connection. Each
//! connection task runs a [`PeerSession`] over the socket's read half and
//! forwards frames to a writer task through an unbounded mpsc channel.
//! Decoded messages surface to the node as [`NetworkEvent`]s; replies go back
//! through [`NetworkNode::send`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use strand_core::error::NetworkError;

use crate::message::Message;
use crate::session::{PeerSession, SessionContext, Transport};

const READ_CHUNK: usize = 64 * 1024;

/// Events emitted by the network layer for the node to act on.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// Transport established; the handshake has not finished.
    PeerConnected { peer: SocketAddr, inbound: bool },
    /// A decoded message from a peer. Handshake replies have already been sent.
    Message { peer: SocketAddr, message: Message },
    /// Session ended; `reason` is set when it ended on an error.
    PeerDisconnected { peer: SocketAddr, reason: Option<NetworkError> },
}

/// Commands from [`NetworkNode`] to one connection task.
#[derive(Debug)]
enum PeerCommand {
    Send(Message),
    Disconnect,
}

/// Frames queued for a connection's writer task.
#[derive(Debug)]
enum Outgoing {
    Frame(Vec<u8>),
    Close,
}

/// [`Transport`] that hands frames to a writer task.
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Transport for ChannelTransport {
    fn send(&mut self, frame: Vec<u8>) -> Result<(), NetworkError> {
        self.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| NetworkError::Closed)
    }

    fn close(&mut self) {
        let _ = self.tx.send(Outgoing::Close);
    }
}

type PeerMap = Arc<Mutex<HashMap<SocketAddr, mpsc::UnboundedSender<PeerCommand>>>>;

/// Handle to the set of live peer connections.
#[derive(Clone)]
pub struct NetworkNode {
    ctx: Arc<SessionContext>,
    peers: PeerMap,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for NetworkNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkNode")
            .field("network", &self.ctx.config.network)
            .field("peer_count", &self.peer_count())
            .field("running", &self.is_running())
            .finish()
    }
}

impl NetworkNode {
    /// Create a node and the receiver for its events.
    pub fn new(ctx: Arc<SessionContext>) -> (Self, mpsc::UnboundedReceiver<NetworkEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let node = Self {
            ctx,
            peers: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            running: Arc::new(AtomicBool::new(true)),
        };
        (node, event_rx)
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.lock().keys().copied().collect()
    }

    /// Bind the configured listen socket and accept peers in the background.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// the configured port is 0.
    pub async fn listen(&self) -> Result<SocketAddr, NetworkError> {
        let socket = self.ctx.config.listen_socket();
        let listener = TcpListener::bind(&socket)
            .await
            .map_err(|e| NetworkError::Io(format!("bind {socket}: {e}")))?;
        let local = listener
            .local_addr()
            .map_err(|e| NetworkError::Io(e.to_string()))?;
        info!(address = %local, "listening for peers");

        let node = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, addr)) => node.spawn_peer(stream, addr, true),
                        Err(e) => warn!(error = %e, "accept failed"),
                    },
                    _ = shutdown_rx.changed() => {
                        info!("listener stopped");
                        break;
                    }
                }
            }
        });
        Ok(local)
    }

    /// Dial a peer and start its session.
    pub async fn connect(&self, addr: &str) -> Result<SocketAddr, NetworkError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| NetworkError::Io(format!("connect {addr}: {e}")))?;
        let peer = stream
            .peer_addr()
            .map_err(|e| NetworkError::Io(e.to_string()))?;
        self.spawn_peer(stream, peer, false);
        Ok(peer)
    }

    /// Queue a message for one peer.
    pub fn send(&self, peer: SocketAddr, message: Message) -> Result<(), NetworkError> {
        let peers = self.peers.lock();
        let tx = peers.get(&peer).ok_or(NetworkError::Closed)?;
        tx.send(PeerCommand::Send(message))
            .map_err(|_| NetworkError::Closed)
    }

    /// Queue a message for every connected peer.
    pub fn broadcast(&self, message: &Message) {
        for tx in self.peers.lock().values() {
            let _ = tx.send(PeerCommand::Send(message.clone()));
        }
    }

    pub fn disconnect(&self, peer: SocketAddr) {
        if let Some(tx) = self.peers.lock().get(&peer) {
            let _ = tx.send(PeerCommand::Disconnect);
        }
    }

    /// Stop accepting and close every session.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(true);
        for tx in self.peers.lock().values() {
            let _ = tx.send(PeerCommand::Disconnect);
        }
    }

    fn spawn_peer(&self, stream: TcpStream, peer: SocketAddr, inbound: bool) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        self.peers.lock().insert(peer, cmd_tx);
        let node = self.clone();
        tokio::spawn(async move {
            let reason = node.run_peer(stream, peer, inbound, cmd_rx).await;
            node.peers.lock().remove(&peer);
            match &reason {
                Some(e) => warn!(%peer, error = %e, "peer disconnected"),
                None => info!(%peer, "peer disconnected"),
            }
            let _ = node
                .event_tx
                .send(NetworkEvent::PeerDisconnected { peer, reason });
        });
    }

    async fn run_peer(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        inbound: bool,
        mut cmd_rx: mpsc::UnboundedReceiver<PeerCommand>,
    ) -> Option<NetworkError> {
        let (mut reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, out_rx, peer));

        let transport = ChannelTransport { tx: out_tx };
        let mut session = PeerSession::new(self.ctx.clone(), peer.to_string(), inbound, transport);
        let _ = self
            .event_tx
            .send(NetworkEvent::PeerConnected { peer, inbound });
        session.on_connect();

        let mut buf = vec![0u8; READ_CHUNK];
        let reason = loop {
            tokio::select! {
                read = reader.read(&mut buf) => match read {
                    Ok(0) => break None,
                    Ok(n) => match session.receive(&buf[..n]) {
                        Ok(messages) => {
                            for message in messages {
                                let _ = self.event_tx.send(NetworkEvent::Message { peer, message });
                            }
                        }
                        Err(e) => break Some(e),
                    },
                    Err(e) => break Some(NetworkError::Io(e.to_string())),
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(PeerCommand::Send(message)) => session.send_message(&message),
                    Some(PeerCommand::Disconnect) | None => break None,
                },
            }
        };
        session.close();
        reason
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    peer: SocketAddr,
) {
    while let Some(out) = rx.recv().await {
        match out {
            Outgoing::Frame(frame) => {
                if let Err(e) = writer.write_all(&frame).await {
                    debug!(%peer, error = %e, "write failed");
                    break;
                }
            }
            Outgoing::Close => break,
        }
    }
    let _ = writer.shutdown().await;
}
