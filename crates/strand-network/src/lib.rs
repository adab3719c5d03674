//! # strand-network
//! Peer wire protocol for the Strand node.
//!
//! - [`frame`]: stream framing with magic resync and checksums.
//! - [`message`]: typed messages and their payload encodings.
//! - [`session`]: per-peer handshake state machine over a [`session::Transport`].
//! - [`service`]: tokio TCP driver.

pub mod config;
pub mod frame;
pub mod message;
pub mod service;
pub mod session;

pub use config::NetworkConfig;
pub use message::{AddrEntry, AlertMessage, BlockLocator, BlockMessage, InvItem, Message, VersionMessage};
pub use service::{NetworkEvent, NetworkNode};
pub use session::{ChainHead, PeerSession, SessionContext, SessionState, Transport};
