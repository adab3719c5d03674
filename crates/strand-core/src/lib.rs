//! # strand-core
//! Binary cursor, wire codec, and chain types shared by the Strand node.

pub mod codec;
pub mod constants;
pub mod crypto;
pub mod cursor;
pub mod error;
pub mod script;
pub mod types;

pub use crypto::{CryptoProvider, Sha256d};
pub use cursor::Cursor;
pub use error::{NetworkError, ParseError, StoreError, StrandError};
pub use types::{AddressHash, Block, BlockHeader, Hash256, OutPoint, Transaction, TxIn, TxOut};
