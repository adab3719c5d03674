//! Message framing over an unstructured byte stream.
//!
//! A frame is `magic (4) || command (12, NUL-padded) || length (u32 LE)`,
//! followed by a 4-byte checksum when the receive version is at least
//! [`CHECKSUM_VERSION`], then `length` payload bytes.

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, warn};

use strand_core::constants::{CHECKSUM_VERSION, COMMAND_LEN, HEADER_LEN, HEADER_LEN_NO_CHECKSUM};
use strand_core::crypto::CryptoProvider;
use strand_core::error::NetworkError;

/// One complete frame pulled off the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub payload: Bytes,
}

/// Header length for frames received at `version`.
pub fn header_len(version: u32) -> usize {
    if version >= CHECKSUM_VERSION {
        HEADER_LEN
    } else {
        HEADER_LEN_NO_CHECKSUM
    }
}

/// Build a frame for `command` at the given send version.
pub fn encode_frame(
    magic: [u8; 4],
    command: &str,
    payload: &[u8],
    send_version: u32,
    crypto: &dyn CryptoProvider,
) -> Result<Vec<u8>, NetworkError> {
    if command.len() > COMMAND_LEN {
        return Err(NetworkError::CommandTooLong(command.to_string()));
    }
    let len = u32::try_from(payload.len()).map_err(|_| {
        NetworkError::InvalidArgument(format!("{command} payload of {} bytes", payload.len()))
    })?;

    let mut out = Vec::with_capacity(header_len(send_version) + payload.len());
    out.extend_from_slice(&magic);
    let mut name = [0u8; COMMAND_LEN];
    name[..command.len()].copy_from_slice(command.as_bytes());
    out.extend_from_slice(&name);
    out.extend_from_slice(&len.to_le_bytes());
    if send_version >= CHECKSUM_VERSION {
        out.extend_from_slice(&crypto.checksum(payload));
    }
    out.extend_from_slice(payload);
    Ok(out)
}

/// Accumulates received bytes and yields complete frames.
#[derive(Debug)]
pub struct FrameAssembler {
    magic: [u8; 4],
    buf: BytesMut,
    max_len: usize,
}

impl FrameAssembler {
    pub fn new(magic: [u8; 4], max_len: usize) -> Self {
        Self {
            magic,
            buf: BytesMut::new(),
            max_len,
        }
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Append received bytes. Fails without buffering if the cap would be exceeded.
    pub fn extend(&mut self, data: &[u8]) -> Result<(), NetworkError> {
        let size = self.buf.len() + data.len();
        if size > self.max_len {
            return Err(NetworkError::BufferOverflow {
                size,
                max: self.max_len,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Drop everything before the next magic. Returns false if none is buffered.
    fn resync(&mut self) -> bool {
        let found = self.buf.windows(4).position(|w| w == self.magic);
        let skip = match found {
            Some(pos) => pos,
            // A magic may straddle the next read.
            None => self.buf.len().saturating_sub(3),
        };
        if skip > 0 {
            debug!(
                skipped = skip,
                garbage = %hex::encode(&self.buf[..skip.min(64)]),
                "discarding bytes before magic"
            );
            self.buf.advance(skip);
        }
        found.is_some()
    }

    /// Pull the next complete frame, if one is buffered.
    ///
    /// A checksum mismatch consumes the frame and yields an error; the stream
    /// stays usable. A declared length that can never fit the buffer cap is
    /// a fatal [`NetworkError::BufferOverflow`].
    pub fn next_frame(
        &mut self,
        recv_version: u32,
        crypto: &dyn CryptoProvider,
    ) -> Option<Result<Frame, NetworkError>> {
        let hlen = header_len(recv_version);
        if self.buf.len() < hlen || !self.resync() || self.buf.len() < hlen {
            return None;
        }

        let payload_len =
            u32::from_le_bytes([self.buf[16], self.buf[17], self.buf[18], self.buf[19]]) as usize;
        let total = hlen + payload_len;
        if total > self.max_len {
            return Some(Err(NetworkError::BufferOverflow {
                size: total,
                max: self.max_len,
            }));
        }
        if self.buf.len() < total {
            return None;
        }

        let frame = self.buf.split_to(total).freeze();
        let name = &frame[4..4 + COMMAND_LEN];
        let end = name.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
        let command = String::from_utf8_lossy(&name[..end]).into_owned();
        let payload = frame.slice(hlen..);

        if hlen == HEADER_LEN {
            let actual = crypto.checksum(&payload);
            if frame[20..24] != actual {
                warn!(%command, len = payload_len, "checksum mismatch, dropping message");
                return Some(Err(NetworkError::ChecksumMismatch {
                    command,
                    expected: hex::encode(&frame[20..24]),
                    actual: hex::encode(actual),
                }));
            }
        }

        Some(Ok(Frame { command, payload }))
    }
}
