//! # Message Preamble
//!
//! Fixed 10-byte header that precedes every longerpull message body.
//!
//! ## Wire Format
//! ```text
//! [SOF(1)] [Size(4, BE)] [MsgId(4, BE)] [IsCompressed(1)]
//! ```
//!
//! `size` counts the body plus the one-byte compression indicator that prefixes it,
//! so an empty body has `size == 1`. The start-of-frame byte is derived from
//! `size + msg_id` and is the only integrity check; it catches misaligned reads,
//! not bit errors in general.

use crate::config::{PREAMBLE_SIZE, SOF_MAGIC};
use crate::error::{ProtocolError, Result};

/// Start-of-frame byte for `value`. Only the low 8 bits of `value` contribute.
#[inline]
pub fn start_of_frame(value: u32) -> u8 {
    SOF_MAGIC ^ (value as u8 ^ 0xFF)
}

/// Decoded preamble fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preamble {
    /// Body length plus the indicator byte
    pub size: u32,
    pub msg_id: u32,
    pub is_compressed: bool,
}

impl Preamble {
    /// Build the preamble for a body of `body_len` bytes.
    ///
    /// # Errors
    /// `ProtocolError::OversizedBody` when `body_len + 1` does not fit in 32 bits.
    pub fn for_body_len(msg_id: u32, body_len: usize, is_compressed: bool) -> Result<Self> {
        let size = body_len
            .checked_add(1)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(ProtocolError::OversizedBody(body_len))?;

        Ok(Self {
            size,
            msg_id,
            is_compressed,
        })
    }

    /// Length of the body that follows the indicator byte
    #[inline]
    pub fn body_len(&self) -> usize {
        self.size.saturating_sub(1) as usize
    }

    #[inline]
    pub fn sof(&self) -> u8 {
        start_of_frame(self.size.wrapping_add(self.msg_id))
    }

    pub fn to_bytes(&self) -> [u8; PREAMBLE_SIZE] {
        let mut buf = [0u8; PREAMBLE_SIZE];
        buf[0] = self.sof();
        buf[1..5].copy_from_slice(&self.size.to_be_bytes());
        buf[5..9].copy_from_slice(&self.msg_id.to_be_bytes());
        buf[9] = u8::from(self.is_compressed);
        buf
    }

    /// Parse and verify the first `PREAMBLE_SIZE` bytes of `buf`; the rest is ignored.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < PREAMBLE_SIZE {
            return Err(ProtocolError::ShortBuffer(buf.len()));
        }

        let found = buf[0];
        let size = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        let msg_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]);

        let expected = start_of_frame(size.wrapping_add(msg_id));
        if expected != found {
            return Err(ProtocolError::StartOfFrame { expected, found });
        }

        Ok(Self {
            size,
            msg_id,
            is_compressed: buf[9] != 0,
        })
    }
}

/// Encode the preamble for `body`.
///
/// The body itself is not written; the caller sends the indicator byte and
/// body after these 10 bytes.
pub fn encode_preamble(
    msg_id: u32,
    body: &[u8],
    is_compressed: bool,
) -> Result<[u8; PREAMBLE_SIZE]> {
    Preamble::for_body_len(msg_id, body.len(), is_compressed).map(|p| p.to_bytes())
}

/// Decode and verify a preamble from the front of `buf`.
pub fn decode_preamble(buf: &[u8]) -> Result<Preamble> {
    Preamble::from_bytes(buf)
}
