use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::{MAX_BODY_SIZE, PREAMBLE_SIZE, PROTOCOL_VERSION};
use crate::core::preamble::Preamble;
use crate::error::constants::{ERR_INDICATOR_MISMATCH, ERR_ZERO_SIZE};
use crate::error::{ProtocolError, Result};

/// One message as carried on the stream, with the indicator byte stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_id: u32,
    pub is_compressed: bool,
    pub body: Bytes,
}

impl Frame {
    pub fn new(msg_id: u32, body: impl Into<Bytes>, is_compressed: bool) -> Self {
        Self {
            msg_id,
            is_compressed,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Version,
    Preamble,
    Body(Preamble),
}

/// Stream codec for longerpull frames.
///
/// Wire layout per message: `[preamble(10)] [indicator(1)] [body(size - 1)]`.
/// A server-side codec additionally expects the single version byte a client
/// sends before its first message.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    state: DecodeState,
    max_body_size: usize,
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageCodec {
    /// Codec for the client side: frames start immediately.
    pub fn new() -> Self {
        Self {
            state: DecodeState::Preamble,
            max_body_size: MAX_BODY_SIZE,
        }
    }

    /// Codec for the server side: the version byte comes first.
    pub fn server() -> Self {
        Self {
            state: DecodeState::Version,
            ..Self::new()
        }
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.max_body_size = max_body_size;
        self
    }

    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

impl Decoder for MessageCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            match self.state {
                DecodeState::Version => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let version = src.get_u8();
                    if version != PROTOCOL_VERSION {
                        return Err(ProtocolError::UnsupportedVersion(version));
                    }
                    self.state = DecodeState::Preamble;
                }
                DecodeState::Preamble => {
                    if src.len() < PREAMBLE_SIZE {
                        src.reserve(PREAMBLE_SIZE - src.len());
                        return Ok(None);
                    }

                    let preamble = Preamble::from_bytes(&src[..PREAMBLE_SIZE])?;
                    if preamble.size == 0 {
                        return Err(ProtocolError::InvalidFrame(ERR_ZERO_SIZE));
                    }
                    if preamble.body_len() > self.max_body_size {
                        return Err(ProtocolError::OversizedBody(preamble.body_len()));
                    }

                    src.advance(PREAMBLE_SIZE);
                    self.state = DecodeState::Body(preamble);
                }
                DecodeState::Body(preamble) => {
                    let needed = preamble.size as usize;
                    if src.len() < needed {
                        src.reserve(needed - src.len());
                        return Ok(None);
                    }

                    // split_to hands off the frame without copying
                    let mut block = src.split_to(needed);
                    let indicator = block.get_u8();
                    if (indicator != 0) != preamble.is_compressed {
                        return Err(ProtocolError::InvalidFrame(ERR_INDICATOR_MISMATCH));
                    }

                    self.state = DecodeState::Preamble;
                    return Ok(Some(Frame {
                        msg_id: preamble.msg_id,
                        is_compressed: preamble.is_compressed,
                        body: block.freeze(),
                    }));
                }
            }
        }
    }
}

impl Encoder<Frame> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        if item.body.len() > self.max_body_size {
            return Err(ProtocolError::OversizedBody(item.body.len()));
        }

        let preamble = Preamble::for_body_len(item.msg_id, item.body.len(), item.is_compressed)?;

        dst.reserve(PREAMBLE_SIZE + preamble.size as usize);
        dst.put_slice(&preamble.to_bytes());
        dst.put_u8(u8::from(item.is_compressed));
        dst.put_slice(&item.body);
        Ok(())
    }
}
