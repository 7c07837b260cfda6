//! # Core Protocol Components
//!
//! Preamble encoding and stream framing.
//!
//! ## Components
//! - **Preamble**: fixed 10-byte header with start-of-frame check
//! - **Codec**: Tokio codec that frames preamble, indicator byte and body
//!
//! ## Wire Format
//! ```text
//! [Version(1), once per connection]
//! [SOF(1)] [Size(4)] [MsgId(4)] [IsCompressed(1)] [Indicator(1)] [Body(Size - 1)]
//! ```

pub mod codec;
pub mod preamble;

pub use codec::{Frame, MessageCodec};
pub use preamble::{decode_preamble, encode_preamble, start_of_frame, Preamble};
