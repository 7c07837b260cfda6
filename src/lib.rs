//! # longerpull
//!
//! Long-pull style RPC protocol: a fixed 10-byte message preamble, stream
//! framing over TCP, JSON message bodies with optional compression, and a
//! command-dispatching server.
//!
//! ## Preamble
//! ```rust
//! use longerpull::{decode_preamble, encode_preamble};
//!
//! let bytes = encode_preamble(1, b"", false)?;
//! assert_eq!(bytes, [63, 0, 0, 0, 1, 0, 0, 0, 1, 0]);
//!
//! let preamble = decode_preamble(&bytes)?;
//! assert_eq!((preamble.size, preamble.msg_id, preamble.is_compressed), (1, 1, false));
//! # Ok::<(), longerpull::ProtocolError>(())
//! ```
//!
//! ## Modules
//! - [`core`]: preamble codec and Tokio stream codec
//! - [`protocol`]: message bodies, command dispatcher, RPC helpers
//! - [`transport`]: connections and server
//! - [`utils`]: compression, logging, metrics
//! - [`config`]: configuration and wire constants
//! - [`error`]: error type

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use crate::core::codec::{Frame, MessageCodec};
pub use crate::core::preamble::{decode_preamble, encode_preamble, start_of_frame, Preamble};
pub use config::LongerpullConfig;
pub use error::{ProtocolError, Result};
