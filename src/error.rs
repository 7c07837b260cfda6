//! # Error Types
//!
//! Error handling for the longerpull protocol.
//!
//! The preamble codec only ever produces [`ProtocolError::ShortBuffer`],
//! [`ProtocolError::StartOfFrame`] and [`ProtocolError::OversizedBody`]. The remaining
//! variants belong to the stream codec, message encoding and transport layers.
//!
//! ## Example Usage
//! ```rust
//! use longerpull::core::preamble::decode_preamble;
//! use longerpull::error::ProtocolError;
//!
//! match decode_preamble(&[0u8; 4]) {
//!     Err(ProtocolError::ShortBuffer(len)) => assert_eq!(len, 4),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher lock errors
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Stream framing errors
    pub const ERR_ZERO_SIZE: &str = "Preamble size must include the indicator byte";
    pub const ERR_INDICATOR_MISMATCH: &str = "Body indicator disagrees with preamble flag";
}

// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("short buffer: {0} bytes")]
    ShortBuffer(usize),

    #[error("start-of-frame error: expected {expected:#04x}, found {found:#04x}")]
    StartOfFrame { expected: u8, found: u8 },

    #[error("Body too large: {0} bytes")]
    OversizedBody(usize),

    #[error("Invalid frame: {0}")]
    InvalidFrame(&'static str),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
