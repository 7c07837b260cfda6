//! # Message Bodies
//!
//! Message bodies are JSON documents, compressed with the configured algorithm.
//! The preamble flag records whether a given body was compressed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TransportConfig;
use crate::core::codec::Frame;
use crate::error::{ProtocolError, Result};
use crate::utils::compression::{maybe_compress, maybe_decompress, CompressionKind};

/// Envelope sent by the RPC layer to a polling client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub response_queue: Option<String>,
    pub response_id: Option<u64>,
    pub request: Value,
}

impl RpcRequest {
    pub fn new(request: Value) -> Self {
        Self {
            response_queue: None,
            response_id: None,
            request,
        }
    }
}

/// A named command invocation with keyword arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandCall {
    pub command: String,
    #[serde(default = "empty_args")]
    pub args: Value,
}

fn empty_args() -> Value {
    Value::Object(serde_json::Map::new())
}

impl CommandCall {
    pub fn new(command: impl Into<String>, args: Value) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// Reply to a [`CommandCall`]: exactly one of `result` or `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandReply {
    pub fn ok(result: Value) -> Self {
        Self {
            result: Some(result),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(message.into()),
        }
    }

    /// The result value, or `CommandFailed` carrying the remote error message.
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Some(message) => Err(ProtocolError::CommandFailed(message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Converts between JSON values and frame bodies.
#[derive(Debug, Clone, Copy)]
pub struct MessageFormat {
    pub compression: CompressionKind,
    pub compression_level: i32,
    pub compression_threshold_bytes: usize,
    pub max_body_size: usize,
}

impl Default for MessageFormat {
    fn default() -> Self {
        Self::from_config(&TransportConfig::default())
    }
}

impl MessageFormat {
    pub fn from_config(config: &TransportConfig) -> Self {
        Self {
            compression: config.compression,
            compression_level: config.compression_level,
            compression_threshold_bytes: config.compression_threshold_bytes,
            max_body_size: config.max_body_size,
        }
    }

    /// Serialize `value` to JSON and compress it when it meets the threshold.
    /// Returns the body bytes and whether they are compressed.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<(Vec<u8>, bool)> {
        let data = serde_json::to_vec(value)
            .map_err(|e| ProtocolError::SerializeError(e.to_string()))?;

        let (body, is_compressed) = maybe_compress(
            &data,
            &self.compression,
            self.compression_level,
            self.compression_threshold_bytes,
        )?;

        if body.len() > self.max_body_size {
            return Err(ProtocolError::OversizedBody(body.len()));
        }
        Ok((body, is_compressed))
    }

    pub fn decode<T: DeserializeOwned>(&self, body: &[u8], is_compressed: bool) -> Result<T> {
        let data = maybe_decompress(body, &self.compression, is_compressed, self.max_body_size)?;
        serde_json::from_slice(&data).map_err(|e| ProtocolError::DeserializeError(e.to_string()))
    }

    pub fn encode_frame<T: Serialize + ?Sized>(&self, msg_id: u32, value: &T) -> Result<Frame> {
        let (body, is_compressed) = self.encode(value)?;
        Ok(Frame::new(msg_id, body, is_compressed))
    }

    pub fn decode_frame<T: DeserializeOwned>(&self, frame: &Frame) -> Result<T> {
        self.decode(&frame.body, frame.is_compressed)
    }
}
