//! # Protocol Layer
//!
//! Message bodies, the command registry and the RPC call helper.
//!
//! ## Components
//! - **Message**: JSON bodies with optional compression, RPC and command envelopes
//! - **Dispatcher**: named command registry used by the server
//! - **Rpc**: push an RPC request to a polling client

pub mod dispatcher;
pub mod message;
pub mod rpc;
