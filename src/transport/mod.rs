//! # Transport Layer
//!
//! TCP connections and the longerpull server.
//!
//! ## Components
//! - **Connection**: framed stream with a bounded receive queue and version handshake
//! - **Server**: accept loop with connection limit and graceful shutdown

pub mod connection;
pub mod server;

pub use connection::Connection;
pub use server::Server;
