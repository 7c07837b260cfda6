//! Run commands on longerpull peers.

use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, instrument, warn};

use crate::error::{ProtocolError, Result};
use crate::protocol::message::{CommandCall, CommandReply, RpcRequest};
use crate::transport::connection::Connection;

/// Push `request` to the client polling as `poll_id`.
#[instrument(skip(conn, request), fields(conn = %conn))]
pub async fn call<T>(conn: &mut Connection<T>, poll_id: u32, request: Value) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    conn.send_message(poll_id, &RpcRequest::new(request)).await
}

/// Invoke a named command and wait for the reply with the same `msg_id`.
///
/// Waits up to the connection's `response_timeout` (from [`crate::config::ClientConfig`]).
pub async fn invoke<T>(
    conn: &mut Connection<T>,
    msg_id: u32,
    command: &str,
    args: Value,
) -> Result<Value>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let timeout = conn.response_timeout();
    invoke_with_timeout(conn, msg_id, command, args, timeout).await
}

/// Like [`invoke`] with an explicit reply timeout.
///
/// Replies for other ids that arrive first are discarded.
#[instrument(skip(conn, args), fields(conn = %conn))]
pub async fn invoke_with_timeout<T>(
    conn: &mut Connection<T>,
    msg_id: u32,
    command: &str,
    args: Value,
    timeout: Duration,
) -> Result<Value>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let call = CommandCall::new(command, args);
    conn.send_message(msg_id, &call).await?;

    let reply = tokio::time::timeout(timeout, async {
        loop {
            let (reply_id, reply) = conn.recv_message::<CommandReply>().await?;
            if reply_id == msg_id {
                return Ok::<_, ProtocolError>(reply);
            }
            warn!(expected = msg_id, got = reply_id, "Discarding reply for another message");
        }
    })
    .await
    .map_err(|_| ProtocolError::Timeout)??;

    debug!(msg_id, "Command reply received");
    reply.into_result()
}
