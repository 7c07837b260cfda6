use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::{debug, instrument, warn};

use crate::config::{LongerpullConfig, PROTOCOL_VERSION};
use crate::core::codec::{Frame, MessageCodec};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::MessageFormat;
use crate::utils::metrics::Metrics;

static NEXT_IDENT: AtomicU64 = AtomicU64::new(0);

type FrameSink<T> = SplitSink<Framed<T, MessageCodec>, Frame>;

/// A framed longerpull connection.
///
/// Incoming frames are read by a background task into a bounded queue of
/// `pause_threshold` entries. While the queue is full the task stops reading,
/// so the peer sees TCP backpressure until the application calls
/// [`Connection::recv_frame`] again.
pub struct Connection<T = TcpStream> {
    ident: u64,
    peer: String,
    sink: FrameSink<T>,
    inbox: mpsc::Receiver<Result<Frame>>,
    reader: JoinHandle<()>,
    format: MessageFormat,
    response_timeout: Duration,
    metrics: Arc<Metrics>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap an accepted stream. The peer's version byte is checked by the codec.
    pub fn accept(
        io: T,
        peer: impl Into<String>,
        config: &LongerpullConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let codec = MessageCodec::server().with_max_body_size(config.transport.max_body_size);
        Self::start(io, codec, peer.into(), config, metrics)
    }

    /// Send the version byte on `io` and wrap it as the client side.
    pub async fn handshake(
        mut io: T,
        peer: impl Into<String>,
        config: &LongerpullConfig,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        io.write_all(&[PROTOCOL_VERSION]).await?;
        io.flush().await?;
        let codec = MessageCodec::new().with_max_body_size(config.transport.max_body_size);
        Ok(Self::start(io, codec, peer.into(), config, metrics))
    }

    fn start(
        io: T,
        codec: MessageCodec,
        peer: String,
        config: &LongerpullConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let ident = NEXT_IDENT.fetch_add(1, Ordering::Relaxed);
        debug!(peer = %peer, ident, max_body_size = codec.max_body_size(), "Starting connection");
        let (sink, stream) = Framed::new(io, codec).split();
        let (tx, inbox) = mpsc::channel(config.server.pause_threshold.max(1));
        let reader = tokio::spawn(read_frames(
            stream,
            tx,
            metrics.clone(),
            format!("<Connection [{peer}] ident:{ident}>"),
        ));

        Self {
            ident,
            peer,
            sink,
            inbox,
            reader,
            format: MessageFormat::from_config(&config.transport),
            response_timeout: config.client.response_timeout,
            metrics,
        }
    }

    pub fn ident(&self) -> u64 {
        self.ident
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn format(&self) -> &MessageFormat {
        &self.format
    }

    /// How long [`crate::protocol::rpc::invoke`] waits for a reply.
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub async fn send_frame(&mut self, frame: Frame) -> Result<()> {
        let byte_count = frame.body.len() as u64;
        self.sink.send(frame).await?;
        self.metrics.message_sent(byte_count);
        Ok(())
    }

    /// Encode `msg` with the connection's message format and send it as `msg_id`.
    pub async fn send_message<M>(&mut self, msg_id: u32, msg: &M) -> Result<()>
    where
        M: Serialize + ?Sized,
    {
        let frame = self.format.encode_frame(msg_id, msg)?;
        self.send_frame(frame).await
    }

    /// Next frame from the peer. Yields `ConnectionClosed` once the peer has gone.
    pub async fn recv_frame(&mut self) -> Result<Frame> {
        match self.inbox.try_recv() {
            Ok(item) => {
                self.metrics.recv_dequeued();
                item
            }
            Err(TryRecvError::Empty) => {
                self.metrics.recv_waited();
                self.inbox
                    .recv()
                    .await
                    .unwrap_or(Err(ProtocolError::ConnectionClosed))
            }
            Err(TryRecvError::Disconnected) => Err(ProtocolError::ConnectionClosed),
        }
    }

    pub async fn recv_message<M: DeserializeOwned>(&mut self) -> Result<(u32, M)> {
        let frame = self.recv_frame().await?;
        let msg = self.format.decode_frame(&frame)?;
        Ok((frame.msg_id, msg))
    }

    #[instrument(skip(self), fields(conn = %self))]
    pub async fn close(mut self) -> Result<()> {
        self.reader.abort();
        self.sink.close().await
    }
}

impl Connection<TcpStream> {
    /// Connect to a longerpull server and perform the version handshake.
    #[instrument(skip(config, metrics), fields(address = %config.client.address))]
    pub async fn connect(config: &LongerpullConfig, metrics: Arc<Metrics>) -> Result<Self> {
        let stream = tokio::time::timeout(
            config.client.connection_timeout,
            TcpStream::connect(&config.client.address),
        )
        .await
        .map_err(|_| ProtocolError::Timeout)??;
        stream.set_nodelay(true)?;

        let peer = stream.peer_addr()?.to_string();
        Self::handshake(stream, peer, config, metrics).await
    }
}

impl<T> fmt::Display for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Connection [{}] ident:{}>", self.peer, self.ident)
    }
}

impl<T> Drop for Connection<T> {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_frames<T>(
    mut stream: SplitStream<Framed<T, MessageCodec>>,
    tx: mpsc::Sender<Result<Frame>>,
    metrics: Arc<Metrics>,
    name: String,
) where
    T: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        // Hold a queue slot before reading so nothing is pulled off the socket while full
        let permit = match tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                debug!(conn = %name, "Pausing");
                metrics.reader_paused();
                match tx.reserve().await {
                    Ok(permit) => {
                        debug!(conn = %name, "Resuming");
                        permit
                    }
                    Err(_) => return,
                }
            }
            Err(TrySendError::Closed(())) => return,
        };

        let Some(item) = stream.next().await else {
            break;
        };

        let failed = item.is_err();
        match &item {
            Ok(frame) => metrics.message_received(frame.body.len() as u64),
            Err(e) => {
                metrics.frame_error();
                warn!(conn = %name, error = %e, "Dropping connection after read error");
            }
        }

        permit.send(item);
        metrics.recv_enqueued();

        if failed {
            return;
        }
    }

    debug!(conn = %name, "Peer closed connection");
    let _ = tx.send(Err(ProtocolError::ConnectionClosed)).await;
}
