use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::config::LongerpullConfig;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::message::{CommandCall, CommandReply};
use crate::transport::connection::Connection;
use crate::utils::metrics::{Metrics, Timer};

/// longerpull TCP server: accepts connections and answers command calls
/// through a [`Dispatcher`].
pub struct Server {
    config: LongerpullConfig,
    dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
}

impl Server {
    pub fn new(config: LongerpullConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Bind the configured address and serve until `shutdown_rx` fires.
    pub async fn run(self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        self.config.validate_strict()?;
        let listener = TcpListener::bind(&self.config.server.address).await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Serve on an already bound listener until `shutdown_rx` fires.
    #[instrument(skip_all)]
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        info!(address = %listener.local_addr()?, "Listening");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");
                    wait_for_connections(&self.metrics, self.config.server.shutdown_timeout).await;
                    self.metrics.log_metrics();
                    return Ok(());
                }

                accept_result = listener.accept() => match accept_result {
                    Ok((stream, addr)) => self.spawn_connection(stream, addr),
                    Err(e) => error!(error = %e, "Error accepting connection"),
                },
            }
        }
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let max_connections = self.config.server.max_connections as u64;
        if self.metrics.active_connections() >= max_connections {
            warn!(peer = %addr, max_connections, "Connection limit reached, rejecting");
            self.metrics.connection_rejected();
            drop(stream);
            return;
        }

        self.metrics.connection_established();
        let conn = accept_stream(stream, addr.to_string(), &self.config, self.metrics.clone());
        info!(conn = %conn, "New connection established");

        let dispatcher = self.dispatcher.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let name = conn.to_string();
            if let Err(e) = handle_connection(conn, &dispatcher, &metrics).await {
                warn!(conn = %name, error = %e, "Connection ended with error");
            }
            metrics.connection_closed();
            info!(conn = %name, "Connection closed");
        });
    }
}

fn accept_stream(
    stream: TcpStream,
    peer: String,
    config: &LongerpullConfig,
    metrics: Arc<Metrics>,
) -> Connection<TcpStream> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "Failed to set TCP_NODELAY");
    }
    Connection::accept(stream, peer, config, metrics)
}

async fn wait_for_connections(metrics: &Metrics, timeout: Duration) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        let connections = metrics.active_connections();
        if connections == 0 {
            info!("All connections closed, shutting down");
            return;
        }

        tokio::select! {
            _ = &mut deadline => {
                warn!(connections, "Shutdown timeout reached, forcing exit");
                return;
            }
            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                debug!(connections, "Waiting for connections to close");
            }
        }
    }
}

/// Serve command calls on one connection until the peer leaves.
///
/// Bodies that are not valid command calls and failing commands get an error
/// reply; framing errors end the connection.
pub async fn handle_connection<T>(
    mut conn: Connection<T>,
    dispatcher: &Dispatcher,
    metrics: &Metrics,
) -> Result<()>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    loop {
        let frame = match conn.recv_frame().await {
            Ok(frame) => frame,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        debug!(
            conn = %conn,
            msg_id = frame.msg_id,
            size = frame.body.len(),
            compressed = frame.is_compressed,
            "Parsing command"
        );

        let timer = Timer::start("dispatch_command");
        let reply = match conn
            .format()
            .decode_frame::<CommandCall>(&frame)
            .and_then(|call| dispatcher.dispatch(&call))
        {
            Ok(result) => CommandReply::ok(result),
            Err(e) => {
                metrics.command_error();
                debug!(conn = %conn, msg_id = frame.msg_id, error = %e, "Command failed");
                CommandReply::err(e.to_string())
            }
        };
        drop(timer);

        conn.send_message(frame.msg_id, &reply).await?;
    }
}
