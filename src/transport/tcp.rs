//! TCP transport for the protocol core.
//!
//! The server side owns the accept loop and per-connection plumbing: raw
//! chunks read off the socket feed the session buffer, `process()` publishes
//! decoded packets onto the session's dispatch chain, and the outbound queue
//! drains to the socket. Shutdown is graceful: the accept loop stops first,
//! then active connections get a bounded window to finish.
//!
//! Clients (and tests) use [`connect`], which returns a `Framed` stream over
//! [`FrameCodec`] - no session buffer needed on that side.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ProtocolConfig;
use crate::core::codec::FrameCodec;
use crate::core::registry::PacketRegistry;
use crate::dispatch::Dispatcher;
use crate::error::{ProtocolError, Result};
use crate::session::{Session, SessionDirectory};
use crate::utils::metrics::global_metrics;

/// Read buffer size for inbound socket chunks.
const READ_CHUNK: usize = 2048;

/// A bound protocol server, not yet accepting.
pub struct Server {
    listener: TcpListener,
    registry: Arc<PacketRegistry>,
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionDirectory>,
    config: ProtocolConfig,
    next_session_id: AtomicU64,
}

impl Server {
    /// Bind the configured listen address.
    #[instrument(skip_all, fields(address = %config.server.address))]
    pub async fn bind(
        config: ProtocolConfig,
        registry: Arc<PacketRegistry>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Server> {
        config.validate_strict()?;
        let listener = TcpListener::bind(&config.server.address).await?;
        info!(address = %config.server.address, "listening");
        Ok(Server {
            listener,
            registry,
            dispatcher,
            sessions: Arc::new(SessionDirectory::new()),
            config,
            next_session_id: AtomicU64::new(1),
        })
    }

    /// The address actually bound (useful with an ephemeral port).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Directory of live sessions, for addressing outbound packets.
    pub fn sessions(&self) -> Arc<SessionDirectory> {
        self.sessions.clone()
    }

    /// Run until CTRL+C.
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received CTRL+C signal, shutting down");
                let _ = shutdown_tx.send(()).await;
            }
        });
        self.run_with_shutdown(shutdown_rx).await
    }

    /// Run until the shutdown channel fires, then wait for connections to
    /// close within the configured shutdown timeout.
    #[instrument(skip_all)]
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let active_connections = Arc::new(Mutex::new(0u32));

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Shutting down server. Waiting for connections to close...");

                    let timeout = tokio::time::sleep(self.config.server.shutdown_timeout);
                    tokio::pin!(timeout);

                    loop {
                        tokio::select! {
                            _ = &mut timeout => {
                                warn!("Shutdown timeout reached, forcing exit");
                                break;
                            }
                            _ = tokio::time::sleep(Duration::from_millis(100)) => {
                                let connections = *active_connections.lock().await;
                                if connections == 0 {
                                    info!("All connections closed, shutting down");
                                    break;
                                }
                                debug!(connections, "Waiting for connections to close");
                            }
                        }
                    }

                    global_metrics().log_metrics();
                    return Ok(());
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            {
                                let mut count = active_connections.lock().await;
                                if (*count as usize) >= self.config.server.max_connections {
                                    warn!(peer = %peer, "connection limit reached, rejecting");
                                    continue;
                                }
                                *count += 1;
                            }

                            let session_id =
                                self.next_session_id.fetch_add(1, Ordering::Relaxed);
                            let registry = self.registry.clone();
                            let dispatcher = self.dispatcher.clone();
                            let sessions = self.sessions.clone();
                            let config = self.config.clone();
                            let active_connections = active_connections.clone();

                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(
                                    stream, peer, session_id, registry, dispatcher, sessions,
                                    &config,
                                )
                                .await
                                {
                                    if !matches!(e, ProtocolError::ConnectionClosed) {
                                        error!(error = %e, peer = %peer, "connection failed");
                                    }
                                }
                                let mut count = active_connections.lock().await;
                                *count -= 1;
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }
    }
}

/// Per-connection lifecycle: session setup, read loop, teardown.
#[instrument(skip_all, fields(session_id = session_id, peer = %peer))]
async fn serve_connection(
    stream: TcpStream,
    peer: std::net::SocketAddr,
    session_id: u64,
    registry: Arc<PacketRegistry>,
    dispatcher: Arc<Dispatcher>,
    sessions: Arc<SessionDirectory>,
    config: &ProtocolConfig,
) -> Result<()> {
    let metrics = global_metrics();
    metrics.connection_established();
    info!(session_id, "connection established");

    let (mut read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let session = Arc::new(Session::new(
        peer,
        session_id,
        dispatcher,
        registry,
        outbound_tx,
        config,
    ));
    session.on_connected()?;
    sessions.register(session.clone());

    let writer = tokio::spawn(drain_outbound(outbound_rx, write_half));

    let result = read_loop(&mut read_half, &session).await;

    // Dropping the session drops the outbound sender, letting the writer
    // finish whatever is queued and exit.
    sessions.unregister(session_id);
    session.on_disconnected()?;
    drop(session);
    let _ = writer.await;

    metrics.connection_closed();
    info!(session_id, "connection closed");
    result
}

async fn read_loop(
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
    session: &Arc<Session>,
) -> Result<()> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = read_half.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        global_metrics().bytes_received(n as u64);
        session.receive(&chunk[..n])?;
        session.process()?;
    }
}

async fn drain_outbound(
    mut outbound_rx: mpsc::UnboundedReceiver<bytes::Bytes>,
    mut write_half: OwnedWriteHalf,
) {
    while let Some(wire) = outbound_rx.recv().await {
        if let Err(e) = write_half.write_all(&wire).await {
            debug!(error = %e, "outbound write failed, dropping connection");
            return;
        }
    }
}

/// Connect to a protocol server, framing handled by [`FrameCodec`].
#[instrument(skip(config))]
pub async fn connect(
    addr: &str,
    config: &ProtocolConfig,
) -> Result<Framed<TcpStream, FrameCodec>> {
    let stream = TcpStream::connect(addr).await?;
    Ok(Framed::new(
        stream,
        FrameCodec::new(config.codec.compression),
    ))
}

/// Read frames from a framed client stream until it closes, ignoring
/// transport-level decode errors (corrupt frames are dropped server-side,
/// mirrored here for symmetry).
pub async fn next_application_frame(
    framed: &mut Framed<TcpStream, FrameCodec>,
) -> Option<crate::core::frame::Frame> {
    loop {
        match framed.next().await? {
            Ok(frame) if frame.application => return Some(frame),
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "client-side frame decode failed");
                return None;
            }
        }
    }
}
