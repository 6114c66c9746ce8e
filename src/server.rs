//! TCP server: accept loop, connection handlers, timestamp task, and the
//! coordinated shutdown sequence.
//!
//! Every accepted connection runs in its own task. Handlers append received
//! chunks to the shared log and, when a chunk completes a newline-terminated
//! message, echo the entire accumulated log back to the client. A background
//! task appends a timestamp record at a fixed interval. On SIGINT or SIGTERM
//! the accept loop stops, every live handler and the timestamp task are
//! cancelled and drained, and the log file is removed.

use crate::config::Config;
use crate::connection::{ConnState, ConnectionGuard, ConnectionRecord, ConnectionRegistry};
use crate::log::SharedLog;
use bytes::BytesMut;
use chrono::Local;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Listen backlog for the server socket
const LISTEN_BACKLOG: i32 = 10;

/// Read buffer size for connection handlers
const RECV_BUFFER_SIZE: usize = 1024;

/// Shared state handed to every task the server spawns.
pub struct ServerContext {
    /// The one shared append-only log.
    pub log: SharedLog,
    /// Live connection handlers, enumerated by the shutdown drain.
    pub registry: ConnectionRegistry,
    /// Tripped once a stop is requested; observed by the accept loop and
    /// the timestamp task.
    pub shutdown: CancellationToken,
}

/// Create the listening socket with `SO_REUSEADDR` so restarts can rebind
/// immediately.
///
/// The socket is left nonblocking for the async runtime. Any failure here
/// is fatal to startup.
pub fn bind(port: u16) -> io::Result<StdTcpListener> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Server instance
pub struct Server {
    config: Config,
    ctx: Arc<ServerContext>,
    tracker: TaskTracker,
}

impl Server {
    /// Create a new server instance from resolved configuration
    pub fn new(config: Config) -> Self {
        let ctx = Arc::new(ServerContext {
            log: SharedLog::new(config.log_file.clone()),
            registry: ConnectionRegistry::new(),
            shutdown: CancellationToken::new(),
        });

        Server {
            config,
            ctx,
            tracker: TaskTracker::new(),
        }
    }

    /// Run the server until a stop request completes shutdown.
    ///
    /// Takes the pre-bound listening socket so bind failures are reported
    /// before the process forks into the background.
    pub async fn run(self, listener: StdTcpListener) -> io::Result<()> {
        let listener = TcpListener::from_std(listener)?;
        info!(addr = %listener.local_addr()?, "Server listening");

        tokio::spawn(watch_signals(self.ctx.shutdown.clone()));

        let period = Duration::from_secs(self.config.timestamp_interval);
        let timestamps = tokio::spawn(timestamp_task(Arc::clone(&self.ctx), period));

        self.accept_loop(&listener).await;

        // Stop request observed: close the listening socket, then drain.
        drop(listener);
        self.drain(timestamps).await;
        Ok(())
    }

    /// Accept connections until the shutdown token trips.
    async fn accept_loop(&self, listener: &TcpListener) {
        loop {
            let accepted = tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "Accepted connection");

                    let cancel = CancellationToken::new();
                    let id = self
                        .ctx
                        .registry
                        .register(ConnectionRecord::new(peer, cancel.clone()));
                    let ctx = Arc::clone(&self.ctx);
                    self.tracker
                        .spawn(handle_connection(ctx, id, stream, peer, cancel));
                }
                Err(e) => {
                    if self.ctx.shutdown.is_cancelled() {
                        break;
                    }
                    // Transient failure: log it and keep accepting
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Drain sequence after the accept loop has stopped.
    ///
    /// Waits out the timestamp task, cancels every live handler and waits
    /// for all of them to finish, then removes the log file. Every step
    /// runs regardless of the outcome of the previous one.
    async fn drain(&self, timestamps: JoinHandle<()>) {
        if timestamps.await.is_err() {
            warn!("Timestamp task panicked");
        }

        let live = self.ctx.registry.len();
        if live > 0 {
            info!(connections = live, "Cancelling live connections");
        }
        self.ctx.registry.cancel_all();
        self.tracker.close();
        self.tracker.wait().await;

        if let Err(e) = self.ctx.log.remove().await {
            warn!(error = %e, "Failed to remove log file");
        }

        info!("Shutdown complete");
    }

    /// Get a handle to the shared server context for testing
    #[cfg(test)]
    pub fn context(&self) -> Arc<ServerContext> {
        Arc::clone(&self.ctx)
    }
}

/// Drive a single connection through its receive/respond state machine.
///
/// Every received chunk is appended to the shared log; a chunk whose final
/// byte is a newline completes a message and gets the full log echoed back.
/// The registry entry is released and the socket closed on every exit path.
async fn handle_connection(
    ctx: Arc<ServerContext>,
    id: usize,
    mut stream: TcpStream,
    peer: SocketAddr,
    cancel: CancellationToken,
) {
    let _guard = ConnectionGuard::new(&ctx.registry, id);
    let mut buf = BytesMut::with_capacity(RECV_BUFFER_SIZE);
    let mut state = ConnState::Receiving;

    loop {
        state = match state {
            ConnState::Receiving => {
                buf.clear();
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(conn = id, "Cancelled while receiving");
                        ConnState::Closed
                    }
                    res = stream.read_buf(&mut buf) => match res {
                        Ok(0) => {
                            debug!(conn = id, "Peer closed the stream");
                            ConnState::Closed
                        }
                        Ok(_) => receive_chunk(&ctx, id, &buf).await,
                        Err(e) => {
                            warn!(conn = id, error = %e, "Read failed");
                            ConnState::Closed
                        }
                    },
                }
            }

            ConnState::Responding { echo } => {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(conn = id, "Cancelled while responding");
                        ConnState::Closed
                    }
                    res = stream.write_all(&echo) => match res {
                        Ok(()) => ConnState::Receiving,
                        Err(e) => {
                            warn!(conn = id, error = %e, "Echo write failed");
                            ConnState::Closed
                        }
                    },
                }
            }

            ConnState::Closed => break,
        };
    }

    info!(peer = %peer, "Closed connection");
}

/// Append one received chunk to the log and decide the next state.
///
/// A chunk whose final byte is a newline completes a message: the log is
/// appended and snapshotted under one lock acquisition so the echo reflects
/// exactly the log up to and including this message.
async fn receive_chunk(ctx: &ServerContext, id: usize, chunk: &[u8]) -> ConnState {
    if chunk.last() == Some(&b'\n') {
        match ctx.log.append_and_read_all(chunk).await {
            Ok(echo) => ConnState::Responding { echo },
            Err(e) => {
                error!(conn = id, error = %e, "Log append failed");
                ConnState::Closed
            }
        }
    } else {
        match ctx.log.append(chunk).await {
            Ok(()) => ConnState::Receiving,
            Err(e) => {
                error!(conn = id, error = %e, "Log append failed");
                ConnState::Closed
            }
        }
    }
}

/// Append a timestamp record to the shared log at a fixed interval.
///
/// The first record lands one full interval after startup. The stop token
/// is checked before each tick is acted on, so no record is appended after
/// shutdown begins.
async fn timestamp_task(ctx: Arc<ServerContext>, period: Duration) {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let record = format!("timestamp:{}\n", Local::now().to_rfc2822());
                if let Err(e) = ctx.log.append(record.as_bytes()).await {
                    error!(error = %e, "Failed to append timestamp record");
                }
            }
        }
    }

    debug!("Timestamp task stopped");
}

/// Wait for SIGINT or SIGTERM and trip the shutdown token.
///
/// Nothing else happens here: sockets, tasks, and the log file are torn
/// down by the drain sequence in `run`. The loop keeps consuming repeated
/// signals; re-cancelling an already cancelled token is a no-op.
async fn watch_signals(shutdown: CancellationToken) {
    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Failed to install SIGINT handler");
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return;
        }
    };

    loop {
        let name = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
        };
        info!(signal = name, "Caught signal, exiting");
        shutdown.cancel();
    }
}
