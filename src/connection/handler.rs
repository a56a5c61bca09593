//! Per-Client Connection Loop
//!
//! Each client gets its own task running [`ConnectionHandler::run`]:
//!
//! ```text
//!   ┌──────────────────────────────┐
//!   │ Read bytes into the buffer   │<─────────────┐
//!   └──────────────┬───────────────┘              │
//!                  ▼                              │
//!   ┌──────────────────────────────┐              │
//!   │ Decode every complete frame, │              │
//!   │ execute it, queue the reply  │              │
//!   └──────────────┬───────────────┘              │
//!                  ▼                              │
//!   ┌──────────────────────────────┐              │
//!   │ Flush all queued replies     │──────────────┘
//!   └──────────────────────────────┘
//! ```
//!
//! Replies to pipelined commands are written back in one flush, in request
//! order. A command only runs once its frame is fully buffered.
//!
//! ## Framing errors
//!
//! A frame that is well delimited but not a command (for example `*0`) is
//! consumed and answered with `-ERR Protocol error: ...`; the connection goes
//! on. Any other framing error leaves the stream position unknown, so the
//! error is sent and the connection is closed.

use crate::commands::CommandHandler;
use crate::protocol::parser::{MAX_BULK_SIZE, MAX_INLINE_SIZE};
use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Largest amount of unparsed input buffered for one client: one maximal
/// bulk string plus room for its headers.
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + MAX_INLINE_SIZE;

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    pub commands_processed: AtomicU64,
    pub protocol_errors: AtomicU64,
    pub bytes_read: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Parse(#[from] ParseError),

    /// The peer closed the connection between commands
    #[error("Client disconnected")]
    ClientDisconnected,

    /// The peer closed the connection in the middle of a frame
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Drives a single client connection.
///
/// Generic over the transport so the loop can run on a `TcpStream` or on an
/// in-memory mock.
pub struct ConnectionHandler<S> {
    stream: BufWriter<S>,
    addr: SocketAddr,

    /// Bytes read but not yet decoded
    buffer: BytesMut,

    /// Encoded replies waiting for the next flush
    replies: BytesMut,

    command_handler: CommandHandler,
    parser: RespParser,
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            replies: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Serves the client until it quits, disconnects or breaks the protocol.
    ///
    /// `Ok(())` means the client sent `QUIT`.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        self.stats.connection_opened();
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client quit"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed abnormally"),
        }

        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Replies queued before a framing error are still delivered
            let processed = self.process_buffered();
            self.flush_replies().await?;

            if processed? {
                return Ok(());
            }

            self.read_more_data().await?;
        }
    }

    /// Executes every complete command in the buffer and queues the replies.
    ///
    /// Returns true once `QUIT` has been answered. An unrecoverable framing
    /// error is queued as a reply and then returned.
    fn process_buffered(&mut self) -> Result<bool, ConnectionError> {
        loop {
            match self.parser.parse_command(&mut self.buffer) {
                Ok(Some(command)) => {
                    let quit = command.name == "QUIT";
                    let reply = self.command_handler.execute(command);
                    self.stats.command_processed();

                    trace!(client = %self.addr, reply = %reply, "Queued reply");
                    reply.serialize_into(&mut self.replies);

                    if quit {
                        return Ok(true);
                    }
                }
                Ok(None) => {
                    trace!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        "Incomplete command, need more data"
                    );
                    return Ok(false);
                }
                Err(e) => {
                    self.stats.protocol_error();
                    protocol_error_reply(&e).serialize_into(&mut self.replies);

                    if e.is_recoverable() {
                        warn!(client = %self.addr, error = %e, "Rejected malformed command");
                        continue;
                    }

                    warn!(client = %self.addr, error = %e, "Unrecoverable protocol error");
                    return Err(ConnectionError::Parse(e));
                }
            }
        }
    }

    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Err(ConnectionError::ClientDisconnected)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    async fn flush_replies(&mut self) -> Result<(), ConnectionError> {
        if self.replies.is_empty() {
            return Ok(());
        }

        let pending = self.replies.split();
        self.stream.write_all(&pending).await?;
        self.stream.flush().await?;

        self.stats.bytes_written(pending.len());
        trace!(client = %self.addr, bytes = pending.len(), "Sent replies");
        Ok(())
    }
}

fn protocol_error_reply(e: &ParseError) -> RespValue {
    RespValue::error(format!("ERR Protocol error: {}", e))
}

/// Runs a client connection to completion, logging how it ended.
pub async fn handle_connection<S>(
    stream: S,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    // `run` has already logged the outcome
    let _ = handler.run().await;
}
