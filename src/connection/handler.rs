//! Per-Client Connection Loop
//!
//! Every accepted socket runs in its own Tokio task. The task owns a read
//! buffer and repeats three steps:
//!
//! ```text
//!   socket ──read──> BytesMut ──LineParser──> line ──CommandHandler──> Response
//!     ▲                                                                   │
//!     └───────────────────────── write + flush ───────────────────────────┘
//! ```
//!
//! Replies go out in the order the lines arrived, so a client may pipeline
//! several commands in one write. The loop ends when the peer closes the
//! socket, an I/O call fails, or a line grows past
//! [`MAX_LINE_LENGTH`](crate::protocol::MAX_LINE_LENGTH).

use crate::commands::CommandHandler;
use crate::protocol::{LineParser, ParseError, Response};
use bytes::{Buf, BytesMut};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

const INITIAL_BUFFER_SIZE: usize = 4096;

/// Spare capacity kept free before each socket read.
const MIN_READ_SPACE: usize = 1024;

/// Server-wide counters, shared by every connection task.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    pub connections_accepted: AtomicU64,
    pub active_connections: AtomicU64,
    /// Lines executed, including rejected ones
    pub commands_processed: AtomicU64,
    /// Lines answered with `ERROR`
    pub commands_failed: AtomicU64,
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

    /// Counts one answered line.
    pub fn command_processed(&self, failed: bool) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.commands_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Why a connection stopped being served.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a line longer than the framing allows
    #[error("framing error: {0}")]
    Framing(#[from] ParseError),

    /// The peer closed the socket between two lines
    #[error("Client disconnected")]
    ClientDisconnected,

    /// The peer closed the socket in the middle of a line
    #[error("Unexpected end of stream")]
    UnexpectedEof,
}

impl ConnectionError {
    /// Closes that are part of normal client behavior.
    fn is_ordinary_close(&self) -> bool {
        match self {
            ConnectionError::ClientDisconnected => true,
            ConnectionError::Io(e) => e.kind() == ErrorKind::ConnectionReset,
            _ => false,
        }
    }
}

/// Serves one client over any byte stream (a `TcpStream` in the server).
pub struct ConnectionHandler<S = TcpStream> {
    stream: BufWriter<S>,
    /// Peer address, used only in log fields
    addr: SocketAddr,
    buffer: BytesMut,
    command_handler: CommandHandler,
    parser: LineParser,
    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream` and counts it as an open connection.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: LineParser::new(),
            stats,
        }
    }

    /// Serves the client until it goes away, then returns the reason.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.serve().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) if e.is_ordinary_close() => debug!(client = %self.addr, reason = %e, "Client left"),
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn serve(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Answer everything already buffered before touching the socket
            while let Some(line) = self.next_line()? {
                let response = self.command_handler.execute(&line);
                self.stats.command_processed(response.is_error());
                self.reply(&response).await?;
            }

            self.fill_buffer().await?;
        }
    }

    /// Splits the next complete line off the front of the buffer.
    fn next_line(&mut self) -> Result<Option<String>, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        let Some((line, consumed)) = self.parser.parse(&self.buffer).inspect_err(|e| {
            warn!(client = %self.addr, error = %e, "Rejecting oversized line");
        })?
        else {
            return Ok(None);
        };

        self.buffer.advance(consumed);
        trace!(
            client = %self.addr,
            line = %line.escape_debug(),
            buffered = self.buffer.len(),
            "Received line"
        );
        Ok(Some(line))
    }

    async fn fill_buffer(&mut self) -> Result<(), ConnectionError> {
        self.buffer.reserve(MIN_READ_SPACE);

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(if self.buffer.is_empty() {
                ConnectionError::ClientDisconnected
            } else {
                ConnectionError::UnexpectedEof
            });
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");
        Ok(())
    }

    async fn reply(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        Ok(())
    }
}

/// Runs a [`ConnectionHandler`] for an accepted TCP socket to completion.
///
/// This is what the accept loop spawns; ordinary closes are not logged twice.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        if !e.is_ordinary_close() {
            debug!(client = %addr, error = %e, "Connection ended with error");
        }
    }
}
