//! Connection wrapper and socket accounting.
//!
//! # Responsibilities
//! - Buffered reads/writes over one web-server socket
//! - Apply the read timeout to the first two bytes of a brand-new
//!   connection, then remove it for every later read
//! - Track the count of open protocol sockets (feeds the END_RESPONSE
//!   reuse decision)
//!
//! # Design Decisions
//! - EOF on the first magic byte and EOF between the magic bytes are
//!   distinguishable errors; the connection owner tears the socket down
//! - Payload reads go through one reusable scratch buffer per connection

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::net::listener::ListenerActivity;
use crate::protocol::{ProtocolError, ProtocolResult};

/// Count of currently open protocol sockets.
#[derive(Debug, Default)]
pub struct SocketTracker {
    open: AtomicUsize,
}

impl SocketTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted socket. The guard decrements on drop.
    pub fn track(self: &Arc<Self>) -> SocketGuard {
        self.open.fetch_add(1, Ordering::SeqCst);
        SocketGuard {
            tracker: Arc::clone(self),
        }
    }

    pub fn open_count(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

/// Holds one slot in the open-socket count for a connection's lifetime.
#[derive(Debug)]
pub struct SocketGuard {
    tracker: Arc<SocketTracker>,
}

impl Drop for SocketGuard {
    fn drop(&mut self) {
        self.tracker.open.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(
            open_sockets = self.tracker.open_count(),
            "protocol socket closed"
        );
    }
}

/// Freelist of per-connection scratch buffers.
///
/// Sized by `AJP_CONNECTION_POOL_SIZE`; a capacity of zero disables reuse.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    max: usize,
}

impl BufferPool {
    pub fn new(max: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            max,
        }
    }

    /// Take a buffer out of the pool, or allocate a fresh one.
    pub fn checkout(&self) -> Vec<u8> {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default()
    }

    /// Return a buffer, keeping it only while the pool has room.
    pub fn restore(&self, mut buffer: Vec<u8>) {
        let mut buffers = self
            .buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if buffers.len() < self.max {
            buffer.clear();
            buffers.push(buffer);
        }
    }

    pub fn pooled(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// One web-server socket with AJP-aware framing reads.
pub struct AjpConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    read_timeout: Option<Duration>,
    handshake_done: bool,
    scratch: Vec<u8>,
    buffer_pool: Option<Arc<BufferPool>>,
    activity: Arc<ListenerActivity>,
    _socket: SocketGuard,
}

impl AjpConnection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        read_timeout: Option<Duration>,
        buffer_pool: Option<Arc<BufferPool>>,
        activity: Arc<ListenerActivity>,
        socket: SocketGuard,
    ) -> Self {
        let (read_half, write_half) = stream.into_split();
        let scratch = buffer_pool
            .as_ref()
            .map(|pool| pool.checkout())
            .unwrap_or_default();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
            read_timeout,
            handshake_done: false,
            scratch,
            buffer_pool,
            activity,
            _socket: socket,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn activity(&self) -> &Arc<ListenerActivity> {
        &self.activity
    }

    /// Read the two magic bytes opening a packet.
    ///
    /// The configured read timeout covers only the first two bytes ever
    /// read on this socket; afterwards reads block without limit so a
    /// large in-flight packet is never truncated by an idle timeout. EOF
    /// before the first byte and EOF between the two bytes raise distinct
    /// errors. Marks the owning listener as processing once both bytes
    /// are in.
    pub async fn read_magic(&mut self) -> ProtocolResult<[u8; 2]> {
        let timeout = if self.handshake_done {
            None
        } else {
            self.read_timeout
        };
        let first = match self.read_byte_with(timeout).await {
            Ok(byte) => byte,
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::SocketClosedByWebServer)
            }
            Err(error) => return Err(error.into()),
        };
        let second = match self.read_byte_with(timeout).await {
            Ok(byte) => byte,
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(ProtocolError::EmptyInputStream)
            }
            Err(error) => return Err(error.into()),
        };
        self.handshake_done = true;
        self.activity.begin_processing();
        Ok([first, second])
    }

    async fn read_byte_with(&mut self, timeout: Option<Duration>) -> io::Result<u8> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.reader.read_u8())
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "timed out waiting for a packet")
                })?,
            None => self.reader.read_u8().await,
        }
    }

    /// Read one 2-byte big-endian integer.
    pub async fn read_int(&mut self) -> ProtocolResult<u16> {
        Ok(self.reader.read_u16().await?)
    }

    /// Read a single byte.
    pub async fn read_byte(&mut self) -> ProtocolResult<u8> {
        Ok(self.reader.read_u8().await?)
    }

    /// Read exactly `len` payload bytes into the connection's scratch
    /// buffer.
    pub async fn read_payload(&mut self, len: usize) -> ProtocolResult<&[u8]> {
        self.scratch.clear();
        self.scratch.resize(len, 0);
        self.reader.read_exact(&mut self.scratch).await?;
        Ok(&self.scratch)
    }

    /// Bytes already buffered but not yet consumed, for diagnostics.
    pub fn buffered(&self) -> &[u8] {
        self.reader.buffer()
    }

    /// Write one complete response frame and flush it.
    pub async fn write_frame(&mut self, frame: &[u8]) -> ProtocolResult<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Best-effort flush of the response side.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}

impl Drop for AjpConnection {
    fn drop(&mut self) {
        if let Some(pool) = &self.buffer_pool {
            pool.restore(std::mem::take(&mut self.scratch));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_tracker_counts_guards() {
        let tracker = Arc::new(SocketTracker::new());
        assert_eq!(tracker.open_count(), 0);

        let first = tracker.track();
        let second = tracker.track();
        assert_eq!(tracker.open_count(), 2);

        drop(first);
        assert_eq!(tracker.open_count(), 1);
        drop(second);
        assert_eq!(tracker.open_count(), 0);
    }

    #[test]
    fn buffer_pool_keeps_at_most_max() {
        let pool = BufferPool::new(1);
        pool.restore(Vec::with_capacity(64));
        pool.restore(Vec::with_capacity(64));
        assert_eq!(pool.pooled(), 1);

        let buffer = pool.checkout();
        assert!(buffer.is_empty());
        assert_eq!(pool.pooled(), 0);
    }
}
