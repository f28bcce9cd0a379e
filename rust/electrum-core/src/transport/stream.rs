//! Newline-delimited transport over any byte stream (TCP, Unix socket, ...).

use std::sync::Arc;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::{IoError, TransportError};

use super::Transport;

type BoxedReader = Box<dyn AsyncRead + Unpin + Send + Sync>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send + Sync>;

#[derive(Clone)]
pub struct StreamTransport {
    inner: Arc<StreamInner>,
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("closed", &self.inner.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

struct StreamInner {
    reader: AsyncMutex<FramedRead<BoxedReader, LinesCodec>>,
    writer: AsyncMutex<BoxedWriter>,
    closed: CancellationToken,
    max_line_length: usize,
}

impl StreamTransport {
    pub fn new<S>(stream: S, max_line_length: usize) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_split(reader, writer, max_line_length)
    }

    /// Create a transport from separate reader and writer halves.
    pub fn from_split<R, W>(reader: R, writer: W, max_line_length: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + Sync + 'static,
        W: AsyncWrite + Unpin + Send + Sync + 'static,
    {
        let reader: BoxedReader = Box::new(reader);
        let writer: BoxedWriter = Box::new(writer);
        Self {
            inner: Arc::new(StreamInner {
                reader: AsyncMutex::new(FramedRead::new(
                    reader,
                    LinesCodec::new_with_max_length(max_line_length),
                )),
                writer: AsyncMutex::new(writer),
                closed: CancellationToken::new(),
                max_line_length,
            }),
        }
    }

    /// Open a plain TCP connection to an index server.
    pub async fn connect_tcp(
        addr: impl ToSocketAddrs,
        max_line_length: usize,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        tracing::debug!(peer = ?stream.peer_addr().ok(), "tcp transport connected");
        Ok(Self::new(stream, max_line_length))
    }

    pub fn pair(max_line_length: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(65536);
        (Self::new(a, max_line_length), Self::new(b, max_line_length))
    }

    fn map_codec_error(&self, e: LinesCodecError) -> TransportError {
        match e {
            LinesCodecError::MaxLineLengthExceeded => TransportError::LineTooLong {
                max: self.inner.max_line_length,
            },
            LinesCodecError::Io(e) => TransportError::Io(IoError::from(e)),
        }
    }
}

/// Closes the transport if a write is abandoned part way through: the peer
/// may have received half a line, and the framing cannot be recovered.
struct TornWriteGuard<'a> {
    closed: &'a CancellationToken,
    armed: bool,
}

impl Drop for TornWriteGuard<'_> {
    fn drop(&mut self) {
        if self.armed && !self.closed.is_cancelled() {
            tracing::warn!("write abandoned mid-line; closing stream transport");
            self.closed.cancel();
        }
    }
}

impl Transport for StreamTransport {
    async fn send_message(&self, message: Bytes) -> Result<(), TransportError> {
        if self.inner.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let write = async {
            let mut writer = self.inner.writer.lock().await;
            let mut torn = TornWriteGuard {
                closed: &self.inner.closed,
                armed: true,
            };
            writer.write_all(&message).await?;
            writer.flush().await?;
            torn.armed = false;
            Ok::<(), TransportError>(())
        };

        tokio::select! {
            _ = self.inner.closed.cancelled() => Err(TransportError::Closed),
            written = write => written,
        }
    }

    async fn recv_message(&self) -> Result<Bytes, TransportError> {
        if self.inner.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let mut reader = self.inner.reader.lock().await;
        let line = tokio::select! {
            _ = self.inner.closed.cancelled() => return Err(TransportError::Closed),
            line = reader.next() => line,
        };

        match line {
            Some(Ok(line)) => Ok(Bytes::from(line)),
            Some(Err(e)) => Err(self.map_codec_error(e)),
            None => Err(TransportError::Closed),
        }
    }

    fn close(&self) {
        if self.inner.closed.is_cancelled() {
            return;
        }
        self.inner.closed.cancel();

        // Best-effort half-close so the server sees EOF.
        let inner = self.inner.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = inner.writer.lock().await.shutdown().await;
            });
        }
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_line_round_trip() {
        let (a, b) = StreamTransport::pair(1024);

        a.send_message(Bytes::from_static(b"{\"id\":1,\"method\":\"server.ping\",\"params\":[]}\n"))
            .await
            .unwrap();
        let line = b.recv_message().await.unwrap();
        assert_eq!(
            &line[..],
            b"{\"id\":1,\"method\":\"server.ping\",\"params\":[]}"
        );
    }

    #[tokio::test]
    async fn test_crlf_is_stripped() {
        let (a, b) = StreamTransport::pair(1024);
        a.send_message(Bytes::from_static(b"{}\r\n")).await.unwrap();
        assert_eq!(&b.recv_message().await.unwrap()[..], b"{}");
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let (a, b) = StreamTransport::pair(8);
        a.send_message(Bytes::from_static(b"0123456789abcdef\n"))
            .await
            .unwrap();
        assert_eq!(
            b.recv_message().await,
            Err(TransportError::LineTooLong { max: 8 })
        );
    }

    #[tokio::test]
    async fn test_peer_hangup_reports_closed() {
        let (a, b) = StreamTransport::pair(1024);
        drop(a);
        assert_eq!(b.recv_message().await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_close_wakes_blocked_write() {
        let (a, _b) = StreamTransport::pair(1024);

        // Larger than the duplex buffer; nobody reads the other end.
        let big = Bytes::from(vec![b'x'; 256 * 1024]);
        let writer = a.clone();
        let blocked = tokio::spawn(async move { writer.send_message(big).await });
        tokio::task::yield_now().await;

        a.close();
        assert_eq!(blocked.await.unwrap(), Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_close_rejects_io() {
        let (a, _b) = StreamTransport::pair(1024);
        a.close();
        assert!(a.is_closed());
        assert_eq!(
            a.send_message(Bytes::from_static(b"{}\n")).await,
            Err(TransportError::Closed)
        );
        assert_eq!(a.recv_message().await, Err(TransportError::Closed));
    }
}
