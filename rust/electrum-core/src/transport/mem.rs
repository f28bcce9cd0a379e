//! In-process transport.
//!
//! [`MemTransport`] is the client half; [`MemPeer`] plays the server. The peer
//! reads what the client sent, injects inbound messages, and can inject a
//! fatal transport error. Every session test runs over this pair.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

use crate::TransportError;

use super::Transport;

const CHANNEL_CAPACITY: usize = 64;

type Inbound = Result<Bytes, TransportError>;

#[derive(Clone, Debug)]
pub struct MemTransport {
    inner: Arc<MemInner>,
}

#[derive(Debug)]
struct MemInner {
    outbound: mpsc::Sender<Bytes>,
    inbound: AsyncMutex<mpsc::Receiver<Inbound>>,
    closed: CancellationToken,
}

/// Server side of a [`MemTransport`] pair.
#[derive(Clone, Debug)]
pub struct MemPeer {
    inbound: mpsc::Sender<Inbound>,
    outbound: Arc<AsyncMutex<mpsc::Receiver<Bytes>>>,
    closed: CancellationToken,
}

impl MemTransport {
    pub fn pair() -> (Self, MemPeer) {
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let closed = CancellationToken::new();

        let transport = Self {
            inner: Arc::new(MemInner {
                outbound: outbound_tx,
                inbound: AsyncMutex::new(inbound_rx),
                closed: closed.clone(),
            }),
        };
        let peer = MemPeer {
            inbound: inbound_tx,
            outbound: Arc::new(AsyncMutex::new(outbound_rx)),
            closed,
        };
        (transport, peer)
    }
}

impl Transport for MemTransport {
    async fn send_message(&self, message: Bytes) -> Result<(), TransportError> {
        if self.inner.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        tokio::select! {
            _ = self.inner.closed.cancelled() => Err(TransportError::Closed),
            sent = self.inner.outbound.send(message) => sent.map_err(|_| TransportError::Closed),
        }
    }

    async fn recv_message(&self) -> Result<Bytes, TransportError> {
        if self.inner.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }

        let mut inbound = self.inner.inbound.lock().await;
        tokio::select! {
            _ = self.inner.closed.cancelled() => Err(TransportError::Closed),
            next = inbound.recv() => next.unwrap_or(Err(TransportError::Closed)),
        }
    }

    fn close(&self) {
        self.inner.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }
}

impl MemPeer {
    /// Next message the client sent, with its line terminator.
    ///
    /// Returns `None` once the client half has been dropped.
    pub async fn recv(&self) -> Option<Bytes> {
        self.outbound.lock().await.recv().await
    }

    /// Next message the client sent, parsed as JSON.
    pub async fn recv_json(&self) -> Option<serde_json::Value> {
        let message = self.recv().await?;
        serde_json::from_slice(&message).ok()
    }

    /// Deliver an inbound message to the client.
    pub async fn send(&self, message: impl Into<Bytes>) -> Result<(), TransportError> {
        self.inbound
            .send(Ok(message.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Deliver a JSON value to the client.
    pub async fn send_json(&self, value: &serde_json::Value) -> Result<(), TransportError> {
        self.send(value.to_string()).await
    }

    /// Report a fatal transport error to the client.
    pub async fn fail(&self, error: TransportError) -> Result<(), TransportError> {
        self.inbound
            .send(Err(error))
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Whether the client closed its half.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_recv() {
        let (transport, peer) = MemTransport::pair();

        transport
            .send_message(Bytes::from_static(b"{\"id\":1}\n"))
            .await
            .unwrap();
        assert_eq!(peer.recv().await.unwrap(), Bytes::from_static(b"{\"id\":1}\n"));

        peer.send("{\"id\":1,\"result\":null}").await.unwrap();
        assert_eq!(
            transport.recv_message().await.unwrap(),
            Bytes::from_static(b"{\"id\":1,\"result\":null}")
        );
    }

    #[tokio::test]
    async fn test_close_wakes_send_blocked_on_full_channel() {
        let (transport, peer) = MemTransport::pair();
        for _ in 0..CHANNEL_CAPACITY {
            transport.send_message(Bytes::from_static(b"{}\n")).await.unwrap();
        }

        let writer = transport.clone();
        let blocked =
            tokio::spawn(async move { writer.send_message(Bytes::from_static(b"{}\n")).await });
        tokio::task::yield_now().await;
        assert!(!blocked.is_finished());

        transport.close();
        assert_eq!(blocked.await.unwrap(), Err(TransportError::Closed));
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_injected_error() {
        let (transport, peer) = MemTransport::pair();
        peer.fail(TransportError::Closed).await.unwrap();
        assert_eq!(transport.recv_message().await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_close_wakes_pending_recv() {
        let (transport, peer) = MemTransport::pair();

        let reader = transport.clone();
        let pending = tokio::spawn(async move { reader.recv_message().await });
        tokio::task::yield_now().await;

        transport.close();
        assert_eq!(pending.await.unwrap(), Err(TransportError::Closed));
        assert!(peer.is_closed());
        assert!(matches!(
            transport.send_message(Bytes::new()).await,
            Err(TransportError::Closed)
        ));
    }
}
