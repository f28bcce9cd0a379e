//! Transport trait and type-erased wrapper.
//!
//! The [`Transport`] trait is the port the session consumes. Each backend lives
//! in its own module under `transport/` and implements this trait.
//!
//! For type erasure when you need to handle multiple transport types dynamically,
//! use [`AnyTransport`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use crate::TransportError;

/// Trait for transport implementations.
///
/// A transport moves whole newline-terminated JSON messages. Framing (how a
/// message is delimited on the wire) is the transport's concern; the session
/// only ever sees complete messages.
///
/// `recv_message` returning `Err` is the transport's fatal-error stream: the
/// session treats any error as irrecoverable for this transport instance.
///
/// # Example
///
/// ```ignore
/// async fn pump<T: Transport>(transport: T) -> Result<(), TransportError> {
///     loop {
///         let message = transport.recv_message().await?;
///         // ...
///     }
/// }
/// ```
pub trait Transport: Send + Sync + Clone + 'static {
    /// Send one message. The message already carries its line terminator.
    fn send_message(
        &self,
        message: Bytes,
    ) -> impl Future<Output = Result<(), TransportError>> + Send + '_;

    /// Receive the next inbound message, without its line terminator.
    fn recv_message(&self) -> impl Future<Output = Result<Bytes, TransportError>> + Send + '_;

    /// Close this transport.
    ///
    /// After closing, `send_message` and `recv_message` return
    /// `TransportError::Closed`, including calls already blocked in flight.
    fn close(&self);

    /// Check if this transport is closed.
    fn is_closed(&self) -> bool;
}

/// Object-safe version of [`Transport`] for dynamic dispatch.
pub trait DynTransport: Send + Sync + 'static {
    fn send_message_dyn(
        &self,
        message: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;

    fn recv_message_dyn(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send + '_>>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

impl<T: Transport> DynTransport for T {
    fn send_message_dyn(
        &self,
        message: Bytes,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(self.send_message(message))
    }

    fn recv_message_dyn(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, TransportError>> + Send + '_>> {
        Box::pin(self.recv_message())
    }

    fn close(&self) {
        Transport::close(self)
    }

    fn is_closed(&self) -> bool {
        Transport::is_closed(self)
    }
}

/// Type-erased transport wrapper.
///
/// The session stores its transport as an `AnyTransport`, which lets the owner
/// install a different backend on reconnect without changing the session type.
///
/// ```ignore
/// let (transport, peer) = MemTransport::pair();
/// let transport = AnyTransport::new(transport);
/// transport.send_message(Bytes::from_static(b"{}\n")).await?;
/// ```
#[derive(Clone)]
pub struct AnyTransport {
    inner: Arc<dyn DynTransport>,
}

impl std::fmt::Debug for AnyTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyTransport")
            .field("is_closed", &self.inner.is_closed())
            .finish_non_exhaustive()
    }
}

impl AnyTransport {
    pub fn new<T: Transport>(transport: T) -> Self {
        Self {
            inner: Arc::new(transport),
        }
    }

    pub async fn send_message(&self, message: Bytes) -> Result<(), TransportError> {
        self.inner.send_message_dyn(message).await
    }

    pub async fn recv_message(&self) -> Result<Bytes, TransportError> {
        self.inner.recv_message_dyn().await
    }

    pub fn close(&self) {
        self.inner.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

impl Transport for AnyTransport {
    fn send_message(
        &self,
        message: Bytes,
    ) -> impl Future<Output = Result<(), TransportError>> + Send + '_ {
        self.inner.send_message_dyn(message)
    }

    fn recv_message(&self) -> impl Future<Output = Result<Bytes, TransportError>> + Send + '_ {
        self.inner.recv_message_dyn()
    }

    fn close(&self) {
        self.inner.close()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[cfg(feature = "mem")]
pub mod mem;
#[cfg(feature = "stream")]
pub mod stream;

#[cfg(feature = "mem")]
pub use mem::{MemPeer, MemTransport};
#[cfg(feature = "stream")]
pub use stream::StreamTransport;
