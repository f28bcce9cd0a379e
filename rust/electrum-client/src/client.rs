use std::sync::Arc;

use electrum_core::{RpcError, Session, SessionConfig, StreamTransport, Transport, TransportError};
use tokio::net::ToSocketAddrs;
use tokio::sync::broadcast;

/// Name this client reports in `server.version`.
pub const CLIENT_VERSION: &str = "electrum-rs/0.1";

/// Protocol version requested in `server.version`.
pub const PROTOCOL_VERSION: &str = "1.4";

/// Handle to one Electrum server connection.
///
/// Cheap to clone; clones share the session. The typed protocol methods live
/// in the `rpc` modules, the subscription flows in `subscribe`.
#[derive(Clone, Debug)]
pub struct Client {
    pub(crate) session: Arc<Session>,
}

impl Client {
    /// Start a session over an already connected transport.
    pub fn new<T: Transport>(transport: T, config: SessionConfig) -> Self {
        Self {
            session: Session::new(transport, config),
        }
    }

    /// Connect to `addr` over plain TCP.
    pub async fn connect_tcp(
        addr: impl ToSocketAddrs,
        config: SessionConfig,
    ) -> Result<Self, RpcError> {
        let transport = StreamTransport::connect_tcp(addr, config.max_line_length).await?;
        Ok(Self::new(transport, config))
    }

    /// Wrap an existing session.
    pub fn from_session(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn shutdown(&self) {
        self.session.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.session.is_shutdown()
    }

    /// Fatal transport errors, reported before the session shuts down.
    pub fn transport_errors(&self) -> broadcast::Receiver<TransportError> {
        self.session.transport_errors()
    }

    /// Swap in a freshly connected transport.
    ///
    /// Server-side subscriptions are lost with the old connection; call
    /// `ScripthashSubscription::resubscribe` (and re-run the header and
    /// masternode flows) afterwards.
    pub fn replace_transport<T: Transport>(&self, transport: T) -> Result<(), RpcError> {
        self.session.replace_transport(transport)
    }
}
