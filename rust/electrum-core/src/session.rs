//! Session: a multiplexed JSON-RPC client session that owns the transport.
//!
//! The key invariant is that only the reader loop calls `recv_message()`;
//! every inbound message is routed from there through internal channels.
//!
//! # Architecture
//!
//! ```text
//!                        ┌──────────────────────────────────┐
//!                        │             Session              │
//!                        ├──────────────────────────────────┤
//!                        │  transport: Atomic<Slot<..>>     │
//!                        │  pending: id -> waiter           │
//!                        │  push: method -> [mpsc::Sender]  │
//!                        └────────────────┬─────────────────┘
//!                                         │
//!                                    reader loop
//!                                         │
//!          ┌──────────────────────────────┼──────────────────────────────┐
//!          │                              │                              │
//!   method set? (push)            id set? (pending)              transport error
//!          │                              │                              │
//!  ┌───────▼────────┐          ┌──────────▼─────────┐       ┌────────────▼────────────┐
//!  │ fan out to     │          │ hand off to the    │       │ report on error channel,│
//!  │ every listener │          │ one waiting caller │       │ shut the session down   │
//!  └────────────────┘          └────────────────────┘       └─────────────────────────┘
//! ```
//!
//! # Backpressure
//!
//! Fan-out is a blocking send on each listener's bounded channel. A listener
//! that stops draining stalls the reader loop, and with it every later
//! response and notification on the session. Nothing is dropped to avoid
//! that stall; consumers must drain promptly.
//!
//! # Usage
//!
//! ```ignore
//! let session = Session::new(transport, SessionConfig::from_env());
//!
//! let banner: String = session.request("server.banner", NO_PARAMS).await?;
//!
//! let mut headers = session.listen_push("blockchain.headers.subscribe");
//! while let Some(inbound) = headers.recv().await {
//!     // ...
//! }
//!
//! session.shutdown();
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::wire::{self, Envelope, Inbound};
use crate::{AnyTransport, Atomic, RpcError, SessionConfig, Slot, Transport, TransportError};

/// Capacity of the transport error broadcast channel.
const ERROR_CHANNEL_CAPACITY: usize = 16;

type PendingMap = HashMap<u64, Waiter>;
type PushMap = HashMap<String, Vec<mpsc::Sender<Inbound>>>;

/// A caller waiting for its response, tagged with the generation of the
/// transport its request was sent on.
struct Waiter {
    generation: u64,
    tx: oneshot::Sender<Inbound>,
}

/// The transport currently installed, tagged with the generation it was
/// installed under so the reader loop can tell a replaced transport's closure
/// apart from a real failure.
#[derive(Clone, Debug)]
struct Installed {
    generation: u64,
    transport: AnyTransport,
}

/// A session owns one transport and multiplexes requests and push
/// notifications over it.
///
/// # Key invariant
///
/// Only the reader loop started by [`Session::new`] receives from the
/// transport. Requests register a waiter keyed by their ID; push listeners
/// register a channel keyed by method name.
pub struct Session {
    transport: Atomic<Slot<Installed>>,

    /// Pending response waiters: request ID -> oneshot sender.
    pending: Atomic<PendingMap>,

    /// Push listeners in registration order: method -> senders.
    push: Atomic<PushMap>,

    next_id: AtomicU64,
    next_generation: AtomicU64,

    closing: AtomicBool,
    shutdown: CancellationToken,

    errors: broadcast::Sender<TransportError>,

    config: SessionConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("is_shutdown", &self.is_shutdown())
            .field("pending", &self.pending.get(|p| p.len()))
            .field("push_methods", &self.push.get(|p| p.len()))
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a session over `transport` and start its reader loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<T: Transport>(transport: T, config: SessionConfig) -> Arc<Self> {
        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        let session = Arc::new(Self {
            transport: Atomic::new(Slot::Set(Installed {
                generation: 0,
                transport: AnyTransport::new(transport),
            })),
            pending: Atomic::default(),
            push: Atomic::default(),
            next_id: AtomicU64::new(0),
            next_generation: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            errors,
            config,
        });

        tokio::spawn(session.clone().run());
        session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Allocate the next request ID. IDs start at 1 and are never reused.
    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn current(&self) -> Option<Installed> {
        self.transport.get(|slot| slot.value().cloned())
    }

    fn current_generation(&self) -> Option<u64> {
        self.transport.get(|slot| slot.value().map(|i| i.generation))
    }

    /// Whether a transport is installed.
    pub fn has_transport(&self) -> bool {
        !self.transport.is_vacant()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once the session has shut down.
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    /// Subscribe to fatal transport errors.
    ///
    /// Every error that tears the session down is broadcast here before the
    /// shutdown runs. Observers that fall behind see `Lagged`.
    pub fn transport_errors(&self) -> broadcast::Receiver<TransportError> {
        self.errors.subscribe()
    }

    /// IDs of requests waiting for a response, sorted (for diagnostics).
    pub fn pending_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.pending.get(|p| p.keys().copied().collect());
        ids.sort_unstable();
        ids
    }

    /// Methods with at least one push listener, sorted (for diagnostics).
    pub fn push_methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.push.get(|p| p.keys().cloned().collect());
        methods.sort_unstable();
        methods
    }

    /// Number of listeners registered for `method`.
    pub fn listener_count(&self, method: &str) -> usize {
        self.push.get(|p| p.get(method).map_or(0, Vec::len))
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Send a request and decode the `result` member of its response.
    ///
    /// Use `serde::de::IgnoredAny` as `R` when the result does not matter.
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let payload = self.call(method, &params, None).await?;
        wire::decode_result(&payload)
    }

    /// Send a request and return the raw response object.
    pub async fn request_raw<P: Serialize>(
        &self,
        method: &str,
        params: P,
    ) -> Result<Bytes, RpcError> {
        self.call(method, &params, None).await
    }

    /// Like [`Session::request`], but also gives up with
    /// [`RpcError::Cancelled`] when `cancel` fires.
    pub async fn request_cancellable<P, R>(
        &self,
        method: &str,
        params: P,
        cancel: &CancellationToken,
    ) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let payload = self.call(method, &params, Some(cancel)).await?;
        wire::decode_result(&payload)
    }

    /// Register a waiter for `id` against transport `generation`.
    ///
    /// The shutdown check happens under the pending-map lock, so a waiter is
    /// either registered before shutdown clears the map (and then woken by
    /// it) or refused.
    fn register_pending(
        &self,
        id: u64,
        generation: u64,
    ) -> Result<oneshot::Receiver<Inbound>, RpcError> {
        let max = self.config.max_pending;
        self.pending.change(
            |pending| {
                if self.is_shutdown() {
                    return Err(RpcError::Shutdown);
                }
                if pending.len() >= max {
                    tracing::warn!(
                        pending_len = pending.len(),
                        max_pending = max,
                        "too many pending requests; refusing new request"
                    );
                    return Err(RpcError::TooManyPending { max });
                }
                Ok(())
            },
            |pending| {
                let (tx, rx) = oneshot::channel();
                pending.insert(id, Waiter { generation, tx });
                tracing::trace!(id, generation, pending_len = pending.len(), "registered pending waiter");
                rx
            },
        )
    }

    async fn call<P: Serialize>(
        &self,
        method: &str,
        params: &P,
        cancel: Option<&CancellationToken>,
    ) -> Result<Bytes, RpcError> {
        struct PendingGuard<'a> {
            session: &'a Session,
            id: u64,
        }

        impl Drop for PendingGuard<'_> {
            fn drop(&mut self) {
                let id = self.id;
                if self.session.pending.update(|p| p.remove(&id)).is_some() {
                    tracing::trace!(id, "removed pending waiter");
                }
            }
        }

        if self.is_shutdown() {
            return Err(RpcError::Shutdown);
        }

        let id = self.next_id();
        let message = wire::encode_request(id, method, params)?;
        let installed = self.current().ok_or(RpcError::Shutdown)?;

        // Register before sending so a fast response always finds its waiter.
        let rx = self.register_pending(id, installed.generation)?;
        let _guard = PendingGuard { session: self, id };

        // One deadline covers both the send and the wait for the response.
        let timeout = self.config.request_timeout;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let cancelled = async move {
            match cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(cancelled);

        let sent = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(RpcError::Shutdown),
            _ = &mut cancelled => {
                tracing::debug!(id, method, "request cancelled before it was sent");
                return Err(RpcError::Cancelled);
            }
            _ = &mut deadline => {
                tracing::warn!(
                    id,
                    method,
                    timeout_ms = timeout.as_millis() as u64,
                    "request timed out waiting to be sent"
                );
                return Err(RpcError::Timeout);
            }
            sent = installed.transport.send_message(message) => sent,
        };
        if let Err(e) = sent {
            if self.is_shutdown() {
                return Err(RpcError::Shutdown);
            }
            if self.current_generation() != Some(installed.generation) {
                tracing::debug!(id, method, error = %e, "send failed on a replaced transport");
                return Err(RpcError::TransportReplaced);
            }
            tracing::error!(id, method, error = %e, "send failed; shutting down session");
            self.fail(e.clone());
            return Err(RpcError::Transport(e));
        }

        tracing::debug!(id, method, "request sent");

        let inbound = tokio::select! {
            biased;
            delivered = rx => match delivered {
                Ok(inbound) => inbound,
                // The sender was dropped without a response: either shutdown or
                // a transport replacement cleared the pending entry.
                Err(_) if self.is_shutdown() => return Err(RpcError::Shutdown),
                Err(_) => return Err(RpcError::TransportReplaced),
            },
            _ = self.shutdown.cancelled() => return Err(RpcError::Shutdown),
            _ = &mut cancelled => {
                tracing::debug!(id, method, "request cancelled");
                return Err(RpcError::Cancelled);
            }
            _ = &mut deadline => {
                tracing::warn!(
                    id,
                    method,
                    timeout_ms = timeout.as_millis() as u64,
                    "request timed out waiting for response"
                );
                return Err(RpcError::Timeout);
            }
        };

        tracing::debug!(id, method, failed = inbound.error.is_some(), "response received");
        inbound.into_result()
    }

    // ========================================================================
    // Push notifications
    // ========================================================================

    /// Register a listener for server notifications of `method`.
    ///
    /// Every listener for a method receives every notification for it, in
    /// registration order. The returned channel ends when the session shuts
    /// down; on an already shut down session it ends immediately.
    pub fn listen_push(&self, method: &str) -> mpsc::Receiver<Inbound> {
        let (tx, rx) = mpsc::channel(self.config.push_capacity.max(1));
        let registered = self.push.update(move |push| {
            if self.is_shutdown() {
                return false;
            }
            push.entry(method.to_owned()).or_default().push(tx);
            true
        });
        tracing::debug!(method, registered, "push listener registered");
        rx
    }

    /// Drop listeners for `method` whose receivers are gone. Returns how many
    /// were removed.
    pub fn prune_push(&self, method: &str) -> usize {
        let removed = self.push.update(|push| {
            let Some(listeners) = push.get_mut(method) else {
                return 0;
            };
            let before = listeners.len();
            listeners.retain(|tx| !tx.is_closed());
            let removed = before - listeners.len();
            if listeners.is_empty() {
                push.remove(method);
            }
            removed
        });
        tracing::debug!(method, removed, "pruned push listeners");
        removed
    }

    // ========================================================================
    // Reader loop
    // ========================================================================

    async fn run(self: Arc<Self>) {
        tracing::debug!("session reader loop started");
        loop {
            if self.is_shutdown() {
                break;
            }
            if self.transport.is_vacant() {
                tracing::debug!("no transport installed; reader loop exiting");
                break;
            }
            let Some(installed) = self.current() else {
                break;
            };

            let received = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                received = installed.transport.recv_message() => received,
            };

            match received {
                Ok(message) => {
                    tokio::select! {
                        biased;
                        _ = self.shutdown.cancelled() => break,
                        _ = self.dispatch(message) => {}
                    }
                }
                Err(e) if self.current_generation() != Some(installed.generation) => {
                    tracing::debug!(
                        generation = installed.generation,
                        error = %e,
                        "previous transport ended after replacement"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "transport failed; shutting down session");
                    self.fail(e);
                    break;
                }
            }
        }
        tracing::debug!("session reader loop exited");
    }

    /// Route one inbound message.
    async fn dispatch(&self, message: Bytes) {
        let envelope = match Envelope::decode(&message) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    len = message.len(),
                    "dropping undecodable message: no caller can be identified"
                );
                return;
            }
        };

        let push_method = envelope.push_method().map(str::to_owned);
        let id = envelope.id;
        let inbound = Inbound {
            payload: message,
            error: envelope.error,
        };

        match push_method {
            Some(method) => self.fan_out(&method, inbound).await,
            None => match id {
                Some(id) => self.complete(id, inbound),
                None => tracing::warn!(
                    payload = %String::from_utf8_lossy(&inbound.payload),
                    "dropping message with neither id nor method"
                ),
            },
        }
    }

    /// Deliver a notification to every listener of `method`, in order.
    ///
    /// The listener list is copied out under the lock; the sends happen
    /// without holding it, so a slow listener never blocks registration.
    async fn fan_out(&self, method: &str, inbound: Inbound) {
        let listeners = self.push.get(|push| push.get(method).cloned());
        let Some(listeners) = listeners.filter(|l| !l.is_empty()) else {
            tracing::warn!(
                method,
                payload = %String::from_utf8_lossy(&inbound.payload),
                "no listener for notification; dropping"
            );
            return;
        };

        tracing::trace!(method, listeners = listeners.len(), "fanning out notification");
        for (index, listener) in listeners.iter().enumerate() {
            if listener.send(inbound.clone()).await.is_err() {
                tracing::trace!(method, index, "push listener receiver dropped");
            }
        }
    }

    /// Hand a response to the caller waiting on `id`.
    fn complete(&self, id: u64, inbound: Inbound) {
        let waiter = self.pending.update(|pending| pending.remove(&id));
        match waiter {
            Some(waiter) => {
                if waiter.tx.send(inbound).is_err() {
                    tracing::debug!(id, "waiter gave up before its response arrived");
                }
            }
            None => tracing::warn!(
                id,
                payload = %String::from_utf8_lossy(&inbound.payload),
                "unexpected response: no pending request with this id"
            ),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Report a fatal transport error and shut down.
    fn fail(&self, error: TransportError) {
        // No receivers is fine: nobody is observing.
        let _ = self.errors.send(error);
        self.shutdown();
    }

    /// Shut the session down. Idempotent.
    ///
    /// Signals shutdown, closes and releases the transport, and clears both
    /// routing tables. Waiting callers return [`RpcError::Shutdown`]; push
    /// listener channels end.
    pub fn shutdown(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();

        if let Slot::Set(installed) = self.transport.reset() {
            installed.transport.close();
        }
        let pending = self.pending.reset();
        let push = self.push.reset();

        tracing::info!(
            pending = pending.len(),
            push_methods = push.len(),
            "session shut down"
        );
    }

    /// Install a new transport in place of the current one.
    ///
    /// This is the reconnect hook: the previous transport is closed, requests
    /// in flight on it fail with [`RpcError::TransportReplaced`], and push
    /// listeners stay registered. Server-side subscriptions do not survive a
    /// new connection; the owner re-establishes them afterwards (see
    /// `ScripthashSubscription::resubscribe` in the client crate).
    pub fn replace_transport<T: Transport>(&self, transport: T) -> Result<(), RpcError> {
        let transport = AnyTransport::new(transport);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;

        let installed = Installed {
            generation,
            transport: transport.clone(),
        };
        let previous = self.transport.change(
            |_| {
                if self.is_shutdown() {
                    return Err(RpcError::Shutdown);
                }
                Ok(())
            },
            |slot| std::mem::replace(slot, Slot::Set(installed)),
        );

        let previous = match previous {
            Ok(previous) => previous,
            Err(e) => {
                transport.close();
                return Err(e);
            }
        };

        if let Slot::Set(old) = previous {
            old.transport.close();
        }
        // Waiters registered against the new transport keep their entries.
        let orphaned = self.pending.update(|pending| {
            let before = pending.len();
            pending.retain(|_, waiter| waiter.generation >= generation);
            before - pending.len()
        });

        tracing::info!(generation, orphaned, "transport replaced");
        Ok(())
    }
}
