//! Subscription flows built on the session's push routing.
//!
//! Each flow issues its subscribe request, then spawns a forwarder that turns
//! the raw push notifications for its method into typed values on a bounded
//! channel. A forwarder stops when the session shuts down or when its
//! receiver is dropped, and then prunes its push listener.

use std::collections::HashMap;
use std::sync::Arc;

use electrum_core::{Atomic, Inbound, RpcError, Session, NO_PARAMS};
use futures_util::future::join_all;
use serde::de::IgnoredAny;
use tokio::sync::mpsc;

use crate::types::{HeaderNotification, MasternodeStatus, ScripthashNotification};
use crate::Client;

pub const HEADERS_SUBSCRIBE: &str = "blockchain.headers.subscribe";
pub const MASTERNODE_SUBSCRIBE: &str = "blockchain.masternode.subscribe";
pub const SCRIPTHASH_SUBSCRIBE: &str = "blockchain.scripthash.subscribe";
pub const SCRIPTHASH_UNSUBSCRIBE: &str = "blockchain.scripthash.unsubscribe";

/// Send `initial`, then pump decoded notifications from `pushes` into `out`
/// until either side ends.
async fn forward<T>(
    method: &'static str,
    initial: Option<T>,
    mut pushes: mpsc::Receiver<Inbound>,
    out: &mpsc::Sender<T>,
    mut decode: impl FnMut(&Inbound) -> Option<T>,
) {
    if let Some(initial) = initial {
        if out.send(initial).await.is_err() {
            return;
        }
    }

    loop {
        let inbound = tokio::select! {
            _ = out.closed() => {
                tracing::debug!(method, "subscriber dropped; forwarder stopping");
                break;
            }
            next = pushes.recv() => match next {
                Some(inbound) => inbound,
                None => {
                    tracing::debug!(method, "push stream ended; forwarder stopping");
                    break;
                }
            },
        };

        let Some(item) = decode(&inbound) else {
            continue;
        };
        if out.send(item).await.is_err() {
            break;
        }
    }
}

fn output_channel<T>(session: &Session) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(session.config().notification_capacity.max(1))
}

impl Client {
    /// Follow the chain tip.
    ///
    /// The current tip is the first item on the channel; every later item is
    /// a new tip announced by the server.
    pub async fn subscribe_headers(&self) -> Result<mpsc::Receiver<HeaderNotification>, RpcError> {
        let initial: HeaderNotification = self
            .session
            .request(HEADERS_SUBSCRIBE, NO_PARAMS)
            .await?;
        let pushes = self.session.listen_push(HEADERS_SUBSCRIBE);
        let (tx, rx) = output_channel(&self.session);

        let session = self.session.clone();
        tokio::spawn(async move {
            forward(HEADERS_SUBSCRIBE, Some(initial), pushes, &tx, |inbound| {
                match inbound.decode_params::<Vec<HeaderNotification>>() {
                    Ok(headers) => {
                        let first = headers.into_iter().next();
                        if first.is_none() {
                            tracing::warn!("header notification without params; dropping");
                        }
                        first
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable header notification; dropping");
                        None
                    }
                }
            })
            .await;
            session.prune_push(HEADERS_SUBSCRIBE);
        });

        Ok(rx)
    }

    /// Follow the status of one masternode collateral.
    ///
    /// The status returned by the subscribe call comes first; later items are
    /// the server's updates for this collateral.
    pub async fn subscribe_masternode(
        &self,
        collateral: &str,
    ) -> Result<mpsc::Receiver<MasternodeStatus>, RpcError> {
        let status: String = self
            .session
            .request(MASTERNODE_SUBSCRIBE, [collateral])
            .await?;
        let pushes = self.session.listen_push(MASTERNODE_SUBSCRIBE);
        let (tx, rx) = output_channel(&self.session);

        let session = self.session.clone();
        let collateral = collateral.to_owned();
        tokio::spawn(async move {
            let initial = MasternodeStatus {
                collateral: collateral.clone(),
                status,
            };
            forward(MASTERNODE_SUBSCRIBE, Some(initial), pushes, &tx, |inbound| {
                match inbound.decode_params::<(String, String)>() {
                    Ok((subject, status)) if subject == collateral => Some(MasternodeStatus {
                        collateral: subject,
                        status,
                    }),
                    Ok((subject, _)) => {
                        tracing::trace!(%subject, "masternode update for another collateral");
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "undecodable masternode notification; dropping");
                        None
                    }
                }
            })
            .await;
            session.prune_push(MASTERNODE_SUBSCRIBE);
        });

        Ok(rx)
    }

    /// Create a script hash subscription manager and the channel its status
    /// changes arrive on.
    pub fn subscribe_scripthash(
        &self,
    ) -> (
        ScripthashSubscription,
        mpsc::Receiver<ScripthashNotification>,
    ) {
        ScripthashSubscription::new(self.session.clone())
    }
}

/// Both directions of the script hash <-> address table.
///
/// Kept a bijection: every script hash maps to one address and back.
#[derive(Debug, Default)]
struct Registry {
    by_scripthash: HashMap<String, String>,
    by_address: HashMap<String, String>,
}

impl Registry {
    fn insert(&mut self, scripthash: String, address: String) {
        if let Some(old_address) = self.by_scripthash.remove(&scripthash) {
            self.by_address.remove(&old_address);
        }
        if let Some(old_scripthash) = self.by_address.remove(&address) {
            self.by_scripthash.remove(&old_scripthash);
        }
        self.by_address.insert(address.clone(), scripthash.clone());
        self.by_scripthash.insert(scripthash, address);
    }

    fn remove(&mut self, scripthash: &str) -> Option<String> {
        let address = self.by_scripthash.remove(scripthash)?;
        self.by_address.remove(&address);
        Some(address)
    }
}

/// Tracks the script hashes subscribed on one session and labels their status
/// notifications with the address each belongs to.
///
/// Clones share the same table and output channel.
#[derive(Clone)]
pub struct ScripthashSubscription {
    session: Arc<Session>,
    registry: Arc<Atomic<Registry>>,
    out: mpsc::Sender<ScripthashNotification>,
}

impl std::fmt::Debug for ScripthashSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScripthashSubscription")
            .field("tracked", &self.registry.get(|r| r.by_scripthash.len()))
            .finish_non_exhaustive()
    }
}

impl ScripthashSubscription {
    /// Must be called from within a Tokio runtime: the notification
    /// forwarder starts here.
    pub fn new(session: Arc<Session>) -> (Self, mpsc::Receiver<ScripthashNotification>) {
        let registry: Arc<Atomic<Registry>> = Arc::default();
        let (out, rx) = output_channel(&session);
        let pushes = session.listen_push(SCRIPTHASH_SUBSCRIBE);

        {
            let session = session.clone();
            let registry = registry.clone();
            let out = out.clone();
            tokio::spawn(async move {
                forward(SCRIPTHASH_SUBSCRIBE, None, pushes, &out, |inbound| {
                    let (scripthash, status) =
                        match inbound.decode_params::<(String, Option<String>)>() {
                            Ok(params) => params,
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    "undecodable script hash notification; dropping"
                                );
                                return None;
                            }
                        };
                    let Some(address) =
                        registry.get(|r| r.by_scripthash.get(&scripthash).cloned())
                    else {
                        tracing::warn!(%scripthash, "notification for untracked script hash; dropping");
                        return None;
                    };
                    Some(ScripthashNotification {
                        scripthash,
                        address,
                        status,
                    })
                })
                .await;
                session.prune_push(SCRIPTHASH_SUBSCRIBE);
            });
        }

        (
            Self {
                session,
                registry,
                out,
            },
            rx,
        )
    }

    async fn emit(&self, notification: ScripthashNotification) {
        if self.out.send(notification).await.is_err() {
            tracing::debug!("script hash notification receiver dropped");
        }
    }

    /// Subscribe to `scripthash` and track it under `address`.
    ///
    /// The status returned by the server is pushed onto the notification
    /// channel. Re-adding a tracked script hash moves it to the new address.
    pub async fn add(&self, scripthash: &str, address: &str) -> Result<(), RpcError> {
        let status: Option<String> = self
            .session
            .request(SCRIPTHASH_SUBSCRIBE, [scripthash])
            .await?;

        self.registry
            .update(|r| r.insert(scripthash.to_owned(), address.to_owned()));
        tracing::debug!(scripthash, address, "script hash subscribed");

        self.emit(ScripthashNotification {
            scripthash: scripthash.to_owned(),
            address: address.to_owned(),
            status,
        })
        .await;
        Ok(())
    }

    /// Unsubscribe from `scripthash` and forget it.
    ///
    /// If the unsubscribe call fails the script hash stays tracked.
    pub async fn remove(&self, scripthash: &str) -> Result<(), RpcError> {
        if !self.registry.get(|r| r.by_scripthash.contains_key(scripthash)) {
            return Err(RpcError::NotSubscribed(scripthash.to_owned()));
        }

        self.session
            .request::<_, IgnoredAny>(SCRIPTHASH_UNSUBSCRIBE, [scripthash])
            .await?;

        let address = self.registry.update(|r| r.remove(scripthash));
        tracing::debug!(scripthash, ?address, "script hash unsubscribed");
        Ok(())
    }

    /// Unsubscribe from the script hash tracked under `address`.
    pub async fn remove_address(&self, address: &str) -> Result<(), RpcError> {
        let scripthash = self.scripthash(address)?;
        self.remove(&scripthash).await
    }

    /// Address a tracked script hash belongs to.
    pub fn address(&self, scripthash: &str) -> Result<String, RpcError> {
        self.registry
            .get(|r| r.by_scripthash.get(scripthash).cloned())
            .ok_or_else(|| RpcError::NotSubscribed(scripthash.to_owned()))
    }

    /// Script hash tracked under `address`.
    pub fn scripthash(&self, address: &str) -> Result<String, RpcError> {
        self.registry
            .get(|r| r.by_address.get(address).cloned())
            .ok_or_else(|| RpcError::NotSubscribed(address.to_owned()))
    }

    /// Every tracked script hash, sorted.
    pub fn scripthashes(&self) -> Vec<String> {
        let mut tracked: Vec<String> = self.registry.get(|r| r.by_scripthash.keys().cloned().collect());
        tracked.sort_unstable();
        tracked
    }

    /// Subscribe again to every tracked script hash, after a reconnect.
    ///
    /// Every subscription is attempted; the fresh statuses go onto the
    /// notification channel, and all failures are reported together.
    pub async fn resubscribe(&self) -> Result<(), RpcError> {
        let tracked: Vec<(String, String)> = self.registry.get(|r| {
            r.by_scripthash
                .iter()
                .map(|(scripthash, address)| (scripthash.clone(), address.clone()))
                .collect()
        });
        let total = tracked.len();

        let attempts = tracked.into_iter().map(|(scripthash, address)| async move {
            let result = self
                .session
                .request::<_, Option<String>>(SCRIPTHASH_SUBSCRIBE, [scripthash.as_str()])
                .await;
            (scripthash, address, result)
        });

        let mut failures = Vec::new();
        for (scripthash, address, result) in join_all(attempts).await {
            match result {
                Ok(status) => {
                    self.emit(ScripthashNotification {
                        scripthash,
                        address,
                        status,
                    })
                    .await
                }
                Err(e) => {
                    tracing::warn!(%scripthash, error = %e, "resubscribe failed");
                    failures.push((scripthash, e));
                }
            }
        }

        if failures.is_empty() {
            tracing::info!(total, "script hashes resubscribed");
            return Ok(());
        }
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        Err(RpcError::Resubscribe(failures))
    }
}
