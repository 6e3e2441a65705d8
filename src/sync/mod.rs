//! Session and live-sync gateway over the identity provider and document store
//!
//! The gateway owns the signed-in principal and turns the document store's
//! live query into a [`Subscription`]: a stream of full collection snapshots
//! that ends when the subscription is dropped or the session is torn down.
//! Id tokens are refreshed shortly before they expire, and again whenever the
//! store rejects one, so a session outlives any single token.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{error, info, warn};

use crate::inventory::{default_records, Inventory, InventoryRecord};
use crate::request::{InventoryWriter, WriteError};
use crate::store::{BackendError, Credential, DocumentStore, IdentityProvider, SignInMethod, SnapshotStream};

/// Snapshots buffered per subscription before the pump waits on the consumer
const SUBSCRIPTION_BUFFER: usize = 16;

/// The signed-in principal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub user_id: String,
    pub method: SignInMethod,
    pub signed_in_at: DateTime<Utc>,
    #[serde(skip)]
    credential: Credential,
}

impl Session {
    fn new(credential: Credential) -> Self {
        Self {
            user_id: credential.user_id.clone(),
            method: credential.method,
            signed_in_at: Utc::now(),
            credential,
        }
    }
}

/// Sign-in / sign-out failures
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Identity provider rejected the sign-in: {0}")]
    Rejected(#[source] BackendError),

    #[error("Sign-out failed: {0}")]
    SignOut(#[source] BackendError),
}

/// Live-query failures
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Sync channel failed: {0}")]
    Channel(#[from] BackendError),
}

/// The current session plus the means to renew its id token.
/// Shared between the gateway and its subscription pumps.
#[derive(Clone)]
struct Credentials {
    identity: Arc<dyn IdentityProvider>,
    auth_tx: Arc<watch::Sender<Option<Session>>>,
    refreshing: Arc<tokio::sync::Mutex<()>>,
}

impl Credentials {
    fn current(&self) -> Option<Credential> {
        self.auth_tx.borrow().as_ref().map(|s| s.credential.clone())
    }

    /// Current credential, renewed first when its id token is about to expire
    async fn fresh(&self) -> Result<Credential, BackendError> {
        let credential = self.current().ok_or_else(signed_out)?;
        if credential.needs_refresh(Utc::now()) {
            return self.refresh(&credential).await;
        }
        Ok(credential)
    }

    /// Replace `stale` with a new id token. Callers racing on the same stale
    /// token share one exchange.
    async fn refresh(&self, stale: &Credential) -> Result<Credential, BackendError> {
        let _exchange = self.refreshing.lock().await;

        let current = self.current().ok_or_else(signed_out)?;
        if current.id_token != stale.id_token {
            return Ok(current);
        }

        let refreshed = self.identity.refresh(&current).await.map_err(|e| {
            warn!(user_id = %current.user_id, error = %e, "Id token refresh failed");
            e
        })?;

        // Same principal, so auth listeners are not woken
        let mut stored = false;
        self.auth_tx.send_if_modified(|session| {
            if let Some(session) = session {
                if session.credential.id_token == stale.id_token {
                    session.credential = refreshed.clone();
                    stored = true;
                }
            }
            false
        });
        if !stored {
            return Err(signed_out());
        }

        info!(user_id = %refreshed.user_id, expires_at = ?refreshed.expires_at, "Id token refreshed");
        Ok(refreshed)
    }
}

fn signed_out() -> BackendError {
    BackendError::Unauthenticated("signed out".to_string())
}

pub struct SyncGateway {
    documents: Arc<dyn DocumentStore>,
    collection: String,
    credentials: Credentials,
    subscriptions: Mutex<Vec<AbortHandle>>,
}

impl SyncGateway {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
    ) -> Self {
        let (auth_tx, _) = watch::channel(None);
        Self {
            documents,
            collection: collection.into(),
            credentials: Credentials {
                identity,
                auth_tx: Arc::new(auth_tx),
                refreshing: Arc::new(tokio::sync::Mutex::new(())),
            },
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Current session, if any
    pub fn session(&self) -> Option<Session> {
        self.credentials.auth_tx.borrow().clone()
    }

    /// Auth-state changes; the current value is available immediately.
    /// Token refreshes do not count as changes.
    pub fn auth_state(&self) -> watch::Receiver<Option<Session>> {
        self.credentials.auth_tx.subscribe()
    }

    /// Establish a session, anonymous unless a custom token is supplied
    pub async fn sign_in(&self, token: Option<&str>) -> Result<Session, AuthError> {
        let identity = &self.credentials.identity;
        let credential = match token {
            Some(token) => identity.sign_in_with_custom_token(token).await,
            None => identity.sign_in_anonymously().await,
        }
        .map_err(|e| {
            error!(error = %e, "Login failed");
            AuthError::Rejected(e)
        })?;

        let session = Session::new(credential);
        info!(user_id = %session.user_id, method = ?session.method, "Session established");
        self.credentials.auth_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    /// Tear down the session and every live subscription
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let cancelled = {
            let mut subscriptions = self.subscriptions.lock();
            let n = subscriptions.len();
            for handle in subscriptions.drain(..) {
                handle.abort();
            }
            n
        };

        let Some(session) = self.credentials.auth_tx.send_replace(None) else {
            return Ok(());
        };

        info!(user_id = %session.user_id, cancelled, "Signing out");
        self.credentials
            .identity
            .sign_out(&session.credential)
            .await
            .map_err(|e| {
                error!(user_id = %session.user_id, error = %e, "Logout failed");
                AuthError::SignOut(e)
            })
    }

    /// Subscribe to the hospital collection.
    ///
    /// Fails if there is no session or the first snapshot cannot be read.
    /// An empty snapshot triggers one write of the default dataset per
    /// subscription.
    pub async fn subscribe(&self) -> Result<Subscription, SyncError> {
        let session = self.session().ok_or(SyncError::NotSignedIn)?;
        let mut credential = self.credentials.fresh().await?;

        let mut live = self.documents.watch(&credential, &self.collection).await?;
        let first = match live.next().await {
            Some(Ok(records)) => records,
            Some(Err(e)) => {
                error!(collection = %self.collection, error = %e, "Snapshot listener failed");
                return Err(SyncError::Channel(e));
            }
            None => {
                return Err(SyncError::Channel(BackendError::Decode(
                    "live query closed before the first snapshot".to_string(),
                )))
            }
        };

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let credentials = self.credentials.clone();
        let documents = self.documents.clone();
        let collection = self.collection.clone();

        let task = tokio::spawn(async move {
            let mut seeded = false;
            let mut reauthenticated = false;
            let mut pending = Some(first);

            loop {
                let records = match pending.take() {
                    Some(records) => records,
                    None => match live.next().await {
                        Some(Ok(records)) => records,
                        // One renewal per rejection; a fresh token rejected again is fatal
                        Some(Err(BackendError::Unauthenticated(reason))) if !reauthenticated => {
                            reauthenticated = true;
                            warn!(collection = %collection, reason = %reason, "Snapshot listener lost its credential, renewing");
                            match reopen(&credentials, documents.as_ref(), &credential, &collection).await {
                                Ok((renewed, reopened)) => {
                                    credential = renewed;
                                    live = reopened;
                                    continue;
                                }
                                Err(e) => {
                                    error!(collection = %collection, error = %e, "Snapshot listener failed");
                                    let _ = tx.send(Err(SyncError::Channel(e))).await;
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!(collection = %collection, error = %e, "Snapshot listener failed");
                            let _ = tx.send(Err(SyncError::Channel(e))).await;
                            break;
                        }
                        None => break,
                    },
                };
                reauthenticated = false;

                let empty = records.is_empty();
                if tx.send(Ok(records)).await.is_err() {
                    break;
                }

                if empty && !seeded {
                    seeded = true;
                    seed_defaults(documents.as_ref(), &credential, &collection).await;
                }
            }
        });

        let handle = task.abort_handle();
        {
            let mut subscriptions = self.subscriptions.lock();
            subscriptions.retain(|h| !h.is_finished());
            subscriptions.push(handle.clone());
        }

        info!(collection = %self.collection, user_id = %session.user_id, "Subscribed to hospital inventory");
        Ok(Subscription { rx, handle })
    }
}

/// Renew the credential and restart the live query with it
async fn reopen(
    credentials: &Credentials,
    documents: &dyn DocumentStore,
    stale: &Credential,
    collection: &str,
) -> Result<(Credential, SnapshotStream), BackendError> {
    let renewed = credentials.refresh(stale).await?;
    let live = documents.watch(&renewed, collection).await?;
    Ok((renewed, live))
}

#[async_trait]
impl InventoryWriter for SyncGateway {
    async fn write_inventory(&self, record_id: &str, inventory: &Inventory) -> Result<(), WriteError> {
        if self.session().is_none() {
            return Err(WriteError::NotSignedIn);
        }

        let collection = &self.collection;
        let result = match self.credentials.fresh().await {
            Ok(credential) => match self
                .documents
                .update_inventory(&credential, collection, record_id, inventory)
                .await
            {
                Err(BackendError::Unauthenticated(reason)) => {
                    warn!(record_id = %record_id, reason = %reason, "Write rejected the id token, renewing and retrying");
                    match self.credentials.refresh(&credential).await {
                        Ok(renewed) => {
                            self.documents
                                .update_inventory(&renewed, collection, record_id, inventory)
                                .await
                        }
                        Err(e) => Err(e),
                    }
                }
                other => other,
            },
            Err(e) => Err(e),
        };

        result.map_err(|e| {
            error!(record_id = %record_id, error = %e, "Error updating inventory");
            WriteError::Backend(e)
        })
    }
}

async fn seed_defaults(documents: &dyn DocumentStore, credential: &Credential, collection: &str) {
    info!(collection = %collection, "Collection empty, writing default hospitals");
    for record in default_records() {
        if let Err(e) = documents.set(credential, collection, &record).await {
            warn!(collection = %collection, id = %record.id, error = %e, "Failed to seed record");
        }
    }
}

/// Stream of collection snapshots. Dropping it unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<Result<Vec<InventoryRecord>, SyncError>>,
    handle: AbortHandle,
}

impl Subscription {
    /// Next snapshot; `None` once the subscription has ended
    pub async fn next_snapshot(&mut self) -> Option<Result<Vec<InventoryRecord>, SyncError>> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Result<Vec<InventoryRecord>, SyncError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
