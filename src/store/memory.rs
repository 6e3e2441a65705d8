//! In-memory identity provider and document store
//!
//! Used for local runs without Firebase and as the fake behind the tests.
//! Behaves like the hosted backend where callers can observe it: writes
//! require a live id token, partial updates require an existing document,
//! and every write wakes the live queries.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::inventory::{Inventory, InventoryRecord};

use super::token::{mint_custom_token, verify_custom_token, TokenError};
use super::{BackendError, Credential, DocumentStore, IdentityProvider, SignInMethod, SnapshotStream};

const CUSTOM_TOKEN_TTL_SECS: i64 = 3600;
const ID_TOKEN_TTL_SECS: i64 = 3600;

#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

struct Inner {
    token_secret: String,
    /// id token -> user id
    sessions: DashMap<String, String>,
    /// refresh token -> user id
    refresh_tokens: DashMap<String, String>,
    /// collection path -> document id -> record
    collections: DashMap<String, BTreeMap<String, InventoryRecord>>,
    /// Bumped on every write
    changes: watch::Sender<u64>,
    offline: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new(token_secret: impl Into<String>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                token_secret: token_secret.into(),
                sessions: DashMap::new(),
                refresh_tokens: DashMap::new(),
                collections: DashMap::new(),
                changes,
                offline: AtomicBool::new(false),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    /// Issue a custom token this backend will accept
    pub fn mint_token(&self, uid: &str) -> Result<String, TokenError> {
        mint_custom_token(uid, &self.inner.token_secret, CUSTOM_TOKEN_TTL_SECS)
    }

    /// Make every document call fail as if the backend were unreachable
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Make writes fail while reads keep working
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Records as stored, bypassing authentication
    pub fn records(&self, collection: &str) -> Vec<InventoryRecord> {
        self.inner
            .collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Write a record directly, as another client would
    pub fn put(&self, collection: &str, record: InventoryRecord) {
        self.inner
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
        self.notify();
    }

    /// Number of live id tokens
    pub fn active_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Invalidate every outstanding id token, as if they had all timed out.
    /// Refresh tokens stay valid.
    pub fn expire_id_tokens(&self) -> usize {
        let expired = self.inner.sessions.len();
        self.inner.sessions.clear();
        expired
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|version| *version += 1);
    }

    fn issue(&self, user_id: String, method: SignInMethod, refresh_token: Option<String>) -> Credential {
        let id_token = Uuid::new_v4().to_string();
        self.inner.sessions.insert(id_token.clone(), user_id.clone());

        let refresh_token = refresh_token.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.inner
            .refresh_tokens
            .insert(refresh_token.clone(), user_id.clone());

        Credential {
            user_id,
            id_token,
            refresh_token: Some(refresh_token),
            method,
            expires_at: Some(Utc::now() + Duration::seconds(ID_TOKEN_TTL_SECS)),
        }
    }

    fn authorize(&self, credential: &Credential) -> Result<(), BackendError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 503,
                body: "backend unavailable".to_string(),
            });
        }

        match self.inner.sessions.get(&credential.id_token) {
            Some(user) if *user == credential.user_id => Ok(()),
            _ => Err(BackendError::Unauthenticated("unknown or revoked id token".to_string())),
        }
    }

    fn authorize_write(&self, credential: &Credential) -> Result<(), BackendError> {
        self.authorize(credential)?;
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Api {
                status: 500,
                body: "write rejected".to_string(),
            });
        }
        Ok(())
    }

    fn read(&self, credential: &Credential, collection: &str) -> Result<Vec<InventoryRecord>, BackendError> {
        self.authorize(credential)?;
        Ok(self.records(collection))
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn sign_in_anonymously(&self) -> Result<Credential, BackendError> {
        let credential = self.issue(Uuid::new_v4().to_string(), SignInMethod::Anonymous, None);
        info!(user_id = %credential.user_id, "Anonymous session issued");
        Ok(credential)
    }

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Credential, BackendError> {
        let claims = verify_custom_token(token, &self.inner.token_secret)
            .map_err(|e| BackendError::Unauthenticated(e.to_string()))?;

        let credential = self.issue(claims.uid, SignInMethod::CustomToken, None);
        info!(user_id = %credential.user_id, "Custom token session issued");
        Ok(credential)
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, BackendError> {
        let refresh_token = credential
            .refresh_token
            .clone()
            .ok_or_else(|| BackendError::Unauthenticated("no refresh token".to_string()))?;

        match self.inner.refresh_tokens.get(&refresh_token) {
            Some(user) if *user == credential.user_id => {}
            _ => return Err(BackendError::Unauthenticated("unknown refresh token".to_string())),
        }

        self.inner.sessions.remove(&credential.id_token);
        let refreshed = self.issue(credential.user_id.clone(), credential.method, Some(refresh_token));
        debug!(user_id = %refreshed.user_id, "Id token refreshed");
        Ok(refreshed)
    }

    async fn sign_out(&self, credential: &Credential) -> Result<(), BackendError> {
        self.inner.sessions.remove(&credential.id_token);
        if let Some(refresh_token) = &credential.refresh_token {
            self.inner.refresh_tokens.remove(refresh_token);
        }
        debug!(user_id = %credential.user_id, "Session revoked");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn set(
        &self,
        credential: &Credential,
        collection: &str,
        record: &InventoryRecord,
    ) -> Result<(), BackendError> {
        self.authorize_write(credential)?;
        self.put(collection, record.clone());
        Ok(())
    }

    async fn update_inventory(
        &self,
        credential: &Credential,
        collection: &str,
        id: &str,
        inventory: &Inventory,
    ) -> Result<(), BackendError> {
        self.authorize_write(credential)?;

        {
            let mut docs = self
                .inner
                .collections
                .get_mut(collection)
                .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
            let record = docs
                .get_mut(id)
                .ok_or_else(|| BackendError::NotFound(id.to_string()))?;
            record.inventory = inventory.clone();
        }

        self.notify();
        Ok(())
    }

    async fn watch(
        &self,
        credential: &Credential,
        collection: &str,
    ) -> Result<SnapshotStream, BackendError> {
        self.authorize(credential)?;

        let state = WatchState {
            backend: self.clone(),
            changes: self.inner.changes.subscribe(),
            credential: credential.clone(),
            collection: collection.to_string(),
            started: false,
        };

        let stream = stream::unfold(state, |mut state| async move {
            if state.started && state.changes.changed().await.is_err() {
                return None;
            }
            state.started = true;

            let snapshot = state.backend.read(&state.credential, &state.collection);
            Some((snapshot, state))
        });

        Ok(stream.boxed())
    }
}

struct WatchState {
    backend: MemoryBackend,
    changes: watch::Receiver<u64>,
    credential: Credential,
    collection: String,
    started: bool,
}
