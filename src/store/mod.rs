//! Backend ports and their adapters (Firebase REST, in-memory)

pub mod codec;
pub mod firestore;
pub mod identity;
pub mod memory;
pub mod token;

pub use firestore::FirestoreClient;
pub use identity::IdentityToolkitClient;
pub use memory::MemoryBackend;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::BoxStream;

use crate::inventory::{Inventory, InventoryRecord};

/// Id tokens are refreshed this long before they expire
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// Live view of a collection: the full record list each time it changes
pub type SnapshotStream = BoxStream<'static, Result<Vec<InventoryRecord>, BackendError>>;

/// How a principal signed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignInMethod {
    Anonymous,
    CustomToken,
}

/// Credential issued by the identity provider
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user_id: String,
    /// Bearer token for document store calls
    pub id_token: String,
    pub refresh_token: Option<String>,
    pub method: SignInMethod,
    /// When `id_token` stops being accepted; `None` if the provider did not say
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    /// True once the id token is within the refresh margin of its expiry
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at - Duration::seconds(REFRESH_MARGIN_SECS) <= now)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user_id", &self.user_id)
            .field("id_token", &"<redacted>")
            .field("method", &self.method)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Identity provider port
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in_anonymously(&self) -> Result<Credential, BackendError>;

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Credential, BackendError>;

    /// Exchange the refresh token for a new id token for the same user
    async fn refresh(&self, credential: &Credential) -> Result<Credential, BackendError>;

    async fn sign_out(&self, credential: &Credential) -> Result<(), BackendError>;
}

/// Document store port, addressed by collection path and document id
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or overwrite a document under `record.id`
    async fn set(
        &self,
        credential: &Credential,
        collection: &str,
        record: &InventoryRecord,
    ) -> Result<(), BackendError>;

    /// Replace the `inventory` field of an existing document, leaving other fields alone
    async fn update_inventory(
        &self,
        credential: &Credential,
        collection: &str,
        id: &str,
        inventory: &Inventory,
    ) -> Result<(), BackendError>;

    /// Live query over the whole collection. The first item is the current state.
    async fn watch(
        &self,
        credential: &Credential,
        collection: &str,
    ) -> Result<SnapshotStream, BackendError>;
}

/// Backend transport errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Credential rejected: {0}")]
    Unauthenticated(String),
}

/// Serve a stand-in HTTP backend on a local port; returns its base URL
#[cfg(test)]
pub(crate) async fn serve_mock(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential {
            user_id: "u".to_string(),
            id_token: "t".to_string(),
            refresh_token: Some("r".to_string()),
            method: SignInMethod::Anonymous,
            expires_at,
        }
    }

    #[test]
    fn refresh_is_due_inside_the_margin() {
        let now = Utc::now();
        assert!(!credential(None).needs_refresh(now));
        assert!(!credential(Some(now + Duration::hours(1))).needs_refresh(now));
        assert!(credential(Some(now + Duration::seconds(REFRESH_MARGIN_SECS - 1))).needs_refresh(now));
        assert!(credential(Some(now - Duration::seconds(1))).needs_refresh(now));
    }

    #[test]
    fn debug_hides_tokens() {
        let shown = format!("{:?}", credential(None));
        assert!(!shown.contains("\"t\""));
        assert!(shown.contains("<redacted>"));
    }
}
