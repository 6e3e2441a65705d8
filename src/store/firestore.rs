//! Cloud Firestore REST client

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::debug;

use crate::config::FirebaseSettings;
use crate::inventory::{Inventory, InventoryRecord};

use super::codec::{self, Document, ListDocumentsResponse};
use super::{BackendError, Credential, DocumentStore, SnapshotStream};

const PAGE_SIZE: &str = "300";

/// Firestore client authenticated per call with the signed-in user's id token
#[derive(Clone)]
pub struct FirestoreClient {
    client: Client,
    base_url: String,
    project_id: String,
    poll_interval: Duration,
}

impl FirestoreClient {
    pub fn new(settings: &FirebaseSettings, poll_interval: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.firestore_base_url.trim_end_matches('/').to_string(),
            project_id: settings.project_id.clone(),
            poll_interval,
        }
    }

    /// REST URL for a collection or document path
    fn documents_url(&self, path: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}",
            self.base_url, self.project_id, path
        )
    }

    fn authorized(&self, builder: RequestBuilder, credential: &Credential) -> RequestBuilder {
        builder
            .bearer_auth(&credential.id_token)
            .header("Content-Type", "application/json")
    }

    /// Fetch every page of the collection
    async fn list_all(
        &self,
        credential: &Credential,
        collection: &str,
    ) -> Result<Vec<InventoryRecord>, BackendError> {
        let url = self.documents_url(collection);
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }

            let response = self
                .authorized(self.client.get(&url), credential)
                .query(&query)
                .send()
                .await?;
            let page: ListDocumentsResponse = check(response).await?.json().await?;

            for document in &page.documents {
                records.push(codec::decode_record(document)?);
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn set(
        &self,
        credential: &Credential,
        collection: &str,
        record: &InventoryRecord,
    ) -> Result<(), BackendError> {
        let url = self.documents_url(&format!("{}/{}", collection, record.id));

        let response = self
            .authorized(self.client.patch(&url), credential)
            .json(&codec::encode_record(record))
            .send()
            .await?;
        check(response).await?;

        debug!(collection = %collection, id = %record.id, "Document written");
        Ok(())
    }

    async fn update_inventory(
        &self,
        credential: &Credential,
        collection: &str,
        id: &str,
        inventory: &Inventory,
    ) -> Result<(), BackendError> {
        let url = self.documents_url(&format!("{}/{}", collection, id));

        let mut body = Document::default();
        body.fields
            .insert("inventory".to_string(), codec::encode_inventory(inventory));

        let response = self
            .authorized(self.client.patch(&url), credential)
            .query(&[
                ("updateMask.fieldPaths", "inventory"),
                ("currentDocument.exists", "true"),
            ])
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::NotFound(id.to_string()));
        }
        check(response).await?;

        debug!(collection = %collection, id = %id, "Inventory field updated");
        Ok(())
    }

    async fn watch(
        &self,
        credential: &Credential,
        collection: &str,
    ) -> Result<SnapshotStream, BackendError> {
        let poller = Poller {
            client: self.clone(),
            credential: credential.clone(),
            collection: collection.to_string(),
            last: None,
            started: false,
        };

        // Emits only when the collection differs from the last emitted snapshot.
        let stream = stream::unfold(poller, |mut poller| async move {
            loop {
                if poller.started {
                    tokio::time::sleep(poller.client.poll_interval).await;
                }
                poller.started = true;

                match poller.client.list_all(&poller.credential, &poller.collection).await {
                    Ok(records) if poller.last.as_ref() == Some(&records) => continue,
                    Ok(records) => {
                        poller.last = Some(records.clone());
                        return Some((Ok(records), poller));
                    }
                    Err(e) => return Some((Err(e), poller)),
                }
            }
        });

        Ok(stream.boxed())
    }
}

struct Poller {
    client: FirestoreClient,
    credential: Credential,
    collection: String,
    last: Option<Vec<InventoryRecord>>,
    started: bool,
}

/// Turn a non-2xx response into an API error
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(BackendError::Unauthenticated(body));
    }
    Err(BackendError::Api {
        status: status.as_u16(),
        body,
    })
}
