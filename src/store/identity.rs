//! Firebase Identity Toolkit REST client

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::FirebaseSettings;

use super::token::decode_claims_unverified;
use super::{BackendError, Credential, IdentityProvider, SignInMethod};

/// Response shared by `accounts:signUp` and `accounts:signInWithCustomToken`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    /// Seconds, as a decimal string
    #[serde(default)]
    expires_in: Option<String>,
    /// Present for anonymous sign-up; custom-token sign-in omits it
    #[serde(default)]
    local_id: Option<String>,
}

/// Secure Token `token` endpoint response (snake_case, unlike the accounts API)
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Clone)]
pub struct IdentityToolkitClient {
    client: Client,
    base_url: String,
    secure_token_url: String,
    api_key: String,
}

impl IdentityToolkitClient {
    pub fn new(settings: &FirebaseSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.identity_base_url.trim_end_matches('/').to_string(),
            secure_token_url: settings.secure_token_base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        }
    }

    fn accounts_url(&self, method: &str) -> String {
        format!("{}/v1/accounts:{}", self.base_url, method)
    }

    fn token_url(&self) -> String {
        format!("{}/v1/token", self.secure_token_url)
    }

    async fn post(&self, method: &str, body: serde_json::Value) -> Result<SignInResponse, BackendError> {
        let response = self
            .client
            .post(self.accounts_url(method))
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await?;

        Ok(check(response).await?.json().await?)
    }

    fn credential(response: SignInResponse, method: SignInMethod) -> Result<Credential, BackendError> {
        let user_id = match response.local_id {
            Some(id) => id,
            None => principal_of(&response.id_token)?,
        };

        Ok(Credential {
            user_id,
            expires_at: expiry(response.expires_in.as_deref(), Utc::now()),
            id_token: response.id_token,
            refresh_token: response.refresh_token,
            method,
        })
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    async fn sign_in_anonymously(&self) -> Result<Credential, BackendError> {
        let response = self
            .post("signUp", serde_json::json!({ "returnSecureToken": true }))
            .await?;

        let credential = Self::credential(response, SignInMethod::Anonymous)?;
        info!(user_id = %credential.user_id, "Signed in anonymously");
        Ok(credential)
    }

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Credential, BackendError> {
        let response = self
            .post(
                "signInWithCustomToken",
                serde_json::json!({ "token": token, "returnSecureToken": true }),
            )
            .await?;

        let credential = Self::credential(response, SignInMethod::CustomToken)?;
        info!(user_id = %credential.user_id, "Signed in with custom token");
        Ok(credential)
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, BackendError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| BackendError::Unauthenticated("no refresh token".to_string()))?;

        let response = self
            .client
            .post(self.token_url())
            .query(&[("key", &self.api_key)])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await?;
        let refreshed: RefreshResponse = check(response).await?.json().await?;

        if let Some(user_id) = &refreshed.user_id {
            if *user_id != credential.user_id {
                return Err(BackendError::Unauthenticated(format!(
                    "refreshed token belongs to {user_id}"
                )));
            }
        }

        debug!(user_id = %credential.user_id, "Id token refreshed");
        Ok(Credential {
            user_id: credential.user_id.clone(),
            expires_at: expiry(refreshed.expires_in.as_deref(), Utc::now()),
            id_token: refreshed.id_token,
            refresh_token: Some(refreshed.refresh_token),
            method: credential.method,
        })
    }

    async fn sign_out(&self, credential: &Credential) -> Result<(), BackendError> {
        // Tokens are bearer credentials; signing out discards them locally.
        debug!(user_id = %credential.user_id, "Discarding identity token");
        Ok(())
    }
}

/// The provider answers rejected credentials with 400 + an error code
async fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status.is_client_error() {
        return Err(BackendError::Unauthenticated(body));
    }
    Err(BackendError::Api {
        status: status.as_u16(),
        body,
    })
}

fn expiry(expires_in: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(|secs| secs.parse::<i64>().ok())
        .map(|secs| now + Duration::seconds(secs))
}

fn principal_of(id_token: &str) -> Result<String, BackendError> {
    let claims = decode_claims_unverified(id_token)
        .map_err(|e| BackendError::Decode(format!("id token: {e}")))?;
    claims
        .principal()
        .map(str::to_string)
        .ok_or_else(|| BackendError::Decode("id token carries no user id".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::serve_mock;
    use axum::{
        extract::{Form, Query},
        http::{StatusCode, Uri},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::collections::HashMap;

    fn id_token(sub: &str) -> String {
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"{sub}"}}"#));
        format!("e30.{}.sig", payload)
    }

    fn settings(base: &str) -> FirebaseSettings {
        FirebaseSettings {
            api_key: "k".to_string(),
            project_id: "p".to_string(),
            firestore_base_url: base.to_string(),
            identity_base_url: base.to_string(),
            secure_token_base_url: format!("{base}/"),
        }
    }

    /// Identity Toolkit + Secure Token stand-in for user `anon-1`
    fn provider() -> Router {
        async fn accounts(uri: Uri, Query(query): Query<HashMap<String, String>>) -> impl IntoResponse {
            if query.get("key").map(String::as_str) != Some("k") {
                return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": { "message": "API_KEY_INVALID" } })));
            }
            match uri.path() {
                "/v1/accounts:signUp" => (
                    StatusCode::OK,
                    Json(serde_json::json!({
                        "idToken": id_token("anon-1"),
                        "refreshToken": "r-1",
                        "expiresIn": "3600",
                        "localId": "anon-1"
                    })),
                ),
                _ => (StatusCode::NOT_FOUND, Json(serde_json::json!({}))),
            }
        }

        async fn token(
            Query(query): Query<HashMap<String, String>>,
            Form(form): Form<HashMap<String, String>>,
        ) -> impl IntoResponse {
            let valid = query.get("key").map(String::as_str) == Some("k")
                && form.get("grant_type").map(String::as_str) == Some("refresh_token")
                && form.get("refresh_token").map(String::as_str) == Some("r-1");
            if !valid {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": { "message": "INVALID_REFRESH_TOKEN" } })),
                );
            }
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "id_token": "refreshed-id-token",
                    "refresh_token": "r-2",
                    "expires_in": "3600",
                    "token_type": "Bearer",
                    "user_id": "anon-1"
                })),
            )
        }

        Router::new().route("/v1/token", post(token)).fallback(accounts)
    }

    #[tokio::test]
    async fn sign_up_records_expiry_and_refresh_token() {
        let base = serve_mock(provider()).await;
        let client = IdentityToolkitClient::new(&settings(&base));

        let credential = client.sign_in_anonymously().await.unwrap();
        assert_eq!(credential.user_id, "anon-1");
        assert_eq!(credential.refresh_token.as_deref(), Some("r-1"));

        let expires_at = credential.expires_at.unwrap();
        let remaining = expires_at - Utc::now();
        assert!(remaining > Duration::minutes(59) && remaining <= Duration::hours(1));
        assert!(!credential.needs_refresh(Utc::now()));
    }

    #[tokio::test]
    async fn refresh_exchanges_the_refresh_token() {
        let base = serve_mock(provider()).await;
        let client = IdentityToolkitClient::new(&settings(&base));
        let credential = client.sign_in_anonymously().await.unwrap();

        let refreshed = client.refresh(&credential).await.unwrap();
        assert_eq!(refreshed.user_id, "anon-1");
        assert_eq!(refreshed.id_token, "refreshed-id-token");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("r-2"));
        assert_eq!(refreshed.method, SignInMethod::Anonymous);
        assert!(refreshed.expires_at.is_some());

        // r-2 is unknown to the stand-in
        assert!(matches!(
            client.refresh(&refreshed).await,
            Err(BackendError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_rejected() {
        let client = IdentityToolkitClient::new(&settings("http://127.0.0.1:9"));
        let credential = Credential {
            user_id: "u".to_string(),
            id_token: "t".to_string(),
            refresh_token: None,
            method: SignInMethod::CustomToken,
            expires_at: None,
        };
        assert!(matches!(
            client.refresh(&credential).await,
            Err(BackendError::Unauthenticated(_))
        ));
    }

    #[test]
    fn custom_token_response_without_local_id() {
        let json = serde_json::json!({
            "kind": "identitytoolkit#VerifyCustomTokenResponse",
            "idToken": id_token("donor-42"),
            "refreshToken": "r",
            "expiresIn": "3600",
            "isNewUser": false
        });

        let response: SignInResponse = serde_json::from_value(json).unwrap();
        let credential = IdentityToolkitClient::credential(response, SignInMethod::CustomToken).unwrap();
        assert_eq!(credential.user_id, "donor-42");
    }

    #[test]
    fn urls_trim_trailing_slashes() {
        let client = IdentityToolkitClient::new(&settings("https://identitytoolkit.googleapis.com"));
        assert_eq!(
            client.accounts_url("signUp"),
            "https://identitytoolkit.googleapis.com/v1/accounts:signUp"
        );
        assert_eq!(client.token_url(), "https://identitytoolkit.googleapis.com/v1/token");
    }
}
