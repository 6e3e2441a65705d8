//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_APP_ID: &str = "default-app-id";
const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";
const DEFAULT_IDENTITY_URL: &str = "https://identitytoolkit.googleapis.com";
const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com";
const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_MEMORY_SECRET: &str = "local-memory-backend-secret";

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Which identity provider / document store to talk to
    pub backend: BackendConfig,
    /// Deployment namespace; records live under `artifacts/{app_id}/...`
    pub app_id: String,
    /// Pre-issued custom token; anonymous sign-in when absent
    pub initial_auth_token: Option<String>,
    /// How often the hosted collection is polled for changes
    pub sync_poll_interval: Duration,

    /// Allowed client origins for CORS; any origin when unset
    pub client_origin: Option<String>,
}

#[derive(Clone, Debug)]
pub enum BackendConfig {
    Firestore(FirebaseSettings),
    Memory { token_secret: String },
}

/// Hosted Firebase project settings
#[derive(Clone, Debug)]
pub struct FirebaseSettings {
    pub api_key: String,
    pub project_id: String,
    pub firestore_base_url: String,
    pub identity_base_url: String,
    /// Token-refresh endpoint host
    pub secure_token_base_url: String,
}

/// Shape of the `FIREBASE_CONFIG` JSON object
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirebaseConfigJson {
    api_key: Option<String>,
    project_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match var("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => var("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let backend = match var("BACKEND").as_deref().unwrap_or("firestore") {
            "firestore" => BackendConfig::Firestore(firebase_settings(&var)?),
            "memory" => BackendConfig::Memory {
                token_secret: var("MEMORY_TOKEN_SECRET")
                    .unwrap_or_else(|| DEFAULT_MEMORY_SECRET.to_string()),
            },
            other => return Err(ConfigError::InvalidBackend(other.to_string())),
        };

        let sync_poll_interval = match var("SYNC_POLL_INTERVAL_MS") {
            Some(ms) => ms
                .parse::<u64>()
                .ok()
                .filter(|&ms| ms > 0)
                .ok_or(ConfigError::InvalidNumber("SYNC_POLL_INTERVAL_MS"))?,
            None => DEFAULT_POLL_INTERVAL_MS,
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),

            backend,
            app_id: var("APP_ID").unwrap_or_else(|| DEFAULT_APP_ID.to_string()),
            initial_auth_token: var("INITIAL_AUTH_TOKEN"),
            sync_poll_interval: Duration::from_millis(sync_poll_interval),

            client_origin: var("CLIENT_ORIGIN"),
        })
    }

    /// Configuration for an in-process memory backend, used by tests and local runs
    pub fn memory(token_secret: impl Into<String>) -> Self {
        Self {
            server_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            log_level: "info".to_string(),
            backend: BackendConfig::Memory {
                token_secret: token_secret.into(),
            },
            app_id: DEFAULT_APP_ID.to_string(),
            initial_auth_token: None,
            sync_poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            client_origin: None,
        }
    }

    /// Collection path holding the hospital records for this deployment
    pub fn collection_path(&self) -> String {
        format!("artifacts/{}/public/data/bloodBanks", self.app_id)
    }
}

fn firebase_settings<F>(var: &F) -> Result<FirebaseSettings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = var("FIREBASE_CONFIG").ok_or(ConfigError::Missing("FIREBASE_CONFIG"))?;
    let parsed: FirebaseConfigJson = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::InvalidFirebaseConfig(e.to_string()))?;

    let api_key = parsed
        .api_key
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::InvalidFirebaseConfig("apiKey is missing".to_string()))?;
    let project_id = parsed
        .project_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::InvalidFirebaseConfig("projectId is missing".to_string()))?;

    Ok(FirebaseSettings {
        api_key,
        project_id,
        firestore_base_url: var("FIRESTORE_BASE_URL")
            .unwrap_or_else(|| DEFAULT_FIRESTORE_URL.to_string()),
        identity_base_url: var("IDENTITY_BASE_URL")
            .unwrap_or_else(|| DEFAULT_IDENTITY_URL.to_string()),
        secure_token_base_url: var("SECURE_TOKEN_BASE_URL")
            .unwrap_or_else(|| DEFAULT_SECURE_TOKEN_URL.to_string()),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid Firebase config: {0}")]
    InvalidFirebaseConfig(String),

    #[error("Unknown backend: {0} (expected firestore or memory)")]
    InvalidBackend(String),

    #[error("Invalid number in environment variable: {0}")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn firestore_requires_firebase_config() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("FIREBASE_CONFIG"))));
        assert!(matches!(
            load(&[("FIREBASE_CONFIG", "{}")]),
            Err(ConfigError::InvalidFirebaseConfig(_))
        ));
        assert!(matches!(
            load(&[("FIREBASE_CONFIG", "not json")]),
            Err(ConfigError::InvalidFirebaseConfig(_))
        ));
    }

    #[test]
    fn reads_firestore_settings() {
        let config = load(&[
            ("FIREBASE_CONFIG", r#"{"apiKey":"k-1","projectId":"bank","authDomain":"bank.firebaseapp.com"}"#),
            ("APP_ID", "mumbai-prod"),
            ("PORT", "9000"),
            ("INITIAL_AUTH_TOKEN", "tok"),
        ])
        .unwrap();

        let BackendConfig::Firestore(settings) = &config.backend else {
            panic!("expected firestore backend");
        };
        assert_eq!(settings.api_key, "k-1");
        assert_eq!(settings.project_id, "bank");
        assert_eq!(settings.firestore_base_url, DEFAULT_FIRESTORE_URL);
        assert_eq!(settings.secure_token_base_url, DEFAULT_SECURE_TOKEN_URL);
        assert_eq!(config.server_addr.port(), 9000);
        assert_eq!(config.initial_auth_token.as_deref(), Some("tok"));
        assert_eq!(config.collection_path(), "artifacts/mumbai-prod/public/data/bloodBanks");
    }

    #[test]
    fn memory_backend_needs_no_firebase() {
        let config = load(&[("BACKEND", "memory"), ("SYNC_POLL_INTERVAL_MS", "250")]).unwrap();
        assert!(matches!(config.backend, BackendConfig::Memory { .. }));
        assert_eq!(config.app_id, DEFAULT_APP_ID);
        assert_eq!(config.sync_poll_interval, Duration::from_millis(250));
        assert!(config.initial_auth_token.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            load(&[("BACKEND", "postgres")]),
            Err(ConfigError::InvalidBackend(_))
        ));
        assert!(matches!(
            load(&[("BACKEND", "memory"), ("SYNC_POLL_INTERVAL_MS", "0")]),
            Err(ConfigError::InvalidNumber(_))
        ));
        assert!(matches!(
            load(&[("BACKEND", "memory"), ("SERVER_ADDR", "nowhere")]),
            Err(ConfigError::InvalidAddress)
        ));
    }
}
