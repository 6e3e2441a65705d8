//! Application state shared across routes

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::{BackendConfig, Config};
use crate::request::{RequestHandler, RequestStatus, WithdrawalForm};
use crate::store::{DocumentStore, FirestoreClient, IdentityProvider, IdentityToolkitClient, MemoryBackend};
use crate::sync::{AuthError, Session, SyncGateway};
use crate::util::rate_limit::{create_limiter, Limiter, REQUEST_RATE_LIMIT};

use super::store::UiStore;
use super::ui::Action;

/// How long the "Successfully done!" flash stays up after login
pub const LOGIN_FLASH: Duration = Duration::from_secs(3);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<SyncGateway>,
    pub ui: UiStore,
    pub requests: RequestHandler<SyncGateway>,
    pub request_limiter: Arc<Limiter>,
    sync_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    /// Serializes sign-in so concurrent logins share one session
    login_lock: Arc<tokio::sync::Mutex<()>>,
}

impl AppState {
    /// Build state with the backend named in the configuration
    pub fn new(config: Config) -> Self {
        let (identity, documents): (Arc<dyn IdentityProvider>, Arc<dyn DocumentStore>) =
            match &config.backend {
                BackendConfig::Firestore(settings) => (
                    Arc::new(IdentityToolkitClient::new(settings)),
                    Arc::new(FirestoreClient::new(settings, config.sync_poll_interval)),
                ),
                BackendConfig::Memory { token_secret } => {
                    let backend = MemoryBackend::new(token_secret.clone());
                    (Arc::new(backend.clone()), Arc::new(backend))
                }
            };

        Self::with_backend(config, identity, documents)
    }

    pub fn with_backend(
        config: Config,
        identity: Arc<dyn IdentityProvider>,
        documents: Arc<dyn DocumentStore>,
    ) -> Self {
        let gateway = Arc::new(SyncGateway::new(identity, documents, config.collection_path()));
        let requests = RequestHandler::new(gateway.clone());

        Self {
            config: Arc::new(config),
            gateway,
            ui: UiStore::new(),
            requests,
            request_limiter: create_limiter(REQUEST_RATE_LIMIT),
            sync_task: Arc::new(Mutex::new(None)),
            login_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Follow auth-state changes: sign-in starts the inventory
    /// subscription, sign-out stops it. Runs until the gateway is dropped.
    pub fn start(&self) -> JoinHandle<()> {
        let state = self.clone();
        let mut auth = self.gateway.auth_state();

        tokio::spawn(async move {
            let initial = auth.borrow_and_update().clone();
            state.on_auth_change(initial).await;

            while auth.changed().await.is_ok() {
                let session = auth.borrow_and_update().clone();
                state.on_auth_change(session).await;
            }
        })
    }

    async fn on_auth_change(&self, session: Option<Session>) {
        match session {
            Some(session) => {
                self.ui.dispatch(Action::SignedIn(session));

                let ui = self.ui.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(LOGIN_FLASH).await;
                    ui.dispatch(Action::LoginFlashExpired);
                });

                self.start_sync().await;
            }
            None => {
                self.stop_sync();
                self.ui.dispatch(Action::SignedOut);
            }
        }
    }

    async fn start_sync(&self) {
        let mut subscription = match self.gateway.subscribe().await {
            Ok(subscription) => subscription,
            Err(e) => {
                error!(error = %e, "Failed to subscribe to blood bank data");
                self.ui.dispatch(Action::SyncFailed);
                return;
            }
        };

        let ui = self.ui.clone();
        let pump = tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                match snapshot {
                    Ok(banks) => ui.dispatch(Action::BanksReplaced(banks)),
                    Err(e) => {
                        error!(error = %e, "Blood bank subscription failed");
                        ui.dispatch(Action::SyncFailed);
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.sync_task.lock().replace(pump) {
            previous.abort();
        }
    }

    fn stop_sync(&self) {
        if let Some(pump) = self.sync_task.lock().take() {
            pump.abort();
        }
    }

    /// Sign in with an explicit token, the configured one, or anonymously
    pub async fn login(&self, token: Option<String>) -> Result<Session, AuthError> {
        let _login = self.login_lock.lock().await;
        if let Some(session) = self.gateway.session() {
            return Ok(session);
        }

        let token = token.or_else(|| self.config.initial_auth_token.clone());
        match self.gateway.sign_in(token.as_deref()).await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.ui.dispatch(Action::AuthFailed);
                Err(e)
            }
        }
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.gateway.sign_out().await
    }

    /// Run a withdrawal against the latest pushed snapshot
    pub async fn submit_request(&self, form: &WithdrawalForm) -> RequestStatus {
        let banks = self.ui.snapshot().blood_banks;
        let status = self.requests.submit(&banks, form).await;
        self.ui.dispatch(Action::RequestCompleted(status.clone()));
        status
    }

    /// Sign out on shutdown so live queries stop cleanly
    pub async fn shutdown(&self) {
        if self.gateway.session().is_some() {
            if let Err(e) = self.logout().await {
                warn!(error = %e, "Sign-out during shutdown failed");
            }
        }
        self.stop_sync();
        info!("Application state shut down");
    }
}
