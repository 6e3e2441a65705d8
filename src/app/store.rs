//! State container: applies actions and publishes every new state

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use super::ui::{Action, UiState};

#[derive(Clone)]
pub struct UiStore {
    tx: Arc<watch::Sender<UiState>>,
}

impl UiStore {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(UiState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn dispatch(&self, action: Action) {
        debug!(action = action_name(&action), "Dispatching UI action");
        self.tx.send_modify(|state| state.reduce(action));
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> UiState {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every dispatch
    pub fn subscribe(&self) -> watch::Receiver<UiState> {
        self.tx.subscribe()
    }
}

impl Default for UiStore {
    fn default() -> Self {
        Self::new()
    }
}

fn action_name(action: &Action) -> &'static str {
    match action {
        Action::SignedIn(_) => "signed_in",
        Action::SignedOut => "signed_out",
        Action::AuthFailed => "auth_failed",
        Action::Navigate(_) => "navigate",
        Action::BanksReplaced(_) => "banks_replaced",
        Action::SyncFailed => "sync_failed",
        Action::RequestCompleted(_) => "request_completed",
        Action::DonateModal(_) => "donate_modal",
        Action::LoginFlashExpired => "login_flash_expired",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ui::View;

    #[tokio::test]
    async fn subscribers_see_dispatched_state() {
        let store = UiStore::new();
        let mut rx = store.subscribe();

        store.dispatch(Action::SignedOut);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().view, View::Login);
        assert!(!store.snapshot().loading);
    }
}
