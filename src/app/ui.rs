//! UI state and its reducer

use serde::{Deserialize, Serialize};

use crate::inventory::InventoryRecord;
use crate::request::RequestStatus;
use crate::sync::Session;

pub const SYNC_FAILED_MESSAGE: &str = "Failed to load blood bank data. Please try again later.";
pub const LOGIN_FAILED_MESSAGE: &str = "Failed to log in. Please try again.";

/// Navigable pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Login,
    Home,
    About,
    Request,
    Contact,
}

/// What is actually on screen, after loading/error/session precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Loading,
    Error,
    Login,
    Home,
    About,
    Request,
    Contact,
}

impl From<View> for Screen {
    fn from(view: View) -> Self {
        match view {
            View::Login => Screen::Login,
            View::Home => Screen::Home,
            View::About => Screen::About,
            View::Request => Screen::Request,
            View::Contact => Screen::Contact,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UiState {
    pub view: View,
    pub loading: bool,
    pub session: Option<Session>,
    pub blood_banks: Vec<InventoryRecord>,
    /// Blocking banner (sync failure)
    pub error: Option<String>,
    /// One-line auth message
    pub notice: Option<String>,
    pub request_status: RequestStatus,
    pub show_donate_modal: bool,
    pub show_login_success: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            view: View::Login,
            loading: true,
            session: None,
            blood_banks: Vec::new(),
            error: None,
            notice: None,
            request_status: RequestStatus::None,
            show_donate_modal: false,
            show_login_success: false,
        }
    }
}

/// State transitions
#[derive(Debug, Clone)]
pub enum Action {
    SignedIn(Session),
    SignedOut,
    AuthFailed,
    Navigate(View),
    BanksReplaced(Vec<InventoryRecord>),
    SyncFailed,
    RequestCompleted(RequestStatus),
    DonateModal(bool),
    LoginFlashExpired,
}

impl UiState {
    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::SignedIn(session) => {
                self.session = Some(session);
                self.view = View::Home;
                self.error = None;
                self.notice = None;
                self.show_login_success = true;
            }
            Action::SignedOut => {
                self.session = None;
                self.view = View::Login;
                self.loading = false;
                self.blood_banks.clear();
                self.request_status = RequestStatus::None;
                self.show_donate_modal = false;
                self.show_login_success = false;
            }
            Action::AuthFailed => {
                self.notice = Some(LOGIN_FAILED_MESSAGE.to_string());
            }
            Action::Navigate(view) => {
                if self.session.is_some() && view != View::Login {
                    self.view = view;
                }
            }
            Action::BanksReplaced(banks) => {
                self.blood_banks = banks;
                self.loading = false;
                self.error = None;
            }
            Action::SyncFailed => {
                self.error = Some(SYNC_FAILED_MESSAGE.to_string());
                self.loading = false;
            }
            Action::RequestCompleted(status) => {
                self.request_status = status;
            }
            Action::DonateModal(open) => {
                self.show_donate_modal = open && self.session.is_some();
            }
            Action::LoginFlashExpired => {
                self.show_login_success = false;
            }
        }
    }

    /// Loading beats error, error beats everything, no session forces login
    pub fn screen(&self) -> Screen {
        if self.loading {
            Screen::Loading
        } else if self.error.is_some() {
            Screen::Error
        } else if self.session.is_none() {
            Screen::Login
        } else {
            Screen::from(self.view)
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.user_id.as_str())
    }
}
