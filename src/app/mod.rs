//! Application state: the UI state container and the shared server state

pub mod state;
pub mod store;
pub mod ui;

pub use state::AppState;
pub use store::UiStore;
pub use ui::{Action, Screen, UiState, View};
