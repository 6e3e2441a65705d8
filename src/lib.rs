//! Blood bank inventory service
//!
//! Hosts one application instance in front of a hosted identity provider
//! and document store:
//! - [`sync`] signs in and keeps a live copy of the hospital collection
//! - [`request`] validates withdrawals and writes decremented counts back
//! - [`app`] holds the UI state container fed by both
//! - [`http`] exposes views and actions over HTTP and a state WebSocket

pub mod app;
pub mod config;
pub mod http;
pub mod inventory;
pub mod pages;
pub mod request;
pub mod store;
pub mod sync;
pub mod util;

pub use app::AppState;
pub use config::Config;
