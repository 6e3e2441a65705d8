//! HTTP surface: routes, session guard and the state WebSocket

pub mod middleware;
pub mod routes;
pub mod ws;

pub use routes::{build_router, AppError, StateView};
