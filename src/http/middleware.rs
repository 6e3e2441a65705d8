//! Session guard for routes that need a signed-in principal

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::app::AppState;
use crate::sync::Session;

use super::routes::AppError;

/// Signed-in principal, inserted into request extensions
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

/// Middleware to require a live session
pub async fn require_session(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(session) = state.gateway.session() else {
        debug!(path = %request.uri().path(), "Rejected request without session");
        return Err(AppError::Unauthorized);
    };

    request.extensions_mut().insert(CurrentSession(session));

    Ok(next.run(request).await)
}
