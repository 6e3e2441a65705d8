//! HTTP route definitions

use axum::{
    extract::{Extension, Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::app::ui::{LOGIN_FAILED_MESSAGE, SYNC_FAILED_MESSAGE};
use crate::app::{Action, AppState, Screen, UiState, View};
use crate::config::Config;
use crate::inventory::{search_by_blood_type, Availability, BloodType, InventoryRecord, UnknownBloodType};
use crate::pages::{DonationForm, Page, PageContent, DONATION_THANKS};
use crate::request::{RequestStatus, WithdrawalForm};
use crate::store::SignInMethod;
use crate::util::time::uptime_secs;

use super::middleware::{require_session, CurrentSession};
use super::ws::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    // Public routes (no session required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/state", get(state_handler))
        .route("/pages/:page", get(page_handler))
        .route("/session", post(login_handler).delete(logout_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (session required)
    let protected_routes = Router::new()
        .route("/view", post(navigate_handler))
        .route("/banks", get(banks_handler))
        .route("/banks/search", get(search_handler))
        .route("/requests", post(request_handler))
        .route("/donations", post(donation_handler))
        .route(
            "/donations/modal",
            post(open_donate_modal).delete(close_donate_modal),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// CORS: the listed origins (comma-separated) with credentials, or any origin without
fn cors_layer(config: &Config) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    match &config.client_origin {
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
                .collect();
            base.allow_origin(allowed).allow_credentials(true)
        }
        None => base.allow_origin(Any),
    }
}

// ============================================================================
// Health and state
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    signed_in: bool,
    hospitals: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let ui = state.ui.snapshot();

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        signed_in: ui.session.is_some(),
        hospitals: ui.blood_banks.len(),
    })
}

/// UI state as rendered: the resolved screen plus the raw state
#[derive(Debug, Clone, Serialize)]
pub struct StateView {
    pub screen: Screen,
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub state: UiState,
}

impl From<&UiState> for StateView {
    fn from(state: &UiState) -> Self {
        Self {
            screen: state.screen(),
            user_id: state.user_id().map(str::to_string),
            state: state.clone(),
        }
    }
}

async fn state_handler(State(state): State<AppState>) -> Json<StateView> {
    Json(StateView::from(&state.ui.snapshot()))
}

async fn page_handler(Path(page): Path<Page>) -> Json<PageContent> {
    Json(page.content())
}

// ============================================================================
// Session endpoints
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct LoginRequest {
    token: Option<String>,
}

#[derive(Serialize)]
struct LoginResponse {
    user_id: String,
    method: SignInMethod,
}

async fn login_handler(
    State(state): State<AppState>,
    body: Option<Json<LoginRequest>>,
) -> Result<Json<LoginResponse>, AppError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();

    let session = state
        .login(request.token)
        .await
        .map_err(|_| AppError::Auth(LOGIN_FAILED_MESSAGE.to_string()))?;

    Ok(Json(LoginResponse {
        user_id: session.user_id,
        method: session.method,
    }))
}

async fn logout_handler(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state
        .logout()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Navigation
// ============================================================================

#[derive(Deserialize)]
struct NavigateRequest {
    view: View,
}

async fn navigate_handler(
    State(state): State<AppState>,
    Json(req): Json<NavigateRequest>,
) -> Result<Json<StateView>, AppError> {
    if req.view == View::Login {
        return Err(AppError::BadRequest("Already signed in".to_string()));
    }

    state.ui.dispatch(Action::Navigate(req.view));
    Ok(Json(StateView::from(&state.ui.snapshot())))
}

// ============================================================================
// Inventory endpoints
// ============================================================================

#[derive(Serialize)]
struct BanksResponse {
    loading: bool,
    hospitals: Vec<InventoryRecord>,
}

/// Snapshot for data-dependent views; unavailable while sync has failed
fn synced_banks(state: &AppState) -> Result<UiState, AppError> {
    let ui = state.ui.snapshot();
    if ui.error.is_some() {
        return Err(AppError::Unavailable(SYNC_FAILED_MESSAGE.to_string()));
    }
    Ok(ui)
}

async fn banks_handler(State(state): State<AppState>) -> Result<Json<BanksResponse>, AppError> {
    let ui = synced_banks(&state)?;

    Ok(Json(BanksResponse {
        loading: ui.loading,
        hospitals: ui.blood_banks,
    }))
}

#[derive(Deserialize)]
struct SearchQuery {
    blood_type: String,
}

#[derive(Serialize)]
struct SearchResponse {
    blood_type: BloodType,
    hospitals: Vec<Availability>,
}

async fn search_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let blood_type: BloodType = query
        .blood_type
        .parse()
        .map_err(|e: UnknownBloodType| AppError::BadRequest(e.to_string()))?;
    let ui = synced_banks(&state)?;

    Ok(Json(SearchResponse {
        blood_type,
        hospitals: search_by_blood_type(&ui.blood_banks, blood_type),
    }))
}

async fn request_handler(
    State(state): State<AppState>,
    Json(form): Json<WithdrawalForm>,
) -> Result<Response, AppError> {
    if state.request_limiter.check().is_err() {
        return Err(AppError::RateLimited);
    }
    synced_banks(&state)?;

    let status = state.submit_request(&form).await;
    let code = match status {
        RequestStatus::Error { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };

    Ok((code, Json(status)).into_response())
}

// ============================================================================
// Donations
// ============================================================================

#[derive(Serialize)]
struct DonationResponse {
    message: &'static str,
}

async fn donation_handler(
    State(state): State<AppState>,
    Extension(CurrentSession(session)): Extension<CurrentSession>,
    Json(form): Json<DonationForm>,
) -> Result<Json<DonationResponse>, AppError> {
    form.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    info!(user_id = %session.user_id, "Donation form received");
    state.ui.dispatch(Action::DonateModal(false));

    Ok(Json(DonationResponse {
        message: DONATION_THANKS,
    }))
}

async fn open_donate_modal(State(state): State<AppState>) -> Json<StateView> {
    state.ui.dispatch(Action::DonateModal(true));
    Json(StateView::from(&state.ui.snapshot()))
}

async fn close_donate_modal(State(state): State<AppState>) -> Json<StateView> {
    state.ui.dispatch(Action::DonateModal(false));
    Json(StateView::from(&state.ui.snapshot()))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Too many requests")]
    RateLimited,

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Auth(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string()),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
