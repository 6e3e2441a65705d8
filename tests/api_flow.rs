mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use blood_bank_server::app::Screen;
use blood_bank_server::inventory::BloodType;
use common::TestApp;

#[tokio::test]
async fn starts_on_login_screen() {
    let app = TestApp::new();
    app.wait_for(|s| s.screen() == Screen::Login).await;

    let (status, body) = app.get("/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["screen"], "login");
    assert_eq!(body["user_id"], serde_json::Value::Null);

    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["signed_in"], false);
}

#[tokio::test]
async fn protected_routes_need_a_session() {
    let app = TestApp::new();

    for uri in ["/banks", "/banks/search?blood_type=O%2B"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "Unauthorized");
    }

    let (status, _) = app.post("/view", json!({ "view": "about" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post("/requests", json!({ "blood_type": "O+", "hospital": "City General Hospital", "amount": 1 }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn anonymous_login_seeds_empty_collection() {
    let app = TestApp::new();
    let body = app.login().await;
    assert_eq!(body["method"], "anonymous");

    let (status, body) = app.get("/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["screen"], "home");
    assert_eq!(body["show_login_success"], true);
    assert!(body["user_id"].is_string());

    let (status, body) = app.get("/banks").await;
    assert_eq!(status, StatusCode::OK);
    let hospitals = body["hospitals"].as_array().unwrap();
    let names: Vec<&str> = hospitals.iter().map(|h| h["name"].as_str().unwrap()).collect();
    assert_eq!(
        names,
        ["City General Hospital", "Community Health Center", "Regional Trauma Center"]
    );
    assert_eq!(hospitals[0]["inventory"]["O+"], 50);

    assert_eq!(app.backend.records(&app.collection()).len(), 3);
}

#[tokio::test]
async fn custom_token_login_uses_its_uid() {
    let app = TestApp::new();
    let token = app.backend.mint_token("ward-7").unwrap();

    let (status, body) = app.post("/session", json!({ "token": token })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], "ward-7");
    assert_eq!(body["method"], "custom_token");

    let state = app.wait_for(|s| s.session.is_some()).await;
    assert_eq!(state.user_id(), Some("ward-7"));
}

#[tokio::test]
async fn rejected_token_reports_login_failure() {
    let app = TestApp::new();
    app.wait_for(|s| !s.loading).await;

    let (status, body) = app.post("/session", json!({ "token": "not-a-token" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Failed to log in. Please try again.");

    let state = app.state.ui.snapshot();
    assert_eq!(state.screen(), Screen::Login);
    assert_eq!(state.notice.as_deref(), Some("Failed to log in. Please try again."));
}

#[tokio::test]
async fn navigation_and_logout() {
    let app = TestApp::new();
    app.login().await;

    let (status, body) = app.post("/view", json!({ "view": "contact" })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["screen"], "contact");

    let (status, _) = app.post("/view", json!({ "view": "login" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call(Method::DELETE, "/session", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let state = app.wait_for(|s| s.session.is_none()).await;
    assert_eq!(state.screen(), Screen::Login);
    assert!(state.blood_banks.is_empty());
    assert_eq!(app.backend.active_sessions(), 0);

    let (status, _) = app.get("/banks").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn search_lists_hospitals_with_stock() {
    let app = TestApp::new();
    app.login().await;

    let (status, body) = app.get("/banks/search?blood_type=AB-").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blood_type"], "AB-");
    let hits = body["hospitals"].as_array().unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0]["name"], "Regional Trauma Center");
    assert_eq!(hits[0]["units"], 5);

    let (status, body) = app.get("/banks/search?blood_type=Z%2B").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Z+"));
}

#[tokio::test]
async fn static_pages_are_public() {
    let app = TestApp::new();

    let (status, body) = app.get("/pages/about").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "About Us");

    let (status, body) = app.get("/pages/contact").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contact"]["email"], "contact.ind@bloodbank.dev");

    let (status, _) = app.get("/pages/pricing").await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn donate_modal_and_form() {
    let app = TestApp::new();
    app.login().await;

    let (status, body) = app.call(Method::POST, "/donations/modal", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["show_donate_modal"], true);

    let (status, body) = app
        .post("/donations", json!({ "full_name": "Ravi", "weight_kg": 70.0, "age": 31 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please fill in all fields.");

    let (status, body) = app
        .post(
            "/donations",
            json!({ "full_name": "Ravi", "weight_kg": 70.0, "age": 31, "medical_issues": "no" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Thank you for your donation! We will contact you shortly.");
    assert!(!app.state.ui.snapshot().show_donate_modal);
}

#[tokio::test]
async fn sync_failure_blocks_data_views() {
    let app = TestApp::new();
    app.wait_for(|s| !s.loading).await;
    app.backend.set_offline(true);

    let (status, _) = app.post("/session", json!({})).await;
    assert_eq!(status, StatusCode::OK);

    let state = app.wait_for(|s| s.error.is_some()).await;
    assert_eq!(state.screen(), Screen::Error);

    let (status, body) = app.get("/banks").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Failed to load blood bank data. Please try again later.");
}

#[tokio::test]
async fn service_recovers_from_sync_failure_on_next_login() {
    let app = TestApp::new();
    app.wait_for(|s| !s.loading).await;
    app.backend.set_offline(true);

    let (status, _) = app.post("/session", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    app.wait_for(|s| s.error.is_some()).await;

    app.backend.set_offline(false);
    let (status, _) = app.call(Method::DELETE, "/session", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    app.wait_for(|s| s.session.is_none()).await;

    app.login().await;
    let state = app.wait_for(|s| s.error.is_none()).await;
    assert_eq!(state.screen(), Screen::Home);

    let (status, body) = app.get("/banks").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hospitals"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn sync_survives_id_token_expiry() {
    let app = TestApp::new();
    app.login().await;

    app.backend.expire_id_tokens();
    let (status, body) = app
        .post("/requests", json!({ "blood_type": "O-", "hospital": "Regional Trauma Center", "amount": 5 }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let state = app
        .wait_for(|s| {
            s.blood_banks
                .iter()
                .any(|r| r.id == "hospital-C" && r.units(BloodType::ONegative) == Some(35))
        })
        .await;
    assert!(state.error.is_none());
}
