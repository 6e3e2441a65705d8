//! Shared harness: an app wired to the in-memory backend, driven through the router

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use blood_bank_server::app::UiState;
use blood_bank_server::http::build_router;
use blood_bank_server::store::MemoryBackend;
use blood_bank_server::{AppState, Config};

pub const SECRET: &str = "integration-secret";

pub struct TestApp {
    pub state: AppState,
    pub backend: MemoryBackend,
    pub router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::memory(SECRET))
    }

    pub fn with_config(config: Config) -> Self {
        let backend = MemoryBackend::new(SECRET);
        let state = AppState::with_backend(
            config,
            Arc::new(backend.clone()),
            Arc::new(backend.clone()),
        );
        state.start();
        let router = build_router(state.clone());

        Self {
            state,
            backend,
            router,
        }
    }

    /// Serve the router on a local port, for clients that need a real socket
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    pub fn collection(&self) -> String {
        self.state.config.collection_path()
    }

    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, Some(body)).await
    }

    /// Wait until the UI state satisfies `pred`
    pub async fn wait_for<F>(&self, pred: F) -> UiState
    where
        F: Fn(&UiState) -> bool,
    {
        let mut rx = self.state.ui.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for UI state")
            .expect("UI store closed");
        state.clone()
    }

    /// Sign in anonymously and wait for the seeded hospitals
    pub async fn login(&self) -> Value {
        self.wait_for(|s| !s.loading).await;
        let (status, body) = self.post("/session", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        self.wait_for(|s| s.session.is_some() && s.blood_banks.len() == 3)
            .await;
        body
    }
}
