//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that builds the router in-process
//! with a real `DownloadManager` driving mock collaborators, so API tests
//! need neither a chat platform nor yt-dlp.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use zenload_core::testing::{MockExtractor, MockGateway};
use zenload_core::{
    Config, DatabaseConfig, DownloadConfig, DownloadManager, Extractor, ExtractorConfig,
    GatewayBackend, GatewayConfig, InMemorySettingsStore, MessagingGateway, ServerConfig,
    SettingsConfig, SettingsStore, TelegramConfig,
};

/// Re-export fixtures for test convenience
pub use zenload_core::testing::fixtures;

/// Test fixture for API testing with mock dependencies.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new();
///
///     let response = fixture.post("/api/v1/downloads", json!({
///         "user_id": 1,
///         "url": "https://www.tiktok.com/@user/video/1"
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Manager behind the router
    pub manager: Arc<DownloadManager>,
    /// Mock extractor - script fetch outcomes
    pub extractor: Arc<MockExtractor>,
    /// Mock gateway - inspect delivered messages
    pub gateway: Arc<MockGateway>,
    /// Scratch root for downloads
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// Create a new test fixture with default limits.
    pub fn new() -> Self {
        Self::with_downloads(|_| {})
    }

    /// Create a test fixture with adjusted download limits.
    pub fn with_downloads(configure: impl FnOnce(&mut DownloadConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut downloads = fixtures::download_config(temp_dir.path());
        configure(&mut downloads);

        let settings_config = SettingsConfig {
            default_language: "en".to_string(),
            ..Default::default()
        };
        let config = Config {
            gateway: GatewayConfig {
                backend: GatewayBackend::Telegram,
                telegram: Some(TelegramConfig::new("123456:secret")),
            },
            server: ServerConfig {
                host: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
                port: 0, // Not used for in-process testing
            },
            database: DatabaseConfig {
                path: temp_dir.path().join("test.db"),
            },
            downloads: downloads.clone(),
            extractor: ExtractorConfig::default(),
            settings: settings_config.clone(),
        };

        let extractor = Arc::new(MockExtractor::new());
        let gateway = Arc::new(MockGateway::new());
        let settings = Arc::new(InMemorySettingsStore::new(settings_config));
        let manager = Arc::new(DownloadManager::new(
            downloads,
            Arc::clone(&extractor) as Arc<dyn Extractor>,
            Arc::clone(&gateway) as Arc<dyn MessagingGateway>,
            settings as Arc<dyn SettingsStore>,
        ));

        let state = Arc::new(zenload_server::state::AppState::new(
            config,
            Arc::clone(&manager),
        ));
        let router = zenload_server::api::create_router(state);

        Self {
            router,
            manager,
            extractor,
            gateway,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).to_string();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}
