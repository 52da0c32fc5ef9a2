//! Common test utilities for in-process HTTP testing with mock models.
//!
//! The fixture builds the real router over an orchestrator whose separator
//! and aligner are mocks, rooted in a temporary data directory.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use jellysing_core::testing::{MockAligner, MockSeparator};
use jellysing_core::{create_authenticator, AuthConfig, AuthMethod, Config, Orchestrator};
use jellysing_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use jellysing_core::testing::fixtures;

pub const API_KEY: &str = "test-key";
const BOUNDARY: &str = "jellysing-test-boundary";

/// In-process server with controllable mock models.
pub struct TestFixture {
    pub router: Router,
    pub separator: Arc<MockSeparator>,
    pub aligner: Arc<MockAligner>,
    pub orchestrator: Arc<Orchestrator>,
    pub temp_dir: TempDir,
    api_key: Option<String>,
}

/// One parsed SSE frame.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub event: String,
    pub data: Value,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn events(&self) -> Vec<SseEvent> {
        parse_sse(&self.text())
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event).collect()
    }
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::build(|_| {}).await
    }

    /// Fixture with API key auth enabled. Requests made through the helpers
    /// carry the key unless sent with [`TestFixture::send_raw`].
    pub async fn with_api_key() -> Self {
        Self::build(|config| {
            config.auth = AuthConfig {
                method: AuthMethod::ApiKey,
                api_key: Some(API_KEY.to_string()),
            };
        })
        .await
    }

    pub async fn build(customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = fixtures::config(temp_dir.path());
        customize(&mut config);

        let separator = Arc::new(MockSeparator::new());
        let aligner = Arc::new(MockAligner::new());
        let orchestrator = Arc::new(Orchestrator::new(
            &config,
            separator.clone(),
            aligner.clone(),
        ));
        orchestrator
            .prepare()
            .await
            .expect("Failed to prepare storage");

        let authenticator =
            Arc::from(create_authenticator(&config.auth).expect("Failed to create authenticator"));
        let api_key = config.auth.api_key.clone();
        let state = Arc::new(AppState::new(config, authenticator, orchestrator.clone()));

        Self {
            router: create_router(state),
            separator,
            aligner,
            orchestrator,
            temp_dir,
            api_key,
        }
    }

    fn authorized(&self, builder: axum::http::request::Builder) -> axum::http::request::Builder {
        match &self.api_key {
            Some(key) => builder.header(header::AUTHORIZATION, format!("Bearer {}", key)),
            None => builder,
        }
    }

    pub async fn send_raw(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes()
            .to_vec();

        TestResponse {
            status,
            content_type,
            body,
        }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let request = self
            .authorized(Request::builder().method("GET").uri(path))
            .body(Body::empty())
            .unwrap();
        self.send_raw(request).await
    }

    pub async fn post_json(&self, path: &str, body: &str) -> TestResponse {
        let request = self
            .authorized(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(header::CONTENT_TYPE, "application/json"),
            )
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send_raw(request).await
    }

    /// Upload `bytes` as the `file` field of a multipart form.
    pub async fn upload(&self, path: &str, filename: &str, bytes: &[u8]) -> TestResponse {
        self.upload_field(path, "file", filename, bytes).await
    }

    pub async fn upload_field(
        &self,
        path: &str,
        field: &str,
        filename: &str,
        bytes: &[u8],
    ) -> TestResponse {
        let request = self
            .authorized(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(
                        header::CONTENT_TYPE,
                        format!("multipart/form-data; boundary={}", BOUNDARY),
                    ),
            )
            .body(Body::from(multipart_body(field, filename, bytes)))
            .unwrap();
        self.send_raw(request).await
    }

    /// Upload `bytes` as a raw request body.
    pub async fn upload_raw(&self, path: &str, bytes: &[u8]) -> TestResponse {
        let request = self
            .authorized(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header(header::CONTENT_TYPE, "application/octet-stream"),
            )
            .body(Body::from(bytes.to_vec()))
            .unwrap();
        self.send_raw(request).await
    }

    pub fn data_path(&self, name: &str) -> std::path::PathBuf {
        self.temp_dir.path().join(name)
    }
}

/// Single-field multipart body.
pub fn multipart_body(field: &str, filename: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

/// Parse `event:`/`data:` blocks. Keep-alive comments are skipped.
pub fn parse_sse(text: &str) -> Vec<SseEvent> {
    text.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    event = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push_str(value.trim_start());
                }
            }
            let event = event?;
            let data = serde_json::from_str(&data).unwrap_or(Value::Null);
            Some(SseEvent { event, data })
        })
        .collect()
}

/// The data object of the last event, which must be terminal.
pub fn terminal(response: &TestResponse) -> SseEvent {
    response
        .events()
        .pop()
        .expect("stream carried no events")
}
