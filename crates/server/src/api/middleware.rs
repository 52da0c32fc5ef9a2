//! Authentication and metrics middleware for API routes.

use axum::{
    body::Body,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex_lite::Regex;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;
use jellysing_core::{AuthError, Caller, Credentials};
use tracing::debug;

use crate::metrics::{
    normalize_path, AUTH_FAILURES_TOTAL, HTTP_REQUESTS_IN_FLIGHT, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION,
};
use crate::state::AppState;

/// Metrics middleware that tracks HTTP request duration and counts.
///
/// This middleware records:
/// - Request duration (histogram)
/// - Request count (counter)
/// - Requests in flight (gauge)
///
/// Progress streams count as finished once their response head is out.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = normalize_path(request.uri().path());

    HTTP_REQUESTS_IN_FLIGHT.inc();

    let response = next.run(request).await;

    HTTP_REQUESTS_IN_FLIGHT.dec();

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &path, &status])
        .observe(duration);
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();

    response
}

static RESULT_FILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/[0-9a-f]{64}(\.[0-9]+)?\.([A-Za-z0-9]+)$").unwrap());

/// Whether a path under the static mount names a finished result file.
///
/// Only flat `<digest>.<ext>` and `<digest>.<i>.<ext>` names qualify, and
/// never an in-flight `.partial` copy.
fn is_result_path(path: &str) -> bool {
    RESULT_FILE
        .captures(path)
        .and_then(|captures| captures.get(2))
        .is_some_and(|extension| !extension.as_str().eq_ignore_ascii_case("partial"))
}

/// Static file guard: anything but a finished result is a 404.
pub async fn static_file_guard(request: Request<Body>, next: Next) -> Response {
    if is_result_path(request.uri().path()) {
        next.run(request).await
    } else {
        debug!("Refusing static path {}", request.uri().path());
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Authentication middleware.
///
/// Runs before any handler, so a rejected upload never starts a workflow.
/// On success the [`Caller`] is stored in the request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let source_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));

    let credentials = Credentials::from_headers(
        request
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
        source_ip,
    );

    match state.authenticator().authenticate(&credentials).await {
        Ok(caller) => {
            debug!("Authenticated {} via {}", caller.id, caller.method);
            request.extensions_mut().insert(caller);
            Ok(next.run(request).await)
        }
        Err(AuthError::NotAuthenticated) => {
            AUTH_FAILURES_TOTAL
                .with_label_values(&["not_authenticated"])
                .inc();
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(AuthError::InvalidCredentials(reason)) => {
            debug!("Rejected credentials from {}: {}", source_ip, reason);
            AUTH_FAILURES_TOTAL
                .with_label_values(&["invalid_credentials"])
                .inc();
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(_) => {
            AUTH_FAILURES_TOTAL
                .with_label_values(&["internal_error"])
                .inc();
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Extractor for the authenticated caller id.
///
/// Falls back to "anonymous" when no caller is present (route not behind
/// the auth middleware).
#[derive(Debug, Clone)]
pub struct AuthCaller(pub String);

impl<S> FromRequestParts<S> for AuthCaller
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let id = parts
            .extensions
            .get::<Caller>()
            .map(|caller| caller.id.clone())
            .unwrap_or_else(|| Caller::anonymous().id);
        std::future::ready(Ok(AuthCaller(id)))
    }
}
