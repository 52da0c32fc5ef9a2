use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer,
};

use super::{
    align, handlers,
    middleware::{auth_middleware, metrics_middleware, static_file_guard},
    separate,
};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config().server;
    let storage = &state.config().storage;

    // Uploads are streamed to disk, so only the configured ceiling applies
    let upload_routes = Router::new()
        .route("/separate", post(separate::separate))
        // Misspelled path used by older clients
        .route("/seperate", post(separate::separate))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(server.max_upload_bytes));

    let protected_routes = Router::new()
        .merge(upload_routes)
        .route("/align", post(align::align))
        .route("/config", get(handlers::get_config))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    let public_routes = Router::new()
        .route("/check", get(handlers::check))
        .route("/metrics", get(handlers::metrics));

    // The spool and scratch directories live under data_dir too
    let static_files = Router::new()
        .fallback_service(ServeDir::new(&storage.data_dir))
        .layer(middleware::from_fn(static_file_guard));

    let mut router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service(&storage.serve_path, static_files)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http());

    if server.cors_allow_any {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}
