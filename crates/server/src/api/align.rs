//! `POST /align`: align lyrics against a cached separation.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Response},
    Json,
};
use jellysing_core::{progress_channel, AlignmentTask};
use tracing::{info, warn};

use super::{bad_request, middleware::AuthCaller, sse::event_stream};
use crate::state::AppState;

/// Validation happens before any stream is opened: a malformed or unknown
/// `input_hash` is a 400, not an `error` event.
pub async fn align(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    payload: Result<Json<AlignmentTask>, JsonRejection>,
) -> Response {
    let Json(task) = match payload {
        Ok(task) => task,
        Err(rejection) => return bad_request(rejection.body_text()),
    };

    let orchestrator = Arc::clone(state.orchestrator());
    let prepared = match orchestrator.prepare_alignment(&task).await {
        Ok(prepared) => prepared,
        Err(reason) => {
            warn!("Rejected alignment request: {}", reason);
            return bad_request(reason.to_string());
        }
    };

    info!(
        "Alignment of {} lines against {} ({}) for {}",
        task.lyrics.len(),
        prepared.digest,
        prepared.reference,
        caller
    );

    let (sink, rx) = progress_channel();
    tokio::spawn(async move {
        orchestrator.align(prepared, &sink).await;
    });

    event_stream(rx).into_response()
}
