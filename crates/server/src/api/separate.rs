//! `POST /separate`: upload a track and stream the separation workflow.

use std::io;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use jellysing_core::{progress_channel, sanitize_extension, Orchestrator, ProgressSink};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio_util::io::StreamReader;
use tracing::{debug, info, warn};

use super::{bad_request, middleware::AuthCaller, sse::event_stream};
use crate::state::AppState;

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

#[derive(Debug, Deserialize)]
pub struct RawUploadQuery {
    /// Declared container extension for raw uploads.
    pub ext: Option<String>,
}

pub async fn separate(
    State(state): State<Arc<AppState>>,
    AuthCaller(caller): AuthCaller,
    Query(query): Query<RawUploadQuery>,
    request: Request,
) -> Response {
    let orchestrator = Arc::clone(state.orchestrator());
    debug!("Separation requested by {}", caller);

    if is_multipart(&request) {
        match Multipart::from_request(request, &()).await {
            Ok(multipart) => separate_multipart(orchestrator, multipart).await,
            Err(rejection) => bad_request(rejection.body_text()),
        }
    } else {
        let extension = sanitize_extension(query.ext.map(|e| format!("upload.{}", e)).as_deref());
        separate_raw(orchestrator, request.into_body(), extension)
    }
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

/// Spawn the workflow on the multipart stream. Responds once the `file` field
/// has been found, so a request without one still gets a plain 400.
async fn separate_multipart(orchestrator: Arc<Orchestrator>, mut multipart: Multipart) -> Response {
    let (sink, rx) = progress_channel();
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), String>>();

    tokio::spawn(async move {
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    debug!("Malformed multipart body: {}", e);
                    let reason = format!("malformed multipart body: {}", e.body_text());
                    let _ = ready_tx.send(Err(reason));
                    return;
                }
            };
            if field.name() != Some(FILE_FIELD) {
                debug!("Skipping multipart field {:?}", field.name());
                continue;
            }

            let extension = sanitize_extension(field.file_name());
            info!(
                "Separation upload {:?} (extension {})",
                field.file_name(),
                extension
            );
            let _ = ready_tx.send(Ok(()));

            let reader = StreamReader::new(field.map_err(io::Error::other));
            tokio::pin!(reader);
            run_separation(&orchestrator, &mut reader, &extension, &sink).await;
            return;
        }

        let _ = ready_tx.send(Err(format!("missing multipart field '{}'", FILE_FIELD)));
    });

    match ready_rx.await {
        Ok(Ok(())) => event_stream(rx).into_response(),
        Ok(Err(reason)) => bad_request(reason),
        Err(_) => bad_request("upload task ended before reading the request"),
    }
}

fn separate_raw(orchestrator: Arc<Orchestrator>, body: Body, extension: String) -> Response {
    let (sink, rx) = progress_channel();

    info!("Separation upload (raw body, extension {})", extension);
    tokio::spawn(async move {
        let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
        tokio::pin!(reader);
        run_separation(&orchestrator, &mut reader, &extension, &sink).await;
    });

    event_stream(rx).into_response()
}

async fn run_separation<R>(
    orchestrator: &Orchestrator,
    reader: &mut R,
    extension: &str,
    sink: &ProgressSink,
) where
    R: tokio::io::AsyncRead + Unpin + Send + ?Sized,
{
    let outcome = orchestrator.separate(reader, extension, sink).await;
    if sink.is_detached() {
        warn!(
            "Separation finished ({}) after the client disconnected",
            outcome.as_str()
        );
    }
}
