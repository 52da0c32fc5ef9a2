//! Server-Sent Events transport for workflow progress.
//!
//! Each request gets its own event stream fed by the workflow task through an
//! unbounded channel. The stream closes after the first terminal event, or
//! when the workflow task drops its sink.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use jellysing_core::ProgressEvent;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::metrics::{SSE_EVENTS_SENT, SSE_STREAMS_ACTIVE, SSE_STREAMS_TOTAL};

/// Decrements the active-stream gauge when the response body is dropped,
/// whether the stream finished or the client went away.
struct ActiveStream;

impl ActiveStream {
    fn open() -> Self {
        SSE_STREAMS_ACTIVE.inc();
        SSE_STREAMS_TOTAL.inc();
        Self
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        SSE_STREAMS_ACTIVE.dec();
    }
}

/// Convert a progress event into its SSE frame.
pub fn to_sse_event(event: &ProgressEvent) -> Event {
    Event::default()
        .event(event.event_type())
        .data(event.to_json().to_string())
}

/// Drain `rx` as an SSE response.
pub fn event_stream(
    mut rx: UnboundedReceiver<ProgressEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        let _active = ActiveStream::open();

        while let Some(event) = rx.recv().await {
            SSE_EVENTS_SENT
                .with_label_values(&[event.event_type()])
                .inc();
            yield Ok(to_sse_event(&event));

            if event.is_terminal() {
                debug!("Progress stream finished with {}", event.event_type());
                break;
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
